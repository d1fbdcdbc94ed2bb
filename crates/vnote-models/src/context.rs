//! Handle to a video registered with a multimodal analysis service.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Reference to a remote, ephemeral video asset.
///
/// Handles are owned by a single run and must be released before it ends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ContextHandle {
    /// Provider-side resource name (e.g. `files/abc123`)
    pub name: String,
    /// URI to reference the asset from a generation request
    pub uri: String,
    pub mime_type: String,
}
