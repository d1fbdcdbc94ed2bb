//! Note generation via `generateContent`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;
use vnote_models::ContextHandle;

use super::{transport_error, GeminiClient};
use crate::error::{WorkerError, WorkerResult};
use crate::providers::Summarizer;

/// Stands in for the transcript when the audio had no speech.
pub const NO_SPEECH_PLACEHOLDER: &str =
    "(No speech detected in this video. Please rely entirely on VISUAL OBSERVATIONS.)";

/// Build the note-taking prompt for a transcript.
pub fn build_prompt(transcript: &str) -> String {
    let transcript = if transcript.trim().is_empty() {
        NO_SPEECH_PLACEHOLDER
    } else {
        transcript
    };

    format!(
        r#"You are an expert note-taker.

TASK:
Turn the content below into notes with three sections:
1) **SUMMARY**: one paragraph of 5-8 sentences giving the high-level picture. Draw on both the audio and the visual context when a video is attached.
2) **KEY TAKEAWAYS**: 6-12 bullets, each a distinct and meaningful point.
3) **NEXT STEPS**: 3 concrete actions the content implies.

RULES:
- Do NOT copy the transcript verbatim.
- Merge ideas that come up more than once.
- Stay concise and readable.
- When a video is attached, use what is on screen (slides, code, diagrams) to enrich the notes, without a separate list of visual observations.
- Trust the transcript for what was said and the video for visual details such as code snippets and charts.

TRANSCRIPT:
{transcript}"#
    )
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum Part<'a> {
    Text { text: &'a str },
    File { file_data: FileData<'a> },
}

#[derive(Debug, Serialize)]
struct FileData<'a> {
    mime_type: &'a str,
    file_uri: &'a str,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<ResponseContent>,
}

#[derive(Debug, Deserialize)]
struct ResponseContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

impl GenerateResponse {
    /// Concatenated text of the first candidate.
    fn text(&self) -> String {
        self.candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .map(|content| {
                content
                    .parts
                    .iter()
                    .filter_map(|p| p.text.as_deref())
                    .collect::<String>()
            })
            .unwrap_or_default()
    }
}

#[async_trait]
impl Summarizer for GeminiClient {
    async fn summarize(
        &self,
        transcript: &str,
        context: Option<&ContextHandle>,
    ) -> WorkerResult<String> {
        let prompt = build_prompt(transcript);
        let mut parts = vec![Part::Text { text: &prompt }];
        if let Some(handle) = context {
            parts.push(Part::File {
                file_data: FileData {
                    mime_type: &handle.mime_type,
                    file_uri: &handle.uri,
                },
            });
        }
        let request = GenerateRequest {
            contents: vec![Content { parts }],
        };

        let url = self.url(&format!(
            "v1beta/models/{}:generateContent",
            self.config.model
        ));
        info!(
            model = %self.config.model,
            with_video = context.is_some(),
            "Requesting summary"
        );
        let response = self
            .authed(self.http.post(&url))?
            .json(&request)
            .send()
            .await
            .map_err(|e| transport_error(e, WorkerError::SummarizationFailed))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(WorkerError::from_provider_status(
                status.as_u16(),
                &body,
                WorkerError::SummarizationFailed,
            ));
        }

        let parsed: GenerateResponse = response.json().await.map_err(|e| {
            WorkerError::summarization_failed(format!("invalid Gemini response: {}", e))
        })?;
        let text = parsed.text();
        let text = text.trim();
        if text.is_empty() {
            return Err(WorkerError::summarization_failed("Gemini returned no text."));
        }
        Ok(text.to_string())
    }
}
