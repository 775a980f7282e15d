//! Gemini API client
//!
//! Thin typed wrapper over the `generateContent` endpoint. One multimodal
//! request per stage run: the composed instruction text plus a `file_data`
//! part per successfully ingested attachment. Temperature is fixed low to
//! favor consistency over creativity across re-runs.
//!
//! The credential is held in memory for the lifetime of the client only;
//! it is never written to disk.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::files::RemoteHandle;
use super::http::GEMINI_CLIENT;
use crate::error::{Error, GenerationErrorKind, Result};

pub const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// Fixed generation temperature (deterministic-leaning)
pub const GENERATION_TEMPERATURE: f32 = 0.3;

/// Gemini model identifiers
///
/// The selectable set is a fixed enumerated list; free-form model ids are
/// not accepted by the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GeminiModel {
    /// Deep analysis, slowest
    Pro25,
    /// Balanced default
    Flash25,
    /// Fastest, cheapest
    Flash20,
}

impl GeminiModel {
    pub fn as_str(&self) -> &'static str {
        match self {
            GeminiModel::Pro25 => "gemini-2.5-pro",
            GeminiModel::Flash25 => "gemini-2.5-flash",
            GeminiModel::Flash20 => "gemini-2.0-flash",
        }
    }

    /// The full selectable list, in UI order
    pub fn all() -> &'static [GeminiModel] {
        &[GeminiModel::Pro25, GeminiModel::Flash25, GeminiModel::Flash20]
    }

    pub fn from_id(id: &str) -> Option<Self> {
        GeminiModel::all().iter().copied().find(|m| m.as_str() == id)
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct Content {
    parts: Vec<Part>,
}

/// A single request part: either text or a reference to an uploaded file
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Part {
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    file_data: Option<FileData>,
}

impl Part {
    fn text(text: &str) -> Self {
        Self {
            text: Some(text.to_string()),
            file_data: None,
        }
    }

    fn file(handle: &RemoteHandle) -> Self {
        Self {
            text: None,
            file_data: Some(FileData {
                mime_type: handle.mime_type.clone(),
                file_uri: handle.uri.clone(),
            }),
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct FileData {
    mime_type: String,
    file_uri: String,
}

#[derive(Serialize)]
struct GenerationConfig {
    temperature: f32,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}

/// API error response
#[derive(Deserialize)]
struct ApiError {
    error: ApiErrorDetail,
}

#[derive(Deserialize)]
struct ApiErrorDetail {
    message: String,
}

/// Seam for the remote generation capability.
///
/// The pipeline controller and the ingestor talk to this trait so tests can
/// substitute a stub and assert that no remote call happens on rejection.
#[async_trait]
pub trait GenerationService: Send + Sync {
    /// Upload an attachment payload and wait for remote processing to finish
    async fn upload(
        &self,
        bytes: &[u8],
        display_name: &str,
        mime_type: &str,
    ) -> Result<RemoteHandle>;

    /// Submit one multimodal generation request and return the response text
    async fn generate(
        &self,
        model: GeminiModel,
        instruction: &str,
        handles: &[RemoteHandle],
    ) -> Result<String>;
}

/// Gemini API client holding the session credential
pub struct GeminiClient {
    api_key: String,
}

impl GeminiClient {
    /// Create a client from a caller-supplied API key.
    /// Blank keys are rejected locally before any remote call.
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(Error::Credential("API key is empty".to_string()));
        }
        Ok(Self { api_key })
    }

    /// Create a client from `GEMINI_API_KEY`, honoring a `.env` file
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv();
        let key = std::env::var("GEMINI_API_KEY")
            .map_err(|_| Error::Credential("GEMINI_API_KEY not set".to_string()))?;
        Self::new(key)
    }

    pub(crate) fn api_key(&self) -> &str {
        &self.api_key
    }

    /// Validate the key with a minimal generation request.
    /// `Ok(false)` means the service rejected the key; transport failures
    /// still surface as errors so the caller can distinguish the two.
    pub async fn validate_key(&self) -> Result<bool> {
        let request = GenerateRequest {
            contents: vec![Content {
                parts: vec![Part::text("ping")],
            }],
            generation_config: GenerationConfig { temperature: 0.0 },
        };

        let response = GEMINI_CLIENT
            .post(format!(
                "{}/v1beta/models/{}:generateContent",
                GEMINI_BASE_URL,
                GeminiModel::Flash20.as_str()
            ))
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                Error::generation(GenerationErrorKind::Network, format!("request failed: {}", e))
            })?;

        Ok(response.status().is_success())
    }

    /// Map an unsuccessful HTTP response to the error taxonomy
    fn map_api_error(status: reqwest::StatusCode, body: &str) -> Error {
        let message = serde_json::from_str::<ApiError>(body)
            .map(|e| e.error.message)
            .unwrap_or_else(|_| format!("({}) {}", status, body));

        match status.as_u16() {
            401 | 403 => Error::Credential(message),
            429 => Error::generation(GenerationErrorKind::Quota, message),
            400 | 404 => Error::generation(GenerationErrorKind::InvalidRequest, message),
            _ => Error::generation(GenerationErrorKind::Service, message),
        }
    }
}

#[async_trait]
impl GenerationService for GeminiClient {
    async fn upload(
        &self,
        bytes: &[u8],
        display_name: &str,
        mime_type: &str,
    ) -> Result<RemoteHandle> {
        let handle = self.upload_file(bytes, display_name, mime_type).await?;
        self.wait_until_ready(handle).await
    }

    async fn generate(
        &self,
        model: GeminiModel,
        instruction: &str,
        handles: &[RemoteHandle],
    ) -> Result<String> {
        let mut parts = vec![Part::text(instruction)];
        parts.extend(handles.iter().map(Part::file));

        let request = GenerateRequest {
            contents: vec![Content { parts }],
            generation_config: GenerationConfig {
                temperature: GENERATION_TEMPERATURE,
            },
        };

        tracing::info!(
            "[Gemini] Generating with {} ({} chars, {} attachments)",
            model.as_str(),
            instruction.len(),
            handles.len()
        );

        let response = GEMINI_CLIENT
            .post(format!(
                "{}/v1beta/models/{}:generateContent",
                GEMINI_BASE_URL,
                model.as_str()
            ))
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                Error::generation(GenerationErrorKind::Network, format!("request failed: {}", e))
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Self::map_api_error(status, &body));
        }

        let api_response: GenerateResponse = response.json().await.map_err(|e| {
            Error::generation(
                GenerationErrorKind::Service,
                format!("failed to parse response: {}", e),
            )
        })?;

        // A blocked prompt comes back 200 with no candidates
        if let Some(feedback) = &api_response.prompt_feedback {
            if let Some(reason) = &feedback.block_reason {
                return Err(Error::generation(
                    GenerationErrorKind::Safety,
                    format!("prompt blocked: {}", reason),
                ));
            }
        }

        let candidate = api_response.candidates.into_iter().next().ok_or_else(|| {
            Error::generation(GenerationErrorKind::Service, "no response candidates")
        })?;

        if candidate.finish_reason.as_deref() == Some("SAFETY") {
            return Err(Error::generation(
                GenerationErrorKind::Safety,
                "response blocked by safety filter",
            ));
        }

        let text = candidate
            .content
            .map(|c| {
                c.parts
                    .into_iter()
                    .filter_map(|p| p.text)
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();

        if text.trim().is_empty() {
            return Err(Error::generation(
                GenerationErrorKind::Service,
                "empty response text",
            ));
        }

        Ok(text.trim().to_string())
    }
}
