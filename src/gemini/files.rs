//! Gemini Files API
//!
//! Attachments are uploaded through the resumable-upload protocol and then
//! processed asynchronously on the remote side. The readiness poll is modeled
//! as an explicit state machine ({Uploading, Processing, Ready, Failed}) with
//! a pure terminal-state check, so the same loop logic runs under a real
//! 2-second sleep in production and a scripted poller with zero wait in tests.

use serde::Deserialize;
use std::future::Future;
use std::time::Duration;

use super::client::{GeminiClient, GEMINI_BASE_URL};
use super::http::GEMINI_CLIENT;
use crate::error::{Error, Result};

/// Interval between readiness polls
pub const POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Lifecycle state of a remotely processed file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileState {
    Uploading,
    Processing,
    Ready,
    Failed,
}

impl FileState {
    /// Map the wire state string to our state machine.
    /// Gemini reports `PROCESSING` / `ACTIVE` / `FAILED`; anything else is
    /// treated as still in flight.
    pub fn from_wire(state: &str) -> Self {
        match state {
            "ACTIVE" => FileState::Ready,
            "FAILED" => FileState::Failed,
            "PROCESSING" => FileState::Processing,
            _ => FileState::Uploading,
        }
    }

    /// Pure transition check: has the file reached a terminal state?
    pub fn is_terminal(self) -> bool {
        matches!(self, FileState::Ready | FileState::Failed)
    }
}

/// Opaque reference to an attachment after remote-side ingestion.
///
/// Owned by the ingestor while polling, then handed read-only to the
/// generation invoker.
#[derive(Debug, Clone)]
pub struct RemoteHandle {
    /// Resource name, e.g. `files/abc-123`
    pub name: String,
    /// URI referenced from `file_data` parts in generation requests
    pub uri: String,
    pub mime_type: String,
    /// Human-facing name, used in failure messages
    pub display_name: String,
    pub state: FileState,
}

/// Wire representation of a file resource
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileResource {
    name: String,
    uri: String,
    mime_type: String,
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    state: Option<String>,
}

#[derive(Deserialize)]
struct UploadResponse {
    file: FileResource,
}

impl FileResource {
    fn into_handle(self, fallback_name: &str) -> RemoteHandle {
        let state = self
            .state
            .as_deref()
            .map(FileState::from_wire)
            .unwrap_or(FileState::Processing);
        RemoteHandle {
            name: self.name,
            uri: self.uri,
            mime_type: self.mime_type,
            display_name: self.display_name.unwrap_or_else(|| fallback_name.to_string()),
            state,
        }
    }
}

/// Drive a handle's state to a terminal one.
///
/// `poll` fetches the next observed state; `wait` is awaited between
/// attempts. Production passes a GET on the file resource and a
/// `tokio::time::sleep`; tests pass a scripted sequence and a no-op wait.
/// No total-wait bound is imposed here - timeout policy belongs to the
/// caller's UI layer.
pub async fn poll_until_terminal<P, PF, W, WF>(
    initial: FileState,
    mut poll: P,
    mut wait: W,
) -> Result<FileState>
where
    P: FnMut() -> PF,
    PF: Future<Output = Result<FileState>>,
    W: FnMut() -> WF,
    WF: Future<Output = ()>,
{
    let mut state = initial;
    while !state.is_terminal() {
        wait().await;
        state = poll().await?;
    }
    Ok(state)
}

impl GeminiClient {
    /// Upload raw bytes to the Files endpoint.
    ///
    /// Two-step resumable upload: a `start` request carrying the metadata
    /// returns the session URL, then a single `upload, finalize` request
    /// carries the payload. The returned handle is typically still
    /// UPLOADING/PROCESSING.
    pub async fn upload_file(
        &self,
        bytes: &[u8],
        display_name: &str,
        mime_type: &str,
    ) -> Result<RemoteHandle> {
        let start = GEMINI_CLIENT
            .post(format!("{}/upload/v1beta/files", GEMINI_BASE_URL))
            .header("x-goog-api-key", self.api_key())
            .header("X-Goog-Upload-Protocol", "resumable")
            .header("X-Goog-Upload-Command", "start")
            .header("X-Goog-Upload-Header-Content-Length", bytes.len())
            .header("X-Goog-Upload-Header-Content-Type", mime_type)
            .json(&serde_json::json!({ "file": { "display_name": display_name } }))
            .send()
            .await
            .map_err(|e| Error::ingestion(display_name, format!("upload start failed: {}", e)))?;

        if !start.status().is_success() {
            let status = start.status();
            let body = start.text().await.unwrap_or_default();
            return Err(Error::ingestion(
                display_name,
                format!("upload rejected ({}): {}", status, body),
            ));
        }

        let upload_url = start
            .headers()
            .get("x-goog-upload-url")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| Error::ingestion(display_name, "missing upload session URL"))?;

        let response = GEMINI_CLIENT
            .post(&upload_url)
            .header("X-Goog-Upload-Offset", "0")
            .header("X-Goog-Upload-Command", "upload, finalize")
            .body(bytes.to_vec())
            .send()
            .await
            .map_err(|e| Error::ingestion(display_name, format!("upload failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::ingestion(
                display_name,
                format!("upload failed ({}): {}", status, body),
            ));
        }

        let uploaded: UploadResponse = response
            .json()
            .await
            .map_err(|e| Error::ingestion(display_name, format!("bad upload response: {}", e)))?;

        let handle = uploaded.file.into_handle(display_name);
        tracing::debug!(
            "[Files] Uploaded '{}' as {} ({:?})",
            display_name,
            handle.name,
            handle.state
        );
        Ok(handle)
    }

    /// Fetch the current state of an uploaded file
    pub async fn file_state(&self, handle: &RemoteHandle) -> Result<FileState> {
        let response = GEMINI_CLIENT
            .get(format!("{}/v1beta/{}", GEMINI_BASE_URL, handle.name))
            .header("x-goog-api-key", self.api_key())
            .send()
            .await
            .map_err(|e| {
                Error::ingestion(&handle.display_name, format!("state poll failed: {}", e))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(Error::ingestion(
                &handle.display_name,
                format!("state poll rejected ({})", status),
            ));
        }

        let resource: FileResource = response.json().await.map_err(|e| {
            Error::ingestion(&handle.display_name, format!("bad poll response: {}", e))
        })?;

        Ok(resource
            .state
            .as_deref()
            .map(FileState::from_wire)
            .unwrap_or(FileState::Processing))
    }

    /// Poll at a fixed interval until the file is READY, or fail.
    ///
    /// A FAILED terminal state becomes an ingestion error carrying the
    /// attachment's display name; it is not escalated further by this layer.
    pub async fn wait_until_ready(&self, mut handle: RemoteHandle) -> Result<RemoteHandle> {
        let final_state = poll_until_terminal(
            handle.state,
            || self.file_state(&handle),
            || tokio::time::sleep(POLL_INTERVAL),
        )
        .await?;

        match final_state {
            FileState::Ready => {
                handle.state = FileState::Ready;
                tracing::info!("[Files] '{}' is ready", handle.display_name);
                Ok(handle)
            }
            _ => Err(Error::ingestion(
                &handle.display_name,
                "remote processing failed",
            )),
        }
    }
}
