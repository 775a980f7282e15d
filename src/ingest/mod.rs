//! Attachment Ingestor
//!
//! Converts caller-supplied artifacts into remote-processable handles:
//! normalize rich-document formats to plain text, upload to the Files
//! endpoint, and wait for asynchronous readiness. Attachments are transient -
//! they exist for one ingestion + generation call only.
//!
//! Ingestions are independent: each attachment is uploaded concurrently and a
//! failure in one never aborts the others. The invoker receives only the
//! successfully ingested subset; failures are collected for the stage report.

pub mod extract;

use futures::future::join_all;
use serde::Serialize;

use crate::error::{Error, Result};
use crate::gemini::{GenerationService, RemoteHandle};

/// A caller-supplied file artifact for one stage
#[derive(Debug, Clone)]
pub struct Attachment {
    pub name: String,
    pub bytes: Vec<u8>,
    /// Declared media type; guessed from the name when absent
    pub mime_type: Option<String>,
}

impl Attachment {
    pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            bytes,
            mime_type: None,
        }
    }

    pub fn with_mime(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }

    /// Declared type, falling back to a guess from the file name
    pub fn resolved_mime(&self) -> String {
        self.mime_type.clone().unwrap_or_else(|| {
            mime_guess::from_path(&self.name)
                .first_or_octet_stream()
                .essence_str()
                .to_string()
        })
    }
}

/// One attachment that could not be ingested
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestFailure {
    pub name: String,
    pub reason: String,
}

/// Result of ingesting a batch of attachments for one stage.
///
/// `handles.len() + failures.len()` always equals the submitted count; no
/// partial outcome is produced until every ingestion reached a terminal state.
#[derive(Debug, Default)]
pub struct IngestOutcome {
    pub handles: Vec<RemoteHandle>,
    pub failures: Vec<IngestFailure>,
}

impl IngestOutcome {
    pub fn all_failed(&self) -> bool {
        self.handles.is_empty() && !self.failures.is_empty()
    }
}

/// Ingest a single attachment: normalize, submit, await readiness.
pub async fn ingest<S: GenerationService + ?Sized>(
    service: &S,
    attachment: Attachment,
) -> Result<RemoteHandle> {
    let mime = attachment.resolved_mime();
    let (bytes, display_name, mime_type) = if extract::needs_normalization(&attachment.name, &mime)
    {
        let extracted = extract::extract_text(&attachment.name, &mime, &attachment.bytes)?;
        (
            extracted.text.into_bytes(),
            extracted.display_name,
            "text/plain".to_string(),
        )
    } else {
        (attachment.bytes, attachment.name, mime)
    };

    tracing::info!(
        "[Ingest] Uploading '{}' ({} bytes, {})",
        display_name,
        bytes.len(),
        mime_type
    );

    service.upload(&bytes, &display_name, &mime_type).await
}

/// Ingest a batch of attachments concurrently.
///
/// Per-attachment failures are isolated into the outcome instead of
/// propagating; the caller decides whether an empty surviving set is fatal.
pub async fn ingest_all<S: GenerationService + ?Sized>(
    service: &S,
    attachments: Vec<Attachment>,
) -> IngestOutcome {
    let submitted = attachments.len();
    let names: Vec<String> = attachments.iter().map(|a| a.name.clone()).collect();

    let results = join_all(
        attachments
            .into_iter()
            .map(|attachment| ingest(service, attachment)),
    )
    .await;

    let mut outcome = IngestOutcome::default();
    for (result, name) in results.into_iter().zip(names) {
        match result {
            Ok(handle) => outcome.handles.push(handle),
            Err(Error::Ingestion { name, reason }) => {
                tracing::warn!("[Ingest] '{}' failed: {}", name, reason);
                outcome.failures.push(IngestFailure { name, reason });
            }
            Err(other) => {
                // Non-ingestion errors are still scoped to this attachment
                tracing::warn!("[Ingest] '{}' failed: {}", name, other);
                outcome.failures.push(IngestFailure {
                    name,
                    reason: other.to_string(),
                });
            }
        }
    }

    tracing::info!(
        "[Ingest] {}/{} attachments ready",
        outcome.handles.len(),
        submitted
    );
    outcome
}
