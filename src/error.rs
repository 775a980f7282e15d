//! Error taxonomy for the pipeline
//!
//! Every failure is categorized so the caller can show a remediation hint:
//! credential problems and sequence violations block before any remote call,
//! per-attachment ingestion failures are isolated, generation failures abort
//! the current stage run only, export failures are best-effort.

use thiserror::Error;

/// What went wrong on the remote generation side.
///
/// Surfaced as a human-readable category hint. No automatic retry is attached
/// to any of these - the next attempt is a fresh user action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationErrorKind {
    /// Rate limit or quota exhausted (HTTP 429)
    Quota,
    /// Invalid model id or malformed request (HTTP 400/404)
    InvalidRequest,
    /// The safety filter blocked the prompt or the response
    Safety,
    /// Transport-level failure (DNS, TLS, timeout)
    Network,
    /// Server-side error (HTTP 5xx)
    Service,
}

impl std::fmt::Display for GenerationErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let hint = match self {
            GenerationErrorKind::Quota => "quota exceeded",
            GenerationErrorKind::InvalidRequest => "invalid request",
            GenerationErrorKind::Safety => "safety filter",
            GenerationErrorKind::Network => "network failure",
            GenerationErrorKind::Service => "service error",
        };
        f.write_str(hint)
    }
}

/// Pipeline error taxonomy
#[derive(Debug, Error)]
pub enum Error {
    /// Missing or rejected API key
    #[error("credential error: {0}")]
    Credential(String),

    /// A single attachment failed to upload, poll or normalize
    #[error("ingestion failed for '{name}': {reason}")]
    Ingestion { name: String, reason: String },

    /// The remote generation call failed
    #[error("generation failed ({kind}): {message}")]
    Generation {
        kind: GenerationErrorKind,
        message: String,
    },

    /// A stage was run before its prerequisite stage completed
    #[error("stage {stage} requires a completed stage {missing} result")]
    Sequence { stage: u8, missing: u8 },

    /// The markdown-to-document transform failed
    #[error("export error: {0}")]
    Export(String),
}

impl Error {
    /// Shorthand for a per-attachment ingestion failure
    pub fn ingestion(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::Ingestion {
            name: name.into(),
            reason: reason.into(),
        }
    }

    pub fn generation(kind: GenerationErrorKind, message: impl Into<String>) -> Self {
        Error::Generation {
            kind,
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
