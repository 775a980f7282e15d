//! adstrat - three-stage ad-strategy generation pipeline
//!
//! Drives the Gemini API through three chained stages: competitor analysis,
//! gap analysis and creative output. Each stage's result is cached in the
//! session and embedded verbatim into the next stage's prompt; attachments
//! are uploaded to the asynchronous Files endpoint and polled to readiness
//! before generation. Completed stages export to .docx.
//!
//! ```no_run
//! use adstrat::{GeminiClient, GeminiModel, Pipeline, StageInput};
//!
//! # async fn run() -> adstrat::Result<()> {
//! let client = GeminiClient::from_env()?;
//! let mut pipeline = Pipeline::new(client, GeminiModel::Flash25);
//!
//! let report = pipeline
//!     .run_stage1(StageInput::text("competitor ad copy..."))
//!     .await?;
//! let docx = adstrat::export::export_markdown(&report.text)?;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod export;
pub mod gemini;
pub mod ingest;
pub mod pipeline;
pub mod prompts;

pub use error::{Error, GenerationErrorKind, Result};
pub use gemini::{FileState, GeminiClient, GeminiModel, GenerationService, RemoteHandle};
pub use ingest::{Attachment, IngestFailure};
pub use pipeline::{Pipeline, PipelineState, Session, Stage, StageInput, StageReport};

use tracing_subscriber::EnvFilter;

/// Initialize tracing with the RUST_LOG env filter.
/// Default: warn for dependencies, info for this crate.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn,adstrat=info")),
        )
        .init();
}
