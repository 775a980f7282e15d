pub mod client;
pub mod files;
pub mod http;

pub use client::{GeminiClient, GeminiModel, GenerationService, GENERATION_TEMPERATURE};
pub use files::{FileState, RemoteHandle, POLL_INTERVAL};
