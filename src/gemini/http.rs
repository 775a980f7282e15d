//! Shared HTTP Client Module
//!
//! Provides a global, lazy-initialized HTTP client with connection pooling.
//! This eliminates the overhead of creating new clients per request and
//! enables TLS session reuse across uploads, polls and generation calls.

use once_cell::sync::Lazy;
use reqwest::Client;
use std::time::Duration;

/// Global HTTP client for Gemini API calls
///
/// Configuration tuned for long-running generation requests:
/// - 300s timeout (stage prompts carry full prior-stage reports)
/// - idle pooling so upload -> poll -> generate reuse one connection
pub static GEMINI_CLIENT: Lazy<Client> = Lazy::new(|| {
    Client::builder()
        .timeout(Duration::from_secs(300))
        .pool_max_idle_per_host(8)
        .pool_idle_timeout(Duration::from_secs(90))
        .tcp_keepalive(Duration::from_secs(60))
        .tcp_nodelay(true)
        .build()
        .expect("Failed to create Gemini HTTP client")
});
