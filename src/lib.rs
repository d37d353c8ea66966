//! Surface-Scout: active API surface discovery
//!
//! This crate crawls a target web application while recording every network
//! exchange, infers the base path under which the application's API lives,
//! and replays requests against discovered endpoints through a capturing
//! proxy so that an external transform can turn the traffic into an OpenAPI
//! document.

pub mod analyzer;
pub mod browser;
pub mod config;
pub mod crawler;
pub mod output;
pub mod pipeline;
pub mod prober;
pub mod proxy;
pub mod state;
pub mod storage;
pub mod synth;
pub mod traffic;
pub mod url;

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for Surface-Scout operations
#[derive(Debug, Error)]
pub enum ScoutError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("URL error: {0}")]
    UrlError(#[from] UrlError),

    #[error("Checkpoint error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("Browser error: {0}")]
    Browser(#[from] browser::BrowserError),

    #[error("Traffic log error: {0}")]
    Traffic(#[from] traffic::TrafficError),

    #[error("Endpoint template error: {0}")]
    Template(#[from] prober::TemplateError),

    #[error("Proxy error: {0}")]
    Proxy(#[from] proxy::ProxyError),

    #[error("Spec synthesis error: {0}")]
    Synth(#[from] synth::SynthError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("Failed to finalize traffic capture at {}: {source}", path.display())]
    CaptureFinalize {
        path: PathBuf,
        source: browser::BrowserError,
    },

    #[error("Invalid state transition: {from:?} -> {to:?}")]
    InvalidTransition {
        from: state::CrawlState,
        to: state::CrawlState,
    },

    #[error("Checkpoint belongs to a different crawl (started at {start_url}); delete it or run without resuming")]
    CheckpointMismatch { start_url: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),
}

/// URL-specific errors
#[derive(Debug, Error)]
pub enum UrlError {
    #[error("Failed to parse URL: {0}")]
    Parse(String),

    #[error("Invalid URL scheme: {0}")]
    InvalidScheme(String),

    #[error("Missing host in URL")]
    MissingHost,
}

/// Result type alias for Surface-Scout operations
pub type Result<T> = std::result::Result<T, ScoutError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for URL operations
pub type UrlResult<T> = std::result::Result<T, UrlError>;

// Re-export commonly used types
pub use analyzer::{detect_api_prefix, infer_prefix, InferredPrefix};
pub use config::Config;
pub use crawler::{CrawlReport, Crawler};
pub use state::{CrawlState, Frontier};
pub use traffic::{TrafficEntry, TrafficLog};
