//! Configuration module for Surface-Scout
//!
//! This module handles loading, parsing, and validating the optional TOML
//! configuration file, plus parsing of command-line header and cookie
//! overrides.
//!
//! # Example
//!
//! ```no_run
//! use surface_scout::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("scout.toml")).unwrap();
//! println!("Crawler will use max depth: {}", config.crawler.max_depth);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    BrowserConfig, BrowserEngine, Config, CrawlerConfig, OutputConfig, ProberConfig, ProxyConfig,
    SynthConfig,
};

// Re-export parser functions
pub use parser::{
    build_header_map, compute_config_hash, crawl_fingerprint, load_config, load_config_with_hash,
    parse_cookie, parse_header, parse_overrides,
};
pub use validation::validate;
