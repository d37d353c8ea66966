use crate::config::types::Config;
use crate::config::validation::validate;
use crate::ConfigResult;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use sha2::{Digest, Sha256};
use std::path::Path;

/// Loads and parses a configuration file from the given path
///
/// # Arguments
///
/// * `path` - Path to the TOML configuration file
///
/// # Returns
///
/// * `Ok(Config)` - Successfully loaded and validated configuration
/// * `Err(ConfigError)` - Failed to load, parse, or validate the configuration
///
/// # Example
///
/// ```no_run
/// use std::path::Path;
/// use surface_scout::config::load_config;
///
/// let config = load_config(Path::new("scout.toml")).unwrap();
/// println!("Max depth: {}", config.crawler.max_depth);
/// ```
pub fn load_config(path: &Path) -> ConfigResult<Config> {
    let content = std::fs::read_to_string(path)?;
    let config: Config = toml::from_str(&content)?;
    validate(&config)?;
    Ok(config)
}

/// Computes a SHA-256 hash of the configuration file content
pub fn compute_config_hash(path: &Path) -> ConfigResult<String> {
    let content = std::fs::read_to_string(path)?;
    Ok(sha256_hex(content.as_bytes()))
}

/// Loads a configuration and returns both the config and its hash
pub fn load_config_with_hash(path: &Path) -> ConfigResult<(Config, String)> {
    let config = load_config(path)?;
    let hash = compute_config_hash(path)?;
    Ok((config, hash))
}

/// Fingerprint of the settings that shape a crawl frontier
///
/// Two runs with the same fingerprint walk the same frontier, so a
/// checkpoint written by one can be resumed by the other.
pub fn crawl_fingerprint(start_url: &str, max_depth: u32) -> String {
    sha256_hex(format!("{}\n{}", start_url, max_depth).as_bytes())
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Parses a `Name: value` header override
///
/// Returns `None` when the entry has no colon or an empty name.
pub fn parse_header(raw: &str) -> Option<(String, String)> {
    let (name, value) = raw.split_once(':')?;
    let name = name.trim();
    if name.is_empty() {
        return None;
    }
    Some((name.to_string(), value.trim().to_string()))
}

/// Parses a `name=value` cookie override
pub fn parse_cookie(raw: &str) -> Option<(String, String)> {
    let (name, value) = raw.split_once('=')?;
    let name = name.trim();
    if name.is_empty() {
        return None;
    }
    Some((name.to_string(), value.trim().to_string()))
}

/// Parses a list of raw overrides, warning about and skipping malformed ones
pub fn parse_overrides(
    raw: &[String],
    kind: &str,
    parse: fn(&str) -> Option<(String, String)>,
) -> Vec<(String, String)> {
    raw.iter()
        .filter_map(|entry| {
            let parsed = parse(entry);
            if parsed.is_none() {
                tracing::warn!("Ignoring malformed {} override: {:?}", kind, entry);
            }
            parsed
        })
        .collect()
}

/// Builds a header map from parsed overrides, skipping entries that are not
/// valid HTTP
pub fn build_header_map(headers: &[(String, String)]) -> HeaderMap {
    let mut map = HeaderMap::new();
    for (name, value) in headers {
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(value)) => {
                map.insert(name, value);
            }
            _ => tracing::warn!("Ignoring invalid header {:?}", name),
        }
    }
    map
}
