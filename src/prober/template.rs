//! Endpoint templates read from an OpenAPI document

use regex::Regex;
use reqwest::Method;
use serde_yaml::Value;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use thiserror::Error;

/// Value substituted for every path placeholder
pub const PLACEHOLDER_VALUE: &str = "1";

/// Methods probed; anything else under a path item is ignored
const PROBED_METHODS: [&str; 5] = ["get", "post", "put", "delete", "patch"];

/// `{name}` path parameters
///
/// Pattern is a compile-time constant that is known to be valid.
#[allow(clippy::unwrap_used)]
static PLACEHOLDER_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\{[^}]+\}").unwrap());

/// Errors raised while loading endpoint templates
#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("Failed to read API document {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse API document {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: serde_yaml::Error,
    },
}

/// A path pattern and the method to probe it with
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointTemplate {
    /// Path pattern, possibly containing `{name}` placeholders
    pub path: String,
    pub method: Method,
    pub summary: Option<String>,
}

impl EndpointTemplate {
    pub fn new(path: impl Into<String>, method: Method) -> Self {
        Self {
            path: path.into(),
            method,
            summary: None,
        }
    }

    /// The path with every placeholder filled
    pub fn concrete_path(&self) -> String {
        fill_placeholders(&self.path)
    }
}

/// Replaces every `{…}` placeholder with [`PLACEHOLDER_VALUE`]
///
/// Literal segments are left untouched.
///
/// # Examples
///
/// ```
/// use surface_scout::prober::fill_placeholders;
///
/// assert_eq!(fill_placeholders("/items/{itemId}/details"), "/items/1/details");
/// assert_eq!(fill_placeholders("/login"), "/login");
/// ```
pub fn fill_placeholders(path: &str) -> String {
    PLACEHOLDER_RE
        .replace_all(path, PLACEHOLDER_VALUE)
        .into_owned()
}

/// Loads endpoint templates from an OpenAPI document (YAML or JSON)
///
/// Every `paths` entry contributes one template per probed method, matched
/// case-insensitively, in document order. A document without `paths` yields
/// no templates.
pub fn load_templates(path: &Path) -> Result<Vec<EndpointTemplate>, TemplateError> {
    let content = std::fs::read_to_string(path).map_err(|source| TemplateError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    let document: Value = serde_yaml::from_str(&content).map_err(|source| TemplateError::Parse {
        path: path.to_path_buf(),
        source,
    })?;

    let templates = templates_from_document(&document);
    tracing::info!(
        "Loaded {} endpoints from {}",
        templates.len(),
        path.display()
    );
    Ok(templates)
}

fn templates_from_document(document: &Value) -> Vec<EndpointTemplate> {
    let Some(paths) = document.get("paths").and_then(Value::as_mapping) else {
        tracing::warn!("API document has no paths section");
        return Vec::new();
    };

    let mut templates = Vec::new();
    for (path, item) in paths {
        let (Some(path), Some(operations)) = (path.as_str(), item.as_mapping()) else {
            continue;
        };

        for (method, details) in operations {
            let Some(method) = method.as_str().map(str::to_ascii_lowercase) else {
                continue;
            };
            if !PROBED_METHODS.contains(&method.as_str()) {
                continue;
            }
            let Ok(method) = Method::from_bytes(method.to_ascii_uppercase().as_bytes()) else {
                continue;
            };

            templates.push(EndpointTemplate {
                path: path.to_string(),
                method,
                summary: details
                    .get("summary")
                    .and_then(Value::as_str)
                    .map(str::to_string),
            });
        }
    }
    templates
}
