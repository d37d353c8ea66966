//! HAR 1.2 wire structures
//!
//! Only the fields the pipeline reads or the downstream transform needs are
//! modelled. Unknown fields are ignored on read.

use serde::{Deserialize, Deserializer, Serialize};

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct HarFile {
    pub log: HarLog,
}

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct HarLog {
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default)]
    pub creator: HarCreator,
    #[serde(default)]
    pub entries: Vec<HarEntry>,
}

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct HarCreator {
    pub name: String,
    pub version: String,
}

impl Default for HarCreator {
    fn default() -> Self {
        Self {
            name: env!("CARGO_PKG_NAME").to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct HarEntry {
    #[serde(default)]
    pub started_date_time: Option<String>,
    #[serde(default)]
    pub time: f64,
    pub request: HarRequest,
    #[serde(default)]
    pub response: HarResponse,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct HarRequest {
    #[serde(default = "default_method")]
    pub method: String,
    pub url: String,
    #[serde(default = "default_http_version")]
    pub http_version: String,
    #[serde(default)]
    pub headers: Vec<HarHeader>,
    #[serde(default)]
    pub query_string: Vec<HarHeader>,
    #[serde(default)]
    pub headers_size: i64,
    #[serde(default)]
    pub body_size: i64,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct HarResponse {
    /// Zero or negative when no response arrived (aborted or blocked)
    #[serde(default)]
    pub status: i64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub status_text: String,
    #[serde(default)]
    pub http_version: String,
    #[serde(default)]
    pub headers: Vec<HarHeader>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub content: HarContent,
    #[serde(default, rename = "redirectURL")]
    pub redirect_url: String,
    #[serde(default)]
    pub headers_size: i64,
    #[serde(default)]
    pub body_size: i64,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct HarContent {
    #[serde(default)]
    pub size: i64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub mime_type: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct HarHeader {
    pub name: String,
    pub value: String,
}

/// Reads an explicit `null` as the field's default
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

fn default_version() -> String {
    "1.2".to_string()
}

fn default_method() -> String {
    "GET".to_string()
}

fn default_http_version() -> String {
    "HTTP/1.1".to_string()
}
