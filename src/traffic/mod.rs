//! Traffic log module
//!
//! The traffic log is the artifact shared by every pipeline stage: the
//! crawl session appends to it, the prefix inferencer and the external spec
//! transform read it. It is persisted as a HAR 1.2 document.

mod har;

use chrono::{DateTime, SecondsFormat, Utc};
use har::{HarContent, HarEntry, HarFile, HarLog, HarRequest, HarResponse};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors raised while reading or writing a traffic log
#[derive(Debug, Error)]
pub enum TrafficError {
    #[error("Failed to read traffic log {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse traffic log {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Failed to write traffic log {}: {source}", path.display())]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to serialize traffic log: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// One observed request/response exchange
///
/// Entries are immutable once recorded.
#[derive(Debug, Clone, PartialEq)]
pub struct TrafficEntry {
    /// Absolute request URL
    pub url: String,

    /// HTTP method (uppercase)
    pub method: String,

    /// Response MIME type, possibly empty
    pub content_type: String,

    /// Response status, absent if no response was received
    pub status: Option<u16>,

    /// When the request was issued
    pub started_at: Option<DateTime<Utc>>,

    /// Round-trip time in milliseconds
    pub duration_ms: f64,
}

impl TrafficEntry {
    /// Creates an entry for an exchange that produced a response
    pub fn new(
        url: impl Into<String>,
        method: impl Into<String>,
        content_type: impl Into<String>,
        status: u16,
    ) -> Self {
        Self {
            url: url.into(),
            method: method.into().to_uppercase(),
            content_type: content_type.into(),
            status: Some(status),
            started_at: None,
            duration_ms: 0.0,
        }
    }

    /// Creates an entry for a request that never received a response
    pub fn failed(url: impl Into<String>, method: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: method.into().to_uppercase(),
            content_type: String::new(),
            status: None,
            started_at: None,
            duration_ms: 0.0,
        }
    }

    /// Sets the timing information of the exchange
    pub fn with_timing(mut self, started_at: DateTime<Utc>, duration_ms: f64) -> Self {
        self.started_at = Some(started_at);
        self.duration_ms = duration_ms;
        self
    }

    fn from_har(entry: HarEntry) -> Self {
        let started_at = entry
            .started_date_time
            .as_deref()
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc));

        Self {
            url: entry.request.url,
            method: entry.request.method.to_uppercase(),
            content_type: entry.response.content.mime_type,
            status: u16::try_from(entry.response.status)
                .ok()
                .filter(|status| *status > 0),
            started_at,
            duration_ms: entry.time.max(0.0),
        }
    }

    fn to_har(&self) -> HarEntry {
        HarEntry {
            started_date_time: Some(
                self.started_at
                    .unwrap_or_else(Utc::now)
                    .to_rfc3339_opts(SecondsFormat::Millis, true),
            ),
            time: self.duration_ms,
            request: HarRequest {
                method: self.method.clone(),
                url: self.url.clone(),
                http_version: "HTTP/1.1".to_string(),
                headers: Vec::new(),
                query_string: Vec::new(),
                headers_size: -1,
                body_size: -1,
            },
            response: HarResponse {
                status: self.status.map(i64::from).unwrap_or(0),
                status_text: String::new(),
                http_version: "HTTP/1.1".to_string(),
                headers: Vec::new(),
                content: HarContent {
                    size: -1,
                    mime_type: self.content_type.clone(),
                },
                redirect_url: String::new(),
                headers_size: -1,
                body_size: -1,
            },
        }
    }
}

/// Append-only, capture-ordered sequence of traffic entries
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrafficLog {
    entries: Vec<TrafficEntry>,
}

impl TrafficLog {
    /// Creates an empty log
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an entry, preserving capture order
    pub fn push(&mut self, entry: TrafficEntry) {
        self.entries.push(entry);
    }

    /// Returns the entries in capture order
    pub fn entries(&self) -> &[TrafficEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Parses a HAR document
    pub fn from_har_str(content: &str) -> Result<Self, serde_json::Error> {
        let har: HarFile = serde_json::from_str(content)?;
        Ok(Self {
            entries: har
                .log
                .entries
                .into_iter()
                .map(TrafficEntry::from_har)
                .collect(),
        })
    }

    /// Serializes the log as a HAR document
    pub fn to_har_string(&self) -> Result<String, serde_json::Error> {
        let har = HarFile {
            log: HarLog {
                version: "1.2".to_string(),
                creator: Default::default(),
                entries: self.entries.iter().map(TrafficEntry::to_har).collect(),
            },
        };
        serde_json::to_string_pretty(&har)
    }

    /// Loads a HAR file from disk
    ///
    /// A missing or unparseable file is an error naming the path; it is never
    /// treated as an empty log.
    pub fn load(path: &Path) -> Result<Self, TrafficError> {
        let content = std::fs::read_to_string(path).map_err(|source| TrafficError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_har_str(&content).map_err(|source| TrafficError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Writes the log to disk as HAR
    ///
    /// The document is written to a sibling temporary file and renamed into
    /// place so readers never observe a partially written log.
    pub fn save(&self, path: &Path) -> Result<(), TrafficError> {
        let content = self.to_har_string()?;

        let mut tmp_name = path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        tmp_name.push(".tmp");
        let tmp_path = path.with_file_name(tmp_name);

        let write_err = |source| TrafficError::Write {
            path: path.to_path_buf(),
            source,
        };
        std::fs::write(&tmp_path, content).map_err(write_err)?;
        std::fs::rename(&tmp_path, path).map_err(write_err)?;
        Ok(())
    }
}

impl FromIterator<TrafficEntry> for TrafficLog {
    fn from_iter<I: IntoIterator<Item = TrafficEntry>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}
