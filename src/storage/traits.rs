//! Checkpoint store trait and error types

use crate::config::crawl_fingerprint;
use crate::state::Frontier;
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Errors that can occur during checkpoint operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Corrupt checkpoint: {0}")]
    Corrupt(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Identifies which crawl a checkpoint belongs to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckpointKey {
    pub start_url: String,
    pub fingerprint: String,
}

impl CheckpointKey {
    /// Builds the key for a crawl of `start_url` bounded by `max_depth`
    pub fn new(start_url: &str, max_depth: u32) -> Self {
        Self {
            start_url: start_url.to_string(),
            fingerprint: crawl_fingerprint(start_url, max_depth),
        }
    }
}

/// A checkpoint read back from durable storage
#[derive(Debug, Clone)]
pub struct Checkpoint {
    pub key: CheckpointKey,
    pub frontier: Frontier,
    pub saved_at: Option<DateTime<Utc>>,
}

/// Durable storage for a crawl frontier
///
/// The crawler writes the full frontier after every processed URL and
/// clears it once the frontier is exhausted.
pub trait CheckpointStore {
    /// Reads the stored checkpoint, `None` if nothing was saved
    fn load(&mut self) -> StorageResult<Option<Checkpoint>>;

    /// Replaces the stored checkpoint with the given frontier
    fn save(&mut self, key: &CheckpointKey, frontier: &Frontier) -> StorageResult<()>;

    /// Removes the stored checkpoint entirely
    fn clear(&mut self) -> StorageResult<()>;
}
