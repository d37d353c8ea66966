//! Storage module for persisting crawl checkpoints
//!
//! A checkpoint records the visited set and the ordered frontier so that an
//! interrupted crawl can resume where it stopped. It is written after every
//! processed URL and deleted when a crawl completes with an empty frontier.

mod schema;
mod sqlite;
mod traits;

pub use sqlite::SqliteCheckpoint;
pub use traits::{Checkpoint, CheckpointKey, CheckpointStore, StorageError, StorageResult};
