//! SQLite checkpoint implementation

use crate::state::Frontier;
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{
    Checkpoint, CheckpointKey, CheckpointStore, StorageError, StorageResult,
};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};

/// Checkpoint stored in a single SQLite file
///
/// The database is opened lazily so that a store pointing at a missing file
/// does not create one until the first save.
pub struct SqliteCheckpoint {
    path: PathBuf,
    conn: Option<Connection>,
}

impl SqliteCheckpoint {
    /// Creates a store backed by the file at `path`
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            conn: None,
        }
    }

    /// Path of the backing database file
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn connection(&mut self) -> StorageResult<&mut Connection> {
        let conn = match self.conn.take() {
            Some(conn) => conn,
            None => open_connection(&self.path)?,
        };
        Ok(self.conn.insert(conn))
    }

    fn read_meta(conn: &Connection, key: &str) -> StorageResult<Option<String>> {
        let value = conn
            .query_row(
                "SELECT value FROM checkpoint_meta WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }
}

fn open_connection(path: &Path) -> StorageResult<Connection> {
    let conn = Connection::open(path)?;
    conn.execute_batch(
        "
        PRAGMA journal_mode = DELETE;
        PRAGMA synchronous = FULL;
    ",
    )?;
    initialize_schema(&conn)?;
    Ok(conn)
}

impl CheckpointStore for SqliteCheckpoint {
    fn load(&mut self) -> StorageResult<Option<Checkpoint>> {
        if self.conn.is_none() && !self.path.exists() {
            return Ok(None);
        }
        let conn = self.connection()?;

        let fingerprint = Self::read_meta(conn, "fingerprint")?;
        let start_url = Self::read_meta(conn, "start_url")?;
        let (Some(fingerprint), Some(start_url)) = (fingerprint, start_url) else {
            return Ok(None);
        };

        let saved_at = Self::read_meta(conn, "saved_at")?
            .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
            .map(|dt| dt.with_timezone(&Utc));

        let visited = conn
            .prepare("SELECT url FROM visited ORDER BY rowid")?
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;

        let queue = conn
            .prepare("SELECT url, depth FROM frontier ORDER BY position")?
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?
            .collect::<Result<Vec<_>, _>>()?
            .into_iter()
            .map(|(url, depth)| {
                u32::try_from(depth)
                    .map(|depth| (url, depth))
                    .map_err(|_| StorageError::Corrupt(format!("negative depth {}", depth)))
            })
            .collect::<StorageResult<Vec<_>>>()?;

        Ok(Some(Checkpoint {
            key: CheckpointKey {
                start_url,
                fingerprint,
            },
            frontier: Frontier::restore(visited, queue),
            saved_at,
        }))
    }

    fn save(&mut self, key: &CheckpointKey, frontier: &Frontier) -> StorageResult<()> {
        let conn = self.connection()?;
        let tx = conn.transaction()?;

        tx.execute_batch(
            "DELETE FROM checkpoint_meta; DELETE FROM visited; DELETE FROM frontier;",
        )?;

        {
            let mut meta =
                tx.prepare("INSERT INTO checkpoint_meta (key, value) VALUES (?1, ?2)")?;
            meta.execute(params!["start_url", key.start_url])?;
            meta.execute(params!["fingerprint", key.fingerprint])?;
            meta.execute(params!["saved_at", Utc::now().to_rfc3339()])?;

            let mut visited = tx.prepare("INSERT OR IGNORE INTO visited (url) VALUES (?1)")?;
            for url in frontier.visited() {
                visited.execute(params![url])?;
            }

            let mut queue =
                tx.prepare("INSERT INTO frontier (position, url, depth) VALUES (?1, ?2, ?3)")?;
            for (position, (url, depth)) in frontier.queued().enumerate() {
                queue.execute(params![position as i64, url, depth])?;
            }
        }

        tx.commit()?;
        Ok(())
    }

    fn clear(&mut self) -> StorageResult<()> {
        if let Some(conn) = self.conn.take() {
            conn.close().map_err(|(_, e)| StorageError::Sqlite(e))?;
        }

        match std::fs::remove_file(&self.path) {
            Ok(()) => {
                tracing::debug!("Removed checkpoint {}", self.path.display());
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
