//! Checkpoint database schema

/// SQL schema for the checkpoint database
pub const SCHEMA_SQL: &str = r#"
-- Which crawl this checkpoint belongs to
CREATE TABLE IF NOT EXISTS checkpoint_meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);

-- URLs already processed
CREATE TABLE IF NOT EXISTS visited (
    url TEXT PRIMARY KEY
);

-- Pending work in FIFO order
CREATE TABLE IF NOT EXISTS frontier (
    position INTEGER PRIMARY KEY,
    url TEXT NOT NULL,
    depth INTEGER NOT NULL
);
"#;

/// Initializes the database schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    #[test]
    fn test_schema_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        initialize_schema(&conn).unwrap();
        assert!(initialize_schema(&conn).is_ok());
    }

    #[test]
    fn test_tables_exist_after_init() {
        let conn = Connection::open_in_memory().unwrap();
        initialize_schema(&conn).unwrap();

        for table in ["checkpoint_meta", "visited", "frontier"] {
            let count: i64 = conn
                .query_row(
                    "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name=?1",
                    [table],
                    |row| row.get(0),
                )
                .unwrap();
            assert_eq!(count, 1, "Table {} should exist", table);
        }
    }
}
