//! Database schema migrations.
//!
//! Applies the initial schema: the generic record table shared by the event
//! and credential tables, the delay queue, and its dead-letter table.

use rusqlite::Connection;
use tracing::info;

use rearm_core::error::RearmError;

/// Run all pending database migrations.
pub fn run_migrations(conn: &Connection) -> Result<(), RearmError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version     INTEGER PRIMARY KEY NOT NULL,
            name        TEXT NOT NULL,
            applied_at  INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
        );",
    )
    .map_err(|e| RearmError::Storage(format!("Failed to create migrations table: {}", e)))?;

    let current_version: i64 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
            [],
            |row| row.get(0),
        )
        .map_err(|e| RearmError::Storage(format!("Failed to query migration version: {}", e)))?;

    if current_version < 1 {
        apply_v1(conn)?;
        info!("Applied migration v1: initial_schema");
    }

    Ok(())
}

/// Version 1: Initial schema.
fn apply_v1(conn: &Connection) -> Result<(), RearmError> {
    conn.execute_batch(
        "
        -- Latest value per (logical table, user). Overwritten in place.
        CREATE TABLE IF NOT EXISTS records (
            tbl         TEXT NOT NULL,
            id          TEXT NOT NULL,
            value       TEXT NOT NULL,
            updated_at  TEXT NOT NULL,
            PRIMARY KEY (tbl, id)
        );

        -- Delay queue. A row is deliverable once visible_at (unix ms) has passed.
        CREATE TABLE IF NOT EXISTS delayed_messages (
            id              TEXT PRIMARY KEY NOT NULL,
            attributes      TEXT NOT NULL,
            body            TEXT NOT NULL DEFAULT '',
            visible_at      INTEGER NOT NULL,
            receive_count   INTEGER NOT NULL DEFAULT 0,
            receipt         TEXT,
            enqueued_at     INTEGER NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_delayed_messages_visible
            ON delayed_messages (visible_at ASC);

        CREATE TABLE IF NOT EXISTS dead_letters (
            id              TEXT PRIMARY KEY NOT NULL,
            attributes      TEXT NOT NULL,
            body            TEXT NOT NULL DEFAULT '',
            receive_count   INTEGER NOT NULL,
            reason          TEXT NOT NULL,
            dead_at         INTEGER NOT NULL
        );

        INSERT INTO schema_migrations (version, name) VALUES (1, 'initial_schema');
        ",
    )
    .map_err(|e| RearmError::Storage(format!("Migration v1 failed: {}", e)))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migrations_are_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        run_migrations(&conn).unwrap();

        let version: i64 = conn
            .query_row("SELECT MAX(version) FROM schema_migrations", [], |row| {
                row.get(0)
            })
            .unwrap();
        assert_eq!(version, 1);
    }

    #[test]
    fn test_records_primary_key_is_table_and_id() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        conn.execute(
            "INSERT INTO records (tbl, id, value, updated_at) VALUES ('events', 'u1', '{}', 'now')",
            [],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO records (tbl, id, value, updated_at) VALUES ('credentials_listener', 'u1', '{}', 'now')",
            [],
        )
        .unwrap();
        let dup = conn.execute(
            "INSERT INTO records (tbl, id, value, updated_at) VALUES ('events', 'u1', '{}', 'now')",
            [],
        );
        assert!(dup.is_err());
    }
}
