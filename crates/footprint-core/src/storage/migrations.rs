//! Database schema migrations for footprint.
//!
//! Migrations are versioned and applied automatically when opening the database.
//! The `schema_version` table tracks the current migration version.

use rusqlite::{Connection, Result as SqliteResult};

/// Current schema version.
pub const SCHEMA_VERSION: i32 = 2;

/// Apply all pending migrations to bring the database to the current schema version.
///
/// # Errors
/// Returns an error if migration fails.
pub fn migrate(conn: &Connection) -> SqliteResult<()> {
    create_schema_version_table(conn)?;

    let current_version = get_schema_version(conn);

    if current_version < 1 {
        migrate_v1(conn)?;
    }
    if current_version < 2 {
        migrate_v2(conn)?;
    }

    Ok(())
}

fn create_schema_version_table(conn: &Connection) -> SqliteResult<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY
        );",
    )
}

/// Get the current schema version from the database.
///
/// Returns 0 if no version is set (initial database).
pub fn get_schema_version(conn: &Connection) -> i32 {
    conn.query_row("SELECT version FROM schema_version", [], |row| {
        row.get::<_, i32>(0)
    })
    .unwrap_or_else(|e| {
        if !matches!(e, rusqlite::Error::QueryReturnedNoRows) {
            tracing::warn!("failed to read schema_version: {e}");
        }
        0
    })
}

fn set_schema_version(conn: &Connection, version: i32) -> SqliteResult<()> {
    conn.execute("DELETE FROM schema_version", [])?;
    conn.execute("INSERT INTO schema_version (version) VALUES (?1)", [version])?;
    Ok(())
}

/// Migration v1: base tables.
///
/// Dates are `YYYY-MM-DD` text so range predicates compare lexicographically.
fn migrate_v1(conn: &Connection) -> SqliteResult<()> {
    let tx = conn.unchecked_transaction()?;

    tx.execute_batch(
        "CREATE TABLE IF NOT EXISTS refs (
            id         INTEGER PRIMARY KEY AUTOINCREMENT,
            category   TEXT NOT NULL,
            code       TEXT,
            label      TEXT NOT NULL,
            created_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS actions (
            id           INTEGER PRIMARY KEY AUTOINCREMENT,
            action_type  TEXT NOT NULL,
            category     TEXT NOT NULL,
            reference_id INTEGER NOT NULL REFERENCES refs(id),
            label        TEXT NOT NULL,
            UNIQUE (action_type, category, reference_id)
        );

        CREATE TABLE IF NOT EXISTS recurrence_rules (
            id             INTEGER PRIMARY KEY AUTOINCREMENT,
            action_id      INTEGER NOT NULL REFERENCES actions(id),
            params         TEXT NOT NULL,
            active         INTEGER NOT NULL DEFAULT 1,
            interval_count INTEGER NOT NULL,
            interval_unit  TEXT NOT NULL,
            start_date     TEXT NOT NULL,
            end_date       TEXT
        );

        CREATE TABLE IF NOT EXISTS ledger_entries (
            id           INTEGER PRIMARY KEY AUTOINCREMENT,
            action_id    INTEGER NOT NULL REFERENCES actions(id),
            rule_id      INTEGER,
            params       TEXT NOT NULL,
            emissions_kg REAL,
            entry_date   TEXT NOT NULL,
            created_at   TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS suspensions (
            id         INTEGER PRIMARY KEY AUTOINCREMENT,
            rule_id    INTEGER NOT NULL UNIQUE,
            start_date TEXT NOT NULL,
            end_date   TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_ledger_rule_date ON ledger_entries(rule_id, entry_date);
        CREATE INDEX IF NOT EXISTS idx_ledger_action_date ON ledger_entries(action_id, entry_date);",
    )?;

    tx.execute("DELETE FROM schema_version", [])?;
    tx.execute("INSERT INTO schema_version (version) VALUES (?1)", [1])?;
    tx.commit()?;
    Ok(())
}

/// Migration v2: one rule-originated entry per action and date.
///
/// Drops any duplicates already present (keeping the oldest row) before the
/// unique index is created.
fn migrate_v2(conn: &Connection) -> SqliteResult<()> {
    let tx = conn.unchecked_transaction()?;

    let removed = tx.execute(
        "DELETE FROM ledger_entries
         WHERE rule_id IS NOT NULL
           AND id NOT IN (
               SELECT MIN(id) FROM ledger_entries
               WHERE rule_id IS NOT NULL
               GROUP BY action_id, entry_date
           )",
        [],
    )?;
    if removed > 0 {
        tracing::info!(removed, "dropped duplicate rule-originated ledger entries");
    }

    tx.execute(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_ledger_rule_unique
         ON ledger_entries(action_id, entry_date)
         WHERE rule_id IS NOT NULL",
        [],
    )?;

    set_schema_version(&tx, 2)?;
    tx.commit()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migrate_from_scratch() {
        let conn = Connection::open_in_memory().unwrap();
        migrate(&conn).unwrap();
        assert_eq!(get_schema_version(&conn), SCHEMA_VERSION);

        for table in ["refs", "actions", "recurrence_rules", "ledger_entries", "suspensions"] {
            let count: i64 = conn
                .query_row(
                    "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
                    [table],
                    |row| row.get(0),
                )
                .unwrap();
            assert_eq!(count, 1, "missing table {table}");
        }
    }

    #[test]
    fn test_migrate_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        migrate(&conn).unwrap();
        migrate(&conn).unwrap();
        assert_eq!(get_schema_version(&conn), SCHEMA_VERSION);
    }

    /// A v1 database holding duplicates (written before the unique index
    /// existed) is cleaned up by v2.
    #[test]
    fn test_v2_removes_duplicate_rule_entries() {
        let conn = Connection::open_in_memory().unwrap();
        create_schema_version_table(&conn).unwrap();
        migrate_v1(&conn).unwrap();

        let insert = "INSERT INTO ledger_entries (action_id, rule_id, params, emissions_kg, entry_date, created_at)
                      VALUES (?1, ?2, '{}', 1.0, ?3, '2025-01-01T00:00:00+00:00')";
        conn.execute(insert, rusqlite::params![1, 1, "2025-01-01"]).unwrap();
        conn.execute(insert, rusqlite::params![1, 1, "2025-01-01"]).unwrap();
        conn.execute(insert, rusqlite::params![1, Option::<i64>::None, "2025-01-01"]).unwrap();
        conn.execute(insert, rusqlite::params![1, Option::<i64>::None, "2025-01-01"]).unwrap();

        migrate(&conn).unwrap();
        assert_eq!(get_schema_version(&conn), 2);

        let rule_rows: i64 = conn
            .query_row("SELECT COUNT(*) FROM ledger_entries WHERE rule_id IS NOT NULL", [], |row| row.get(0))
            .unwrap();
        let manual_rows: i64 = conn
            .query_row("SELECT COUNT(*) FROM ledger_entries WHERE rule_id IS NULL", [], |row| row.get(0))
            .unwrap();
        assert_eq!(rule_rows, 1);
        assert_eq!(manual_rows, 2);

        let dup = conn.execute(insert, rusqlite::params![1, 1, "2025-01-01"]);
        assert!(dup.is_err());
    }
}
