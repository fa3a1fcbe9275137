//! Schema management: create-if-absent, compatibility check, late indexing.
//!
//! `subject` is a virtual generated column over the JSON document — a
//! read-time projection, never independently writable, so the document
//! stays the single source of truth.

use rusqlite::Connection;
use tracing::{debug, info};

use crate::error::{ImportError, Result};

const CREATE_TABLE_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS emails (
  id          INTEGER PRIMARY KEY AUTOINCREMENT,
  message_id  TEXT UNIQUE NOT NULL,
  as_json     TEXT NOT NULL,
  received_at TEXT,
  subject     TEXT GENERATED ALWAYS AS
                (json_extract(as_json, '$.headers.Subject[0]')) VIRTUAL
);
"#;

const CREATE_VIEW_SQL: &str = r#"
CREATE VIEW IF NOT EXISTS email_overview AS
SELECT id,
       message_id,
       received_at,
       json_extract(as_json, '$.headers.Date[0]') AS date_header
FROM emails;
"#;

/// Expected `(name, type)` pairs from `PRAGMA table_xinfo(emails)`.
const EXPECTED_COLUMNS: [(&str, &str); 5] = [
    ("id", "INTEGER"),
    ("message_id", "TEXT"),
    ("as_json", "TEXT"),
    ("received_at", "TEXT"),
    ("subject", "TEXT"),
];

/// Ensure the table and the overview view exist. Idempotent. An existing
/// table with a different column set/types is a fatal [`ImportError::Schema`]
/// — never auto-migrated.
pub fn ensure_schema(conn: &Connection) -> Result<()> {
    check_compatible(conn)?;
    conn.execute_batch(CREATE_TABLE_SQL)?;
    conn.execute_batch(CREATE_VIEW_SQL)?;
    debug!("Schema ensured");
    Ok(())
}

/// Create the index on `received_at` if absent. Run after the import pass.
pub fn finalize_index(conn: &Connection) -> Result<()> {
    let existed: bool = conn.query_row(
        "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type = 'index' AND name = 'idx_emails_received_at'",
        [],
        |row| row.get(0),
    )?;
    conn.execute_batch("CREATE INDEX IF NOT EXISTS idx_emails_received_at ON emails(received_at);")?;
    if !existed {
        info!("Created index idx_emails_received_at");
    }
    Ok(())
}

/// Verify an existing `emails` table matches the expected column layout.
/// A missing table is fine (it will be created).
fn check_compatible(conn: &Connection) -> Result<()> {
    // table_xinfo (not table_info) so the generated column is visible too.
    let mut stmt = conn.prepare("PRAGMA table_xinfo(emails)")?;
    let columns: Vec<(String, String)> = stmt
        .query_map([], |row| {
            Ok((row.get::<_, String>(1)?, row.get::<_, String>(2)?))
        })?
        .collect::<std::result::Result<_, _>>()?;

    if columns.is_empty() {
        return Ok(());
    }

    let actual: Vec<(&str, &str)> = columns
        .iter()
        .map(|(n, t)| (n.as_str(), t.as_str()))
        .collect();
    if actual != EXPECTED_COLUMNS {
        return Err(ImportError::Schema {
            reason: format!(
                "existing 'emails' table has columns {actual:?}, expected {EXPECTED_COLUMNS:?}"
            ),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ensure_schema_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        ensure_schema(&conn).unwrap();
        ensure_schema(&conn).unwrap();
        finalize_index(&conn).unwrap();
        finalize_index(&conn).unwrap();
    }

    #[test]
    fn test_subject_is_projected_from_json() {
        let conn = Connection::open_in_memory().unwrap();
        ensure_schema(&conn).unwrap();
        conn.execute(
            "INSERT INTO emails (message_id, as_json, received_at) VALUES (?1, ?2, ?3)",
            rusqlite::params![
                "<a@b>",
                r#"{"headers":{"Subject":["Projected!"]},"payload":[]}"#,
                "2024-01-04 10:00:00"
            ],
        )
        .unwrap();
        let subject: String = conn
            .query_row("SELECT subject FROM emails WHERE message_id = '<a@b>'", [], |r| {
                r.get(0)
            })
            .unwrap();
        assert_eq!(subject, "Projected!");
    }

    #[test]
    fn test_overview_view_exposes_date_header() {
        let conn = Connection::open_in_memory().unwrap();
        ensure_schema(&conn).unwrap();
        conn.execute(
            "INSERT INTO emails (message_id, as_json, received_at) VALUES (?1, ?2, ?3)",
            rusqlite::params![
                "<a@b>",
                r#"{"headers":{"Date":["Thu, 04 Jan 2024 10:00:00 +0000"]},"payload":[]}"#,
                "2024-01-04 10:00:00"
            ],
        )
        .unwrap();
        let date: String = conn
            .query_row("SELECT date_header FROM email_overview", [], |r| r.get(0))
            .unwrap();
        assert_eq!(date, "Thu, 04 Jan 2024 10:00:00 +0000");
    }

    #[test]
    fn test_incompatible_table_is_rejected() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE emails (id INTEGER PRIMARY KEY, body TEXT);")
            .unwrap();
        let err = ensure_schema(&conn).unwrap_err();
        assert!(matches!(err, ImportError::Schema { .. }), "got {err:?}");
    }
}
