//! Identity and dedup resolution.
//!
//! Decides, per normalized message, whether it is new, an update to an
//! existing row, or an exact duplicate to skip. This three-way decision is
//! what makes re-running the importer over a growing or re-exported archive
//! safe and cheap: unchanged messages cost one indexed lookup, not a rewrite.

use rusqlite::OptionalExtension;

use crate::error::Result;
use crate::store::Store;

/// The write decision for one normalized message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportDecision {
    /// No row with this message id exists yet.
    Insert,
    /// A row exists with different content; replace its document and
    /// timestamp, keep its surrogate id.
    UpdateInPlace { id: i64 },
    /// A row exists with byte-identical content; nothing to write.
    SkipDuplicate,
}

impl Store {
    /// Resolve the decision for `message_id` against the current store
    /// state. Duplicate means byte-identical `as_json` — the simplest
    /// deterministic rule consistent with idempotent re-import.
    pub fn resolve(&self, message_id: &str, as_json: &str) -> Result<ImportDecision> {
        let mut stmt = self
            .conn()
            .prepare_cached("SELECT id, as_json FROM emails WHERE message_id = ?1")?;
        let existing = stmt
            .query_row([message_id], |row| {
                Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
            })
            .optional()?;

        Ok(match existing {
            None => ImportDecision::Insert,
            Some((_, stored)) if stored == as_json => ImportDecision::SkipDuplicate,
            Some((id, _)) => ImportDecision::UpdateInPlace { id },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn insert(store: &Store, message_id: &str, as_json: &str) {
        store
            .conn()
            .execute(
                "INSERT INTO emails (message_id, as_json, received_at) VALUES (?1, ?2, NULL)",
                [message_id, as_json],
            )
            .unwrap();
    }

    #[test]
    fn test_unknown_id_is_insert() {
        let store = Store::open_in_memory().unwrap();
        let decision = store.resolve("<new@x>", "{}").unwrap();
        assert_eq!(decision, ImportDecision::Insert);
    }

    #[test]
    fn test_identical_content_is_skip() {
        let store = Store::open_in_memory().unwrap();
        insert(&store, "<a@x>", r#"{"headers":{},"payload":[]}"#);
        let decision = store
            .resolve("<a@x>", r#"{"headers":{},"payload":[]}"#)
            .unwrap();
        assert_eq!(decision, ImportDecision::SkipDuplicate);
    }

    #[test]
    fn test_changed_content_is_update_with_same_id() {
        let store = Store::open_in_memory().unwrap();
        insert(&store, "<a@x>", r#"{"headers":{},"payload":[]}"#);
        let id: i64 = store
            .conn()
            .query_row("SELECT id FROM emails WHERE message_id = '<a@x>'", [], |r| {
                r.get(0)
            })
            .unwrap();
        let decision = store
            .resolve("<a@x>", r#"{"headers":{"Subject":["changed"]},"payload":[]}"#)
            .unwrap();
        assert_eq!(decision, ImportDecision::UpdateInPlace { id });
    }
}
