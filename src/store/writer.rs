//! Batched transactional writer.
//!
//! Decisions accumulate into a bounded batch committed as one transaction.
//! A failed batch rolls back and is replayed one row per transaction to
//! isolate the offender; a row that still fails is counted and skipped,
//! never fatal to the run.

use rusqlite::{params, Connection};
use tracing::{debug, warn};

use crate::error::{ImportError, Result};
use crate::model::message::NormalizedMessage;
use crate::store::resolve::ImportDecision;
use crate::store::Store;

/// Default rows per transaction. Large enough to amortize commit overhead
/// on multi-gigabyte archives, small enough to bound lost work on interrupt.
pub const DEFAULT_BATCH_SIZE: usize = 500;

/// Cumulative counters for one run, returned by [`StoreWriter::finish`].
/// An explicit value, not process-global state, so concurrent test runs
/// cannot interfere.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    /// Messages that passed through the pipeline.
    pub processed: u64,
    /// New rows.
    pub inserted: u64,
    /// Rows replaced in place.
    pub updated: u64,
    /// Exact duplicates, not written.
    pub skipped: u64,
    /// Rows that failed even the isolating retry.
    pub failed: u64,
}

impl RunReport {
    /// Rows actually written this run.
    pub fn changed(&self) -> u64 {
        self.inserted + self.updated
    }
}

#[derive(Debug)]
enum RowKind {
    Insert,
    Update { id: i64 },
}

#[derive(Debug)]
struct PendingRow {
    kind: RowKind,
    message_id: String,
    as_json: String,
    received_at: Option<String>,
}

/// Accumulates resolved rows and owns all transaction boundaries.
pub struct StoreWriter<'a> {
    store: &'a mut Store,
    batch: Vec<PendingRow>,
    batch_size: usize,
    report: RunReport,
}

impl<'a> StoreWriter<'a> {
    pub fn new(store: &'a mut Store, batch_size: usize) -> Self {
        Self {
            store,
            batch: Vec::with_capacity(batch_size.max(1)),
            batch_size: batch_size.max(1),
            report: RunReport::default(),
        }
    }

    /// Resolve a decision, seeing both committed rows and the pending batch.
    ///
    /// Archives can contain the same message twice; the store lookup alone
    /// would miss a copy still sitting unflushed in the batch and run into
    /// the UNIQUE constraint at commit time. An identical pending row is a
    /// skip; a differing one forces a flush so the store lookup decides.
    pub fn resolve(&mut self, message_id: &str, as_json: &str) -> Result<ImportDecision> {
        if let Some(pending) = self.batch.iter().find(|r| r.message_id == message_id) {
            if pending.as_json == as_json {
                return Ok(ImportDecision::SkipDuplicate);
            }
            self.flush()?;
        }
        self.store.resolve(message_id, as_json)
    }

    /// Queue one decision; flushes automatically when the batch fills.
    pub fn push(&mut self, decision: ImportDecision, msg: &NormalizedMessage) -> Result<()> {
        self.report.processed += 1;
        match decision {
            ImportDecision::SkipDuplicate => {
                self.report.skipped += 1;
                return Ok(());
            }
            ImportDecision::Insert => self.batch.push(PendingRow {
                kind: RowKind::Insert,
                message_id: msg.message_id.clone(),
                as_json: msg.as_json.clone(),
                received_at: msg.received_at_sql(),
            }),
            ImportDecision::UpdateInPlace { id } => self.batch.push(PendingRow {
                kind: RowKind::Update { id },
                message_id: msg.message_id.clone(),
                as_json: msg.as_json.clone(),
                received_at: msg.received_at_sql(),
            }),
        }
        if self.batch.len() >= self.batch_size {
            self.flush()?;
        }
        Ok(())
    }

    /// Commit the pending batch as a single transaction, falling back to
    /// row-at-a-time on failure.
    pub fn flush(&mut self) -> Result<()> {
        if self.batch.is_empty() {
            return Ok(());
        }
        let batch = std::mem::take(&mut self.batch);
        debug!(rows = batch.len(), "Committing batch");

        match commit_rows(self.store.conn_mut(), &batch) {
            Ok(()) => self.count_written(&batch),
            Err(e) => {
                warn!(
                    error = %e,
                    rows = batch.len(),
                    "Batch commit failed, retrying rows individually"
                );
                for row in &batch {
                    match commit_rows(self.store.conn_mut(), std::slice::from_ref(row)) {
                        Ok(()) => self.count_written(std::slice::from_ref(row)),
                        Err(e) => {
                            self.report.failed += 1;
                            let err = ImportError::RowWrite {
                                message_id: row.message_id.clone(),
                                reason: e.to_string(),
                            };
                            warn!(error = %err, "Row skipped");
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// Flush the tail and hand back the run counters.
    pub fn finish(mut self) -> Result<RunReport> {
        self.flush()?;
        Ok(self.report)
    }

    fn count_written(&mut self, rows: &[PendingRow]) {
        for row in rows {
            match row.kind {
                RowKind::Insert => self.report.inserted += 1,
                RowKind::Update { .. } => self.report.updated += 1,
            }
        }
    }
}

/// Apply a set of rows inside one transaction. Rolls back on any error.
fn commit_rows(conn: &mut Connection, rows: &[PendingRow]) -> rusqlite::Result<()> {
    let tx = conn.transaction()?;
    for row in rows {
        match row.kind {
            RowKind::Insert => {
                tx.execute(
                    "INSERT INTO emails (message_id, as_json, received_at) VALUES (?1, ?2, ?3)",
                    params![row.message_id, row.as_json, row.received_at],
                )?;
            }
            RowKind::Update { id } => {
                tx.execute(
                    "UPDATE emails SET as_json = ?2, received_at = ?3 WHERE id = ?1",
                    params![id, row.as_json, row.received_at],
                )?;
            }
        }
    }
    tx.commit()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::message::ParseOutcome;

    // The generated subject column evaluates json_extract on INSERT, so
    // fixture documents must be well-formed JSON.
    fn doc(subject: &str) -> String {
        format!(r#"{{"headers":{{"Subject":["{subject}"]}},"payload":[]}}"#)
    }

    fn msg(id: &str, json: &str) -> NormalizedMessage {
        NormalizedMessage {
            message_id: id.to_string(),
            synthesized_id: false,
            received_at: None,
            as_json: json.to_string(),
            outcome: ParseOutcome::Full,
        }
    }

    #[test]
    fn test_insert_and_autoflush() {
        let mut store = Store::open_in_memory().unwrap();
        let mut writer = StoreWriter::new(&mut store, 2);
        writer.push(ImportDecision::Insert, &msg("<a@x>", "{}")).unwrap();
        writer.push(ImportDecision::Insert, &msg("<b@x>", "{}")).unwrap();
        // Batch size 2: both rows are committed already.
        writer.push(ImportDecision::SkipDuplicate, &msg("<a@x>", "{}")).unwrap();
        let report = writer.finish().unwrap();
        assert_eq!(report.processed, 3);
        assert_eq!(report.inserted, 2);
        assert_eq!(report.skipped, 1);
        assert_eq!(report.failed, 0);
        assert_eq!(store.message_count().unwrap(), 2);
    }

    #[test]
    fn test_update_preserves_surrogate_id() {
        let mut store = Store::open_in_memory().unwrap();
        let mut writer = StoreWriter::new(&mut store, 10);
        writer.push(ImportDecision::Insert, &msg("<a@x>", &doc("v1"))).unwrap();
        writer.flush().unwrap();
        let id: i64 = store
            .conn()
            .query_row("SELECT id FROM emails WHERE message_id = '<a@x>'", [], |r| r.get(0))
            .unwrap();

        let mut writer = StoreWriter::new(&mut store, 10);
        writer
            .push(ImportDecision::UpdateInPlace { id }, &msg("<a@x>", &doc("v2")))
            .unwrap();
        let report = writer.finish().unwrap();
        assert_eq!(report.updated, 1);

        let (same_id, json): (i64, String) = store
            .conn()
            .query_row(
                "SELECT id, as_json FROM emails WHERE message_id = '<a@x>'",
                [],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )
            .unwrap();
        assert_eq!(same_id, id);
        assert_eq!(json, doc("v2"));
    }

    #[test]
    fn test_failed_batch_retries_row_by_row() {
        let mut store = Store::open_in_memory().unwrap();
        let mut writer = StoreWriter::new(&mut store, 10);
        // Two inserts with the same message id violate UNIQUE inside one
        // batch; the retry isolates and keeps the first.
        writer.push(ImportDecision::Insert, &msg("<dup@x>", &doc("first"))).unwrap();
        writer.push(ImportDecision::Insert, &msg("<dup@x>", &doc("second"))).unwrap();
        let report = writer.finish().unwrap();
        assert_eq!(report.inserted, 1);
        assert_eq!(report.failed, 1);
        assert_eq!(store.message_count().unwrap(), 1);

        let json: String = store
            .conn()
            .query_row("SELECT as_json FROM emails", [], |r| r.get(0))
            .unwrap();
        assert_eq!(json, doc("first"));
    }

    #[test]
    fn test_failed_batch_does_not_lose_prior_batches() {
        let mut store = Store::open_in_memory().unwrap();
        let mut writer = StoreWriter::new(&mut store, 1);
        writer.push(ImportDecision::Insert, &msg("<ok@x>", "{}")).unwrap();
        // Committed already (batch size 1). Now a failing row:
        writer.push(ImportDecision::Insert, &msg("<ok@x>", &doc("again"))).unwrap();
        let report = writer.finish().unwrap();
        assert_eq!(report.inserted, 1);
        assert_eq!(report.failed, 1);
        assert_eq!(store.message_count().unwrap(), 1);
    }
}
