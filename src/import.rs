//! The import pipeline: reader → normalizer → resolver → writer.
//!
//! One run walks the states
//! `SchemaEnsured → Reading → (Normalize → Resolve → Write)* → IndexFinalized`.
//! Single-threaded and cooperative: one block is fully consumed before the
//! next is read. Fatal errors (archive I/O, incompatible schema) abort the
//! run; everything already committed stays visible, nothing else does.

use std::path::Path;

use tracing::{debug, info};

use crate::error::Result;
use crate::model::message::ParseOutcome;
use crate::normalize::Normalizer;
use crate::parser::mbox::MboxReader;
use crate::store::writer::{RunReport, StoreWriter, DEFAULT_BATCH_SIZE};
use crate::store::Store;

/// Tunables for one run, usually taken from [`crate::config::Config`].
#[derive(Debug, Clone)]
pub struct ImportOptions {
    /// Rows per transaction.
    pub batch_size: usize,
    /// Per-message size ceiling in bytes.
    pub max_message_size: usize,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            max_message_size: 256 * 1024 * 1024,
        }
    }
}

/// Import `archive` into the SQLite database at `db_path`.
///
/// Idempotent: re-running over the same or a grown archive skips unchanged
/// messages and updates changed ones in place. The optional progress
/// callback receives `(bytes_reached, file_size)`.
pub fn run_import(
    archive: &Path,
    db_path: &Path,
    options: &ImportOptions,
    progress: Option<&dyn Fn(u64, u64)>,
) -> Result<RunReport> {
    info!(
        archive = %archive.display(),
        db = %db_path.display(),
        "Starting import"
    );

    // Schema is ensured (and compatibility checked) before any read.
    let mut store = Store::open(db_path)?;

    let reader = MboxReader::open_with_limit(archive, options.max_message_size)?;
    let file_size = reader.file_size();

    let mut normalizer = Normalizer::new();
    let mut writer = StoreWriter::new(&mut store, options.batch_size);

    for block in reader {
        let block = block?;
        if let Some(cb) = progress {
            cb(block.offset, file_size);
        }

        let msg = normalizer.normalize(&block);
        if let ParseOutcome::Partial { reason } = &msg.outcome {
            debug!(
                message_id = %msg.message_id,
                offset = block.offset,
                reason = %reason,
                "Stored best-effort record for partially parsed message"
            );
        }

        let decision = writer.resolve(&msg.message_id, &msg.as_json)?;
        writer.push(decision, &msg)?;
    }

    let report = writer.finish()?;
    store.finalize_index()?;

    if let Some(cb) = progress {
        cb(file_size, file_size);
    }
    info!(
        processed = report.processed,
        inserted = report.inserted,
        updated = report.updated,
        skipped = report.skipped,
        failed = report.failed,
        "Import complete"
    );
    Ok(report)
}
