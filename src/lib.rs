//! `mboxstore` — import Gmail Takeout MBOX archives into SQLite.
//!
//! This crate provides the core ingestion engine: a streaming MBOX reader,
//! a total (never-failing) message normalizer, stable message identity with
//! cross-run deduplication, and a batched transactional SQLite writer.
//! Re-importing the same or a grown archive is idempotent: unchanged
//! messages cost a lookup, changed ones are updated in place.

pub mod config;
pub mod error;
pub mod import;
pub mod model;
pub mod normalize;
pub mod parser;
pub mod store;
