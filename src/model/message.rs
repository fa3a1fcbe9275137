//! Normalized message types.
//!
//! A [`NormalizedMessage`] is the unit flowing through the pipeline: one raw
//! MBOX block reduced to a stable identity, a UTC receipt timestamp, and a
//! self-contained JSON document that is the durable payload in the store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The structured document persisted as the `as_json` column.
///
/// `headers` is an ordered map of header name to the list of values seen for
/// that name, in archive order (serde_json is built with `preserve_order`, so
/// insertion order survives serialization and deserialization). `payload` is
/// the flat, document-order list of body parts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageDoc {
    pub headers: serde_json::Map<String, serde_json::Value>,
    pub payload: Vec<BodyPart>,
}

impl MessageDoc {
    /// First value of a header, by exact name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(name)
            .and_then(|v| v.as_array())
            .and_then(|a| a.first())
            .and_then(|v| v.as_str())
    }
}

/// One leaf of the message body, in document order.
///
/// Multipart containers are not represented; only their leaves are, which is
/// all a read-only consumer needs to reconstruct text and attachments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BodyPart {
    /// A decoded text part (`text/plain`, `text/html`, `text/xml`, ...).
    Text {
        content_type: String,
        charset: String,
        text: String,
    },
    /// An attachment or other binary part. `data_b64` is the base64 of the
    /// *decoded* content — unless `undecoded` is set, in which case the
    /// declared transfer encoding could not be applied and `data_b64` holds
    /// the raw bytes as found in the archive.
    Binary {
        content_type: String,
        filename: String,
        size: u64,
        data_b64: String,
        #[serde(default)]
        undecoded: bool,
    },
}

/// How completely the normalizer understood the raw block.
///
/// Normalization is total: malformed input degrades to `Partial` with a
/// best-effort record, it never fails the run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseOutcome {
    /// The MIME structure parsed cleanly.
    Full,
    /// Something was salvaged rather than parsed.
    Partial { reason: String },
}

/// The canonical in-memory unit produced by the normalizer.
#[derive(Debug, Clone)]
pub struct NormalizedMessage {
    /// Unique within the store. From the `Message-ID` header when present,
    /// otherwise a deterministic digest so re-imports reproduce it.
    pub message_id: String,

    /// Whether `message_id` was synthesized rather than taken from a header.
    pub synthesized_id: bool,

    /// Receipt time in UTC, from the `Date` header (or the embedded chat
    /// timestamp for Google Chat messages). `None` if unparsable.
    pub received_at: Option<DateTime<Utc>>,

    /// The serialized [`MessageDoc`] — the durable payload.
    pub as_json: String,

    /// Degradation marker for callers and tests.
    pub outcome: ParseOutcome,
}

impl NormalizedMessage {
    /// Format used for the `received_at` column (UTC, sorts lexically).
    pub const SQLITE_DATE_FORMAT: &'static str = "%Y-%m-%d %H:%M:%S";

    /// `received_at` rendered for the store, if present.
    pub fn received_at_sql(&self) -> Option<String> {
        self.received_at
            .map(|dt| dt.format(Self::SQLITE_DATE_FORMAT).to_string())
    }
}
