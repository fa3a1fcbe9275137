//! Message normalization: one raw MBOX block in, one [`NormalizedMessage`]
//! out. Total — malformed input degrades, it never fails.

use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::model::message::{MessageDoc, NormalizedMessage, ParseOutcome};
use crate::parser::chat;
use crate::parser::header;
use crate::parser::mbox::RawBlock;
use crate::parser::mime;

/// Number of body bytes mixed into a synthesized message id. Enough to
/// distinguish real-world messages with identical headers, small enough to
/// stay cheap on huge attachments.
const ID_DIGEST_BODY_BYTES: usize = 4096;

/// Stateful normalizer for one import run.
///
/// The only state is the set of ids seen this run, used to disambiguate
/// synthesized-id collisions. Identical archives replay identically, so the
/// disambiguating suffixes are themselves stable across runs.
pub struct Normalizer {
    seen_ids: std::collections::HashSet<String>,
}

impl Normalizer {
    pub fn new() -> Self {
        Self {
            seen_ids: std::collections::HashSet::new(),
        }
    }

    /// Normalize one raw block.
    pub fn normalize(&mut self, block: &RawBlock) -> NormalizedMessage {
        let message = header::skip_envelope_line(&block.bytes);
        let (header_bytes, body_bytes) = header::split_at_headers(message);

        let header_text = header::decode_header_bytes(header_bytes);
        let raw_headers = header::unfold_headers(&header_text);

        // Ordered map name -> [values], duplicates accumulated in order.
        let mut headers = serde_json::Map::new();
        for (name, value) in &raw_headers {
            let decoded = Value::String(header::decode_encoded_words(value));
            let entry = headers
                .entry(name.clone())
                .or_insert_with(|| Value::Array(Vec::new()));
            if let Value::Array(values) = entry {
                values.push(decoded);
            }
        }

        let extracted = mime::extract_payload(message);

        // Labels can arrive RFC 2047-encoded; decode before matching.
        let labels = header::get_header(&raw_headers, "X-Gmail-Labels")
            .map(header::decode_encoded_words);
        let received_at = if chat::is_chat_message(labels.as_deref()) {
            debug!(offset = block.offset, "Google Chat message");
            chat::extract_chat_timestamp(&extracted.parts)
        } else {
            header::get_header(&raw_headers, "Date").and_then(header::parse_date)
        };

        let (message_id, synthesized_id) =
            self.resolve_message_id(&raw_headers, &header_text, body_bytes, block.offset);

        let outcome = match extracted.degraded {
            Some(reason) => ParseOutcome::Partial { reason },
            None => ParseOutcome::Full,
        };

        let doc = MessageDoc {
            headers,
            payload: extracted.parts,
        };
        let as_json = match serde_json::to_string(&doc) {
            Ok(json) => json,
            Err(e) => {
                // Unreachable for this document shape, but normalization
                // must stay total.
                warn!(offset = block.offset, error = %e, "Could not serialize message document");
                String::from(r#"{"headers":{},"payload":[]}"#)
            }
        };

        NormalizedMessage {
            message_id,
            synthesized_id,
            received_at,
            as_json,
            outcome,
        }
    }

    /// Use the `Message-ID` header when present and non-empty, otherwise
    /// synthesize a deterministic digest id.
    fn resolve_message_id(
        &mut self,
        raw_headers: &[(String, String)],
        header_text: &str,
        body_bytes: &[u8],
        offset: u64,
    ) -> (String, bool) {
        if let Some(id) = header::get_header(raw_headers, "Message-ID") {
            let id = id.trim();
            if !id.is_empty() {
                self.seen_ids.insert(id.to_string());
                return (id.to_string(), false);
            }
        }

        debug!(offset, "Missing Message-ID, synthesizing digest id");
        let mut hasher = Sha256::new();
        hasher.update(header_text.as_bytes());
        hasher.update(&body_bytes[..body_bytes.len().min(ID_DIGEST_BODY_BYTES)]);
        let digest = format!("{:x}", hasher.finalize());

        // Within-run collision between distinct messages: append a counter
        // suffix. Replays of the same archive hit collisions in the same
        // order, so the suffixed ids are stable too.
        let id = if self.seen_ids.contains(&digest) {
            let mut n = 1usize;
            loop {
                let candidate = format!("{digest}-{n}");
                if !self.seen_ids.contains(&candidate) {
                    break candidate;
                }
                n += 1;
            }
        } else {
            digest
        };
        self.seen_ids.insert(id.clone());
        (id, true)
    }
}

impl Default for Normalizer {
    fn default() -> Self {
        Self::new()
    }
}
