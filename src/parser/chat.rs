//! Google Chat message support.
//!
//! Takeout archives mix chat transcripts in with email. Chat messages carry
//! an `X-Gmail-Labels: Chat` label and no useful `Date` header; their real
//! timestamp lives inside a `text/xml` payload, in one of three places
//! depending on the export era: a `google:internal` epoch-millis attribute,
//! a `jabber:x:delay` stamp, or a `google:timestamp` element.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use regex::Regex;
use std::sync::OnceLock;
use tracing::warn;

use crate::model::message::BodyPart;

/// Whether the `X-Gmail-Labels` header value marks a chat message.
pub fn is_chat_message(labels_header: Option<&str>) -> bool {
    labels_header
        .map(|raw| raw.split(',').any(|label| label.trim() == "Chat"))
        .unwrap_or(false)
}

/// Pull the conversation timestamp out of a chat message's XML payload.
///
/// Returns `None` (with a warning) when no recognizable timestamp is found;
/// the message is then stored with a NULL `received_at` like any other
/// undated message.
pub fn extract_chat_timestamp(parts: &[BodyPart]) -> Option<DateTime<Utc>> {
    for part in parts {
        let xml = match part {
            BodyPart::Text {
                content_type, text, ..
            } if content_type.starts_with("text/xml") => text,
            _ => continue,
        };

        // Newer exports: <cli:message ... int:time-stamp="1156545342995">
        if let Some(caps) = re_epoch_millis().captures(xml) {
            if let Some(dt) = caps.get(1).and_then(|m| millis_to_utc(m.as_str())) {
                return Some(dt);
            }
        }

        // Jabber offline-delay stamp: <x xmlns="jabber:x:delay" stamp="20060825T22:15:42"/>
        if let Some(caps) = re_jabber_stamp().captures(xml) {
            if let Some(m) = caps.get(1) {
                if let Ok(ndt) = NaiveDateTime::parse_from_str(m.as_str(), "%Y%m%dT%H:%M:%S") {
                    return Some(Utc.from_utc_datetime(&ndt));
                }
            }
        }

        // Oldest exports: <time:time ms="1156545342995"/>
        if let Some(caps) = re_google_ms().captures(xml) {
            if let Some(dt) = caps.get(1).and_then(|m| millis_to_utc(m.as_str())) {
                return Some(dt);
            }
        }
    }

    warn!("No usable timestamp in chat payload");
    None
}

fn millis_to_utc(s: &str) -> Option<DateTime<Utc>> {
    let ms: i64 = s.parse().ok()?;
    Utc.timestamp_millis_opt(ms).single()
}

fn re_epoch_millis() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"time-stamp="(\d+)""#).expect("valid regex"))
}

fn re_jabber_stamp() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"stamp="(\d{8}T\d{2}:\d{2}:\d{2})""#).expect("valid regex"))
}

fn re_google_ms() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"\bms="(\d+)""#).expect("valid regex"))
}
