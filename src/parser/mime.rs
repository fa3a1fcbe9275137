//! MIME extraction: reduce a raw message to the flat list of body parts
//! stored in the JSON document.
//!
//! Uses `mail-parser` internally, with a lossy fallback for messages it
//! cannot parse at all. Extraction is best-effort and never fails: a part
//! whose transfer encoding cannot be decoded keeps its raw bytes and an
//! `undecoded` flag instead of being dropped.

use base64::Engine;
use mail_parser::{MessageParser, MimeHeaders, PartType};
use tracing::debug;

use crate::model::message::BodyPart;

/// The result of body extraction: the parts plus an optional degradation
/// reason when something had to be salvaged rather than parsed.
#[derive(Debug)]
pub struct ExtractedPayload {
    pub parts: Vec<BodyPart>,
    pub degraded: Option<String>,
}

/// Extract the body parts of a message (envelope line already removed).
pub fn extract_payload(message_bytes: &[u8]) -> ExtractedPayload {
    match MessageParser::default().parse(message_bytes) {
        Some(msg) => {
            let mut parts = Vec::new();
            let mut undecoded_parts = 0usize;

            for (idx, part) in msg.parts.iter().enumerate() {
                if part.is_encoding_problem {
                    undecoded_parts += 1;
                }
                match &part.body {
                    PartType::Multipart(_) => continue,
                    // When the transfer encoding cannot be decoded, mail-parser
                    // hands back the raw bytes as text with the problem flag set.
                    // Keep them as an undecoded binary part instead of pretending
                    // they are readable text.
                    PartType::Text(raw) | PartType::Html(raw) if part.is_encoding_problem => {
                        parts.push(undecoded_binary(part, raw.as_bytes(), idx));
                    }
                    PartType::Text(text) => parts.push(BodyPart::Text {
                        content_type: part_content_type(part, "text/plain"),
                        charset: "utf-8".to_string(),
                        text: text.to_string(),
                    }),
                    PartType::Html(html) => parts.push(BodyPart::Text {
                        content_type: part_content_type(part, "text/html"),
                        charset: "utf-8".to_string(),
                        text: html.to_string(),
                    }),
                    PartType::Binary(data) | PartType::InlineBinary(data) => {
                        parts.push(BodyPart::Binary {
                            content_type: part_content_type(part, "application/octet-stream"),
                            filename: part
                                .attachment_name()
                                .map(String::from)
                                .unwrap_or_else(|| format!("attachment_{idx}")),
                            size: data.len() as u64,
                            data_b64: base64::engine::general_purpose::STANDARD.encode(data),
                            undecoded: part.is_encoding_problem,
                        });
                    }
                    PartType::Message(nested) => parts.push(BodyPart::Binary {
                        content_type: "message/rfc822".to_string(),
                        filename: part
                            .attachment_name()
                            .map(String::from)
                            .unwrap_or_else(|| format!("attachment_{idx}.eml")),
                        size: nested.raw_message.len() as u64,
                        data_b64: base64::engine::general_purpose::STANDARD
                            .encode(nested.raw_message.as_ref()),
                        undecoded: false,
                    }),
                }
            }

            let degraded = if undecoded_parts > 0 {
                Some(format!(
                    "{undecoded_parts} part(s) with undecodable transfer encoding"
                ))
            } else {
                None
            };
            ExtractedPayload { parts, degraded }
        }
        None => {
            debug!("mail-parser could not parse message, storing lossy body");
            let body = extract_body_fallback(message_bytes);
            let parts = if body.is_empty() {
                Vec::new()
            } else {
                vec![BodyPart::Text {
                    content_type: "text/plain".to_string(),
                    charset: "utf-8".to_string(),
                    text: body,
                }]
            };
            ExtractedPayload {
                parts,
                degraded: Some("unparseable MIME structure".to_string()),
            }
        }
    }
}

/// A part whose transfer encoding could not be decoded: stored verbatim as
/// binary so nothing is lost, flagged for downstream consumers.
fn undecoded_binary(part: &mail_parser::MessagePart<'_>, raw: &[u8], idx: usize) -> BodyPart {
    BodyPart::Binary {
        content_type: part_content_type(part, "application/octet-stream"),
        filename: part
            .attachment_name()
            .map(String::from)
            .unwrap_or_else(|| format!("attachment_{idx}")),
        size: raw.len() as u64,
        data_b64: base64::engine::general_purpose::STANDARD.encode(raw),
        undecoded: true,
    }
}

/// Full `type/subtype` of a part, with a default when the header is absent.
fn part_content_type(part: &mail_parser::MessagePart<'_>, default: &str) -> String {
    part.content_type()
        .map(|ct| {
            let main = ct.ctype();
            match ct.subtype() {
                Some(sub) => format!("{main}/{sub}"),
                None => main.to_string(),
            }
        })
        .unwrap_or_else(|| default.to_string())
}

/// Fallback body extraction when `mail-parser` cannot parse the message:
/// everything after the first blank line, decoded lossily.
fn extract_body_fallback(data: &[u8]) -> String {
    let text = String::from_utf8_lossy(data);
    if let Some(pos) = text.find("\n\n") {
        text[pos + 2..].to_string()
    } else if let Some(pos) = text.find("\r\n\r\n") {
        text[pos + 4..].to_string()
    } else {
        String::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_plain_text() {
        let raw = b"From: a@b.com\nSubject: Hi\nContent-Type: text/plain\n\nHello world\n";
        let payload = extract_payload(raw);
        assert!(payload.degraded.is_none());
        assert_eq!(payload.parts.len(), 1);
        match &payload.parts[0] {
            BodyPart::Text { content_type, text, .. } => {
                assert_eq!(content_type, "text/plain");
                assert!(text.contains("Hello world"));
            }
            _ => panic!("expected text part"),
        }
    }

    #[test]
    fn test_extract_multipart_with_attachment() {
        let raw = b"From: a@b.com\nSubject: Files\nMIME-Version: 1.0\n\
Content-Type: multipart/mixed; boundary=\"XYZ\"\n\n\
--XYZ\nContent-Type: text/plain\n\nSee attached.\n\
--XYZ\nContent-Type: application/pdf; name=\"doc.pdf\"\n\
Content-Disposition: attachment; filename=\"doc.pdf\"\n\
Content-Transfer-Encoding: base64\n\n\
JVBERi0xLjQ=\n\
--XYZ--\n";
        let payload = extract_payload(raw);
        let has_text = payload.parts.iter().any(|p| {
            matches!(p, BodyPart::Text { text, .. } if text.contains("See attached"))
        });
        assert!(has_text, "text part missing: {:?}", payload.parts);
        let attachment = payload.parts.iter().find_map(|p| match p {
            BodyPart::Binary {
                filename,
                content_type,
                data_b64,
                undecoded,
                ..
            } => Some((filename, content_type, data_b64, undecoded)),
            _ => None,
        });
        let (filename, content_type, data_b64, undecoded) =
            attachment.expect("attachment part missing");
        assert_eq!(filename, "doc.pdf");
        assert_eq!(content_type, "application/pdf");
        assert!(!undecoded);
        let decoded = base64::engine::general_purpose::STANDARD
            .decode(data_b64)
            .unwrap();
        assert_eq!(decoded, b"%PDF-1.4");
    }

    #[test]
    fn test_undecodable_attachment_kept_as_binary() {
        let raw = b"From: a@b.com\nSubject: Broken\nMIME-Version: 1.0\n\
Content-Type: multipart/mixed; boundary=\"XYZ\"\n\n\
--XYZ\nContent-Type: text/plain\n\nBody here.\n\
--XYZ\nContent-Type: application/octet-stream; name=\"blob.bin\"\n\
Content-Disposition: attachment; filename=\"blob.bin\"\n\
Content-Transfer-Encoding: base64\n\n\
!!!this is not base64 at all!!!\n\
--XYZ--\n";
        let payload = extract_payload(raw);
        let blob = payload
            .parts
            .iter()
            .find_map(|p| match p {
                BodyPart::Binary {
                    filename,
                    data_b64,
                    undecoded,
                    ..
                } if filename == "blob.bin" => Some((data_b64, undecoded)),
                _ => None,
            })
            .expect("undecodable attachment missing from payload");
        let (data_b64, undecoded) = blob;
        assert!(*undecoded, "encoding problem must be flagged");
        let raw_bytes = base64::engine::general_purpose::STANDARD
            .decode(data_b64)
            .unwrap();
        let raw_text = String::from_utf8_lossy(&raw_bytes);
        assert!(
            raw_text.contains("!!!this is not base64 at all!!!"),
            "raw encoded bytes must be preserved, got: {raw_text}"
        );
        assert_eq!(
            payload.degraded.as_deref(),
            Some("1 part(s) with undecodable transfer encoding")
        );
    }

    #[test]
    fn test_extract_body_fallback() {
        let raw = b"Subject: Hi\n\nplain body\n";
        assert_eq!(extract_body_fallback(raw), "plain body\n");
        assert_eq!(extract_body_fallback(b"no blank line"), "");
    }
}
