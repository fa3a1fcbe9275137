//! Streaming MBOX reader.
//!
//! Reads the archive line-by-line with a large buffer and yields one
//! [`RawBlock`] per message, split strictly on the `From ` envelope
//! convention. Never loads the entire file into memory. Tolerant of
//! malformed input: boundaries are the only thing it validates.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use tracing::warn;

use crate::error::{ImportError, Result};

/// Size of the internal read buffer (1 MB for fast sequential reads).
const READ_BUFFER_SIZE: usize = 1024 * 1024;

/// Default maximum message size in bytes (256 MB). Larger messages are
/// truncated with a warning rather than failing the run.
const MAX_MESSAGE_SIZE: usize = 256 * 1024 * 1024;

/// One archive entry: everything from an envelope line up to the next one
/// (or EOF), envelope line included. Opaque to the reader; the normalizer
/// owns interpretation.
#[derive(Debug, Clone)]
pub struct RawBlock {
    /// Byte offset of the block start within the archive.
    pub offset: u64,
    /// The raw bytes, verbatim, including the envelope line.
    pub bytes: Vec<u8>,
}

/// Streaming MBOX reader.
///
/// Implements `Iterator<Item = Result<RawBlock>>` over a single forward pass
/// of the file; re-reading requires reopening. Tolerant of:
///
/// - Mixed `\n` and `\r\n` line endings
/// - `From ` lines not preceded by a blank line (logs a warning, splits anyway)
/// - Truncated messages at EOF
/// - NUL bytes and other binary content in the body
/// - UTF-8 BOM at the start of the file
#[derive(Debug)]
pub struct MboxReader {
    path: PathBuf,
    reader: BufReader<File>,
    file_size: u64,
    max_message_size: usize,
    current_offset: u64,
    pending: Option<(u64, Vec<u8>)>,
    pending_truncated: bool,
    prev_line_was_empty: bool,
    first_line: bool,
    done: bool,
    line_buf: Vec<u8>,
}

impl MboxReader {
    /// Open the archive for a single pass.
    ///
    /// Fails with `FileNotFound` / `Io` if the file is missing or unreadable.
    /// Does NOT validate that the content is actually MBOX.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with_limit(path, MAX_MESSAGE_SIZE)
    }

    /// Open with a custom per-message size ceiling.
    pub fn open_with_limit(path: impl AsRef<Path>, max_message_size: usize) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let metadata = std::fs::metadata(&path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ImportError::FileNotFound(path.clone())
            } else {
                ImportError::io(&path, e)
            }
        })?;
        let file = File::open(&path).map_err(|e| ImportError::io(&path, e))?;
        Ok(Self {
            path,
            reader: BufReader::with_capacity(READ_BUFFER_SIZE, file),
            file_size: metadata.len(),
            max_message_size,
            current_offset: 0,
            pending: None,
            pending_truncated: false,
            prev_line_was_empty: true,
            first_line: true,
            done: false,
            line_buf: Vec::with_capacity(4096),
        })
    }

    /// Total size of the underlying file in bytes.
    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    /// Path to the archive.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read one line (or buffer-bounded fragment) into `line_buf`.
    /// Returns the number of bytes consumed; 0 means EOF.
    fn read_line(&mut self) -> Result<u64> {
        self.line_buf.clear();
        let buf = self
            .reader
            .fill_buf()
            .map_err(|e| ImportError::io(&self.path, e))?;
        if buf.is_empty() {
            return Ok(0);
        }
        let consume_len = match memchr_newline(buf) {
            Some(pos) => pos + 1,
            None => buf.len(),
        };
        self.line_buf.extend_from_slice(&buf[..consume_len]);
        self.reader.consume(consume_len);
        Ok(consume_len as u64)
    }

    /// Fold the current line into the block under construction,
    /// truncating at `max_message_size`.
    fn append_line_to_pending(&mut self) {
        if self.pending.is_none() {
            self.pending = Some((self.current_offset, Vec::with_capacity(64 * 1024)));
        }
        if let Some((start, buf)) = self.pending.as_mut() {
            if buf.len() + self.line_buf.len() <= self.max_message_size {
                buf.extend_from_slice(&self.line_buf);
            } else if !self.pending_truncated {
                warn!(
                    offset = *start,
                    max_size = self.max_message_size,
                    "Message exceeds maximum size, truncating body"
                );
                self.pending_truncated = true;
            }
        }
    }
}

impl Iterator for MboxReader {
    type Item = Result<RawBlock>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        loop {
            let line_len = match self.read_line() {
                Ok(n) => n,
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            };

            if line_len == 0 {
                // EOF: flush the last block, if any.
                self.done = true;
                return self
                    .pending
                    .take()
                    .map(|(offset, bytes)| Ok(RawBlock { offset, bytes }));
            }

            let is_envelope = is_envelope_line(&self.line_buf);
            let mut finished: Option<RawBlock> = None;

            if is_envelope {
                if !self.first_line && !self.prev_line_was_empty {
                    warn!(
                        offset = self.current_offset,
                        "Found 'From ' separator without preceding blank line"
                    );
                }
                finished = self
                    .pending
                    .take()
                    .map(|(offset, bytes)| RawBlock { offset, bytes });
                let mut buf = Vec::with_capacity(64 * 1024);
                buf.extend_from_slice(&self.line_buf);
                self.pending = Some((self.current_offset, buf));
                self.pending_truncated = false;
            } else if self.pending.is_some() || !is_blank_line(&self.line_buf) {
                // Preamble before the first envelope line is kept verbatim
                // and surfaces as a block of its own at the first separator.
                self.append_line_to_pending();
            }

            self.prev_line_was_empty = is_blank_line(&self.line_buf);
            self.first_line = false;
            self.current_offset += line_len;

            if let Some(block) = finished {
                if !block.bytes.is_empty() {
                    return Some(Ok(block));
                }
            }
        }
    }
}

/// Fast newline search (equivalent to memchr for `\n`).
#[inline]
fn memchr_newline(buf: &[u8]) -> Option<usize> {
    buf.iter().position(|&b| b == b'\n')
}

/// Check whether a line is an MBOX envelope separator (`From ` at the start).
fn is_envelope_line(line: &[u8]) -> bool {
    // Skip BOM if present at very start
    let line = if line.starts_with(&[0xEF, 0xBB, 0xBF]) {
        &line[3..]
    } else {
        line
    };
    line.starts_with(b"From ")
}

/// Check whether a line is blank (empty or only whitespace / CR / LF).
fn is_blank_line(line: &[u8]) -> bool {
    line.iter()
        .all(|&b| b == b'\n' || b == b'\r' || b == b' ' || b == b'\t')
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn reader_for(content: &[u8]) -> MboxReader {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(content).unwrap();
        let (_, path) = tmp.keep().unwrap();
        MboxReader::open(path).unwrap()
    }

    #[test]
    fn test_is_envelope_line() {
        assert!(is_envelope_line(
            b"From user@example.com Thu Jan 01 00:00:00 2024\n"
        ));
        assert!(!is_envelope_line(b"from user@example.com\n")); // lowercase
        assert!(!is_envelope_line(b">From user@example.com\n")); // escaped
        assert!(!is_envelope_line(b"Subject: From here\n"));
    }

    #[test]
    fn test_is_blank_line() {
        assert!(is_blank_line(b"\n"));
        assert!(is_blank_line(b"\r\n"));
        assert!(is_blank_line(b"  \n"));
        assert!(!is_blank_line(b"hello\n"));
    }

    #[test]
    fn test_is_envelope_line_with_bom() {
        let mut line = vec![0xEF, 0xBB, 0xBF];
        line.extend_from_slice(b"From user@example.com Thu Jan 01 00:00:00 2024\n");
        assert!(is_envelope_line(&line));
    }

    #[test]
    fn test_splits_two_messages() {
        let mbox = b"From a@b.com Thu Jan 01 00:00:00 2024\n\
            Subject: One\n\nbody one\n\n\
            From c@d.com Thu Jan 02 00:00:00 2024\n\
            Subject: Two\n\nbody two\n";
        let blocks: Vec<RawBlock> = reader_for(mbox).map(|b| b.unwrap()).collect();
        assert_eq!(blocks.len(), 2);
        assert!(blocks[0].bytes.starts_with(b"From a@b.com"));
        assert!(blocks[1].bytes.starts_with(b"From c@d.com"));
        assert_eq!(blocks[0].offset, 0);
        assert_eq!(blocks[1].offset, blocks[0].bytes.len() as u64);
    }

    #[test]
    fn test_escaped_from_stays_in_body() {
        let mbox = b"From a@b.com Thu Jan 01 00:00:00 2024\n\
            Subject: One\n\nsome text\n>From quoted line\nmore\n";
        let blocks: Vec<RawBlock> = reader_for(mbox).map(|b| b.unwrap()).collect();
        assert_eq!(blocks.len(), 1);
        assert!(blocks[0].bytes.windows(6).any(|w| w == b">From "));
    }

    #[test]
    fn test_separator_without_blank_line_still_splits() {
        let mbox = b"From a@b.com Thu Jan 01 00:00:00 2024\n\
            Subject: One\n\nbody\n\
            From c@d.com Thu Jan 02 00:00:00 2024\n\
            Subject: Two\n\nbody\n";
        let blocks: Vec<RawBlock> = reader_for(mbox).map(|b| b.unwrap()).collect();
        assert_eq!(blocks.len(), 2);
    }

    #[test]
    fn test_empty_file_yields_nothing() {
        let mut reader = reader_for(b"");
        assert!(reader.next().is_none());
    }

    #[test]
    fn test_truncated_final_message() {
        let mbox = b"From a@b.com Thu Jan 01 00:00:00 2024\nSubject: Cut off";
        let blocks: Vec<RawBlock> = reader_for(mbox).map(|b| b.unwrap()).collect();
        assert_eq!(blocks.len(), 1);
        assert!(blocks[0].bytes.ends_with(b"Cut off"));
    }

    #[test]
    fn test_missing_file() {
        let err = MboxReader::open("/nonexistent/archive.mbox").unwrap_err();
        assert!(matches!(err, ImportError::FileNotFound(_)));
    }
}
