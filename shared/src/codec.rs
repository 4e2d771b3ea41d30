//! Newline-delimited JSON framing for the control channels
//!
//! Every record is one line of JSON terminated by `\n`. Lines longer than
//! `MAX_MESSAGE_BYTES` are refused on both ends. `LineReader` enforces the
//! limit while reading, so an over-long line is never buffered whole.

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::{self, AsyncBufReadExt, AsyncRead, BufReader};

use crate::errors::{SharedError, SharedResult};

/// Size limit for a single encoded record
pub const MAX_MESSAGE_BYTES: usize = 8 * 1024 * 1024;

/// Encode a record as one JSON line, including the trailing newline
pub fn encode_line<T: Serialize>(message: &T) -> SharedResult<String> {
    let mut line = serde_json::to_string(message).map_err(|e| SharedError::SerializationError {
        message: e.to_string(),
    })?;
    if line.len() > MAX_MESSAGE_BYTES {
        return Err(SharedError::MessageTooLarge {
            size: line.len(),
            limit: MAX_MESSAGE_BYTES,
        });
    }
    line.push('\n');
    Ok(line)
}

/// Decode one received line (with or without its trailing newline)
pub fn decode_line<T: DeserializeOwned>(line: &str) -> SharedResult<T> {
    if line.len() > MAX_MESSAGE_BYTES {
        return Err(SharedError::MessageTooLarge {
            size: line.len(),
            limit: MAX_MESSAGE_BYTES,
        });
    }
    serde_json::from_str(line.trim_end()).map_err(|e| SharedError::DeserializationError {
        message: e.to_string(),
    })
}

/// Buffered line reader with a per-line size limit.
///
/// Yields `Ok(line)` without its `\n` (or `\r\n`), and
/// `Err(MessageTooLarge)` for a line longer than the limit. The bytes of an
/// over-long line are discarded as they arrive. `next_line` is cancel safe.
pub struct LineReader<R> {
    reader: BufReader<R>,
    line: Vec<u8>,
    limit: usize,
    skipped: Option<usize>,
}

impl<R: AsyncRead + Unpin> LineReader<R> {
    pub fn new(reader: R) -> Self {
        Self::with_limit(reader, MAX_MESSAGE_BYTES)
    }

    pub fn with_limit(reader: R, limit: usize) -> Self {
        Self {
            reader: BufReader::new(reader),
            line: Vec::new(),
            limit,
            skipped: None,
        }
    }

    /// Read the next line. Returns `None` at EOF.
    pub async fn next_line(&mut self) -> io::Result<Option<SharedResult<String>>> {
        loop {
            let available = self.reader.fill_buf().await?;
            if available.is_empty() {
                return Ok(self.take_line(false));
            }

            let (used, complete) = match available.iter().position(|b| *b == b'\n') {
                Some(end) => (end + 1, true),
                None => (available.len(), false),
            };
            let content = &available[..if complete { used - 1 } else { used }];
            match self.skipped.as_mut() {
                Some(skipped) => *skipped += content.len(),
                None if self.line.len() + content.len() > self.limit => {
                    self.skipped = Some(self.line.len() + content.len());
                    self.line = Vec::new();
                }
                None => self.line.extend_from_slice(content),
            }
            self.reader.consume(used);

            if complete {
                return Ok(self.take_line(true));
            }
        }
    }

    fn take_line(&mut self, terminated: bool) -> Option<SharedResult<String>> {
        if let Some(size) = self.skipped.take() {
            return Some(Err(SharedError::MessageTooLarge {
                size,
                limit: self.limit,
            }));
        }
        if !terminated && self.line.is_empty() {
            return None;
        }
        if self.line.last() == Some(&b'\r') {
            self.line.pop();
        }
        let line = String::from_utf8_lossy(&self.line).into_owned();
        self.line.clear();
        Some(Ok(line))
    }

    /// Bytes currently held for a partial line
    pub fn buffered(&self) -> usize {
        self.line.len()
    }
}
