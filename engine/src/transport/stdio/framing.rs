//! Newline framing for the child's stdout
//!
//! Stdout arrives as arbitrary chunks. Bytes are buffered until a full line is
//! present; only complete lines are handed out for parsing.

use tracing::warn;

/// Upper bound on bytes buffered without seeing a newline
pub const MAX_BUFFERED_BYTES: usize = 8 * 1024 * 1024;

#[derive(Debug, Default)]
pub struct LineBuffer {
    buf: Vec<u8>,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk exactly as it was read.
    pub fn push(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);

        if self.buf.len() > MAX_BUFFERED_BYTES && !self.buf.contains(&b'\n') {
            warn!(
                buffered = self.buf.len(),
                "Discarding oversized partial line from tool process"
            );
            self.buf.clear();
        }
    }

    /// Next complete, non-blank line without its terminator.
    ///
    /// Returns `None` while only a partial line is buffered.
    pub fn next_line(&mut self) -> Option<String> {
        loop {
            let newline = self.buf.iter().position(|b| *b == b'\n')?;
            let mut line: Vec<u8> = self.buf.drain(..=newline).collect();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }

            let text = String::from_utf8_lossy(&line).trim().to_string();
            if !text.is_empty() {
                return Some(text);
            }
        }
    }

    /// Bytes of the current partial line
    pub fn pending(&self) -> usize {
        self.buf.len()
    }
}
