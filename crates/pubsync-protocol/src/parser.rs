//! Line framing for poll requests

use crate::error::{ProtocolError, ProtocolResult};
use crate::request::Frame;
use bytes::BytesMut;

/// Maximum buffered request size (1MB)
pub const MAX_MESSAGE_SIZE: usize = 1024 * 1024;

/// Incremental request parser
pub struct Parser {
    buffer: BytesMut,
}

impl Parser {
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::with_capacity(4096),
        }
    }

    /// Add data to the parser buffer
    pub fn feed(&mut self, data: &[u8]) -> ProtocolResult<()> {
        if self.buffer.len() + data.len() > MAX_MESSAGE_SIZE {
            return Err(ProtocolError::MessageTooLarge {
                size: self.buffer.len() + data.len(),
                max: MAX_MESSAGE_SIZE,
            });
        }
        self.buffer.extend_from_slice(data);
        Ok(())
    }

    /// Try to parse one complete frame from the buffer.
    ///
    /// Blank lines are skipped. A malformed line is consumed before the
    /// error is returned, so the caller can keep reading.
    pub fn parse(&mut self) -> ProtocolResult<Option<Frame>> {
        loop {
            let line_end = match self.buffer.iter().position(|&b| b == b'\n') {
                Some(pos) => pos,
                None => return Ok(None),
            };

            let line = self.buffer.split_to(line_end + 1);
            let text = String::from_utf8_lossy(&line);
            let text = text.trim();
            if text.is_empty() {
                continue;
            }

            return Frame::decode(text).map(Some);
        }
    }

    /// Bytes waiting for a line terminator
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Clear the buffer
    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}

impl Default for Parser {
    fn default() -> Self {
        Self::new()
    }
}
