//! Incremental receive-until-complete framing for a byte stream.
//!
//! # Why framing is needed (for beginners)
//!
//! TCP delivers a stream of bytes, not a sequence of messages.  A single
//! `read` call may return half a message, exactly one message, or one message
//! plus the start of the next.  The header `length` field tells us how many
//! bytes belong to the current message, so the accumulator:
//!
//! 1. Appends whatever the socket returned.
//! 2. Waits until at least the 8-byte header is present.
//! 3. Reads `length` (big-endian) and waits until that many bytes are present.
//! 4. Cuts exactly `length` bytes off the front and decodes them.
//!
//! Bytes beyond the frame stay in the accumulator for the next call.

use tracing::trace;

use crate::protocol::codec::{decode_message, ProtocolError, DEFAULT_CAPACITY, HEADER_SIZE};
use crate::protocol::messages::Message;

/// Collects raw bytes and yields complete [`Message`]s.
#[derive(Debug)]
pub struct FrameAccumulator {
    buf: Vec<u8>,
    capacity: usize,
}

impl FrameAccumulator {
    /// Creates an accumulator accepting frames up to [`DEFAULT_CAPACITY`].
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Creates an accumulator accepting frames up to `capacity` bytes.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity.min(DEFAULT_CAPACITY)),
            capacity,
        }
    }

    /// Appends bytes as returned by one socket read.
    pub fn push(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Number of bytes currently buffered.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Header `length` of the pending frame, once the header has arrived.
    pub fn expected_len(&self) -> Option<usize> {
        let raw: [u8; 4] = self.buf.get(..4)?.try_into().ok()?;
        if self.buf.len() < HEADER_SIZE {
            return None;
        }
        Some(u32::from_be_bytes(raw) as usize)
    }

    /// Extracts the next complete message, if one is buffered.
    ///
    /// Returns `Ok(None)` while the frame is still incomplete.
    ///
    /// # Errors
    ///
    /// - [`ProtocolError::InvalidLength`] when the header declares fewer bytes
    ///   than the header itself or more than the capacity.  The stream cannot
    ///   be resynchronised after this; the caller should drop the connection.
    /// - Any decode error for a complete but malformed frame.  The frame is
    ///   consumed, so the accumulator stays aligned on the next one.
    pub fn next_message(&mut self) -> Result<Option<Message>, ProtocolError> {
        let Some(length) = self.expected_len() else {
            trace!(buffered = self.buf.len(), "waiting for frame header");
            return Ok(None);
        };
        if length < HEADER_SIZE || length > self.capacity {
            return Err(ProtocolError::InvalidLength {
                declared: length,
                minimum: HEADER_SIZE,
                maximum: self.capacity,
            });
        }
        if self.buf.len() < length {
            trace!(buffered = self.buf.len(), expected = length, "partial frame");
            return Ok(None);
        }

        let frame: Vec<u8> = self.buf.drain(..length).collect();
        let (msg, _) = decode_message(&frame)?;
        Ok(Some(msg))
    }

    /// Drops any buffered bytes, e.g. after a reconnect.
    pub fn reset(&mut self) {
        self.buf.clear();
    }
}

impl Default for FrameAccumulator {
    fn default() -> Self {
        Self::new()
    }
}
