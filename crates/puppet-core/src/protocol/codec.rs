//! Binary codec for encoding and decoding Puppet protocol messages.
//!
//! Wire format:
//! ```text
//! [length:4][entry_count:4][offset_0:4]..[offset_n-1:4][string_0\0]..[string_n-1\0]
//! ```
//! Header size: 8 bytes.  Header and offset-table integers are big-endian on
//! the wire and host-endian while a message is being built.  Every offset is
//! measured from the first byte of the message.
//!
//! # Two ways to encode (for beginners)
//!
//! [`encode_message`] turns a whole [`Message`] into bytes in one call.  The
//! lower-level [`MessageBuffer`] exposes the individual steps the transport
//! uses on its shared send buffer:
//!
//! 1. [`MessageBuffer::encode_header`] reserves the header and an offset table
//!    sized for the *final* number of entries.  The offset table sits in front
//!    of the strings, so the count must be known before the first string is
//!    written.
//! 2. [`MessageBuffer::append_string`] writes one string, records its offset,
//!    and keeps `length` / `entry_count` in the header up to date.
//! 3. [`MessageBuffer::to_wire`] swaps the integer fields to network order
//!    exactly once before the bytes go out.
//!
//! The buffer has a hard maximum size.  Writing past it is reported as
//! [`ProtocolError::CapacityExceeded`] and leaves no partial message behind.

use std::fmt;

use thiserror::Error;

use crate::protocol::messages::Message;

/// Size of the `length` + `entry_count` header in bytes.
pub const HEADER_SIZE: usize = 8;

/// Size of one offset-table slot in bytes.
pub const OFFSET_ENTRY_SIZE: usize = 4;

/// Default maximum size of one encoded message.
pub const DEFAULT_CAPACITY: usize = 4096;

/// Errors that can occur during message encoding or decoding.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProtocolError {
    /// The byte slice is shorter than the message requires.
    #[error("insufficient data: need at least {needed} bytes, got {available}")]
    InsufficientData { needed: usize, available: usize },

    /// Encoding would write past the fixed buffer size.
    #[error("message needs {required} bytes but the buffer holds at most {capacity}")]
    CapacityExceeded { required: usize, capacity: usize },

    /// More strings were appended than the offset table was sized for.
    #[error("offset table reserved for {declared} entries, cannot append entry {index}")]
    OffsetTableFull { declared: usize, index: usize },

    /// The write cursor handed to `append_string` is not where the buffer ends.
    #[error("write cursor at byte {cursor} but buffer ends at byte {end}")]
    CursorMismatch { cursor: usize, end: usize },

    /// A string contains a NUL byte and cannot be NUL-terminated.
    #[error("string contains an interior NUL byte at position {0}")]
    InteriorNul(usize),

    /// The header `length` field is outside the accepted range.
    #[error("declared length {declared} outside accepted range {minimum}..={maximum}")]
    InvalidLength {
        declared: usize,
        minimum: usize,
        maximum: usize,
    },

    /// The offset table or string table is inconsistent.
    #[error("malformed message: {0}")]
    Malformed(String),

    /// `to_wire` / `from_wire` applied in the wrong state.
    #[error("buffer is already in {0} byte order")]
    ByteOrder(ByteOrder),
}

/// Byte order of the integer fields currently held in a [`MessageBuffer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteOrder {
    /// Native order; the buffer can be appended to.
    Host,
    /// Big-endian; the buffer is ready to be written to a socket.
    Network,
}

impl fmt::Display for ByteOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ByteOrder::Host => f.write_str("host"),
            ByteOrder::Network => f.write_str("network"),
        }
    }
}

/// Write position returned by [`MessageBuffer::append_string`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cursor {
    /// Index of the next offset-table slot.
    pub argument_index: usize,
    /// Byte position where the next string starts.
    pub byte_cursor: usize,
}

/// Returns the number of bytes occupied by the header plus an offset table
/// for `entry_count` entries, i.e. where the first string starts.
pub const fn first_byte_offset(entry_count: usize) -> usize {
    HEADER_SIZE + entry_count * OFFSET_ENTRY_SIZE
}

// ── MessageBuffer ─────────────────────────────────────────────────────────────

/// A growable byte buffer with an enforced maximum, holding one message.
#[derive(Debug, Clone)]
pub struct MessageBuffer {
    bytes: Vec<u8>,
    capacity: usize,
    declared: usize,
    order: ByteOrder,
}

impl MessageBuffer {
    /// Creates an empty buffer limited to [`DEFAULT_CAPACITY`] bytes.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Creates an empty buffer limited to `capacity` bytes.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            bytes: Vec::with_capacity(capacity.min(DEFAULT_CAPACITY)),
            capacity,
            declared: 0,
            order: ByteOrder::Host,
        }
    }

    /// Maximum number of bytes one message may occupy.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Current byte order of the integer fields.
    pub fn byte_order(&self) -> ByteOrder {
        self.order
    }

    /// The encoded bytes written so far.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Number of bytes written so far.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Returns `true` if no header has been written.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Discards any content and returns to host byte order.
    pub fn clear(&mut self) {
        self.bytes.clear();
        self.declared = 0;
        self.order = ByteOrder::Host;
    }

    /// Reserves the header and an offset table for `entry_count` strings.
    ///
    /// Any previous content is discarded.  The header starts with
    /// `entry_count = 0` and `length` covering the reserved region.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::CapacityExceeded`] if the reserved region alone
    /// does not fit the buffer.
    pub fn encode_header(&mut self, entry_count: usize) -> Result<Cursor, ProtocolError> {
        let start = first_byte_offset(entry_count);
        if start > self.capacity {
            return Err(ProtocolError::CapacityExceeded {
                required: start,
                capacity: self.capacity,
            });
        }
        self.clear();
        self.bytes.resize(start, 0);
        self.declared = entry_count;
        self.put_u32(0, start as u32);
        self.put_u32(4, 0);
        Ok(Cursor {
            argument_index: 0,
            byte_cursor: start,
        })
    }

    /// Appends `value` plus a NUL terminator at the cursor and records its
    /// offset in the next offset-table slot.
    ///
    /// The header `length` and `entry_count` fields are updated in place.
    /// On error the buffer is left unchanged.
    ///
    /// # Errors
    ///
    /// - [`ProtocolError::ByteOrder`] after `to_wire` has been applied.
    /// - [`ProtocolError::OffsetTableFull`] when every reserved slot is used.
    /// - [`ProtocolError::CursorMismatch`] for a stale cursor.
    /// - [`ProtocolError::InteriorNul`] if `value` contains a NUL byte.
    /// - [`ProtocolError::CapacityExceeded`] if the string does not fit.
    pub fn append_string(&mut self, cursor: Cursor, value: &str) -> Result<Cursor, ProtocolError> {
        if self.order != ByteOrder::Host {
            return Err(ProtocolError::ByteOrder(self.order));
        }
        if cursor.argument_index >= self.declared {
            return Err(ProtocolError::OffsetTableFull {
                declared: self.declared,
                index: cursor.argument_index,
            });
        }
        if cursor.byte_cursor != self.bytes.len() {
            return Err(ProtocolError::CursorMismatch {
                cursor: cursor.byte_cursor,
                end: self.bytes.len(),
            });
        }
        if let Some(pos) = value.bytes().position(|b| b == 0) {
            return Err(ProtocolError::InteriorNul(pos));
        }
        let end = cursor.byte_cursor + value.len() + 1;
        if end > self.capacity {
            return Err(ProtocolError::CapacityExceeded {
                required: end,
                capacity: self.capacity,
            });
        }

        self.bytes.extend_from_slice(value.as_bytes());
        self.bytes.push(0);
        let slot = HEADER_SIZE + cursor.argument_index * OFFSET_ENTRY_SIZE;
        self.put_u32(slot, cursor.byte_cursor as u32);
        self.put_u32(0, end as u32);
        self.put_u32(4, (cursor.argument_index + 1) as u32);

        Ok(Cursor {
            argument_index: cursor.argument_index + 1,
            byte_cursor: end,
        })
    }

    /// Value of the header `length` field, in the current byte order.
    pub fn declared_length(&self) -> Option<usize> {
        self.get_u32(0).map(|v| v as usize)
    }

    /// Value of the header `entry_count` field, in the current byte order.
    pub fn entry_count(&self) -> Option<usize> {
        self.get_u32(4).map(|v| v as usize)
    }

    /// Random access to the `index`-th string and its raw offset.
    ///
    /// Works in either byte order.  Returns `None` when the buffer is empty,
    /// `index` is past `entry_count`, or the slot points outside the message.
    pub fn string_at(&self, index: usize) -> Option<(&str, u32)> {
        if index >= self.entry_count()? {
            return None;
        }
        let offset = self.get_u32(HEADER_SIZE + index * OFFSET_ENTRY_SIZE)?;
        let end = self.declared_length()?.min(self.bytes.len());
        let start = offset as usize;
        if start >= end {
            return None;
        }
        let nul = self.bytes[start..end].iter().position(|&b| b == 0)?;
        let s = std::str::from_utf8(&self.bytes[start..start + nul]).ok()?;
        Some((s, offset))
    }

    /// Converts header and offset-table fields from host to network order.
    ///
    /// String bytes are untouched.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::ByteOrder`] if the buffer is already in
    /// network order; applying the swap twice would corrupt the header.
    pub fn to_wire(&mut self) -> Result<(), ProtocolError> {
        if self.order == ByteOrder::Network {
            return Err(ProtocolError::ByteOrder(ByteOrder::Network));
        }
        let count = self.entry_count().unwrap_or(0);
        self.swap_fields(count, u32::to_be_bytes);
        self.order = ByteOrder::Network;
        Ok(())
    }

    /// Converts header and offset-table fields from network to host order.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::ByteOrder`] if the buffer is already in host
    /// order.
    pub fn from_wire(&mut self) -> Result<(), ProtocolError> {
        if self.order == ByteOrder::Host {
            return Err(ProtocolError::ByteOrder(ByteOrder::Host));
        }
        let count = self.entry_count().unwrap_or(0);
        self.swap_fields(count, u32::to_ne_bytes);
        self.order = ByteOrder::Host;
        Ok(())
    }

    /// Replaces the content with a frame exactly as received from the wire.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::CapacityExceeded`] if `frame` is larger than
    /// the buffer.
    pub fn load_wire(&mut self, frame: &[u8]) -> Result<(), ProtocolError> {
        if frame.len() > self.capacity {
            return Err(ProtocolError::CapacityExceeded {
                required: frame.len(),
                capacity: self.capacity,
            });
        }
        self.clear();
        self.bytes.extend_from_slice(frame);
        self.order = ByteOrder::Network;
        self.declared = self.entry_count().unwrap_or(0);
        Ok(())
    }

    // Reads one u32 in the buffer's current byte order.
    fn get_u32(&self, pos: usize) -> Option<u32> {
        let raw: [u8; 4] = self.bytes.get(pos..pos + 4)?.try_into().ok()?;
        Some(match self.order {
            ByteOrder::Host => u32::from_ne_bytes(raw),
            ByteOrder::Network => u32::from_be_bytes(raw),
        })
    }

    // Writes one host-order u32; only used while building.
    fn put_u32(&mut self, pos: usize, value: u32) {
        self.bytes[pos..pos + 4].copy_from_slice(&value.to_ne_bytes());
    }

    fn swap_fields(&mut self, count: usize, write: fn(u32) -> [u8; 4]) {
        let table_end = first_byte_offset(count).min(self.bytes.len());
        let mut pos = 0;
        while pos + 4 <= table_end {
            let value = self.get_u32(pos).unwrap_or(0);
            self.bytes[pos..pos + 4].copy_from_slice(&write(value));
            pos += 4;
        }
    }
}

impl Default for MessageBuffer {
    fn default() -> Self {
        Self::new()
    }
}

// ── Public API ────────────────────────────────────────────────────────────────

/// Encodes `msg` into `buf`, leaving it in network byte order.
///
/// The message is checked against the buffer's capacity and for interior NUL
/// bytes before the buffer is touched, so a rejected message leaves the
/// previous content intact.
///
/// # Errors
///
/// Returns [`ProtocolError::CapacityExceeded`] or
/// [`ProtocolError::InteriorNul`].
pub fn encode_into(buf: &mut MessageBuffer, msg: &Message) -> Result<(), ProtocolError> {
    check_encodable(msg, buf.capacity())?;

    let mut cursor = buf.encode_header(msg.len())?;
    for entry in msg.entries() {
        cursor = buf.append_string(cursor, entry)?;
    }
    buf.to_wire()
}

/// Encodes a [`Message`] into a network-order byte vector.
///
/// # Errors
///
/// Returns [`ProtocolError`] if the message exceeds [`DEFAULT_CAPACITY`] or
/// contains an unrepresentable string.
///
/// # Examples
///
/// ```rust
/// use puppet_core::protocol::{decode_message, encode_message};
/// use puppet_core::Message;
///
/// let msg = Message::from_parts(["go_online"]);
/// let bytes = encode_message(&msg).unwrap();
/// let (decoded, consumed) = decode_message(&bytes).unwrap();
/// assert_eq!(decoded, msg);
/// assert_eq!(consumed, bytes.len());
/// ```
pub fn encode_message(msg: &Message) -> Result<Vec<u8>, ProtocolError> {
    encode_message_with_capacity(msg, DEFAULT_CAPACITY)
}

/// Like [`encode_message`] with an explicit capacity.
///
/// # Errors
///
/// Returns [`ProtocolError`] if the message exceeds `capacity` or contains an
/// unrepresentable string.
pub fn encode_message_with_capacity(msg: &Message, capacity: usize) -> Result<Vec<u8>, ProtocolError> {
    let mut buf = MessageBuffer::with_capacity(capacity);
    encode_into(&mut buf, msg)?;
    Ok(buf.bytes)
}

/// Decodes one [`Message`] from the beginning of `bytes` (network order).
///
/// Returns the decoded message and the number of bytes consumed (the header
/// `length` field), so the caller can advance their read cursor.
///
/// # Errors
///
/// Returns [`ProtocolError`] if the bytes are truncated or malformed.
pub fn decode_message(bytes: &[u8]) -> Result<(Message, usize), ProtocolError> {
    if bytes.len() < HEADER_SIZE {
        return Err(ProtocolError::InsufficientData {
            needed: HEADER_SIZE,
            available: bytes.len(),
        });
    }

    let length = read_be_u32(bytes, 0) as usize;
    let count = read_be_u32(bytes, 4) as usize;

    let table_end = count
        .checked_mul(OFFSET_ENTRY_SIZE)
        .and_then(|n| n.checked_add(HEADER_SIZE))
        .ok_or_else(|| ProtocolError::Malformed(format!("entry count {count} overflows")))?;
    if length < table_end {
        return Err(ProtocolError::Malformed(format!(
            "length {length} does not cover the offset table for {count} entries"
        )));
    }
    if bytes.len() < length {
        return Err(ProtocolError::InsufficientData {
            needed: length,
            available: bytes.len(),
        });
    }

    let frame = &bytes[..length];
    let mut entries = Vec::with_capacity(count);
    let mut previous_end = table_end;
    for index in 0..count {
        let offset = read_be_u32(frame, HEADER_SIZE + index * OFFSET_ENTRY_SIZE) as usize;
        if offset < previous_end || offset >= length {
            return Err(ProtocolError::Malformed(format!(
                "offset {offset} of entry {index} outside {previous_end}..{length}"
            )));
        }
        let nul = frame[offset..]
            .iter()
            .position(|&b| b == 0)
            .ok_or_else(|| ProtocolError::Malformed(format!("entry {index} is not NUL-terminated")))?;
        let s = std::str::from_utf8(&frame[offset..offset + nul])
            .map_err(|e| ProtocolError::Malformed(format!("entry {index} is not UTF-8: {e}")))?;
        entries.push(s.to_string());
        previous_end = offset + nul + 1;
    }

    Ok((Message::new(entries), length))
}

// ── Utility helpers ───────────────────────────────────────────────────────────

fn check_encodable(msg: &Message, capacity: usize) -> Result<(), ProtocolError> {
    if let Some(pos) = msg
        .entries()
        .iter()
        .find_map(|e| e.bytes().position(|b| b == 0))
    {
        return Err(ProtocolError::InteriorNul(pos));
    }
    let required = msg.encoded_len();
    if required > capacity {
        return Err(ProtocolError::CapacityExceeded { required, capacity });
    }
    Ok(())
}

/// Reads a big-endian u32; callers guarantee `offset + 4 <= buf.len()`.
fn read_be_u32(buf: &[u8], offset: usize) -> u32 {
    u32::from_be_bytes([buf[offset], buf[offset + 1], buf[offset + 2], buf[offset + 3]])
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(msg: &Message) -> Message {
        let encoded = encode_message(msg).expect("encode failed");
        let (decoded, consumed) = decode_message(&encoded).expect("decode failed");
        assert_eq!(consumed, encoded.len(), "consumed bytes should equal total encoded size");
        decoded
    }

    fn offsets_of(bytes: &[u8]) -> Vec<u32> {
        let count = read_be_u32(bytes, 4) as usize;
        (0..count)
            .map(|i| read_be_u32(bytes, HEADER_SIZE + i * OFFSET_ENTRY_SIZE))
            .collect()
    }

    // ── Round trips ──────────────────────────────────────────────────────────

    #[test]
    fn test_command_round_trip() {
        let msg = Message::from_parts(["send_msg_to", "bob@example.org", "hello there"]);
        assert_eq!(round_trip(&msg), msg);
    }

    #[test]
    fn test_empty_strings_round_trip() {
        let msg = Message::from_parts(["", "", "x", ""]);
        assert_eq!(round_trip(&msg), msg);
    }

    #[test]
    fn test_unicode_round_trip() {
        let msg = Message::from_parts(["msg_im_in", "event", "jürgen@example.de", "grüße 👋"]);
        assert_eq!(round_trip(&msg), msg);
    }

    #[test]
    fn test_empty_message_round_trip() {
        let msg = Message::default();
        let bytes = encode_message(&msg).unwrap();
        assert_eq!(bytes, [0, 0, 0, 8, 0, 0, 0, 0]);
        assert_eq!(round_trip(&msg), msg);
    }

    #[test]
    fn test_offsets_strictly_increase() {
        let msg = Message::from_parts(["get_contact_list", "ok", "a", "", "bb"]);
        let bytes = encode_message(&msg).unwrap();
        let offsets = offsets_of(&bytes);
        assert_eq!(offsets.len(), 5);
        assert_eq!(offsets[0] as usize, first_byte_offset(5));
        assert!(offsets.windows(2).all(|w| w[0] < w[1]));
    }

    // ── Header layout ────────────────────────────────────────────────────────

    #[test]
    fn test_header_fields_are_big_endian_on_the_wire() {
        let msg = Message::from_parts(["go_online", "ok"]);
        let bytes = encode_message(&msg).unwrap();
        let length = msg.encoded_len() as u32;

        assert_eq!(&bytes[0..4], &length.to_be_bytes());
        assert_eq!(&bytes[4..8], &2u32.to_be_bytes());
        assert_eq!(&bytes[8..12], &16u32.to_be_bytes());
        assert_eq!(&bytes[12..16], &26u32.to_be_bytes()); // 16 + "go_online\0"
        assert_eq!(bytes.len(), length as usize);
    }

    #[test]
    fn test_first_byte_offset_reserves_header_and_table() {
        assert_eq!(first_byte_offset(0), 8);
        assert_eq!(first_byte_offset(3), 20);
    }

    // ── MessageBuffer step API ───────────────────────────────────────────────

    #[test]
    fn test_append_string_updates_header_in_place() {
        let mut buf = MessageBuffer::new();
        let cursor = buf.encode_header(2).unwrap();
        assert_eq!(cursor.byte_cursor, 16);
        assert_eq!(buf.entry_count(), Some(0));

        let cursor = buf.append_string(cursor, "abc").unwrap();
        assert_eq!(cursor, Cursor { argument_index: 1, byte_cursor: 20 });
        assert_eq!(buf.entry_count(), Some(1));
        assert_eq!(buf.declared_length(), Some(20));

        let cursor = buf.append_string(cursor, "de").unwrap();
        assert_eq!(cursor.byte_cursor, 23);
        assert_eq!(buf.entry_count(), Some(2));
        assert_eq!(buf.declared_length(), Some(23));
    }

    #[test]
    fn test_append_beyond_declared_count_is_rejected() {
        let mut buf = MessageBuffer::new();
        let cursor = buf.encode_header(1).unwrap();
        let cursor = buf.append_string(cursor, "only").unwrap();
        let err = buf.append_string(cursor, "extra").unwrap_err();
        assert_eq!(err, ProtocolError::OffsetTableFull { declared: 1, index: 1 });
    }

    #[test]
    fn test_stale_cursor_is_rejected() {
        let mut buf = MessageBuffer::new();
        let start = buf.encode_header(2).unwrap();
        buf.append_string(start, "first").unwrap();
        let err = buf.append_string(start, "again").unwrap_err();
        assert!(matches!(err, ProtocolError::CursorMismatch { .. }));
    }

    #[test]
    fn test_string_at_returns_string_and_offset() {
        let mut buf = MessageBuffer::new();
        let mut cursor = buf.encode_header(3).unwrap();
        for s in ["get_contact_list", "ok", "alice"] {
            cursor = buf.append_string(cursor, s).unwrap();
        }
        assert_eq!(buf.string_at(0), Some(("get_contact_list", 20)));
        assert_eq!(buf.string_at(1), Some(("ok", 37)));
        assert_eq!(buf.string_at(2), Some(("alice", 40)));
        assert_eq!(buf.string_at(3), None);
    }

    #[test]
    fn test_string_at_on_empty_buffer_is_none() {
        let buf = MessageBuffer::new();
        assert_eq!(buf.string_at(0), None);
    }

    #[test]
    fn test_string_at_works_in_network_order() {
        let mut buf = MessageBuffer::new();
        encode_into(&mut buf, &Message::from_parts(["go_offline", "ok"])).unwrap();
        assert_eq!(buf.byte_order(), ByteOrder::Network);
        assert_eq!(buf.string_at(1).map(|(s, _)| s), Some("ok"));
    }

    // ── Byte order ───────────────────────────────────────────────────────────

    #[test]
    fn test_to_wire_from_wire_restores_host_bytes() {
        let mut buf = MessageBuffer::new();
        let mut cursor = buf.encode_header(2).unwrap();
        cursor = buf.append_string(cursor, "go_online").unwrap();
        buf.append_string(cursor, "ok").unwrap();
        let host_bytes = buf.as_bytes().to_vec();

        buf.to_wire().unwrap();
        buf.from_wire().unwrap();

        assert_eq!(buf.as_bytes(), host_bytes.as_slice());
    }

    #[test]
    fn test_from_wire_to_wire_restores_wire_bytes() {
        let wire = encode_message(&Message::from_parts(["a", "b", "c"])).unwrap();
        let mut buf = MessageBuffer::new();
        buf.load_wire(&wire).unwrap();

        buf.from_wire().unwrap();
        assert_eq!(buf.entry_count(), Some(3));
        buf.to_wire().unwrap();

        assert_eq!(buf.as_bytes(), wire.as_slice());
    }

    #[test]
    fn test_double_to_wire_is_rejected() {
        let mut buf = MessageBuffer::new();
        buf.encode_header(0).unwrap();
        buf.to_wire().unwrap();
        assert_eq!(buf.to_wire(), Err(ProtocolError::ByteOrder(ByteOrder::Network)));
    }

    #[test]
    fn test_from_wire_on_host_buffer_is_rejected() {
        let mut buf = MessageBuffer::new();
        buf.encode_header(0).unwrap();
        assert_eq!(buf.from_wire(), Err(ProtocolError::ByteOrder(ByteOrder::Host)));
    }

    #[test]
    fn test_append_after_to_wire_is_rejected() {
        let mut buf = MessageBuffer::new();
        let cursor = buf.encode_header(1).unwrap();
        buf.to_wire().unwrap();
        assert!(matches!(
            buf.append_string(cursor, "x"),
            Err(ProtocolError::ByteOrder(ByteOrder::Network))
        ));
    }

    // ── Capacity boundary ────────────────────────────────────────────────────

    #[test]
    fn test_message_exactly_at_capacity_encodes() {
        // 8 header + 4 offset + 4087 chars + NUL = 4096
        let msg = Message::from_parts(["x".repeat(DEFAULT_CAPACITY - 13)]);
        assert_eq!(msg.encoded_len(), DEFAULT_CAPACITY);
        let bytes = encode_message(&msg).expect("exactly at capacity must encode");
        assert_eq!(bytes.len(), DEFAULT_CAPACITY);
    }

    #[test]
    fn test_message_one_byte_over_capacity_fails() {
        let msg = Message::from_parts(["x".repeat(DEFAULT_CAPACITY - 12)]);
        assert_eq!(
            encode_message(&msg),
            Err(ProtocolError::CapacityExceeded {
                required: DEFAULT_CAPACITY + 1,
                capacity: DEFAULT_CAPACITY,
            })
        );
    }

    #[test]
    fn test_append_string_past_capacity_leaves_buffer_unchanged() {
        let mut buf = MessageBuffer::with_capacity(16);
        let cursor = buf.encode_header(1).unwrap();
        let before = buf.as_bytes().to_vec();
        let err = buf.append_string(cursor, "toolong").unwrap_err();
        assert_eq!(err, ProtocolError::CapacityExceeded { required: 20, capacity: 16 });
        assert_eq!(buf.as_bytes(), before.as_slice());
    }

    #[test]
    fn test_rejected_encode_keeps_previous_buffer_content() {
        let mut buf = MessageBuffer::with_capacity(32);
        encode_into(&mut buf, &Message::from_parts(["ok"])).unwrap();
        let before = buf.as_bytes().to_vec();

        let oversized = Message::from_parts(["y".repeat(64)]);
        assert!(encode_into(&mut buf, &oversized).is_err());

        assert_eq!(buf.as_bytes(), before.as_slice());
    }

    #[test]
    fn test_interior_nul_is_rejected() {
        let msg = Message::from_parts(["send_msg_to", "bob", "a\0b"]);
        assert_eq!(encode_message(&msg), Err(ProtocolError::InteriorNul(1)));
    }

    // ── Decode error conditions ──────────────────────────────────────────────

    #[test]
    fn test_decode_empty_bytes_returns_insufficient_data() {
        let result = decode_message(&[]);
        assert!(matches!(result, Err(ProtocolError::InsufficientData { .. })));
    }

    #[test]
    fn test_decode_truncated_body_returns_insufficient_data() {
        let bytes = encode_message(&Message::from_parts(["go_online"])).unwrap();
        let result = decode_message(&bytes[..bytes.len() - 1]);
        assert!(matches!(result, Err(ProtocolError::InsufficientData { .. })));
    }

    #[test]
    fn test_decode_length_shorter_than_offset_table_is_malformed() {
        let mut bytes = vec![0u8; 12];
        bytes[0..4].copy_from_slice(&8u32.to_be_bytes());
        bytes[4..8].copy_from_slice(&1u32.to_be_bytes());
        assert!(matches!(decode_message(&bytes), Err(ProtocolError::Malformed(_))));
    }

    #[test]
    fn test_decode_offset_pointing_into_table_is_malformed() {
        let mut bytes = encode_message(&Message::from_parts(["abc"])).unwrap();
        bytes[8..12].copy_from_slice(&4u32.to_be_bytes());
        assert!(matches!(decode_message(&bytes), Err(ProtocolError::Malformed(_))));
    }

    #[test]
    fn test_decode_missing_terminator_is_malformed() {
        let mut bytes = encode_message(&Message::from_parts(["abc"])).unwrap();
        let last = bytes.len() - 1;
        bytes[last] = b'!';
        assert!(matches!(decode_message(&bytes), Err(ProtocolError::Malformed(_))));
    }

    #[test]
    fn test_decode_invalid_utf8_is_malformed() {
        let mut bytes = encode_message(&Message::from_parts(["abc"])).unwrap();
        bytes[12] = 0xFF;
        assert!(matches!(decode_message(&bytes), Err(ProtocolError::Malformed(_))));
    }

    #[test]
    fn test_decode_overlapping_offsets_is_malformed() {
        let mut bytes = encode_message(&Message::from_parts(["abc", "de"])).unwrap();
        // point entry 1 back into entry 0
        let first = read_be_u32(&bytes, 8);
        bytes[12..16].copy_from_slice(&(first + 1).to_be_bytes());
        assert!(matches!(decode_message(&bytes), Err(ProtocolError::Malformed(_))));
    }

    #[test]
    fn test_decode_ignores_trailing_bytes() {
        let mut bytes = encode_message(&Message::from_parts(["go_online"])).unwrap();
        let frame_len = bytes.len();
        bytes.extend_from_slice(b"next frame");
        let (msg, consumed) = decode_message(&bytes).unwrap();
        assert_eq!(consumed, frame_len);
        assert_eq!(msg.name(), Some("go_online"));
    }

    #[test]
    fn test_decode_tolerates_unused_reserved_offset_slots() {
        // Header reserved for three entries but only two appended.
        let mut buf = MessageBuffer::new();
        let mut cursor = buf.encode_header(3).unwrap();
        cursor = buf.append_string(cursor, "go_online").unwrap();
        buf.append_string(cursor, "ok").unwrap();
        buf.to_wire().unwrap();

        let (msg, _) = decode_message(buf.as_bytes()).unwrap();
        assert_eq!(msg.entries(), ["go_online", "ok"]);
    }
}
