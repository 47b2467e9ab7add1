//! Protocol module containing message types, the binary codec, and stream framing.

pub mod codec;
pub mod framing;
pub mod messages;

pub use codec::{
    decode_message, encode_into, encode_message, encode_message_with_capacity, first_byte_offset,
    ByteOrder, Cursor, MessageBuffer, ProtocolError, DEFAULT_CAPACITY, HEADER_SIZE,
};
pub use framing::FrameAccumulator;
pub use messages::*;
