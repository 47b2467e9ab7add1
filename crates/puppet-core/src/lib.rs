//! # puppet-core
//!
//! Shared library for the Puppet messenger remote-control channel containing
//! the binary message codec, the command / status / event vocabulary, and
//! incremental stream framing.
//!
//! It has zero dependencies on OS APIs, messenger libraries, or network
//! sockets, so it can be used by the plugin side and by test agents alike.
//!
//! # Architecture overview (for beginners)
//!
//! An external automation agent listens on a TCP port.  The messenger plugin
//! connects to it, receives commands such as `go_online` or
//! `send_msg_to <buddy> <text>`, executes them, and writes back a reply.  The
//! plugin also pushes unsolicited events (an incoming instant message, an
//! incoming file) over the same connection.
//!
//! Every message in both directions is a list of strings:
//!
//! - **`protocol::messages`** – what the lists mean: command names, status
//!   pairs such as `("error", "no_match")`, and event names.
//! - **`protocol::codec`** – how a list becomes bytes: an 8-byte header, a
//!   table of offsets, and NUL-terminated strings, integers big-endian.
//! - **`protocol::framing`** – how a byte stream is cut back into messages.

pub mod protocol;

pub use protocol::codec::{decode_message, encode_message, MessageBuffer, ProtocolError};
pub use protocol::framing::FrameAccumulator;
pub use protocol::messages::{Command, EventKind, Message, Outbound, Status};
