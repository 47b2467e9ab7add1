//! The single-writer send path shared by replies and events.
//!
//! One [`MessageBuffer`] and the socket's write half live together behind a
//! single async mutex.  Whoever holds the lock encodes one message into the
//! buffer and writes all of it before releasing, so a reply and an event can
//! only ever follow each other on the stream, never interleave.

use std::sync::Arc;

use puppet_core::protocol::codec::{encode_into, MessageBuffer};
use puppet_core::{Message, ProtocolError};
use thiserror::Error;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;
use tracing::debug;

/// Errors from [`SendChannel::send`].
#[derive(Debug, Error)]
pub enum SendError {
    /// No connection is attached.
    #[error("not connected to agent")]
    NotConnected,
    /// The message cannot be encoded into the send buffer.
    #[error("message rejected before sending: {0}")]
    Protocol(#[from] ProtocolError),
    /// Writing to the socket failed.
    #[error("send failed: {0}")]
    Io(#[from] std::io::Error),
}

struct SendSlot<W> {
    buffer: MessageBuffer,
    writer: Option<W>,
}

/// Cloneable handle to the shared send buffer and writer.
pub struct SendChannel<W> {
    slot: Arc<Mutex<SendSlot<W>>>,
}

impl<W> Clone for SendChannel<W> {
    fn clone(&self) -> Self {
        Self {
            slot: Arc::clone(&self.slot),
        }
    }
}

impl<W: AsyncWrite + Unpin + Send> SendChannel<W> {
    /// Creates a detached channel whose buffer holds at most `capacity` bytes.
    pub fn new(capacity: usize) -> Self {
        Self {
            slot: Arc::new(Mutex::new(SendSlot {
                buffer: MessageBuffer::with_capacity(capacity),
                writer: None,
            })),
        }
    }

    /// Installs the write half of a fresh connection.
    pub async fn attach(&self, writer: W) {
        self.slot.lock().await.writer = Some(writer);
    }

    /// Removes and returns the current writer.
    pub async fn detach(&self) -> Option<W> {
        self.slot.lock().await.writer.take()
    }

    pub async fn is_attached(&self) -> bool {
        self.slot.lock().await.writer.is_some()
    }

    /// Encodes `msg` and writes every byte under the send lock.
    ///
    /// # Errors
    ///
    /// - [`SendError::NotConnected`] when no writer is attached.
    /// - [`SendError::Protocol`] when the message does not fit the buffer;
    ///   nothing is written.
    /// - [`SendError::Io`] when the socket write fails.
    pub async fn send(&self, msg: &Message) -> Result<(), SendError> {
        let mut guard = self.slot.lock().await;
        let SendSlot { buffer, writer } = &mut *guard;
        let writer = writer.as_mut().ok_or(SendError::NotConnected)?;

        encode_into(buffer, msg)?;
        writer.write_all(buffer.as_bytes()).await?;
        writer.flush().await?;

        debug!(bytes = buffer.len(), %msg, "sent message");
        Ok(())
    }
}
