//! Event publishing from the host loop onto the agent connection.
//!
//! Host callbacks run on the host loop, not on the network worker.  Publishing
//! an event spawns a small task on the worker's runtime that takes the shared
//! send lock, so events and replies are written by the same runtime and
//! separated at message boundaries.

use puppet_core::Message;
use tokio::io::AsyncWrite;
use tokio::runtime::Handle;
use tracing::{debug, warn};

use super::send_channel::{SendChannel, SendError};
use crate::application::notify_events::EventSink;

/// [`EventSink`] writing through a connection's [`SendChannel`].
pub struct ConnectionEventSink<W> {
    channel: SendChannel<W>,
    runtime: Handle,
}

impl<W> ConnectionEventSink<W> {
    pub fn new(channel: SendChannel<W>, runtime: Handle) -> Self {
        Self { channel, runtime }
    }
}

impl<W> EventSink for ConnectionEventSink<W>
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    fn publish(&self, event: Message) {
        let channel = self.channel.clone();
        self.runtime.spawn(async move {
            match channel.send(&event).await {
                Ok(()) => {}
                Err(SendError::NotConnected) => {
                    debug!(%event, "agent not connected; event dropped");
                }
                Err(e) => warn!(%event, "failed to publish event: {e}"),
            }
        });
    }
}
