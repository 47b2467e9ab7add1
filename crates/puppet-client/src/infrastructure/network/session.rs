//! One connected session: read frames, dispatch, reply.
//!
//! A session runs strictly sequentially: it reads until at least one complete
//! frame is buffered, dispatches each frame in order, and sends each reply
//! before reading again.  It ends when the agent closes the socket, a read
//! or write fails, the stream becomes unparseable, the agent sends
//! `shutdown`, or a stop is requested.

use std::sync::Arc;

use puppet_core::{FrameAccumulator, Message, ProtocolError};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::send_channel::{SendChannel, SendError};
use crate::application::dispatch_command::{DispatchCommandUseCase, DispatchOutcome};

const READ_CHUNK_SIZE: usize = 1024;

/// Why a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOutcome {
    /// Connection lost or unusable; connect again.
    Reconnect,
    /// The agent sent `shutdown`.
    Terminate,
    /// A local stop was requested.
    Stop,
}

/// State of one agent connection.
pub struct Session<W> {
    dispatcher: Arc<DispatchCommandUseCase>,
    channel: SendChannel<W>,
    capacity: usize,
    id: Uuid,
}

impl<W: AsyncWrite + Unpin + Send> Session<W> {
    pub fn new(
        dispatcher: Arc<DispatchCommandUseCase>,
        channel: SendChannel<W>,
        capacity: usize,
        id: Uuid,
    ) -> Self {
        Self {
            dispatcher,
            channel,
            capacity,
            id,
        }
    }

    /// Serves the connection until it ends; see [`SessionOutcome`].
    ///
    /// A `true` on `stop` unblocks a pending read immediately.
    pub async fn run<R>(&self, mut reader: R, stop: &mut watch::Receiver<bool>) -> SessionOutcome
    where
        R: AsyncRead + Unpin,
    {
        let mut frames = FrameAccumulator::with_capacity(self.capacity);
        let mut chunk = vec![0u8; READ_CHUNK_SIZE];

        loop {
            if *stop.borrow() {
                return SessionOutcome::Stop;
            }
            let read = tokio::select! {
                r = reader.read(&mut chunk) => r,
                _ = stop.changed() => return SessionOutcome::Stop,
            };
            let n = match read {
                Ok(0) => {
                    info!(session = %self.id, "agent closed the connection");
                    return SessionOutcome::Reconnect;
                }
                Ok(n) => n,
                Err(e) => {
                    warn!(session = %self.id, "read error on agent connection: {e}");
                    return SessionOutcome::Reconnect;
                }
            };
            frames.push(&chunk[..n]);

            loop {
                match frames.next_message() {
                    Ok(Some(msg)) => {
                        if let Some(outcome) = self.handle(msg).await {
                            return outcome;
                        }
                    }
                    Ok(None) => break,
                    Err(e @ ProtocolError::InvalidLength { .. }) => {
                        warn!(session = %self.id, "unrecoverable frame header: {e}; dropping connection");
                        return SessionOutcome::Reconnect;
                    }
                    Err(e) => warn!(session = %self.id, "discarding malformed frame: {e}"),
                }
            }
        }
    }

    async fn handle(&self, msg: Message) -> Option<SessionOutcome> {
        debug!(session = %self.id, %msg, "received message");
        match self.dispatcher.dispatch(&msg).await {
            DispatchOutcome::Reply(reply) => match self.channel.send(&reply).await {
                Ok(()) => None,
                Err(SendError::Io(e)) => {
                    warn!(session = %self.id, "failed to send reply: {e}");
                    Some(SessionOutcome::Reconnect)
                }
                Err(e) => {
                    error!(session = %self.id, %reply, "reply not sent: {e}");
                    None
                }
            },
            DispatchOutcome::Terminate => Some(SessionOutcome::Terminate),
            DispatchOutcome::Ignore => None,
        }
    }
}
