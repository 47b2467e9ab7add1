//! Cross-thread handoff from the network worker to the host loop.
//!
//! # How the handoff works (for beginners)
//!
//! Some messenger calls may only run on the host's main loop.  The network
//! worker therefore cannot call them directly.  Instead it:
//!
//! 1. Wraps the request together with a one-shot reply sender and puts it
//!    into a bounded channel (capacity 1: one request in flight).
//! 2. Waits for the one-shot reply, but never longer than the configured
//!    timeout.
//!
//! The host loop calls [`HandoffReceiver::poll`] on every tick.  `poll` never
//! blocks: it takes whatever is queued, executes it, and sends the status
//! back.  If the worker has already given up on a request (its one-shot
//! receiver was dropped after a timeout), the request is skipped instead of
//! being executed late.
//!
//! | Situation                          | Status returned to the worker |
//! |------------------------------------|-------------------------------|
//! | host loop executed the request     | the request's own status      |
//! | no answer within the timeout       | `GenericFail`                 |
//! | host loop gone (receiver dropped)  | `Unhandled`                   |

use std::time::Duration;

use async_trait::async_trait;
use puppet_core::Status;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use crate::application::conversation::{execute, ConversationService};
use crate::application::dispatch_command::{HostLoopInvoker, HostRequest};

/// Default bound on how long the worker waits for the host loop.
pub const DEFAULT_HANDOFF_TIMEOUT: Duration = Duration::from_secs(5);

/// Why a handoff produced no status from the host loop.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum HandoffError {
    /// The host loop did not answer within the timeout.
    #[error("host loop did not answer within {0:?}")]
    Timeout(Duration),
    /// The host loop side of the channel is gone.
    #[error("host loop is no longer running")]
    HostGone,
}

impl From<&HandoffError> for Status {
    fn from(err: &HandoffError) -> Self {
        match err {
            HandoffError::Timeout(_) => Status::GenericFail,
            HandoffError::HostGone => Status::Unhandled,
        }
    }
}

struct Envelope {
    request: HostRequest,
    reply: oneshot::Sender<Status>,
}

/// Creates a connected sender/receiver pair.
pub fn handoff_channel(timeout: Duration) -> (HandoffSender, HandoffReceiver) {
    let (tx, rx) = mpsc::channel(1);
    (HandoffSender { tx, timeout }, HandoffReceiver { rx })
}

/// Network-thread side of the handoff.
#[derive(Clone)]
pub struct HandoffSender {
    tx: mpsc::Sender<Envelope>,
    timeout: Duration,
}

impl HandoffSender {
    /// Queues `request` for the host loop and waits for its status.
    ///
    /// The timeout covers both waiting for a free slot and waiting for the
    /// answer.
    ///
    /// # Errors
    ///
    /// Returns [`HandoffError`] on timeout or when the host loop is gone.
    pub async fn request(&self, request: HostRequest) -> Result<Status, HandoffError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        let envelope = Envelope {
            request,
            reply: reply_tx,
        };

        let exchange = async {
            self.tx
                .send(envelope)
                .await
                .map_err(|_| HandoffError::HostGone)?;
            reply_rx.await.map_err(|_| HandoffError::HostGone)
        };

        tokio::time::timeout(self.timeout, exchange)
            .await
            .unwrap_or(Err(HandoffError::Timeout(self.timeout)))
    }
}

#[async_trait]
impl HostLoopInvoker for HandoffSender {
    async fn invoke(&self, request: HostRequest) -> Status {
        match self.request(request).await {
            Ok(status) => status,
            Err(e) => {
                warn!("host request failed: {e}");
                Status::from(&e)
            }
        }
    }
}

/// Host-loop side of the handoff.
pub struct HandoffReceiver {
    rx: mpsc::Receiver<Envelope>,
}

impl HandoffReceiver {
    /// Executes every queued request whose requester is still waiting.
    ///
    /// Never blocks.  Returns the number of requests executed.
    pub fn poll(&mut self, service: &mut dyn ConversationService) -> usize {
        let mut executed = 0;
        while let Ok(envelope) = self.rx.try_recv() {
            if envelope.reply.is_closed() {
                warn!(request = ?envelope.request, "requester gave up; skipping stale request");
                continue;
            }
            let status = execute(service, &envelope.request);
            debug!(request = ?envelope.request, %status, "host request executed");
            // The requester may time out between the check above and here.
            let _ = envelope.reply.send(status);
            executed += 1;
        }
        executed
    }
}
