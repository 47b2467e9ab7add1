//! NotifyEventsUseCase: reacts to messenger callbacks on the host loop.
//!
//! Callbacks arrive as [`HostEvent`]s.  Some are forwarded to the agent as
//! asynchronous event messages, some are answered with an automation
//! [`Decision`] and the rest are only logged.
//!
//! | Host event                 | Agent message       | Decision               |
//! |----------------------------|---------------------|------------------------|
//! | `ImReceived`               | `msg_im_in`         |                        |
//! | `AuthorizationRequested`   |                     | per policy             |
//! | `FileRequested`            | `file_in` if taken  | per policy             |
//! | `FileCompleted`            | `file_in_complete`  |                        |
//! | `SignedOn`, buddy on / off |                     |                        |

use std::sync::Arc;

use puppet_core::{EventKind, Message};
use tracing::{debug, info};

/// Publishes event messages to the agent.
///
/// Fire-and-forget: a sink that is not connected drops the event.
pub trait EventSink: Send + Sync {
    fn publish(&self, event: Message);
}

/// A callback raised by the messenger on the host loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostEvent {
    ImReceived { sender: String, text: String },
    AuthorizationRequested { remote_user: String, protocol_id: String },
    FileRequested { sender: String, filename: String },
    FileCompleted { sender: String, local_filename: String },
    SignedOn { account: String, protocol_id: String },
    BuddySignedOn { buddy: String },
    BuddySignedOff { buddy: String },
}

/// Answer to a request the messenger asks the plugin to decide on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Accept,
    Reject,
}

impl Decision {
    fn from_flag(accept: bool) -> Self {
        if accept {
            Decision::Accept
        } else {
            Decision::Reject
        }
    }
}

/// Which incoming requests are accepted without asking anyone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AutomationPolicy {
    pub auto_accept_file: bool,
    pub auto_accept_authorization_request: bool,
}

impl Default for AutomationPolicy {
    fn default() -> Self {
        Self {
            auto_accept_file: true,
            auto_accept_authorization_request: true,
        }
    }
}

/// The Notify Events use case.
pub struct NotifyEventsUseCase {
    sink: Arc<dyn EventSink>,
    policy: AutomationPolicy,
}

impl NotifyEventsUseCase {
    pub fn new(sink: Arc<dyn EventSink>, policy: AutomationPolicy) -> Self {
        Self { sink, policy }
    }

    /// Sends `[event_name, "event", ...payload]` to the agent.
    pub fn notify<I, S>(&self, kind: EventKind, payload: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let event = Message::event(kind, payload);
        debug!(%event, "publishing event");
        self.sink.publish(event);
    }

    /// Routes one host event; returns a decision when the host expects one.
    pub fn handle(&self, event: &HostEvent) -> Option<Decision> {
        match event {
            HostEvent::ImReceived { sender, text } => {
                self.on_im_received(sender, text);
                None
            }
            HostEvent::AuthorizationRequested { remote_user, protocol_id } => {
                Some(self.on_authorization_requested(remote_user, protocol_id))
            }
            HostEvent::FileRequested { sender, filename } => {
                Some(self.on_file_requested(sender, filename))
            }
            HostEvent::FileCompleted { sender, local_filename } => {
                self.on_file_completed(sender, local_filename);
                None
            }
            HostEvent::SignedOn { account, protocol_id } => {
                info!(%account, %protocol_id, "account connected");
                None
            }
            HostEvent::BuddySignedOn { buddy } => {
                info!(%buddy, "buddy signed on");
                None
            }
            HostEvent::BuddySignedOff { buddy } => {
                info!(%buddy, "buddy signed off");
                None
            }
        }
    }

    pub fn on_im_received(&self, sender: &str, text: &str) {
        self.notify(EventKind::MsgImIn, [sender, text]);
    }

    pub fn on_authorization_requested(&self, remote_user: &str, protocol_id: &str) -> Decision {
        let decision = Decision::from_flag(self.policy.auto_accept_authorization_request);
        info!(remote_user, protocol_id, ?decision, "buddy authorization requested");
        decision
    }

    pub fn on_file_requested(&self, sender: &str, filename: &str) -> Decision {
        let decision = Decision::from_flag(self.policy.auto_accept_file);
        info!(sender, filename, ?decision, "file transfer requested");
        if decision == Decision::Accept {
            self.notify(EventKind::FileIn, [sender, filename]);
        }
        decision
    }

    pub fn on_file_completed(&self, sender: &str, local_filename: &str) {
        info!(sender, local_filename, "file transfer completed");
        self.notify(EventKind::FileInComplete, [sender, local_filename]);
    }
}
