//! DispatchCommandUseCase: turns one inbound command into one reply.
//!
//! The use case never touches a socket.  It receives a decoded [`Message`],
//! calls the messenger through injected ports, and hands back a
//! [`DispatchOutcome`] for the transport to act on.
//!
//! Two kinds of collaborator calls exist:
//!
//! - **Direct** account operations ([`AccountService`]) are thread-safe and
//!   called from the network thread.
//! - **Host-loop-only** operations (sending an instant message) are wrapped
//!   in a [`HostRequest`] and handed to a [`HostLoopInvoker`], which waits a
//!   bounded time for the host loop to execute them.
//!
//! `send_chat_msg_to` is part of the command table but has no handler; it is
//! answered like any unknown command.

use std::sync::Arc;

use async_trait::async_trait;
use puppet_core::protocol::codec::DEFAULT_CAPACITY;
use puppet_core::{Command, Message, Status};
use thiserror::Error;
use tracing::{debug, error, info, warn};

/// Errors reported by messenger collaborators.
///
/// Each variant maps to exactly one wire [`Status`].
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MessengerError {
    /// No account has been selected yet.
    #[error("no account selected")]
    NoAccount,
    /// The query returned nothing.
    #[error("no data")]
    NoData,
    /// The referenced account, buddy or conversation does not exist.
    #[error("no match for {0:?}")]
    NoMatch(String),
    /// A required argument was not supplied.
    #[error("missing argument: {0}")]
    MissingArgument(&'static str),
    /// The collaborator could not allocate what it needed.
    #[error("out of memory")]
    OutOfMemory,
    /// Any other failure inside the messenger.
    #[error("messenger call failed: {0}")]
    Failed(String),
}

impl From<&MessengerError> for Status {
    fn from(err: &MessengerError) -> Self {
        match err {
            MessengerError::NoAccount => Status::NoAccount,
            MessengerError::NoData => Status::NoData,
            MessengerError::NoMatch(_) => Status::NoMatch,
            MessengerError::MissingArgument(_) => Status::BadPtr,
            MessengerError::OutOfMemory => Status::OutOfMem,
            MessengerError::Failed(_) => Status::GenericFail,
        }
    }
}

/// Protocol id used when an account is selected without naming one.
pub const DEFAULT_PROTOCOL_ID: &str = "prpl-jabber";

/// A messenger account as reported by the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountInfo {
    pub username: String,
    pub protocol_id: String,
}

/// Account-level messenger operations that are safe to call from any thread.
#[cfg_attr(test, mockall::automock)]
pub trait AccountService: Send + Sync {
    /// All accounts the host knows about.
    fn accounts(&self) -> Result<Vec<AccountInfo>, MessengerError>;

    /// Makes `username` on `protocol_id` the account all later calls act on.
    fn select_account(&self, username: &str, protocol_id: &str) -> Result<(), MessengerError>;

    /// Buddy names of the selected account.
    fn contact_list(&self) -> Result<Vec<String>, MessengerError>;

    /// Switches the selected account to "available" or "offline".
    fn set_online(&self, online: bool) -> Result<(), MessengerError>;
}

/// An operation that must run on the host loop thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostRequest {
    /// Send an instant message to a buddy.
    SendIm { buddy: String, text: String },
}

/// Runs a [`HostRequest`] on the host loop and waits for its status.
///
/// Implementations bound the wait; a request that cannot be completed maps
/// to an error status instead of blocking the caller forever.
#[async_trait]
pub trait HostLoopInvoker: Send + Sync {
    async fn invoke(&self, request: HostRequest) -> Status;
}

/// What the transport should do after a command was processed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Send this reply.
    Reply(Message),
    /// Stop serving: the agent asked the plugin to shut down.  No reply.
    Terminate,
    /// Nothing to send (the inbound message was unusable).
    Ignore,
}

/// The Dispatch Command use case.
pub struct DispatchCommandUseCase {
    accounts: Arc<dyn AccountService>,
    host: Arc<dyn HostLoopInvoker>,
    reply_capacity: usize,
}

impl DispatchCommandUseCase {
    /// Creates a dispatcher whose replies must fit [`DEFAULT_CAPACITY`].
    pub fn new(accounts: Arc<dyn AccountService>, host: Arc<dyn HostLoopInvoker>) -> Self {
        Self {
            accounts,
            host,
            reply_capacity: DEFAULT_CAPACITY,
        }
    }

    /// Overrides the maximum encoded reply size.
    pub fn with_reply_capacity(mut self, capacity: usize) -> Self {
        self.reply_capacity = capacity;
        self
    }

    /// Processes one decoded inbound message.
    pub async fn dispatch(&self, msg: &Message) -> DispatchOutcome {
        let Some(name) = msg.name() else {
            warn!("received message without a command name; dropping");
            return DispatchOutcome::Ignore;
        };
        let reply = match Command::parse(name) {
            Some(command) => match self.run(name, msg, command).await {
                Some(reply) => reply,
                None => return DispatchOutcome::Terminate,
            },
            None => unknown_reply(name),
        };

        DispatchOutcome::Reply(self.fit_reply(name, reply))
    }

    /// Runs a handled command; `None` means stop serving.
    async fn run(&self, name: &str, msg: &Message, command: Command) -> Option<Message> {
        debug!(%command, args = msg.len() - 1, "dispatching command");
        let reply = match command {
            Command::GetContactList => self.contact_list_reply(name),
            Command::SendMsgTo => self.send_im(name, msg).await,
            Command::SendChatMsgTo => unknown_reply(name),
            Command::Shutdown => {
                info!("shutdown requested by agent");
                return None;
            }
            Command::GoOnline => status_reply(name, self.accounts.set_online(true)),
            Command::GoOffline => status_reply(name, self.accounts.set_online(false)),
        };
        Some(reply)
    }

    fn contact_list_reply(&self, name: &str) -> Message {
        match self.accounts.contact_list() {
            Ok(buddies) if buddies.is_empty() => Message::reply(name, Status::NoData),
            Ok(buddies) => Message::reply_ok_with(name, buddies),
            Err(e) => error_reply(name, &e),
        }
    }

    async fn send_im(&self, name: &str, msg: &Message) -> Message {
        let (Some(buddy), Some(text)) = (msg.arg(0), msg.arg(1)) else {
            let missing = if msg.arg(0).is_none() { "buddy" } else { "text" };
            return error_reply(name, &MessengerError::MissingArgument(missing));
        };
        let request = HostRequest::SendIm {
            buddy: buddy.to_string(),
            text: text.to_string(),
        };
        let status = self.host.invoke(request).await;
        Message::reply(name, status)
    }

    /// Makes sure the reply can be encoded.
    ///
    /// An oversized reply becomes `critical/out_of_mem`.  If even that does
    /// not fit (the echoed command name is itself too long), the name is cut
    /// on a char boundary until it does.
    fn fit_reply(&self, name: &str, reply: Message) -> Message {
        let required = reply.encoded_len();
        if required <= self.reply_capacity {
            return reply;
        }
        error!(
            command = %truncate_on_char_boundary(name, 64),
            required,
            capacity = self.reply_capacity,
            "reply exceeds send buffer capacity"
        );

        let fallback = Message::reply(name, Status::OutOfMem);
        if fallback.encoded_len() <= self.reply_capacity {
            return fallback;
        }
        let overhead = Message::reply("", Status::OutOfMem).encoded_len();
        let budget = self.reply_capacity.saturating_sub(overhead);
        error!(
            name_len = name.len(),
            kept = budget,
            "command name too long to echo; truncating it in the reply"
        );
        Message::reply(truncate_on_char_boundary(name, budget), Status::OutOfMem)
    }
}

/// Longest prefix of `s` that is at most `max` bytes and ends on a char
/// boundary.
fn truncate_on_char_boundary(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

fn unknown_reply(name: &str) -> Message {
    info!(command = %truncate_on_char_boundary(name, 64), "unknown command");
    Message::reply(name, Status::Unknown)
}

fn status_reply(name: &str, result: Result<(), MessengerError>) -> Message {
    match result {
        Ok(()) => Message::reply(name, Status::Ok),
        Err(e) => error_reply(name, &e),
    }
}

fn error_reply(name: &str, err: &MessengerError) -> Message {
    let status = Status::from(err);
    debug!(command = name, %status, "command failed: {err}");
    Message::reply(name, status)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
