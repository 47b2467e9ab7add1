//! All Puppet protocol message shapes, command names, and status codes.
//!
//! Every message on the wire is an ordered list of strings.  The first entry
//! names the command (agent → plugin) or the command being answered / event
//! being raised (plugin → agent).  The shapes are a convention, not a type tag:
//!
//! ```text
//! command: [command_name, arg1, arg2, ...]
//! reply:   [command_name, category, (detail), value1, value2, ...]
//! event:   [event_name, "event", value1, value2, ...]
//! ```
//!
//! A receiver tells a reply from an event only by looking at entry 1.

use std::fmt;

// ── Protocol constants ────────────────────────────────────────────────────────

/// Status category sent when a command succeeded.
pub const CATEGORY_OK: &str = "ok";
/// Status category for recoverable failures.
pub const CATEGORY_ERROR: &str = "error";
/// Status category for failures that indicate a broken session or host.
pub const CATEGORY_CRITICAL: &str = "critical";
/// Entry 1 of every asynchronous event message.
pub const EVENT_MARKER: &str = "event";

// ── Message ───────────────────────────────────────────────────────────────────

/// One protocol message: an ordered list of NUL-free UTF-8 strings.
///
/// The binary layout (header, offset table, string table) is produced by
/// [`crate::protocol::codec`]; this type only holds the logical content.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Message {
    entries: Vec<String>,
}

impl Message {
    /// Creates a message from already-owned entries.
    pub fn new(entries: Vec<String>) -> Self {
        Self { entries }
    }

    /// Creates a message from anything that yields string-like items.
    ///
    /// ```rust
    /// use puppet_core::Message;
    ///
    /// let msg = Message::from_parts(["send_msg_to", "bob@example.org", "hi"]);
    /// assert_eq!(msg.name(), Some("send_msg_to"));
    /// assert_eq!(msg.arg(1), Some("hi"));
    /// ```
    pub fn from_parts<I, S>(parts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            entries: parts.into_iter().map(Into::into).collect(),
        }
    }

    /// Builds a reply carrying only a status pair.
    pub fn reply(command: &str, status: Status) -> Self {
        let mut entries = Vec::with_capacity(1 + status.token_count());
        entries.push(command.to_string());
        entries.extend(status.tokens().iter().map(|t| t.to_string()));
        Self { entries }
    }

    /// Builds a successful reply followed by payload values.
    pub fn reply_ok_with<I, S>(command: &str, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut msg = Self::reply(command, Status::Ok);
        msg.entries.extend(values.into_iter().map(Into::into));
        msg
    }

    /// Builds an asynchronous event message.
    pub fn event<I, S>(kind: EventKind, payload: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut entries = vec![kind.as_str().to_string(), EVENT_MARKER.to_string()];
        entries.extend(payload.into_iter().map(Into::into));
        Self { entries }
    }

    /// Entry 0: the command or event name.
    pub fn name(&self) -> Option<&str> {
        self.entries.first().map(String::as_str)
    }

    /// Positional argument after the name (`arg(0)` is entry 1).
    pub fn arg(&self, index: usize) -> Option<&str> {
        self.entries.get(index + 1).map(String::as_str)
    }

    /// All entries including the name.
    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    /// Consumes the message and returns its entries.
    pub fn into_entries(self) -> Vec<String> {
        self.entries
    }

    /// Number of string-table entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the message carries no entries at all.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns `true` if entry 1 is the event marker.
    pub fn is_event(&self) -> bool {
        self.entries.get(1).map(String::as_str) == Some(EVENT_MARKER)
    }

    /// Exact number of bytes this message occupies once encoded.
    ///
    /// Equals the header `length` field the codec will write.
    pub fn encoded_len(&self) -> usize {
        crate::protocol::codec::first_byte_offset(self.entries.len())
            + self.entries.iter().map(|e| e.len() + 1).sum::<usize>()
    }

    /// Interprets the message as something the plugin sent back to an agent.
    ///
    /// Returns `None` for messages that are neither a well-formed reply nor an
    /// event (for example a bare command).
    pub fn classify(&self) -> Option<Outbound<'_>> {
        let name = self.name()?;
        let second = self.entries.get(1)?.as_str();
        if second == EVENT_MARKER {
            return Some(Outbound::Event {
                name,
                payload: &self.entries[2..],
            });
        }
        let detail = self.entries.get(2).map(String::as_str);
        let status = Status::from_tokens(second, detail)?;
        let values_start = 1 + status.token_count();
        Some(Outbound::Reply {
            command: name,
            status,
            values: &self.entries[values_start.min(self.entries.len())..],
        })
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for (i, entry) in self.entries.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{entry:?}")?;
        }
        f.write_str("]")
    }
}

/// A plugin-to-agent message viewed through its conventional shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound<'a> {
    /// Answer to a command.
    Reply {
        command: &'a str,
        status: Status,
        values: &'a [String],
    },
    /// Unsolicited notification.
    Event { name: &'a str, payload: &'a [String] },
}

// ── Commands ──────────────────────────────────────────────────────────────────

/// Every command name the plugin understands.
///
/// Matching is exact and case-sensitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    GetContactList,
    SendMsgTo,
    /// Reserved name; the client answers it as an unknown command.
    SendChatMsgTo,
    Shutdown,
    GoOnline,
    GoOffline,
}

impl Command {
    /// All commands in table order.
    pub const ALL: [Command; 6] = [
        Command::GetContactList,
        Command::SendMsgTo,
        Command::SendChatMsgTo,
        Command::Shutdown,
        Command::GoOnline,
        Command::GoOffline,
    ];

    /// Wire name of the command.
    pub const fn as_str(self) -> &'static str {
        match self {
            Command::GetContactList => "get_contact_list",
            Command::SendMsgTo => "send_msg_to",
            Command::SendChatMsgTo => "send_chat_msg_to",
            Command::Shutdown => "shutdown",
            Command::GoOnline => "go_online",
            Command::GoOffline => "go_offline",
        }
    }

    /// Resolves a wire name; first match in table order wins.
    pub fn parse(name: &str) -> Option<Command> {
        Self::ALL.into_iter().find(|c| c.as_str() == name)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Events ────────────────────────────────────────────────────────────────────

/// Asynchronous notifications raised by the plugin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// An instant message arrived. Payload: sender, text.
    MsgImIn,
    /// A file transfer was offered and accepted. Payload: sender, file name.
    FileIn,
    /// An accepted file transfer finished. Payload: sender, local file name.
    FileInComplete,
}

impl EventKind {
    /// Wire name of the event.
    pub const fn as_str(self) -> &'static str {
        match self {
            EventKind::MsgImIn => "msg_im_in",
            EventKind::FileIn => "file_in",
            EventKind::FileInComplete => "file_in_complete",
        }
    }

    /// Resolves a wire name back to an event kind.
    pub fn parse(name: &str) -> Option<EventKind> {
        [EventKind::MsgImIn, EventKind::FileIn, EventKind::FileInComplete]
            .into_iter()
            .find(|k| k.as_str() == name)
    }
}

// ── Status codes ──────────────────────────────────────────────────────────────

/// Outcome of a command, reported to the agent as a status pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    /// Success.
    Ok,
    /// Generic failure.
    GenericFail,
    /// No account is selected.
    NoAccount,
    /// An empty list or nothing was returned.
    NoData,
    /// A referenced object was not found.
    NoMatch,
    /// A required argument was missing.
    BadPtr,
    /// Allocation failed or the reply does not fit the send buffer.
    OutOfMem,
    /// The command name was not recognised.
    Unknown,
    /// An outcome no handler accounted for.
    Unhandled,
}

impl Status {
    /// First status token.
    pub const fn category(self) -> &'static str {
        match self {
            Status::Ok => CATEGORY_OK,
            Status::NoAccount | Status::BadPtr | Status::OutOfMem => CATEGORY_CRITICAL,
            Status::GenericFail
            | Status::NoData
            | Status::NoMatch
            | Status::Unknown
            | Status::Unhandled => CATEGORY_ERROR,
        }
    }

    /// Second status token; `None` for [`Status::Ok`].
    pub const fn detail(self) -> Option<&'static str> {
        match self {
            Status::Ok => None,
            Status::GenericFail => Some("generic_error"),
            Status::NoAccount => Some("no_account"),
            Status::NoData => Some("no_data"),
            Status::NoMatch => Some("no_match"),
            Status::BadPtr => Some("bad_ptr"),
            Status::OutOfMem => Some("out_of_mem"),
            Status::Unknown => Some("unknown_command"),
            Status::Unhandled => Some("unhandled"),
        }
    }

    /// Number of string-table entries the status occupies (1 or 2).
    pub const fn token_count(self) -> usize {
        if self.detail().is_some() {
            2
        } else {
            1
        }
    }

    /// The status rendered as wire tokens.
    pub fn tokens(self) -> Vec<&'static str> {
        match self.detail() {
            Some(detail) => vec![self.category(), detail],
            None => vec![self.category()],
        }
    }

    /// Returns `true` for [`Status::Ok`].
    pub const fn is_ok(self) -> bool {
        matches!(self, Status::Ok)
    }

    /// Parses a status pair as read from a reply.
    ///
    /// `detail` is ignored when `category` is `"ok"`.
    pub fn from_tokens(category: &str, detail: Option<&str>) -> Option<Status> {
        if category == CATEGORY_OK {
            return Some(Status::Ok);
        }
        let detail = detail?;
        [
            Status::GenericFail,
            Status::NoAccount,
            Status::NoData,
            Status::NoMatch,
            Status::BadPtr,
            Status::OutOfMem,
            Status::Unknown,
            Status::Unhandled,
        ]
        .into_iter()
        .find(|s| s.category() == category && s.detail() == Some(detail))
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.detail() {
            Some(detail) => write!(f, "{}/{}", self.category(), detail),
            None => f.write_str(self.category()),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
