//! In-memory messenger used by the binary and by tests.
//!
//! # Why an in-memory messenger?
//!
//! A real messenger host needs a running chat client, configured accounts,
//! and remote contacts.  None of that is available in a test process.  The
//! `InMemoryMessenger` keeps accounts, buddy lists, and open conversations in
//! plain collections so every path through the plugin can be exercised and
//! inspected:
//!
//! ```ignore
//! let messenger = InMemoryMessenger::demo();
//! select_first_account(&messenger)?;
//!
//! // ... the agent sends `send_msg_to echo hi` ...
//!
//! assert_eq!(messenger.sent_messages()[0].text, "hi");
//! ```
//!
//! Host callbacks are simulated with [`InMemoryMessenger::push_host_event`];
//! the host loop picks them up with [`InMemoryMessenger::drain_host_events`].
//!
//! # Echo buddy
//!
//! An IM sent to the configured echo buddy queues an `ImReceived` event from
//! that buddy carrying the same text, which the host loop then forwards to the
//! agent as `msg_im_in`.
//!
//! # `should_fail` flag
//!
//! Set `should_fail` to make every operation return
//! [`MessengerError::Failed`], for testing error paths.
//!
//! # History
//!
//! Sent messages and received files are kept for inspection, up to
//! [`HISTORY_LIMIT`] entries each; older entries are dropped first.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, info};

use crate::application::conversation::ConversationService;
use crate::application::dispatch_command::{AccountInfo, AccountService, MessengerError};
use crate::application::notify_events::{Decision, HostEvent};

/// Most sent messages and most received files remembered at once.
pub const HISTORY_LIMIT: usize = 256;

/// One outgoing IM recorded by the messenger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    pub account: String,
    pub to: String,
    pub text: String,
}

#[derive(Debug, Clone)]
struct AccountRecord {
    info: AccountInfo,
    buddies: Vec<String>,
    online: bool,
}

#[derive(Debug, Default)]
struct State {
    accounts: Vec<AccountRecord>,
    selected: Option<usize>,
    open_ims: Vec<String>,
    sent: VecDeque<SentMessage>,
    pending_events: VecDeque<HostEvent>,
    received_files: VecDeque<(String, String)>,
    echo_buddy: Option<String>,
    should_fail: bool,
}

impl State {
    fn selected(&self) -> Result<&AccountRecord, MessengerError> {
        self.selected
            .and_then(|i| self.accounts.get(i))
            .ok_or(MessengerError::NoAccount)
    }

    fn selected_mut(&mut self) -> Result<&mut AccountRecord, MessengerError> {
        match self.selected {
            Some(i) => self.accounts.get_mut(i).ok_or(MessengerError::NoAccount),
            None => Err(MessengerError::NoAccount),
        }
    }

    fn record_sent(&mut self, message: SentMessage) {
        push_bounded(&mut self.sent, message);
    }

    fn record_file(&mut self, sender: String, local_filename: String) {
        push_bounded(&mut self.received_files, (sender, local_filename));
    }

    fn check_failure(&self) -> Result<(), MessengerError> {
        if self.should_fail {
            return Err(MessengerError::Failed("simulated messenger failure".into()));
        }
        Ok(())
    }
}

fn push_bounded<T>(history: &mut VecDeque<T>, item: T) {
    if history.len() == HISTORY_LIMIT {
        history.pop_front();
    }
    history.push_back(item);
}

/// Messenger host state kept entirely in memory.
///
/// Cloning shares the same state, so the network worker (through
/// [`AccountService`]) and the host loop (through [`ConversationService`])
/// observe each other's changes.
#[derive(Debug, Clone, Default)]
pub struct InMemoryMessenger {
    state: Arc<Mutex<State>>,
}

impl InMemoryMessenger {
    /// A messenger with no accounts.
    pub fn new() -> Self {
        Self::default()
    }

    /// One jabber account with a few buddies and an echo buddy.
    pub fn demo() -> Self {
        Self::new()
            .with_account(
                "puppet@localhost",
                "prpl-jabber",
                ["alice@localhost", "bob@localhost", "echo"],
            )
            .with_echo_buddy("echo")
    }

    /// Adds an account and its buddy list.
    pub fn with_account<I, S>(self, username: &str, protocol_id: &str, buddies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.lock().accounts.push(AccountRecord {
            info: AccountInfo {
                username: username.to_string(),
                protocol_id: protocol_id.to_string(),
            },
            buddies: buddies.into_iter().map(Into::into).collect(),
            online: false,
        });
        self
    }

    /// IMs sent to `buddy` come back as incoming IMs.
    pub fn with_echo_buddy(self, buddy: &str) -> Self {
        self.lock().echo_buddy = Some(buddy.to_string());
        self
    }

    pub fn set_should_fail(&self, fail: bool) {
        self.lock().should_fail = fail;
    }

    // ── Host callbacks ────────────────────────────────────────────────────────

    /// Queues a callback for the host loop.
    pub fn push_host_event(&self, event: HostEvent) {
        self.lock().pending_events.push_back(event);
    }

    /// Takes every queued callback in arrival order.
    pub fn drain_host_events(&self) -> Vec<HostEvent> {
        self.lock().pending_events.drain(..).collect()
    }

    /// Applies the plugin's answer to a request-type callback.
    ///
    /// An accepted file transfer completes immediately (a `FileCompleted`
    /// callback is queued).  An accepted authorization request adds the remote
    /// user to the selected account's buddy list.
    pub fn apply_decision(&self, event: &HostEvent, decision: Decision) {
        let mut state = self.lock();
        match (event, decision) {
            (HostEvent::FileRequested { sender, filename }, Decision::Accept) => {
                let local_filename = format!("downloads/{filename}");
                state.record_file(sender.clone(), local_filename.clone());
                state.pending_events.push_back(HostEvent::FileCompleted {
                    sender: sender.clone(),
                    local_filename,
                });
            }
            (HostEvent::AuthorizationRequested { remote_user, .. }, Decision::Accept) => {
                if let Ok(account) = state.selected_mut() {
                    if !account.buddies.contains(remote_user) {
                        account.buddies.push(remote_user.clone());
                    }
                }
            }
            (event, Decision::Reject) => debug!(?event, "request rejected"),
            _ => {}
        }
    }

    // ── Inspection ────────────────────────────────────────────────────────────

    pub fn sent_messages(&self) -> Vec<SentMessage> {
        self.lock().sent.iter().cloned().collect()
    }

    /// Online flag of the selected account.
    pub fn is_online(&self) -> bool {
        self.lock().selected().map(|a| a.online).unwrap_or(false)
    }

    pub fn received_files(&self) -> Vec<(String, String)> {
        self.lock().received_files.iter().cloned().collect()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        // State stays consistent even if a holder panicked mid-update.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

// ── AccountService ────────────────────────────────────────────────────────────

impl AccountService for InMemoryMessenger {
    fn accounts(&self) -> Result<Vec<AccountInfo>, MessengerError> {
        let state = self.lock();
        state.check_failure()?;
        if state.accounts.is_empty() {
            return Err(MessengerError::NoData);
        }
        Ok(state.accounts.iter().map(|a| a.info.clone()).collect())
    }

    fn select_account(&self, username: &str, protocol_id: &str) -> Result<(), MessengerError> {
        let mut state = self.lock();
        state.check_failure()?;
        let index = state
            .accounts
            .iter()
            .position(|a| a.info.username == username && a.info.protocol_id == protocol_id)
            .ok_or_else(|| MessengerError::NoMatch(format!("{username} ({protocol_id})")))?;
        state.selected = Some(index);
        Ok(())
    }

    fn contact_list(&self) -> Result<Vec<String>, MessengerError> {
        let state = self.lock();
        state.check_failure()?;
        Ok(state.selected()?.buddies.clone())
    }

    fn set_online(&self, online: bool) -> Result<(), MessengerError> {
        let mut state = self.lock();
        state.check_failure()?;
        let account = state.selected_mut()?;
        account.online = online;
        info!(
            account = %account.info.username,
            status = if online { "available" } else { "offline" },
            "account status changed"
        );
        Ok(())
    }
}

// ── ConversationService ───────────────────────────────────────────────────────

impl ConversationService for InMemoryMessenger {
    fn send_im(&mut self, buddy: &str, text: &str) -> Result<(), MessengerError> {
        let mut state = self.lock();
        state.check_failure()?;
        let account = state.selected()?.info.username.clone();

        if !state.open_ims.iter().any(|b| b == buddy) {
            debug!(%buddy, "opening IM conversation");
            state.open_ims.push(buddy.to_string());
        }
        state.record_sent(SentMessage {
            account,
            to: buddy.to_string(),
            text: text.to_string(),
        });

        if state.echo_buddy.as_deref() == Some(buddy) {
            state.pending_events.push_back(HostEvent::ImReceived {
                sender: buddy.to_string(),
                text: text.to_string(),
            });
        }
        Ok(())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
