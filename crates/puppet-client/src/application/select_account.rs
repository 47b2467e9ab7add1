//! Startup account selection.
//!
//! Every command acts on one selected account.  At startup the plugin picks
//! the first account the host reports; if there is none, the plugin cannot
//! serve anything and startup fails.

use thiserror::Error;
use tracing::info;

use super::dispatch_command::{AccountInfo, AccountService, MessengerError};

/// Errors that abort startup.
#[derive(Debug, Error)]
pub enum StartupError {
    /// The host has no accounts configured.
    #[error("no messenger account available")]
    NoAccounts,
    /// Listing accounts failed.
    #[error("could not list accounts: {0}")]
    ListAccounts(#[source] MessengerError),
    /// The first account exists but could not be selected.
    #[error("could not select account {username} ({protocol_id}): {source}")]
    Select {
        username: String,
        protocol_id: String,
        #[source]
        source: MessengerError,
    },
}

/// Selects the first account reported by `accounts` and returns it.
///
/// # Errors
///
/// Returns [`StartupError`] when no account exists or selection fails.
pub fn select_first_account(accounts: &dyn AccountService) -> Result<AccountInfo, StartupError> {
    let first = match accounts.accounts() {
        Ok(list) => list.into_iter().next().ok_or(StartupError::NoAccounts)?,
        Err(MessengerError::NoData) => return Err(StartupError::NoAccounts),
        Err(e) => return Err(StartupError::ListAccounts(e)),
    };

    accounts
        .select_account(&first.username, &first.protocol_id)
        .map_err(|source| StartupError::Select {
            username: first.username.clone(),
            protocol_id: first.protocol_id.clone(),
            source,
        })?;

    info!(username = %first.username, protocol_id = %first.protocol_id, "account selected");
    Ok(first)
}
