//! Messenger adapters.
//!
//! The plugin talks to the messenger only through the `AccountService` and
//! `ConversationService` ports.  This module provides the in-memory host used
//! by the binary and the test suites.

pub mod in_memory;

pub use in_memory::{InMemoryMessenger, SentMessage, HISTORY_LIMIT};
