//! Application layer use cases for the plugin.
//!
//! # What use cases does the plugin have?
//!
//! - **`dispatch_command`** – Resolves an inbound command, calls the messenger
//!   through the `AccountService` port or, for host-loop-only work, through a
//!   `HostLoopInvoker`, and builds the reply.
//!
//! - **`conversation`** – The `ConversationService` port for operations that
//!   must run on the host loop, and the function that executes a queued
//!   request against it.
//!
//! - **`notify_events`** – Turns messenger callbacks into agent events and
//!   applies the automation policy for file and authorization requests.
//!
//! - **`select_account`** – Picks the account all commands act on at startup.

pub mod conversation;
pub mod dispatch_command;
pub mod notify_events;
pub mod select_account;
