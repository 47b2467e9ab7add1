//! Infrastructure layer for the plugin.
//!
//! Contains the adapters behind the application ports: the TCP link to the
//! agent, the cross-thread handoff, the messenger host, and configuration.
//!
//! **Dependency rule**: this layer may depend on `application` and
//! `puppet_core`, but MUST NOT be imported by the `application` layer.
//!
//! # Sub-modules
//!
//! - **`handoff`** – Bounded request/reply channel from the network worker to
//!   the host loop.  Implements `HostLoopInvoker`.
//!
//! - **`host`** – The host loop: drains the handoff and routes messenger
//!   callbacks through `NotifyEventsUseCase` on a fixed tick.
//!
//! - **`messenger`** – In-memory implementation of the `AccountService` and
//!   `ConversationService` ports.
//!
//! - **`network`** – Dedicated worker thread that connects to the agent,
//!   reads framed commands, replies, and reconnects when the link drops.
//!   Events share its send lock.
//!
//! - **`storage`** – TOML configuration loading with defaults.

pub mod handoff;
pub mod host;
pub mod messenger;
pub mod network;
pub mod storage;
