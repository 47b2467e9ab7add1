//! puppet-client library entry point.
//!
//! Re-exports all public modules so that integration tests in `tests/`
//! and the binary entry point in `main.rs` share the same module tree.
//!
//! # What does puppet-client do? (for beginners)
//!
//! The plugin lives inside an instant-messenger host and lets an external
//! *agent* drive it remotely, e.g. from an automated test scenario.  The
//! agent listens on a TCP port; the plugin connects to it and then:
//!
//! 1. Receives commands (`get_contact_list`, `send_msg_to`, `go_online`, ...)
//!    encoded with the binary message format from `puppet_core`.
//! 2. Executes each command against the messenger.  Account operations run
//!    directly on the network thread; conversation operations are handed to
//!    the messenger's own host loop and awaited with a timeout.
//! 3. Answers every command (except `shutdown`) with exactly one reply whose
//!    status says whether it worked.
//! 4. Pushes asynchronous events (`msg_im_in`, `file_in`, `file_in_complete`)
//!    to the agent when the messenger reports them.
//!
//! If the agent goes away, the plugin keeps retrying until it is stopped or
//! the agent sends `shutdown`.

/// Application layer: use cases and the ports they call.
pub mod application;

/// Infrastructure layer: network, handoff, host loop, messenger, config.
pub mod infrastructure;
