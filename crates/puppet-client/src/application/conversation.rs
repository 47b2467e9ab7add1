//! Conversation operations that only the host loop may perform.
//!
//! Messenger conversation objects are owned by the host's single-threaded
//! main loop, so the port below has no `Send` bound.  It is implemented on
//! host-loop state and driven by [`execute`] when a queued [`HostRequest`]
//! is picked up.

use puppet_core::Status;
use tracing::debug;

use super::dispatch_command::{HostRequest, MessengerError};

/// Host-loop-only messenger operations.
pub trait ConversationService {
    /// Sends an instant message, opening an IM conversation if needed.
    fn send_im(&mut self, buddy: &str, text: &str) -> Result<(), MessengerError>;
}

/// Runs one request against the conversation service and reports its status.
pub fn execute(service: &mut dyn ConversationService, request: &HostRequest) -> Status {
    let result = match request {
        HostRequest::SendIm { buddy, text } => service.send_im(buddy, text),
    };
    match result {
        Ok(()) => Status::Ok,
        Err(e) => {
            debug!(?request, "host request failed: {e}");
            Status::from(&e)
        }
    }
}
