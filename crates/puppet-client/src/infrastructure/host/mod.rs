//! The host loop: the single thread that owns messenger conversation state.
//!
//! Each tick does two things, in order:
//!
//! 1. Executes requests the network worker queued on the handoff.
//! 2. Routes messenger callbacks through [`NotifyEventsUseCase`], applying any
//!    decision back to the messenger.  Callbacks raised while doing so (an
//!    echo reply, a completed file) are handled in the same tick.
//!
//! A tick never blocks.  [`HostLoop::run`] ticks on a fixed interval until
//! the agent connection reaches a final [`LinkState`].

use std::time::Duration;

use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use crate::application::notify_events::NotifyEventsUseCase;
use crate::infrastructure::handoff::HandoffReceiver;
use crate::infrastructure::messenger::InMemoryMessenger;
use crate::infrastructure::network::LinkState;

/// Work done by one [`HostLoop::tick`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Handoff requests executed.
    pub requests: usize,
    /// Messenger callbacks handled.
    pub events: usize,
}

pub struct HostLoop {
    handoff: HandoffReceiver,
    messenger: InMemoryMessenger,
    notifier: NotifyEventsUseCase,
}

impl HostLoop {
    pub fn new(
        handoff: HandoffReceiver,
        messenger: InMemoryMessenger,
        notifier: NotifyEventsUseCase,
    ) -> Self {
        Self {
            handoff,
            messenger,
            notifier,
        }
    }

    pub fn tick(&mut self) -> TickReport {
        let requests = self.handoff.poll(&mut self.messenger);

        let mut events = 0;
        loop {
            let batch = self.messenger.drain_host_events();
            if batch.is_empty() {
                break;
            }
            for event in batch {
                if let Some(decision) = self.notifier.handle(&event) {
                    self.messenger.apply_decision(&event, decision);
                }
                events += 1;
            }
        }

        let report = TickReport { requests, events };
        if report != TickReport::default() {
            debug!(?report, "host loop tick");
        }
        report
    }

    /// Ticks every `interval` until `link` reports a final state or its
    /// sender is dropped.
    pub async fn run(mut self, interval: Duration, mut link: watch::Receiver<LinkState>) -> LinkState {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.tick();
                }
                changed = link.changed() => {
                    let state = *link.borrow_and_update();
                    if changed.is_err() || state.is_final() {
                        info!(?state, "host loop exiting");
                        return state;
                    }
                }
            }
        }
    }
}
