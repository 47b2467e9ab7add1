//! Network infrastructure: the TCP connection to the automation agent.
//!
//! Architecture:
//! - `AgentConnection` owns a dedicated OS thread running a current-thread
//!   Tokio runtime.  The thread connects, serves one [`session::Session`] at
//!   a time, and reconnects after a fixed interval until stopped.
//! - Replies (from the session) and events (from [`ConnectionEventSink`])
//!   share one [`SendChannel`], i.e. one buffer behind one lock.
//! - The current [`LinkState`] is published on a `watch` channel so the host
//!   loop can notice when the agent sends `shutdown`.
//!
//! ```text
//! Disconnected ─► Connecting ─► Connected ─► Disconnected ─► … (retry)
//!                                   │
//!                                   ├─ shutdown command ─► Terminated
//!                                   └─ stop()           ─► Stopped
//! ```

pub mod event_sink;
pub mod send_channel;
pub mod session;

use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use puppet_core::protocol::codec::DEFAULT_CAPACITY;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::net::{tcp::OwnedWriteHalf, TcpStream};
use tokio::runtime::Handle;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

pub use event_sink::ConnectionEventSink;
pub use send_channel::{SendChannel, SendError};
pub use session::{Session, SessionOutcome};

use crate::application::dispatch_command::DispatchCommandUseCase;

/// Errors that prevent the network worker from starting.
#[derive(Debug, Error)]
pub enum NetworkError {
    /// The worker's async runtime could not be created.
    #[error("failed to build network runtime: {0}")]
    Runtime(#[source] std::io::Error),
    /// The worker thread could not be spawned.
    #[error("failed to spawn network worker: {0}")]
    Spawn(#[source] std::io::Error),
}

/// Configuration for the agent connection.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Host name or IP address of the agent.
    pub server_address: String,
    /// TCP port of the agent.
    pub server_port: u16,
    /// Wait between connection attempts.
    pub reconnect_interval: Duration,
    /// Maximum size of one message in either direction.
    pub buffer_capacity: usize,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            server_address: "127.0.0.1".to_string(),
            server_port: 11001,
            reconnect_interval: Duration::from_secs(1),
            buffer_capacity: DEFAULT_CAPACITY,
        }
    }
}

/// Observable state of the agent connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Disconnected,
    Connecting,
    Connected,
    /// The agent sent `shutdown`; the worker has exited.
    Terminated,
    /// `stop()` was called; the worker has exited.
    Stopped,
}

impl LinkState {
    /// Returns `true` once the worker will not connect again.
    pub fn is_final(self) -> bool {
        matches!(self, LinkState::Terminated | LinkState::Stopped)
    }
}

/// Handle to the running network worker.
pub struct AgentConnection {
    stop_tx: watch::Sender<bool>,
    state_rx: watch::Receiver<LinkState>,
    channel: SendChannel<OwnedWriteHalf>,
    runtime: Handle,
    worker: Option<JoinHandle<()>>,
}

impl AgentConnection {
    /// Spawns the worker thread and starts connecting.
    ///
    /// # Errors
    ///
    /// Returns [`NetworkError`] if the runtime or thread cannot be created.
    pub fn start(
        config: ConnectionConfig,
        dispatcher: DispatchCommandUseCase,
    ) -> Result<Self, NetworkError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(NetworkError::Runtime)?;
        let handle = runtime.handle().clone();

        let (stop_tx, stop_rx) = watch::channel(false);
        let (state_tx, state_rx) = watch::channel(LinkState::Disconnected);
        let channel = SendChannel::new(config.buffer_capacity);

        let worker = Worker {
            config,
            dispatcher: Arc::new(dispatcher),
            channel: channel.clone(),
            state_tx,
            stop_rx,
        };
        let join = std::thread::Builder::new()
            .name("puppet-net".to_string())
            .spawn(move || runtime.block_on(worker.run()))
            .map_err(NetworkError::Spawn)?;

        Ok(Self {
            stop_tx,
            state_rx,
            channel,
            runtime: handle,
            worker: Some(join),
        })
    }

    /// Current connection state.
    pub fn state(&self) -> LinkState {
        *self.state_rx.borrow()
    }

    /// Receiver notified on every state change.
    pub fn subscribe(&self) -> watch::Receiver<LinkState> {
        self.state_rx.clone()
    }

    /// An [`EventSink`](crate::application::notify_events::EventSink) that
    /// writes through this connection.
    pub fn event_sink(&self) -> ConnectionEventSink<OwnedWriteHalf> {
        ConnectionEventSink::new(self.channel.clone(), self.runtime.clone())
    }

    /// Requests a stop, unblocks any pending read, and joins the worker.
    ///
    /// Blocks the calling thread until the worker has exited.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        let _ = self.stop_tx.send(true);
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                error!("network worker panicked");
            }
        }
    }
}

impl Drop for AgentConnection {
    fn drop(&mut self) {
        self.shutdown();
    }
}

// ── Worker ────────────────────────────────────────────────────────────────────

struct Worker {
    config: ConnectionConfig,
    dispatcher: Arc<DispatchCommandUseCase>,
    channel: SendChannel<OwnedWriteHalf>,
    state_tx: watch::Sender<LinkState>,
    stop_rx: watch::Receiver<bool>,
}

impl Worker {
    async fn run(mut self) {
        loop {
            if *self.stop_rx.borrow() {
                break;
            }
            self.set_state(LinkState::Connecting);

            let address = (self.config.server_address.as_str(), self.config.server_port);
            let connected = tokio::select! {
                r = TcpStream::connect(address) => r,
                _ = self.stop_rx.changed() => break,
            };

            match connected {
                Ok(stream) => match self.serve(stream).await {
                    SessionOutcome::Reconnect => {
                        self.set_state(LinkState::Disconnected);
                        info!(
                            "disconnected from agent; reconnecting in {:?}",
                            self.config.reconnect_interval
                        );
                    }
                    SessionOutcome::Terminate => {
                        self.set_state(LinkState::Terminated);
                        info!("network worker terminated by agent");
                        return;
                    }
                    SessionOutcome::Stop => break,
                },
                Err(e) => {
                    self.set_state(LinkState::Disconnected);
                    warn!(
                        "could not connect to agent at {}:{}: {e}",
                        self.config.server_address, self.config.server_port
                    );
                }
            }

            if !self.wait_before_reconnect().await {
                break;
            }
        }

        self.set_state(LinkState::Stopped);
        info!("network worker stopped");
    }

    async fn serve(&mut self, stream: TcpStream) -> SessionOutcome {
        let session_id = Uuid::new_v4();
        info!(
            session = %session_id,
            "connected to agent at {}:{}", self.config.server_address, self.config.server_port
        );
        if let Err(e) = stream.set_nodelay(true) {
            debug!("could not set TCP_NODELAY: {e}");
        }

        let (reader, writer) = stream.into_split();
        self.channel.attach(writer).await;
        self.set_state(LinkState::Connected);

        let session = Session::new(
            Arc::clone(&self.dispatcher),
            self.channel.clone(),
            self.config.buffer_capacity,
            session_id,
        );
        let outcome = session.run(reader, &mut self.stop_rx).await;

        if let Some(mut writer) = self.channel.detach().await {
            let _ = writer.shutdown().await;
        }
        debug!(session = %session_id, ?outcome, "session ended");
        outcome
    }

    /// Sleeps for the reconnect interval; returns `false` if stopped meanwhile.
    async fn wait_before_reconnect(&mut self) -> bool {
        tokio::select! {
            () = tokio::time::sleep(self.config.reconnect_interval) => true,
            _ = self.stop_rx.changed() => false,
        }
    }

    fn set_state(&self, state: LinkState) {
        let previous = self.state_tx.send_replace(state);
        if previous != state {
            debug!(?previous, ?state, "link state changed");
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
