//! Puppet client entry point.
//!
//! Wires the in-memory messenger, the agent connection, and the host loop
//! together, then runs until the agent sends `shutdown` or Ctrl-C is pressed.
//!
//! # Architecture
//!
//! ```text
//! main()
//!  └─ load_config()              -- TOML file + CLI/env overrides
//!  └─ select_first_account()     -- fatal if the messenger has none
//!  └─ AgentConnection::start()   -- worker thread: connect / dispatch / reconnect
//!  │     └─ DispatchCommandUseCase
//!  │           ├─ AccountService           (direct)
//!  │           └─ HandoffSender ─────┐     (bounded wait)
//!  └─ HostLoop::run()                │
//!        ├─ HandoffReceiver::poll() ◄┘
//!        └─ NotifyEventsUseCase ──► ConnectionEventSink ──► agent
//! ```
//!
//! # Shutdown
//!
//! `AgentConnection::stop` joins the worker thread, so it is called through
//! `spawn_blocking` to keep the async runtime responsive while it waits.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use puppet_client::application::dispatch_command::DispatchCommandUseCase;
use puppet_client::application::notify_events::NotifyEventsUseCase;
use puppet_client::application::select_account::select_first_account;
use puppet_client::infrastructure::{
    handoff::handoff_channel,
    host::HostLoop,
    messenger::InMemoryMessenger,
    network::AgentConnection,
    storage::config::{load_config, DEFAULT_CONFIG_FILE},
};

/// Messenger remote-control plugin.
///
/// Connects to an automation agent and executes the commands it sends.
#[derive(Debug, Parser)]
#[command(
    name = "puppet-client",
    about = "Remote-control plugin core for an instant messenger",
    version
)]
struct Cli {
    /// Path to the TOML configuration file.
    ///
    /// A missing file is not an error; built-in defaults are used instead.
    #[arg(long, default_value = DEFAULT_CONFIG_FILE, env = "PUPPET_CONFIG")]
    config: PathBuf,

    /// Agent host name or IP address.  Overrides `network.server_address`.
    #[arg(long, env = "PUPPET_SERVER_ADDRESS")]
    server_address: Option<String>,

    /// Agent TCP port.  Overrides `network.server_port`.
    #[arg(long, env = "PUPPET_SERVER_PORT")]
    server_port: Option<u16>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = load_config(&cli.config)
        .with_context(|| format!("loading configuration from {}", cli.config.display()))?;
    if let Some(address) = cli.server_address {
        config.network.server_address = address;
    }
    if let Some(port) = cli.server_port {
        config.network.server_port = port;
    }
    config.validate().context("invalid configuration")?;

    // RUST_LOG wins over the configured level.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.host.log_level)),
        )
        .init();

    info!(
        "puppet client starting; agent at {}:{}",
        config.network.server_address, config.network.server_port
    );

    // ── Messenger host ────────────────────────────────────────────────────────
    let messenger = InMemoryMessenger::demo();
    let account = select_first_account(&messenger).context("selecting a messenger account")?;

    // ── Agent connection ──────────────────────────────────────────────────────
    let (handoff_tx, handoff_rx) = handoff_channel(config.handoff_timeout());
    let dispatcher = DispatchCommandUseCase::new(Arc::new(messenger.clone()), Arc::new(handoff_tx))
        .with_reply_capacity(config.network.buffer_capacity);
    let connection = AgentConnection::start(config.connection(), dispatcher)
        .context("starting the agent connection")?;

    // ── Host loop ─────────────────────────────────────────────────────────────
    let notifier = NotifyEventsUseCase::new(
        Arc::new(connection.event_sink()),
        config.automation_policy(),
    );
    let host = HostLoop::new(handoff_rx, messenger, notifier);

    info!(account = %account.username, "ready; waiting for agent commands");

    tokio::select! {
        state = host.run(config.tick_interval(), connection.subscribe()) => {
            info!(?state, "agent connection finished");
        }
        signal = tokio::signal::ctrl_c() => {
            match signal {
                Ok(()) => info!("shutdown signal received"),
                Err(e) => warn!("failed to listen for Ctrl-C: {e}"),
            }
        }
    }

    tokio::task::spawn_blocking(move || connection.stop())
        .await
        .context("joining the network worker")?;

    info!("puppet client stopped");
    Ok(())
}
