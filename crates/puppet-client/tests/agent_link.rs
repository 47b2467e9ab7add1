//! End-to-end tests of the plugin against a fake agent on a loopback socket.
//!
//! Each test binds a `TcpListener` on an ephemeral port, starts a real
//! `AgentConnection` pointed at it, and plays the agent's role by writing
//! encoded commands and reading the plugin's replies and events.

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::timeout;

use puppet_client::application::dispatch_command::DispatchCommandUseCase;
use puppet_client::application::notify_events::{AutomationPolicy, HostEvent, NotifyEventsUseCase};
use puppet_client::application::select_account::select_first_account;
use puppet_client::infrastructure::handoff::{handoff_channel, HandoffReceiver};
use puppet_client::infrastructure::host::HostLoop;
use puppet_client::infrastructure::messenger::InMemoryMessenger;
use puppet_client::infrastructure::network::{AgentConnection, ConnectionConfig, LinkState};
use puppet_core::{encode_message, FrameAccumulator, Message};

const WAIT: Duration = Duration::from_secs(5);

// ── Fake agent ────────────────────────────────────────────────────────────────

struct FakeAgent {
    stream: TcpStream,
    frames: FrameAccumulator,
}

impl FakeAgent {
    async fn accept(listener: &TcpListener) -> Self {
        let (stream, _) = timeout(WAIT, listener.accept())
            .await
            .expect("plugin connects in time")
            .expect("accept succeeds");
        Self {
            stream,
            frames: FrameAccumulator::new(),
        }
    }

    async fn send(&mut self, parts: &[&str]) {
        let bytes = encode_message(&Message::from_parts(parts.iter().copied())).unwrap();
        self.stream.write_all(&bytes).await.unwrap();
    }

    async fn recv(&mut self) -> Message {
        let mut chunk = [0u8; 512];
        timeout(WAIT, async {
            loop {
                if let Some(msg) = self.frames.next_message().unwrap() {
                    return msg;
                }
                let n = self.stream.read(&mut chunk).await.unwrap();
                assert!(n > 0, "plugin closed the connection");
                self.frames.push(&chunk[..n]);
            }
        })
        .await
        .expect("message arrives in time")
    }

    async fn request(&mut self, parts: &[&str]) -> Vec<String> {
        self.send(parts).await;
        self.recv().await.into_entries()
    }

    /// Waits until the plugin closes its side.
    async fn expect_eof(&mut self) {
        let mut chunk = [0u8; 64];
        let n = timeout(WAIT, self.stream.read(&mut chunk))
            .await
            .expect("plugin closes in time")
            .unwrap_or(0);
        assert_eq!(n, 0, "expected end of stream");
    }
}

// ── Plugin harness ────────────────────────────────────────────────────────────

struct Plugin {
    connection: AgentConnection,
    messenger: InMemoryMessenger,
    host: Option<JoinHandle<LinkState>>,
    _idle_handoff: Option<HandoffReceiver>,
}

impl Plugin {
    /// Starts a plugin against `listener` with a running host loop.
    async fn start(listener: &TcpListener) -> Self {
        Self::start_with(listener, Duration::from_secs(5), true).await
    }

    async fn start_with(listener: &TcpListener, handoff_timeout: Duration, run_host: bool) -> Self {
        let messenger = InMemoryMessenger::demo();
        select_first_account(&messenger).unwrap();

        let config = ConnectionConfig {
            server_address: "127.0.0.1".into(),
            server_port: listener.local_addr().unwrap().port(),
            reconnect_interval: Duration::from_millis(50),
            ..ConnectionConfig::default()
        };
        let (handoff_tx, handoff_rx) = handoff_channel(handoff_timeout);
        let dispatcher = DispatchCommandUseCase::new(Arc::new(messenger.clone()), Arc::new(handoff_tx));
        let connection = AgentConnection::start(config, dispatcher).unwrap();

        let (host, idle_handoff) = if run_host {
            let notifier = NotifyEventsUseCase::new(
                Arc::new(connection.event_sink()),
                AutomationPolicy::default(),
            );
            let host_loop = HostLoop::new(handoff_rx, messenger.clone(), notifier);
            let link = connection.subscribe();
            let task = tokio::spawn(host_loop.run(Duration::from_millis(10), link));
            (Some(task), None)
        } else {
            (None, Some(handoff_rx))
        };

        Self {
            connection,
            messenger,
            host,
            _idle_handoff: idle_handoff,
        }
    }

    async fn stop(self) -> LinkState {
        let mut link = self.connection.subscribe();
        let connection = self.connection;
        tokio::task::spawn_blocking(move || connection.stop())
            .await
            .unwrap();
        if let Some(host) = self.host {
            let _ = host.await;
        }
        let state = *link.borrow_and_update();
        state
    }
}

async fn wait_for_state(link: &mut watch::Receiver<LinkState>, wanted: LinkState) {
    timeout(WAIT, link.wait_for(|s| *s == wanted))
        .await
        .expect("state reached in time")
        .expect("worker still publishing state");
}

async fn listener() -> TcpListener {
    TcpListener::bind("127.0.0.1:0").await.unwrap()
}

// ── Commands ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_go_online_replies_ok_and_changes_account_state() {
    // Arrange
    let listener = listener().await;
    let plugin = Plugin::start(&listener).await;
    let mut agent = FakeAgent::accept(&listener).await;

    // Act
    let reply = agent.request(&["go_online"]).await;

    // Assert
    assert_eq!(reply, ["go_online", "ok"]);
    assert!(plugin.messenger.is_online());
    assert_eq!(plugin.stop().await, LinkState::Stopped);
}

#[tokio::test]
async fn test_unknown_command_and_contact_list() {
    let listener = listener().await;
    let plugin = Plugin::start(&listener).await;
    let mut agent = FakeAgent::accept(&listener).await;

    let unknown = agent.request(&["not_a_real_cmd"]).await;
    let contacts = agent.request(&["get_contact_list"]).await;

    assert_eq!(unknown, ["not_a_real_cmd", "error", "unknown_command"]);
    assert_eq!(
        contacts,
        ["get_contact_list", "ok", "alice@localhost", "bob@localhost", "echo"]
    );
    plugin.stop().await;
}

#[tokio::test]
async fn test_send_msg_to_runs_on_host_loop_and_echo_becomes_event() {
    // Arrange
    let listener = listener().await;
    let plugin = Plugin::start(&listener).await;
    let mut agent = FakeAgent::accept(&listener).await;

    // Act: the reply and the echo event may arrive in either order
    agent.send(&["send_msg_to", "echo", "marco"]).await;
    let first = agent.recv().await;
    let second = agent.recv().await;

    // Assert
    let (event, reply) = if first.is_event() { (first, second) } else { (second, first) };
    assert_eq!(reply.entries(), ["send_msg_to", "ok"]);
    assert_eq!(event.entries(), ["msg_im_in", "event", "echo", "marco"]);
    assert_eq!(plugin.messenger.sent_messages()[0].to, "echo");
    plugin.stop().await;
}

#[tokio::test]
async fn test_send_chat_msg_to_is_answered_as_unknown_command() {
    let listener = listener().await;
    let plugin = Plugin::start(&listener).await;
    let mut agent = FakeAgent::accept(&listener).await;

    let reply = agent.request(&["send_chat_msg_to", "lobby@conference.localhost", "hi"]).await;

    assert_eq!(reply, ["send_chat_msg_to", "error", "unknown_command"]);
    assert!(plugin.messenger.sent_messages().is_empty());
    plugin.stop().await;
}

#[tokio::test]
async fn test_oversized_unknown_name_gets_truncated_reply_and_link_survives() {
    // Arrange: a 4060-byte name fits inbound but cannot be echoed in full
    let listener = listener().await;
    let plugin = Plugin::start(&listener).await;
    let mut agent = FakeAgent::accept(&listener).await;
    let name = "q".repeat(4060);

    // Act
    let reply = agent.request(&[name.as_str()]).await;

    // Assert
    assert_eq!(reply[1..], ["critical", "out_of_mem"]);
    assert!(!reply[0].is_empty() && name.starts_with(reply[0].as_str()));
    assert_eq!(agent.request(&["go_online"]).await, ["go_online", "ok"]);
    plugin.stop().await;
}

#[tokio::test]
async fn test_handoff_without_host_loop_times_out_as_generic_error() {
    // Arrange: the host loop never polls
    let listener = listener().await;
    let plugin = Plugin::start_with(&listener, Duration::from_millis(100), false).await;
    let mut agent = FakeAgent::accept(&listener).await;

    // Act
    let reply = agent.request(&["send_msg_to", "bob@localhost", "hello"]).await;

    // Assert: the worker keeps serving after the timeout
    assert_eq!(reply, ["send_msg_to", "error", "generic_error"]);
    assert_eq!(agent.request(&["go_offline"]).await, ["go_offline", "ok"]);
    assert!(plugin.messenger.sent_messages().is_empty());
    plugin.stop().await;
}

// ── Events ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_incoming_file_is_reported_twice() {
    let listener = listener().await;
    let plugin = Plugin::start(&listener).await;
    let mut agent = FakeAgent::accept(&listener).await;
    let mut link = plugin.connection.subscribe();
    wait_for_state(&mut link, LinkState::Connected).await;

    plugin.messenger.push_host_event(HostEvent::FileRequested {
        sender: "alice@localhost".into(),
        filename: "plan.txt".into(),
    });
    let first = agent.recv().await;
    let second = agent.recv().await;

    let mut names = [first.name().unwrap().to_string(), second.name().unwrap().to_string()];
    names.sort();
    assert_eq!(names, ["file_in", "file_in_complete"]);
    assert!(first.is_event() && second.is_event());
    plugin.stop().await;
}

// ── Lifecycle ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_shutdown_terminates_worker_without_reply() {
    // Arrange
    let listener = listener().await;
    let plugin = Plugin::start(&listener).await;
    let mut agent = FakeAgent::accept(&listener).await;
    let mut link = plugin.connection.subscribe();

    // Act
    agent.send(&["shutdown"]).await;

    // Assert
    wait_for_state(&mut link, LinkState::Terminated).await;
    agent.expect_eof().await;
    assert_eq!(plugin.stop().await, LinkState::Terminated);
}

#[tokio::test]
async fn test_plugin_reconnects_after_agent_drops() {
    // Arrange
    let listener = listener().await;
    let plugin = Plugin::start(&listener).await;
    let first = FakeAgent::accept(&listener).await;

    // Act
    drop(first);
    let mut second = FakeAgent::accept(&listener).await;

    // Assert
    assert_eq!(second.request(&["go_online"]).await, ["go_online", "ok"]);
    plugin.stop().await;
}

#[tokio::test]
async fn test_stop_closes_connection_and_reports_stopped() {
    let listener = listener().await;
    let plugin = Plugin::start(&listener).await;
    let mut agent = FakeAgent::accept(&listener).await;

    let state = plugin.stop().await;

    assert_eq!(state, LinkState::Stopped);
    agent.expect_eof().await;
}

#[tokio::test]
async fn test_stop_while_agent_unreachable_returns_promptly() {
    // Arrange: bind then drop, so nothing listens on the port
    let port = {
        let l = listener().await;
        l.local_addr().unwrap().port()
    };
    let messenger = InMemoryMessenger::demo();
    let (handoff_tx, _handoff_rx) = handoff_channel(Duration::from_secs(5));
    let dispatcher = DispatchCommandUseCase::new(Arc::new(messenger), Arc::new(handoff_tx));
    let config = ConnectionConfig {
        server_port: port,
        reconnect_interval: Duration::from_secs(60),
        ..ConnectionConfig::default()
    };
    let connection = AgentConnection::start(config, dispatcher).unwrap();
    let mut link = connection.subscribe();
    wait_for_state(&mut link, LinkState::Disconnected).await;

    // Act: the worker is sleeping out a long reconnect interval
    let stopped = timeout(WAIT, tokio::task::spawn_blocking(move || connection.stop())).await;

    // Assert
    assert!(stopped.is_ok(), "stop must interrupt the reconnect wait");
    assert_eq!(*link.borrow(), LinkState::Stopped);
}
