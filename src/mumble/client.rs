//! Mumble endpoint: link task and control-channel session.

use std::collections::HashMap;

use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::Duration;
use tracing::{debug, info, warn};

use crate::common::error::{ConnectionError, ProtocolError};
use crate::common::{EventSink, LinkEvent};
use crate::config::types::MumbleConfig;
use crate::endpoint::{queue_command, Endpoint, EndpointKind, Identity, LinkCommand};
use crate::protocol::mumble::messages::{
    msg_type, Authenticate, ChannelState, Ping, Reject, ServerSync, TextMessage, UserRemove,
    UserState, Version,
};
use crate::protocol::mumble::{new_control_connection, ControlConnection};

const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(30);
/// The server drops clients silent for 30 seconds.
const PING_INTERVAL: Duration = Duration::from_secs(15);

/// How a session ended after it was established.
#[derive(Debug, PartialEq, Eq)]
enum SessionEnd {
    /// Torn down by a `Disconnect` command.
    Stopped,
    /// The server went away.
    Dropped,
}

/// Live server state the session tracks: who is who, and where we are.
struct SessionState {
    session_id: u32,
    /// Session id to nickname, fed by UserState announcements.
    users: HashMap<u32, String>,
    /// Lowercased channel name to id, fed by ChannelState announcements.
    channels: HashMap<String, u32>,
    /// The channel we relay into; root until the configured one resolves.
    channel_id: u32,
}

/// Handle to the Mumble link task.
pub struct MumbleEndpoint {
    identity: Identity,
    commands: mpsc::UnboundedSender<LinkCommand>,
}

impl MumbleEndpoint {
    /// Create the endpoint and spawn its link task. No connection is
    /// attempted until `start()`.
    pub fn spawn(config: MumbleConfig, events: EventSink) -> Self {
        let identity = Identity::new("mumble", &config.nickname);
        let (commands, commands_rx) = mpsc::unbounded_channel();
        tokio::spawn(link_task(config, commands_rx, events));
        Self { identity, commands }
    }
}

impl Endpoint for MumbleEndpoint {
    fn kind(&self) -> EndpointKind {
        EndpointKind::Mumble
    }

    fn identity(&self) -> &Identity {
        &self.identity
    }

    fn start(&self) {
        queue_command(&self.commands, LinkCommand::Connect);
    }

    fn stop(&self) {
        queue_command(&self.commands, LinkCommand::Disconnect);
    }

    fn send_text(&self, text: &str) {
        queue_command(&self.commands, LinkCommand::Send(text.to_string()));
    }

    fn set_presence(&self, status: Option<&str>) {
        queue_command(
            &self.commands,
            LinkCommand::SetPresence(status.map(str::to_string)),
        );
    }
}

/// Owns the connection lifecycle. One `Connect` command runs one session;
/// reconnection is driven from outside via the retry scheduling, which
/// calls `start()` again after a delay.
async fn link_task(
    config: MumbleConfig,
    mut commands: mpsc::UnboundedReceiver<LinkCommand>,
    events: EventSink,
) {
    while let Some(command) = commands.recv().await {
        match command {
            LinkCommand::Connect => {
                let session = match connect(&config).await {
                    Ok(stream) => run_session(stream, &config, &mut commands, &events).await,
                    Err(e) => Err(e),
                };
                match session {
                    Ok(SessionEnd::Stopped) => info!("Mumble session closed"),
                    Ok(SessionEnd::Dropped) => {
                        let _ = events.send(LinkEvent::lost(EndpointKind::Mumble));
                    }
                    Err(e) => {
                        warn!("Mumble connection failed: {}", e);
                        let _ = events.send(LinkEvent::failed(EndpointKind::Mumble));
                    }
                }
            }
            LinkCommand::Disconnect => debug!("Mumble already disconnected"),
            LinkCommand::Send(_) | LinkCommand::SetPresence(_) => {
                debug!("Mumble not connected, dropping outbound message");
            }
        }
    }
}

async fn connect(
    config: &MumbleConfig,
) -> Result<tokio_native_tls::TlsStream<TcpStream>, ConnectionError> {
    info!(
        "Connecting to Mumble server at {}:{}",
        config.server, config.port
    );

    let tcp = TcpStream::connect((config.server.as_str(), config.port))
        .await
        .map_err(|e| ConnectionError::ConnectFailed {
            host: config.server.clone(),
            port: config.port,
            source: e,
        })?;

    let connector = native_tls::TlsConnector::builder()
        .danger_accept_invalid_certs(!config.tls_verify)
        .danger_accept_invalid_hostnames(!config.tls_verify)
        .build()
        .map_err(|e| ConnectionError::TlsFailed {
            host: config.server.clone(),
            message: e.to_string(),
        })?;

    tokio_native_tls::TlsConnector::from(connector)
        .connect(&config.server, tcp)
        .await
        .map_err(|e| ConnectionError::TlsFailed {
            host: config.server.clone(),
            message: e.to_string(),
        })
}

/// Handshake, channel join and the steady-state relay loop.
///
/// Errors before the handshake completes count as a failed connection
/// attempt. Afterwards the session only ends through a `Disconnect`
/// command (`Stopped`) or because the server went away (`Dropped`).
async fn run_session<S>(
    stream: S,
    config: &MumbleConfig,
    commands: &mut mpsc::UnboundedReceiver<LinkCommand>,
    events: &EventSink,
) -> Result<SessionEnd, ConnectionError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut connection = new_control_connection(stream);

    let mut state =
        match tokio::time::timeout(HANDSHAKE_TIMEOUT, handshake(&mut connection, config)).await {
            Ok(result) => result?,
            Err(_) => return Err(ConnectionError::Timeout),
        };

    // Move into the configured channel if the server announced it.
    match state.channels.get(&config.channel.to_lowercase()) {
        Some(&channel_id) => {
            state.channel_id = channel_id;
            let join = UserState {
                session: Some(state.session_id),
                channel_id: Some(channel_id),
                ..Default::default()
            };
            connection.send(join.encode()).await?;
        }
        None => warn!(
            "Channel '{}' not found, staying in the root channel",
            config.channel
        ),
    }

    info!(
        "Connected to Mumble as {} (session {})",
        config.nickname, state.session_id
    );
    let _ = events.send(LinkEvent::established(EndpointKind::Mumble));

    let mut ping_interval =
        tokio::time::interval_at(tokio::time::Instant::now() + PING_INTERVAL, PING_INTERVAL);
    ping_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    let mut ping_counter: u64 = 0;

    let end = loop {
        tokio::select! {
            frame = connection.next() => {
                let frame = match frame {
                    Some(Ok(frame)) => frame,
                    Some(Err(e)) => {
                        warn!("Mumble read error: {}", e);
                        break SessionEnd::Dropped;
                    }
                    None => {
                        info!("Mumble server closed the connection");
                        break SessionEnd::Dropped;
                    }
                };
                match frame.msg_type {
                    msg_type::TEXT_MESSAGE => match TextMessage::decode(frame.payload) {
                        Ok(message) => {
                            if let Some(event) = inbound_text(&state, message) {
                                let _ = events.send(event);
                            }
                        }
                        Err(e) => warn!("Undecodable text message: {}", e),
                    },
                    msg_type::USER_STATE => match UserState::decode(frame.payload) {
                        Ok(user) => record_user(&mut state.users, &user),
                        Err(e) => warn!("Undecodable user state: {}", e),
                    },
                    msg_type::USER_REMOVE => {
                        if let Ok(removed) = UserRemove::decode(frame.payload) {
                            if let Some(session) = removed.session {
                                state.users.remove(&session);
                            }
                        }
                    }
                    msg_type::CHANNEL_STATE => {
                        if let Ok(channel) = ChannelState::decode(frame.payload) {
                            record_channel(&mut state.channels, channel);
                        }
                    }
                    msg_type::PING => {}
                    _ => {}
                }
            }
            command = commands.recv() => match command {
                Some(LinkCommand::Send(text)) => {
                    let message = TextMessage {
                        actor: None,
                        channel_id: vec![state.channel_id],
                        message: text,
                    };
                    if connection.send(message.encode()).await.is_err() {
                        break SessionEnd::Dropped;
                    }
                }
                Some(LinkCommand::SetPresence(status)) => {
                    // An empty comment clears a previously set one.
                    let comment = UserState {
                        session: Some(state.session_id),
                        comment: Some(status.unwrap_or_default()),
                        ..Default::default()
                    };
                    if connection.send(comment.encode()).await.is_err() {
                        break SessionEnd::Dropped;
                    }
                }
                Some(LinkCommand::Disconnect) => break SessionEnd::Stopped,
                Some(LinkCommand::Connect) => debug!("Mumble already connected"),
                None => break SessionEnd::Stopped,
            },
            _ = ping_interval.tick() => {
                ping_counter += 1;
                if connection.send(Ping { timestamp: ping_counter }.encode()).await.is_err() {
                    break SessionEnd::Dropped;
                }
            }
        }
    };
    Ok(end)
}

/// Version exchange and authentication, collecting the channel and user
/// tables the server announces, until ServerSync confirms us.
async fn handshake<S>(
    connection: &mut ControlConnection<S>,
    config: &MumbleConfig,
) -> Result<SessionState, ConnectionError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let release = format!("ferryman {}", env!("CARGO_PKG_VERSION"));
    connection.send(Version::current(&release).encode()).await?;

    let auth = Authenticate {
        username: config.nickname.clone(),
        password: config.password.clone(),
        tokens: config.tokens.clone(),
    };
    connection.send(auth.encode()).await?;

    let mut users = HashMap::new();
    let mut channels = HashMap::new();
    loop {
        let frame = match connection.next().await {
            Some(Ok(frame)) => frame,
            Some(Err(e)) => return Err(e.into()),
            None => return Err(ConnectionError::ConnectionClosed),
        };
        match frame.msg_type {
            msg_type::REJECT => {
                let reject = Reject::decode(frame.payload)?;
                return Err(ConnectionError::Rejected {
                    reason: reject.reason,
                });
            }
            msg_type::CHANNEL_STATE => {
                record_channel(&mut channels, ChannelState::decode(frame.payload)?);
            }
            msg_type::USER_STATE => {
                record_user(&mut users, &UserState::decode(frame.payload)?);
            }
            msg_type::SERVER_SYNC => {
                let sync = ServerSync::decode(frame.payload)?;
                let session_id = sync.session.ok_or(ConnectionError::Protocol(
                    ProtocolError::InvalidMessage {
                        message: "ServerSync without session id".to_string(),
                    },
                ))?;
                if let Some(welcome) = sync.welcome_text {
                    debug!("Server welcome: {}", welcome);
                }
                return Ok(SessionState {
                    session_id,
                    users,
                    channels,
                    channel_id: 0,
                });
            }
            _ => {}
        }
    }
}

fn record_channel(channels: &mut HashMap<String, u32>, state: ChannelState) {
    if let (Some(channel_id), Some(name)) = (state.channel_id, state.name) {
        channels.insert(name.to_lowercase(), channel_id);
    }
}

fn record_user(users: &mut HashMap<u32, String>, state: &UserState) {
    if let (Some(session), Some(name)) = (state.session, &state.name) {
        users.insert(session, name.clone());
    }
}

/// Turn an inbound text message into a bridge event, resolving the actor
/// session to a nickname.
fn inbound_text(state: &SessionState, message: TextMessage) -> Option<LinkEvent> {
    let actor = message.actor?;
    let sender = state
        .users
        .get(&actor)
        .cloned()
        .unwrap_or_else(|| format!("session-{actor}"));
    Some(LinkEvent::message(
        EndpointKind::Mumble,
        sender,
        message.message,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::mumble::Frame;
    use tokio::io::{duplex, DuplexStream};
    use tokio::task::JoinHandle;

    fn test_config() -> MumbleConfig {
        MumbleConfig {
            server: "voice.example.org".to_string(),
            port: 64738,
            nickname: "bridge".to_string(),
            channel: "Lobby".to_string(),
            password: String::new(),
            tokens: Vec::new(),
            tls_verify: false,
            loglevel: "info".to_string(),
            reconnect_delay: 5,
            retry_delay: 15,
        }
    }

    struct TestSession {
        commands: mpsc::UnboundedSender<LinkCommand>,
        events: mpsc::UnboundedReceiver<LinkEvent>,
        server: ControlConnection<DuplexStream>,
        task: JoinHandle<Result<SessionEnd, ConnectionError>>,
    }

    fn start_session(config: MumbleConfig) -> TestSession {
        let (client, server) = duplex(64 * 1024);
        let (commands, mut commands_rx) = mpsc::unbounded_channel();
        let (events_tx, events) = mpsc::unbounded_channel();
        let task = tokio::spawn(async move {
            run_session(client, &config, &mut commands_rx, &events_tx).await
        });
        TestSession {
            commands,
            events,
            server: new_control_connection(server),
            task,
        }
    }

    async fn expect_frame(server: &mut ControlConnection<DuplexStream>, wanted: u16) -> Frame {
        loop {
            let frame = server
                .next()
                .await
                .expect("server stream ended")
                .expect("bad frame from client");
            if frame.msg_type == msg_type::PING {
                continue;
            }
            assert_eq!(frame.msg_type, wanted, "unexpected frame type");
            return frame;
        }
    }

    async fn send_frame(server: &mut ControlConnection<DuplexStream>, frame: Frame) {
        server.send(frame).await.unwrap();
    }

    fn channel_state(channel_id: u32, name: &str) -> Frame {
        // Reuse UserState-style encoding via the raw helpers.
        use crate::protocol::mumble::wire::{put_string_field, put_uint_field};
        let mut buf = bytes::BytesMut::new();
        put_uint_field(&mut buf, 1, u64::from(channel_id));
        put_string_field(&mut buf, 3, name);
        Frame::new(msg_type::CHANNEL_STATE, buf.freeze())
    }

    fn server_sync(session: u32) -> Frame {
        use crate::protocol::mumble::wire::put_uint_field;
        let mut buf = bytes::BytesMut::new();
        put_uint_field(&mut buf, 1, u64::from(session));
        Frame::new(msg_type::SERVER_SYNC, buf.freeze())
    }

    fn reject(reason: &str) -> Frame {
        use crate::protocol::mumble::wire::put_string_field;
        let mut buf = bytes::BytesMut::new();
        put_string_field(&mut buf, 2, reason);
        Frame::new(msg_type::REJECT, buf.freeze())
    }

    async fn establish(session: &mut TestSession) {
        expect_frame(&mut session.server, msg_type::VERSION).await;
        expect_frame(&mut session.server, msg_type::AUTHENTICATE).await;

        send_frame(&mut session.server, channel_state(3, "Lobby")).await;
        send_frame(
            &mut session.server,
            UserState {
                session: Some(1),
                name: Some("bridge".to_string()),
                ..Default::default()
            }
            .encode(),
        )
        .await;
        send_frame(&mut session.server, server_sync(1)).await;

        // Joining the configured channel comes before the established event.
        let join = expect_frame(&mut session.server, msg_type::USER_STATE).await;
        let join = UserState::decode(join.payload).unwrap();
        assert_eq!(join.channel_id, Some(3));

        assert_eq!(
            session.events.recv().await.unwrap(),
            LinkEvent::established(EndpointKind::Mumble)
        );
    }

    #[tokio::test]
    async fn test_handshake_and_channel_join() {
        let mut session = start_session(test_config());
        establish(&mut session).await;
    }

    #[tokio::test]
    async fn test_inbound_text_resolves_sender() {
        let mut session = start_session(test_config());
        establish(&mut session).await;

        send_frame(
            &mut session.server,
            UserState {
                session: Some(7),
                name: Some("alice".to_string()),
                channel_id: Some(3),
                ..Default::default()
            }
            .encode(),
        )
        .await;
        send_frame(
            &mut session.server,
            TextMessage {
                actor: Some(7),
                channel_id: vec![3],
                message: "hello".to_string(),
            }
            .encode(),
        )
        .await;

        assert_eq!(
            session.events.recv().await.unwrap(),
            LinkEvent::message(EndpointKind::Mumble, "alice", "hello")
        );
    }

    #[tokio::test]
    async fn test_unknown_sender_still_relayed() {
        let mut session = start_session(test_config());
        establish(&mut session).await;

        send_frame(
            &mut session.server,
            TextMessage {
                actor: Some(42),
                channel_id: vec![3],
                message: "mystery".to_string(),
            }
            .encode(),
        )
        .await;

        assert_eq!(
            session.events.recv().await.unwrap(),
            LinkEvent::message(EndpointKind::Mumble, "session-42", "mystery")
        );
    }

    #[tokio::test]
    async fn test_outbound_text_targets_joined_channel() {
        let mut session = start_session(test_config());
        establish(&mut session).await;

        session
            .commands
            .send(LinkCommand::Send("from irc".to_string()))
            .unwrap();

        let frame = expect_frame(&mut session.server, msg_type::TEXT_MESSAGE).await;
        let message = TextMessage::decode(frame.payload).unwrap();
        assert_eq!(message.channel_id, vec![3]);
        assert_eq!(message.message, "from irc");
    }

    #[tokio::test]
    async fn test_presence_maps_to_comment() {
        let mut session = start_session(test_config());
        establish(&mut session).await;

        session
            .commands
            .send(LinkCommand::SetPresence(Some("link down".to_string())))
            .unwrap();
        let frame = expect_frame(&mut session.server, msg_type::USER_STATE).await;
        let comment = UserState::decode(frame.payload).unwrap();
        assert_eq!(comment.session, Some(1));
        assert_eq!(comment.comment.as_deref(), Some("link down"));

        session.commands.send(LinkCommand::SetPresence(None)).unwrap();
        let frame = expect_frame(&mut session.server, msg_type::USER_STATE).await;
        let cleared = UserState::decode(frame.payload).unwrap();
        assert_eq!(cleared.comment.as_deref(), Some(""));
    }

    #[tokio::test]
    async fn test_reject_fails_the_attempt() {
        let mut session = start_session(test_config());

        expect_frame(&mut session.server, msg_type::VERSION).await;
        expect_frame(&mut session.server, msg_type::AUTHENTICATE).await;
        send_frame(&mut session.server, reject("Invalid server password")).await;

        let result = session.task.await.unwrap();
        match result {
            Err(ConnectionError::Rejected { reason }) => {
                assert_eq!(reason, "Invalid server password");
            }
            other => panic!("expected rejection, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_server_drop_after_sync_is_lost_not_failed() {
        let mut session = start_session(test_config());
        establish(&mut session).await;

        drop(session.server);
        let end = session.task.await.unwrap().unwrap();
        assert_eq!(end, SessionEnd::Dropped);
    }

    #[tokio::test]
    async fn test_stop_from_message_handler_does_not_deadlock() {
        let mut session = start_session(test_config());
        establish(&mut session).await;

        send_frame(
            &mut session.server,
            TextMessage {
                actor: Some(9),
                channel_id: vec![3],
                message: "quit now".to_string(),
            }
            .encode(),
        )
        .await;
        session.events.recv().await.unwrap();

        // A handler reacting to the event stops the endpoint synchronously.
        session.commands.send(LinkCommand::Disconnect).unwrap();

        let end = tokio::time::timeout(Duration::from_secs(5), session.task)
            .await
            .expect("session did not exit")
            .unwrap()
            .unwrap();
        assert_eq!(end, SessionEnd::Stopped);
    }

    #[tokio::test]
    async fn test_missing_channel_stays_in_root() {
        let mut config = test_config();
        config.channel = "Backstage".to_string();
        let mut session = start_session(config);

        expect_frame(&mut session.server, msg_type::VERSION).await;
        expect_frame(&mut session.server, msg_type::AUTHENTICATE).await;
        send_frame(&mut session.server, channel_state(3, "Lobby")).await;
        send_frame(&mut session.server, server_sync(1)).await;

        // No join is sent; the endpoint reports established directly.
        assert_eq!(
            session.events.recv().await.unwrap(),
            LinkEvent::established(EndpointKind::Mumble)
        );

        session
            .commands
            .send(LinkCommand::Send("to root".to_string()))
            .unwrap();
        let frame = expect_frame(&mut session.server, msg_type::TEXT_MESSAGE).await;
        let message = TextMessage::decode(frame.payload).unwrap();
        assert_eq!(message.channel_id, vec![0]);
    }
}
