//! IRC endpoint: link task and session loop.

use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::Duration;
use tracing::{debug, info, warn};

use crate::common::error::ConnectionError;
use crate::common::{EventSink, LinkEvent};
use crate::config::types::{AuthType, IrcConfig};
use crate::endpoint::{queue_command, Endpoint, EndpointKind, Identity, LinkCommand};
use crate::protocol::irc::{new_irc_connection, numerics, IrcConnection, Message};

const REGISTRATION_TIMEOUT: Duration = Duration::from_secs(60);

/// How a session ended after it was established.
#[derive(Debug, PartialEq, Eq)]
enum SessionEnd {
    /// Torn down by a `Disconnect` command.
    Stopped,
    /// The server went away.
    Dropped,
}

/// Handle to the IRC link task.
pub struct IrcEndpoint {
    identity: Identity,
    commands: mpsc::UnboundedSender<LinkCommand>,
}

impl IrcEndpoint {
    /// Create the endpoint and spawn its link task. No connection is
    /// attempted until `start()`.
    pub fn spawn(config: IrcConfig, events: EventSink) -> Self {
        let identity = Identity::new("irc", &config.nickname);
        let (commands, commands_rx) = mpsc::unbounded_channel();
        tokio::spawn(link_task(config, commands_rx, events));
        Self { identity, commands }
    }
}

impl Endpoint for IrcEndpoint {
    fn kind(&self) -> EndpointKind {
        EndpointKind::Irc
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
    config: IrcConfig,
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
                    Ok(SessionEnd::Stopped) => info!("IRC session closed"),
                    Ok(SessionEnd::Dropped) => {
                        let _ = events.send(LinkEvent::lost(EndpointKind::Irc));
                    }
                    Err(e) => {
                        warn!("IRC connection failed: {}", e);
                        let _ = events.send(LinkEvent::failed(EndpointKind::Irc));
                    }
                }
            }
            LinkCommand::Disconnect => debug!("IRC already disconnected"),
            LinkCommand::Send(_) | LinkCommand::SetPresence(_) => {
                debug!("IRC not connected, dropping outbound message");
            }
        }
    }
}

async fn connect(config: &IrcConfig) -> Result<TcpStream, ConnectionError> {
    info!("Connecting to IRC server at {}:{}", config.server, config.port);
    TcpStream::connect((config.server.as_str(), config.port))
        .await
        .map_err(|e| ConnectionError::ConnectFailed {
            host: config.server.clone(),
            port: config.port,
            source: e,
        })
}

/// Registration, channel join and the steady-state relay loop.
///
/// Errors before the channel join count as a failed connection attempt.
/// Once joined the session only ends through a `Disconnect` command
/// (`Stopped`) or because the server went away (`Dropped`).
async fn run_session<S>(
    stream: S,
    config: &IrcConfig,
    commands: &mut mpsc::UnboundedReceiver<LinkCommand>,
    events: &EventSink,
) -> Result<SessionEnd, ConnectionError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut connection = new_irc_connection(stream);

    match tokio::time::timeout(REGISTRATION_TIMEOUT, register(&mut connection, config)).await {
        Ok(result) => result?,
        Err(_) => return Err(ConnectionError::Timeout),
    }

    info!("Joined {} as {}", config.channel, config.nickname);
    let _ = events.send(LinkEvent::established(EndpointKind::Irc));

    let end = loop {
        tokio::select! {
            message = connection.next() => {
                let message = match message {
                    Some(Ok(message)) => message,
                    Some(Err(e)) => {
                        warn!("IRC read error: {}", e);
                        break SessionEnd::Dropped;
                    }
                    None => {
                        info!("IRC server closed the connection");
                        break SessionEnd::Dropped;
                    }
                };
                match message.command.as_str() {
                    "PING" => {
                        let token = message.trailing().unwrap_or_default().to_string();
                        if connection.send(Message::pong(&token)).await.is_err() {
                            break SessionEnd::Dropped;
                        }
                    }
                    "PRIVMSG" => {
                        if let Some(event) = inbound_privmsg(config, &message) {
                            let _ = events.send(event);
                        }
                    }
                    "KICK" if message.params.get(1).map(String::as_str)
                        == Some(config.nickname.as_str()) =>
                    {
                        warn!("Kicked from {}, rejoining", config.channel);
                        if connection.send(Message::join(&config.channel)).await.is_err() {
                            break SessionEnd::Dropped;
                        }
                    }
                    "ERROR" => {
                        warn!("IRC server error: {:?}", message.trailing());
                        break SessionEnd::Dropped;
                    }
                    _ => {}
                }
            }
            command = commands.recv() => match command {
                Some(LinkCommand::Send(text)) => {
                    if connection
                        .send(Message::privmsg(&config.channel, &text))
                        .await
                        .is_err()
                    {
                        break SessionEnd::Dropped;
                    }
                }
                Some(LinkCommand::SetPresence(status)) => {
                    if connection.send(Message::away(status.as_deref())).await.is_err() {
                        break SessionEnd::Dropped;
                    }
                }
                Some(LinkCommand::Disconnect) => {
                    let _ = connection.send(Message::quit("bridge shutting down")).await;
                    break SessionEnd::Stopped;
                }
                Some(LinkCommand::Connect) => debug!("IRC already connected"),
                None => break SessionEnd::Stopped,
            }
        }
    };
    Ok(end)
}

/// PASS/NICK/USER, wait for the welcome, authenticate, join the channel.
/// Returns once the join is confirmed.
async fn register<S>(
    connection: &mut IrcConnection<S>,
    config: &IrcConfig,
) -> Result<(), ConnectionError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    if config.auth_type() == AuthType::Pass {
        connection.send(Message::pass(&config.password)).await?;
    }
    connection.send(Message::nick(&config.nickname)).await?;
    connection.send(Message::user(&config.nickname)).await?;

    let mut join_sent = false;
    loop {
        let message = match connection.next().await {
            Some(Ok(message)) => message,
            Some(Err(e)) => return Err(e.into()),
            None => return Err(ConnectionError::ConnectionClosed),
        };
        match message.command.as_str() {
            "PING" => {
                let token = message.trailing().unwrap_or_default().to_string();
                connection.send(Message::pong(&token)).await?;
            }
            numerics::RPL_WELCOME => {
                if config.auth_type() == AuthType::NickServ {
                    let identify = format!("IDENTIFY {}", config.password);
                    connection
                        .send(Message::privmsg("NickServ", &identify))
                        .await?;
                }
                connection.send(Message::join(&config.channel)).await?;
                join_sent = true;
            }
            "JOIN"
                if join_sent && message.sender_nick() == Some(config.nickname.as_str()) =>
            {
                return Ok(())
            }
            numerics::RPL_ENDOFNAMES if join_sent => return Ok(()),
            numerics::ERR_NICKNAMEINUSE => {
                return Err(ConnectionError::Rejected {
                    reason: format!("nickname {} already in use", config.nickname),
                })
            }
            numerics::ERR_PASSWDMISMATCH => {
                return Err(ConnectionError::Rejected {
                    reason: "server password mismatch".to_string(),
                })
            }
            "ERROR" => {
                return Err(ConnectionError::Rejected {
                    reason: message
                        .trailing()
                        .unwrap_or("closed by server")
                        .to_string(),
                })
            }
            _ => {}
        }
    }
}

/// Turn a channel PRIVMSG into a bridge event. Private messages, traffic
/// for other channels and CTCP are ignored.
fn inbound_privmsg(config: &IrcConfig, message: &Message) -> Option<LinkEvent> {
    let sender = message.sender_nick()?.to_string();
    let target = message.target()?;
    if !target.eq_ignore_ascii_case(&config.channel) {
        debug!(%target, "ignoring message outside the bridged channel");
        return None;
    }
    let text = message.trailing()?;
    if text.starts_with('\u{1}') {
        return None;
    }
    Some(LinkEvent::message(EndpointKind::Irc, sender, text))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::LinkEventKind;
    use tokio::io::{duplex, DuplexStream};
    use tokio::task::JoinHandle;

    fn test_config() -> IrcConfig {
        IrcConfig {
            server: "irc.example.org".to_string(),
            port: 6667,
            nickname: "bridge".to_string(),
            channel: "#lobby".to_string(),
            password: String::new(),
            authtype: "none".to_string(),
            encoding: "utf-8".to_string(),
            loglevel: "info".to_string(),
            reconnect_delay: 15,
            retry_delay: 15,
        }
    }

    struct TestSession {
        commands: mpsc::UnboundedSender<LinkCommand>,
        events: mpsc::UnboundedReceiver<LinkEvent>,
        server: IrcConnection<DuplexStream>,
        task: JoinHandle<Result<SessionEnd, ConnectionError>>,
    }

    fn start_session(config: IrcConfig) -> TestSession {
        let (client, server) = duplex(16 * 1024);
        let (commands, mut commands_rx) = mpsc::unbounded_channel();
        let (events_tx, events) = mpsc::unbounded_channel();
        let task = tokio::spawn(async move {
            run_session(client, &config, &mut commands_rx, &events_tx).await
        });
        TestSession {
            commands,
            events,
            server: new_irc_connection(server),
            task,
        }
    }

    async fn expect(server: &mut IrcConnection<DuplexStream>, command: &str) -> Message {
        loop {
            let message = server
                .next()
                .await
                .expect("server stream ended")
                .expect("bad line from client");
            if message.command == command {
                return message;
            }
        }
    }

    async fn send_raw(server: &mut IrcConnection<DuplexStream>, line: &str) {
        server.send(Message::parse(line).unwrap()).await.unwrap();
    }

    async fn establish(session: &mut TestSession) {
        expect(&mut session.server, "NICK").await;
        expect(&mut session.server, "USER").await;
        send_raw(&mut session.server, ":irc.example.org 001 bridge :Welcome").await;
        expect(&mut session.server, "JOIN").await;
        send_raw(&mut session.server, ":bridge!bot@host JOIN #lobby").await;
        assert_eq!(
            session.events.recv().await.unwrap(),
            LinkEvent::established(EndpointKind::Irc)
        );
    }

    #[tokio::test]
    async fn test_session_registers_and_joins() {
        let mut session = start_session(test_config());

        expect(&mut session.server, "NICK").await;
        let user = expect(&mut session.server, "USER").await;
        assert_eq!(user.params[0], "bridge");

        send_raw(&mut session.server, ":irc.example.org 001 bridge :Welcome").await;
        let join = expect(&mut session.server, "JOIN").await;
        assert_eq!(join.target(), Some("#lobby"));

        send_raw(&mut session.server, ":bridge!bot@host JOIN #lobby").await;
        assert_eq!(
            session.events.recv().await.unwrap(),
            LinkEvent::established(EndpointKind::Irc)
        );
    }

    #[tokio::test]
    async fn test_pass_authtype_sends_server_password() {
        let mut config = test_config();
        config.authtype = "pass".to_string();
        config.password = "sekrit".to_string();
        let mut session = start_session(config);

        let pass = expect(&mut session.server, "PASS").await;
        assert_eq!(pass.params[0], "sekrit");
        expect(&mut session.server, "NICK").await;
    }

    #[tokio::test]
    async fn test_nickserv_identify_after_welcome() {
        let mut config = test_config();
        config.authtype = "nickserv".to_string();
        config.password = "sekrit".to_string();
        let mut session = start_session(config);

        expect(&mut session.server, "NICK").await;
        expect(&mut session.server, "USER").await;
        send_raw(&mut session.server, ":irc.example.org 001 bridge :Welcome").await;

        let identify = expect(&mut session.server, "PRIVMSG").await;
        assert_eq!(identify.target(), Some("NickServ"));
        assert_eq!(identify.trailing(), Some("IDENTIFY sekrit"));
        expect(&mut session.server, "JOIN").await;
    }

    #[tokio::test]
    async fn test_channel_messages_become_events() {
        let mut session = start_session(test_config());
        establish(&mut session).await;

        send_raw(&mut session.server, ":alice!a@host PRIVMSG #lobby :hello").await;
        assert_eq!(
            session.events.recv().await.unwrap(),
            LinkEvent::message(EndpointKind::Irc, "alice", "hello")
        );
    }

    #[tokio::test]
    async fn test_private_and_foreign_messages_ignored() {
        let mut session = start_session(test_config());
        establish(&mut session).await;

        send_raw(&mut session.server, ":alice!a@host PRIVMSG bridge :psst").await;
        send_raw(&mut session.server, ":alice!a@host PRIVMSG #other :hi").await;
        send_raw(&mut session.server, ":alice!a@host PRIVMSG #lobby :\u{1}ACTION waves\u{1}").await;
        send_raw(&mut session.server, ":alice!a@host PRIVMSG #lobby :visible").await;

        // Only the last one surfaces.
        assert_eq!(
            session.events.recv().await.unwrap(),
            LinkEvent::message(EndpointKind::Irc, "alice", "visible")
        );
    }

    #[tokio::test]
    async fn test_outbound_commands() {
        let mut session = start_session(test_config());
        establish(&mut session).await;

        session
            .commands
            .send(LinkCommand::Send("from mumble".to_string()))
            .unwrap();
        let out = expect(&mut session.server, "PRIVMSG").await;
        assert_eq!(out.target(), Some("#lobby"));
        assert_eq!(out.trailing(), Some("from mumble"));

        session
            .commands
            .send(LinkCommand::SetPresence(Some("link down".to_string())))
            .unwrap();
        let away = expect(&mut session.server, "AWAY").await;
        assert_eq!(away.trailing(), Some("link down"));

        session.commands.send(LinkCommand::SetPresence(None)).unwrap();
        let clear = expect(&mut session.server, "AWAY").await;
        assert!(clear.params.is_empty());
    }

    #[tokio::test]
    async fn test_server_ping_answered() {
        let mut session = start_session(test_config());
        establish(&mut session).await;

        send_raw(&mut session.server, "PING :token123").await;
        let pong = expect(&mut session.server, "PONG").await;
        assert_eq!(pong.params[0], "token123");
    }

    #[tokio::test]
    async fn test_stop_from_message_handler_does_not_deadlock() {
        let mut session = start_session(test_config());
        establish(&mut session).await;

        send_raw(&mut session.server, ":alice!a@host PRIVMSG #lobby :gtfo").await;
        let event = session.events.recv().await.unwrap();
        assert!(matches!(event.kind, LinkEventKind::Message { .. }));

        // A handler reacting to the event stops the endpoint synchronously.
        session.commands.send(LinkCommand::Disconnect).unwrap();

        let quit = tokio::time::timeout(Duration::from_secs(5), expect(&mut session.server, "QUIT"))
            .await
            .expect("no QUIT before timeout");
        assert_eq!(quit.trailing(), Some("bridge shutting down"));

        let end = tokio::time::timeout(Duration::from_secs(5), session.task)
            .await
            .expect("session did not exit")
            .unwrap()
            .unwrap();
        assert_eq!(end, SessionEnd::Stopped);
    }

    #[tokio::test]
    async fn test_nick_in_use_fails_registration() {
        let mut session = start_session(test_config());

        expect(&mut session.server, "NICK").await;
        expect(&mut session.server, "USER").await;
        send_raw(
            &mut session.server,
            ":irc.example.org 433 * bridge :Nickname is already in use",
        )
        .await;

        let result = session.task.await.unwrap();
        assert!(matches!(result, Err(ConnectionError::Rejected { .. })));
    }

    #[tokio::test]
    async fn test_server_drop_after_join_is_lost_not_failed() {
        let mut session = start_session(test_config());
        establish(&mut session).await;

        drop(session.server);
        let end = session.task.await.unwrap().unwrap();
        assert_eq!(end, SessionEnd::Dropped);
    }

    #[tokio::test]
    async fn test_unreachable_server_reports_failure() {
        let mut config = test_config();
        config.server = "127.0.0.1".to_string();
        config.port = 1;

        let (events_tx, mut events) = mpsc::unbounded_channel();
        let endpoint = IrcEndpoint::spawn(config, events_tx);
        endpoint.start();

        let event = tokio::time::timeout(Duration::from_secs(10), events.recv())
            .await
            .expect("no event")
            .unwrap();
        assert_eq!(event, LinkEvent::failed(EndpointKind::Irc));
    }
}
