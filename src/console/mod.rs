//! Console endpoint: the local operator's stdin/stdout session.
//!
//! The console has no connection lifecycle; it is available from
//! construction until its input reaches EOF. Operator lines become
//! ordinary inbound messages attributed to the operator handle.

use tokio::io::{self, AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

use crate::common::{EventSink, LinkEvent};
use crate::endpoint::{queue_command, Endpoint, EndpointKind, Identity, LinkCommand};

/// Handle used when attributing operator input.
const OPERATOR_HANDLE: &str = "cmd";

/// Handle to the console task.
pub struct ConsoleEndpoint {
    identity: Identity,
    commands: mpsc::UnboundedSender<LinkCommand>,
}

impl ConsoleEndpoint {
    /// Create the endpoint and spawn its terminal task over the process's
    /// stdin and stdout.
    pub fn spawn(events: EventSink) -> Self {
        let identity = Identity::new("console", OPERATOR_HANDLE);
        let (commands, commands_rx) = mpsc::unbounded_channel();
        tokio::spawn(run_console(io::stdin(), io::stdout(), commands_rx, events));
        Self { identity, commands }
    }
}

impl Endpoint for ConsoleEndpoint {
    fn kind(&self) -> EndpointKind {
        EndpointKind::Console
    }

    fn identity(&self) -> &Identity {
        &self.identity
    }

    fn start(&self) {
        debug!("console is always available");
    }

    fn stop(&self) {
        queue_command(&self.commands, LinkCommand::Disconnect);
    }

    fn send_text(&self, text: &str) {
        queue_command(&self.commands, LinkCommand::Send(text.to_string()));
    }

    fn set_presence(&self, _status: Option<&str>) {
        trace!("console has no presence field");
    }
}

async fn run_console<R, W>(
    reader: R,
    mut writer: W,
    mut commands: mpsc::UnboundedReceiver<LinkCommand>,
    events: EventSink,
) where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => match line {
                Ok(Some(line)) => {
                    let line = line.trim();
                    if line.is_empty() {
                        continue;
                    }
                    let _ = events.send(LinkEvent::message(
                        EndpointKind::Console,
                        OPERATOR_HANDLE,
                        line,
                    ));
                }
                Ok(None) => {
                    debug!("console input closed");
                    break;
                }
                Err(e) => {
                    warn!("console read error: {}", e);
                    break;
                }
            },
            command = commands.recv() => match command {
                Some(LinkCommand::Send(text)) => {
                    if write_line(&mut writer, &text).await.is_err() {
                        warn!("console write failed");
                    }
                }
                Some(LinkCommand::Disconnect) | None => break,
                Some(LinkCommand::Connect) | Some(LinkCommand::SetPresence(_)) => {}
            }
        }
    }
    let _ = events.send(LinkEvent::closed(EndpointKind::Console));
}

async fn write_line<W: AsyncWrite + Unpin>(writer: &mut W, text: &str) -> std::io::Result<()> {
    writer.write_all(text.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await
}
