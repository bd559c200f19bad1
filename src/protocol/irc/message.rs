//! IRC message grammar.
//!
//! A line is `[:prefix] COMMAND [params] [:trailing]`. Only the small
//! client subset the bridge speaks is modeled; unknown commands still
//! parse and are left to the session loop to ignore.

use std::fmt;

use crate::common::error::ProtocolError;

/// Numeric replies the session loop cares about.
pub mod numerics {
    /// Registration completed.
    pub const RPL_WELCOME: &str = "001";
    /// End of NAMES list, sent after joining a channel.
    pub const RPL_ENDOFNAMES: &str = "366";
    /// Requested nickname is taken.
    pub const ERR_NICKNAMEINUSE: &str = "433";
    /// Server password missing or wrong.
    pub const ERR_PASSWDMISMATCH: &str = "464";
}

/// A parsed IRC message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Raw prefix without the leading ':'.
    pub prefix: Option<String>,
    pub command: String,
    pub params: Vec<String>,
}

impl Message {
    pub fn new(command: impl Into<String>, params: Vec<String>) -> Self {
        Self {
            prefix: None,
            command: command.into(),
            params,
        }
    }

    /// Parse one line, without its CRLF terminator.
    pub fn parse(line: &str) -> Result<Self, ProtocolError> {
        let mut rest = line.trim_end_matches(['\r', '\n']);

        let prefix = if let Some(stripped) = rest.strip_prefix(':') {
            let (prefix, tail) =
                stripped
                    .split_once(' ')
                    .ok_or_else(|| ProtocolError::InvalidMessage {
                        message: format!("prefix without command: {line:?}"),
                    })?;
            rest = tail.trim_start_matches(' ');
            Some(prefix.to_string())
        } else {
            None
        };

        let command = match rest.split_once(' ') {
            Some((command, tail)) => {
                rest = tail.trim_start_matches(' ');
                command
            }
            None => {
                let command = rest;
                rest = "";
                command
            }
        };
        if command.is_empty() {
            return Err(ProtocolError::InvalidMessage {
                message: format!("missing command: {line:?}"),
            });
        }

        let mut params = Vec::new();
        while !rest.is_empty() {
            if let Some(trailing) = rest.strip_prefix(':') {
                params.push(trailing.to_string());
                break;
            }
            match rest.split_once(' ') {
                Some((param, tail)) => {
                    params.push(param.to_string());
                    rest = tail.trim_start_matches(' ');
                }
                None => {
                    params.push(rest.to_string());
                    break;
                }
            }
        }

        Ok(Self {
            prefix,
            command: command.to_uppercase(),
            params,
        })
    }

    /// Nickname part of the prefix (`nick!user@host`).
    pub fn sender_nick(&self) -> Option<&str> {
        let prefix = self.prefix.as_deref()?;
        Some(prefix.split(['!', '@']).next().unwrap_or(prefix))
    }

    /// First parameter, conventionally the message target.
    pub fn target(&self) -> Option<&str> {
        self.params.first().map(String::as_str)
    }

    /// Last parameter, conventionally the message body.
    pub fn trailing(&self) -> Option<&str> {
        self.params.last().map(String::as_str)
    }

    // Client message constructors.

    pub fn pass(password: &str) -> Self {
        Self::new("PASS", vec![password.to_string()])
    }

    pub fn nick(nickname: &str) -> Self {
        Self::new("NICK", vec![nickname.to_string()])
    }

    pub fn user(nickname: &str) -> Self {
        Self::new(
            "USER",
            vec![
                nickname.to_string(),
                "0".to_string(),
                "*".to_string(),
                nickname.to_string(),
            ],
        )
    }

    pub fn join(channel: &str) -> Self {
        Self::new("JOIN", vec![channel.to_string()])
    }

    pub fn privmsg(target: &str, text: &str) -> Self {
        Self::new("PRIVMSG", vec![target.to_string(), text.to_string()])
    }

    /// `AWAY` with a reason sets the away status, without one clears it.
    pub fn away(reason: Option<&str>) -> Self {
        match reason {
            Some(reason) => Self::new("AWAY", vec![reason.to_string()]),
            None => Self::new("AWAY", Vec::new()),
        }
    }

    pub fn pong(token: &str) -> Self {
        Self::new("PONG", vec![token.to_string()])
    }

    pub fn quit(reason: &str) -> Self {
        Self::new("QUIT", vec![reason.to_string()])
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(prefix) = &self.prefix {
            write!(f, ":{} ", prefix)?;
        }
        f.write_str(&self.command)?;
        let last = self.params.len().saturating_sub(1);
        for (i, param) in self.params.iter().enumerate() {
            let needs_trailing =
                i == last && (param.is_empty() || param.contains(' ') || param.starts_with(':'));
            if needs_trailing {
                write!(f, " :{}", param)?;
            } else {
                write!(f, " {}", param)?;
            }
        }
        Ok(())
    }
}
