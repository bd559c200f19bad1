//! CRLF line codec for the IRC connection.

use bytes::{BufMut, BytesMut};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::{Decoder, Encoder, Framed};

use crate::common::error::ProtocolError;
use crate::protocol::irc::message::Message;

/// Generous upper bound; the classic limit is 512 bytes but some servers
/// exceed it.
const MAX_LINE: usize = 4096;

/// Codec turning raw lines into parsed [`Message`]s.
///
/// Inbound bytes are decoded as UTF-8 with replacement; outbound messages
/// are serialized with a CRLF terminator.
pub struct LineCodec;

impl Decoder for LineCodec {
    type Item = Message;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let Some(newline) = src.iter().position(|&b| b == b'\n') else {
            if src.len() > MAX_LINE {
                return Err(ProtocolError::FrameTooLarge {
                    size: src.len(),
                    limit: MAX_LINE,
                });
            }
            return Ok(None);
        };

        let line = src.split_to(newline + 1);
        let text = String::from_utf8_lossy(&line[..newline]);
        let text = text.trim_end_matches('\r');
        if text.is_empty() {
            // Empty lines are legal padding between messages.
            return self.decode(src);
        }
        Message::parse(text).map(Some)
    }
}

impl Encoder<Message> for LineCodec {
    type Error = ProtocolError;

    fn encode(&mut self, item: Message, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let line = item.to_string();
        dst.reserve(line.len() + 2);
        dst.put_slice(line.as_bytes());
        dst.put_slice(b"\r\n");
        Ok(())
    }
}

/// A framed IRC connection.
pub type IrcConnection<S> = Framed<S, LineCodec>;

/// Create a new IRC connection from a stream.
pub fn new_irc_connection<S: AsyncRead + AsyncWrite>(stream: S) -> IrcConnection<S> {
    Framed::new(stream, LineCodec)
}
