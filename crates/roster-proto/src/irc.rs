//! IRC message codec for tokio.
//!
//! Wraps [`LineCodec`] and parses each line into a [`Message`]. Empty lines
//! are skipped rather than treated as errors.

use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder};

use crate::error::{self, ProtocolError};
use crate::line::LineCodec;
use crate::message::Message;

/// Tokio codec for encoding/decoding IRC messages.
pub struct IrcCodec {
    inner: LineCodec,
}

impl IrcCodec {
    /// Create a new codec with the protocol's 512-byte line limit.
    pub fn new() -> Self {
        Self {
            inner: LineCodec::new(),
        }
    }
}

impl Default for IrcCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for IrcCodec {
    type Item = Message;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> error::Result<Option<Message>> {
        loop {
            match self.inner.decode(src)? {
                None => return Ok(None),
                Some(line) => {
                    let trimmed = line.trim_end_matches(['\r', '\n']);
                    if trimmed.is_empty() {
                        continue;
                    }
                    return trimmed.parse::<Message>().map(Some);
                }
            }
        }
    }
}

impl Encoder<Message> for IrcCodec {
    type Error = ProtocolError;

    fn encode(&mut self, msg: Message, dst: &mut BytesMut) -> error::Result<()> {
        self.inner.encode(format!("{}\r\n", msg), dst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_message() {
        let mut codec = IrcCodec::new();
        let mut buf = BytesMut::from("NICK alice\r\nUSER a 0 * :A\r\n");

        let first = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(first.command, "NICK");
        let second = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(second.command, "USER");
        assert!(codec.decode(&mut buf).unwrap().is_none());
    }

    #[test]
    fn test_decode_skips_empty_lines() {
        let mut codec = IrcCodec::new();
        let mut buf = BytesMut::from("\r\n\r\nPING :x\r\n");
        let msg = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(msg.command, "PING");
    }

    #[test]
    fn test_decode_invalid_message_errors() {
        let mut codec = IrcCodec::new();
        let mut buf = BytesMut::from(":prefixonly\r\n");
        assert!(codec.decode(&mut buf).is_err());
    }

    #[test]
    fn test_encode_appends_crlf() {
        let mut codec = IrcCodec::new();
        let mut buf = BytesMut::new();
        codec
            .encode(Message::new("NICK").arg("alice"), &mut buf)
            .unwrap();
        assert_eq!(&buf[..], b"NICK alice\r\n");
    }
}
