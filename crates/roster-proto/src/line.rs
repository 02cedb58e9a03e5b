//! Line-based codec for tokio.
//!
//! Splits the byte stream into newline-terminated lines. CRLF and bare LF
//! terminators are both accepted: even popular clients terminate messages
//! with a lone LF, so looking for LF covers both. Lines are limited to 512
//! bytes including the terminator; an unterminated run reaching the limit is
//! rejected as well, so a peer cannot grow the buffer without bound.

use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder};

use crate::error::{self, MessageParseError, ProtocolError};
use crate::MAX_MESSAGE_LEN;

/// Codec turning a byte stream into newline-terminated lines.
pub struct LineCodec {
    /// Index of the next byte to check for a newline.
    next_index: usize,
    /// Maximum line length, including the terminator.
    max_len: usize,
}

impl LineCodec {
    /// Create a codec with the protocol's 512-byte limit.
    pub fn new() -> Self {
        Self {
            next_index: 0,
            max_len: MAX_MESSAGE_LEN,
        }
    }

    /// Create a codec with a custom maximum line length.
    pub fn with_max_len(max_len: usize) -> Self {
        Self {
            next_index: 0,
            max_len,
        }
    }
}

impl Default for LineCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for LineCodec {
    type Item = String;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> error::Result<Option<String>> {
        if let Some(offset) = src[self.next_index..].iter().position(|b| *b == b'\n') {
            let line = src.split_to(self.next_index + offset + 1);
            self.next_index = 0;

            if line.len() > self.max_len {
                return Err(ProtocolError::MessageTooLong {
                    actual: line.len(),
                    limit: self.max_len,
                });
            }

            let data = String::from_utf8(line.to_vec()).map_err(|e| {
                ProtocolError::InvalidMessage {
                    string: String::from_utf8_lossy(e.as_bytes()).into_owned(),
                    cause: MessageParseError::InvalidUtf8,
                }
            })?;

            Ok(Some(data))
        } else {
            // No complete line yet - remember where we stopped.
            self.next_index = src.len();

            // A partial line that already fills the limit can never become a
            // valid message.
            if src.len() >= self.max_len {
                return Err(ProtocolError::MessageTooLong {
                    actual: src.len(),
                    limit: self.max_len,
                });
            }

            Ok(None)
        }
    }
}

impl Encoder<String> for LineCodec {
    type Error = ProtocolError;

    fn encode(&mut self, msg: String, dst: &mut BytesMut) -> error::Result<()> {
        dst.extend(msg.into_bytes());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_crlf_line() {
        let mut codec = LineCodec::new();
        let mut buf = BytesMut::from("PING :test\r\n");

        let result = codec.decode(&mut buf).unwrap();
        assert_eq!(result, Some("PING :test\r\n".to_string()));
        assert!(buf.is_empty());
    }

    #[test]
    fn test_decode_bare_lf_line() {
        let mut codec = LineCodec::new();
        let mut buf = BytesMut::from("NICK alice\n");

        let result = codec.decode(&mut buf).unwrap();
        assert_eq!(result, Some("NICK alice\n".to_string()));
    }

    #[test]
    fn test_decode_partial_line() {
        let mut codec = LineCodec::new();
        let mut buf = BytesMut::from("PING :");

        assert_eq!(codec.decode(&mut buf).unwrap(), None);
        buf.extend_from_slice(b"rest\r\n");
        assert_eq!(
            codec.decode(&mut buf).unwrap(),
            Some("PING :rest\r\n".to_string())
        );
    }

    #[test]
    fn test_decode_boundary_lengths() {
        // 510-byte payload + CRLF = 512 bytes: accepted.
        let mut codec = LineCodec::new();
        let mut buf = BytesMut::from(format!("{}\r\n", "a".repeat(510)).as_str());
        assert!(codec.decode(&mut buf).unwrap().is_some());

        // 511-byte payload + LF = 512 bytes: accepted.
        let mut codec = LineCodec::new();
        let mut buf = BytesMut::from(format!("{}\n", "a".repeat(511)).as_str());
        assert!(codec.decode(&mut buf).unwrap().is_some());

        // 511-byte payload + CRLF = 513 bytes: rejected.
        let mut codec = LineCodec::new();
        let mut buf = BytesMut::from(format!("{}\r\n", "a".repeat(511)).as_str());
        assert!(matches!(
            codec.decode(&mut buf),
            Err(ProtocolError::MessageTooLong { actual: 513, .. })
        ));
    }

    #[test]
    fn test_decode_unterminated_run_rejected() {
        let mut codec = LineCodec::new();
        let mut buf = BytesMut::from("a".repeat(513).as_str());
        assert!(matches!(
            codec.decode(&mut buf),
            Err(ProtocolError::MessageTooLong { .. })
        ));
    }

    #[test]
    fn test_encode_passthrough() {
        let mut codec = LineCodec::new();
        let mut buf = BytesMut::new();
        codec.encode("PONG :test\r\n".to_string(), &mut buf).unwrap();
        assert_eq!(&buf[..], b"PONG :test\r\n");
    }
}
