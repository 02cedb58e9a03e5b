//! Protocol error types.

use thiserror::Error;

/// Result type for protocol operations.
pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Errors raised while framing or parsing IRC messages.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// An underlying I/O error.
    #[error("an io error occurred")]
    Io(#[from] std::io::Error),

    /// A line exceeded the protocol's length limit.
    #[error("message exceeds {limit} bytes ({actual})")]
    MessageTooLong {
        /// Observed length in bytes.
        actual: usize,
        /// The enforced limit in bytes.
        limit: usize,
    },

    /// A line could not be parsed as an IRC message.
    #[error("invalid message {string:?}: {cause}")]
    InvalidMessage {
        /// The offending line.
        string: String,
        /// Why parsing failed.
        cause: MessageParseError,
    },
}

/// Reasons a line fails to parse as a message.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum MessageParseError {
    /// The line was empty.
    #[error("empty message")]
    EmptyMessage,

    /// A leading `:` prefix was not followed by a command.
    #[error("prefix without a command")]
    PrefixWithoutCommand,

    /// The line was not valid UTF-8.
    #[error("message is not valid UTF-8")]
    InvalidUtf8,
}
