//! # roster-proto
//!
//! Parsing and serialization of RFC 2812 line-protocol messages for the
//! rosterd IRC server.
//!
//! The crate models a message as an optional prefix, an upper-cased command
//! token and its parameters, where the last parameter may be a *trailing*
//! parameter (written with a leading `:` and allowed to contain spaces).
//!
//! ```rust
//! use roster_proto::Message;
//!
//! let msg: Message = ":alice!alice@network PRIVMSG #dev :hello there".parse().unwrap();
//! assert_eq!(msg.command, "PRIVMSG");
//! assert_eq!(msg.param(1), Some("hello there"));
//! assert_eq!(msg.to_string(), ":alice!alice@network PRIVMSG #dev :hello there");
//! ```
//!
//! With the `tokio` feature, [`LineCodec`] and [`IrcCodec`] provide framing
//! for the tokio codec machinery: lines are terminated by CRLF or bare LF and
//! limited to 512 bytes including the terminator.

#![deny(clippy::all)]
#![warn(missing_docs)]

pub mod casemap;
pub mod error;
#[cfg(feature = "tokio")]
pub mod irc;
#[cfg(feature = "tokio")]
pub mod line;
pub mod message;
pub mod prefix;
pub mod response;

pub use self::casemap::{irc_eq, irc_to_lower};
pub use self::error::{MessageParseError, ProtocolError};
#[cfg(feature = "tokio")]
pub use self::irc::IrcCodec;
#[cfg(feature = "tokio")]
pub use self::line::LineCodec;
pub use self::message::Message;
pub use self::prefix::Prefix;
pub use self::response::Response;

/// Maximum length of one IRC message in bytes, including the terminator.
pub const MAX_MESSAGE_LEN: usize = 512;
