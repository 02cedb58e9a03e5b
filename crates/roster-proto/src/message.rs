//! The owned IRC message type with parsing and serialization.

use std::fmt;
use std::str::FromStr;

use crate::error::{MessageParseError, ProtocolError};
use crate::prefix::Prefix;
use crate::response::Response;

/// One parsed IRC message.
///
/// `args` holds every parameter in order. When `trailing` is set, the last
/// argument came from (or will be written as) a `:`-prefixed trailing
/// parameter, which may contain spaces or be empty.
///
/// Serialization always emits the `:` for a trailing argument, and also adds
/// it for a final argument that could not round-trip otherwise (it is empty,
/// contains a space, or itself starts with `:`).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Message {
    /// The message source, if any. Client-supplied prefixes are parsed but
    /// carry no authority; the server trusts its own nickname binding.
    pub prefix: Option<Prefix>,
    /// The command token, upper-cased during parsing.
    pub command: String,
    /// All parameters, in order.
    pub args: Vec<String>,
    /// Whether the last argument is a trailing parameter.
    pub trailing: bool,
}

impl Message {
    /// Start building a message for the given command.
    pub fn new(command: impl Into<String>) -> Message {
        Message {
            prefix: None,
            command: command.into(),
            args: Vec::new(),
            trailing: false,
        }
    }

    /// Start a numeric reply: `:<server> NNN <target>`.
    pub fn numeric(server_name: &str, code: Response, target: &str) -> Message {
        Message {
            prefix: Some(Prefix::ServerName(server_name.to_string())),
            command: code.to_string(),
            args: vec![target.to_string()],
            trailing: false,
        }
    }

    /// Attach a prefix.
    #[must_use]
    pub fn with_prefix(mut self, prefix: Prefix) -> Message {
        self.prefix = Some(prefix);
        self
    }

    /// Append a middle parameter. Must not be called after [`Self::trailing`].
    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Message {
        debug_assert!(!self.trailing, "arguments cannot follow the trailing one");
        self.args.push(arg.into());
        self
    }

    /// Append the trailing parameter.
    #[must_use]
    pub fn trailing(mut self, arg: impl Into<String>) -> Message {
        debug_assert!(!self.trailing, "only one trailing argument is allowed");
        self.args.push(arg.into());
        self.trailing = true;
        self
    }

    /// Parameter accessor.
    pub fn param(&self, index: usize) -> Option<&str> {
        self.args.get(index).map(String::as_str)
    }
}

fn needs_colon_prefix(s: &str) -> bool {
    s.is_empty() || s.contains(' ') || s.starts_with(':')
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(prefix) = &self.prefix {
            write!(f, ":{} ", prefix)?;
        }
        f.write_str(&self.command)?;
        if let Some((last, middle)) = self.args.split_last() {
            for arg in middle {
                write!(f, " {}", arg)?;
            }
            if self.trailing || needs_colon_prefix(last) {
                write!(f, " :{}", last)?;
            } else {
                write!(f, " {}", last)?;
            }
        }
        Ok(())
    }
}

impl FromStr for Message {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Message, Self::Err> {
        let invalid = |cause| ProtocolError::InvalidMessage {
            string: s.to_string(),
            cause,
        };

        let line = s.trim_end_matches(['\r', '\n']);
        if line.is_empty() {
            return Err(invalid(MessageParseError::EmptyMessage));
        }

        let mut rest = line;
        let mut prefix = None;
        if let Some(stripped) = rest.strip_prefix(':') {
            // A prefix must be followed by a command on the same line.
            match stripped.split_once(' ') {
                Some((token, tail)) => {
                    prefix = Some(Prefix::parse(token));
                    rest = tail;
                }
                None => return Err(invalid(MessageParseError::PrefixWithoutCommand)),
            }
        }

        let rest = rest.trim_start_matches(' ');
        let (command, mut tail) = match rest.split_once(' ') {
            Some((cmd, tail)) => (cmd, tail),
            None => (rest, ""),
        };
        if command.is_empty() {
            return Err(invalid(MessageParseError::EmptyMessage));
        }

        let mut args = Vec::new();
        let mut trailing = false;
        while !tail.is_empty() {
            if let Some(text) = tail.strip_prefix(':') {
                // A parameter starting with ':' is always the last one and
                // consumes the remainder of the line verbatim.
                args.push(text.to_string());
                trailing = true;
                break;
            }
            let (token, next) = match tail.split_once(' ') {
                Some((token, next)) => (token, next),
                None => (tail, ""),
            };
            if !token.is_empty() {
                args.push(token.to_string());
            }
            tail = next;
        }

        Ok(Message {
            prefix,
            command: command.to_ascii_uppercase(),
            args,
            trailing,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_ping() {
        let msg: Message = "PING :irc.example\r\n".parse().unwrap();
        assert_eq!(msg.command, "PING");
        assert_eq!(msg.args, vec!["irc.example"]);
        assert!(msg.trailing);
    }

    #[test]
    fn test_parse_lowercase_command_is_upcased() {
        let msg: Message = "privmsg #dev :hi".parse().unwrap();
        assert_eq!(msg.command, "PRIVMSG");
    }

    #[test]
    fn test_parse_with_prefix() {
        let msg: Message = ":alice!alice@network JOIN #dev".parse().unwrap();
        assert_eq!(
            msg.prefix,
            Some(Prefix::Nickname(
                "alice".into(),
                "alice".into(),
                "network".into()
            ))
        );
        assert_eq!(msg.args, vec!["#dev"]);
        assert!(!msg.trailing);
    }

    #[test]
    fn test_parse_trailing_keeps_spaces() {
        let msg: Message = "PRIVMSG #dev :one two  three".parse().unwrap();
        assert_eq!(msg.param(1), Some("one two  three"));
    }

    #[test]
    fn test_parse_empty_trailing() {
        let msg: Message = "PRIVMSG bob :".parse().unwrap();
        assert_eq!(msg.args, vec!["bob".to_string(), String::new()]);
    }

    #[test]
    fn test_parse_prefix_without_command() {
        let err = ":lonelyprefix".parse::<Message>().unwrap_err();
        match err {
            ProtocolError::InvalidMessage { cause, .. } => {
                assert_eq!(cause, MessageParseError::PrefixWithoutCommand)
            }
            other => panic!("expected InvalidMessage, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_empty_line() {
        assert!("\r\n".parse::<Message>().is_err());
    }

    #[test]
    fn test_display_trailing_rules() {
        let msg = Message::new("JOIN").arg("#dev");
        assert_eq!(msg.to_string(), "JOIN #dev");

        let msg = Message::new("PONG").arg("irc.example").trailing("token");
        assert_eq!(msg.to_string(), "PONG irc.example :token");

        // A last argument with a space gets the colon even without the flag.
        let msg = Message::new("QUIT").arg("gone fishing");
        assert_eq!(msg.to_string(), "QUIT :gone fishing");
    }

    #[test]
    fn test_numeric_builder() {
        let msg = Message::numeric("irc.example", Response::ERR_NICKNAMEINUSE, "*")
            .arg("alice")
            .trailing("Nickname is already in use");
        assert_eq!(
            msg.to_string(),
            ":irc.example 433 * alice :Nickname is already in use"
        );
    }

    #[test]
    fn test_round_trip_preserves_command_and_args() {
        let originals = [
            ":irc.example 001 alice :Welcome to the irc.example Internet Relay Chat Network alice",
            ":alice!alice@network PRIVMSG #dev :hello",
            ":ChanServ!chanserv@virtual MODE #dev +v alice",
            "NICK alice_",
            "PING :123",
        ];
        for raw in originals {
            let parsed: Message = raw.parse().unwrap();
            let reparsed: Message = parsed.to_string().parse().unwrap();
            assert_eq!(parsed.command, reparsed.command);
            assert_eq!(parsed.args, reparsed.args);
        }
    }
}
