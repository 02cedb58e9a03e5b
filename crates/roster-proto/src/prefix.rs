//! Message prefixes (the `:source` token ahead of a command).

use std::fmt;

/// The source of a message.
///
/// Servers prefix replies with their own name; messages attributed to a
/// client carry the full `nick!user@host` form.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Prefix {
    /// A bare server (or service) name.
    ServerName(String),
    /// `nick!user@host`.
    Nickname(String, String, String),
}

impl Prefix {
    /// Parse a prefix token (without the leading `:`).
    pub fn parse(s: &str) -> Prefix {
        if let Some((nick, rest)) = s.split_once('!') {
            if let Some((user, host)) = rest.split_once('@') {
                return Prefix::Nickname(nick.to_string(), user.to_string(), host.to_string());
            }
        }
        Prefix::ServerName(s.to_string())
    }

    /// The nickname or server name this prefix names.
    pub fn name(&self) -> &str {
        match self {
            Prefix::ServerName(name) => name,
            Prefix::Nickname(nick, _, _) => nick,
        }
    }
}

impl fmt::Display for Prefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Prefix::ServerName(name) => f.write_str(name),
            Prefix::Nickname(nick, user, host) => write!(f, "{}!{}@{}", nick, user, host),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_prefix() {
        let p = Prefix::parse("alice!alice@network");
        assert_eq!(
            p,
            Prefix::Nickname("alice".into(), "alice".into(), "network".into())
        );
        assert_eq!(p.to_string(), "alice!alice@network");
        assert_eq!(p.name(), "alice");
    }

    #[test]
    fn test_parse_server_prefix() {
        let p = Prefix::parse("irc.example");
        assert_eq!(p, Prefix::ServerName("irc.example".into()));
        assert_eq!(p.name(), "irc.example");
    }

    #[test]
    fn test_bang_without_at_is_a_server_name() {
        let p = Prefix::parse("odd!token");
        assert_eq!(p, Prefix::ServerName("odd!token".into()));
    }
}
