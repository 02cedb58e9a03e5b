//! Numeric replies (RFC 2812, section 5).

use std::fmt;

/// The numeric replies the server emits.
///
/// Every numeric reply line has the shape
/// `:<server> NNN <target> <arguments>` where `<target>` is the recipient's
/// nickname, or `*` before a nickname is known.
#[allow(non_camel_case_types)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Response {
    /// 001 - first reply after registration completes.
    RPL_WELCOME,
    /// 002
    RPL_YOURHOST,
    /// 003
    RPL_CREATED,
    /// 004
    RPL_MYINFO,
    /// 331
    RPL_NOTOPIC,
    /// 332
    RPL_TOPIC,
    /// 351
    RPL_VERSION,
    /// 353
    RPL_NAMREPLY,
    /// 366
    RPL_ENDOFNAMES,
    /// 371
    RPL_INFO,
    /// 372
    RPL_MOTD,
    /// 374
    RPL_ENDOFINFO,
    /// 375
    RPL_MOTDSTART,
    /// 376
    RPL_ENDOFMOTD,
    /// 401
    ERR_NOSUCHNICK,
    /// 403
    ERR_NOSUCHCHANNEL,
    /// 404
    ERR_CANNOTSENDTOCHAN,
    /// 411
    ERR_NORECIPIENT,
    /// 412
    ERR_NOTEXTTOSEND,
    /// 431
    ERR_NONICKNAMEGIVEN,
    /// 432
    ERR_ERRONEUSNICKNAME,
    /// 433
    ERR_NICKNAMEINUSE,
    /// 442
    ERR_NOTONCHANNEL,
    /// 461
    ERR_NEEDMOREPARAMS,
}

impl Response {
    /// The three-digit reply code.
    pub fn code(&self) -> u16 {
        match self {
            Response::RPL_WELCOME => 1,
            Response::RPL_YOURHOST => 2,
            Response::RPL_CREATED => 3,
            Response::RPL_MYINFO => 4,
            Response::RPL_NOTOPIC => 331,
            Response::RPL_TOPIC => 332,
            Response::RPL_VERSION => 351,
            Response::RPL_NAMREPLY => 353,
            Response::RPL_ENDOFNAMES => 366,
            Response::RPL_INFO => 371,
            Response::RPL_MOTD => 372,
            Response::RPL_ENDOFINFO => 374,
            Response::RPL_MOTDSTART => 375,
            Response::RPL_ENDOFMOTD => 376,
            Response::ERR_NOSUCHNICK => 401,
            Response::ERR_NOSUCHCHANNEL => 403,
            Response::ERR_CANNOTSENDTOCHAN => 404,
            Response::ERR_NORECIPIENT => 411,
            Response::ERR_NOTEXTTOSEND => 412,
            Response::ERR_NONICKNAMEGIVEN => 431,
            Response::ERR_ERRONEUSNICKNAME => 432,
            Response::ERR_NICKNAMEINUSE => 433,
            Response::ERR_NOTONCHANNEL => 442,
            Response::ERR_NEEDMOREPARAMS => 461,
        }
    }

    /// Whether this is an error reply (4xx/5xx range).
    pub fn is_error(&self) -> bool {
        self.code() >= 400
    }
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:03}", self.code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_three_digit_rendering() {
        assert_eq!(Response::RPL_WELCOME.to_string(), "001");
        assert_eq!(Response::ERR_NICKNAMEINUSE.to_string(), "433");
    }

    #[test]
    fn test_error_range() {
        assert!(Response::ERR_NOSUCHNICK.is_error());
        assert!(!Response::RPL_TOPIC.is_error());
    }
}
