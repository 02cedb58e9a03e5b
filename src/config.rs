//! Configuration loading and validation.
//!
//! The server is pointed at a configuration *directory* containing
//! `rosterd.toml` (server, TLS, users, channels and bot sections) and
//! `motd.txt` (one reply line per file line). Everything is loaded once at
//! startup; channels, topics, rosters and the passhash table never change at
//! runtime.

use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::auth::{decode_passhash, PassTable, PasshashError};

/// Maximum length of one MOTD line.
pub const MOTD_LINE_LENGTH: usize = 80;

/// Name of the main configuration file inside the configuration directory.
pub const CONFIG_FILE: &str = "rosterd.toml";

/// Name of the MOTD file inside the configuration directory.
pub const MOTD_FILE: &str = "motd.txt";

/// Errors that abort startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("could not parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: Box<toml::de::Error>,
    },

    #[error("you need to specify a server name")]
    MissingName,

    #[error("you need to specify a port to listen on")]
    MissingPort,

    #[error("you need to enable either IPv4 or IPv6 (or both)")]
    NoIpFamily,

    #[error("you need to specify a pidfile")]
    MissingPidfile,

    #[error("TLS is enabled but the certificate or private key path is missing")]
    IncompleteTls,

    #[error("motd line {line} exceeds {MOTD_LINE_LENGTH} characters")]
    MotdLineTooLong { line: usize },

    #[error("you need to specify at least one channel")]
    NoChannels,

    #[error("illegal channel name: {0}")]
    IllegalChannelName(String),

    #[error("no allowed users were set for channel {0}")]
    NoAllowedUsers(String),

    #[error("passhash for {nick} is invalid: {source}")]
    BadPasshash {
        nick: String,
        source: PasshashError,
    },

    #[error("{bot} configuration contains an invalid channel name: {channel}")]
    UnknownBotChannel { bot: String, channel: String },

    #[error("you have to set at least one administrator for VoteBot {0}")]
    VoteBotNoAdmins(String),

    #[error("you have to set a time limit for VoteBot {0}")]
    VoteBotNoTimeLimit(String),

    #[error("the abstention_translation value for VoteBot {0} may not be empty")]
    VoteBotNoAbstention(String),

    #[error("you have to set the channel names for LogBot")]
    LogBotNoChannels,

    #[error("you have to set the log path for LogBot")]
    LogBotNoLogPath,

    #[error("could not open the log file {} for writing: {source}", path.display())]
    LogFile {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Top-level configuration, deserialized from `rosterd.toml`.
#[derive(Debug, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    #[serde(default)]
    pub tls: TlsConfig,
    /// `nickname = "<128-hex SHA-512>"`, lower-cased on load.
    #[serde(default)]
    pub users: BTreeMap<String, String>,
    /// Channel table keyed by display name.
    #[serde(default)]
    pub channels: BTreeMap<String, ChannelConfig>,
    /// LogBot section; absent means the bot is disabled.
    #[serde(default)]
    pub logbot: Option<LogBotConfig>,
    /// VoteBot instances; empty means all VoteBots are disabled.
    #[serde(default)]
    pub votebots: Vec<VoteBotConfig>,
    /// MOTD lines, loaded from `motd.txt`.
    #[serde(skip)]
    pub motd: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub port: u16,
    #[serde(default)]
    pub pidfile: PathBuf,
    #[serde(default)]
    pub use_ipv4: bool,
    #[serde(default)]
    pub use_ipv6: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct TlsConfig {
    #[serde(default)]
    pub enabled: bool,
    pub certificate: Option<PathBuf>,
    pub private_key: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
pub struct ChannelConfig {
    pub topic: String,
    /// Nicknames allowed to speak in the channel, lower-cased on load.
    pub users: Vec<String>,
    #[serde(default)]
    pub allow_observers: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogBotConfig {
    pub channels: Vec<String>,
    pub logpath: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VoteBotConfig {
    pub nick: String,
    pub admins: Vec<String>,
    pub channel: String,
    /// Time limit for casting ballots, in minutes.
    pub timelimit: u64,
    #[serde(default = "default_abstention")]
    pub abstention_translation: String,
}

fn default_abstention() -> String {
    "Abstention".to_string()
}

impl Config {
    /// Load and validate the configuration from a directory.
    pub fn load(dir: &Path) -> Result<Config, ConfigError> {
        let config_path = dir.join(CONFIG_FILE);
        let raw = std::fs::read_to_string(&config_path).map_err(|source| ConfigError::Read {
            path: config_path.clone(),
            source,
        })?;
        let mut config: Config = toml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: config_path,
            source: Box::new(source),
        })?;

        let motd_path = dir.join(MOTD_FILE);
        let motd_raw = std::fs::read_to_string(&motd_path).map_err(|source| ConfigError::Read {
            path: motd_path,
            source,
        })?;
        config.motd = motd_raw.lines().map(str::to_string).collect();

        config.validate()?;
        Ok(config)
    }

    /// Sanity checks; every failure here aborts startup.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.name.is_empty() {
            return Err(ConfigError::MissingName);
        }
        if self.server.port == 0 {
            return Err(ConfigError::MissingPort);
        }
        if !self.server.use_ipv4 && !self.server.use_ipv6 {
            return Err(ConfigError::NoIpFamily);
        }
        if self.server.pidfile.as_os_str().is_empty() {
            return Err(ConfigError::MissingPidfile);
        }
        if self.tls.enabled && (self.tls.certificate.is_none() || self.tls.private_key.is_none()) {
            return Err(ConfigError::IncompleteTls);
        }

        for (i, line) in self.motd.iter().enumerate() {
            if line.len() > MOTD_LINE_LENGTH {
                return Err(ConfigError::MotdLineTooLong { line: i + 1 });
            }
        }

        if self.channels.is_empty() {
            return Err(ConfigError::NoChannels);
        }
        for (name, channel) in &self.channels {
            if !is_valid_channel_name(name) {
                return Err(ConfigError::IllegalChannelName(name.clone()));
            }
            if channel.users.is_empty() {
                return Err(ConfigError::NoAllowedUsers(name.clone()));
            }
        }

        if let Some(logbot) = &self.logbot {
            if logbot.channels.is_empty() {
                return Err(ConfigError::LogBotNoChannels);
            }
            if logbot.logpath.as_os_str().is_empty() {
                return Err(ConfigError::LogBotNoLogPath);
            }
            for channel in &logbot.channels {
                self.require_channel("LogBot", channel)?;
            }
        }

        for votebot in &self.votebots {
            if votebot.admins.is_empty() {
                return Err(ConfigError::VoteBotNoAdmins(votebot.nick.clone()));
            }
            if votebot.timelimit == 0 {
                return Err(ConfigError::VoteBotNoTimeLimit(votebot.nick.clone()));
            }
            if votebot.abstention_translation.is_empty() {
                return Err(ConfigError::VoteBotNoAbstention(votebot.nick.clone()));
            }
            self.require_channel(&votebot.nick, &votebot.channel)?;
        }

        Ok(())
    }

    /// Build the reserved-nickname digest table.
    pub fn passhash_table(&self) -> Result<PassTable, ConfigError> {
        let mut table = PassTable::new();
        for (nick, hex) in &self.users {
            let digest = decode_passhash(hex).map_err(|source| ConfigError::BadPasshash {
                nick: nick.clone(),
                source,
            })?;
            table.insert(nick.to_ascii_lowercase(), digest);
        }
        Ok(table)
    }

    fn require_channel(&self, bot: &str, channel: &str) -> Result<(), ConfigError> {
        let exists = self
            .channels
            .keys()
            .any(|name| name.eq_ignore_ascii_case(channel));
        if exists {
            Ok(())
        } else {
            Err(ConfigError::UnknownBotChannel {
                bot: bot.to_string(),
                channel: channel.to_string(),
            })
        }
    }
}

/// Channel names are restricted to `[A-Za-z0-9_]+`.
pub fn is_valid_channel_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALICE_HASH: &str = "92ed1f0dfa10ad6b5a81d10560711b8d0f5cf5582221c7c14c7cbd594958c730b46a491979aa6f79de57d53237ff363d88464d141071ca52af31c63382f6c7a6";

    fn parse(toml_str: &str) -> Config {
        let mut config: Config = toml::from_str(toml_str).unwrap();
        config.motd = vec!["Welcome!".to_string()];
        config
    }

    fn base_config() -> Config {
        parse(&format!(
            r#"
            [server]
            name = "irc.example"
            port = 6667
            pidfile = "/run/rosterd.pid"
            use_ipv4 = true

            [users]
            alice = "{ALICE_HASH}"

            [channels.dev]
            topic = "dev talk"
            users = ["Alice"]
            "#
        ))
    }

    #[test]
    fn test_valid_config_passes() {
        base_config().validate().unwrap();
    }

    #[test]
    fn test_missing_name_rejected() {
        let mut config = base_config();
        config.server.name.clear();
        assert!(matches!(config.validate(), Err(ConfigError::MissingName)));
    }

    #[test]
    fn test_missing_port_rejected() {
        let mut config = base_config();
        config.server.port = 0;
        assert!(matches!(config.validate(), Err(ConfigError::MissingPort)));
    }

    #[test]
    fn test_no_ip_family_rejected() {
        let mut config = base_config();
        config.server.use_ipv4 = false;
        assert!(matches!(config.validate(), Err(ConfigError::NoIpFamily)));
    }

    #[test]
    fn test_channel_required() {
        let mut config = base_config();
        config.channels.clear();
        assert!(matches!(config.validate(), Err(ConfigError::NoChannels)));
    }

    #[test]
    fn test_channel_name_charset() {
        assert!(is_valid_channel_name("dev_team2"));
        assert!(!is_valid_channel_name("dev-team"));
        assert!(!is_valid_channel_name("#dev"));
        assert!(!is_valid_channel_name(""));
    }

    #[test]
    fn test_channel_without_users_rejected() {
        let mut config = base_config();
        config.channels.get_mut("dev").unwrap().users.clear();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::NoAllowedUsers(_))
        ));
    }

    #[test]
    fn test_motd_line_length_enforced() {
        let mut config = base_config();
        config.motd.push("x".repeat(MOTD_LINE_LENGTH + 1));
        assert!(matches!(
            config.validate(),
            Err(ConfigError::MotdLineTooLong { line: 2 })
        ));
    }

    #[test]
    fn test_passhash_table_lowercases_nicks() {
        let mut config = base_config();
        let hash = config.users.remove("alice").unwrap();
        config.users.insert("Alice".to_string(), hash);
        let table = config.passhash_table().unwrap();
        assert!(table.is_reserved("alice"));
    }

    #[test]
    fn test_bad_passhash_rejected() {
        let mut config = base_config();
        config.users.insert("bob".to_string(), "abcd".to_string());
        assert!(matches!(
            config.passhash_table(),
            Err(ConfigError::BadPasshash { .. })
        ));
    }

    #[test]
    fn test_votebot_unknown_channel_rejected() {
        let mut config = base_config();
        config.votebots.push(VoteBotConfig {
            nick: "VoteBot".to_string(),
            admins: vec!["alice".to_string()],
            channel: "nosuch".to_string(),
            timelimit: 10,
            abstention_translation: default_abstention(),
        });
        assert!(matches!(
            config.validate(),
            Err(ConfigError::UnknownBotChannel { .. })
        ));
    }

    #[test]
    fn test_tls_requires_cert_and_key() {
        let mut config = base_config();
        config.tls.enabled = true;
        assert!(matches!(config.validate(), Err(ConfigError::IncompleteTls)));
    }
}
