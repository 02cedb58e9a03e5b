//! LogBot: keeps a plain-text transcript of the channels it is configured
//! to sit in.

use chrono::Local;
use parking_lot::Mutex;
use roster_proto::{irc_to_lower, Message, Prefix};
use std::collections::HashMap;
use std::fs::File;
use std::io::Write;

use crate::config::{ConfigError, LogBotConfig};
use crate::services::{Effect, VirtualClient};
use crate::state::Registry;

/// One transcript file per logged channel, keyed by lower-cased channel
/// name.
pub struct LogBot {
    streams: Mutex<HashMap<String, File>>,
}

impl LogBot {
    /// Open the transcript files. The file names carry a startup timestamp
    /// so restarts never clobber an earlier transcript.
    pub fn new(config: &LogBotConfig) -> Result<LogBot, ConfigError> {
        let stamp = Local::now().format("%Y-%m-%d_%H%M%S");
        let mut streams = HashMap::new();

        for channel in &config.channels {
            let path = config.logpath.join(format!("{} - {}.log", stamp, channel));
            let file = File::create(&path).map_err(|source| ConfigError::LogFile {
                path: path.clone(),
                source,
            })?;
            streams.insert(irc_to_lower(channel), file);
        }

        Ok(LogBot {
            streams: Mutex::new(streams),
        })
    }

    /// The lower-cased names of the logged channels.
    pub fn channel_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.streams.lock().keys().cloned().collect();
        keys.sort();
        keys
    }

    fn timestamp() -> String {
        Local::now().format("[%H:%M]").to_string()
    }

    fn log(&self, channel_key: &str, line: &str) {
        if let Some(file) = self.streams.lock().get_mut(channel_key) {
            let _ = writeln!(file, "{} {}", Self::timestamp(), line);
        }
    }
}

impl VirtualClient for LogBot {
    fn nickname(&self) -> &str {
        "LogBot"
    }

    fn on_broadcast(&self, msg: &Message, reg: &Registry) -> Vec<Effect> {
        // Server-originated lines carry no nickname prefix; nothing to log.
        let Some(Prefix::Nickname(nick, nick_lc, _)) = &msg.prefix else {
            return Vec::new();
        };

        match msg.command.as_str() {
            "JOIN" => {
                let Some(target) = msg.param(0) else {
                    return Vec::new();
                };
                let key = irc_to_lower(target.strip_prefix('#').unwrap_or(target));

                // Voice is decided before the JOIN broadcast goes out, so
                // the membership map already knows this member's status.
                let voiced = reg
                    .by_nick(nick_lc)
                    .and_then(|id| reg.channels.get(&key).and_then(|c| c.status_of(id)))
                    .map(|status| status == crate::state::MemberStatus::Voice)
                    .unwrap_or(false);

                self.log(
                    &key,
                    &format!(
                        "{} has joined {}{}",
                        nick,
                        target,
                        if voiced { " with voice status" } else { "" }
                    ),
                );
            }

            "PART" => {
                let Some(target) = msg.param(0) else {
                    return Vec::new();
                };
                let key = irc_to_lower(target.strip_prefix('#').unwrap_or(target));
                self.log(&key, &format!("{} has left {}", nick, target));
            }

            "PRIVMSG" => {
                let (Some(target), Some(text)) = (msg.param(0), msg.param(1)) else {
                    return Vec::new();
                };
                let key = irc_to_lower(target.strip_prefix('#').unwrap_or(target));
                self.log(&key, &format!("<{}> {}", nick, text));
            }

            "QUIT" => {
                // The quitter is still registered while the QUIT fans out,
                // so its memberships tell us which transcripts to write.
                let reason = msg.param(0).unwrap_or("");
                let Some(joined) = reg
                    .by_nick(nick_lc)
                    .and_then(|id| reg.client(id))
                    .map(|client| client.joined.clone())
                else {
                    return Vec::new();
                };
                for key in joined {
                    self.log(
                        &key,
                        &format!("{} has quit the server ({})", nick, reason),
                    );
                }
            }

            _ => {}
        }

        Vec::new()
    }
}
