//! Channels: named broadcast groups with a fixed roster and per-member
//! voice status.

use std::collections::{HashMap, HashSet};

use crate::state::client::ClientId;

/// Per-member status inside a channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MemberStatus {
    NoStatus,
    /// The member may speak in the channel; rendered as `+` in NAMES.
    Voice,
}

/// A preconfigured channel. The topic and the allowed-user roster are fixed
/// at load time; only the member map changes at runtime.
#[derive(Debug)]
pub struct Channel {
    /// Display name, without the `#`, in the casing the configuration used.
    pub name: String,
    /// Lower-cased name, the registry key.
    pub name_lc: String,
    pub topic: String,
    /// Lower-cased nicknames allowed to speak.
    pub allowed_users: HashSet<String>,
    /// Whether clients outside the roster may join (without voice).
    pub allow_observers: bool,
    pub members: HashMap<ClientId, MemberStatus>,
}

impl Channel {
    pub fn new(
        name: &str,
        topic: &str,
        allowed_users: HashSet<String>,
        allow_observers: bool,
    ) -> Channel {
        Channel {
            name: name.to_string(),
            name_lc: name.to_ascii_lowercase(),
            topic: topic.to_string(),
            allowed_users,
            allow_observers,
            members: HashMap::new(),
        }
    }

    pub fn is_member(&self, id: ClientId) -> bool {
        self.members.contains_key(&id)
    }

    pub fn status_of(&self, id: ClientId) -> Option<MemberStatus> {
        self.members.get(&id).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_lowercases_key_but_keeps_display_name() {
        let channel = Channel::new("Dev", "dev talk", HashSet::new(), false);
        assert_eq!(channel.name, "Dev");
        assert_eq!(channel.name_lc, "dev");
    }
}
