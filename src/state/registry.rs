//! The registry: process-global maps from nicknames and channel names to
//! clients and channels.
//!
//! All mutation happens under the server's single registry lock, held for
//! the whole of "decode one frame, run its handler, enqueue the fan-outs".
//! Membership is kept in lock-step: a client appears in a channel's member
//! map exactly when the channel's key appears in the client's joined set.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::network::session::SessionTimer;
use crate::services::VirtualClient;
use crate::state::channel::{Channel, MemberStatus};
use crate::state::client::{Client, ClientId};

pub struct Registry {
    pub clients: HashMap<ClientId, Client>,
    /// Lower-cased nickname -> client. Keys are unique by equality.
    pub nicks: HashMap<String, ClientId>,
    /// Lower-cased channel name -> channel. Populated once at startup.
    pub channels: HashMap<String, Channel>,
}

impl Registry {
    pub fn new(channels: HashMap<String, Channel>) -> Registry {
        Registry {
            clients: HashMap::new(),
            nicks: HashMap::new(),
            channels,
        }
    }

    pub fn client(&self, id: ClientId) -> Option<&Client> {
        self.clients.get(&id)
    }

    pub fn client_mut(&mut self, id: ClientId) -> Option<&mut Client> {
        self.clients.get_mut(&id)
    }

    pub fn by_nick(&self, nick_lc: &str) -> Option<ClientId> {
        self.nicks.get(nick_lc).copied()
    }

    /// Add a freshly accepted network connection.
    pub fn attach_network(
        &mut self,
        id: ClientId,
        tx: mpsc::UnboundedSender<Arc<String>>,
        timer: Arc<SessionTimer>,
    ) {
        self.clients.insert(id, Client::network(id, tx, timer));
    }

    /// Add a virtual client. Virtual clients are trusted: their nickname
    /// enters the registry without the validation applied to NICK.
    pub fn register_virtual(&mut self, id: ClientId, service: Arc<dyn VirtualClient>) {
        let client = Client::virtual_client(id, service);
        self.nicks.insert(client.nickname_lc.clone(), id);
        self.clients.insert(id, client);
    }

    /// Add a client to a channel, updating both sides of the membership.
    pub fn add_member(&mut self, id: ClientId, channel_key: &str, status: MemberStatus) {
        if let Some(channel) = self.channels.get_mut(channel_key) {
            channel.members.insert(id, status);
        }
        if let Some(client) = self.clients.get_mut(&id) {
            client.joined.insert(channel_key.to_string());
        }
    }

    /// Remove a client from a channel, updating both sides of the membership.
    pub fn remove_member(&mut self, id: ClientId, channel_key: &str) {
        if let Some(channel) = self.channels.get_mut(channel_key) {
            channel.members.remove(&id);
        }
        if let Some(client) = self.clients.get_mut(&id) {
            client.joined.remove(channel_key);
        }
    }

    /// Whether the membership maps are mutually consistent. Used by tests.
    #[cfg(test)]
    pub fn membership_consistent(&self) -> bool {
        for (key, channel) in &self.channels {
            for id in channel.members.keys() {
                match self.clients.get(id) {
                    Some(client) if client.joined.contains(key) => {}
                    _ => return false,
                }
            }
        }
        for (id, client) in &self.clients {
            for key in &client.joined {
                match self.channels.get(key) {
                    Some(channel) if channel.members.contains_key(id) => {}
                    _ => return false,
                }
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::session::SessionTimer;
    use std::collections::HashSet;

    fn registry_with_channel() -> Registry {
        let mut channels = HashMap::new();
        channels.insert(
            "dev".to_string(),
            Channel::new("dev", "dev talk", HashSet::new(), true),
        );
        Registry::new(channels)
    }

    fn attach(reg: &mut Registry, id: ClientId) -> mpsc::UnboundedReceiver<Arc<String>> {
        let (tx, rx) = mpsc::unbounded_channel();
        reg.attach_network(id, tx, Arc::new(SessionTimer::new()));
        rx
    }

    #[test]
    fn test_membership_is_mirrored() {
        let mut reg = registry_with_channel();
        let _rx = attach(&mut reg, 1);

        reg.add_member(1, "dev", MemberStatus::Voice);
        assert!(reg.channels["dev"].is_member(1));
        assert!(reg.clients[&1].joined.contains("dev"));
        assert!(reg.membership_consistent());

        reg.remove_member(1, "dev");
        assert!(!reg.channels["dev"].is_member(1));
        assert!(!reg.clients[&1].joined.contains("dev"));
        assert!(reg.membership_consistent());
    }

    #[test]
    fn test_nick_keys_are_unique_handles() {
        let mut reg = registry_with_channel();
        let _rx = attach(&mut reg, 1);
        reg.nicks.insert("alice".to_string(), 1);
        assert_eq!(reg.by_nick("alice"), Some(1));
        assert_eq!(reg.by_nick("bob"), None);
    }
}
