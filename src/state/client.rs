//! Clients: network connections and in-process virtual clients, presented
//! uniformly to the dispatcher.

use roster_proto::Prefix;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::network::session::SessionTimer;
use crate::services::VirtualClient;

/// Stable identifier for a client in the registry.
pub type ClientId = u64;

/// Registration and identification progress of a client.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct UserState {
    pub nick_sent: bool,
    pub user_sent: bool,
    pub identified: bool,
}

impl UserState {
    /// Both NICK and USER have been seen; precondition for most commands.
    pub fn registered(&self) -> bool {
        self.nick_sent && self.user_sent
    }
}

/// The network side of a connected client: its outbound mailbox and its one
/// reusable deadline timer. Lines sent into the mailbox are written to the
/// socket in FIFO order with a single write in flight; dropping the sender
/// (by removing the client from the registry) ends the session.
pub struct NetworkHandle {
    tx: mpsc::UnboundedSender<Arc<String>>,
    pub timer: Arc<SessionTimer>,
}

impl NetworkHandle {
    pub fn new(tx: mpsc::UnboundedSender<Arc<String>>, timer: Arc<SessionTimer>) -> NetworkHandle {
        NetworkHandle { tx, timer }
    }

    /// Enqueue one complete outbound line (without the CRLF).
    pub fn push_line(&self, line: String) {
        let _ = self.tx.send(Arc::new(line));
    }

    /// Enqueue a line shared with other recipients of the same broadcast.
    pub fn push_shared(&self, line: &Arc<String>) {
        let _ = self.tx.send(Arc::clone(line));
    }
}

/// What kind of client an entry is.
pub enum ClientKind {
    Network(NetworkHandle),
    Virtual(Arc<dyn VirtualClient>),
}

/// A client known to the registry.
///
/// An empty nickname means the client is pre-registration and absent from
/// the nickname map. `nickname_lc` is always the lowercase of `nickname`.
pub struct Client {
    pub id: ClientId,
    pub nickname: String,
    pub nickname_lc: String,
    pub state: UserState,
    /// Lower-cased keys of the channels this client has joined.
    pub joined: HashSet<String>,
    pub kind: ClientKind,
}

impl Client {
    pub fn network(
        id: ClientId,
        tx: mpsc::UnboundedSender<Arc<String>>,
        timer: Arc<SessionTimer>,
    ) -> Client {
        Client {
            id,
            nickname: String::new(),
            nickname_lc: String::new(),
            state: UserState::default(),
            joined: HashSet::new(),
            kind: ClientKind::Network(NetworkHandle::new(tx, timer)),
        }
    }

    pub fn virtual_client(id: ClientId, service: Arc<dyn VirtualClient>) -> Client {
        let nickname = service.nickname().to_string();
        let nickname_lc = nickname.to_ascii_lowercase();
        Client {
            id,
            nickname,
            nickname_lc,
            state: UserState {
                nick_sent: true,
                user_sent: true,
                identified: true,
            },
            joined: HashSet::new(),
            kind: ClientKind::Virtual(service),
        }
    }

    pub fn is_network(&self) -> bool {
        matches!(self.kind, ClientKind::Network(_))
    }

    /// The nickname used as the target of numeric replies; `*` before one
    /// has been set.
    pub fn nickname_as_target(&self) -> &str {
        if self.nickname.is_empty() {
            "*"
        } else {
            &self.nickname
        }
    }

    /// The `nick!nicklc@host` prefix attributed to this client.
    pub fn prefix(&self) -> Prefix {
        let host = if self.is_network() { "network" } else { "virtual" };
        Prefix::Nickname(
            self.nickname.clone(),
            self.nickname_lc.clone(),
            host.to_string(),
        )
    }

    /// Update the nickname, keeping the lowercase form in lock-step.
    pub fn set_nickname(&mut self, nickname: &str, nickname_lc: String) {
        self.nickname = nickname.to_string();
        self.nickname_lc = nickname_lc;
    }

    /// The network handle, if this is a network client.
    pub fn network_handle(&self) -> Option<&NetworkHandle> {
        match &self.kind {
            ClientKind::Network(handle) => Some(handle),
            ClientKind::Virtual(_) => None,
        }
    }

    /// The virtual-client service, if this is one.
    pub fn virtual_service(&self) -> Option<&Arc<dyn VirtualClient>> {
        match &self.kind {
            ClientKind::Virtual(service) => Some(service),
            ClientKind::Network(_) => None,
        }
    }
}
