//! Virtual clients: in-process services that participate in message
//! delivery without owning a socket.
//!
//! A virtual client registers in the same nickname map as network clients
//! and is therefore a first-class target for PRIVMSG and channel fan-outs.
//! Its callbacks run under the registry lock with read access only; instead
//! of mutating state they return [`Effect`]s, which the dispatcher applies
//! after the delivery that produced them. That keeps handler execution
//! atomic and the lock non-reentrant.

mod chanserv;
mod logbot;
mod nickserv;
mod votebot;

pub use chanserv::ChanServ;
pub use logbot::LogBot;
pub use nickserv::NickServ;
pub use votebot::VoteBot;

use roster_proto::Message;
use std::time::Duration;

use crate::state::{ClientId, Registry};

/// Deferred state changes produced by virtual-client callbacks.
///
/// The `origin` of an effect is the virtual client whose callback returned
/// it; notices and private messages it produces are attributed to that
/// client's prefix.
#[derive(Debug, Clone)]
pub enum Effect {
    /// Send a NOTICE to a client.
    Notice { target: ClientId, text: String },

    /// Send a private message to a client.
    Privmsg { target: ClientId, text: String },

    /// Send a message to a channel through the regular PRIVMSG path, with
    /// the originating virtual client as the sender.
    ChannelMsg { channel: String, text: String },

    /// Mark a client as identified (successful IDENTIFY). For network
    /// clients this also re-arms the ping deadline.
    Identify { target: ClientId },

    /// Disconnect a network client (GHOST).
    Disconnect { target: ClientId, reason: String },

    /// Re-enter the originating client's [`VirtualClient::on_timer`] after
    /// the delay. The token lets the client ignore stale firings.
    Schedule { token: u64, delay: Duration },
}

impl Effect {
    /// Shorthand for a notice to one client.
    pub fn notice(target: ClientId, text: impl Into<String>) -> Effect {
        Effect::Notice {
            target,
            text: text.into(),
        }
    }

    /// Shorthand for a private message to one client.
    pub fn privmsg(target: ClientId, text: impl Into<String>) -> Effect {
        Effect::Privmsg {
            target,
            text: text.into(),
        }
    }
}

/// An in-process client.
///
/// Callbacks receive the registry read-only; the default implementations
/// ignore everything, so a service overrides only what it observes.
pub trait VirtualClient: Send + Sync {
    /// The nickname under which this client is registered.
    fn nickname(&self) -> &str;

    /// A channel fan-out line addressed to this client (JOIN, PART,
    /// PRIVMSG, QUIT, MODE). Receiving the parsed message means services
    /// observe channel traffic without reparsing.
    fn on_broadcast(&self, _msg: &Message, _reg: &Registry) -> Vec<Effect> {
        Vec::new()
    }

    /// A private message addressed to this client.
    fn on_private_message(&self, _sender: ClientId, _text: &str, _reg: &Registry) -> Vec<Effect> {
        Vec::new()
    }

    /// A notice addressed to this client.
    fn on_notice(&self, _sender: Option<ClientId>, _text: &str, _reg: &Registry) -> Vec<Effect> {
        Vec::new()
    }

    /// A deadline scheduled via [`Effect::Schedule`] fired.
    fn on_timer(&self, _token: u64, _reg: &Registry) -> Vec<Effect> {
        Vec::new()
    }
}
