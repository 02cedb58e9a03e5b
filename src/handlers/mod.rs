//! Command dispatch and per-command handlers.
//!
//! The dispatcher is a fixed mapping from upper-cased command name to a
//! handler; unknown commands are silently ignored. Handlers run
//! synchronously under the registry lock, so the state changes and the
//! fan-outs of one command are observed atomically by every other client.

pub mod channel;
pub mod connection;
pub mod fanout;
pub mod messaging;
pub mod server_query;


use roster_proto::Message;
use std::collections::VecDeque;

use crate::server::Server;
use crate::services::Effect;
use crate::state::{ClientId, Registry};

/// Everything a handler works with: the immutable server environment, the
/// locked registry, and the queue of service effects to apply afterwards.
pub struct Ctx<'a> {
    pub srv: &'a Server,
    pub reg: &'a mut Registry,
    pub fx: &'a mut VecDeque<(ClientId, Effect)>,
}

/// Route one parsed message to its handler.
///
/// Client-supplied prefixes were already dropped: the server trusts its own
/// nickname binding, not what the peer claims to be.
pub fn dispatch(ctx: &mut Ctx<'_>, sender: ClientId, msg: Message) {
    let args = msg.args;
    match msg.command.as_str() {
        "INFO" => server_query::info(ctx, sender),
        "JOIN" => channel::join(ctx, sender, &args),
        // MODE is not supported for real; the welcome sequence sends a
        // dummy +i reply for client compatibility.
        "MOTD" => server_query::motd(ctx, sender),
        "NAMES" => channel::names(ctx, sender, &args),
        "NICK" => connection::nick(ctx, sender, &args),
        // NOTICE from network clients is deliberately not accepted.
        "NS" => messaging::ns(ctx, sender, &args),
        "PART" => channel::part(ctx, sender, &args),
        "PING" => connection::ping(ctx, sender, &args),
        "PONG" => connection::pong(ctx, sender, &args),
        "PRIVMSG" => messaging::privmsg(ctx, sender, &args),
        "QUIT" => connection::quit(ctx, sender, &args),
        "TOPIC" => channel::topic(ctx, sender, &args),
        "USER" => connection::user(ctx, sender, &args),
        "VERSION" => server_query::version(ctx, sender),
        _ => {}
    }
}

/// Whether the sender has completed NICK+USER, the precondition for most
/// commands.
pub fn is_registered(reg: &Registry, sender: ClientId) -> bool {
    reg.client(sender)
        .map(|c| c.state.registered())
        .unwrap_or(false)
}
