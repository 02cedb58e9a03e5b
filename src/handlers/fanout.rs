//! Delivery plumbing: numerics, notices, private messages, channel
//! fan-outs and the centralized disconnect procedure.
//!
//! Network recipients get lines enqueued into their mailbox; virtual
//! recipients get the parsed message through their callbacks, whose effects
//! are queued for the dispatcher to apply after the delivery.

use roster_proto::{Message, Prefix, Response};
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use crate::services::Effect;
use crate::state::{ClientId, ClientKind, Registry};

/// Push an already-built message to a network client. Messages addressed to
/// virtual clients this way are discarded, as are numeric replies.
pub fn push_message(reg: &Registry, target: ClientId, msg: &Message) {
    if let Some(handle) = reg.client(target).and_then(|c| c.network_handle()) {
        handle.push_line(msg.to_string());
    }
}

/// Send one numeric reply. The closure appends the reply's arguments to the
/// prepared `:<server> NNN <target>` stem.
pub fn send_numeric(
    reg: &Registry,
    target: ClientId,
    server_name: &str,
    code: Response,
    build: impl FnOnce(Message) -> Message,
) {
    let Some(client) = reg.client(target) else {
        return;
    };
    // Numeric replies to virtual clients are discarded.
    if let Some(handle) = client.network_handle() {
        let msg = build(Message::numeric(
            server_name,
            code,
            client.nickname_as_target(),
        ));
        handle.push_line(msg.to_string());
    }
}

/// ERR_NEEDMOREPARAMS for the given command.
pub fn need_more_params(reg: &Registry, target: ClientId, server_name: &str, command: &str) {
    send_numeric(reg, target, server_name, Response::ERR_NEEDMOREPARAMS, |m| {
        m.arg(command).trailing("Not enough parameters")
    });
}

/// Send a NOTICE to a client. `from` of `None` makes the server itself the
/// sender.
pub fn send_notice(
    reg: &Registry,
    fx: &mut VecDeque<(ClientId, Effect)>,
    server_name: &str,
    from: Option<ClientId>,
    target: ClientId,
    text: &str,
) {
    let Some(client) = reg.client(target) else {
        return;
    };
    let prefix = match from {
        Some(id) => match reg.client(id) {
            Some(sender) => sender.prefix(),
            None => return,
        },
        None => Prefix::ServerName(server_name.to_string()),
    };
    match &client.kind {
        ClientKind::Network(handle) => {
            let msg = Message::new("NOTICE")
                .with_prefix(prefix)
                .arg(client.nickname_as_target())
                .trailing(text);
            handle.push_line(msg.to_string());
        }
        ClientKind::Virtual(service) => {
            let service = Arc::clone(service);
            let effects = service.on_notice(from, text, reg);
            fx.extend(effects.into_iter().map(|e| (target, e)));
        }
    }
}

/// Deliver a private message from one client to another.
pub fn send_private_message(
    reg: &Registry,
    fx: &mut VecDeque<(ClientId, Effect)>,
    from: ClientId,
    target: ClientId,
    text: &str,
) {
    let Some(sender) = reg.client(from) else {
        return;
    };
    let Some(client) = reg.client(target) else {
        return;
    };
    match &client.kind {
        ClientKind::Network(handle) => {
            let msg = Message::new("PRIVMSG")
                .with_prefix(sender.prefix())
                .arg(client.nickname_as_target())
                .trailing(text);
            handle.push_line(msg.to_string());
        }
        ClientKind::Virtual(service) => {
            let service = Arc::clone(service);
            let effects = service.on_private_message(from, text, reg);
            fx.extend(effects.into_iter().map(|e| (target, e)));
        }
    }
}

/// Broadcast a message to every member of a channel, optionally skipping
/// one client (PRIVMSG never echoes to its sender). Virtual members observe
/// the message through their broadcast callback.
pub fn broadcast_to_channel(
    reg: &Registry,
    fx: &mut VecDeque<(ClientId, Effect)>,
    channel_key: &str,
    msg: &Message,
    skip: Option<ClientId>,
) {
    let Some(channel) = reg.channels.get(channel_key) else {
        return;
    };
    let line = Arc::new(msg.to_string());
    for (&member_id, _) in &channel.members {
        if skip == Some(member_id) {
            continue;
        }
        let Some(member) = reg.client(member_id) else {
            continue;
        };
        match &member.kind {
            ClientKind::Network(handle) => handle.push_shared(&line),
            ClientKind::Virtual(service) => {
                let service = Arc::clone(service);
                let effects = service.on_broadcast(msg, reg);
                fx.extend(effects.into_iter().map(|e| (member_id, e)));
            }
        }
    }
}

/// The centralized, idempotent disconnect procedure for network clients.
///
/// Broadcasts `:<prefix> QUIT :<reason>` exactly once to each unique member
/// of every channel the client was in, removes the memberships and the
/// nickname, sends the ERROR farewell and drops the client; closing its
/// mailbox ends the session task. A second call for the same client finds
/// nothing and returns.
pub fn disconnect(
    reg: &mut Registry,
    fx: &mut VecDeque<(ClientId, Effect)>,
    id: ClientId,
    reason: &str,
) {
    let (prefix, nickname_lc, target, joined) = {
        let Some(client) = reg.client(id) else {
            return;
        };
        // Virtual clients live for the process lifetime.
        if !client.is_network() {
            return;
        }
        (
            client.prefix(),
            client.nickname_lc.clone(),
            client.nickname_as_target().to_string(),
            client.joined.iter().cloned().collect::<Vec<_>>(),
        )
    };

    if !nickname_lc.is_empty() && !joined.is_empty() {
        let quit = Message::new("QUIT").with_prefix(prefix).trailing(reason);
        let line = Arc::new(quit.to_string());
        let mut handled: HashSet<ClientId> = HashSet::new();

        // The departing client is still a member here, so it sees its own
        // QUIT, and LogBot-style observers can still inspect its
        // memberships.
        for key in &joined {
            let Some(channel) = reg.channels.get(key) else {
                continue;
            };
            for (&member_id, _) in &channel.members {
                if !handled.insert(member_id) {
                    continue;
                }
                let Some(member) = reg.client(member_id) else {
                    continue;
                };
                match &member.kind {
                    ClientKind::Network(handle) => handle.push_shared(&line),
                    ClientKind::Virtual(service) => {
                        let service = Arc::clone(service);
                        let effects = service.on_broadcast(&quit, reg);
                        fx.extend(effects.into_iter().map(|e| (member_id, e)));
                    }
                }
            }
        }
    }

    for key in &joined {
        if let Some(channel) = reg.channels.get_mut(key) {
            channel.members.remove(&id);
        }
    }
    if let Some(client) = reg.client_mut(id) {
        client.joined.clear();
    }
    if !nickname_lc.is_empty() {
        reg.nicks.remove(&nickname_lc);
    }

    // Sessions enter the registry only once any TLS handshake is done, so
    // the farewell can actually reach them.
    if let Some(handle) = reg.client(id).and_then(|c| c.network_handle()) {
        let farewell =
            Message::new("ERROR").trailing(format!("Closing Link: {} ({})", target, reason));
        handle.push_line(farewell.to_string());
    }

    reg.clients.remove(&id);
}
