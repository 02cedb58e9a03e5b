//! Connection lifecycle commands: NICK, USER, the welcome sequence,
//! PING/PONG and QUIT.

use roster_proto::{irc_to_lower, Message, Prefix, Response};
use tracing::debug;

use super::{fanout, server_query, Ctx};
use crate::network::session::{TimerPhase, IDENTIFY_TIMEOUT};
use crate::server::VERSION_ID;
use crate::state::ClientId;

/// Longest accepted nickname.
pub const NICKNAME_LENGTH: usize = 30;

/// Nicknames are restricted to `A-Z a-z _`.
fn is_valid_nick(nick: &str) -> bool {
    nick.chars().all(|c| c.is_ascii_alphabetic() || c == '_')
}

/// NICK - set or change the nickname. Network clients only; virtual
/// clients fix their nickname at construction.
pub fn nick(ctx: &mut Ctx<'_>, sender: ClientId, args: &[String]) {
    let (current, current_lc, identified, has_joined, was_registered) = {
        let Some(client) = ctx.reg.client(sender) else {
            return;
        };
        if !client.is_network() {
            debug!(sender, "NICK from a virtual client ignored");
            return;
        }
        (
            client.nickname.clone(),
            client.nickname_lc.clone(),
            client.state.identified,
            !client.joined.is_empty(),
            client.state.registered(),
        )
    };
    let server_name = ctx.srv.info.name.clone();

    let Some(new_nick) = args.first() else {
        fanout::send_numeric(
            ctx.reg,
            sender,
            &server_name,
            Response::ERR_NONICKNAMEGIVEN,
            |m| m.trailing("No nickname given"),
        );
        return;
    };

    // Changing to exactly the same nickname is silently ignored.
    if *new_nick == current {
        return;
    }

    if new_nick.len() > NICKNAME_LENGTH || !is_valid_nick(new_nick) {
        fanout::send_numeric(
            ctx.reg,
            sender,
            &server_name,
            Response::ERR_ERRONEUSNICKNAME,
            |m| m.arg(new_nick.clone()).trailing("Erroneous Nickname"),
        );
        return;
    }

    // The new nickname may collide with another client; it may also be the
    // sender's own nickname in different casing, which is allowed.
    let new_lc = irc_to_lower(new_nick);
    if let Some(owner) = ctx.reg.by_nick(&new_lc) {
        if owner != sender {
            fanout::send_numeric(
                ctx.reg,
                sender,
                &server_name,
                Response::ERR_NICKNAMEINUSE,
                |m| m.arg(new_nick.clone()).trailing("Nickname is already in use"),
            );
            return;
        }
    }

    if !current.is_empty() {
        if identified {
            fanout::send_notice(
                ctx.reg,
                ctx.fx,
                &server_name,
                None,
                sender,
                "You cannot change your nickname after having identified!",
            );
            return;
        }
        if has_joined {
            fanout::send_notice(
                ctx.reg,
                ctx.fx,
                &server_name,
                None,
                sender,
                "You cannot change your nickname after having joined a channel!",
            );
            return;
        }

        ctx.reg.nicks.remove(&current_lc);
        if let Some(client) = ctx.reg.client(sender) {
            let echo = Message::new("NICK")
                .with_prefix(client.prefix())
                .arg(new_nick.clone());
            fanout::push_message(ctx.reg, sender, &echo);
        }
    }

    ctx.reg.nicks.insert(new_lc.clone(), sender);
    if let Some(client) = ctx.reg.client_mut(sender) {
        client.set_nickname(new_nick, new_lc);
    }
    debug!(sender, nick = %new_nick, "Nick set");

    if was_registered {
        // The nickname changed after registration, so recheck whether the
        // new one is reserved.
        check_preset_nickname(ctx, sender);
    } else {
        let welcome_now = {
            let Some(client) = ctx.reg.client_mut(sender) else {
                return;
            };
            client.state.nick_sent = true;
            client.state.user_sent
        };
        if welcome_now {
            welcome(ctx, sender);
        }
    }
}

/// USER - the parameters are ignored entirely (user and host names are
/// preset), so this can only succeed.
pub fn user(ctx: &mut Ctx<'_>, sender: ClientId, _args: &[String]) {
    let welcome_now = {
        let Some(client) = ctx.reg.client_mut(sender) else {
            return;
        };
        if !client.is_network() || client.state.registered() {
            return;
        }
        client.state.user_sent = true;
        client.state.nick_sent
    };
    if welcome_now {
        welcome(ctx, sender);
    }
}

/// The welcome sequence run once NICK and USER have both been seen.
fn welcome(ctx: &mut Ctx<'_>, sender: ClientId) {
    let Some(client) = ctx.reg.client(sender) else {
        return;
    };
    let nick = client.nickname.clone();
    let server_name = ctx.srv.info.name.clone();
    let started = ctx.srv.info.started.clone();

    // Common welcome replies; some clients do not consider themselves
    // connected until they saw RPL_WELCOME.
    fanout::send_numeric(ctx.reg, sender, &server_name, Response::RPL_WELCOME, |m| {
        m.trailing(format!(
            "Welcome to the {} Internet Relay Chat Network {}",
            server_name, nick
        ))
    });
    fanout::send_numeric(ctx.reg, sender, &server_name, Response::RPL_YOURHOST, |m| {
        m.trailing(format!(
            "Your host is {}, running version {}",
            server_name, VERSION_ID
        ))
    });
    fanout::send_numeric(ctx.reg, sender, &server_name, Response::RPL_CREATED, |m| {
        m.trailing(format!("This server was created {}", started))
    });
    fanout::send_numeric(ctx.reg, sender, &server_name, Response::RPL_MYINFO, |m| {
        m.arg(server_name.clone()).arg(VERSION_ID).arg("iv").arg("i")
    });

    server_query::motd(ctx, sender);

    // Dummy +i mode so clients expecting a MODE reply at this point settle
    // down. Like other servers, the bare nickname stands in for the prefix.
    let mode = Message::new("MODE")
        .with_prefix(Prefix::ServerName(nick.clone()))
        .arg(nick)
        .trailing("+i");
    fanout::push_message(ctx.reg, sender, &mode);

    check_preset_nickname(ctx, sender);
}

/// Decide between the identify deadline and the regular ping schedule,
/// depending on whether the nickname is reserved.
fn check_preset_nickname(ctx: &mut Ctx<'_>, sender: ClientId) {
    let Some(client) = ctx.reg.client(sender) else {
        return;
    };
    let reserved = ctx.srv.vault.is_reserved(&client.nickname_lc);
    let server_name = ctx.srv.info.name.clone();

    if reserved {
        for text in [
            "This nickname is protected.".to_string(),
            format!(
                "Please identify with your password in the next {} seconds or you will be disconnected.",
                IDENTIFY_TIMEOUT
            ),
            "Use the command /NS IDENTIFY <password> to do so.".to_string(),
        ] {
            fanout::send_notice(ctx.reg, ctx.fx, &server_name, None, sender, &text);
        }
        if let Some(handle) = ctx.reg.client(sender).and_then(|c| c.network_handle()) {
            handle.timer.arm(TimerPhase::AwaitIdentify);
        }
    } else if let Some(handle) = ctx.reg.client(sender).and_then(|c| c.network_handle()) {
        handle.timer.arm(TimerPhase::Idle);
    }
}

/// PING - reply with a PONG carrying the client's token.
pub fn ping(ctx: &mut Ctx<'_>, sender: ClientId, args: &[String]) {
    let Some(client) = ctx.reg.client(sender) else {
        return;
    };
    if !client.is_network() || !client.state.registered() {
        return;
    }
    let server_name = ctx.srv.info.name.clone();

    let Some(token) = args.first() else {
        fanout::need_more_params(ctx.reg, sender, &server_name, "PING");
        return;
    };

    let pong = Message::new("PONG")
        .with_prefix(Prefix::ServerName(server_name.clone()))
        .arg(server_name)
        .trailing(token.clone());
    fanout::push_message(ctx.reg, sender, &pong);
}

/// PONG - the payload is ignored; any PONG proves the client alive and
/// schedules the next PING.
pub fn pong(ctx: &mut Ctx<'_>, sender: ClientId, _args: &[String]) {
    let Some(client) = ctx.reg.client(sender) else {
        return;
    };
    if !client.state.registered() {
        return;
    }
    if let Some(handle) = client.network_handle() {
        handle.timer.arm(TimerPhase::Idle);
    }
}

/// QUIT - client-supplied reasons are ignored.
pub fn quit(ctx: &mut Ctx<'_>, sender: ClientId, _args: &[String]) {
    let Some(client) = ctx.reg.client(sender) else {
        return;
    };
    if !client.is_network() || !client.state.registered() {
        return;
    }
    fanout::disconnect(ctx.reg, ctx.fx, sender, "Quit");
}
