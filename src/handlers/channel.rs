//! Channel commands: JOIN, PART, TOPIC and NAMES.

use roster_proto::{irc_to_lower, Message, Response};

use super::{fanout, is_registered, Ctx};
use crate::services::ChanServ;
use crate::state::{ClientId, MemberStatus};

/// Split a comma-separated channel list into lower-cased keys, stripping
/// one leading `#` per token.
fn split_channel_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|token| irc_to_lower(token.strip_prefix('#').unwrap_or(token)))
        .collect()
}

/// JOIN - enter one or more preconfigured channels.
pub fn join(ctx: &mut Ctx<'_>, sender: ClientId, args: &[String]) {
    if !is_registered(ctx.reg, sender) {
        return;
    }
    let server_name = ctx.srv.info.name.clone();

    let Some(list) = args.first() else {
        fanout::need_more_params(ctx.reg, sender, &server_name, "JOIN");
        return;
    };

    if list.as_str() == "0" {
        // Leave all joined channels, as if the client had sent a PART for
        // each one. "0" is not itself a channel name, so stop here.
        let joined: Vec<String> = ctx
            .reg
            .client(sender)
            .map(|c| c.joined.iter().cloned().collect())
            .unwrap_or_default();
        for key in joined {
            part_one(ctx, sender, &key);
        }
        return;
    }

    let (nick_lc, identified, is_network) = {
        let Some(client) = ctx.reg.client(sender) else {
            return;
        };
        (
            client.nickname_lc.clone(),
            client.state.identified,
            client.is_network(),
        )
    };

    // A reserved nickname may not enter any channel before identifying.
    if ctx.srv.vault.is_reserved(&nick_lc) && !identified {
        fanout::send_notice(
            ctx.reg,
            ctx.fx,
            &server_name,
            None,
            sender,
            "Please identify first!",
        );
        return;
    }

    for key in split_channel_list(list) {
        join_one(ctx, sender, &key, &nick_lc, is_network);
    }
}

fn join_one(ctx: &mut Ctx<'_>, sender: ClientId, key: &str, nick_lc: &str, is_network: bool) {
    let server_name = ctx.srv.info.name.clone();

    let (display, voiced, already_member) = match ctx.reg.channels.get(key) {
        None => {
            fanout::send_numeric(
                ctx.reg,
                sender,
                &server_name,
                Response::ERR_NOSUCHCHANNEL,
                |m| m.arg(format!("#{key}")).trailing("No such channel"),
            );
            return;
        }
        Some(channel) => {
            // Virtual clients and rostered users get voice; everyone else
            // may only observe, where observing is allowed at all.
            let voiced = !is_network || channel.allowed_users.contains(nick_lc);
            if !voiced && !channel.allow_observers {
                fanout::send_notice(
                    ctx.reg,
                    ctx.fx,
                    &server_name,
                    None,
                    sender,
                    "You are not allowed to join this channel!",
                );
                return;
            }
            (channel.name.clone(), voiced, channel.is_member(sender))
        }
    };

    // Joining a channel the client is already in is a no-op.
    if already_member {
        return;
    }

    let status = if voiced {
        MemberStatus::Voice
    } else {
        MemberStatus::NoStatus
    };
    ctx.reg.add_member(sender, key, status);

    let Some(client) = ctx.reg.client(sender) else {
        return;
    };
    let join_msg = Message::new("JOIN")
        .with_prefix(client.prefix())
        .arg(format!("#{display}"));
    fanout::broadcast_to_channel(ctx.reg, ctx.fx, key, &join_msg, None);

    // ChanServ publishes the voice grant, strictly after every member has
    // seen the JOIN itself.
    ChanServ::publish_member_status(ctx, key, sender);

    topic_of(ctx, sender, key);
    names_of(ctx, sender, key);
}

/// PART - leave one or more channels. Part reasons are ignored.
pub fn part(ctx: &mut Ctx<'_>, sender: ClientId, args: &[String]) {
    if !is_registered(ctx.reg, sender) {
        return;
    }
    let server_name = ctx.srv.info.name.clone();

    let Some(list) = args.first() else {
        fanout::need_more_params(ctx.reg, sender, &server_name, "PART");
        return;
    };

    for key in split_channel_list(list) {
        let membership = ctx.reg.channels.get(&key).map(|c| c.is_member(sender));
        match membership {
            None => {
                fanout::send_numeric(
                    ctx.reg,
                    sender,
                    &server_name,
                    Response::ERR_NOSUCHCHANNEL,
                    |m| m.arg(format!("#{key}")).trailing("No such channel"),
                );
            }
            Some(false) => {
                fanout::send_numeric(
                    ctx.reg,
                    sender,
                    &server_name,
                    Response::ERR_NOTONCHANNEL,
                    |m| m.arg(format!("#{key}")).trailing("You're not on that channel"),
                );
                return;
            }
            Some(true) => part_one(ctx, sender, &key),
        }
    }
}

/// Broadcast the PART to everyone (including the leaver) and drop the
/// membership on both sides.
fn part_one(ctx: &mut Ctx<'_>, sender: ClientId, key: &str) {
    let Some(channel) = ctx.reg.channels.get(key) else {
        return;
    };
    if !channel.is_member(sender) {
        return;
    }
    let display = channel.name.clone();

    let Some(client) = ctx.reg.client(sender) else {
        return;
    };
    let part_msg = Message::new("PART")
        .with_prefix(client.prefix())
        .arg(format!("#{display}"));
    fanout::broadcast_to_channel(ctx.reg, ctx.fx, key, &part_msg, None);

    ctx.reg.remove_member(sender, key);
}

/// TOPIC - topics are preset; this only ever reports them.
pub fn topic(ctx: &mut Ctx<'_>, sender: ClientId, args: &[String]) {
    if !is_registered(ctx.reg, sender) {
        return;
    }
    let server_name = ctx.srv.info.name.clone();

    if args.is_empty() {
        fanout::need_more_params(ctx.reg, sender, &server_name, "TOPIC");
        return;
    }
    // Changing topics is not supported; such requests are silently dropped.
    if args.len() >= 2 {
        return;
    }

    let key = irc_to_lower(args[0].strip_prefix('#').unwrap_or(&args[0]));
    match ctx.reg.channels.get(&key) {
        None => {
            fanout::send_numeric(
                ctx.reg,
                sender,
                &server_name,
                Response::ERR_NOSUCHCHANNEL,
                |m| m.arg(format!("#{key}")).trailing("No such channel"),
            );
        }
        Some(_) => topic_of(ctx, sender, &key),
    }
}

fn topic_of(ctx: &mut Ctx<'_>, sender: ClientId, key: &str) {
    let Some(channel) = ctx.reg.channels.get(key) else {
        return;
    };
    let topic = channel.topic.clone();
    let server_name = ctx.srv.info.name.clone();

    if topic.is_empty() {
        fanout::send_numeric(ctx.reg, sender, &server_name, Response::RPL_NOTOPIC, |m| {
            m.arg(format!("#{key}")).trailing("No topic is set")
        });
    } else {
        fanout::send_numeric(ctx.reg, sender, &server_name, Response::RPL_TOPIC, |m| {
            m.arg(format!("#{key}")).trailing(topic)
        });
    }
}

/// NAMES - list channel members. Without arguments nothing is returned.
pub fn names(ctx: &mut Ctx<'_>, sender: ClientId, args: &[String]) {
    if !is_registered(ctx.reg, sender) {
        return;
    }
    let Some(list) = args.first() else {
        return;
    };

    for key in split_channel_list(list) {
        names_of(ctx, sender, &key);
    }
}

/// One channel's RPL_NAMREPLY (when it exists) and the unconditional
/// RPL_ENDOFNAMES: there is no error reply for bad channel names.
fn names_of(ctx: &mut Ctx<'_>, sender: ClientId, key: &str) {
    let server_name = ctx.srv.info.name.clone();

    if let Some(channel) = ctx.reg.channels.get(key) {
        // List members in registration order so the output is stable.
        let mut members: Vec<(ClientId, MemberStatus)> = channel
            .members
            .iter()
            .map(|(&id, &status)| (id, status))
            .collect();
        members.sort_by_key(|(id, _)| *id);

        let mut list = String::new();
        for (id, status) in members {
            let Some(member) = ctx.reg.client(id) else {
                continue;
            };
            if !list.is_empty() {
                list.push(' ');
            }
            if status == MemberStatus::Voice {
                list.push('+');
            }
            list.push_str(&member.nickname);
        }

        fanout::send_numeric(ctx.reg, sender, &server_name, Response::RPL_NAMREPLY, |m| {
            m.arg("=").arg(format!("#{key}")).trailing(list)
        });
    }

    fanout::send_numeric(
        ctx.reg,
        sender,
        &server_name,
        Response::RPL_ENDOFNAMES,
        |m| m.arg(format!("#{key}")).trailing("End of NAMES list"),
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_channel_list() {
        assert_eq!(split_channel_list("#Dev,ops,#Chat"), ["dev", "ops", "chat"]);
        assert_eq!(split_channel_list("dev"), ["dev"]);
    }
}
