//! PRIVMSG delivery and the NS convenience alias.

use roster_proto::{irc_to_lower, Message, Response};

use super::{fanout, is_registered, Ctx};
use crate::state::{ClientId, MemberStatus};

/// PRIVMSG - to a channel (`#name`) or to a single client.
pub fn privmsg(ctx: &mut Ctx<'_>, sender: ClientId, args: &[String]) {
    if !is_registered(ctx.reg, sender) {
        return;
    }
    let server_name = ctx.srv.info.name.clone();

    if args.is_empty() {
        fanout::send_numeric(
            ctx.reg,
            sender,
            &server_name,
            Response::ERR_NORECIPIENT,
            |m| m.trailing("No recipient given (PRIVMSG)"),
        );
        return;
    }
    if args.len() == 1 {
        fanout::send_numeric(
            ctx.reg,
            sender,
            &server_name,
            Response::ERR_NOTEXTTOSEND,
            |m| m.trailing("No text to send"),
        );
        return;
    }

    let target = &args[0];
    let text = &args[1];

    if let Some(stripped) = target.strip_prefix('#') {
        let key = irc_to_lower(stripped);
        let (display, status) = match ctx.reg.channels.get(&key) {
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
            Some(channel) => (channel.name.clone(), channel.status_of(sender)),
        };

        // Only joined clients with voice may send to the channel.
        if status != Some(MemberStatus::Voice) {
            fanout::send_numeric(
                ctx.reg,
                sender,
                &server_name,
                Response::ERR_CANNOTSENDTOCHAN,
                |m| m.arg(format!("#{key}")).trailing("Cannot send to channel"),
            );
            return;
        }

        let Some(client) = ctx.reg.client(sender) else {
            return;
        };
        let msg = Message::new("PRIVMSG")
            .with_prefix(client.prefix())
            .arg(format!("#{display}"))
            .trailing(text.clone());
        // Everyone but the sender gets the message.
        fanout::broadcast_to_channel(ctx.reg, ctx.fx, &key, &msg, Some(sender));
    } else {
        let key = irc_to_lower(target);
        match ctx.reg.by_nick(&key) {
            None => {
                fanout::send_numeric(
                    ctx.reg,
                    sender,
                    &server_name,
                    Response::ERR_NOSUCHNICK,
                    |m| m.arg(key.clone()).trailing("No such nick/channel"),
                );
            }
            Some(target_id) => {
                fanout::send_private_message(ctx.reg, ctx.fx, sender, target_id, text);
            }
        }
    }
}

/// NS - an abbreviation for `PRIVMSG NickServ <...>`; all parameters are
/// re-joined into one message body.
pub fn ns(ctx: &mut Ctx<'_>, sender: ClientId, args: &[String]) {
    if !is_registered(ctx.reg, sender) {
        return;
    }
    let body = args.join(" ");
    privmsg(ctx, sender, &["nickserv".to_string(), body]);
}
