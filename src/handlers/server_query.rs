//! Informational commands: MOTD, INFO and VERSION.

use roster_proto::Response;

use super::{fanout, is_registered, Ctx};
use crate::server::{PRODUCT_NAME, VERSION_ID};
use crate::state::ClientId;

/// MOTD - replay the line-based message of the day.
pub fn motd(ctx: &mut Ctx<'_>, sender: ClientId) {
    if !is_registered(ctx.reg, sender) {
        return;
    }
    let server_name = ctx.srv.info.name.clone();

    fanout::send_numeric(
        ctx.reg,
        sender,
        &server_name,
        Response::RPL_MOTDSTART,
        |m| m.trailing(format!("- {} Message of the day - ", server_name)),
    );
    for line in &ctx.srv.info.motd {
        fanout::send_numeric(ctx.reg, sender, &server_name, Response::RPL_MOTD, |m| {
            m.trailing(format!("- {line}"))
        });
    }
    fanout::send_numeric(
        ctx.reg,
        sender,
        &server_name,
        Response::RPL_ENDOFMOTD,
        |m| m.trailing("End of MOTD command."),
    );
}

/// INFO - credits and uptime. Available before registration.
pub fn info(ctx: &mut Ctx<'_>, sender: ClientId) {
    let server_name = ctx.srv.info.name.clone();
    let lines = [
        PRODUCT_NAME.to_string(),
        VERSION_ID.to_string(),
        String::new(),
        format!("On-line since {}", ctx.srv.info.started),
    ];
    for line in lines {
        fanout::send_numeric(ctx.reg, sender, &server_name, Response::RPL_INFO, |m| {
            m.trailing(line)
        });
    }
    fanout::send_numeric(
        ctx.reg,
        sender,
        &server_name,
        Response::RPL_ENDOFINFO,
        |m| m.trailing("End of INFO list"),
    );
}

/// VERSION - also available before registration.
pub fn version(ctx: &mut Ctx<'_>, sender: ClientId) {
    let server_name = ctx.srv.info.name.clone();
    fanout::send_numeric(ctx.reg, sender, &server_name, Response::RPL_VERSION, |m| {
        m.arg(format!("{VERSION_ID}."))
            .arg(server_name.clone())
            .trailing(PRODUCT_NAME)
    });
}
