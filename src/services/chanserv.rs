//! ChanServ: sits in every channel and publicly announces the voice
//! status of members as they join.

use roster_proto::Message;

use crate::handlers::{fanout, Ctx};
use crate::services::VirtualClient;
use crate::state::{ClientId, MemberStatus};

/// The (stateless) ChanServ service.
pub struct ChanServ;

impl VirtualClient for ChanServ {
    fn nickname(&self) -> &str {
        "ChanServ"
    }
}

impl ChanServ {
    /// Publish a freshly joined member's voice grant as a `MODE +v`
    /// broadcast to the whole channel.
    ///
    /// The JOIN handler calls this directly after its own broadcast:
    /// ChanServ cannot just watch the fan-out, because the mode line must
    /// reach every member strictly after all of them saw the JOIN.
    pub fn publish_member_status(ctx: &mut Ctx<'_>, channel_key: &str, member: ClientId) {
        let Some(channel) = ctx.reg.channels.get(channel_key) else {
            return;
        };
        if channel.status_of(member) != Some(MemberStatus::Voice) {
            return;
        }
        let display = channel.name.clone();

        let Some(member_nick) = ctx.reg.client(member).map(|c| c.nickname.clone()) else {
            return;
        };
        let Some(chanserv) = ctx.reg.client(ctx.srv.chanserv_id()) else {
            return;
        };

        let mode = Message::new("MODE")
            .with_prefix(chanserv.prefix())
            .arg(format!("#{display}"))
            .arg("+v")
            .arg(member_nick);
        fanout::broadcast_to_channel(ctx.reg, ctx.fx, channel_key, &mode, None);
    }
}
