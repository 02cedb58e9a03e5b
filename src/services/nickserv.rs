//! NickServ: identification against the reserved-nickname table and
//! session reclaim (GHOST).

use std::sync::Arc;

use crate::auth::{PassTable, VerifyOutcome};
use crate::services::{Effect, VirtualClient};
use crate::state::{ClientId, Registry};

pub struct NickServ {
    vault: Arc<PassTable>,
}

impl NickServ {
    pub fn new(vault: Arc<PassTable>) -> NickServ {
        NickServ { vault }
    }

    /// Check a password for a nickname; on failure, the returned effects
    /// are the explanatory notices for the requester.
    fn verify_credentials(
        &self,
        requester: ClientId,
        nick_lc: &str,
        password: &str,
    ) -> Result<(), Vec<Effect>> {
        match self.vault.verify(nick_lc, password) {
            VerifyOutcome::Ok => Ok(()),
            VerifyOutcome::UnknownNick => Err(vec![Effect::notice(
                requester,
                "No password is known for this nickname!",
            )]),
            VerifyOutcome::BadPassword => Err(vec![
                Effect::notice(requester, "Invalid password!"),
                Effect::notice(
                    requester,
                    "Ensure that your password is spelled correctly (it is case-sensitive).",
                ),
            ]),
        }
    }

    fn identify(&self, sender: ClientId, params: &[&str], reg: &Registry) -> Vec<Effect> {
        let Some(client) = reg.client(sender) else {
            return Vec::new();
        };
        if client.state.identified {
            return vec![Effect::notice(sender, "You are already identified!")];
        }
        if params.is_empty() {
            return vec![Effect::notice(
                sender,
                "You need to specify your password as the first parameter!",
            )];
        }

        // Also support the two-parameter `IDENTIFY <nickname> <password>`
        // form; the first parameter is ignored, since one can only identify
        // for the current nickname.
        let password = if params.len() == 1 {
            params[0]
        } else {
            params[1]
        };
        if let Err(notices) = self.verify_credentials(sender, &client.nickname_lc, password) {
            return notices;
        }

        vec![
            Effect::Identify { target: sender },
            Effect::notice(sender, "You have successfully identified!"),
        ]
    }

    fn ghost(&self, sender: ClientId, params: &[&str], reg: &Registry) -> Vec<Effect> {
        if params.len() != 2 {
            return vec![Effect::notice(
                sender,
                "You need to supply the nickname and its password!",
            )];
        }

        let nick_lc = params[0].to_ascii_lowercase();
        let Some(victim_id) = reg.by_nick(&nick_lc) else {
            return vec![Effect::notice(sender, "This nickname is not online!")];
        };

        let ghostable = reg
            .client(victim_id)
            .map(|victim| victim.is_network() && victim_id != sender)
            .unwrap_or(false);
        if !ghostable {
            return vec![Effect::notice(sender, "You cannot ghost this nickname!")];
        }

        if let Err(notices) = self.verify_credentials(sender, &nick_lc, params[1]) {
            return notices;
        }

        vec![
            Effect::Disconnect {
                target: victim_id,
                reason: "Disconnected by GHOST command".to_string(),
            },
            Effect::notice(sender, "The nickname has been ghosted!"),
        ]
    }

    fn help(&self, sender: ClientId, params: &[&str]) -> Vec<Effect> {
        let lines: &[&str] = match params.first().map(|p| p.to_ascii_uppercase()) {
            None => &[
                "***** NickServ Help *****",
                "General Help:",
                "",
                "NickServ allows you to identify with your nickname using the given password.",
                "You cannot join a channel before having identified!",
                "",
                "For more information about a command, type:",
                "/NS HELP <command>",
                "",
                "This NickServ supports the following commands:",
                "GHOST       Reclaims a used nickname.",
                "IDENTIFY    Identifies using a password.",
                "***** End of Help *****",
            ],
            Some(command) if command == "GHOST" => &[
                "***** NickServ Help *****",
                "Help for GHOST:",
                "",
                "GHOST reclaims a lost nickname by disconnecting its session.",
                "This can be useful if you were unexpectedly disconnected or",
                "someone else is using your nickname.",
                "",
                "Syntax: GHOST <nickname> <password>",
                "",
                "Example:",
                "   /NS GHOST Arthur ThisIsMyRandomPassword",
                "***** End of Help *****",
            ],
            Some(command) if command == "IDENTIFY" => &[
                "***** NickServ Help *****",
                "Help for IDENTIFY:",
                "",
                "IDENTIFY identifies you with the IRC Server, so that you can join channels.",
                "If you don't identify, you will be disconnected after 240 seconds.",
                "",
                "Syntax: IDENTIFY <password>",
                "",
                "You can also supply the password as the second parameter.",
                "Note that the first parameter is ignored then as you can only identify for",
                "your current nickname.",
                "",
                "Syntax: IDENTIFY <ignored> <password>",
                "",
                "Example:",
                "   /NS IDENTIFY ThisIsMyRandomPassword",
                "   /NS IDENTIFY BlaBlaBla ThisIsMyRandomPassword",
                "***** End of Help *****",
            ],
            Some(_) => &[],
        };

        lines
            .iter()
            .map(|line| Effect::notice(sender, *line))
            .collect()
    }
}

impl VirtualClient for NickServ {
    fn nickname(&self) -> &str {
        "NickServ"
    }

    fn on_private_message(&self, sender: ClientId, text: &str, reg: &Registry) -> Vec<Effect> {
        // NickServ only talks to network clients.
        let network = reg.client(sender).map(|c| c.is_network()).unwrap_or(false);
        if !network {
            return Vec::new();
        }

        let mut words = text.split(' ').filter(|w| !w.is_empty());
        let command = words.next().unwrap_or("").to_ascii_uppercase();
        let params: Vec<&str> = words.collect();

        match command.as_str() {
            "GHOST" => self.ghost(sender, &params, reg),
            "HELP" => self.help(sender, &params),
            "IDENTIFY" => self.identify(sender, &params, reg),
            _ => vec![Effect::notice(
                sender,
                "Invalid command. Use /NS HELP for a command listing.",
            )],
        }
    }
}
