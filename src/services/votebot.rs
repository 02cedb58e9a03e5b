//! VoteBot: lets the members of one channel vote on a question by private
//! ballot.
//!
//! An administrator prepares a vote in a private conversation (NEW, then
//! the question, then the options, then START). At START every network
//! client present in the channel gets a ballot by private message,
//! preselected to the abstention option. The vote ends when everyone has
//! voted, when the time limit fires, or when an administrator cancels it;
//! members who leave the channel mid-vote are struck from the ballot list.

use parking_lot::Mutex;
use roster_proto::{Message, Prefix};
use std::collections::{HashMap, HashSet};
use std::time::Duration;

use crate::config::{ConfigError, VoteBotConfig};
use crate::services::{Effect, VirtualClient};
use crate::state::{ClientId, Registry};

#[derive(Clone, Copy, Default)]
struct Ballot {
    option: usize,
    has_voted: bool,
}

#[derive(Default)]
struct VoteState {
    /// The administrator currently holding the bot; empty means idle.
    current_admin: String,
    question: String,
    options: Vec<String>,
    votes: HashMap<ClientId, Ballot>,
    vote_count: usize,
    started: bool,
    /// Bumped on every reset so a pending deadline can tell it is stale.
    generation: u64,
}

pub struct VoteBot {
    nick: String,
    /// Lower-cased administrator nicknames.
    admins: HashSet<String>,
    channel_key: String,
    channel_display: String,
    time_limit_minutes: u64,
    abstention: String,
    state: Mutex<VoteState>,
}

impl VoteBot {
    pub fn new(config: &VoteBotConfig, reg: &Registry) -> Result<VoteBot, ConfigError> {
        let channel_key = config.channel.to_ascii_lowercase();
        let channel_display = reg
            .channels
            .get(&channel_key)
            .map(|channel| channel.name.clone())
            .ok_or_else(|| ConfigError::UnknownBotChannel {
                bot: config.nick.clone(),
                channel: config.channel.clone(),
            })?;

        Ok(VoteBot {
            nick: config.nick.clone(),
            admins: config
                .admins
                .iter()
                .map(|nick| nick.to_ascii_lowercase())
                .collect(),
            channel_key,
            channel_display,
            time_limit_minutes: config.timelimit,
            abstention: config.abstention_translation.clone(),
            state: Mutex::new(VoteState::default()),
        })
    }

    /// Display name of the channel this bot serves.
    pub fn channel_display(&self) -> &str {
        &self.channel_display
    }

    fn to_channel(&self, text: impl Into<String>) -> Effect {
        Effect::ChannelMsg {
            channel: self.channel_display.clone(),
            text: text.into(),
        }
    }

    fn reset(state: &mut VoteState) {
        state.current_admin.clear();
        state.question.clear();
        state.options.clear();
        state.votes.clear();
        state.vote_count = 0;
        state.started = false;
        state.generation += 1;
    }

    /// Publish the results and reset, once every outstanding ballot is in.
    fn check_votes(&self, state: &mut VoteState) -> Vec<Effect> {
        if state.vote_count != state.votes.len() {
            return Vec::new();
        }

        let mut results = vec![0usize; state.options.len()];
        for ballot in state.votes.values() {
            results[ballot.option] += 1;
        }

        let mut effects = Vec::new();
        let mut voters: Vec<ClientId> = state.votes.keys().copied().collect();
        voters.sort_unstable();
        for voter in voters {
            effects.push(Effect::privmsg(
                voter,
                format!(
                    "All votes are in. The results are available in #{}.",
                    self.channel_display
                ),
            ));
        }

        effects.push(self.to_channel("The vote is over. Here are the results!"));
        effects.push(self.to_channel(format!("Question: {}", state.question)));
        effects.push(self.to_channel("Answers:"));
        for (option, count) in state.options.iter().zip(&results) {
            effects.push(self.to_channel(format!("   {} - {} votes", option, count)));
        }
        effects.push(self.to_channel(format!("Total number of votes: {}", state.votes.len())));

        Self::reset(state);
        effects
    }

    fn cancel(&self, state: &mut VoteState, sender: ClientId, sender_nick: &str) -> Vec<Effect> {
        if state.current_admin.is_empty() {
            return vec![Effect::privmsg(sender, "There is nothing to cancel.")];
        }

        let mut effects = Vec::new();
        if state.started {
            // The channel should know when a running vote is thrown away.
            effects.push(self.to_channel(format!(
                "The running vote has been canceled by {}",
                sender_nick
            )));
        }
        Self::reset(state);
        effects.push(Effect::privmsg(sender, "Everything has been reset."));
        effects
    }

    fn help(&self, sender: ClientId) -> Vec<Effect> {
        [
            "***** VoteBot Help *****".to_string(),
            "VoteBot enables all users on a channel to secretly vote on a question.".to_string(),
            format!(
                "This VoteBot is responsible for the channel #{}.",
                self.channel_display
            ),
            String::new(),
            "As an administrator of this VoteBot, you can set up the questions.".to_string(),
            "Just type \"NEW\" and I will ask you about your question and the possible vote options."
                .to_string(),
            format!(
                "The \"{}\" option will automatically be added to the available options.",
                self.abstention
            ),
            String::new(),
            "When you're done, type \"START\" and I will put this question to all channel members in private messages."
                .to_string(),
            format!(
                "They have {} minutes to answer, otherwise their vote will be counted as \"{}\".",
                self.time_limit_minutes, self.abstention
            ),
            String::new(),
            "You can always cancel the question setup and even the running vote by typing \"CANCEL\"."
                .to_string(),
            "***** End of Help *****".to_string(),
        ]
        .into_iter()
        .map(|line| Effect::notice(sender, line))
        .collect()
    }

    fn start(&self, state: &mut VoteState, sender: ClientId, reg: &Registry) -> Vec<Effect> {
        if state.question.is_empty() {
            return vec![Effect::privmsg(
                sender,
                "Please enter a question first. Type \"HELP\" for more information.",
            )];
        }
        // Two options plus the abstention are the minimum.
        if state.options.len() < 3 {
            return vec![Effect::privmsg(
                sender,
                "Please enter at least two voting options. Type \"HELP\" for more information.",
            )];
        }

        // Freeze the electorate: only network clients present right now may
        // vote, each preselected to the abstention option.
        let mut members: Vec<ClientId> = reg
            .channels
            .get(&self.channel_key)
            .map(|channel| channel.members.keys().copied().collect())
            .unwrap_or_default();
        members.sort_unstable();

        let mut effects = Vec::new();
        for member in members {
            let Some(client) = reg.client(member) else {
                continue;
            };
            if !client.is_network() {
                continue;
            }
            state.votes.insert(member, Ballot::default());

            // Ballots go out as private messages rather than notices, which
            // some clients would render into the channel.
            effects.push(Effect::privmsg(
                member,
                format!("{} has set up a vote and I want your opinion.", state.current_admin),
            ));
            effects.push(Effect::privmsg(
                member,
                format!("Question: {}", state.question),
            ));
            effects.push(Effect::privmsg(member, "Possible options:"));
            for (number, option) in state.options.iter().enumerate() {
                effects.push(Effect::privmsg(member, format!("   {} - {}", number, option)));
            }
            effects.push(Effect::privmsg(
                member,
                "Please send me the number of your option.",
            ));
            effects.push(Effect::privmsg(
                member,
                format!(
                    "If you don't answer within {} minutes, your vote will be counted as \"{}\".",
                    self.time_limit_minutes, self.abstention
                ),
            ));
        }

        if state.votes.is_empty() {
            return vec![Effect::privmsg(sender, "The channel has no members.")];
        }

        effects.push(self.to_channel(format!(
            "{} has set up a vote and I'm asking all of you in private messages now.",
            state.current_admin
        )));

        state.started = true;
        effects.push(Effect::Schedule {
            token: state.generation,
            delay: Duration::from_secs(self.time_limit_minutes * 60),
        });
        effects
    }

    fn receive_vote(&self, state: &mut VoteState, sender: ClientId, text: &str) -> Vec<Effect> {
        let Some(ballot) = state.votes.get_mut(&sender) else {
            return vec![Effect::privmsg(
                sender,
                "You're not allowed to participate in this vote.",
            )];
        };

        if text.is_empty() || !text.chars().all(|c| c.is_ascii_digit()) {
            return vec![Effect::privmsg(sender, "Please enter a number.")];
        }
        let number = match text.parse::<usize>() {
            Ok(number) if number < state.options.len() => number,
            _ => {
                return vec![Effect::privmsg(sender, "This number is out of range.")];
            }
        };

        ballot.option = number;
        let changed = ballot.has_voted;
        ballot.has_voted = true;

        let mut effects = Vec::new();
        if changed {
            effects.push(Effect::privmsg(
                sender,
                "Your vote has been changed. You can still change your decision again as long as the others are not yet done.",
            ));
        } else {
            state.vote_count += 1;
            effects.push(Effect::privmsg(
                sender,
                "Your vote has been cast. You can still change your decision as long as the others are not yet done.",
            ));
        }

        effects.extend(self.check_votes(state));
        effects
    }
}

impl VirtualClient for VoteBot {
    fn nickname(&self) -> &str {
        &self.nick
    }

    fn on_private_message(&self, sender: ClientId, text: &str, reg: &Registry) -> Vec<Effect> {
        let Some(client) = reg.client(sender) else {
            return Vec::new();
        };
        if !client.state.identified {
            return vec![Effect::privmsg(sender, "Please identify first!")];
        }
        let sender_nick = client.nickname.clone();
        let is_admin = self.admins.contains(&client.nickname_lc);

        let mut state = self.state.lock();

        if is_admin {
            // VoteBot commands are case-insensitive.
            let command = text.to_ascii_uppercase();

            // CANCEL and HELP work for every administrator.
            match command.as_str() {
                "CANCEL" => return self.cancel(&mut state, sender, &sender_nick),
                "HELP" => return self.help(sender),
                _ => {}
            }

            // Everything else is reserved for the administrator who opened
            // the current setup.
            if !state.current_admin.is_empty() && state.current_admin != sender_nick {
                return vec![
                    Effect::privmsg(
                        sender,
                        format!("This VoteBot is currently being used by {}.", state.current_admin),
                    ),
                    Effect::privmsg(
                        sender,
                        "You have to type \"CANCEL\" if you want to cancel all running actions and use it yourself.",
                    ),
                ];
            }

            match command.as_str() {
                "NEW" => {
                    if state.started {
                        return vec![Effect::privmsg(
                            sender,
                            "A vote is already running. You have to cancel it first if you want to prepare a new one.",
                        )];
                    }
                    if !state.question.is_empty() {
                        return vec![Effect::privmsg(
                            sender,
                            "A vote is currently being prepared. You have to cancel it first if you want to prepare a new one.",
                        )];
                    }
                    state.options.push(self.abstention.clone());
                    // Holding the bot also means we now await the question.
                    state.current_admin = sender_nick;
                    return vec![Effect::privmsg(
                        sender,
                        format!(
                            "Please enter the question you want to vote on in #{}.",
                            self.channel_display
                        ),
                    )];
                }
                "START" => return self.start(&mut state, sender, reg),
                _ => {}
            }

            if !state.started {
                if state.question.is_empty() && !state.current_admin.is_empty() {
                    state.question = text.to_string();
                    return vec![Effect::privmsg(
                        sender,
                        format!(
                            "Please enter a vote option now. The \"{}\" option will automatically be added to the available options.",
                            self.abstention
                        ),
                    )];
                } else if !state.question.is_empty() {
                    state.options.push(text.to_string());
                    return vec![Effect::privmsg(
                        sender,
                        "This option has been added. Enter another one or \"START\" to start the vote.",
                    )];
                } else {
                    return vec![Effect::privmsg(
                        sender,
                        "Invalid command. Type \"HELP\" for more information.",
                    )];
                }
            }
        }

        if state.started {
            self.receive_vote(&mut state, sender, text)
        } else {
            vec![Effect::privmsg(
                sender,
                format!(
                    "I'm VoteBot for #{}, and you're not my administrator :-P",
                    self.channel_display
                ),
            )]
        }
    }

    fn on_broadcast(&self, msg: &Message, reg: &Registry) -> Vec<Effect> {
        // Anyone leaving mid-vote is struck from the ballot list. The bot
        // only ever joins its own channel, so every PART it observes is a
        // departure from there.
        if msg.command != "PART" && msg.command != "QUIT" {
            return Vec::new();
        }
        let Some(Prefix::Nickname(_, nick_lc, _)) = &msg.prefix else {
            return Vec::new();
        };

        let mut state = self.state.lock();
        if !state.started {
            return Vec::new();
        }

        let Some(leaver) = reg.by_nick(nick_lc) else {
            return Vec::new();
        };
        if let Some(ballot) = state.votes.remove(&leaver) {
            if ballot.has_voted {
                state.vote_count -= 1;
            }
            return self.check_votes(&mut state);
        }
        Vec::new()
    }

    fn on_timer(&self, token: u64, _reg: &Registry) -> Vec<Effect> {
        let mut state = self.state.lock();
        // A stale deadline from before a cancel or an earlier vote.
        if !state.started || token != state.generation {
            return Vec::new();
        }

        // The deadline expired; outstanding ballots count as cast.
        state.vote_count = state.votes.len();
        self.check_votes(&mut state)
    }
}
