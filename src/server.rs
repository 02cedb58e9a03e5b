//! The composition root: server identity, the credential vault, the locked
//! registry, and the dispatch/effect machinery that every session and bot
//! funnels through.
//!
//! Concurrency discipline: the registry mutex is held for the whole of
//! "decode one frame, run its handler, enqueue all fan-outs", and handlers
//! never suspend, so no client can observe a half-finished command. Service
//! callbacks run inside the same critical section but only read; the
//! effects they return are applied by [`Server::drain`] right after the
//! delivery that produced them.

use chrono::Local;
use parking_lot::Mutex;
use roster_proto::Message;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info};

use crate::auth::PassTable;
use crate::config::{Config, ConfigError};
use crate::handlers::{self, channel, fanout, Ctx};
use crate::network::session::{SessionTimer, TimerPhase, PING_TIMEOUT, REGISTRATION_TIMEOUT};
use crate::services::{ChanServ, Effect, LogBot, NickServ, VirtualClient, VoteBot};
use crate::state::{Channel, ClientId, Registry};

/// Product name used in INFO and VERSION replies.
pub const PRODUCT_NAME: &str = "Roster IRC Daemon";

/// Version identifier used in numeric replies.
pub const VERSION_ID: &str = concat!("rosterd-", env!("CARGO_PKG_VERSION"));

/// Immutable server identity shared with the handlers.
pub struct ServerInfo {
    /// The configured server name, used as the numeric-reply prefix.
    pub name: String,
    /// Human-readable startup timestamp for RPL_CREATED and INFO.
    pub started: String,
    /// MOTD lines.
    pub motd: Vec<String>,
}

pub struct Server {
    pub info: ServerInfo,
    /// Reserved-nickname digest table.
    pub vault: Arc<PassTable>,
    pub registry: Mutex<Registry>,
    /// Fan-in signal for graceful shutdown.
    pub shutdown: broadcast::Sender<()>,
    next_id: AtomicU64,
    chanserv_id: OnceLock<ClientId>,
}

impl Server {
    /// Build the server state from a validated configuration: channels,
    /// credential vault, and the virtual clients with their initial joins.
    pub fn new(config: &Config) -> Result<Arc<Server>, ConfigError> {
        let vault = Arc::new(config.passhash_table()?);

        let mut channels = HashMap::new();
        for (name, channel_config) in &config.channels {
            let allowed: HashSet<String> = channel_config
                .users
                .iter()
                .map(|nick| nick.to_ascii_lowercase())
                .collect();
            let channel = Channel::new(
                name,
                &channel_config.topic,
                allowed,
                channel_config.allow_observers,
            );
            channels.insert(channel.name_lc.clone(), channel);
        }

        let (shutdown, _) = broadcast::channel(1);
        let server = Arc::new(Server {
            info: ServerInfo {
                name: config.server.name.clone(),
                started: Local::now().format("%a %b %e %H:%M:%S %Y").to_string(),
                motd: config.motd.clone(),
            },
            vault,
            registry: Mutex::new(Registry::new(channels)),
            shutdown,
            next_id: AtomicU64::new(1),
            chanserv_id: OnceLock::new(),
        });

        server.register_services(config)?;
        Ok(server)
    }

    /// Create and register the virtual clients, then let each join its
    /// channels through the regular JOIN handler.
    fn register_services(self: &Arc<Self>, config: &Config) -> Result<(), ConfigError> {
        let mut reg = self.registry.lock();
        let mut joins: Vec<(ClientId, String)> = Vec::new();

        let chanserv_id = self.alloc_id();
        let _ = self.chanserv_id.set(chanserv_id);
        reg.register_virtual(chanserv_id, Arc::new(ChanServ));
        // ChanServ sits in every channel.
        let mut all_channels: Vec<String> = reg.channels.values().map(|c| c.name.clone()).collect();
        all_channels.sort();
        joins.extend(all_channels.into_iter().map(|name| (chanserv_id, name)));
        info!("ChanServ is enabled");

        let nickserv_id = self.alloc_id();
        reg.register_virtual(nickserv_id, Arc::new(NickServ::new(Arc::clone(&self.vault))));
        info!("NickServ is enabled");

        match &config.logbot {
            Some(logbot_config) => {
                let logbot = LogBot::new(logbot_config)?;
                let logbot_id = self.alloc_id();
                joins.extend(
                    logbot
                        .channel_keys()
                        .into_iter()
                        .map(|key| (logbot_id, key)),
                );
                reg.register_virtual(logbot_id, Arc::new(logbot));
                info!("LogBot is enabled");
            }
            None => info!("LogBot is disabled, because it is not configured"),
        }

        if config.votebots.is_empty() {
            info!("All VoteBots are disabled");
        }
        for votebot_config in &config.votebots {
            let votebot = VoteBot::new(votebot_config, &reg)?;
            let votebot_id = self.alloc_id();
            joins.push((votebot_id, votebot.channel_display().to_string()));
            reg.register_virtual(votebot_id, Arc::new(votebot));
            info!(nick = %votebot_config.nick, "VoteBot is enabled");
        }

        let mut fx = VecDeque::new();
        for (id, channel_name) in joins {
            let mut ctx = Ctx {
                srv: self.as_ref(),
                reg: &mut reg,
                fx: &mut fx,
            };
            channel::join(&mut ctx, id, &[channel_name]);
        }
        self.drain(&mut reg, fx);

        Ok(())
    }

    /// ChanServ's client id. Set during startup, before any session exists.
    pub fn chanserv_id(&self) -> ClientId {
        self.chanserv_id.get().copied().unwrap_or_default()
    }

    fn alloc_id(&self) -> ClientId {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Register a freshly accepted (and TLS-handshaken) connection.
    pub fn attach_session(
        &self,
        tx: mpsc::UnboundedSender<Arc<String>>,
        timer: Arc<SessionTimer>,
    ) -> ClientId {
        let id = self.alloc_id();
        self.registry.lock().attach_network(id, tx, timer);
        id
    }

    /// Decode-one-frame entry point: run the handler and everything it
    /// entails under one hold of the registry lock. Returns whether the
    /// client still exists afterwards.
    pub fn handle_message(self: &Arc<Self>, sender: ClientId, msg: Message) -> bool {
        let mut reg = self.registry.lock();
        if !reg.clients.contains_key(&sender) {
            return false;
        }
        debug!(sender, command = %msg.command, "Dispatching");

        let mut fx = VecDeque::new();
        let mut ctx = Ctx {
            srv: self.as_ref(),
            reg: &mut reg,
            fx: &mut fx,
        };
        handlers::dispatch(&mut ctx, sender, msg);
        self.drain(&mut reg, fx);

        reg.clients.contains_key(&sender)
    }

    /// A session's deadline fired. Consult the timer phase under the lock;
    /// a firing that raced a re-arm observes the new deadline and stands
    /// down. Returns whether the client still exists afterwards.
    pub fn handle_deadline(self: &Arc<Self>, id: ClientId) -> bool {
        let mut reg = self.registry.lock();

        let Some(handle) = reg.client(id).and_then(|c| c.network_handle()) else {
            return false;
        };
        let (phase, deadline) = handle.timer.snapshot();
        if tokio::time::Instant::now() < deadline {
            return true;
        }

        let mut fx = VecDeque::new();
        match phase {
            TimerPhase::AwaitRegistration => {
                fanout::disconnect(
                    &mut reg,
                    &mut fx,
                    id,
                    &format!("Nick timeout: {} seconds", REGISTRATION_TIMEOUT),
                );
            }
            TimerPhase::AwaitIdentify => {
                fanout::disconnect(
                    &mut reg,
                    &mut fx,
                    id,
                    &format!("Identify timeout: {} seconds", crate::network::session::IDENTIFY_TIMEOUT),
                );
            }
            TimerPhase::Idle => {
                // Time to check whether the client is still alive.
                let ping = Message::new("PING").arg(self.info.name.clone());
                fanout::push_message(&reg, id, &ping);
                if let Some(handle) = reg.client(id).and_then(|c| c.network_handle()) {
                    handle.timer.arm(TimerPhase::AwaitPong);
                }
            }
            TimerPhase::AwaitPong => {
                fanout::disconnect(
                    &mut reg,
                    &mut fx,
                    id,
                    &format!("Ping timeout: {} seconds", PING_TIMEOUT),
                );
            }
        }
        self.drain(&mut reg, fx);

        reg.clients.contains_key(&id)
    }

    /// Disconnect a session for a session-fatal reason (framing violation,
    /// socket error, EOF, shutdown). Idempotent.
    pub fn drop_session(self: &Arc<Self>, id: ClientId, reason: &str) {
        let mut reg = self.registry.lock();
        let mut fx = VecDeque::new();
        fanout::disconnect(&mut reg, &mut fx, id, reason);
        self.drain(&mut reg, fx);
    }

    /// A scheduled bot deadline fired; re-enter the bot's timer callback.
    pub fn bot_timer(self: &Arc<Self>, bot: ClientId, token: u64) {
        let mut reg = self.registry.lock();
        let Some(service) = reg.client(bot).and_then(|c| c.virtual_service()).cloned() else {
            return;
        };
        let mut fx = VecDeque::new();
        fx.extend(
            service
                .on_timer(token, &reg)
                .into_iter()
                .map(|effect| (bot, effect)),
        );
        self.drain(&mut reg, fx);
    }

    /// Apply queued service effects until none are left. Effects may fan
    /// out to further virtual clients, whose callbacks may queue more
    /// effects; everything settles within the same critical section.
    fn drain(self: &Arc<Self>, reg: &mut Registry, mut fx: VecDeque<(ClientId, Effect)>) {
        while let Some((origin, effect)) = fx.pop_front() {
            self.apply_effect(reg, &mut fx, origin, effect);
        }
    }

    fn apply_effect(
        self: &Arc<Self>,
        reg: &mut Registry,
        fx: &mut VecDeque<(ClientId, Effect)>,
        origin: ClientId,
        effect: Effect,
    ) {
        match effect {
            Effect::Notice { target, text } => {
                fanout::send_notice(reg, fx, &self.info.name, Some(origin), target, &text);
            }

            Effect::Privmsg { target, text } => {
                fanout::send_private_message(reg, fx, origin, target, &text);
            }

            Effect::ChannelMsg { channel, text } => {
                // Route through the regular PRIVMSG machinery with the bot
                // as the sender; refusal numerics aimed at it are dropped.
                let mut ctx = Ctx {
                    srv: self.as_ref(),
                    reg,
                    fx,
                };
                crate::handlers::messaging::privmsg(
                    &mut ctx,
                    origin,
                    &[format!("#{channel}"), text],
                );
            }

            Effect::Identify { target } => {
                if let Some(client) = reg.client_mut(target) {
                    client.state.identified = true;
                    // Identification also ends the identify deadline.
                    if let Some(handle) = client.network_handle() {
                        handle.timer.arm(TimerPhase::Idle);
                    }
                    info!(target, nick = %client.nickname, "Client identified");
                }
            }

            Effect::Disconnect { target, reason } => {
                fanout::disconnect(reg, fx, target, &reason);
            }

            Effect::Schedule { token, delay } => {
                let server = Arc::clone(self);
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    server.bot_timer(origin, token);
                });
            }
        }
    }
}
