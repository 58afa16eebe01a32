//! # Bot Module
//!
//! Discord front end for Sonix.
//!
//! This module is deliberately thin. It turns prefix commands into calls on the
//! [`PlaybackManager`] and turns results and [`PlaybackNotice`]s back into embeds.
//! All queueing and playback decisions live in [`crate::audio`].
//!
//! ## Architecture
//!
//! The bot is built around the [`SonixBot`] struct which implements
//! Serenity's [`EventHandler`] trait. It handles:
//!
//! - `message`: parses prefix commands ([`commands`]) and runs them ([`handlers`])
//! - `ready`: starts the notice forwarder ([`events`]) and the maintenance loop
//! - `voice_state_update`: cleans up when the bot is kicked from a voice channel
//! - `guild_delete`: drops the guild's session when the bot leaves the guild
//!
//! ## Example
//!
//! ```rust,no_run
//! # use std::sync::Arc;
//! # use sonix::{audio::PlaybackManager, bot::SonixBot, config::Config};
//! # fn example(manager: Arc<PlaybackManager>) -> anyhow::Result<()> {
//! let config = Config::load()?;
//! let bot = SonixBot::new(config, manager);
//! # Ok(())
//! # }
//! ```

use dashmap::DashMap;
use parking_lot::Mutex;
use serenity::{
    all::{ChannelId, Context, EventHandler, GuildId, Message, Ready, VoiceState},
    async_trait,
    model::guild::{Guild, UnavailableGuild},
};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

pub mod commands;
pub mod events;
pub mod handlers;

use crate::{
    audio::{PlaybackManager, PlaybackNotice},
    config::Config,
    error::PlaybackError,
};
use commands::Command;

/// Main Discord bot handler for Sonix.
pub struct SonixBot {
    /// Bot configuration loaded from environment variables
    config: Arc<Config>,
    /// Registro de sesiones por guild
    manager: Arc<PlaybackManager>,
    /// Último canal de texto donde se usó un comando, por guild
    announce_channels: Arc<DashMap<GuildId, ChannelId>>,
    /// Se toma en el primer `ready`; los reconnects no arrancan otro forwarder
    notices: Mutex<Option<broadcast::Receiver<PlaybackNotice>>>,
}

impl SonixBot {
    pub fn new(config: Config, manager: Arc<PlaybackManager>) -> Self {
        // Subscribe now so notices sent before `ready` are not lost
        let notices = manager.subscribe();

        Self {
            config: Arc::new(config),
            manager,
            announce_channels: Arc::new(DashMap::new()),
            notices: Mutex::new(Some(notices)),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn manager(&self) -> &PlaybackManager {
        &self.manager
    }

    /// The bot left a voice channel without being asked to.
    async fn on_kicked_from_voice(&self, guild_id: GuildId) {
        if !self.manager.view(guild_id).connected {
            return;
        }

        info!("🔌 Bot desconectado en guild {}", guild_id);
        match self.manager.stop(guild_id).await {
            Ok(_) => {}
            Err(PlaybackError::NotConnected) => {
                // El driver ya no tiene conexión; se descarta la sesión entera
                self.manager.remove_guild(guild_id);
            }
            Err(e) => error!("Error al detener reproducción: {:?}", e),
        }
    }
}

#[async_trait]
impl EventHandler for SonixBot {
    async fn ready(&self, ctx: Context, ready: Ready) {
        info!("🤖 {} está en línea!", ready.user.name);
        info!("📊 Conectado a {} servidores", ready.guilds.len());

        let notices = self.notices.lock().take();
        if let Some(notices) = notices {
            tokio::spawn(events::forward_notices(
                ctx.http.clone(),
                notices,
                self.announce_channels.clone(),
                self.config.idle_disconnect_after,
            ));

            let manager = self.manager.clone();
            tokio::spawn(async move {
                maintenance_tasks(manager).await;
            });
        }
    }

    async fn message(&self, ctx: Context, msg: Message) {
        if msg.author.bot {
            return;
        }
        let Some(guild_id) = msg.guild_id else {
            return;
        };
        let Some(command) = Command::parse(&self.config.command_prefix, &msg.content) else {
            return;
        };

        self.announce_channels.insert(guild_id, msg.channel_id);

        if let Err(e) = handlers::handle_command(&ctx, &msg, self, command).await {
            error!("Error manejando comando: {:?}", e);
        }
    }

    async fn voice_state_update(&self, ctx: Context, old: Option<VoiceState>, new: VoiceState) {
        // Detectar si el bot fue desconectado
        let current_user_id = ctx.cache.current_user().id;
        if new.user_id != current_user_id || old.is_none() || new.channel_id.is_some() {
            return;
        }

        if let Some(guild_id) = new.guild_id {
            self.on_kicked_from_voice(guild_id).await;
        }
    }

    async fn guild_delete(&self, _ctx: Context, incomplete: UnavailableGuild, _full: Option<Guild>) {
        if incomplete.unavailable {
            // Caída de Discord, no una expulsión
            warn!("⚠️ Guild {} no disponible temporalmente", incomplete.id);
            return;
        }

        self.announce_channels.remove(&incomplete.id);
        if self.manager.remove_guild(incomplete.id) {
            info!("👋 Bot retirado de guild {}", incomplete.id);
        }
    }
}

/// Runs periodic housekeeping in the background.
///
/// Every hour: logs cache usage and the number of live guild sessions.
async fn maintenance_tasks(manager: Arc<PlaybackManager>) {
    let mut interval = tokio::time::interval(tokio::time::Duration::from_secs(3600)); // Cada hora
    interval.tick().await;

    loop {
        interval.tick().await;

        manager.pool().cache().log_summary();
        debug!("🎧 {} sesiones de guild activas", manager.active_guilds());

        info!("🧹 Tareas de mantenimiento completadas");
    }
}
