use anyhow::Result;
use serenity::{
    builder::{CreateEmbed, CreateMessage},
    model::{
        channel::Message,
        id::{ChannelId, GuildId, UserId},
    },
    prelude::Context,
};
use tracing::{info, warn};

use super::{commands::Command, SonixBot};
use crate::{
    audio::CommandOutcome,
    error::{PlaybackError, PlaybackResult},
    ui::embeds,
};

/// Ejecuta un comando de texto y responde en el mismo canal
pub async fn handle_command(
    ctx: &Context,
    msg: &Message,
    bot: &SonixBot,
    command: Command,
) -> Result<()> {
    let guild_id = msg
        .guild_id
        .ok_or_else(|| anyhow::anyhow!("Comando usado fuera de un servidor"))?;

    info!(
        "📝 Comando {} usado por {} en guild {}",
        command.name(),
        msg.author.name,
        guild_id
    );

    let manager = bot.manager();
    let embed = match command {
        Command::Play(query) => handle_play(ctx, msg, bot, guild_id, &query).await,
        Command::Join => match user_voice_channel(ctx, guild_id, msg.author.id) {
            Ok(channel_id) => outcome_embed(manager.connect(guild_id, channel_id).await),
            Err(embed) => embed,
        },
        Command::Pause => outcome_embed(manager.pause(guild_id).await),
        Command::Resume => outcome_embed(manager.resume(guild_id).await),
        Command::Skip => outcome_embed(manager.skip(guild_id).await),
        Command::Replay => outcome_embed(manager.replay(guild_id).await),
        Command::Stop => outcome_embed(manager.stop(guild_id).await),
        Command::Queue { page } => embeds::create_queue_embed(&manager.view(guild_id), page),
        Command::NowPlaying => match manager.now_playing(guild_id) {
            Some(track) => embeds::create_now_playing_embed(&track),
            None if manager.view(guild_id).filler_playing => embeds::create_info_embed(
                "Modo relleno",
                "📻 No hay canciones en cola, sonando audio de fondo",
            ),
            None => embeds::create_info_embed("Nada sonando", "😴 No hay nada reproduciéndose"),
        },
        Command::Fallback(Some(enabled)) => {
            outcome_embed(manager.set_fallback_enabled(guild_id, enabled).await)
        }
        Command::Fallback(None) => {
            let enabled = manager.view(guild_id).fallback_enabled;
            embeds::create_info_embed(
                "Audio de relleno",
                &format!(
                    "Actualmente **{}**. Usa `{}fallback on|off` para cambiarlo",
                    if enabled { "activado" } else { "desactivado" },
                    bot.config().command_prefix
                ),
            )
        }
        Command::Help => embeds::create_help_embed(&bot.config().command_prefix),
    };

    msg.channel_id
        .send_message(&ctx.http, CreateMessage::new().embed(embed))
        .await?;

    Ok(())
}

async fn handle_play(
    ctx: &Context,
    msg: &Message,
    bot: &SonixBot,
    guild_id: GuildId,
    query: &str,
) -> CreateEmbed {
    if query.trim().is_empty() {
        return embeds::create_error_embed(
            "Falta la canción",
            &format!("Uso: `{}play <canción|enlace>`", bot.config().command_prefix),
        );
    }

    let manager = bot.manager();

    // Conectar al canal de voz si no está conectado
    if !manager.view(guild_id).connected {
        let channel_id = match user_voice_channel(ctx, guild_id, msg.author.id) {
            Ok(channel_id) => channel_id,
            Err(embed) => return embed,
        };
        if let Err(e) = manager.connect(guild_id, channel_id).await {
            return outcome_embed(Err(e));
        }
    }

    // Las playlists de Spotify pueden tardar
    if let Err(e) = msg.channel_id.broadcast_typing(&ctx.http).await {
        warn!("No se pudo enviar typing en guild {}: {:?}", guild_id, e);
    }

    outcome_embed(manager.enqueue(guild_id, query).await)
}

/// Canal de voz del autor según la caché de serenity
fn user_voice_channel(
    ctx: &Context,
    guild_id: GuildId,
    user_id: UserId,
) -> Result<ChannelId, CreateEmbed> {
    let guild = guild_id.to_guild_cached(&ctx.cache).ok_or_else(|| {
        embeds::create_error_embed("Servidor no disponible", "Guild no encontrada en caché")
    })?;

    guild
        .voice_states
        .get(&user_id)
        .and_then(|voice_state| voice_state.channel_id)
        .ok_or_else(|| {
            embeds::create_error_embed("Sin canal de voz", "Debes estar en un canal de voz")
        })
}

/// Respuesta para el resultado de una operación del núcleo
pub fn outcome_embed(result: PlaybackResult<CommandOutcome>) -> CreateEmbed {
    match result {
        Ok(CommandOutcome::Connected) => {
            embeds::create_success_embed("Conectado", "🔊 Listo para reproducir")
        }
        Ok(CommandOutcome::Enqueued {
            title,
            position,
            starting,
        }) => embeds::create_track_added_embed(&title, position, starting),
        Ok(CommandOutcome::EnqueuedMany { added, requested }) => {
            embeds::create_playlist_added_embed(added, requested)
        }
        Ok(CommandOutcome::Advanced) => {
            embeds::create_info_embed("Avanzando", "⏭️ Pasando a la siguiente canción")
        }
        Ok(CommandOutcome::Skipped) => {
            embeds::create_success_embed("Canción saltada", "⏭️ Pasando a la siguiente canción")
        }
        Ok(CommandOutcome::SkipAlreadyPending) => embeds::create_info_embed(
            "Ya se está saltando",
            "⏳ La siguiente canción está en camino",
        ),
        Ok(CommandOutcome::Paused) => {
            embeds::create_success_embed("Pausado", "⏸️ Reproducción pausada")
        }
        Ok(CommandOutcome::Resumed) => {
            embeds::create_success_embed("Reanudado", "▶️ Reproducción reanudada")
        }
        Ok(CommandOutcome::Stopped) => embeds::create_success_embed(
            "Detenido",
            "⏹️ Cola limpiada y desconectado del canal de voz",
        ),
        Ok(CommandOutcome::Replaying { title, starting }) => embeds::create_success_embed(
            "Repetir",
            &if starting {
                format!("🔁 Volviendo a reproducir **{}**", title)
            } else {
                format!("🔁 **{}** sonará a continuación", title)
            },
        ),
        Ok(CommandOutcome::FallbackSet(enabled)) => embeds::create_success_embed(
            "Audio de relleno",
            if enabled {
                "📻 Activado: sonará audio de fondo cuando la cola esté vacía"
            } else {
                "🔇 Desactivado: me desconectaré tras un rato sin música"
            },
        ),
        Err(error) => embeds::create_error_embed(error_title(&error), &embeds::error_message(&error)),
    }
}

fn error_title(error: &PlaybackError) -> &'static str {
    match error {
        PlaybackError::QueueFull { .. } => "Cola llena",
        PlaybackError::NotConnected | PlaybackError::ConnectFailed(_) => "Sin conexión de voz",
        PlaybackError::ExpansionFailed(_) => "Playlist no disponible",
        PlaybackError::FallbackUnavailable => "Relleno no disponible",
        _ => "No se pudo completar",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn json(embed: CreateEmbed) -> serde_json::Value {
        serde_json::to_value(embed).unwrap()
    }

    #[test]
    fn enqueue_outcome_shows_the_position() {
        let embed = json(outcome_embed(Ok(CommandOutcome::Enqueued {
            title: "Lofi Beats".into(),
            position: 3,
            starting: false,
        })));

        assert!(embed["description"].as_str().unwrap().contains("Lofi Beats"));
        assert_eq!(embed["fields"][0]["value"], "3");
    }

    #[test]
    fn errors_become_error_embeds() {
        let embed = json(outcome_embed(Err(PlaybackError::QueueFull { max: 1000 })));

        assert_eq!(embed["title"], "❌ Cola llena");
        assert!(embed["description"].as_str().unwrap().contains("1000"));
    }

    #[test]
    fn partial_playlists_report_what_was_left_out() {
        let embed = json(outcome_embed(Ok(CommandOutcome::EnqueuedMany {
            added: 8,
            requested: 10,
        })));

        assert_eq!(embed["fields"][1]["value"], "2");
    }
}
