use serenity::{
    all::Timestamp,
    builder::{CreateEmbed, CreateEmbedFooter},
};
use std::time::Duration;

use crate::{
    audio::{PlaybackNotice, PlayerState, SessionView, Track},
    error::PlaybackError,
};

/// Paleta de colores estandarizada para el bot
pub mod colors {
    use serenity::all::Colour;

    pub const SUCCESS_GREEN: Colour = Colour::from_rgb(67, 181, 129);
    pub const ERROR_RED: Colour = Colour::from_rgb(220, 53, 69);
    pub const WARNING_ORANGE: Colour = Colour::from_rgb(255, 193, 7);
    pub const INFO_BLUE: Colour = Colour::from_rgb(52, 144, 220);
    pub const MUSIC_PURPLE: Colour = Colour::from_rgb(138, 43, 226);
    pub const NEUTRAL_GRAY: Colour = Colour::from_rgb(108, 117, 125);
}

/// Footer estandarizado para todos los embeds
const STANDARD_FOOTER: &str = "🎵 Sonix";

/// Canciones por página en `queue`
pub const QUEUE_PAGE_SIZE: usize = 10;

fn source_label(track: &Track) -> &'static str {
    match track.metadata() {
        Some(meta) if meta.is_youtube_music() => "YouTube Music",
        Some(_) if track.is_search_term => "Búsqueda en YouTube",
        Some(_) => "Enlace directo",
        None => "Pendiente",
    }
}

/// Crea un embed para mostrar la canción actual
pub fn create_now_playing_embed(track: &Track) -> CreateEmbed {
    let mut embed = CreateEmbed::default()
        .title("🎵 Reproduciendo Ahora")
        .description(format!("**{}**", track.title()))
        .color(colors::SUCCESS_GREEN)
        .field("🔗 Fuente", source_label(track), true);

    if track.is_search_term {
        embed = embed.field("🔍 Búsqueda", format!("`{}`", track.source_query), true);
    }

    if let Some(meta) = track.metadata() {
        embed = embed.url(&meta.webpage_url);
        if let Some(thumbnail) = &meta.thumbnail {
            embed = embed.thumbnail(thumbnail);
        }
    }

    embed
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Crea un embed para mostrar que se agregó una canción
pub fn create_track_added_embed(title: &str, position: usize, starting: bool) -> CreateEmbed {
    let footer = if starting {
        "🎵 Comenzando reproducción..."
    } else {
        "🎵 Se reproducirá automáticamente cuando le toque"
    };

    CreateEmbed::default()
        .title("✅ Canción Agregada")
        .description(format!("**{}** se ha agregado a la cola de reproducción", title))
        .color(colors::SUCCESS_GREEN)
        .field("📍 Posición", position.to_string(), true)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(footer))
}

/// Crea un embed para mostrar que una playlist fue agregada
pub fn create_playlist_added_embed(added: usize, requested: usize) -> CreateEmbed {
    let description = if added == 1 {
        "Se agregó **1 canción** de la playlist a la cola de reproducción".to_string()
    } else {
        format!(
            "Se agregaron **{} canciones** de la playlist a la cola de reproducción",
            added
        )
    };

    let mut embed = CreateEmbed::default()
        .title("📋 Playlist Agregada")
        .description(description)
        .color(colors::MUSIC_PURPLE)
        .field("📊 Canciones agregadas", added.to_string(), true);

    if added < requested {
        embed = embed
            .field("⚠️ Omitidas", (requested - added).to_string(), true)
            .color(colors::WARNING_ORANGE);
    }

    embed
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(
            "🎵 Las canciones se buscan justo antes de sonar",
        ))
}

/// Crea un embed para mostrar la cola de reproducción
pub fn create_queue_embed(view: &SessionView, page: usize) -> CreateEmbed {
    let queue_page = view.queue.page(page, QUEUE_PAGE_SIZE);

    let mut embed = CreateEmbed::default()
        .title("📋 Cola de Reproducción")
        .color(colors::INFO_BLUE);

    // Canción actual
    if let Some(current) = &view.now_playing {
        let status = if view.state == PlayerState::Paused {
            "⏸️"
        } else {
            "▶️"
        };
        embed = embed.field(
            format!("{} Reproduciendo", status),
            format!("**{}**", current.title()),
            false,
        );
    } else if view.filler_playing {
        embed = embed.field("📻 Modo relleno", "Sonando audio de fondo", false);
    }

    if queue_page.total_items == 0 {
        return embed
            .description("😴 **La cola está vacía**\n\n💡 Usa `play <canción>` para agregar música")
            .color(colors::NEUTRAL_GRAY)
            .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
            .timestamp(Timestamp::now());
    }

    // Próximas canciones
    let listing: String = queue_page
        .items
        .iter()
        .enumerate()
        .map(|(i, item)| format!("**{}**. {}\n", queue_page.first_position + i, item.title()))
        .collect();
    embed = embed.field("Próximas canciones", listing, false);

    let footer = if queue_page.total_pages > 1 {
        format!(
            "Página {} de {} • {} canciones en cola • Sonix",
            queue_page.current_page, queue_page.total_pages, queue_page.total_items
        )
    } else {
        format!("{} canciones en cola • Sonix", queue_page.total_items)
    };

    embed
        .footer(CreateEmbedFooter::new(footer))
        .timestamp(Timestamp::now())
}

/// Crea un embed de ayuda general
pub fn create_help_embed(prefix: &str) -> CreateEmbed {
    let p = prefix;
    CreateEmbed::default()
        .title("🎵 Sonix - Comandos")
        .color(colors::INFO_BLUE)
        .description("Bot de música por servidor con cola y audio de relleno")
        .field(
            "🎵 Reproducción",
            format!(
                "• `{p}play <canción|enlace>` (`{p}p`) - Agrega a la cola\n\
                • `{p}pause` (`{p}pa`) - Pausa\n\
                • `{p}resume` (`{p}r`) - Reanuda\n\
                • `{p}skip` (`{p}s`) - Salta la canción actual\n\
                • `{p}replay` - Vuelve a poner la última canción\n\
                • `{p}stop` (`{p}st`) - Detiene, limpia la cola y desconecta"
            ),
            false,
        )
        .field(
            "📜 Cola",
            format!(
                "• `{p}queue [página]` (`{p}q`) - Muestra la cola\n\
                • `{p}nowplaying` (`{p}np`) - Canción actual"
            ),
            false,
        )
        .field(
            "🔊 Conexión",
            format!(
                "• `{p}join` (`{p}j`) - Conecta a tu canal de voz\n\
                • `{p}fallback on|off` - Audio de relleno cuando la cola está vacía"
            ),
            false,
        )
        .field(
            "🎵 Fuentes",
            "• Búsquedas de texto y enlaces de YouTube / YouTube Music\n\
            • Canciones, álbumes y playlists de Spotify",
            false,
        )
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
        .timestamp(Timestamp::now())
}

/// Crea un embed de error
pub fn create_error_embed(title: &str, description: &str) -> CreateEmbed {
    CreateEmbed::default()
        .title(format!("❌ {}", title))
        .description(description)
        .color(colors::ERROR_RED)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Crea un embed de éxito
pub fn create_success_embed(title: &str, description: &str) -> CreateEmbed {
    CreateEmbed::default()
        .title(format!("✅ {}", title))
        .description(description)
        .color(colors::SUCCESS_GREEN)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Crea un embed de información
pub fn create_info_embed(title: &str, description: &str) -> CreateEmbed {
    CreateEmbed::default()
        .title(format!("ℹ️ {}", title))
        .description(description)
        .color(colors::INFO_BLUE)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Crea el aviso de desconexión por inactividad
pub fn create_disconnected_embed(idle_after: Duration) -> CreateEmbed {
    CreateEmbed::default()
        .title("👋 Desconectado")
        .description(format!(
            "Salí del canal de voz tras {} sin nada en la cola",
            humantime::format_duration(idle_after)
        ))
        .color(colors::NEUTRAL_GRAY)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Texto para el usuario de un error del núcleo de reproducción
pub fn error_message(error: &PlaybackError) -> String {
    match error {
        PlaybackError::ResolutionFailed { query, .. } => {
            format!("No encontré nada reproducible para `{}`, saltando a la siguiente", query)
        }
        PlaybackError::PlaybackStartFailed { title, .. } => {
            format!("No se pudo reproducir **{}**, saltando a la siguiente", title)
        }
        PlaybackError::NotConnected => {
            "No estoy en un canal de voz. Usa `join` o `play` desde un canal de voz".to_string()
        }
        PlaybackError::QueueEmpty => "No hay nada que reproducir".to_string(),
        PlaybackError::NotPlaying => "No hay nada sonando".to_string(),
        PlaybackError::NotPaused => "La reproducción no está pausada".to_string(),
        PlaybackError::QueueFull { max } => {
            format!("La cola está llena (máximo {} canciones)", max)
        }
        PlaybackError::ConnectFailed(reason) => {
            format!("No pude unirme al canal de voz: {}", reason)
        }
        PlaybackError::ExpansionFailed(reason) => {
            format!("No pude leer la playlist: {}", reason)
        }
        PlaybackError::Transport(reason) => format!("Error de audio: {}", reason),
        PlaybackError::FallbackUnavailable => {
            "No hay fuente de audio de relleno configurada (`FALLBACK_SOURCE_URL`)".to_string()
        }
        PlaybackError::SessionClosed => {
            "La sesión de este servidor se cerró, intenta de nuevo".to_string()
        }
    }
}

/// Embed para un aviso que no vino como respuesta a un comando
pub fn create_notice_embed(notice: &PlaybackNotice, idle_after: Duration) -> CreateEmbed {
    match notice {
        PlaybackNotice::NowPlaying { track, .. } => create_now_playing_embed(track),
        PlaybackNotice::TrackFailed { error, .. } => {
            create_error_embed("Canción omitida", &error_message(error))
        }
        PlaybackNotice::PlaybackErrored { title, error, .. } => create_error_embed(
            "Error de reproducción",
            &format!(
                "**{}** falló mientras sonaba ({}). Saltando a la siguiente canción",
                title, error
            ),
        ),
        PlaybackNotice::Disconnected { .. } => create_disconnected_embed(idle_after),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{audio::QueueSnapshot, sources::TrackMetadata};
    use serenity::all::GuildId;

    fn json(embed: CreateEmbed) -> serde_json::Value {
        serde_json::to_value(embed).unwrap()
    }

    fn queued(n: usize) -> SessionView {
        SessionView {
            queue: QueueSnapshot::new((1..=n).map(|i| Track::pending(format!("song {i}"))).collect()),
            ..SessionView::default()
        }
    }

    #[test]
    fn queue_listing_shows_ten_and_counts_the_rest() {
        let embed = json(create_queue_embed(&queued(23), 1));

        let listing = embed["fields"][0]["value"].as_str().unwrap();
        assert_eq!(listing.lines().count(), 10);
        assert!(listing.starts_with("**1**. song 1"));
        assert_eq!(
            embed["footer"]["text"],
            "Página 1 de 3 • 23 canciones en cola • Sonix"
        );
    }

    #[test]
    fn later_pages_keep_queue_positions() {
        let embed = json(create_queue_embed(&queued(23), 3));

        let listing = embed["fields"][0]["value"].as_str().unwrap();
        assert!(listing.starts_with("**21**. song 21"));
        assert_eq!(listing.lines().count(), 3);
    }

    #[test]
    fn empty_queue_says_so() {
        let embed = json(create_queue_embed(&SessionView::default(), 1));
        assert!(embed["description"]
            .as_str()
            .unwrap()
            .contains("La cola está vacía"));
    }

    #[test]
    fn now_playing_links_the_page() {
        let track = Track::pending("lofi").with_resolved(
            TrackMetadata::new(
                "https://cdn.test/a",
                "Lofi Beats",
                "https://music.youtube.com/watch?v=x",
            )
            .with_thumbnail("https://img.test/x.jpg"),
        );

        let embed = json(create_now_playing_embed(&track));
        assert_eq!(embed["url"], "https://music.youtube.com/watch?v=x");
        assert_eq!(embed["description"], "**Lofi Beats**");
        assert_eq!(embed["fields"][0]["value"], "YouTube Music");
    }

    #[test]
    fn notices_pick_their_embed() {
        let guild_id = GuildId::new(1);
        let failed = json(create_notice_embed(
            &PlaybackNotice::TrackFailed {
                guild_id,
                error: PlaybackError::ResolutionFailed {
                    query: "asdfgh".into(),
                    reason: "no results".into(),
                },
            },
            Duration::from_secs(300),
        ));
        assert!(failed["description"].as_str().unwrap().contains("asdfgh"));

        let gone = json(create_notice_embed(
            &PlaybackNotice::Disconnected { guild_id },
            Duration::from_secs(300),
        ));
        assert!(gone["description"].as_str().unwrap().contains("5m"));
    }
}
