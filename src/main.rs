use anyhow::Result;
use serenity::{model::gateway::GatewayIntents, Client};
use songbird::{SerenityInit, Songbird};
use std::sync::Arc;
use tracing::{error, info, warn};

use sonix::{
    audio::{songbird_transport::SongbirdTransportFactory, PlaybackManager, ResolverPool},
    bot::SonixBot,
    cache::MusicCache,
    config::Config,
    sources::{
        spotify::MissingSpotifyCredentials, FallbackResolver, InvidiousResolver,
        MetadataResolver, PlaylistExpander, SpotifyExpander, YtDlpResolver,
    },
};

#[tokio::main]
async fn main() -> Result<()> {
    // Inicializar logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("sonix=debug".parse()?)
                .add_directive("serenity=info".parse()?)
                .add_directive("songbird=info".parse()?),
        )
        .init();

    info!("🎵 Iniciando Sonix v{}", env!("CARGO_PKG_VERSION"));

    // Cargar configuración
    let config = Config::load()?;

    let ytdlp = YtDlpResolver::new(config.ytdlp_path.clone())
        .with_cookies(config.ytdlp_cookies.clone());

    // Manejar health check si es necesario
    if std::env::args().any(|arg| arg == "--health-check") {
        return health_check(&ytdlp).await;
    }

    info!("{}", config.summary());

    if let Err(e) = ytdlp.verify().await {
        warn!("⚠️ yt-dlp no disponible, las búsquedas fallarán: {:?}", e);
    }

    // Inicializar caché
    let cache = Arc::new(MusicCache::new(config.cache_size));

    // Resolución: yt-dlp y, si hay instancias configuradas, Invidious como respaldo
    let primary: Arc<dyn MetadataResolver> = Arc::new(ytdlp);
    let resolver: Arc<dyn MetadataResolver> = if config.invidious_instances.is_empty() {
        primary
    } else {
        match InvidiousResolver::new(config.invidious_instances.clone()) {
            Ok(invidious) => {
                info!(
                    "🔄 Invidious como respaldo ({} instancias)",
                    config.invidious_instances.len()
                );
                Arc::new(FallbackResolver::new(primary, Arc::new(invidious)))
            }
            Err(e) => {
                error!("❌ Error al inicializar Invidious: {:?}", e);
                primary
            }
        }
    };

    let pool = ResolverPool::new(
        resolver,
        cache,
        config.resolver_workers,
        config.resolve_timeout,
    );

    // Spotify
    let expander: Arc<dyn PlaylistExpander> = match config.spotify_credentials() {
        Some((client_id, client_secret)) => {
            info!("🟢 Spotify habilitado");
            Arc::new(SpotifyExpander::new(
                client_id,
                client_secret,
                config.max_playlist_size,
            )?)
        }
        None => {
            info!("⚪ Spotify deshabilitado (faltan credenciales)");
            Arc::new(MissingSpotifyCredentials)
        }
    };

    // Voz
    let songbird = Songbird::serenity();
    let transports = Arc::new(SongbirdTransportFactory::new(
        songbird.clone(),
        reqwest::Client::new(),
    ));

    let manager = Arc::new(PlaybackManager::new(
        pool,
        transports,
        Some(expander),
        config.session_settings(),
    ));

    // Configurar intents mínimos necesarios
    let intents = GatewayIntents::GUILDS
        | GatewayIntents::GUILD_VOICE_STATES
        | GatewayIntents::GUILD_MESSAGES
        | GatewayIntents::MESSAGE_CONTENT;

    // Crear handler del bot
    let token = config.discord_token.clone();
    let handler = SonixBot::new(config, manager);

    // Construir cliente
    let mut client = Client::builder(&token, intents)
        .event_handler(handler)
        .register_songbird_with(songbird)
        .await?;

    // Manejar shutdown graceful
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Error al registrar Ctrl+C: {:?}", e);
            return;
        }
        info!("⚠️ Señal de shutdown recibida, cerrando...");
        std::process::exit(0);
    });

    // Iniciar bot
    info!("🚀 Bot iniciado exitosamente");
    if let Err(why) = client.start().await {
        error!("Error al ejecutar cliente: {:?}", why);
    }

    Ok(())
}

async fn health_check(ytdlp: &YtDlpResolver) -> Result<()> {
    // Verificar dependencias críticas
    ytdlp.verify().await?;
    println!("OK");
    Ok(())
}
