use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{path::PathBuf, str::FromStr, time::Duration};

use crate::audio::SessionSettings;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    // Discord
    pub discord_token: String,
    pub command_prefix: String,

    // Resolución
    pub cache_size: usize,
    pub resolver_workers: usize,
    pub resolve_timeout: Duration,
    pub ytdlp_path: String,
    pub ytdlp_cookies: Option<PathBuf>,
    pub invidious_instances: Vec<String>,

    // Cola
    pub max_queue_size: usize,
    pub max_playlist_size: usize,
    pub enable_preload: bool,

    // Audio
    pub default_volume: f32,
    pub fallback_volume: f32,

    // Inactividad
    pub idle_disconnect_after: Duration,
    pub fallback_poll_interval: Duration,
    pub fallback_source_url: Option<String>,
    pub fallback_by_default: bool,

    // Spotify (opcional)
    pub spotify_client_id: Option<String>,
    pub spotify_client_secret: Option<String>,
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();
        let config = Self::from_lookup(|key| std::env::var(key).ok())?;

        // Validate configuration before returning
        config.validate()?;

        Ok(config)
    }

    /// Builds a configuration from any key → value source; unset or blank keys take
    /// their default.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();

        Ok(Self {
            // Discord
            discord_token: get("DISCORD_TOKEN").context("DISCORD_TOKEN no está definido")?,
            command_prefix: get("COMMAND_PREFIX").unwrap_or(defaults.command_prefix),

            // Resolución
            cache_size: parse_or(&get, "CACHE_SIZE", defaults.cache_size)?,
            resolver_workers: parse_or(&get, "RESOLVER_WORKERS", defaults.resolver_workers)?,
            resolve_timeout: duration_or(&get, "RESOLVE_TIMEOUT", defaults.resolve_timeout)?,
            ytdlp_path: get("YTDLP_PATH").unwrap_or(defaults.ytdlp_path),
            ytdlp_cookies: get("YTDLP_COOKIES").map(PathBuf::from),
            invidious_instances: get("INVIDIOUS_URL")
                .map(|raw| {
                    raw.split(',')
                        .map(|s| s.trim().to_string())
                        .filter(|s| !s.is_empty())
                        .collect()
                })
                .unwrap_or_default(),

            // Cola
            max_queue_size: parse_or(&get, "MAX_QUEUE_SIZE", defaults.max_queue_size)?,
            max_playlist_size: parse_or(&get, "MAX_PLAYLIST_SIZE", defaults.max_playlist_size)?,
            enable_preload: parse_or(&get, "ENABLE_PRELOAD", defaults.enable_preload)?,

            // Audio
            default_volume: parse_or(&get, "DEFAULT_VOLUME", defaults.default_volume)?,
            fallback_volume: parse_or(&get, "FALLBACK_VOLUME", defaults.fallback_volume)?,

            // Inactividad
            idle_disconnect_after: duration_or(
                &get,
                "IDLE_DISCONNECT_AFTER",
                defaults.idle_disconnect_after,
            )?,
            fallback_poll_interval: duration_or(
                &get,
                "FALLBACK_POLL_INTERVAL",
                defaults.fallback_poll_interval,
            )?,
            fallback_source_url: get("FALLBACK_SOURCE_URL"),
            fallback_by_default: parse_or(&get, "FALLBACK_BY_DEFAULT", defaults.fallback_by_default)?,

            // Spotify
            spotify_client_id: get("SPOTIFY_CLIENT_ID"),
            spotify_client_secret: get("SPOTIFY_CLIENT_SECRET"),
        })
    }

    /// Validates configuration values for correctness.
    ///
    /// # Validation Rules
    ///
    /// - Volumes must be between 0.0 and 2.0
    /// - Sizes, worker count and durations must be greater than zero
    /// - The fallback source must be an http(s) URL
    /// - Spotify credentials come in pairs
    pub fn validate(&self) -> Result<()> {
        // Validate audio settings
        for (name, volume) in [
            ("Default volume", self.default_volume),
            ("Fallback volume", self.fallback_volume),
        ] {
            if !(0.0..=2.0).contains(&volume) {
                anyhow::bail!("{name} must be between 0.0 and 2.0, got: {volume}");
            }
        }

        if self.command_prefix.trim().is_empty() {
            anyhow::bail!("Command prefix cannot be empty");
        }

        // Validate sizes
        if self.cache_size == 0 {
            anyhow::bail!("Cache size must be greater than 0");
        }

        if self.resolver_workers == 0 {
            anyhow::bail!("Resolver workers must be greater than 0");
        }

        if self.max_queue_size == 0 {
            anyhow::bail!("Max queue size must be greater than 0");
        }

        if self.max_playlist_size == 0 {
            anyhow::bail!("Max playlist size must be greater than 0");
        }

        // Validate timers
        for (name, duration) in [
            ("Resolve timeout", self.resolve_timeout),
            ("Idle disconnect delay", self.idle_disconnect_after),
            ("Fallback poll interval", self.fallback_poll_interval),
        ] {
            if duration.is_zero() {
                anyhow::bail!("{name} must be greater than 0");
            }
        }

        if let Some(url) = &self.fallback_source_url {
            url::Url::parse(url)
                .ok()
                .filter(|u| matches!(u.scheme(), "http" | "https"))
                .with_context(|| format!("Fallback source must be an http(s) URL, got: {url}"))?;
        }

        if self.spotify_client_id.is_some() != self.spotify_client_secret.is_some() {
            anyhow::bail!("SPOTIFY_CLIENT_ID and SPOTIFY_CLIENT_SECRET must be set together");
        }

        Ok(())
    }

    pub fn spotify_credentials(&self) -> Option<(String, String)> {
        self.spotify_client_id
            .clone()
            .zip(self.spotify_client_secret.clone())
    }

    /// The subset of settings the playback sessions run with.
    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            max_queue_size: self.max_queue_size,
            default_volume: self.default_volume,
            fallback_source: self.fallback_source_url.clone(),
            fallback_volume: self.fallback_volume,
            fallback_by_default: self.fallback_by_default,
            fallback_poll_interval: self.fallback_poll_interval,
            idle_disconnect_after: self.idle_disconnect_after,
            enable_preload: self.enable_preload,
        }
    }

    /// Returns a summary of the current configuration for logging.
    ///
    /// Tokens and client secrets are left out.
    pub fn summary(&self) -> String {
        format!(
            "Config Summary:\n  \
            Prefix: {}\n  \
            Resolver: {} workers, {} timeout, cache {} (Invidious: {})\n  \
            Queue: {} max, {} per playlist, preload={}\n  \
            Audio: {}% vol, {}% fallback vol\n  \
            Idle: disconnect after {}, poll every {}, fallback={} (default {})\n  \
            Spotify: {}",
            self.command_prefix,
            self.resolver_workers,
            humantime::format_duration(self.resolve_timeout),
            self.cache_size,
            if self.invidious_instances.is_empty() {
                "off".to_string()
            } else {
                self.invidious_instances.len().to_string()
            },
            self.max_queue_size,
            self.max_playlist_size,
            self.enable_preload,
            (self.default_volume * 100.0) as u32,
            (self.fallback_volume * 100.0) as u32,
            humantime::format_duration(self.idle_disconnect_after),
            humantime::format_duration(self.fallback_poll_interval),
            self.fallback_source_url.as_deref().unwrap_or("none"),
            if self.fallback_by_default { "on" } else { "off" },
            if self.spotify_credentials().is_some() { "configured" } else { "not configured" },
        )
    }
}

fn parse_or<T>(get: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match get(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("Valor inválido para {key}: {raw}")),
        None => Ok(default),
    }
}

/// Accepts `300`, `300s`, `5m`, `1h 30m`. Bare numbers are seconds.
fn duration_or(
    get: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: Duration,
) -> Result<Duration> {
    let Some(raw) = get(key) else {
        return Ok(default);
    };
    let raw = raw.trim();
    if let Ok(secs) = raw.parse::<u64>() {
        return Ok(Duration::from_secs(secs));
    }
    humantime::parse_duration(raw).with_context(|| format!("Duración inválida para {key}: {raw}"))
}

/// Default configuration values.
///
/// Used as fallbacks when environment variables are not provided.
impl Default for Config {
    fn default() -> Self {
        Self {
            // Discord (no defaults - must be provided)
            discord_token: String::new(),
            command_prefix: "!".to_string(),

            // Resolution defaults
            cache_size: 128,
            resolver_workers: 4,
            resolve_timeout: Duration::from_secs(30),
            ytdlp_path: "yt-dlp".to_string(),
            ytdlp_cookies: None,
            invidious_instances: Vec::new(),

            // Queue defaults
            max_queue_size: 1000,
            max_playlist_size: 100,
            enable_preload: true,

            // Audio defaults
            default_volume: 0.5,
            fallback_volume: 0.1,

            // Idle defaults
            idle_disconnect_after: Duration::from_secs(300),
            fallback_poll_interval: Duration::from_secs(5),
            fallback_source_url: None,
            fallback_by_default: false,

            spotify_client_id: None,
            spotify_client_secret: None,
        }
    }
}
