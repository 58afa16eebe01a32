use anyhow::{Context, Result};
use async_trait::async_trait;
use regex::Regex;
use serde::{de::DeserializeOwned, Deserialize};
use std::{
    sync::LazyLock,
    time::{Duration, Instant},
};
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::PlaylistExpander;

const TOKEN_URL: &str = "https://accounts.spotify.com/api/token";
const API_BASE: &str = "https://api.spotify.com/v1";

static SPOTIFY_LINK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^https://open\.spotify\.com/(?:intl-[a-z]+/)?(track|album|playlist)/([a-zA-Z0-9]+)")
        .expect("valid spotify regex")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpotifyLink<'a> {
    Track(&'a str),
    Album(&'a str),
    Playlist(&'a str),
}

impl<'a> SpotifyLink<'a> {
    pub fn parse(url: &'a str) -> Option<Self> {
        let caps = SPOTIFY_LINK.captures(url.trim())?;
        let id = caps.get(2)?.as_str();
        match caps.get(1)?.as_str() {
            "track" => Some(SpotifyLink::Track(id)),
            "album" => Some(SpotifyLink::Album(id)),
            "playlist" => Some(SpotifyLink::Playlist(id)),
            _ => None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

#[derive(Debug, Deserialize)]
struct SpotifyTrack {
    name: String,
    #[serde(default)]
    artists: Vec<SpotifyArtist>,
}

#[derive(Debug, Deserialize)]
struct SpotifyArtist {
    name: String,
}

#[derive(Debug, Deserialize)]
struct Page<T> {
    items: Vec<T>,
    next: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PlaylistItem {
    track: Option<SpotifyTrack>,
}

impl SpotifyTrack {
    fn search_query(&self) -> String {
        match self.artists.first() {
            Some(artist) => format!("{} {}", self.name, artist.name),
            None => self.name.clone(),
        }
    }
}

/// Convierte enlaces de Spotify en búsquedas "<canción> <artista>"
pub struct SpotifyExpander {
    client: reqwest::Client,
    client_id: String,
    client_secret: String,
    max_tracks: usize,
    token: Mutex<Option<(String, Instant)>>,
}

impl SpotifyExpander {
    pub fn new(client_id: String, client_secret: String, max_tracks: usize) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .context("no se pudo crear el cliente HTTP")?;

        Ok(Self {
            client,
            client_id,
            client_secret,
            max_tracks,
            token: Mutex::new(None),
        })
    }

    /// Token de client credentials, renovado un minuto antes de expirar
    async fn access_token(&self) -> Result<String> {
        let mut cached = self.token.lock().await;
        if let Some((token, expires_at)) = cached.as_ref() {
            if Instant::now() < *expires_at {
                return Ok(token.clone());
            }
        }

        let response: TokenResponse = self
            .client
            .post(TOKEN_URL)
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await
            .context("Error solicitando token de Spotify")?
            .error_for_status()
            .context("Spotify rechazó las credenciales")?
            .json()
            .await
            .context("Respuesta de token inválida")?;

        let lifetime = Duration::from_secs(response.expires_in.saturating_sub(60));
        *cached = Some((response.access_token.clone(), Instant::now() + lifetime));
        debug!("🔑 Token de Spotify renovado");
        Ok(response.access_token)
    }

    async fn get<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        let token = self.access_token().await?;
        self.client
            .get(url)
            .bearer_auth(token)
            .send()
            .await
            .with_context(|| format!("Error en request a {}", url))?
            .error_for_status()?
            .json()
            .await
            .context("Respuesta JSON de Spotify inválida")
    }

    /// Recorre páginas hasta agotar `next` o llegar al máximo
    async fn collect_pages<T, F>(&self, first: String, mut extract: F) -> Result<Vec<String>>
    where
        T: DeserializeOwned,
        F: FnMut(T) -> Option<String>,
    {
        let mut queries = Vec::new();
        let mut next = Some(first);

        while let Some(url) = next.take() {
            let page: Page<T> = self.get(&url).await?;
            for item in page.items {
                if queries.len() >= self.max_tracks {
                    return Ok(queries);
                }
                if let Some(query) = extract(item) {
                    queries.push(query);
                }
            }
            next = page.next;
        }

        Ok(queries)
    }
}

#[async_trait]
impl PlaylistExpander for SpotifyExpander {
    fn accepts(&self, query: &str) -> bool {
        SpotifyLink::parse(query).is_some()
    }

    async fn expand(&self, url: &str) -> Result<Vec<String>> {
        let link = SpotifyLink::parse(url)
            .ok_or_else(|| anyhow::anyhow!("no es un enlace de Spotify: {}", url))?;

        let queries = match link {
            SpotifyLink::Track(id) => {
                let track: SpotifyTrack = self.get(&format!("{API_BASE}/tracks/{id}")).await?;
                vec![track.search_query()]
            }
            SpotifyLink::Album(id) => {
                self.collect_pages(
                    format!("{API_BASE}/albums/{id}/tracks?limit=50"),
                    |track: SpotifyTrack| Some(track.search_query()),
                )
                .await?
            }
            SpotifyLink::Playlist(id) => {
                self.collect_pages(
                    format!("{API_BASE}/playlists/{id}/tracks?limit=100"),
                    |item: PlaylistItem| item.track.map(|t| t.search_query()),
                )
                .await?
            }
        };

        info!("🟢 Spotify: {} canciones desde {}", queries.len(), url);
        Ok(queries)
    }
}

/// Used when no Spotify credentials are configured; recognises the links so the user
/// gets a clear error instead of a failed search.
pub struct MissingSpotifyCredentials;

#[async_trait]
impl PlaylistExpander for MissingSpotifyCredentials {
    fn accepts(&self, query: &str) -> bool {
        SpotifyLink::parse(query).is_some()
    }

    async fn expand(&self, _url: &str) -> Result<Vec<String>> {
        anyhow::bail!(
            "Spotify support requires SPOTIFY_CLIENT_ID and SPOTIFY_CLIENT_SECRET to be set"
        )
    }
}
