use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use serenity::model::id::{ChannelId, GuildId};
use songbird::{
    input::{HttpRequest, Input},
    tracks::{PlayMode, TrackHandle},
    Call, Event, EventContext, EventHandler as VoiceEventHandler, Songbird, TrackEvent,
};
use std::sync::Arc;
use tracing::{debug, info};

use super::transport::{CompletionHandle, PlayRequest, TransportFactory, VoiceTransport};

/// Voice output for one guild over the shared songbird manager.
pub struct SongbirdTransport {
    guild_id: GuildId,
    manager: Arc<Songbird>,
    http: reqwest::Client,
    current: Mutex<Option<TrackHandle>>,
}

impl SongbirdTransport {
    pub fn new(guild_id: GuildId, manager: Arc<Songbird>, http: reqwest::Client) -> Self {
        Self {
            guild_id,
            manager,
            http,
            current: Mutex::new(None),
        }
    }

    fn call(&self) -> Result<Arc<tokio::sync::Mutex<Call>>> {
        self.manager
            .get(self.guild_id)
            .ok_or_else(|| anyhow!("No hay conexión de voz para guild {}", self.guild_id))
    }

    fn current(&self) -> Option<TrackHandle> {
        self.current.lock().clone()
    }

    async fn current_mode(&self) -> Option<PlayMode> {
        let handle = self.current()?;
        handle.get_info().await.ok().map(|state| state.playing)
    }
}

/// Relays songbird's end/error events to the session's completion handle.
struct CompletionRelay {
    guild_id: GuildId,
    on_finished: CompletionHandle,
}

#[async_trait]
impl VoiceEventHandler for CompletionRelay {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<Event> {
        let error = match ctx {
            EventContext::Track(tracks) => tracks.iter().find_map(|(state, _)| match &state.playing {
                PlayMode::Errored(e) => Some(format!("{e:?}")),
                _ => None,
            }),
            _ => None,
        };

        debug!(
            "🎵 Track terminado en guild {} (error: {:?})",
            self.guild_id, error
        );
        self.on_finished.finished(error);
        None
    }
}

#[async_trait]
impl VoiceTransport for SongbirdTransport {
    async fn connect(&self, channel: ChannelId) -> Result<()> {
        self.manager
            .join(self.guild_id, channel)
            .await
            .with_context(|| format!("Error al conectar al canal de voz {}", channel))?;
        Ok(())
    }

    async fn play(&self, request: PlayRequest, on_finished: CompletionHandle) -> Result<()> {
        let call = self.call()?;

        let previous = self.current.lock().take();
        if let Some(previous) = previous {
            let _ = previous.stop();
        }

        let input: Input = HttpRequest::new(self.http.clone(), request.url.clone()).into();
        let handle = call.lock().await.play_input(input);

        let configured = handle
            .set_volume(request.volume)
            .and_then(|_| {
                handle.add_event(
                    Event::Track(TrackEvent::End),
                    CompletionRelay {
                        guild_id: self.guild_id,
                        on_finished: on_finished.clone(),
                    },
                )
            })
            .and_then(|_| {
                handle.add_event(
                    Event::Track(TrackEvent::Error),
                    CompletionRelay {
                        guild_id: self.guild_id,
                        on_finished,
                    },
                )
            });

        if let Err(e) = configured {
            let _ = handle.stop();
            return Err(anyhow!("Error al configurar el track '{}': {}", request.title, e));
        }

        *self.current.lock() = Some(handle);
        info!("🎵 Enviado a songbird en guild {}: {}", self.guild_id, request.title);
        Ok(())
    }

    async fn pause(&self) -> Result<()> {
        let handle = self.current().ok_or_else(|| anyhow!("Nada que pausar"))?;
        handle.pause()?;
        Ok(())
    }

    async fn resume(&self) -> Result<()> {
        let handle = self.current().ok_or_else(|| anyhow!("Nada que reanudar"))?;
        handle.play()?;
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        let current = self.current.lock().take();
        if let Some(handle) = current {
            handle.stop()?;
        }
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        let current = self.current.lock().take();
        if let Some(handle) = current {
            let _ = handle.stop();
        }

        if self.manager.get(self.guild_id).is_some() {
            self.manager
                .remove(self.guild_id)
                .await
                .context("Error al salir del canal de voz")?;
        }
        info!("👋 Desconectado del canal de voz en guild {}", self.guild_id);
        Ok(())
    }

    async fn is_connected(&self) -> bool {
        match self.manager.get(self.guild_id) {
            Some(call) => call.lock().await.current_connection().is_some(),
            None => false,
        }
    }

    async fn is_playing(&self) -> bool {
        matches!(self.current_mode().await, Some(PlayMode::Play))
    }

    async fn is_paused(&self) -> bool {
        matches!(self.current_mode().await, Some(PlayMode::Pause))
    }
}

/// Builds [`SongbirdTransport`]s sharing one songbird manager and HTTP client.
pub struct SongbirdTransportFactory {
    manager: Arc<Songbird>,
    http: reqwest::Client,
}

impl SongbirdTransportFactory {
    pub fn new(manager: Arc<Songbird>, http: reqwest::Client) -> Self {
        Self { manager, http }
    }
}

impl TransportFactory for SongbirdTransportFactory {
    fn transport(&self, guild_id: GuildId) -> Arc<dyn VoiceTransport> {
        Arc::new(SongbirdTransport::new(
            guild_id,
            self.manager.clone(),
            self.http.clone(),
        ))
    }
}
