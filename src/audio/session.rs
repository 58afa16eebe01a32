use serenity::model::id::{ChannelId, GuildId};
use std::{sync::Arc, time::Duration};
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tracing::{debug, error, info, warn};

use super::{
    idle::{IdleController, IdleMode},
    preloader::Preloader,
    queue::{GuildQueue, QueueSnapshot},
    resolver_pool::ResolverPool,
    track::Track,
    transport::{CompletionHandle, PlayRequest, PlaybackKind, VoiceTransport},
};
use crate::{
    error::{PlaybackError, PlaybackResult},
    sources::TrackMetadata,
};

/// Tries per playback start before the track is given up.
const PLAY_ATTEMPTS: usize = 2;

/// Knobs the playback core needs, independent of where they were configured.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSettings {
    pub max_queue_size: usize,
    pub default_volume: f32,
    pub fallback_source: Option<String>,
    pub fallback_volume: f32,
    pub fallback_by_default: bool,
    pub fallback_poll_interval: Duration,
    pub idle_disconnect_after: Duration,
    pub enable_preload: bool,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            max_queue_size: 1000,
            default_volume: 0.5,
            fallback_source: None,
            fallback_volume: 0.1,
            fallback_by_default: false,
            fallback_poll_interval: Duration::from_secs(5),
            idle_disconnect_after: Duration::from_secs(300),
            enable_preload: true,
        }
    }
}

/// Result of asking the session to move to the next track.
#[derive(Debug, PartialEq)]
pub enum AdvanceStep {
    /// Another advance is in flight; nothing happened
    Busy,
    /// Queue was empty; the session is idle now
    Drained,
    /// `track` was popped and must be resolved under `generation`
    Resolve { track: Track, generation: u64 },
}

/// Per-guild playback state, without any I/O.
///
/// `advancing` is the guard that keeps advances totally ordered: it is set when an
/// advance pops the queue and stays set until the track that advance started has
/// finished (or the advance gave up). `generation` changes on every advance and on
/// `stop`, so results that arrive for an older advance can be recognised and dropped.
#[derive(Debug)]
pub struct PlaybackSession {
    queue: GuildQueue,
    now_playing: Option<Track>,
    last_played: Option<Track>,
    last_query: Option<String>,
    advancing: bool,
    paused: bool,
    skip_pending: bool,
    generation: u64,
    fallback_enabled: bool,
}

impl PlaybackSession {
    pub fn new(max_queue_size: usize, fallback_enabled: bool) -> Self {
        Self {
            queue: GuildQueue::new(max_queue_size),
            now_playing: None,
            last_played: None,
            last_query: None,
            advancing: false,
            paused: false,
            skip_pending: false,
            generation: 0,
            fallback_enabled,
        }
    }

    pub fn enqueue(&mut self, track: Track) -> PlaybackResult<()> {
        let query = track.source_query.clone();
        self.queue.enqueue(track)?;
        self.last_query = Some(query);
        Ok(())
    }

    pub fn enqueue_many(&mut self, tracks: Vec<Track>) -> usize {
        let last = tracks.last().map(|t| t.source_query.clone());
        let added = self.queue.enqueue_many(tracks);
        if added > 0 {
            self.last_query = last.or(self.last_query.take());
        }
        added
    }

    pub fn begin_advance(&mut self) -> AdvanceStep {
        if self.advancing {
            return AdvanceStep::Busy;
        }

        self.advancing = true;
        self.generation += 1;

        match self.queue.pop_front() {
            Some(track) => AdvanceStep::Resolve {
                track,
                generation: self.generation,
            },
            None => {
                self.now_playing = None;
                self.advancing = false;
                AdvanceStep::Drained
            }
        }
    }

    /// The advance handed `track` to the transport.
    pub fn start_playing(&mut self, track: Track) {
        if let Some(previous) = self.now_playing.replace(track) {
            self.last_played = Some(previous);
        }
        self.paused = false;
        self.skip_pending = false;
    }

    /// The current track ended; releases the guard.
    pub fn finish_current(&mut self) {
        if let Some(finished) = self.now_playing.take() {
            self.last_played = Some(finished);
        }
        self.advancing = false;
        self.paused = false;
        self.skip_pending = false;
    }

    /// The advance gave up on its track; releases the guard.
    pub fn abandon(&mut self) {
        self.advancing = false;
    }

    /// Puts the last played track (or the last query) back at the head of the queue.
    pub fn replay(&mut self) -> PlaybackResult<Track> {
        let track = self
            .last_played
            .clone()
            .or_else(|| self.last_query.as_deref().map(Track::pending))
            .ok_or(PlaybackError::QueueEmpty)?;

        self.queue.enqueue_front(track.clone());
        Ok(track)
    }

    pub fn stop(&mut self) {
        self.queue.clear();
        if let Some(current) = self.now_playing.take() {
            self.last_played = Some(current);
        }
        self.advancing = false;
        self.paused = false;
        self.skip_pending = false;
        self.generation += 1;
    }

    /// No advance in flight and no track owned by the session.
    pub fn is_idle(&self) -> bool {
        !self.advancing && self.now_playing.is_none()
    }

    pub fn queue(&self) -> &GuildQueue {
        &self.queue
    }

    pub fn now_playing(&self) -> Option<&Track> {
        self.now_playing.as_ref()
    }

    pub fn last_played(&self) -> Option<&Track> {
        self.last_played.as_ref()
    }

    pub fn is_advancing(&self) -> bool {
        self.advancing
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn set_paused(&mut self, paused: bool) {
        self.paused = paused;
    }

    pub fn skip_pending(&self) -> bool {
        self.skip_pending
    }

    pub fn set_skip_pending(&mut self, pending: bool) {
        self.skip_pending = pending;
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn fallback_enabled(&self) -> bool {
        self.fallback_enabled
    }

    pub fn set_fallback_enabled(&mut self, enabled: bool) {
        self.fallback_enabled = enabled;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlayerState {
    #[default]
    Idle,
    Advancing,
    Playing,
    Paused,
    /// Idle with the filler loop armed
    Fallback,
    /// Idle with the disconnect timer armed
    DisconnectPending,
}

/// Read model of a session, republished after every event.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionView {
    pub state: PlayerState,
    pub now_playing: Option<Track>,
    pub last_played: Option<Track>,
    pub queue: QueueSnapshot,
    pub fallback_enabled: bool,
    pub filler_playing: bool,
    pub connected: bool,
}

/// Things worth telling the guild about that no command returned.
#[derive(Debug, Clone, PartialEq)]
pub enum PlaybackNotice {
    NowPlaying { guild_id: GuildId, track: Track },
    /// A track was dropped after its retries ran out
    TrackFailed { guild_id: GuildId, error: PlaybackError },
    /// The transport reported an error mid-track
    PlaybackErrored {
        guild_id: GuildId,
        title: String,
        error: String,
    },
    Disconnected { guild_id: GuildId },
}

impl PlaybackNotice {
    pub fn guild_id(&self) -> GuildId {
        match self {
            PlaybackNotice::NowPlaying { guild_id, .. }
            | PlaybackNotice::TrackFailed { guild_id, .. }
            | PlaybackNotice::PlaybackErrored { guild_id, .. }
            | PlaybackNotice::Disconnected { guild_id } => *guild_id,
        }
    }
}

#[derive(Debug)]
pub enum GuildCommand {
    Connect(ChannelId),
    Enqueue(String),
    EnqueueMany(Vec<String>),
    Advance,
    Skip,
    Pause,
    Resume,
    Stop,
    Replay,
    SetFallback(bool),
}

#[derive(Debug, Clone, PartialEq)]
pub enum CommandOutcome {
    Connected,
    /// `position` is 1-based; `starting` means an advance was kicked off right away
    Enqueued {
        title: String,
        position: usize,
        starting: bool,
    },
    EnqueuedMany {
        added: usize,
        requested: usize,
    },
    Advanced,
    Skipped,
    SkipAlreadyPending,
    Paused,
    Resumed,
    Stopped,
    Replaying {
        title: String,
        starting: bool,
    },
    FallbackSet(bool),
}

/// Everything the guild's event loop reacts to.
#[derive(Debug)]
pub enum GuildEvent {
    Command {
        command: GuildCommand,
        reply: oneshot::Sender<PlaybackResult<CommandOutcome>>,
    },
    Resolved {
        generation: u64,
        track: Track,
        result: PlaybackResult<TrackMetadata>,
    },
    PlaybackFinished {
        generation: u64,
        play_id: u64,
        kind: PlaybackKind,
        error: Option<String>,
    },
    FallbackTick {
        epoch: u64,
    },
    DisconnectDeadline {
        epoch: u64,
    },
    Shutdown,
}

/// Single owner of one guild's session.
///
/// Commands, resolver results, transport completions and idle timers all arrive as
/// [`GuildEvent`]s on one channel and are handled strictly one at a time.
pub(crate) struct SessionActor {
    guild_id: GuildId,
    session: PlaybackSession,
    idle: IdleController,
    transport: Arc<dyn VoiceTransport>,
    pool: ResolverPool,
    preloader: Option<Preloader>,
    settings: SessionSettings,
    events_tx: mpsc::UnboundedSender<GuildEvent>,
    events: mpsc::UnboundedReceiver<GuildEvent>,
    view: watch::Sender<SessionView>,
    notices: broadcast::Sender<PlaybackNotice>,
    /// Incremented on every `play` handed to the transport
    last_play_id: u64,
    /// The play whose completion ends the current track
    active_play: Option<u64>,
}

impl SessionActor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        guild_id: GuildId,
        transport: Arc<dyn VoiceTransport>,
        pool: ResolverPool,
        settings: SessionSettings,
        events_tx: mpsc::UnboundedSender<GuildEvent>,
        events: mpsc::UnboundedReceiver<GuildEvent>,
        view: watch::Sender<SessionView>,
        notices: broadcast::Sender<PlaybackNotice>,
    ) -> Self {
        let preloader = settings
            .enable_preload
            .then(|| Preloader::new(pool.clone()));

        Self {
            guild_id,
            session: PlaybackSession::new(settings.max_queue_size, settings.fallback_by_default),
            idle: IdleController::new(),
            transport,
            pool,
            preloader,
            settings,
            events_tx,
            events,
            view,
            notices,
            last_play_id: 0,
            active_play: None,
        }
    }

    fn next_play_id(&mut self) -> u64 {
        self.last_play_id += 1;
        self.last_play_id
    }

    pub async fn run(mut self) {
        info!("🎛️ Sesión iniciada para guild {}", self.guild_id);

        while let Some(event) = self.events.recv().await {
            match event {
                GuildEvent::Shutdown => break,
                GuildEvent::Command { command, reply } => {
                    let result = self.handle_command(command).await;
                    if let Err(e) = &result {
                        debug!("Comando rechazado en guild {}: {}", self.guild_id, e);
                    }
                    self.publish().await;
                    let _ = reply.send(result);
                    continue;
                }
                GuildEvent::Resolved {
                    generation,
                    track,
                    result,
                } => self.on_resolved(generation, track, result).await,
                GuildEvent::PlaybackFinished {
                    generation,
                    play_id,
                    kind,
                    error,
                } => {
                    self.on_playback_finished(generation, play_id, kind, error)
                        .await
                }
                GuildEvent::FallbackTick { epoch } => self.on_fallback_tick(epoch).await,
                GuildEvent::DisconnectDeadline { epoch } => self.on_disconnect_deadline(epoch).await,
            }
            self.publish().await;
        }

        self.idle.cancel();
        info!("🛑 Sesión terminada para guild {}", self.guild_id);
    }

    async fn handle_command(&mut self, command: GuildCommand) -> PlaybackResult<CommandOutcome> {
        match command {
            GuildCommand::Connect(channel) => self.connect(channel).await,
            GuildCommand::Enqueue(query) => self.enqueue(query).await,
            GuildCommand::EnqueueMany(queries) => self.enqueue_many(queries).await,
            GuildCommand::Advance => {
                if !self.transport.is_connected().await {
                    return Err(PlaybackError::NotConnected);
                }
                self.request_advance().await;
                Ok(CommandOutcome::Advanced)
            }
            GuildCommand::Skip => self.skip().await,
            GuildCommand::Pause => self.pause().await,
            GuildCommand::Resume => self.resume().await,
            GuildCommand::Stop => self.stop().await,
            GuildCommand::Replay => {
                let track = self.session.replay()?;
                info!("🔁 Replay en guild {}: {}", self.guild_id, track.title());
                let starting = self.start_if_idle().await;
                Ok(CommandOutcome::Replaying {
                    title: track.title().to_string(),
                    starting,
                })
            }
            GuildCommand::SetFallback(enabled) => self.set_fallback(enabled).await,
        }
    }

    async fn connect(&mut self, channel: ChannelId) -> PlaybackResult<CommandOutcome> {
        self.transport
            .connect(channel)
            .await
            .map_err(|e| PlaybackError::ConnectFailed(format!("{e:#}")))?;
        info!("🔊 Conectado al canal {} en guild {}", channel, self.guild_id);

        if self.session.is_idle() {
            if self.session.queue().is_empty() {
                self.enter_idle().await;
            } else {
                self.request_advance().await;
            }
        }
        Ok(CommandOutcome::Connected)
    }

    async fn enqueue(&mut self, query: String) -> PlaybackResult<CommandOutcome> {
        let track = Track::pending(query);
        let title = track.title().to_string();
        self.session.enqueue(track)?;
        let position = self.session.queue().len();

        let starting = self.start_if_idle().await;
        Ok(CommandOutcome::Enqueued {
            title,
            position,
            starting,
        })
    }

    async fn enqueue_many(&mut self, queries: Vec<String>) -> PlaybackResult<CommandOutcome> {
        let requested = queries.len();
        let tracks = queries.into_iter().map(Track::pending).collect();
        let added = self.session.enqueue_many(tracks);

        if added == 0 && requested > 0 {
            return Err(PlaybackError::QueueFull {
                max: self.session.queue().max_size(),
            });
        }
        if added < requested {
            warn!(
                "📋 Solo {} de {} canciones cupieron en la cola de guild {}",
                added, requested, self.guild_id
            );
        }

        self.start_if_idle().await;
        Ok(CommandOutcome::EnqueuedMany { added, requested })
    }

    /// Direct path from "queue became non-empty" to an advance, without waiting for the
    /// next fallback poll.
    async fn start_if_idle(&mut self) -> bool {
        if self.session.is_idle() && self.transport.is_connected().await {
            self.request_advance().await;
            true
        } else {
            false
        }
    }

    async fn skip(&mut self) -> PlaybackResult<CommandOutcome> {
        if self.session.now_playing().is_none() || self.session.is_paused() {
            return Err(PlaybackError::NotPlaying);
        }
        if self.session.skip_pending() {
            debug!("⏭️ Skip ya pendiente en guild {}, ignorado", self.guild_id);
            return Ok(CommandOutcome::SkipAlreadyPending);
        }

        self.session.set_skip_pending(true);
        if let Err(e) = self.transport.stop().await {
            self.session.set_skip_pending(false);
            return Err(PlaybackError::Transport(format!("{e:#}")));
        }

        info!("⏭️ Skip en guild {}", self.guild_id);
        Ok(CommandOutcome::Skipped)
    }

    async fn pause(&mut self) -> PlaybackResult<CommandOutcome> {
        if self.session.now_playing().is_none() || self.session.is_paused() {
            return Err(PlaybackError::NotPlaying);
        }
        self.transport
            .pause()
            .await
            .map_err(|e| PlaybackError::Transport(format!("{e:#}")))?;
        self.session.set_paused(true);
        info!("⏸️ Reproducción pausada en guild {}", self.guild_id);
        Ok(CommandOutcome::Paused)
    }

    async fn resume(&mut self) -> PlaybackResult<CommandOutcome> {
        if !self.session.is_paused() {
            return Err(PlaybackError::NotPaused);
        }
        self.transport
            .resume()
            .await
            .map_err(|e| PlaybackError::Transport(format!("{e:#}")))?;
        self.session.set_paused(false);
        info!("▶️ Reproducción reanudada en guild {}", self.guild_id);
        Ok(CommandOutcome::Resumed)
    }

    async fn stop(&mut self) -> PlaybackResult<CommandOutcome> {
        self.session.stop();
        self.idle.cancel();
        self.idle.take_filler();
        self.active_play = None;

        if !self.transport.is_connected().await {
            return Err(PlaybackError::NotConnected);
        }

        if let Err(e) = self.transport.stop().await {
            warn!("Error deteniendo audio en guild {}: {:#}", self.guild_id, e);
        }
        self.transport
            .disconnect()
            .await
            .map_err(|e| PlaybackError::Transport(format!("{e:#}")))?;

        info!("⏹️ Reproducción detenida en guild {}", self.guild_id);
        Ok(CommandOutcome::Stopped)
    }

    async fn set_fallback(&mut self, enabled: bool) -> PlaybackResult<CommandOutcome> {
        if enabled && self.settings.fallback_source.is_none() {
            return Err(PlaybackError::FallbackUnavailable);
        }

        let changed = self.session.fallback_enabled() != enabled;
        self.session.set_fallback_enabled(enabled);
        info!(
            "🎶 Fallback {} en guild {}",
            if enabled { "activado" } else { "desactivado" },
            self.guild_id
        );

        // Repetir el mismo modo no reinicia el temporizador de desconexión
        if changed && self.session.is_idle() && self.transport.is_connected().await {
            if !enabled {
                self.stop_filler().await;
            }
            self.enter_idle().await;
        }
        Ok(CommandOutcome::FallbackSet(enabled))
    }

    /// Moves to the next queued track. No-op while another advance is in flight.
    async fn request_advance(&mut self) {
        match self.session.begin_advance() {
            AdvanceStep::Busy => {
                debug!("⏭️ Avance ya en curso en guild {}, ignorado", self.guild_id);
            }
            AdvanceStep::Drained => {
                info!("📭 Cola vacía en guild {}", self.guild_id);
                self.enter_idle().await;
            }
            AdvanceStep::Resolve { track, generation } => {
                self.idle.cancel();
                self.stop_filler().await;

                let events = self.events_tx.clone();
                if let Some(metadata) = track.metadata().cloned() {
                    let _ = events.send(GuildEvent::Resolved {
                        generation,
                        track,
                        result: Ok(metadata),
                    });
                    return;
                }

                let pool = self.pool.clone();
                tokio::spawn(async move {
                    let result = pool.resolve_with_retry(&track.source_query).await;
                    let _ = events.send(GuildEvent::Resolved {
                        generation,
                        track,
                        result,
                    });
                });
            }
        }
    }

    async fn on_resolved(
        &mut self,
        generation: u64,
        track: Track,
        result: PlaybackResult<TrackMetadata>,
    ) {
        if generation != self.session.generation() || !self.session.is_advancing() {
            debug!(
                "Resolución descartada para '{}' (la sesión ya avanzó)",
                track.source_query
            );
            return;
        }

        match result {
            Ok(metadata) => self.start_playback(track.with_resolved(metadata), generation).await,
            Err(error) => {
                warn!("❌ Track descartado en guild {}: {}", self.guild_id, error);
                self.notify(PlaybackNotice::TrackFailed {
                    guild_id: self.guild_id,
                    error,
                });
                self.session.abandon();
                self.request_advance().await;
            }
        }
    }

    async fn start_playback(&mut self, track: Track, generation: u64) {
        let Some(metadata) = track.metadata() else {
            self.session.abandon();
            self.request_advance().await;
            return;
        };

        let request = PlayRequest {
            url: metadata.audio_url.clone(),
            title: metadata.title.clone(),
            volume: self.settings.default_volume,
        };

        let mut last_error = None;
        for attempt in 1..=PLAY_ATTEMPTS {
            let play_id = self.next_play_id();
            let on_finished = CompletionHandle::new(
                self.events_tx.clone(),
                generation,
                play_id,
                PlaybackKind::Track,
            );
            match self.transport.play(request.clone(), on_finished).await {
                Ok(()) => {
                    self.active_play = Some(play_id);
                    last_error = None;
                    break;
                }
                Err(e) => {
                    warn!(
                        "🔄 Intento {}/{} de reproducir '{}' falló: {:#}",
                        attempt, PLAY_ATTEMPTS, request.title, e
                    );
                    last_error = Some(format!("{e:#}"));
                }
            }
        }

        if let Some(reason) = last_error {
            let error = PlaybackError::PlaybackStartFailed {
                title: request.title,
                reason,
            };
            error!("❌ {} (guild {})", error, self.guild_id);
            self.notify(PlaybackNotice::TrackFailed {
                guild_id: self.guild_id,
                error,
            });
            self.session.abandon();
            self.request_advance().await;
            return;
        }

        info!("🎵 Reproduciendo en guild {}: {}", self.guild_id, request.title);
        self.session.start_playing(track.clone());
        self.notify(PlaybackNotice::NowPlaying {
            guild_id: self.guild_id,
            track,
        });

        if let Some(preloader) = &self.preloader {
            preloader.warm(self.session.queue().peek_front());
        }
    }

    async fn on_playback_finished(
        &mut self,
        generation: u64,
        play_id: u64,
        kind: PlaybackKind,
        error: Option<String>,
    ) {
        if kind == PlaybackKind::Filler {
            self.idle.filler_finished(generation);
            if let Some(error) = error {
                warn!("Audio de relleno falló en guild {}: {}", self.guild_id, error);
            }
            return;
        }

        if generation != self.session.generation()
            || self.session.now_playing().is_none()
            || self.active_play != Some(play_id)
        {
            debug!("Fin de track obsoleto ignorado en guild {}", self.guild_id);
            return;
        }
        self.active_play = None;

        if let Some(error) = error {
            let title = self
                .session
                .now_playing()
                .map(|t| t.title().to_string())
                .unwrap_or_default();
            warn!("❌ Error durante la reproducción de '{}': {}", title, error);
            self.notify(PlaybackNotice::PlaybackErrored {
                guild_id: self.guild_id,
                title,
                error,
            });
        }

        self.session.finish_current();
        self.request_advance().await;
    }

    async fn on_fallback_tick(&mut self, epoch: u64) {
        if !self.idle.is_current(epoch) || self.idle.mode() != IdleMode::Fallback {
            return;
        }
        if !self.session.fallback_enabled() || !self.session.is_idle() {
            return;
        }

        if !self.session.queue().is_empty() {
            info!("📥 La cola tiene canciones de nuevo en guild {}", self.guild_id);
            self.request_advance().await;
            return;
        }

        if !self.idle.filler_playing() && !self.transport.is_playing().await {
            self.play_filler().await;
        }
    }

    async fn play_filler(&mut self) {
        let Some(url) = self.settings.fallback_source.clone() else {
            return;
        };

        let seq = self.idle.begin_filler();
        let play_id = self.next_play_id();
        let on_finished =
            CompletionHandle::new(self.events_tx.clone(), seq, play_id, PlaybackKind::Filler);
        let request = PlayRequest {
            url,
            title: "Fallback".to_string(),
            volume: self.settings.fallback_volume,
        };

        match self.transport.play(request, on_finished).await {
            Ok(()) => info!("🎶 Audio de relleno iniciado en guild {}", self.guild_id),
            Err(e) => {
                self.idle.filler_finished(seq);
                warn!("No se pudo iniciar el relleno en guild {}: {:#}", self.guild_id, e);
            }
        }
    }

    async fn stop_filler(&mut self) {
        if !self.idle.take_filler() {
            return;
        }
        if let Err(e) = self.transport.stop().await {
            warn!("Error deteniendo relleno en guild {}: {:#}", self.guild_id, e);
        }
        debug!("🎶 Relleno detenido en guild {}", self.guild_id);
    }

    async fn on_disconnect_deadline(&mut self, epoch: u64) {
        if !self.idle.is_current(epoch) || self.idle.mode() != IdleMode::Disconnect {
            return;
        }
        self.idle.cancel();

        if !self.session.is_idle()
            || !self.session.queue().is_empty()
            || self.session.fallback_enabled()
        {
            debug!("Desconexión cancelada en guild {}: ya no está inactiva", self.guild_id);
            return;
        }

        match self.transport.disconnect().await {
            Ok(()) => info!("👋 Desconectado por inactividad de guild {}", self.guild_id),
            Err(e) => warn!("Error al desconectar de guild {}: {:#}", self.guild_id, e),
        }
        self.notify(PlaybackNotice::Disconnected {
            guild_id: self.guild_id,
        });
    }

    /// Arms the fallback loop or the disconnect timer, whichever applies.
    async fn enter_idle(&mut self) {
        if !self.transport.is_connected().await {
            self.idle.cancel();
            return;
        }

        if self.session.fallback_enabled() && self.settings.fallback_source.is_some() {
            self.idle
                .start_fallback(self.events_tx.clone(), self.settings.fallback_poll_interval);
            debug!("🎶 Loop de relleno activo en guild {}", self.guild_id);
        } else {
            self.idle
                .arm_disconnect(self.events_tx.clone(), self.settings.idle_disconnect_after);
            info!(
                "⏳ Desconexión de guild {} en {} si sigue inactiva",
                self.guild_id,
                humantime::format_duration(self.settings.idle_disconnect_after)
            );
        }
    }

    fn notify(&self, notice: PlaybackNotice) {
        let _ = self.notices.send(notice);
    }

    async fn publish(&self) {
        let connected = self.transport.is_connected().await;
        let session = &self.session;

        let state = if session.now_playing().is_some() {
            if session.is_paused() {
                PlayerState::Paused
            } else {
                PlayerState::Playing
            }
        } else if session.is_advancing() {
            PlayerState::Advancing
        } else {
            match self.idle.mode() {
                IdleMode::Fallback => PlayerState::Fallback,
                IdleMode::Disconnect => PlayerState::DisconnectPending,
                IdleMode::Inactive => PlayerState::Idle,
            }
        };

        self.view.send_replace(SessionView {
            state,
            now_playing: session.now_playing().cloned(),
            last_played: session.last_played().cloned(),
            queue: QueueSnapshot::new(session.queue().snapshot()),
            fallback_enabled: session.fallback_enabled(),
            filler_playing: self.idle.filler_playing(),
            connected,
        });
    }
}
