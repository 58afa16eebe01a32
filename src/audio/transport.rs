use anyhow::Result;
use async_trait::async_trait;
use serenity::model::id::{ChannelId, GuildId};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use tokio::sync::mpsc;

use super::session::GuildEvent;

/// What a playback was started for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackKind {
    /// A queued track
    Track,
    /// Ambient filler while the queue is empty
    Filler,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlayRequest {
    pub url: String,
    pub title: String,
    pub volume: f32,
}

struct CompletionInner {
    fired: AtomicBool,
    generation: u64,
    play_id: u64,
    kind: PlaybackKind,
    events: mpsc::UnboundedSender<GuildEvent>,
}

/// Handed to [`VoiceTransport::play`]; the transport calls [`finished`](Self::finished)
/// when that playback ends for any reason (natural end, `stop`, replaced by another
/// `play`, error).
///
/// Every `play` call gets its own handle with a distinct `play_id`. A transport may
/// fire the handle of a `play` that then returns `Err`; the session ignores it.
///
/// Only the first call is delivered. It turns into a message on the owning guild's
/// event loop, so it is safe to call from any thread or driver callback.
#[derive(Clone)]
pub struct CompletionHandle {
    inner: Arc<CompletionInner>,
}

impl CompletionHandle {
    pub(crate) fn new(
        events: mpsc::UnboundedSender<GuildEvent>,
        generation: u64,
        play_id: u64,
        kind: PlaybackKind,
    ) -> Self {
        Self {
            inner: Arc::new(CompletionInner {
                fired: AtomicBool::new(false),
                generation,
                play_id,
                kind,
                events,
            }),
        }
    }

    /// Reports the end of the playback, with the transport's error if it failed.
    pub fn finished(&self, error: Option<String>) {
        if self.inner.fired.swap(true, Ordering::AcqRel) {
            return;
        }

        let _ = self.inner.events.send(GuildEvent::PlaybackFinished {
            generation: self.inner.generation,
            play_id: self.inner.play_id,
            kind: self.inner.kind,
            error,
        });
    }

    pub fn kind(&self) -> PlaybackKind {
        self.inner.kind
    }

    pub fn has_fired(&self) -> bool {
        self.inner.fired.load(Ordering::Acquire)
    }
}

impl std::fmt::Debug for CompletionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompletionHandle")
            .field("generation", &self.inner.generation)
            .field("play_id", &self.inner.play_id)
            .field("kind", &self.inner.kind)
            .field("fired", &self.has_fired())
            .finish()
    }
}

/// Voice output for one guild.
///
/// At most one playback is active: `play` replaces whatever was playing, and the
/// replaced playback's completion handle still fires.
#[async_trait]
pub trait VoiceTransport: Send + Sync {
    async fn connect(&self, channel: ChannelId) -> Result<()>;

    async fn play(&self, request: PlayRequest, on_finished: CompletionHandle) -> Result<()>;

    async fn pause(&self) -> Result<()>;

    async fn resume(&self) -> Result<()>;

    /// Stops the current playback, firing its completion handle.
    async fn stop(&self) -> Result<()>;

    async fn disconnect(&self) -> Result<()>;

    async fn is_connected(&self) -> bool;

    async fn is_playing(&self) -> bool;

    async fn is_paused(&self) -> bool;
}

/// Hands out the transport for a guild.
pub trait TransportFactory: Send + Sync {
    fn transport(&self, guild_id: GuildId) -> Arc<dyn VoiceTransport>;
}
