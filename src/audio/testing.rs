//! Fakes for exercising sessions without Discord.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use serenity::model::id::{ChannelId, GuildId};
use std::{collections::HashSet, sync::Arc, time::Duration};
use tokio::sync::watch;

use super::{
    manager::PlaybackManager,
    resolver_pool::ResolverPool,
    session::{SessionSettings, SessionView},
    transport::{CompletionHandle, PlayRequest, TransportFactory, VoiceTransport},
};
use crate::{
    cache::MusicCache,
    sources::{MetadataResolver, PlaylistExpander, TrackMetadata},
};

#[derive(Default)]
struct FakeState {
    connected: bool,
    current: Option<(PlayRequest, CompletionHandle)>,
    paused: bool,
    played: Vec<PlayRequest>,
    stops: usize,
    disconnects: usize,
    failing_plays: usize,
    failed_plays_fire_handle: bool,
}

/// Records every call; `stop`, `disconnect` and a replacing `play` fire the current
/// completion handle like a real driver would.
#[derive(Default)]
pub struct FakeTransport {
    state: Mutex<FakeState>,
}

impl FakeTransport {
    pub fn played_titles(&self) -> Vec<String> {
        self.state.lock().played.iter().map(|r| r.title.clone()).collect()
    }

    pub fn played(&self) -> Vec<PlayRequest> {
        self.state.lock().played.clone()
    }

    pub fn current_title(&self) -> Option<String> {
        self.state.lock().current.as_ref().map(|(r, _)| r.title.clone())
    }

    pub fn stops(&self) -> usize {
        self.state.lock().stops
    }

    pub fn disconnects(&self) -> usize {
        self.state.lock().disconnects
    }

    pub fn fail_next_plays(&self, count: usize) {
        self.state.lock().failing_plays = count;
    }

    /// Like [`fail_next_plays`](Self::fail_next_plays), but each failed `play` also
    /// fires its completion handle with an error before returning.
    pub fn fail_next_plays_after_firing(&self, count: usize) {
        let mut state = self.state.lock();
        state.failing_plays = count;
        state.failed_plays_fire_handle = true;
    }

    /// The current playback reaches its end on its own.
    pub fn finish_current(&self, error: Option<String>) {
        let current = self.state.lock().current.take();
        if let Some((_, handle)) = current {
            handle.finished(error);
        }
    }
}

#[async_trait]
impl VoiceTransport for FakeTransport {
    async fn connect(&self, _channel: ChannelId) -> Result<()> {
        self.state.lock().connected = true;
        Ok(())
    }

    async fn play(&self, request: PlayRequest, on_finished: CompletionHandle) -> Result<()> {
        let replaced = {
            let mut state = self.state.lock();
            if !state.connected {
                return Err(anyhow!("not in a voice channel"));
            }
            if state.failing_plays > 0 {
                state.failing_plays -= 1;
                if state.failed_plays_fire_handle {
                    on_finished.finished(Some("track setup failed".into()));
                }
                return Err(anyhow!("driver refused {}", request.url));
            }
            state.played.push(request.clone());
            state.paused = false;
            state.current.replace((request, on_finished))
        };

        if let Some((_, handle)) = replaced {
            handle.finished(None);
        }
        Ok(())
    }

    async fn pause(&self) -> Result<()> {
        let mut state = self.state.lock();
        if state.current.is_none() {
            return Err(anyhow!("nothing to pause"));
        }
        state.paused = true;
        Ok(())
    }

    async fn resume(&self) -> Result<()> {
        self.state.lock().paused = false;
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        let current = {
            let mut state = self.state.lock();
            state.stops += 1;
            state.paused = false;
            state.current.take()
        };
        if let Some((_, handle)) = current {
            handle.finished(None);
        }
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        let current = {
            let mut state = self.state.lock();
            state.disconnects += 1;
            state.connected = false;
            state.current.take()
        };
        if let Some((_, handle)) = current {
            handle.finished(None);
        }
        Ok(())
    }

    async fn is_connected(&self) -> bool {
        self.state.lock().connected
    }

    async fn is_playing(&self) -> bool {
        let state = self.state.lock();
        state.current.is_some() && !state.paused
    }

    async fn is_paused(&self) -> bool {
        self.state.lock().paused
    }
}

#[derive(Default)]
pub struct FakeTransportFactory {
    transports: DashMap<GuildId, Arc<FakeTransport>>,
}

impl FakeTransportFactory {
    pub fn get(&self, guild_id: GuildId) -> Arc<FakeTransport> {
        self.transports.entry(guild_id).or_default().value().clone()
    }
}

impl TransportFactory for FakeTransportFactory {
    fn transport(&self, guild_id: GuildId) -> Arc<dyn VoiceTransport> {
        self.get(guild_id)
    }
}

/// Resolves `q` to a track titled `q` in upper case; listed queries always fail.
#[derive(Default)]
pub struct ScriptedResolver {
    failing: HashSet<String>,
    calls: DashMap<String, usize>,
}

impl ScriptedResolver {
    pub fn failing(mut self, query: &str) -> Self {
        self.failing.insert(query.to_string());
        self
    }

    pub fn calls(&self, query: &str) -> usize {
        self.calls.get(query).map(|c| *c).unwrap_or(0)
    }
}

#[async_trait]
impl MetadataResolver for ScriptedResolver {
    async fn resolve(&self, query: &str) -> Result<TrackMetadata> {
        *self.calls.entry(query.to_string()).or_insert(0) += 1;
        if self.failing.contains(query) {
            return Err(anyhow!("no results for {query}"));
        }
        Ok(TrackMetadata::new(
            format!("https://cdn.test/{query}"),
            query.to_uppercase(),
            format!("https://page.test/{query}"),
        ))
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

pub fn test_settings() -> SessionSettings {
    SessionSettings {
        fallback_source: Some("https://radio.test/stream".to_string()),
        ..SessionSettings::default()
    }
}

/// A manager wired to fakes, plus shortcuts for one guild.
pub struct Harness {
    pub manager: PlaybackManager,
    pub transports: Arc<FakeTransportFactory>,
    pub resolver: Arc<ScriptedResolver>,
    pub guild: GuildId,
    pub channel: ChannelId,
}

impl Harness {
    pub fn new(resolver: ScriptedResolver, settings: SessionSettings) -> Self {
        Self::with_expander(resolver, settings, None)
    }

    pub fn with_expander(
        resolver: ScriptedResolver,
        settings: SessionSettings,
        expander: Option<Arc<dyn PlaylistExpander>>,
    ) -> Self {
        let resolver = Arc::new(resolver);
        let pool = ResolverPool::new(
            resolver.clone(),
            Arc::new(MusicCache::new(16)),
            2,
            Duration::from_secs(10),
        );
        let transports = Arc::new(FakeTransportFactory::default());
        let manager = PlaybackManager::new(pool, transports.clone(), expander, settings);

        Self {
            manager,
            transports,
            resolver,
            guild: GuildId::new(1),
            channel: ChannelId::new(10),
        }
    }

    pub fn transport(&self) -> Arc<FakeTransport> {
        self.transports.get(self.guild)
    }

    pub fn watch(&self) -> watch::Receiver<SessionView> {
        self.manager.watch(self.guild)
    }

    /// Waits until the published view satisfies `predicate`.
    pub async fn until(&self, predicate: impl FnMut(&SessionView) -> bool) -> SessionView {
        let mut view = self.watch();
        let result = tokio::time::timeout(Duration::from_secs(60), view.wait_for(predicate))
            .await
            .expect("session never reached the expected state")
            .expect("session closed");
        result.clone()
    }

    pub async fn until_playing(&self, title: &str) -> SessionView {
        self.until(|v| v.now_playing.as_ref().map(|t| t.title()) == Some(title))
            .await
    }
}
