use dashmap::{mapref::entry::Entry, DashMap};
use serenity::model::id::{ChannelId, GuildId};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tracing::{info, warn};

use super::{
    queue::QueueSnapshot,
    resolver_pool::ResolverPool,
    session::{
        CommandOutcome, GuildCommand, GuildEvent, PlaybackNotice, SessionActor, SessionSettings,
        SessionView,
    },
    track::Track,
    transport::TransportFactory,
};
use crate::{
    error::{PlaybackError, PlaybackResult},
    sources::PlaylistExpander,
};

const NOTICE_CAPACITY: usize = 256;

/// Handle to one guild's session task.
#[derive(Clone)]
struct GuildPlayer {
    events: mpsc::UnboundedSender<GuildEvent>,
    view: watch::Receiver<SessionView>,
}

impl GuildPlayer {
    async fn command(&self, command: GuildCommand) -> PlaybackResult<CommandOutcome> {
        let (reply, response) = oneshot::channel();
        self.events
            .send(GuildEvent::Command { command, reply })
            .map_err(|_| PlaybackError::SessionClosed)?;
        response.await.map_err(|_| PlaybackError::SessionClosed)?
    }
}

/// Registry of guild sessions, created on first use.
///
/// Every operation is forwarded to the guild's own task, so operations on one guild are
/// linearized while different guilds never wait on each other.
pub struct PlaybackManager {
    players: DashMap<GuildId, GuildPlayer>,
    pool: ResolverPool,
    transports: Arc<dyn TransportFactory>,
    expander: Option<Arc<dyn PlaylistExpander>>,
    settings: SessionSettings,
    notices: broadcast::Sender<PlaybackNotice>,
}

impl PlaybackManager {
    pub fn new(
        pool: ResolverPool,
        transports: Arc<dyn TransportFactory>,
        expander: Option<Arc<dyn PlaylistExpander>>,
        settings: SessionSettings,
    ) -> Self {
        let (notices, _) = broadcast::channel(NOTICE_CAPACITY);
        Self {
            players: DashMap::new(),
            pool,
            transports,
            expander,
            settings,
            notices,
        }
    }

    /// Notices from every guild.
    pub fn subscribe(&self) -> broadcast::Receiver<PlaybackNotice> {
        self.notices.subscribe()
    }

    pub async fn connect(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
    ) -> PlaybackResult<CommandOutcome> {
        self.player(guild_id)
            .command(GuildCommand::Connect(channel_id))
            .await
    }

    /// Queues one user query. Links the playlist expander understands are expanded
    /// and queued in bulk.
    pub async fn enqueue(&self, guild_id: GuildId, query: &str) -> PlaybackResult<CommandOutcome> {
        let query = query.trim();
        if query.is_empty() {
            return Err(PlaybackError::QueueEmpty);
        }

        if let Some(expander) = self.expander.as_ref().filter(|e| e.accepts(query)) {
            let queries = expander
                .expand(query)
                .await
                .map_err(|e| PlaybackError::ExpansionFailed(format!("{e:#}")))?;

            return match queries.len() {
                0 => Err(PlaybackError::ExpansionFailed(format!(
                    "no tracks found in {query}"
                ))),
                1 => self.enqueue_one(guild_id, queries[0].clone()).await,
                _ => self.enqueue_bulk(guild_id, queries).await,
            };
        }

        self.enqueue_one(guild_id, query.to_string()).await
    }

    async fn enqueue_one(&self, guild_id: GuildId, query: String) -> PlaybackResult<CommandOutcome> {
        self.player(guild_id)
            .command(GuildCommand::Enqueue(query))
            .await
    }

    /// Appends `queries` in order.
    pub async fn enqueue_bulk(
        &self,
        guild_id: GuildId,
        queries: Vec<String>,
    ) -> PlaybackResult<CommandOutcome> {
        let queries: Vec<String> = queries
            .into_iter()
            .map(|q| q.trim().to_string())
            .filter(|q| !q.is_empty())
            .collect();
        if queries.is_empty() {
            return Err(PlaybackError::QueueEmpty);
        }

        self.player(guild_id)
            .command(GuildCommand::EnqueueMany(queries))
            .await
    }

    pub async fn request_advance(&self, guild_id: GuildId) -> PlaybackResult<CommandOutcome> {
        self.player(guild_id).command(GuildCommand::Advance).await
    }

    pub async fn skip(&self, guild_id: GuildId) -> PlaybackResult<CommandOutcome> {
        self.player(guild_id).command(GuildCommand::Skip).await
    }

    pub async fn pause(&self, guild_id: GuildId) -> PlaybackResult<CommandOutcome> {
        self.player(guild_id).command(GuildCommand::Pause).await
    }

    pub async fn resume(&self, guild_id: GuildId) -> PlaybackResult<CommandOutcome> {
        self.player(guild_id).command(GuildCommand::Resume).await
    }

    pub async fn stop(&self, guild_id: GuildId) -> PlaybackResult<CommandOutcome> {
        self.player(guild_id).command(GuildCommand::Stop).await
    }

    pub async fn replay(&self, guild_id: GuildId) -> PlaybackResult<CommandOutcome> {
        self.player(guild_id).command(GuildCommand::Replay).await
    }

    pub async fn set_fallback_enabled(
        &self,
        guild_id: GuildId,
        enabled: bool,
    ) -> PlaybackResult<CommandOutcome> {
        self.player(guild_id)
            .command(GuildCommand::SetFallback(enabled))
            .await
    }

    pub fn queue_snapshot(&self, guild_id: GuildId) -> QueueSnapshot {
        self.view(guild_id).queue
    }

    pub fn now_playing(&self, guild_id: GuildId) -> Option<Track> {
        self.view(guild_id).now_playing
    }

    /// Latest published state; guilds without a session read as idle.
    pub fn view(&self, guild_id: GuildId) -> SessionView {
        self.players
            .get(&guild_id)
            .map(|player| player.view.borrow().clone())
            .unwrap_or_else(|| SessionView {
                fallback_enabled: self.settings.fallback_by_default,
                ..SessionView::default()
            })
    }

    /// Change feed of a guild's state, creating the session if needed.
    pub fn watch(&self, guild_id: GuildId) -> watch::Receiver<SessionView> {
        self.player(guild_id).view
    }

    /// Shuts a guild's session down (e.g. the bot left the guild).
    pub fn remove_guild(&self, guild_id: GuildId) -> bool {
        match self.players.remove(&guild_id) {
            Some((_, player)) => {
                let _ = player.events.send(GuildEvent::Shutdown);
                info!("🗑️ Sesión de guild {} eliminada", guild_id);
                true
            }
            None => false,
        }
    }

    pub fn active_guilds(&self) -> usize {
        self.players.len()
    }

    pub fn pool(&self) -> &ResolverPool {
        &self.pool
    }

    fn player(&self, guild_id: GuildId) -> GuildPlayer {
        match self.players.entry(guild_id) {
            Entry::Occupied(mut entry) => {
                if entry.get().events.is_closed() {
                    warn!("Sesión de guild {} cerrada inesperadamente, recreando", guild_id);
                    entry.insert(self.spawn_session(guild_id));
                }
                entry.get().clone()
            }
            Entry::Vacant(entry) => entry.insert(self.spawn_session(guild_id)).value().clone(),
        }
    }

    fn spawn_session(&self, guild_id: GuildId) -> GuildPlayer {
        let (events_tx, events) = mpsc::unbounded_channel();
        let (view_tx, view) = watch::channel(SessionView {
            fallback_enabled: self.settings.fallback_by_default,
            ..SessionView::default()
        });

        let actor = SessionActor::new(
            guild_id,
            self.transports.transport(guild_id),
            self.pool.clone(),
            self.settings.clone(),
            events_tx.clone(),
            events,
            view_tx,
            self.notices.clone(),
        );
        tokio::spawn(actor.run());

        GuildPlayer {
            events: events_tx,
            view,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{
        session::PlayerState,
        testing::{test_settings, Harness, ScriptedResolver},
        transport::VoiceTransport,
    };
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    fn queued(view: &SessionView) -> Vec<String> {
        view.queue
            .items
            .iter()
            .map(|t| t.source_query.clone())
            .collect()
    }

    async fn next_notice(
        notices: &mut broadcast::Receiver<PlaybackNotice>,
        mut wanted: impl FnMut(&PlaybackNotice) -> bool,
    ) -> PlaybackNotice {
        tokio::time::timeout(Duration::from_secs(30), async {
            loop {
                match notices.recv().await {
                    Ok(notice) if wanted(&notice) => return notice,
                    Ok(_) => continue,
                    Err(e) => panic!("notice stream ended: {e}"),
                }
            }
        })
        .await
        .expect("notice never arrived")
    }

    async fn settle() {
        for _ in 0..20 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn plays_in_order_and_remembers_the_last_track() {
        let h = Harness::new(ScriptedResolver::default(), test_settings());
        h.manager.connect(h.guild, h.channel).await.unwrap();

        let first = h.manager.enqueue(h.guild, "a").await.unwrap();
        assert_eq!(
            first,
            CommandOutcome::Enqueued {
                title: "a".into(),
                position: 1,
                starting: true
            }
        );
        let second = h.manager.enqueue(h.guild, "b").await.unwrap();
        assert!(matches!(second, CommandOutcome::Enqueued { starting: false, .. }));

        let view = h.until_playing("A").await;
        assert_eq!(queued(&view), vec!["b"]);
        assert_eq!(view.state, PlayerState::Playing);

        h.transport().finish_current(None);
        let view = h.until_playing("B").await;
        assert_eq!(view.last_played.as_ref().map(|t| t.title()), Some("A"));
        assert!(view.queue.is_empty());
        assert_eq!(h.transport().played_titles(), vec!["A", "B"]);
    }

    #[tokio::test]
    async fn queue_waits_for_a_connection() {
        let h = Harness::new(ScriptedResolver::default(), test_settings());
        h.manager.enqueue(h.guild, "a").await.unwrap();
        h.manager.enqueue(h.guild, "b").await.unwrap();

        assert_eq!(queued(&h.manager.view(h.guild)), vec!["a", "b"]);
        assert!(h.transport().played_titles().is_empty());

        h.manager.connect(h.guild, h.channel).await.unwrap();
        h.until_playing("A").await;
    }

    #[tokio::test]
    async fn two_rapid_skips_advance_once() {
        let h = Harness::new(ScriptedResolver::default(), test_settings());
        h.manager.connect(h.guild, h.channel).await.unwrap();
        h.manager
            .enqueue_bulk(h.guild, vec!["a".into(), "b".into(), "c".into()])
            .await
            .unwrap();
        h.until_playing("A").await;

        let (first, second) = tokio::join!(h.manager.skip(h.guild), h.manager.skip(h.guild));
        assert_eq!(first, Ok(CommandOutcome::Skipped));
        assert_eq!(second, Ok(CommandOutcome::SkipAlreadyPending));

        let view = h.until_playing("B").await;
        assert_eq!(queued(&view), vec!["c"]);
        assert_eq!(h.transport().played_titles(), vec!["A", "B"]);
    }

    #[tokio::test]
    async fn advance_while_playing_is_a_no_op() {
        let h = Harness::new(ScriptedResolver::default(), test_settings());
        h.manager.connect(h.guild, h.channel).await.unwrap();
        h.manager
            .enqueue_bulk(h.guild, vec!["a".into(), "b".into()])
            .await
            .unwrap();
        h.until_playing("A").await;

        h.manager.request_advance(h.guild).await.unwrap();
        h.manager.request_advance(h.guild).await.unwrap();
        settle().await;

        assert_eq!(h.transport().played_titles(), vec!["A"]);
        assert_eq!(queued(&h.manager.view(h.guild)), vec!["b"]);
    }

    #[tokio::test]
    async fn unresolvable_track_is_dropped_after_one_retry() {
        let h = Harness::new(ScriptedResolver::default().failing("bad"), test_settings());
        let mut notices = h.manager.subscribe();
        h.manager.connect(h.guild, h.channel).await.unwrap();
        h.manager
            .enqueue_bulk(h.guild, vec!["bad".into(), "good".into()])
            .await
            .unwrap();

        h.until_playing("GOOD").await;
        assert_eq!(h.resolver.calls("bad"), 2);
        assert_eq!(h.transport().played_titles(), vec!["GOOD"]);
        assert!(!h.manager.pool().is_cached("bad"));

        let notice = next_notice(&mut notices, |n| {
            matches!(n, PlaybackNotice::TrackFailed { .. })
        })
        .await;
        assert!(matches!(
            notice,
            PlaybackNotice::TrackFailed {
                error: PlaybackError::ResolutionFailed { ref query, .. },
                ..
            } if query == "bad"
        ));
    }

    #[tokio::test]
    async fn failed_playback_start_is_retried_then_skipped() {
        let h = Harness::new(ScriptedResolver::default(), test_settings());
        let mut notices = h.manager.subscribe();
        h.manager.connect(h.guild, h.channel).await.unwrap();
        h.transport().fail_next_plays(2);

        h.manager
            .enqueue_bulk(h.guild, vec!["a".into(), "b".into()])
            .await
            .unwrap();

        h.until_playing("B").await;
        assert_eq!(h.transport().played_titles(), vec!["B"]);

        let notice = next_notice(&mut notices, |n| {
            matches!(n, PlaybackNotice::TrackFailed { .. })
        })
        .await;
        assert!(matches!(
            notice,
            PlaybackNotice::TrackFailed {
                error: PlaybackError::PlaybackStartFailed { ref title, .. },
                ..
            } if title == "A"
        ));
    }

    #[tokio::test]
    async fn single_failed_start_still_plays() {
        let h = Harness::new(ScriptedResolver::default(), test_settings());
        h.manager.connect(h.guild, h.channel).await.unwrap();
        h.transport().fail_next_plays(1);

        h.manager.enqueue(h.guild, "a").await.unwrap();
        h.until_playing("A").await;
    }

    #[tokio::test]
    async fn completion_from_a_failed_start_does_not_end_the_retry() {
        let h = Harness::new(ScriptedResolver::default(), test_settings());
        let mut notices = h.manager.subscribe();
        h.manager.connect(h.guild, h.channel).await.unwrap();
        h.transport().fail_next_plays_after_firing(1);

        h.manager
            .enqueue_bulk(h.guild, vec!["a".into(), "b".into()])
            .await
            .unwrap();
        h.until_playing("A").await;
        settle().await;

        let view = h.manager.view(h.guild);
        assert_eq!(view.now_playing.as_ref().map(|t| t.title().to_string()), Some("A".to_string()));
        assert_eq!(queued(&view), vec!["b"]);
        assert_eq!(h.transport().played_titles(), vec!["A"]);
        assert!(!std::iter::from_fn(|| notices.try_recv().ok())
            .any(|n| matches!(n, PlaybackNotice::PlaybackErrored { .. })));
    }

    #[tokio::test]
    async fn transport_error_mid_track_is_announced_and_skipped() {
        let h = Harness::new(ScriptedResolver::default(), test_settings());
        let mut notices = h.manager.subscribe();
        h.manager.connect(h.guild, h.channel).await.unwrap();
        h.manager
            .enqueue_bulk(h.guild, vec!["a".into(), "b".into()])
            .await
            .unwrap();
        h.until_playing("A").await;

        h.transport().finish_current(Some("decoder died".into()));

        let notice = next_notice(&mut notices, |n| {
            matches!(n, PlaybackNotice::PlaybackErrored { .. })
        })
        .await;
        assert_eq!(
            notice,
            PlaybackNotice::PlaybackErrored {
                guild_id: h.guild,
                title: "A".into(),
                error: "decoder died".into(),
            }
        );
        h.until_playing("B").await;
    }

    #[tokio::test]
    async fn pause_and_resume_delegate_to_the_transport() {
        let h = Harness::new(ScriptedResolver::default(), test_settings());
        h.manager.connect(h.guild, h.channel).await.unwrap();
        assert_eq!(h.manager.pause(h.guild).await, Err(PlaybackError::NotPlaying));

        h.manager.enqueue(h.guild, "a").await.unwrap();
        h.until_playing("A").await;

        assert_eq!(h.manager.pause(h.guild).await, Ok(CommandOutcome::Paused));
        assert_eq!(h.manager.view(h.guild).state, PlayerState::Paused);
        assert!(h.transport().is_paused().await);
        assert_eq!(h.manager.skip(h.guild).await, Err(PlaybackError::NotPlaying));

        assert_eq!(h.manager.resume(h.guild).await, Ok(CommandOutcome::Resumed));
        assert_eq!(h.manager.resume(h.guild).await, Err(PlaybackError::NotPaused));
        assert_eq!(h.manager.view(h.guild).state, PlayerState::Playing);
    }

    #[tokio::test]
    async fn replay_puts_the_last_track_back_in_front() {
        let h = Harness::new(ScriptedResolver::default(), test_settings());
        assert_eq!(h.manager.replay(h.guild).await, Err(PlaybackError::QueueEmpty));

        h.manager.connect(h.guild, h.channel).await.unwrap();
        h.manager.enqueue(h.guild, "a").await.unwrap();
        h.until_playing("A").await;
        h.transport().finish_current(None);
        h.until(|v| v.now_playing.is_none() && v.state == PlayerState::DisconnectPending)
            .await;

        let outcome = h.manager.replay(h.guild).await.unwrap();
        assert_eq!(
            outcome,
            CommandOutcome::Replaying {
                title: "A".into(),
                starting: true
            }
        );
        h.until_playing("A").await;
        assert_eq!(h.transport().played_titles(), vec!["A", "A"]);
        assert_eq!(h.resolver.calls("a"), 1);
    }

    #[tokio::test]
    async fn replay_while_playing_queues_at_index_zero() {
        let h = Harness::new(ScriptedResolver::default(), test_settings());
        h.manager.connect(h.guild, h.channel).await.unwrap();
        h.manager
            .enqueue_bulk(h.guild, vec!["a".into(), "b".into(), "c".into()])
            .await
            .unwrap();
        h.until_playing("A").await;
        h.manager.skip(h.guild).await.unwrap();
        h.until_playing("B").await;

        h.manager.replay(h.guild).await.unwrap();
        assert_eq!(queued(&h.manager.view(h.guild)), vec!["a", "c"]);
    }

    #[tokio::test]
    async fn stop_before_joining_still_clears_the_queue() {
        let h = Harness::new(ScriptedResolver::default(), test_settings());
        h.manager
            .enqueue_bulk(h.guild, vec!["a".into(), "b".into()])
            .await
            .unwrap();
        assert_eq!(queued(&h.manager.view(h.guild)), vec!["a", "b"]);

        assert_eq!(h.manager.stop(h.guild).await, Err(PlaybackError::NotConnected));
        assert!(queued(&h.manager.view(h.guild)).is_empty());

        h.manager.connect(h.guild, h.channel).await.unwrap();
        settle().await;
        assert!(h.transport().played_titles().is_empty());
    }

    #[tokio::test]
    async fn stop_clears_and_disconnects() {
        let h = Harness::new(ScriptedResolver::default(), test_settings());
        assert_eq!(h.manager.stop(h.guild).await, Err(PlaybackError::NotConnected));
        assert_eq!(
            h.manager.request_advance(h.guild).await,
            Err(PlaybackError::NotConnected)
        );

        h.manager.connect(h.guild, h.channel).await.unwrap();
        h.manager
            .enqueue_bulk(h.guild, vec!["a".into(), "b".into()])
            .await
            .unwrap();
        h.until_playing("A").await;

        assert_eq!(h.manager.stop(h.guild).await, Ok(CommandOutcome::Stopped));
        settle().await;

        let view = h.manager.view(h.guild);
        assert_eq!(view.state, PlayerState::Idle);
        assert!(view.queue.is_empty());
        assert!(view.now_playing.is_none());
        assert!(!view.connected);
        assert_eq!(h.transport().disconnects(), 1);
        assert_eq!(h.transport().played_titles(), vec!["A"]);
    }

    #[tokio::test]
    async fn queue_cap_is_enforced() {
        let settings = SessionSettings {
            max_queue_size: 2,
            ..test_settings()
        };
        let h = Harness::new(ScriptedResolver::default(), settings);

        h.manager.enqueue(h.guild, "a").await.unwrap();
        let bulk = h
            .manager
            .enqueue_bulk(h.guild, vec!["b".into(), "c".into()])
            .await
            .unwrap();
        assert_eq!(
            bulk,
            CommandOutcome::EnqueuedMany {
                added: 1,
                requested: 2
            }
        );
        assert_eq!(
            h.manager.enqueue(h.guild, "d").await,
            Err(PlaybackError::QueueFull { max: 2 })
        );
        assert_eq!(queued(&h.manager.view(h.guild)), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn blank_queries_are_rejected() {
        let h = Harness::new(ScriptedResolver::default(), test_settings());
        assert_eq!(h.manager.enqueue(h.guild, "   ").await, Err(PlaybackError::QueueEmpty));
        assert_eq!(
            h.manager.enqueue_bulk(h.guild, vec![" ".into()]).await,
            Err(PlaybackError::QueueEmpty)
        );
    }

    #[tokio::test]
    async fn preloader_warms_the_next_track() {
        let h = Harness::new(ScriptedResolver::default(), test_settings());
        h.manager.connect(h.guild, h.channel).await.unwrap();
        h.manager
            .enqueue_bulk(h.guild, vec!["a".into(), "b".into()])
            .await
            .unwrap();
        h.until_playing("A").await;

        for _ in 0..100 {
            if h.manager.pool().is_cached("b") {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(h.manager.pool().is_cached("b"));

        h.transport().finish_current(None);
        h.until_playing("B").await;
        assert_eq!(h.resolver.calls("b"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn idle_guild_disconnects_once_after_the_full_timeout() {
        let h = Harness::new(ScriptedResolver::default(), SessionSettings::default());
        let mut notices = h.manager.subscribe();
        h.manager.connect(h.guild, h.channel).await.unwrap();
        assert_eq!(h.manager.view(h.guild).state, PlayerState::DisconnectPending);

        tokio::time::advance(Duration::from_secs(299)).await;
        settle().await;
        assert_eq!(h.transport().disconnects(), 0);

        tokio::time::advance(Duration::from_secs(2)).await;
        h.until(|v| !v.connected).await;
        assert_eq!(h.transport().disconnects(), 1);
        assert_eq!(
            next_notice(&mut notices, |_| true).await,
            PlaybackNotice::Disconnected { guild_id: h.guild }
        );

        tokio::time::advance(Duration::from_secs(900)).await;
        settle().await;
        assert_eq!(h.transport().disconnects(), 1);
        assert_eq!(h.manager.view(h.guild).state, PlayerState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn repeating_fallback_off_keeps_the_disconnect_deadline() {
        let h = Harness::new(ScriptedResolver::default(), test_settings());
        h.manager.connect(h.guild, h.channel).await.unwrap();
        assert_eq!(h.manager.view(h.guild).state, PlayerState::DisconnectPending);

        tokio::time::advance(Duration::from_secs(200)).await;
        settle().await;
        assert_eq!(
            h.manager.set_fallback_enabled(h.guild, false).await,
            Ok(CommandOutcome::FallbackSet(false))
        );

        tokio::time::advance(Duration::from_secs(101)).await;
        h.until(|v| !v.connected).await;
        assert_eq!(h.transport().disconnects(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn new_track_cancels_the_disconnect_timer() {
        let h = Harness::new(ScriptedResolver::default(), SessionSettings::default());
        h.manager.connect(h.guild, h.channel).await.unwrap();

        tokio::time::advance(Duration::from_secs(200)).await;
        h.manager.enqueue(h.guild, "a").await.unwrap();
        h.until_playing("A").await;

        tokio::time::advance(Duration::from_secs(200)).await;
        settle().await;
        assert_eq!(h.transport().disconnects(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn filler_plays_while_idle_and_stops_when_toggled_off() {
        let settings = SessionSettings {
            idle_disconnect_after: Duration::from_secs(20),
            ..test_settings()
        };
        let h = Harness::new(ScriptedResolver::default(), settings);
        h.manager.connect(h.guild, h.channel).await.unwrap();

        assert_eq!(
            h.manager.set_fallback_enabled(h.guild, true).await,
            Ok(CommandOutcome::FallbackSet(true))
        );
        h.until(|v| v.filler_playing).await;
        assert_eq!(h.transport().current_title().as_deref(), Some("Fallback"));
        assert_eq!(h.transport().played()[0].volume, 0.1);

        h.manager.set_fallback_enabled(h.guild, false).await.unwrap();
        let view = h.manager.view(h.guild);
        assert!(!view.filler_playing);
        assert_eq!(view.state, PlayerState::DisconnectPending);
        assert_eq!(h.transport().current_title(), None);

        h.until(|v| !v.connected).await;
        assert_eq!(h.transport().disconnects(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn queued_track_replaces_filler() {
        let h = Harness::new(ScriptedResolver::default(), test_settings());
        h.manager.connect(h.guild, h.channel).await.unwrap();
        h.manager.set_fallback_enabled(h.guild, true).await.unwrap();
        h.until(|v| v.filler_playing).await;

        h.manager.enqueue(h.guild, "a").await.unwrap();
        let view = h.until_playing("A").await;
        assert!(!view.filler_playing);
        assert_eq!(h.transport().played_titles(), vec!["Fallback", "A"]);

        // No filler comes back while the track plays.
        tokio::time::advance(Duration::from_secs(30)).await;
        settle().await;
        assert_eq!(h.transport().current_title().as_deref(), Some("A"));
    }

    #[tokio::test]
    async fn fallback_needs_a_source() {
        let h = Harness::new(ScriptedResolver::default(), SessionSettings::default());
        assert_eq!(
            h.manager.set_fallback_enabled(h.guild, true).await,
            Err(PlaybackError::FallbackUnavailable)
        );
        assert_eq!(
            h.manager.set_fallback_enabled(h.guild, false).await,
            Ok(CommandOutcome::FallbackSet(false))
        );
    }

    struct StaticExpander(Vec<String>);

    #[async_trait]
    impl PlaylistExpander for StaticExpander {
        fn accepts(&self, query: &str) -> bool {
            query.starts_with("https://open.spotify.com/")
        }

        async fn expand(&self, _url: &str) -> anyhow::Result<Vec<String>> {
            Ok(self.0.clone())
        }
    }

    #[tokio::test]
    async fn playlist_links_are_expanded_in_order() {
        let expander = StaticExpander(vec!["one x".into(), "two y".into(), "three z".into()]);
        let h = Harness::with_expander(
            ScriptedResolver::default(),
            test_settings(),
            Some(Arc::new(expander)),
        );

        let outcome = h
            .manager
            .enqueue(h.guild, "https://open.spotify.com/playlist/abc")
            .await
            .unwrap();
        assert_eq!(
            outcome,
            CommandOutcome::EnqueuedMany {
                added: 3,
                requested: 3
            }
        );
        assert_eq!(
            queued(&h.manager.view(h.guild)),
            vec!["one x", "two y", "three z"]
        );

        // Non-playlist queries skip the expander.
        h.manager.enqueue(h.guild, "plain search").await.unwrap();
        assert_eq!(h.manager.queue_snapshot(h.guild).len(), 4);
    }

    #[tokio::test]
    async fn empty_expansion_is_an_error() {
        let h = Harness::with_expander(
            ScriptedResolver::default(),
            test_settings(),
            Some(Arc::new(StaticExpander(Vec::new()))),
        );
        assert!(matches!(
            h.manager
                .enqueue(h.guild, "https://open.spotify.com/album/abc")
                .await,
            Err(PlaybackError::ExpansionFailed(_))
        ));
    }

    #[tokio::test]
    async fn sessions_are_isolated_and_removable() {
        let h = Harness::new(ScriptedResolver::default(), test_settings());
        let other = GuildId::new(2);

        h.manager.enqueue(h.guild, "a").await.unwrap();
        h.manager.enqueue(other, "b").await.unwrap();
        assert_eq!(h.manager.active_guilds(), 2);
        assert_eq!(queued(&h.manager.view(other)), vec!["b"]);

        assert!(h.manager.remove_guild(other));
        assert!(!h.manager.remove_guild(other));
        assert!(h.manager.view(other).queue.is_empty());
        assert_eq!(queued(&h.manager.view(h.guild)), vec!["a"]);
        assert_eq!(h.manager.now_playing(other), None);
    }
}
