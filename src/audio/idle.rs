use std::time::Duration;
use tokio::{
    sync::mpsc,
    time::{Instant, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::session::GuildEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdleMode {
    Inactive,
    Fallback,
    Disconnect,
}

/// Timers that run while a guild's queue is empty.
///
/// Exactly one of the fallback poll loop or the disconnect timer is armed at a time.
/// Each arm bumps the epoch; ticks and deadlines carry the epoch they were armed with
/// so the session can drop ones that fire after a cancel.
#[derive(Debug)]
pub(crate) struct IdleController {
    mode: IdleMode,
    token: Option<CancellationToken>,
    epoch: u64,
    filler: Option<u64>,
    filler_seq: u64,
}

impl IdleController {
    pub fn new() -> Self {
        Self {
            mode: IdleMode::Inactive,
            token: None,
            epoch: 0,
            filler: None,
            filler_seq: 0,
        }
    }

    pub fn mode(&self) -> IdleMode {
        self.mode
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn is_current(&self, epoch: u64) -> bool {
        self.mode != IdleMode::Inactive && self.epoch == epoch
    }

    /// Cancela el loop o el timer activo
    pub fn cancel(&mut self) {
        if let Some(token) = self.token.take() {
            token.cancel();
            debug!("⏱️ Temporizador de inactividad cancelado ({:?})", self.mode);
        }
        self.mode = IdleMode::Inactive;
        self.epoch += 1;
    }

    /// Polls every `every` with [`GuildEvent::FallbackTick`].
    pub fn start_fallback(&mut self, events: mpsc::UnboundedSender<GuildEvent>, every: Duration) {
        self.cancel();
        let token = CancellationToken::new();
        let epoch = self.epoch;
        let child = token.clone();
        let first_tick = Instant::now() + every;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(first_tick, every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = child.cancelled() => break,
                    _ = ticker.tick() => {
                        if events.send(GuildEvent::FallbackTick { epoch }).is_err() {
                            break;
                        }
                    }
                }
            }
        });

        self.mode = IdleMode::Fallback;
        self.token = Some(token);
    }

    /// Fires [`GuildEvent::DisconnectDeadline`] once after `after`.
    pub fn arm_disconnect(&mut self, events: mpsc::UnboundedSender<GuildEvent>, after: Duration) {
        self.cancel();
        let token = CancellationToken::new();
        let epoch = self.epoch;
        let child = token.clone();
        let deadline = Instant::now() + after;

        tokio::spawn(async move {
            tokio::select! {
                _ = child.cancelled() => {}
                _ = tokio::time::sleep_until(deadline) => {
                    let _ = events.send(GuildEvent::DisconnectDeadline { epoch });
                }
            }
        });

        self.mode = IdleMode::Disconnect;
        self.token = Some(token);
    }

    pub fn filler_playing(&self) -> bool {
        self.filler.is_some()
    }

    /// Marks a new filler playback; the returned sequence number tags its completion.
    pub fn begin_filler(&mut self) -> u64 {
        self.filler_seq += 1;
        self.filler = Some(self.filler_seq);
        self.filler_seq
    }

    /// Completion of filler `seq`. Completions of older fillers are ignored.
    pub fn filler_finished(&mut self, seq: u64) {
        if self.filler == Some(seq) {
            self.filler = None;
        }
    }

    /// Forgets the current filler; returns whether one was playing.
    pub fn take_filler(&mut self) -> bool {
        self.filler.take().is_some()
    }
}

impl Drop for IdleController {
    fn drop(&mut self) {
        if let Some(token) = self.token.take() {
            token.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn disconnect_deadline_fires_once_with_its_epoch() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut idle = IdleController::new();

        idle.arm_disconnect(tx, Duration::from_secs(300));
        let epoch = idle.epoch();
        assert_eq!(idle.mode(), IdleMode::Disconnect);

        match rx.recv().await {
            Some(GuildEvent::DisconnectDeadline { epoch: fired }) => assert_eq!(fired, epoch),
            other => panic!("unexpected event: {other:?}"),
        }
        assert!(idle.is_current(epoch));
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_silences_the_poll_loop() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut idle = IdleController::new();

        idle.start_fallback(tx, Duration::from_secs(5));
        let epoch = idle.epoch();
        assert!(
            matches!(rx.recv().await, Some(GuildEvent::FallbackTick { epoch: e }) if e == epoch)
        );

        idle.cancel();
        assert!(!idle.is_current(epoch));
        assert_eq!(idle.mode(), IdleMode::Inactive);

        // The loop owned the only sender; once it stops the channel closes.
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn arming_replaces_the_previous_timer() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut idle = IdleController::new();

        idle.start_fallback(tx.clone(), Duration::from_secs(5));
        idle.arm_disconnect(tx, Duration::from_secs(1));
        let epoch = idle.epoch();

        match rx.recv().await {
            Some(GuildEvent::DisconnectDeadline { epoch: fired }) => assert_eq!(fired, epoch),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn stale_filler_completions_are_ignored() {
        let mut idle = IdleController::new();
        let first = idle.begin_filler();
        let second = idle.begin_filler();

        idle.filler_finished(first);
        assert!(idle.filler_playing());

        idle.filler_finished(second);
        assert!(!idle.filler_playing());
        assert!(!idle.take_filler());
    }
}
