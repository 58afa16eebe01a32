use thiserror::Error;

/// Errors produced by the playback core.
///
/// `ResolutionFailed` and `PlaybackStartFailed` never reach a caller as a rejected
/// operation: the session recovers by moving on to the next queued track and reports
/// them through [`PlaybackNotice`](crate::audio::PlaybackNotice). The remaining
/// variants are returned directly from the operation that could not be performed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlaybackError {
    #[error("could not resolve `{query}`: {reason}")]
    ResolutionFailed { query: String, reason: String },

    #[error("could not start `{title}`: {reason}")]
    PlaybackStartFailed { title: String, reason: String },

    #[error("not connected to a voice channel")]
    NotConnected,

    #[error("there is nothing to act on")]
    QueueEmpty,

    #[error("nothing is playing")]
    NotPlaying,

    #[error("nothing is paused")]
    NotPaused,

    #[error("the queue is full (max {max} tracks)")]
    QueueFull { max: usize },

    #[error("could not join the voice channel: {0}")]
    ConnectFailed(String),

    #[error("could not expand playlist: {0}")]
    ExpansionFailed(String),

    #[error("voice transport error: {0}")]
    Transport(String),

    #[error("no fallback audio source is configured")]
    FallbackUnavailable,

    #[error("the guild session has shut down")]
    SessionClosed,
}

impl PlaybackError {
    /// Failures the session recovers from on its own by skipping the track.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            PlaybackError::ResolutionFailed { .. } | PlaybackError::PlaybackStartFailed { .. }
        )
    }
}

pub type PlaybackResult<T> = std::result::Result<T, PlaybackError>;
