//! # Audio Module
//!
//! Per-guild queueing and playback for Sonix.
//!
//! Every guild the bot plays in gets its own session: a queue of requested tracks,
//! the track currently playing, the one that played before it, and the timers that
//! run while nothing is queued. Sessions never share state with each other; the only
//! things they share are the resolution cache and the resolver worker pool.
//!
//! ## Architecture
//!
//! ### [`manager`] - Playback Manager
//! - Owns the guild → session registry
//! - Expands playlist links before they reach a session
//! - Exposes the operations the chat front end calls (`enqueue`, `skip`, `pause`, ...)
//!
//! ### [`session`] - Guild Session
//! - A single task per guild applies every command and event in order
//! - Advancement is guarded so two skips never start two tracks
//! - Late resolutions and completions are recognised by generation and dropped
//!
//! ### [`queue`] / [`track`] - Queue Model
//! - FIFO of pending tracks with a size cap
//! - Paged snapshots for display
//!
//! ### [`resolver_pool`] / [`preloader`] - Resolution
//! - Fixed set of workers pulling jobs off a shared channel
//! - Cache lookups short-circuit the workers
//! - The queue head is resolved in the background while the current track plays
//!
//! ### [`transport`] / [`songbird_transport`] - Voice Output
//! - A narrow trait between sessions and the voice driver
//! - The songbird implementation streams resolved URLs over HTTP
//!
//! ## Idle Behaviour
//!
//! With an empty queue a session either polls every few seconds and plays a filler
//! stream (fallback mode) or waits out a single deadline and leaves the voice channel.
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use sonix::audio::{PlaybackManager, ResolverPool, SessionSettings};
//! use sonix::audio::songbird_transport::SongbirdTransportFactory;
//! use sonix::cache::MusicCache;
//! use sonix::sources::YtDlpResolver;
//! use serenity::all::{ChannelId, GuildId};
//! use std::{sync::Arc, time::Duration};
//!
//! # async fn example(songbird: Arc<songbird::Songbird>) -> anyhow::Result<()> {
//! let pool = ResolverPool::new(
//!     Arc::new(YtDlpResolver::new("yt-dlp")),
//!     Arc::new(MusicCache::new(128)),
//!     4,
//!     Duration::from_secs(30),
//! );
//! let transports = Arc::new(SongbirdTransportFactory::new(songbird, reqwest::Client::new()));
//! let manager = PlaybackManager::new(pool, transports, None, SessionSettings::default());
//!
//! let guild_id = GuildId::new(123456789);
//! manager.connect(guild_id, ChannelId::new(42)).await?;
//! manager.enqueue(guild_id, "never gonna give you up").await?;
//! manager.skip(guild_id).await?;
//! # Ok(())
//! # }
//! ```

pub(crate) mod idle;
pub mod manager;
pub mod preloader;
pub mod queue;
pub mod resolver_pool;
pub mod session;
pub mod songbird_transport;
pub mod track;
pub mod transport;

#[cfg(test)]
mod testing;

pub use manager::PlaybackManager;
pub use queue::{QueuePage, QueueSnapshot};
pub use resolver_pool::ResolverPool;
pub use session::{CommandOutcome, PlaybackNotice, PlayerState, SessionSettings, SessionView};
pub use track::Track;
pub use transport::{CompletionHandle, PlayRequest, PlaybackKind, TransportFactory, VoiceTransport};
