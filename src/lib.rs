//! # Sonix
//!
//! Per-guild music queueing and playback for Discord.
//!
//! - [`audio`]: guild sessions, queue, resolver pool, idle handling and voice output
//! - [`sources`]: query resolution (yt-dlp, Invidious) and playlist expansion (Spotify)
//! - [`cache`]: process-wide LRU of resolved tracks
//! - [`bot`] / [`ui`]: prefix-command front end and embeds
//! - [`config`]: environment configuration

pub mod audio;
pub mod bot;
pub mod cache;
pub mod config;
pub mod error;
pub mod sources;
pub mod ui;
