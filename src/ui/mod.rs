//! Discord embeds for command replies and playback notices.

pub mod embeds;
