//! Open Music: per-guild playback engine for Discord on top of a Lavalink node.

pub mod audio;
pub mod bot;
pub mod config;
pub mod error;
