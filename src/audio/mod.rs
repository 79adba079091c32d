//! # Audio Module
//!
//! Per-guild playback session and queue engine.
//!
//! ## Architecture
//!
//! Leaf-first:
//!
//! ### [`playable`] - Playable model
//! - `Song`, `AudioStream` and `SongCollection` (songs + cursor)
//! - `SongListing`: a playable plus who asked for it
//!
//! ### [`listing_queue`] / [`listings`] - Queues
//! - Bounded double-ended queues for history and pending items
//! - The only legal moves between history, current and queue
//!
//! ### [`session`] - Session
//! - One listing manager bound to one voice connection and one node player
//! - Advance, skip/unskip/replay, loop flags, position restore after outages
//!
//! ### [`service`] / [`registry`] - Guild workers
//! - One task per guild owns its session; everything else sends it messages
//! - Guards, abandonment, idle timeout, node outage and recovery
//!
//! ### [`lavalink_client`] - Audio node
//! - Lavalink v4 REST client and websocket event link

pub mod collaborators;
pub mod events;
pub mod lavalink_client;
pub mod listing_queue;
pub mod listings;
pub mod node;
pub mod playable;
pub mod registry;
pub mod service;
pub mod session;
