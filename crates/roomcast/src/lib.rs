//! Synchronized-playback room engine and torrent-backed HTTP range
//! streamer: the Room Synchronization Engine (spec.md §3-§5) plus the
//! Torrent-Backed HTTP Range Streamer (spec.md §4.6-§4.9) that backs
//! one of its video sources.

pub mod commands;
pub mod connection;
pub mod error;
pub mod http_api;
pub mod persistence;
pub mod room;
pub mod room_storage;
pub mod torrent;
pub mod video_source;
pub mod video_status;

#[cfg(test)]
mod tests;

pub use error::{Error, Result};
pub use room_storage::{RoomStorage, StoragePaths};
