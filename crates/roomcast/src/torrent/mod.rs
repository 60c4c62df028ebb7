//! The Torrent-Backed HTTP Range Streamer (spec.md §4.6-§4.10).

pub mod alert_observer;
pub mod contract;
pub mod file_handler;
pub mod mock;
pub mod piece_getter;
pub mod session;
pub mod streaming_response;

pub use contract::{Alert, PieceId, PieceOffset, PiecePriority, Torrent};
pub use file_handler::FileTorrentHandler;
pub use piece_getter::{PieceGetter, PieceLease};
pub use session::{MockTorrentSession, TorrentSession};
