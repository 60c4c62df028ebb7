//! The thin, testable contract over the embedded BitTorrent library
//! (spec.md §4.6). This is the seam `ManagedTorrentHandle` occupies in
//! the teacher, narrowed to a trait: the peer wire protocol, choking
//! algorithm, DHT, trackers, and piece exchange over the network are
//! all out of scope and live behind whatever implements [`Torrent`].

use bytes::Bytes;

pub type PieceId = u32;

/// Scheduling priority for a piece, from "never fetch" to "fetch now".
/// Named the way the original app's libtorrent binding names its
/// priority levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum PiecePriority {
    DontDownload,
    Low,
    Normal,
    High,
    Highest,
}

/// A `(piece_id, intra-piece offset)` pair, the result of mapping a
/// file-relative byte offset through the torrent's piece layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PieceOffset {
    pub piece_id: PieceId,
    pub offset: u32,
}

/// Alerts a [`Torrent`] emits asynchronously; the only kind the core
/// relies on is `ReadPiece` (spec.md §4.7, §4.8 step 4).
#[derive(Debug, Clone)]
pub enum Alert {
    ReadPiece { piece_id: PieceId, buffer: Bytes },
    PieceFinished { piece_id: PieceId },
}

/// Thin contract over one torrent's session state (spec.md §4.6).
/// Implementations own the actual swarm; the core only ever calls
/// these methods and never reaches into peer-wire-protocol internals.
/// All methods are synchronous and non-blocking: a real engine answers
/// them from already-known state, scheduling any actual I/O in the
/// background and surfacing its results via [`Torrent::pop_alerts`].
pub trait Torrent: Send + Sync {
    fn piece_of(&self, file_ind: usize, byte_offset: u64) -> anyhow::Result<PieceOffset>;
    fn piece_size(&self, piece_id: PieceId) -> u32;
    fn have_piece(&self, piece_id: PieceId) -> bool;
    fn set_piece_priority(&self, piece_id: PieceId, priority: PiecePriority);
    fn set_piece_deadline(&self, piece_id: PieceId, deadline_secs_from_now: f64);
    fn clear_deadlines(&self);

    /// Schedules a piece-buffer delivery as an eventual [`Alert::ReadPiece`].
    fn read_piece(&self, piece_id: PieceId);

    /// Drains alerts accumulated since the last call.
    fn pop_alerts(&self) -> Vec<Alert>;

    fn num_pieces(&self) -> u32;
    fn num_files(&self) -> usize;
    fn file_size(&self, file_ind: usize) -> u64;
    fn file_name(&self, file_ind: usize) -> String;

    /// Releases the torrent handle; `delete_files` mirrors the
    /// original library's `remove_torrent(delete_files=true)`.
    fn remove_torrent(&self, delete_files: bool);
}
