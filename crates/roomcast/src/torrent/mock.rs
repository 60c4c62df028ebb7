//! In-memory [`Torrent`] used for tests and local development in place
//! of a real swarm engine (see `DESIGN.md`'s dropped-dependency entry:
//! this workspace does not vendor the teacher's full peer-wire-protocol
//! stack, since spec.md §1 treats it as an out-of-scope external
//! library).
//!
//! Pieces are "had" as soon as [`MockTorrent::mark_have`] is called
//! (tests drive this directly) or immediately, if constructed via
//! [`MockTorrent::fully_seeded`]. Piece content is a deterministic
//! byte pattern so tests can assert on it without needing real
//! payload data.

use std::collections::HashSet;

use bytes::Bytes;
use dashmap::DashMap;
use parking_lot::Mutex;

use super::contract::{Alert, PieceId, PieceOffset, PiecePriority, Torrent};

pub struct MockFile {
    pub name: String,
    pub size: u64,
}

struct Inner {
    have: Mutex<HashSet<PieceId>>,
    alerts: Mutex<Vec<Alert>>,
    priorities: DashMap<PieceId, PiecePriority>,
}

/// A single-file-per-offset-range torrent with a fixed piece size,
/// backing [`Torrent`] entirely in memory.
pub struct MockTorrent {
    piece_size: u32,
    files: Vec<MockFile>,
    file_offsets: Vec<u64>,
    total_size: u64,
    inner: Inner,
}

impl MockTorrent {
    pub fn new(files: Vec<MockFile>, piece_size: u32) -> Self {
        let mut file_offsets = Vec::with_capacity(files.len());
        let mut total_size = 0u64;
        for f in &files {
            file_offsets.push(total_size);
            total_size += f.size;
        }
        let num_pieces = total_size.div_ceil(piece_size as u64) as u32;
        Self {
            piece_size,
            files,
            file_offsets,
            total_size,
            inner: Inner {
                have: Mutex::new(HashSet::new()),
                alerts: Mutex::new(Vec::new()),
                priorities: DashMap::with_capacity(num_pieces as usize),
            },
        }
    }

    /// Convenience constructor: every piece is already downloaded, as
    /// if streaming from a fully-seeded swarm.
    pub fn fully_seeded(files: Vec<MockFile>, piece_size: u32) -> Self {
        let t = Self::new(files, piece_size);
        let mut have = t.inner.have.lock();
        for p in 0..t.num_pieces() {
            have.insert(p);
        }
        drop(have);
        t
    }

    pub fn mark_have(&self, piece_id: PieceId) {
        self.inner.have.lock().insert(piece_id);
    }

    fn file_abs_offset(&self, file_ind: usize) -> u64 {
        self.file_offsets[file_ind]
    }

    /// Deterministic synthetic content for a piece: `piece_id` repeated
    /// to fill the piece's size (the last piece is shorter).
    fn piece_bytes(&self, piece_id: PieceId) -> Bytes {
        let size = self.piece_size(piece_id) as usize;
        Bytes::from(vec![(piece_id % 256) as u8; size])
    }
}

impl Torrent for MockTorrent {
    fn piece_of(&self, file_ind: usize, byte_offset: u64) -> anyhow::Result<PieceOffset> {
        let file = self
            .files
            .get(file_ind)
            .ok_or_else(|| anyhow::anyhow!("no such file index {file_ind}"))?;
        if byte_offset > file.size {
            anyhow::bail!("byte_offset {byte_offset} beyond file size {}", file.size);
        }
        let abs = self.file_abs_offset(file_ind) + byte_offset;
        let piece_id = (abs / self.piece_size as u64) as PieceId;
        let offset = (abs % self.piece_size as u64) as u32;
        Ok(PieceOffset { piece_id, offset })
    }

    fn piece_size(&self, piece_id: PieceId) -> u32 {
        let start = piece_id as u64 * self.piece_size as u64;
        let remaining = self.total_size.saturating_sub(start);
        remaining.min(self.piece_size as u64) as u32
    }

    fn have_piece(&self, piece_id: PieceId) -> bool {
        self.inner.have.lock().contains(&piece_id)
    }

    fn set_piece_priority(&self, piece_id: PieceId, priority: PiecePriority) {
        self.inner.priorities.insert(piece_id, priority);
    }

    fn set_piece_deadline(&self, _piece_id: PieceId, _deadline_secs_from_now: f64) {
        // The mock engine has nothing to schedule against; a real
        // implementation forwards this to the swarm's request queue.
    }

    fn clear_deadlines(&self) {}

    fn read_piece(&self, piece_id: PieceId) {
        if !self.have_piece(piece_id) {
            return;
        }
        let buffer = self.piece_bytes(piece_id);
        self.inner
            .alerts
            .lock()
            .push(Alert::ReadPiece { piece_id, buffer });
    }

    fn pop_alerts(&self) -> Vec<Alert> {
        std::mem::take(&mut self.inner.alerts.lock())
    }

    fn num_pieces(&self) -> u32 {
        self.total_size.div_ceil(self.piece_size as u64) as u32
    }

    fn num_files(&self) -> usize {
        self.files.len()
    }

    fn file_size(&self, file_ind: usize) -> u64 {
        self.files[file_ind].size
    }

    fn file_name(&self, file_ind: usize) -> String {
        self.files[file_ind].name.clone()
    }

    fn remove_torrent(&self, _delete_files: bool) {
        self.inner.have.lock().clear();
        self.inner.alerts.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn torrent() -> MockTorrent {
        MockTorrent::fully_seeded(
            vec![
                MockFile { name: "a.mp4".into(), size: 300_000 },
                MockFile { name: "b.mp4".into(), size: 50_000 },
            ],
            100_000,
        )
    }

    #[test]
    fn piece_of_maps_across_file_boundary() {
        let t = torrent();
        let po = t.piece_of(1, 0).unwrap();
        assert_eq!(po.piece_id, 3);
        assert_eq!(po.offset, 0);
    }

    #[test]
    fn last_piece_is_short() {
        let t = torrent();
        assert_eq!(t.num_pieces(), 4);
        assert_eq!(t.piece_size(3), 50_000);
        assert_eq!(t.piece_size(0), 100_000);
    }

    #[test]
    fn read_piece_without_have_emits_nothing() {
        let t = MockTorrent::new(
            vec![MockFile { name: "a.mp4".into(), size: 10 }],
            100_000,
        );
        t.read_piece(0);
        assert!(t.pop_alerts().is_empty());
    }

    #[test]
    fn read_piece_after_have_emits_alert() {
        let t = torrent();
        t.read_piece(0);
        let alerts = t.pop_alerts();
        assert_eq!(alerts.len(), 1);
        assert!(matches!(alerts[0], Alert::ReadPiece { piece_id: 0, .. }));
    }
}
