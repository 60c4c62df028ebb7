//! File-index-scoped view over a [`Torrent`]: byte-range to
//! piece-range iteration (spec.md §4.9).

use std::sync::Arc;

use bytes::Bytes;
use futures::stream::{self, Stream};
use parking_lot::Mutex;

use super::alert_observer::AlertObserver;
use super::contract::{PieceId, PiecePriority, Torrent};
use super::piece_getter::PieceGetter;
use crate::error::{Error, Result};

/// Bound to one `(torrent, file_index)` pair. Owns the Alert Observer
/// and Piece Getter for that torrent; `cleanup` tears both down and
/// releases the torrent handle.
pub struct FileTorrentHandler {
    torrent: Arc<dyn Torrent>,
    observer: AlertObserver,
    piece_getter: Arc<PieceGetter>,
    file_ind: Mutex<usize>,
}

impl FileTorrentHandler {
    pub fn new(torrent: Arc<dyn Torrent>, file_ind: usize) -> Arc<Self> {
        let observer = AlertObserver::spawn(torrent.clone());
        let piece_getter = PieceGetter::new(torrent.clone(), &observer);
        let this = Arc::new(Self {
            torrent,
            observer,
            piece_getter,
            file_ind: Mutex::new(file_ind),
        });
        this.initialize(file_ind);
        this
    }

    fn initialize(&self, file_ind: usize) {
        for p in 0..self.torrent.num_pieces() {
            self.torrent.set_piece_priority(p, PiecePriority::DontDownload);
        }
        let (first, last) = self.file_piece_range(file_ind);
        self.torrent.set_piece_priority(first, PiecePriority::Highest);
        self.torrent.set_piece_priority(last, PiecePriority::Highest);
    }

    fn file_piece_range(&self, file_ind: usize) -> (PieceId, PieceId) {
        let size = self.torrent.file_size(file_ind);
        let start = self.torrent.piece_of(file_ind, 0).expect("file exists").piece_id;
        let last_offset = size.saturating_sub(1);
        let end = self
            .torrent
            .piece_of(file_ind, last_offset)
            .expect("file exists")
            .piece_id;
        (start, end)
    }

    pub fn file_index(&self) -> usize {
        *self.file_ind.lock()
    }

    pub fn torrent(&self) -> &Arc<dyn Torrent> {
        &self.torrent
    }

    /// Atomically clears all deadlines and re-initializes for `fi`.
    pub fn set_file_index(&self, fi: usize) {
        let mut guard = self.file_ind.lock();
        self.torrent.clear_deadlines();
        self.initialize(fi);
        *guard = fi;
    }

    /// The streaming primitive (spec.md §4.9): translates
    /// `[byte_start, byte_end)` into a sequence of piece reads, with
    /// deadlines monotone non-decreasing along the read direction so
    /// the piece nearest the cursor always arrives first.
    pub fn iter_pieces(
        self: &Arc<Self>,
        byte_start: u64,
        byte_end: u64,
    ) -> Result<impl Stream<Item = Result<Bytes>>> {
        let file_ind = self.file_index();
        let start = self.torrent.piece_of(file_ind, byte_start)?;
        let mut end = self.torrent.piece_of(file_ind, byte_end)?;
        if end.offset == 0 {
            end.piece_id -= 1;
            end.offset = self.torrent.piece_size(end.piece_id);
        }

        // Issue deadlines for the whole range up front so the swarm can
        // prioritize every upcoming piece before any of them is read,
        // not just the one the stream cursor has reached so far.
        for p in start.piece_id..=end.piece_id {
            self.torrent
                .set_piece_deadline(p, (p - start.piece_id) as f64);
        }

        let piece_ids: Vec<PieceId> = (start.piece_id..=end.piece_id).collect();
        let total = piece_ids.len();
        let tasks: Vec<(PieceId, f64, Option<usize>, Option<usize>)> = piece_ids
            .into_iter()
            .enumerate()
            .map(|(i, piece_id)| {
                let deadline = (piece_id - start.piece_id) as f64;
                let lo = (i == 0).then_some(start.offset as usize);
                let hi = (i == total - 1).then_some(end.offset as usize);
                (piece_id, deadline, lo, hi)
            })
            .collect();

        let piece_getter = self.piece_getter.clone();
        Ok(stream::unfold(
            (tasks.into_iter(), piece_getter),
            |(mut iter, piece_getter)| async move {
                let (piece_id, deadline, lo, hi) = iter.next()?;
                let chunk = async {
                    let lease = piece_getter.acquire(piece_id, deadline).await?;
                    let buf = lease.buffer().clone();
                    let start = lo.unwrap_or(0);
                    let end = hi.unwrap_or(buf.len());
                    Ok::<Bytes, Error>(buf.slice(start..end))
                }
                .await;
                Some((chunk, (iter, piece_getter)))
            },
        ))
    }

    pub fn cleanup(&self) {
        self.observer.cleanup();
        self.piece_getter.cleanup();
        self.torrent.remove_torrent(true);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::torrent::mock::{MockFile, MockTorrent};
    use futures::StreamExt;

    fn handler(file_size: u64, piece_size: u32) -> Arc<FileTorrentHandler> {
        let torrent = Arc::new(MockTorrent::fully_seeded(
            vec![MockFile {
                name: "a.mp4".into(),
                size: file_size,
            }],
            piece_size,
        ));
        FileTorrentHandler::new(torrent, 0)
    }

    #[tokio::test]
    async fn iter_pieces_yields_exact_byte_count() {
        let h = handler(1_000_000, 262_144);
        let stream = h.iter_pieces(1_000_000 - 100, 1_000_000).unwrap();
        let chunks: Vec<Bytes> = stream.map(|r| r.unwrap()).collect().await;
        let total: usize = chunks.iter().map(|c| c.len()).sum();
        assert_eq!(total, 100);
    }

    #[tokio::test]
    async fn piece_boundary_end_offset_does_not_emit_empty_piece() {
        let h = handler(524_288, 262_144); // exactly two pieces
        let stream = h.iter_pieces(0, 262_144).unwrap();
        let chunks: Vec<Bytes> = stream.map(|r| r.unwrap()).collect().await;
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].len(), 262_144);
    }

    #[tokio::test]
    async fn single_piece_range_yields_one_chunk() {
        let h = handler(1_000_000, 262_144);
        let stream = h.iter_pieces(10, 20).unwrap();
        let chunks: Vec<Bytes> = stream.map(|r| r.unwrap()).collect().await;
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].len(), 10);
    }

    #[tokio::test]
    async fn set_file_index_reinitializes_priorities() {
        let torrent = Arc::new(MockTorrent::fully_seeded(
            vec![
                MockFile {
                    name: "a.mp4".into(),
                    size: 300_000,
                },
                MockFile {
                    name: "b.mp4".into(),
                    size: 300_000,
                },
            ],
            100_000,
        ));
        let h = FileTorrentHandler::new(torrent, 0);
        assert_eq!(h.file_index(), 0);
        h.set_file_index(1);
        assert_eq!(h.file_index(), 1);
    }
}
