//! The torrent session collaborator (spec.md §9 "Global state": "the
//! torrent session object... behave[s] as a process-wide singleton").
//!
//! Adding a torrent from a `.torrent` file and giving back a
//! [`Torrent`] handle is the one piece of swarm-engine machinery this
//! workspace doesn't reimplement — bencode parsing, piece hashing, and
//! peer discovery all belong to the out-of-scope embedded BitTorrent
//! library (spec.md §1). Production wiring implements this trait
//! against a real engine; `MockTorrentSession` below is the in-memory
//! stand-in used for tests and local development.

use std::path::Path;
use std::sync::Arc;

use dashmap::DashMap;

use super::contract::Torrent;
use crate::error::{Error, Result};

pub trait TorrentSession: Send + Sync {
    /// Starts downloading the torrent described by the file at
    /// `torrent_file_path` into `scratch_dir`, returning a handle
    /// usable by the File Torrent Handler.
    fn add_torrent(&self, torrent_file_path: &Path, scratch_dir: &Path) -> Result<Arc<dyn Torrent>>;
}

/// Test/dev stand-in: torrents are pre-registered by their `.torrent`
/// file path rather than actually parsed from bencode.
#[derive(Default)]
pub struct MockTorrentSession {
    registry: DashMap<std::path::PathBuf, Arc<dyn Torrent>>,
}

impl MockTorrentSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, torrent_file_path: impl Into<std::path::PathBuf>, torrent: Arc<dyn Torrent>) {
        self.registry.insert(torrent_file_path.into(), torrent);
    }
}

impl TorrentSession for MockTorrentSession {
    fn add_torrent(&self, torrent_file_path: &Path, _scratch_dir: &Path) -> Result<Arc<dyn Torrent>> {
        self.registry
            .get(torrent_file_path)
            .map(|t| t.clone())
            .ok_or_else(|| Error::Other(anyhow::anyhow!("no torrent registered for {torrent_file_path:?}")))
    }
}
