//! Lazily-loaded, in-memory room registry with inactivity eviction
//! (spec.md §4.5).

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::Mutex as AsyncMutex;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::persistence::{RoomRecordStore, SourceKind};
use crate::room::Room;
use crate::torrent::TorrentSession;
use crate::video_source::VideoSource;

/// Filesystem roots a torrent-backed room's scratch data and uploaded
/// `.torrent` blobs live under (spec.md §6 "Persisted state").
#[derive(Clone)]
pub struct StoragePaths {
    pub torrent_save_path: PathBuf,
    pub torrent_files_save_path: PathBuf,
}

/// Keyed by `room_id`. `get` is lazy: on a miss it loads the
/// `RoomRecord`, constructs the `Room` (and its `VideoSource`), and
/// inserts it. A background sweeper evicts inactive rooms every 60
/// seconds (spec.md §4.5).
pub struct RoomStorage {
    records: Arc<dyn RoomRecordStore>,
    torrents: Arc<dyn TorrentSession>,
    paths: StoragePaths,
    inactivity_period: Duration,
    loaded: DashMap<Uuid, Arc<Room>>,
    load_lock: AsyncMutex<()>,
}

const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

impl RoomStorage {
    pub fn new(
        records: Arc<dyn RoomRecordStore>,
        torrents: Arc<dyn TorrentSession>,
        paths: StoragePaths,
        inactivity_period: Duration,
    ) -> Arc<Self> {
        Arc::new(Self {
            records,
            torrents,
            paths,
            inactivity_period,
            loaded: DashMap::new(),
            load_lock: AsyncMutex::new(()),
        })
    }

    /// Spawns the 60-second sweeper task. The returned handle should
    /// be kept alive for the process lifetime; dropping/aborting it
    /// simply stops future evictions.
    pub fn spawn_sweeper(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let this = self.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(SWEEP_INTERVAL);
            loop {
                interval.tick().await;
                this.sweep_once().await;
            }
        })
    }

    async fn sweep_once(&self) {
        let inactive: Vec<Uuid> = self
            .loaded
            .iter()
            .filter(|e| e.value().is_inactive(self.inactivity_period))
            .map(|e| *e.key())
            .collect();
        for room_id in inactive {
            if let Some((_, room)) = self.loaded.remove(&room_id) {
                room.cleanup().await;
                tracing::info!(%room_id, "evicted inactive room");
            }
        }
    }

    /// Lazy `get`: the storage-wide lock only guards the load/insert
    /// step; subsequent room operations use the room's own mutation
    /// lock (spec.md §4.5).
    pub async fn get(&self, room_id: Uuid) -> Result<Arc<Room>> {
        if let Some(room) = self.loaded.get(&room_id) {
            return Ok(room.clone());
        }

        let _guard = self.load_lock.lock().await;
        // Re-check: another task may have loaded it while we waited.
        if let Some(room) = self.loaded.get(&room_id) {
            return Ok(room.clone());
        }

        let record = self.records.get(room_id).await?;
        let video_source = match record.source_kind {
            SourceKind::Link => VideoSource::http_link(record.source_data.clone()),
            SourceKind::Torrent => {
                let scratch_dir = self.paths.torrent_save_path.join(Uuid::new_v4().to_string());
                VideoSource::torrent(
                    self.torrents.as_ref(),
                    std::path::Path::new(&record.source_data),
                    scratch_dir,
                    record.last_file_ind.max(0) as usize,
                )?
            }
        };
        let room = Arc::new(Room::new(&record, video_source, self.records.clone()));
        self.loaded.insert(room_id, room.clone());
        Ok(room)
    }

    /// Explicit delete: full cleanup plus removing the durable record
    /// (spec.md §4.5).
    pub async fn delete(&self, room_id: Uuid) -> Result<()> {
        if let Some((_, room)) = self.loaded.remove(&room_id) {
            room.cleanup().await;
        }
        self.records.delete(room_id).await
    }

    /// Evicts every loaded room and drops their scratch directories
    /// (spec.md §9 "Global state": the shutdown hook invokes this).
    pub async fn full_cleanup(&self) {
        let ids: Vec<Uuid> = self.loaded.iter().map(|e| *e.key()).collect();
        for room_id in ids {
            if let Some((_, room)) = self.loaded.remove(&room_id) {
                room.cleanup().await;
            }
        }
    }

    pub fn max_torrent_file_size_check(&self, size: u64, max: u64) -> Result<()> {
        if size > max {
            return Err(Error::ContentTooLarge { size, max });
        }
        Ok(())
    }

    pub fn storage_paths(&self) -> &StoragePaths {
        &self.paths
    }

    pub fn records(&self) -> &Arc<dyn RoomRecordStore> {
        &self.records
    }

    /// Evicts a loaded room so the next `get` rebuilds its
    /// `VideoSource` from the durable record (spec.md §6: a
    /// `source_data` update doesn't take effect until reload).
    pub async fn reload(&self, room_id: Uuid) -> Result<()> {
        if let Some((_, room)) = self.loaded.remove(&room_id) {
            room.cleanup().await;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::SqliteRoomRecordStore;
    use crate::torrent::MockTorrentSession;

    async fn storage() -> Arc<RoomStorage> {
        let records = Arc::new(SqliteRoomRecordStore::connect("sqlite::memory:").await.unwrap());
        let torrents = Arc::new(MockTorrentSession::new());
        RoomStorage::new(
            records,
            torrents,
            StoragePaths {
                torrent_save_path: std::env::temp_dir(),
                torrent_files_save_path: std::env::temp_dir(),
            },
            Duration::from_secs(600),
        )
    }

    #[tokio::test]
    async fn get_lazily_loads_and_caches() {
        let storage = storage().await;
        let record = storage
            .records
            .create("room-a", "img", SourceKind::Link, "https://example.com/a.mp4")
            .await
            .unwrap();

        let room1 = storage.get(record.room_id).await.unwrap();
        let room2 = storage.get(record.room_id).await.unwrap();
        assert!(Arc::ptr_eq(&room1, &room2));
    }

    #[tokio::test]
    async fn get_missing_room_errors() {
        let storage = storage().await;
        let err = storage.get(Uuid::new_v4()).await;
        assert!(matches!(err, Err(Error::RoomNotFound(_))));
    }

    #[tokio::test]
    async fn delete_removes_record_and_cache() {
        let storage = storage().await;
        let record = storage
            .records
            .create("room-b", "img", SourceKind::Link, "https://example.com/a.mp4")
            .await
            .unwrap();
        storage.get(record.room_id).await.unwrap();
        storage.delete(record.room_id).await.unwrap();
        assert!(storage.get(record.room_id).await.is_err());
    }
}
