//! The durable room record store (spec.md §3 "RoomRecord (durable)",
//! §6 "Persisted state"). Out of the core's scope per spec.md §1 ("the
//! persistent room/user store, addressed via a small CRUD interface");
//! this module is exactly that small interface, mirroring the shape of
//! `librqbit::session_persistence::SessionPersistenceStore`.

mod sqlite;

pub use sqlite::SqliteRoomRecordStore;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Link,
    Torrent,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Link => "link",
            SourceKind::Torrent => "torrent",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "link" => Some(SourceKind::Link),
            "torrent" => Some(SourceKind::Torrent),
            _ => None,
        }
    }
}

/// One durable row (spec.md §3). `last_file_ind`/`last_watch_ts` are
/// the only wire-command-derived state that's durable — the core does
/// not persist a command log (spec.md §1 non-goals).
#[derive(Debug, Clone)]
pub struct RoomRecord {
    pub room_id: Uuid,
    pub name: String,
    pub image_url: String,
    pub source_kind: SourceKind,
    pub source_data: String,
    pub last_file_ind: i64,
    pub last_watch_ts: f64,
}

#[async_trait]
pub trait RoomRecordStore: Send + Sync {
    async fn create(
        &self,
        name: &str,
        image_url: &str,
        source_kind: SourceKind,
        source_data: &str,
    ) -> Result<RoomRecord>;

    async fn get(&self, room_id: Uuid) -> Result<RoomRecord>;

    async fn list(&self) -> Result<Vec<RoomRecord>>;

    async fn update_watch_state(
        &self,
        room_id: Uuid,
        last_watch_ts: f64,
        last_file_ind: i64,
    ) -> Result<()>;

    async fn update_source(
        &self,
        room_id: Uuid,
        source_kind: SourceKind,
        source_data: &str,
    ) -> Result<()>;

    async fn delete(&self, room_id: Uuid) -> Result<()>;
}
