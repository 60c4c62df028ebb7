//! `sqlx`-backed `RoomRecordStore`, the way
//! `librqbit::session_persistence::postgres::PostgresSessionStorage`
//! backs `SessionPersistenceStore` — same shape, generalized from
//! Postgres to whatever `DB_URL` names (SQLite by default, matching
//! the original application's default `DB_URL`).

use async_trait::async_trait;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{FromRow, SqlitePool};
use uuid::Uuid;

use super::{RoomRecord, RoomRecordStore, SourceKind};
use crate::error::{Error, Result};

#[derive(Debug)]
pub struct SqliteRoomRecordStore {
    pool: SqlitePool,
}

#[derive(FromRow)]
struct RoomRow {
    room_id: String,
    name: String,
    image_url: String,
    source_kind: String,
    source_data: String,
    last_file_ind: i64,
    last_watch_ts: f64,
}

impl TryFrom<RoomRow> for RoomRecord {
    type Error = Error;

    fn try_from(row: RoomRow) -> Result<Self> {
        Ok(RoomRecord {
            room_id: Uuid::parse_str(&row.room_id).map_err(|e| Error::Other(e.into()))?,
            name: row.name,
            image_url: row.image_url,
            source_kind: SourceKind::parse(&row.source_kind)
                .ok_or_else(|| Error::Other(anyhow::anyhow!("bad source_kind in db")))?,
            source_data: row.source_data,
            last_file_ind: row.last_file_ind,
            last_watch_ts: row.last_watch_ts,
        })
    }
}

impl SqliteRoomRecordStore {
    pub async fn connect(db_url: &str) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(db_url)
            .await
            .map_err(|e| Error::Other(e.into()))?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS rooms (
                room_id TEXT PRIMARY KEY,
                name TEXT NOT NULL UNIQUE,
                image_url TEXT NOT NULL,
                source_kind TEXT NOT NULL,
                source_data TEXT NOT NULL,
                last_file_ind INTEGER NOT NULL DEFAULT 0,
                last_watch_ts REAL NOT NULL DEFAULT 0
            )",
        )
        .execute(&pool)
        .await
        .map_err(|e| Error::Other(e.into()))?;

        Ok(Self { pool })
    }
}

#[async_trait]
impl RoomRecordStore for SqliteRoomRecordStore {
    async fn create(
        &self,
        name: &str,
        image_url: &str,
        source_kind: SourceKind,
        source_data: &str,
    ) -> Result<RoomRecord> {
        let existing: Option<(i64,)> = sqlx::query_as("SELECT 1 FROM rooms WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| Error::Other(e.into()))?;
        if existing.is_some() {
            return Err(Error::DuplicateRoomName(name.to_string()));
        }

        let room_id = Uuid::new_v4();
        sqlx::query(
            "INSERT INTO rooms (room_id, name, image_url, source_kind, source_data, last_file_ind, last_watch_ts)
             VALUES (?, ?, ?, ?, ?, 0, 0)",
        )
        .bind(room_id.to_string())
        .bind(name)
        .bind(image_url)
        .bind(source_kind.as_str())
        .bind(source_data)
        .execute(&self.pool)
        .await
        .map_err(|e| Error::Other(e.into()))?;

        Ok(RoomRecord {
            room_id,
            name: name.to_string(),
            image_url: image_url.to_string(),
            source_kind,
            source_data: source_data.to_string(),
            last_file_ind: 0,
            last_watch_ts: 0.0,
        })
    }

    async fn get(&self, room_id: Uuid) -> Result<RoomRecord> {
        let row: Option<RoomRow> = sqlx::query_as("SELECT * FROM rooms WHERE room_id = ?")
            .bind(room_id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| Error::Other(e.into()))?;
        row.ok_or(Error::RoomNotFound(room_id))?.try_into()
    }

    async fn list(&self) -> Result<Vec<RoomRecord>> {
        let rows: Vec<RoomRow> = sqlx::query_as("SELECT * FROM rooms")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| Error::Other(e.into()))?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn update_watch_state(
        &self,
        room_id: Uuid,
        last_watch_ts: f64,
        last_file_ind: i64,
    ) -> Result<()> {
        sqlx::query("UPDATE rooms SET last_watch_ts = ?, last_file_ind = ? WHERE room_id = ?")
            .bind(last_watch_ts)
            .bind(last_file_ind)
            .bind(room_id.to_string())
            .execute(&self.pool)
            .await
            .map_err(|e| Error::Other(e.into()))?;
        Ok(())
    }

    async fn update_source(
        &self,
        room_id: Uuid,
        source_kind: SourceKind,
        source_data: &str,
    ) -> Result<()> {
        sqlx::query("UPDATE rooms SET source_kind = ?, source_data = ? WHERE room_id = ?")
            .bind(source_kind.as_str())
            .bind(source_data)
            .bind(room_id.to_string())
            .execute(&self.pool)
            .await
            .map_err(|e| Error::Other(e.into()))?;
        Ok(())
    }

    async fn delete(&self, room_id: Uuid) -> Result<()> {
        sqlx::query("DELETE FROM rooms WHERE room_id = ?")
            .bind(room_id.to_string())
            .execute(&self.pool)
            .await
            .map_err(|e| Error::Other(e.into()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn store() -> SqliteRoomRecordStore {
        SqliteRoomRecordStore::connect("sqlite::memory:")
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn create_then_get_round_trips() {
        let store = store().await;
        let created = store
            .create("movie-night", "https://example.com/a.png", SourceKind::Link, "https://example.com/a.mp4")
            .await
            .unwrap();
        let fetched = store.get(created.room_id).await.unwrap();
        assert_eq!(fetched.name, "movie-night");
        assert_eq!(fetched.source_kind, SourceKind::Link);
    }

    #[tokio::test]
    async fn duplicate_name_is_rejected() {
        let store = store().await;
        store
            .create("dup", "img", SourceKind::Link, "data")
            .await
            .unwrap();
        let err = store.create("dup", "img", SourceKind::Link, "data").await;
        assert!(matches!(err, Err(Error::DuplicateRoomName(_))));
    }

    #[tokio::test]
    async fn update_watch_state_persists() {
        let store = store().await;
        let created = store
            .create("room", "img", SourceKind::Torrent, "a.torrent")
            .await
            .unwrap();
        store
            .update_watch_state(created.room_id, 42.0, 2)
            .await
            .unwrap();
        let fetched = store.get(created.room_id).await.unwrap();
        assert_eq!(fetched.last_file_ind, 2);
        assert!((fetched.last_watch_ts - 42.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn get_missing_room_is_not_found() {
        let store = store().await;
        let err = store.get(Uuid::new_v4()).await;
        assert!(matches!(err, Err(Error::RoomNotFound(_))));
    }
}
