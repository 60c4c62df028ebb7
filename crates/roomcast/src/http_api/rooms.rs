//! `/rooms` CRUD and `.torrent` upload (spec.md §6, SPEC_FULL.md §A2).

use axum::extract::{Multipart, Path, State};
use axum::Json;
use http::HeaderMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::AppState;
use crate::error::{ApiError, Error};
use crate::persistence::SourceKind;

fn token_of(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
}

#[derive(Debug, Serialize)]
pub struct RoomSummary {
    room_id: Uuid,
    display_name: String,
    image_url: String,
    current_file_ind: usize,
    connection_count: usize,
}

#[derive(Debug, Deserialize)]
pub struct CreateRoomRequest {
    name: String,
    image_url: String,
    source_url: String,
}

pub async fn list_rooms(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<RoomSummary>>, ApiError> {
    state.authenticator.authenticate(token_of(&headers))?;
    let records = state.rooms.records().list().await?;
    let mut summaries = Vec::with_capacity(records.len());
    for record in records {
        let room = state.rooms.get(record.room_id).await?;
        let snapshot = room.snapshot().await;
        summaries.push(RoomSummary {
            room_id: snapshot.room_id,
            display_name: snapshot.display_name,
            image_url: snapshot.image_url,
            current_file_ind: snapshot.current_file_ind,
            connection_count: snapshot.connection_count,
        });
    }
    Ok(Json(summaries))
}

pub async fn create_room(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<CreateRoomRequest>,
) -> Result<Json<RoomSummary>, ApiError> {
    state.authenticator.authenticate(token_of(&headers))?;
    let record = state
        .rooms
        .records()
        .create(
            &request.name,
            &request.image_url,
            SourceKind::Link,
            &request.source_url,
        )
        .await?;
    let room = state.rooms.get(record.room_id).await?;
    let snapshot = room.snapshot().await;
    Ok(Json(RoomSummary {
        room_id: snapshot.room_id,
        display_name: snapshot.display_name,
        image_url: snapshot.image_url,
        current_file_ind: snapshot.current_file_ind,
        connection_count: snapshot.connection_count,
    }))
}

pub async fn get_room(
    State(state): State<AppState>,
    Path(room_id): Path<Uuid>,
    headers: HeaderMap,
) -> Result<Json<RoomSummary>, ApiError> {
    state.authenticator.authenticate(token_of(&headers))?;
    let room = state.rooms.get(room_id).await?;
    let snapshot = room.snapshot().await;
    Ok(Json(RoomSummary {
        room_id: snapshot.room_id,
        display_name: snapshot.display_name,
        image_url: snapshot.image_url,
        current_file_ind: snapshot.current_file_ind,
        connection_count: snapshot.connection_count,
    }))
}

pub async fn delete_room(
    State(state): State<AppState>,
    Path(room_id): Path<Uuid>,
    headers: HeaderMap,
) -> Result<(), ApiError> {
    state.authenticator.authenticate(token_of(&headers))?;
    state.rooms.delete(room_id).await?;
    Ok(())
}

/// Accepts a single `.torrent` file under the `torrent` multipart
/// field, rejecting anything over `max_torrent_file_size`
/// (spec.md §6 "Content-too-large").
pub async fn upload_torrent(
    State(state): State<AppState>,
    Path(room_id): Path<Uuid>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<(), ApiError> {
    state.authenticator.authenticate(token_of(&headers))?;

    let mut field = None;
    while let Some(f) = multipart
        .next_field()
        .await
        .map_err(|e| Error::Other(anyhow::anyhow!(e)))?
    {
        if f.name() == Some("torrent") {
            field = Some(f);
            break;
        }
    }
    let field = field.ok_or_else(|| Error::ParseFailed("missing 'torrent' field".to_string()))?;
    let bytes = field
        .bytes()
        .await
        .map_err(|e| Error::Other(anyhow::anyhow!(e)))?;

    state
        .rooms
        .max_torrent_file_size_check(bytes.len() as u64, state.max_torrent_file_size)?;

    let paths = state.rooms.storage_paths();
    tokio::fs::create_dir_all(&paths.torrent_files_save_path).await.map_err(|e| Error::Other(e.into()))?;
    let file_path = paths
        .torrent_files_save_path
        .join(format!("{room_id}.torrent"));
    tokio::fs::write(&file_path, &bytes)
        .await
        .map_err(|e| Error::Other(e.into()))?;

    state
        .rooms
        .records()
        .update_source(
            room_id,
            SourceKind::Torrent,
            file_path.to_string_lossy().as_ref(),
        )
        .await?;
    state.rooms.reload(room_id).await?;
    Ok(())
}
