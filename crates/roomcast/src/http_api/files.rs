//! `GET /files/{room_id}/{file_ind}` (spec.md §6): 200/206 streaming
//! for a torrent-backed room, 303 redirect for a link-backed one.

use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};
use http::HeaderMap;
use uuid::Uuid;

use super::AppState;
use crate::error::ApiError;

pub async fn stream_file(
    State(state): State<AppState>,
    Path((room_id, file_ind)): Path<(Uuid, usize)>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let token = headers
        .get(http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));
    state.authenticator.authenticate(token)?;

    let room = state.rooms.get(room_id).await?;
    let range = headers
        .get(http::header::RANGE)
        .and_then(|v| v.to_str().ok());
    let response = room.get_video_response(file_ind, range).await?;
    Ok(response.into_response())
}
