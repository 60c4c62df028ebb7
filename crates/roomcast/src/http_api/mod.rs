//! The HTTP surface exposed by the core (spec.md §6, SPEC_FULL.md
//! §A2). Routing, form/JSON parsing, and CORS are the out-of-scope
//! collaborators spec.md §1 names; this module is the thin
//! `axum`-idiomatic wiring over `Room`/`RoomStorage`, matching the
//! free-function-handler style `librqbit::http_api::HttpApi` uses.

mod auth;
mod files;
mod rooms;
mod ws;

pub use auth::{AllowAllAuthenticator, Authenticator, RequireBearerAuthenticator};

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::room_storage::RoomStorage;

#[derive(Clone)]
pub struct AppState {
    pub rooms: Arc<RoomStorage>,
    pub authenticator: Arc<dyn Authenticator>,
    pub max_torrent_file_size: u64,
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/rooms", get(rooms::list_rooms).post(rooms::create_room))
        .route(
            "/rooms/{room_id}",
            get(rooms::get_room).delete(rooms::delete_room),
        )
        .route("/rooms/{room_id}/ws", get(ws::attach_viewer))
        .route("/rooms/{room_id}/torrent", post(rooms::upload_torrent))
        .route("/files/{room_id}/{file_ind}", get(files::stream_file))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
