//! Crate-wide error type and the HTTP-facing wrapper around it.
//!
//! Mirrors the split the teacher uses between `librqbit::Error` (a
//! `thiserror` enum of concrete failure modes) and `librqbit::ApiError`
//! (a thin wrapper that knows how to become an HTTP response).

use axum::response::{IntoResponse, Response};
use http::StatusCode;

/// Failures that can occur while running the room sync engine or the
/// torrent streamer. Every variant here is local to a command, a
/// range, or a room — none of them are process-fatal (spec.md §7).
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("malformed command argument: {0}")]
    ParseFailed(String),

    #[error("unknown command prefix: {0}")]
    UnknownCommand(String),

    #[error("room {0} not found")]
    RoomNotFound(uuid::Uuid),

    #[error("a room named {0:?} already exists")]
    DuplicateRoomName(String),

    #[error("invalid file index {0}")]
    InvalidFileIndex(usize),

    #[error("timed out waiting for piece {piece} to be downloaded")]
    PieceHaveTimeout { piece: u32 },

    #[error("timed out waiting for piece {piece} to be read back")]
    PieceReadTimeout { piece: u32 },

    #[error("uploaded torrent file is {size} bytes, exceeding the {max} byte limit")]
    ContentTooLarge { size: u64, max: u64 },

    #[error("missing or invalid auth token")]
    Unauthorized,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// HTTP-facing wrapper, analogous to `librqbit::ApiError`: carries the
/// status code a given `Error` should surface as, independent of how
/// the error reads in logs.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    error: Error,
}

impl ApiError {
    pub fn new(status: StatusCode, error: Error) -> Self {
        Self { status, error }
    }
}

impl From<Error> for ApiError {
    fn from(error: Error) -> Self {
        let status = match &error {
            Error::ParseFailed(_) | Error::UnknownCommand(_) | Error::InvalidFileIndex(_) => {
                StatusCode::BAD_REQUEST
            }
            Error::RoomNotFound(_) => StatusCode::NOT_FOUND,
            Error::DuplicateRoomName(_) => StatusCode::BAD_REQUEST,
            Error::PieceHaveTimeout { .. } | Error::PieceReadTimeout { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            Error::ContentTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            Error::Unauthorized => StatusCode::UNAUTHORIZED,
            Error::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self { status, error }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        tracing::debug!(status = %self.status, error = %self.error, "request failed");
        let body = serde_json::json!({ "error": self.error.to_string() });
        (self.status, axum::Json(body)).into_response()
    }
}
