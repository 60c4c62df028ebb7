//! `GET /rooms/{room_id}/ws` (spec.md §4.2, §6): the bidirectional
//! viewer channel. One task per connection, split into a reader half
//! (wire frames -> `Room::handle_wire_frame`) and a writer half
//! (`Room`'s broadcast -> outgoing text frames).

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query, State};
use axum::response::Response;
use serde::Deserialize;
use uuid::Uuid;

use super::AppState;
use crate::connection::UserInfo;
use crate::error::ApiError;

#[derive(Debug, Deserialize)]
pub struct AttachQuery {
    #[serde(default = "default_display_name")]
    display_name: String,
    token: Option<String>,
}

fn default_display_name() -> String {
    "viewer".to_string()
}

pub async fn attach_viewer(
    State(state): State<AppState>,
    Path(room_id): Path<Uuid>,
    Query(query): Query<AttachQuery>,
    ws: WebSocketUpgrade,
) -> Result<Response, ApiError> {
    state.authenticator.authenticate(query.token.as_deref())?;
    let room = state.rooms.get(room_id).await?;

    Ok(ws.on_upgrade(move |socket| async move {
        if let Err(err) = run_connection(socket, room, query.display_name).await {
            tracing::debug!(%room_id, %err, "viewer connection ended with an error");
        }
    }))
}

async fn run_connection(
    socket: WebSocket,
    room: std::sync::Arc<crate::room::Room>,
    display_name: String,
) -> crate::error::Result<()> {
    let (mut sink, mut stream) = futures::StreamExt::split(socket);
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();

    let conn_id = room
        .add_connection(
            tx,
            UserInfo {
                conn_id: 0,
                display_name,
            },
        )
        .await;

    let writer = tokio::spawn(async move {
        use futures::SinkExt;
        while let Some(frame) = rx.recv().await {
            if sink.send(Message::Text(frame.to_wire_string().into())).await.is_err() {
                break;
            }
        }
    });

    use futures::StreamExt;
    while let Some(msg) = stream.next().await {
        let msg = match msg {
            Ok(msg) => msg,
            Err(_) => break,
        };
        let text = match msg {
            Message::Text(text) => text,
            Message::Close(_) => break,
            _ => continue,
        };
        if let Err(err) = room.handle_wire_frame(text.as_ref(), conn_id).await {
            tracing::debug!(conn_id, %err, "rejected wire frame");
        }
    }

    writer.abort();
    room.remove_connection(conn_id).await;
    Ok(())
}
