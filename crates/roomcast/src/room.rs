//! The Room aggregate: Status Handler + Connection Manager + Video
//! Source for one room, with all mutations serialized by the room
//! mutation lock (spec.md §4.4).

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex as SyncMutex;
use tokio::sync::{mpsc, Mutex as AsyncMutex};
use uuid::Uuid;

use crate::commands::{ClientCommand, ServerFrame};
use crate::connection::{ConnId, ConnectionManager, UserInfo};
use crate::error::Result;
use crate::persistence::{RoomRecord, RoomRecordStore};
use crate::video_source::VideoSource;
use crate::video_status::{StatusHandler, VideoStatus};

struct MutableState {
    status: StatusHandler,
    video_source: VideoSource,
}

/// `(room_id, display_name, image_url, status_handler,
/// connection_manager, video_source, last_leave_ts)` (spec.md §3).
/// Exactly one `Room` exists per `room_id` while loaded.
pub struct Room {
    pub room_id: Uuid,
    pub display_name: String,
    pub image_url: String,
    connections: ConnectionManager,
    state: AsyncMutex<MutableState>,
    last_leave_ts: SyncMutex<Option<Instant>>,
    records: Arc<dyn RoomRecordStore>,
}

/// A point-in-time read of a room, for the CRUD HTTP surface
/// (SPEC_FULL.md §A2).
pub struct RoomSnapshot {
    pub room_id: Uuid,
    pub display_name: String,
    pub image_url: String,
    pub current_file_ind: usize,
    pub connection_count: usize,
}

impl Room {
    pub fn new(record: &RoomRecord, video_source: VideoSource, records: Arc<dyn RoomRecordStore>) -> Self {
        let status = StatusHandler::new(VideoStatus::initial(
            record.last_watch_ts,
            record.last_file_ind.max(0) as usize,
        ));
        Self {
            room_id: record.room_id,
            display_name: record.name.clone(),
            image_url: record.image_url.clone(),
            connections: ConnectionManager::new(),
            state: AsyncMutex::new(MutableState { status, video_source }),
            last_leave_ts: SyncMutex::new(None),
            records,
        }
    }

    /// Registers a new viewer as a suspender (resuming to `Paused`
    /// once it leaves, spec.md §4.4), then broadcasts the updated
    /// status and sends the advisory join frames (SPEC_FULL.md §A2).
    pub async fn add_connection(&self, sink: mpsc::UnboundedSender<ServerFrame>, user: UserInfo) -> ConnId {
        let conn_id = self.connections.add(sink, user.clone());
        let user = UserInfo { conn_id, ..user };

        {
            let mut state = self.state.lock().await;
            state.status.add_suspend_by_with_pause_target(conn_id);
            let (kind, video_time) = state.status.to_server_command();

            // Fan-out happens while still holding the lock so that a
            // client's observed frame order always matches the order
            // state transitions were accepted in (spec.md §4.4).
            self.connections.send_to(
                conn_id,
                ServerFrame::UsersSync {
                    users: self.connections.users_snapshot(),
                },
            );
            self.connections
                .broadcast(ServerFrame::UserConnected { user }, &[conn_id]);
            self.connections
                .broadcast(ServerFrame::from_status(kind, video_time), &[]);
        }

        conn_id
    }

    /// Parses `frame`, applies it under the room mutation lock, then
    /// broadcasts the resulting status (and, for an accepted file
    /// change, a `cf` frame) before writing the durable watch state
    /// through (spec.md §4.4).
    pub async fn handle_wire_frame(&self, frame: &str, by: ConnId) -> Result<()> {
        let command = ClientCommand::parse(frame)?;

        let (video_time, file_ind) = {
            let mut state = self.state.lock().await;
            let mut file_change = None;
            match command {
                ClientCommand::Play { video_time } => {
                    state.status.set_video_time(video_time);
                    state.status.set_play();
                }
                ClientCommand::Pause { video_time } => {
                    state.status.set_video_time(video_time);
                    state.status.set_pause();
                }
                ClientCommand::Suspend { video_time } => {
                    state.status.set_video_time(video_time);
                    state.status.add_suspend_by(by);
                }
                ClientCommand::Unsuspend { video_time } => {
                    state.status.set_video_time(video_time);
                    state.status.remove_suspend_by(by);
                }
                ClientCommand::ChangeFile { file_ind } => {
                    if state.video_source.set_file_index(file_ind).is_ok() {
                        state.status.set_current_file_ind(file_ind);
                        file_change = Some(file_ind);
                    }
                }
            }
            let (kind, video_time) = state.status.to_server_command();

            // Held across the broadcast so that concurrent mutations
            // can never be observed out of order by a viewer
            // (spec.md §4.4).
            self.connections
                .broadcast(ServerFrame::from_status(kind, video_time), &[]);
            if let Some(file_ind) = file_change {
                self.connections
                    .broadcast(ServerFrame::ChangeFile { file_ind }, &[]);
            }

            (video_time, state.status.current_file_ind())
        };

        self.records
            .update_watch_state(self.room_id, video_time, file_ind as i64)
            .await?;
        Ok(())
    }

    /// Unregisters `conn_id`, releases its suspend hold, forces
    /// `Paused`, broadcasts, and records `last_leave_ts` (spec.md
    /// §4.4).
    pub async fn remove_connection(&self, conn_id: ConnId) {
        self.connections.remove(conn_id);

        let (video_time, file_ind) = {
            let mut state = self.state.lock().await;
            state.status.remove_suspend_by(conn_id);
            state.status.set_pause();
            let (kind, video_time) = state.status.to_server_command();

            // See `handle_wire_frame`: broadcast while still holding
            // the lock (spec.md §4.4).
            self.connections
                .broadcast(ServerFrame::from_status(kind, video_time), &[]);
            self.connections
                .broadcast(ServerFrame::UserDisconnected { conn_id }, &[]);

            (video_time, state.status.current_file_ind())
        };

        *self.last_leave_ts.lock() = Some(Instant::now());

        let _ = self
            .records
            .update_watch_state(self.room_id, video_time, file_ind as i64)
            .await;
    }

    /// `connection_count == 0 ∧ now − last_leave_ts ≥ period`
    /// (spec.md §3 "Lifecycle").
    pub fn is_inactive(&self, period: Duration) -> bool {
        if self.connections.conn_count() != 0 {
            return false;
        }
        self.last_leave_ts
            .lock()
            .is_some_and(|t| t.elapsed() >= period)
    }

    pub async fn get_video_response(
        &self,
        file_ind: usize,
        range_header: Option<&str>,
    ) -> Result<axum::response::Response> {
        let state = self.state.lock().await;
        state.video_source.get_video_response(file_ind, range_header)
    }

    pub async fn snapshot(&self) -> RoomSnapshot {
        let state = self.state.lock().await;
        RoomSnapshot {
            room_id: self.room_id,
            display_name: self.display_name.clone(),
            image_url: self.image_url.clone(),
            current_file_ind: state.status.current_file_ind(),
            connection_count: self.connections.conn_count(),
        }
    }

    /// Cancels pending streams, releases the torrent handle, and
    /// deletes scratch data (spec.md §4.5 "Eviction").
    pub async fn cleanup(&self) {
        let state = self.state.lock().await;
        state.video_source.cleanup().await;
    }
}
