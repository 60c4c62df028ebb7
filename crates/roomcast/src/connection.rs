//! Per-viewer connection registry (spec.md §3 "Connection", §4.3).

use std::sync::atomic::{AtomicUsize, Ordering};

use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::mpsc;

use crate::commands::ServerFrame;

/// Room-scoped, monotonically increasing viewer identifier.
pub type ConnId = usize;

/// Advisory per-viewer metadata sent in `uc`/`ud`/`ua` frames
/// (spec.md §4.2: these frames don't gate correctness).
#[derive(Debug, Clone, Serialize)]
pub struct UserInfo {
    pub conn_id: ConnId,
    pub display_name: String,
}

/// One outbound text-frame sink, detached from whatever transport
/// accepted it (a websocket in the HTTP layer, an in-memory channel in
/// tests). A broken sink only ever signals this connection's own
/// death — never the manager's (spec.md §4.3 "Send policy").
struct Connection {
    sink: mpsc::UnboundedSender<ServerFrame>,
    user: UserInfo,
}

/// `conn_id -> (channel, user-info)` registry for one room.
///
/// Mutated only by `Room`; fan-out may run concurrently with other
/// room operations but is always awaited together under the room's
/// mutation lock so that broadcast order matches mutation order
/// (spec.md §4.4, §5).
#[derive(Default)]
pub struct ConnectionManager {
    conns: DashMap<ConnId, Connection>,
    next_id: AtomicUsize,
}

impl ConnectionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates the next `conn_id` and registers the sink. The
    /// allocated id always overwrites `user.conn_id`, regardless of
    /// what the caller passed in — callers don't know their id until
    /// this returns it.
    pub fn add(&self, sink: mpsc::UnboundedSender<ServerFrame>, mut user: UserInfo) -> ConnId {
        let conn_id = self.next_id.fetch_add(1, Ordering::Relaxed);
        user.conn_id = conn_id;
        self.conns.insert(conn_id, Connection { sink, user });
        conn_id
    }

    /// Best-effort; tolerant of an absent id.
    pub fn remove(&self, conn_id: ConnId) {
        self.conns.remove(&conn_id);
    }

    /// Single-recipient send. Silently drops if the channel is gone or
    /// broken — the room's read loop will observe the disconnect on
    /// its next receive and call `remove`.
    pub fn send_to(&self, conn_id: ConnId, frame: ServerFrame) {
        if let Some(conn) = self.conns.get(&conn_id) {
            if conn.sink.send(frame).is_err() {
                tracing::debug!(conn_id, "send failed, channel is gone");
            }
        }
    }

    /// Fans `frame` out to every connection except those in `exclude`.
    /// Per-channel failures are logged and never abort siblings.
    pub fn broadcast(&self, frame: ServerFrame, exclude: &[ConnId]) {
        for entry in self.conns.iter() {
            let conn_id = *entry.key();
            if exclude.contains(&conn_id) {
                continue;
            }
            if entry.value().sink.send(frame.clone()).is_err() {
                tracing::debug!(conn_id, "broadcast send failed, channel is gone");
            }
        }
    }

    pub fn conn_count(&self) -> usize {
        self.conns.len()
    }

    pub fn users_snapshot(&self) -> Vec<UserInfo> {
        self.conns.iter().map(|e| e.value().user.clone()).collect()
    }

    #[cfg(test)]
    pub fn contains(&self, conn_id: ConnId) -> bool {
        self.conns.contains_key(&conn_id)
    }
}

/// Test/in-process helper: a standalone `(tx, rx)` pair plus the
/// `UserInfo` `add` needs, so unit tests don't have to stand up a real
/// websocket to exercise the manager.
pub fn test_channel(display_name: &str) -> (mpsc::UnboundedSender<ServerFrame>, mpsc::UnboundedReceiver<ServerFrame>, UserInfo) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        tx,
        rx,
        UserInfo {
            conn_id: 0,
            display_name: display_name.to_string(),
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::ServerFrame;

    #[test]
    fn add_allocates_monotonic_ids() {
        let mgr = ConnectionManager::new();
        let (tx1, _rx1, u1) = test_channel("a");
        let (tx2, _rx2, u2) = test_channel("b");
        let id1 = mgr.add(tx1, u1);
        let id2 = mgr.add(tx2, u2);
        assert!(id2 > id1);
        assert_eq!(mgr.conn_count(), 2);
    }

    #[test]
    fn remove_absent_id_is_tolerated() {
        let mgr = ConnectionManager::new();
        mgr.remove(42);
        assert_eq!(mgr.conn_count(), 0);
    }

    #[test]
    fn broadcast_excludes_listed_ids() {
        let mgr = ConnectionManager::new();
        let (tx1, mut rx1, u1) = test_channel("a");
        let (tx2, mut rx2, u2) = test_channel("b");
        let id1 = mgr.add(tx1, u1);
        let _id2 = mgr.add(tx2, u2);
        mgr.broadcast(ServerFrame::Play { video_time: 1.0 }, &[id1]);
        assert!(rx1.try_recv().is_err());
        assert!(rx2.try_recv().is_ok());
    }

    #[test]
    fn send_to_broken_channel_does_not_panic() {
        let mgr = ConnectionManager::new();
        let (tx, rx, u) = test_channel("a");
        let id = mgr.add(tx, u);
        drop(rx);
        mgr.send_to(id, ServerFrame::Pause { video_time: 0.0 });
    }
}
