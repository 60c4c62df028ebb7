//! Full-stack smoke test: create a room backed by a torrent, attach two
//! viewers, drive play/pause/change-file through `Room`, and stream a
//! byte range back out through the torrent pipeline.

use std::sync::Arc;
use std::time::Duration;

use crate::commands::ServerFrame;
use crate::connection::test_channel;
use crate::persistence::SourceKind;
use crate::room_storage::{RoomStorage, StoragePaths};
use crate::torrent::mock::{MockFile, MockTorrent};
use crate::torrent::MockTorrentSession;

/// Drains every frame currently queued on `rx` without blocking once
/// the queue runs dry, returning the last one seen (if any). Lets the
/// test assert on the terminal state of a broadcast fan-out instead of
/// hand-counting exactly how many advisory frames preceded it.
async fn drain_latest(rx: &mut tokio::sync::mpsc::UnboundedReceiver<ServerFrame>) -> Option<ServerFrame> {
    let mut last = None;
    while let Ok(frame) = rx.try_recv() {
        last = Some(frame);
    }
    if last.is_none() {
        last = tokio::time::timeout(Duration::from_millis(200), rx.recv())
            .await
            .ok()
            .flatten();
        while let Ok(frame) = rx.try_recv() {
            last = Some(frame);
        }
    }
    last
}

#[tokio::test]
async fn two_viewers_sync_playback_and_stream_a_range() {
    let records = Arc::new(
        crate::persistence::SqliteRoomRecordStore::connect("sqlite::memory:")
            .await
            .unwrap(),
    );
    let torrents = Arc::new(MockTorrentSession::new());
    let torrent = Arc::new(MockTorrent::fully_seeded(
        vec![MockFile {
            name: "movie.mp4".into(),
            size: 2_000_000,
        }],
        262_144,
    ));
    torrents.register("room.torrent", torrent);

    let record = records
        .create("movie night", "img.png", SourceKind::Torrent, "room.torrent")
        .await
        .unwrap();

    let storage = RoomStorage::new(
        records.clone(),
        torrents,
        StoragePaths {
            torrent_save_path: std::env::temp_dir(),
            torrent_files_save_path: std::env::temp_dir(),
        },
        Duration::from_secs(600),
    );

    let room = storage.get(record.room_id).await.unwrap();

    let (tx_a, mut rx_a, user_a) = test_channel("alice");
    let conn_a = room.add_connection(tx_a, user_a).await;
    let (tx_b, mut rx_b, user_b) = test_channel("bob");
    let conn_b = room.add_connection(tx_b, user_b).await;

    // Both joiners are held suspended until every suspender releases.
    assert!(matches!(
        drain_latest(&mut rx_b).await,
        Some(ServerFrame::Suspend { .. })
    ));

    room.handle_wire_frame("up 0", conn_a).await.unwrap();
    room.handle_wire_frame("up 0", conn_b).await.unwrap();
    assert!(matches!(
        drain_latest(&mut rx_a).await,
        Some(ServerFrame::Pause { .. })
    ));

    room.handle_wire_frame("pl 5.0", conn_a).await.unwrap();
    assert!(matches!(
        drain_latest(&mut rx_b).await,
        Some(ServerFrame::Play { video_time }) if video_time == 5.0
    ));

    // Changing to the already-current file is a no-op: no new frame.
    room.handle_wire_frame("cf 0", conn_b).await.unwrap();

    let snapshot = room.snapshot().await;
    assert_eq!(snapshot.connection_count, 2);
    assert_eq!(snapshot.current_file_ind, 0);

    let response = room
        .get_video_response(0, Some("bytes=0-99"))
        .await
        .unwrap();
    assert_eq!(response.status(), http::StatusCode::PARTIAL_CONTENT);

    room.remove_connection(conn_a).await;
    room.remove_connection(conn_b).await;
    assert!(room.is_inactive(Duration::from_secs(0)));

    let persisted = records.get(record.room_id).await.unwrap();
    assert_eq!(persisted.last_file_ind, 0);
}
