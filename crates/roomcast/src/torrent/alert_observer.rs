//! Polls a [`Torrent`]'s alerts cooperatively and fans them out to
//! dynamically-registered listeners (spec.md §4.7).
//!
//! Rust has no open class hierarchy to dispatch "by concrete type"
//! against, so listener registration is a `tokio::sync::broadcast`
//! subscription: every [`Alert`] reaches every live subscriber, and
//! each subscriber (the Piece Getter, in practice) filters for the
//! piece it cares about. This is the same fan-out shape
//! `TorrentStreams::wake_streams_on_piece_completed` uses in the
//! teacher, generalized from a direct method call to a channel so
//! listeners can come and go without the observer knowing about them.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use super::contract::{Alert, Torrent};

const POLL_INTERVAL: Duration = Duration::from_millis(50);
const ALERT_CHANNEL_CAPACITY: usize = 1024;

pub struct AlertObserver {
    terminate: Arc<AtomicBool>,
    tx: broadcast::Sender<Alert>,
    task: parking_lot::Mutex<Option<JoinHandle<()>>>,
}

impl AlertObserver {
    /// Spawns the background poll loop immediately.
    pub fn spawn(torrent: Arc<dyn Torrent>) -> Self {
        let terminate = Arc::new(AtomicBool::new(false));
        let (tx, _rx) = broadcast::channel(ALERT_CHANNEL_CAPACITY);

        let task_terminate = terminate.clone();
        let task_tx = tx.clone();
        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(POLL_INTERVAL);
            loop {
                interval.tick().await;
                if task_terminate.load(Ordering::Acquire) {
                    break;
                }
                for alert in torrent.pop_alerts() {
                    // No listeners is not an error; alerts are simply
                    // dropped until someone subscribes.
                    let _ = task_tx.send(alert);
                }
            }
        });

        Self {
            terminate,
            tx,
            task: parking_lot::Mutex::new(Some(task)),
        }
    }

    /// Registers a new listener; drop the receiver to unregister.
    pub fn subscribe(&self) -> broadcast::Receiver<Alert> {
        self.tx.subscribe()
    }

    /// Sets the terminate flag; the poll loop exits on its next tick.
    pub fn cleanup(&self) {
        self.terminate.store(true, Ordering::Release);
        if let Some(task) = self.task.lock().take() {
            task.abort();
        }
    }
}

impl Drop for AlertObserver {
    fn drop(&mut self) {
        self.cleanup();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::torrent::mock::{MockFile, MockTorrent};
    use bytes::Bytes;

    #[tokio::test]
    async fn dispatches_alerts_to_subscriber() {
        let torrent = Arc::new(MockTorrent::fully_seeded(
            vec![MockFile {
                name: "a.mp4".into(),
                size: 10,
            }],
            100_000,
        ));
        let observer = AlertObserver::spawn(torrent.clone());
        let mut rx = observer.subscribe();

        torrent.read_piece(0);

        let alert = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("did not receive alert in time")
            .unwrap();
        assert!(matches!(
            alert,
            Alert::ReadPiece { piece_id: 0, buffer } if buffer == Bytes::from(vec![0u8; 10])
        ));
    }

    #[tokio::test]
    async fn cleanup_stops_the_poll_loop() {
        let torrent = Arc::new(MockTorrent::fully_seeded(
            vec![MockFile {
                name: "a.mp4".into(),
                size: 10,
            }],
            100_000,
        ));
        let observer = AlertObserver::spawn(torrent.clone());
        let mut rx = observer.subscribe();
        observer.cleanup();

        torrent.read_piece(0);
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(rx.try_recv().is_err());
    }
}
