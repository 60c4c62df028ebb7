//! The polymorphic video source (spec.md §3 "VideoSource", §9
//! "Polymorphic video source"): a sum over `{HttpLink, Torrent}`
//! exposing the capability set `{available_files, set_file_index,
//! get_video_response, cleanup}` rather than a class hierarchy.

use std::path::PathBuf;
use std::sync::Arc;

use axum::response::{IntoResponse, Redirect, Response};

use crate::error::{Error, Result};
use crate::torrent::{streaming_response, FileTorrentHandler, Torrent, TorrentSession};

pub enum VideoSource {
    HttpLink {
        url: String,
    },
    Torrent {
        handler: Arc<FileTorrentHandler>,
        /// Per-room scratch directory owning downloaded data, deleted
        /// on cleanup (spec.md §3, §6).
        scratch_dir: PathBuf,
    },
}

impl VideoSource {
    pub fn http_link(url: String) -> Self {
        VideoSource::HttpLink { url }
    }

    pub fn torrent(
        session: &dyn TorrentSession,
        torrent_file_path: &std::path::Path,
        scratch_dir: PathBuf,
        initial_file_ind: usize,
    ) -> Result<Self> {
        let torrent = session.add_torrent(torrent_file_path, &scratch_dir)?;
        let handler = FileTorrentHandler::new(torrent, initial_file_ind);
        Ok(VideoSource::Torrent {
            handler,
            scratch_dir,
        })
    }

    /// File names available for selection via `cf` (spec.md §9).
    pub fn available_files(&self) -> Vec<String> {
        match self {
            VideoSource::HttpLink { .. } => vec![],
            VideoSource::Torrent { handler, .. } => {
                let torrent = handler.torrent();
                (0..torrent.num_files()).map(|i| torrent.file_name(i)).collect()
            }
        }
    }

    /// Validates and applies a new file index. `HttpLink` only ever
    /// has index 0.
    pub fn set_file_index(&self, fi: usize) -> Result<()> {
        match self {
            VideoSource::HttpLink { .. } => {
                if fi != 0 {
                    return Err(Error::InvalidFileIndex(fi));
                }
                Ok(())
            }
            VideoSource::Torrent { handler, .. } => {
                if fi >= handler.torrent().num_files() {
                    return Err(Error::InvalidFileIndex(fi));
                }
                handler.set_file_index(fi);
                Ok(())
            }
        }
    }

    /// Builds the `GET /files/{room_id}/{file_ind}` response: a 303
    /// redirect for `HttpLink`, a 200/206 streamed body for `Torrent`
    /// (spec.md §6).
    pub fn get_video_response(&self, file_ind: usize, range_header: Option<&str>) -> Result<Response> {
        match self {
            VideoSource::HttpLink { url } => {
                if file_ind != 0 {
                    return Err(Error::InvalidFileIndex(file_ind));
                }
                Ok(Redirect::to(url).into_response())
            }
            VideoSource::Torrent { handler, .. } => {
                let torrent = handler.torrent();
                if file_ind >= torrent.num_files() {
                    return Err(Error::InvalidFileIndex(file_ind));
                }
                let file_size = torrent.file_size(file_ind);
                let content_type = mime_guess::from_path(torrent.file_name(file_ind))
                    .first_or_octet_stream()
                    .to_string();
                streaming_response::streaming_response(
                    handler.clone(),
                    file_size,
                    &content_type,
                    range_header,
                )
            }
        }
    }

    /// Releases the torrent handle and deletes scratch data
    /// (spec.md §3, §4.9 `cleanup`).
    pub async fn cleanup(&self) {
        if let VideoSource::Torrent { handler, scratch_dir } = self {
            handler.cleanup();
            if let Err(err) = tokio::fs::remove_dir_all(scratch_dir).await {
                if err.kind() != std::io::ErrorKind::NotFound {
                    tracing::warn!(?scratch_dir, %err, "failed to remove scratch directory");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::torrent::mock::{MockFile, MockTorrent};
    use crate::torrent::MockTorrentSession;

    #[test]
    fn http_link_available_files_is_empty() {
        let src = VideoSource::http_link("https://example.com/movie.mp4".into());
        assert!(src.available_files().is_empty());
    }

    #[test]
    fn http_link_rejects_nonzero_file_index() {
        let src = VideoSource::http_link("https://example.com/movie.mp4".into());
        assert!(matches!(
            src.set_file_index(1),
            Err(Error::InvalidFileIndex(1))
        ));
        assert!(src.set_file_index(0).is_ok());
    }

    #[test]
    fn torrent_lists_files_from_handle() {
        let session = MockTorrentSession::new();
        let torrent = Arc::new(MockTorrent::fully_seeded(
            vec![
                MockFile { name: "a.mp4".into(), size: 10 },
                MockFile { name: "b.mp4".into(), size: 10 },
            ],
            100_000,
        ));
        session.register("room.torrent", torrent);
        let src = VideoSource::torrent(
            &session,
            std::path::Path::new("room.torrent"),
            std::env::temp_dir().join("roomcast-test-scratch"),
            0,
        )
        .unwrap();
        assert_eq!(src.available_files(), vec!["a.mp4", "b.mp4"]);
        assert!(src.set_file_index(5).is_err());
        assert!(src.set_file_index(1).is_ok());
    }
}
