//! HTTP range/206 response driven by the File Torrent Handler
//! (spec.md §4.10). Client disconnect naturally cancels the body
//! stream (axum drops it), which drops every `PieceLease` still in
//! flight and runs its `release` — no separate disconnect watcher is
//! needed on top of that (spec.md §9 "Cancellation discipline").

use std::sync::Arc;

use axum::body::Body;
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use futures::stream::{self, Stream, StreamExt};
use http::{header, HeaderMap, HeaderValue, StatusCode};
use rand::RngCore;

use super::file_handler::FileTorrentHandler;
use crate::error::{Error, Result};

/// `bytes=a-b[, c-d...]` parsed into inclusive `(start, end)` pairs.
/// An omitted end (`bytes=1000-`) runs to end of file.
pub fn parse_range_header(value: &str, file_size: u64) -> Result<Vec<(u64, u64)>> {
    let spec = value
        .strip_prefix("bytes=")
        .ok_or_else(|| Error::ParseFailed(format!("unsupported range unit: {value:?}")))?;

    spec.split(',')
        .map(|part| {
            let part = part.trim();
            let (start, end) = part
                .split_once('-')
                .ok_or_else(|| Error::ParseFailed(format!("malformed range part {part:?}")))?;
            let start: u64 = start
                .parse()
                .map_err(|_| Error::ParseFailed(format!("bad range start in {part:?}")))?;
            let end: u64 = if end.is_empty() {
                file_size.saturating_sub(1)
            } else {
                end.parse()
                    .map_err(|_| Error::ParseFailed(format!("bad range end in {part:?}")))?
            };
            Ok((start, end.min(file_size.saturating_sub(1))))
        })
        .collect()
}

fn boundary_nonce() -> String {
    let mut bytes = [0u8; 13];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

fn content_stream(
    handler: &Arc<FileTorrentHandler>,
    start: u64,
    end_inclusive: u64,
) -> Result<impl Stream<Item = Result<Bytes>>> {
    handler.iter_pieces(start, end_inclusive + 1)
}

/// No `Range` header: 200, full body, no `Content-Range`.
pub fn full_response(
    handler: Arc<FileTorrentHandler>,
    file_size: u64,
    content_type: &str,
) -> Result<Response> {
    let body = content_stream(&handler, 0, file_size.saturating_sub(1))?;
    let mut headers = HeaderMap::new();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_str(content_type).unwrap());
    headers.insert(
        header::CONTENT_LENGTH,
        HeaderValue::from_str(&file_size.to_string()).unwrap(),
    );
    headers.insert(header::ACCEPT_RANGES, HeaderValue::from_static("bytes"));
    Ok((
        StatusCode::OK,
        headers,
        Body::from_stream(body.map(|r| r.map_err(std::io::Error::other))),
    )
        .into_response())
}

/// A single `bytes=a-b` range: 206 with `Content-Range`.
pub fn single_range_response(
    handler: Arc<FileTorrentHandler>,
    file_size: u64,
    content_type: &str,
    start: u64,
    end_inclusive: u64,
) -> Result<Response> {
    let body = content_stream(&handler, start, end_inclusive)?;
    let mut headers = HeaderMap::new();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_str(content_type).unwrap());
    headers.insert(
        header::CONTENT_LENGTH,
        HeaderValue::from_str(&(end_inclusive - start + 1).to_string()).unwrap(),
    );
    headers.insert(
        header::CONTENT_RANGE,
        HeaderValue::from_str(&format!("bytes {start}-{end_inclusive}/{file_size}")).unwrap(),
    );
    headers.insert(header::ACCEPT_RANGES, HeaderValue::from_static("bytes"));
    Ok((
        StatusCode::PARTIAL_CONTENT,
        headers,
        Body::from_stream(body.map(|r| r.map_err(std::io::Error::other))),
    )
        .into_response())
}

/// Multiple ranges: 206 `multipart/byteranges`.
pub fn multi_range_response(
    handler: Arc<FileTorrentHandler>,
    file_size: u64,
    content_type: &str,
    ranges: Vec<(u64, u64)>,
) -> Result<Response> {
    let boundary = boundary_nonce();
    let content_type = content_type.to_string();

    let mut part_streams: Vec<stream::BoxStream<'static, Result<Bytes>>> = Vec::new();
    for (start, end_inclusive) in ranges {
        let header_text = format!(
            "--{boundary}\nContent-Type: {content_type}\nContent-Range: bytes {start}-{end_inclusive}/{file_size}\n\n"
        );
        let header_chunk: Result<Bytes> = Ok(Bytes::from(header_text.into_bytes()));
        let body = content_stream(&handler, start, end_inclusive)?;
        let trailer: Result<Bytes> = Ok(Bytes::from_static(b"\n"));
        part_streams.push(
            stream::once(async move { header_chunk })
                .chain(body)
                .chain(stream::once(async move { trailer }))
                .boxed(),
        );
    }
    let closing = format!("\n--{boundary}--\n");
    part_streams.push(stream::once(async move { Ok(Bytes::from(closing.into_bytes())) }).boxed());

    let full_body = stream::iter(part_streams).flatten();

    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(&format!("multipart/byteranges; boundary={boundary}")).unwrap(),
    );
    headers.insert(header::ACCEPT_RANGES, HeaderValue::from_static("bytes"));
    Ok((
        StatusCode::PARTIAL_CONTENT,
        headers,
        Body::from_stream(full_body.map(|r| r.map_err(std::io::Error::other))),
    )
        .into_response())
}

/// Dispatches to the three shapes based on the request's `Range`
/// header, if any (spec.md §4.10, §6).
pub fn streaming_response(
    handler: Arc<FileTorrentHandler>,
    file_size: u64,
    content_type: &str,
    range_header: Option<&str>,
) -> Result<Response> {
    let Some(range_header) = range_header else {
        return full_response(handler, file_size, content_type);
    };
    let ranges = parse_range_header(range_header, file_size)?;
    match ranges.as_slice() {
        [] => Err(Error::ParseFailed("empty Range header".into())),
        [(start, end)] => single_range_response(handler, file_size, content_type, *start, *end),
        _ => multi_range_response(handler, file_size, content_type, ranges),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_single_range() {
        let ranges = parse_range_header("bytes=1000000-1999999", 5_000_000).unwrap();
        assert_eq!(ranges, vec![(1_000_000, 1_999_999)]);
    }

    #[test]
    fn parses_open_ended_range() {
        let ranges = parse_range_header("bytes=1000-", 2000).unwrap();
        assert_eq!(ranges, vec![(1000, 1999)]);
    }

    #[test]
    fn parses_multi_range() {
        let ranges = parse_range_header("bytes=0-99, 200-299", 1000).unwrap();
        assert_eq!(ranges, vec![(0, 99), (200, 299)]);
    }

    #[test]
    fn rejects_non_bytes_unit() {
        assert!(parse_range_header("items=0-1", 100).is_err());
    }
}
