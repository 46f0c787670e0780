//! Media download
//!
//! Two ways of fetching file content, both exposed as a [`ChunkStream`] that
//! yields one bounded piece per call:
//!
//! - raw binary content (`files/{id}?alt=media`) is fetched with HTTP `Range`
//!   requests of `chunk_size` bytes; the total comes from `Content-Range`
//! - Google-native documents are exported (`files/{id}/export`) as a single
//!   streamed response read in `chunk_size` pieces; the total comes from
//!   `Content-Length` when the server sends one
//!
//! Nothing here retries. A failed chunk is reported to the caller.

use async_trait::async_trait;
use bridge_traits::http::{HttpClient, HttpMethod, HttpRequest, StreamingResponse};
use bytes::Bytes;
use core_runtime::config::{DEFAULT_CHUNK_SIZE, DEFAULT_DRIVE_API_BASE};
use std::fmt;
use std::sync::Arc;
use tokio::io::AsyncReadExt;
use tracing::{debug, instrument, warn};

use crate::error::{ApiError, Result};

/// Upper bound on an error body read from a stream
const MAX_ERROR_BODY: u64 = 64 * 1024;

/// What to fetch for one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaRequest {
    /// Stored bytes, unchanged.
    Raw { file_id: String },
    /// Google-native document converted to `mime_type`.
    Export { file_id: String, mime_type: String },
}

impl MediaRequest {
    pub fn file_id(&self) -> &str {
        match self {
            MediaRequest::Raw { file_id } | MediaRequest::Export { file_id, .. } => file_id,
        }
    }
}

/// Incremental reader over one file's content.
#[async_trait]
pub trait ChunkStream: Send {
    /// Total size in bytes, when the server disclosed it.
    fn total_bytes(&self) -> Option<u64>;

    /// Next piece of content, or `None` once the content is complete.
    async fn next_chunk(&mut self) -> Result<Option<Bytes>>;
}

/// Opens content streams for remote files.
#[async_trait]
pub trait MediaSource: Send + Sync {
    async fn open(&self, access_token: &str, request: &MediaRequest) -> Result<Box<dyn ChunkStream>>;
}

/// [`MediaSource`] for the Drive v3 API.
#[derive(Clone)]
pub struct DriveMediaSource {
    http_client: Arc<dyn HttpClient>,
    api_base: String,
    chunk_size: usize,
}

impl DriveMediaSource {
    pub fn new(http_client: Arc<dyn HttpClient>) -> Self {
        Self {
            http_client,
            api_base: DEFAULT_DRIVE_API_BASE.to_string(),
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    fn media_url(&self, file_id: &str) -> String {
        format!(
            "{}/files/{}?alt=media",
            self.api_base,
            urlencoding::encode(file_id)
        )
    }

    fn export_url(&self, file_id: &str, mime_type: &str) -> String {
        format!(
            "{}/files/{}/export?mimeType={}",
            self.api_base,
            urlencoding::encode(file_id),
            urlencoding::encode(mime_type)
        )
    }
}

impl fmt::Debug for DriveMediaSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DriveMediaSource")
            .field("api_base", &self.api_base)
            .field("chunk_size", &self.chunk_size)
            .finish()
    }
}

#[async_trait]
impl MediaSource for DriveMediaSource {
    #[instrument(skip(self, access_token), fields(file_id = %request.file_id()))]
    async fn open(&self, access_token: &str, request: &MediaRequest) -> Result<Box<dyn ChunkStream>> {
        match request {
            MediaRequest::Raw { file_id } => {
                let mut download = RangedDownload {
                    http_client: self.http_client.clone(),
                    url: self.media_url(file_id),
                    access_token: access_token.to_string(),
                    chunk_size: self.chunk_size as u64,
                    offset: 0,
                    total: None,
                    pending: None,
                    done: false,
                };
                // The first range tells us the total size and surfaces
                // authorization failures before any local file exists.
                download.pending = download.fetch_range().await?;
                Ok(Box::new(download))
            }
            MediaRequest::Export { file_id, mime_type } => {
                let request = HttpRequest::new(HttpMethod::Get, self.export_url(file_id, mime_type))
                    .bearer_token(access_token);
                let response = self.http_client.open_stream(request).await?;

                if !response.is_success() {
                    return Err(error_from_stream(response).await);
                }

                debug!(total = ?response.content_length, "Export stream opened");
                Ok(Box::new(ExportStream {
                    total: response.content_length,
                    response,
                    chunk_size: self.chunk_size,
                    done: false,
                }))
            }
        }
    }
}

/// Raw content fetched with consecutive `Range` requests.
struct RangedDownload {
    http_client: Arc<dyn HttpClient>,
    url: String,
    access_token: String,
    chunk_size: u64,
    offset: u64,
    total: Option<u64>,
    pending: Option<Bytes>,
    done: bool,
}

impl RangedDownload {
    async fn fetch_range(&mut self) -> Result<Option<Bytes>> {
        if self.done {
            return Ok(None);
        }

        let end = self.offset + self.chunk_size - 1;
        let request = HttpRequest::new(HttpMethod::Get, self.url.clone())
            .bearer_token(&self.access_token)
            .range(self.offset, end);
        let response = self.http_client.execute(request).await?;

        match response.status {
            206 => {
                let content_range = response.header("Content-Range").map(str::to_string);
                if let Some(start) = content_range.as_deref().and_then(content_range_start) {
                    if start != self.offset {
                        return Err(ApiError::Malformed(format!(
                            "range starts at byte {} but {} bytes were received",
                            start, self.offset
                        )));
                    }
                }
                if let Some(total) = content_range.as_deref().and_then(content_range_total) {
                    self.total = Some(total);
                }
                let chunk = response.body;
                self.offset += chunk.len() as u64;
                self.done = chunk.is_empty()
                    || match self.total {
                        Some(total) => self.offset >= total,
                        None => (chunk.len() as u64) < self.chunk_size,
                    };
                Ok(Some(chunk).filter(|chunk| !chunk.is_empty()))
            }
            // Server ignored the range and sent everything
            200 if response.header("Content-Range").is_none() => {
                if self.offset > 0 {
                    return Err(ApiError::Malformed(format!(
                        "whole body sent after {} bytes were received",
                        self.offset
                    )));
                }
                let chunk = response.body;
                self.offset = chunk.len() as u64;
                self.total = Some(self.offset);
                self.done = true;
                Ok(Some(chunk).filter(|chunk| !chunk.is_empty()))
            }
            416 => {
                if self.offset == 0 {
                    debug!("Range not satisfiable on first request: empty file");
                    self.total = Some(0);
                }
                self.done = true;
                Ok(None)
            }
            status if (200..300).contains(&status) => {
                warn!(status = status, "Unexpected success status for ranged download");
                Err(ApiError::Malformed(format!(
                    "unexpected status {} for a range request",
                    status
                )))
            }
            status => Err(ApiError::from_status(status, &response.headers, &response.body)),
        }
    }
}

#[async_trait]
impl ChunkStream for RangedDownload {
    fn total_bytes(&self) -> Option<u64> {
        self.total
    }

    async fn next_chunk(&mut self) -> Result<Option<Bytes>> {
        if let Some(chunk) = self.pending.take() {
            return Ok(Some(chunk));
        }
        self.fetch_range().await
    }
}

/// Exported content read from one streamed response.
struct ExportStream {
    response: StreamingResponse,
    total: Option<u64>,
    chunk_size: usize,
    done: bool,
}

#[async_trait]
impl ChunkStream for ExportStream {
    fn total_bytes(&self) -> Option<u64> {
        self.total
    }

    async fn next_chunk(&mut self) -> Result<Option<Bytes>> {
        if self.done {
            return Ok(None);
        }

        let mut buffer = vec![0u8; self.chunk_size];
        let mut filled = 0;
        while filled < buffer.len() {
            let read = self
                .response
                .body
                .read(&mut buffer[filled..])
                .await
                .map_err(|e| ApiError::Network(e.to_string()))?;
            if read == 0 {
                self.done = true;
                break;
            }
            filled += read;
        }

        if filled == 0 {
            return Ok(None);
        }
        buffer.truncate(filled);
        Ok(Some(Bytes::from(buffer)))
    }
}

/// First byte from a `Content-Range: bytes 0-99/1234` header.
fn content_range_start(value: &str) -> Option<u64> {
    let range = value.trim().strip_prefix("bytes")?.trim_start();
    range.split(['-', '/']).next()?.trim().parse().ok()
}

/// Total size from a `Content-Range: bytes 0-99/1234` header.
fn content_range_total(value: &str) -> Option<u64> {
    value.rsplit('/').next()?.trim().parse().ok()
}

async fn error_from_stream(response: StreamingResponse) -> ApiError {
    let status = response.status;
    let headers = response.headers;
    let mut body = Vec::new();
    if let Err(e) = response.body.take(MAX_ERROR_BODY).read_to_end(&mut body).await {
        debug!(error = %e, "Could not read error body");
    }
    ApiError::from_status(status, &headers, &body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_traits::error::Result as BridgeResult;
    use bridge_traits::http::HttpResponse;
    use mockall::mock;
    use std::collections::HashMap;
    use std::io::Cursor;

    mock! {
        HttpClient {}

        #[async_trait]
        impl HttpClient for HttpClient {
            async fn execute(&self, request: HttpRequest) -> BridgeResult<HttpResponse>;
            async fn open_stream(&self, request: HttpRequest) -> BridgeResult<StreamingResponse>;
        }
    }

    /// Serves `content` honouring the `Range` header like Drive does.
    fn ranged_reply(content: &'static [u8], request: &HttpRequest) -> BridgeResult<HttpResponse> {
        let range = request.headers["Range"].trim_start_matches("bytes=").to_string();
        let (start, end) = range.split_once('-').unwrap();
        let start: usize = start.parse().unwrap();
        let end: usize = end.parse().unwrap();

        if start >= content.len() {
            return Ok(HttpResponse {
                status: 416,
                headers: HashMap::new(),
                body: Bytes::new(),
            });
        }
        let end = end.min(content.len() - 1);
        let mut headers = HashMap::new();
        headers.insert(
            "Content-Range".to_string(),
            format!("bytes {}-{}/{}", start, end, content.len()),
        );
        Ok(HttpResponse {
            status: 206,
            headers,
            body: Bytes::from_static(&content[start..=end]),
        })
    }

    async fn drain(stream: &mut Box<dyn ChunkStream>) -> Vec<Bytes> {
        let mut chunks = Vec::new();
        while let Some(chunk) = stream.next_chunk().await.unwrap() {
            chunks.push(chunk);
        }
        chunks
    }

    #[test]
    fn test_content_range_total() {
        assert_eq!(content_range_total("bytes 0-99/1234"), Some(1234));
        assert_eq!(content_range_total("bytes */1234"), Some(1234));
        assert_eq!(content_range_total("bytes 0-99/*"), None);
    }

    #[tokio::test]
    async fn test_raw_download_in_ranges() {
        let mut http = MockHttpClient::new();
        http.expect_execute()
            .times(3)
            .returning(|request| ranged_reply(b"0123456789", &request));

        let source = DriveMediaSource::new(Arc::new(http))
            .with_api_base("https://drive.test/v3")
            .with_chunk_size(4);
        let mut stream = source
            .open("ya29.t", &MediaRequest::Raw { file_id: "f1".to_string() })
            .await
            .unwrap();

        assert_eq!(stream.total_bytes(), Some(10));
        let chunks = drain(&mut stream).await;
        assert_eq!(
            chunks,
            vec![
                Bytes::from_static(b"0123"),
                Bytes::from_static(b"4567"),
                Bytes::from_static(b"89")
            ]
        );
    }

    fn reply(status: u16, content_range: Option<&str>, body: &'static [u8]) -> BridgeResult<HttpResponse> {
        let mut headers = HashMap::new();
        if let Some(value) = content_range {
            headers.insert("Content-Range".to_string(), value.to_string());
        }
        Ok(HttpResponse {
            status,
            headers,
            body: Bytes::from_static(body),
        })
    }

    #[test]
    fn test_content_range_start() {
        assert_eq!(content_range_start("bytes 4-7/10"), Some(4));
        assert_eq!(content_range_start("bytes */10"), None);
    }

    #[tokio::test]
    async fn test_short_range_keeps_reading_until_total() {
        let mut http = MockHttpClient::new();
        let mut replies = vec![
            reply(206, Some("bytes 0-1/10"), b"01"),
            reply(206, Some("bytes 2-5/10"), b"2345"),
            reply(206, Some("bytes 6-9/10"), b"6789"),
        ]
        .into_iter();
        http.expect_execute()
            .times(3)
            .returning(move |_| replies.next().unwrap());

        let source = DriveMediaSource::new(Arc::new(http)).with_chunk_size(4);
        let mut stream = source
            .open("t", &MediaRequest::Raw { file_id: "f".to_string() })
            .await
            .unwrap();

        assert_eq!(drain(&mut stream).await.concat(), b"0123456789".to_vec());
    }

    #[tokio::test]
    async fn test_whole_body_after_first_range_is_malformed() {
        let mut http = MockHttpClient::new();
        let mut replies = vec![
            reply(206, Some("bytes 0-3/10"), b"0123"),
            reply(200, None, b"0123456789"),
        ]
        .into_iter();
        http.expect_execute()
            .times(2)
            .returning(move |_| replies.next().unwrap());

        let source = DriveMediaSource::new(Arc::new(http)).with_chunk_size(4);
        let mut stream = source
            .open("t", &MediaRequest::Raw { file_id: "f".to_string() })
            .await
            .unwrap();

        assert_eq!(stream.next_chunk().await.unwrap(), Some(Bytes::from_static(b"0123")));
        assert!(matches!(stream.next_chunk().await, Err(ApiError::Malformed(_))));
    }

    #[tokio::test]
    async fn test_range_at_wrong_offset_is_malformed() {
        let mut http = MockHttpClient::new();
        let mut replies = vec![
            reply(206, Some("bytes 0-3/10"), b"0123"),
            reply(206, Some("bytes 0-3/10"), b"0123"),
        ]
        .into_iter();
        http.expect_execute()
            .times(2)
            .returning(move |_| replies.next().unwrap());

        let source = DriveMediaSource::new(Arc::new(http)).with_chunk_size(4);
        let mut stream = source
            .open("t", &MediaRequest::Raw { file_id: "f".to_string() })
            .await
            .unwrap();

        stream.next_chunk().await.unwrap();
        assert!(matches!(stream.next_chunk().await, Err(ApiError::Malformed(_))));
    }

    #[tokio::test]
    async fn test_raw_download_exact_multiple_stops_at_total() {
        let mut http = MockHttpClient::new();
        http.expect_execute()
            .times(2)
            .returning(|request| ranged_reply(b"abcdefgh", &request));

        let source = DriveMediaSource::new(Arc::new(http)).with_chunk_size(4);
        let mut stream = source
            .open("t", &MediaRequest::Raw { file_id: "f".to_string() })
            .await
            .unwrap();

        assert_eq!(drain(&mut stream).await.len(), 2);
    }

    #[tokio::test]
    async fn test_empty_file_range_not_satisfiable() {
        let mut http = MockHttpClient::new();
        http.expect_execute()
            .times(1)
            .returning(|request| ranged_reply(b"", &request));

        let source = DriveMediaSource::new(Arc::new(http)).with_chunk_size(4);
        let mut stream = source
            .open("t", &MediaRequest::Raw { file_id: "empty".to_string() })
            .await
            .unwrap();

        assert_eq!(stream.total_bytes(), Some(0));
        assert!(stream.next_chunk().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_whole_body_without_content_range() {
        let mut http = MockHttpClient::new();
        http.expect_execute().times(1).returning(|_| {
            Ok(HttpResponse {
                status: 200,
                headers: HashMap::new(),
                body: Bytes::from_static(b"whole file"),
            })
        });

        let source = DriveMediaSource::new(Arc::new(http)).with_chunk_size(4);
        let mut stream = source
            .open("t", &MediaRequest::Raw { file_id: "f".to_string() })
            .await
            .unwrap();

        assert_eq!(stream.total_bytes(), Some(10));
        assert_eq!(drain(&mut stream).await, vec![Bytes::from_static(b"whole file")]);
    }

    #[tokio::test]
    async fn test_unauthorized_on_open() {
        let mut http = MockHttpClient::new();
        http.expect_execute().times(1).returning(|_| {
            Ok(HttpResponse {
                status: 401,
                headers: HashMap::new(),
                body: Bytes::new(),
            })
        });

        let source = DriveMediaSource::new(Arc::new(http));
        let result = source
            .open("t", &MediaRequest::Raw { file_id: "f".to_string() })
            .await;

        assert!(matches!(result, Err(ApiError::Unauthorized(_))));
    }

    #[tokio::test]
    async fn test_export_stream_reads_bounded_chunks() {
        let mut http = MockHttpClient::new();
        http.expect_open_stream()
            .times(1)
            .withf(|request| {
                request.url == "https://drive.test/v3/files/doc1/export?mimeType=application%2Fpdf"
            })
            .returning(|_| {
                Ok(StreamingResponse {
                    status: 200,
                    headers: HashMap::new(),
                    content_length: None,
                    body: Box::new(Cursor::new(b"%PDF-1.7 body".to_vec())),
                })
            });

        let source = DriveMediaSource::new(Arc::new(http))
            .with_api_base("https://drive.test/v3/")
            .with_chunk_size(5);
        let mut stream = source
            .open(
                "t",
                &MediaRequest::Export {
                    file_id: "doc1".to_string(),
                    mime_type: "application/pdf".to_string(),
                },
            )
            .await
            .unwrap();

        assert_eq!(stream.total_bytes(), None);
        let chunks = drain(&mut stream).await;
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks.concat(), b"%PDF-1.7 body".to_vec());
    }

    #[tokio::test]
    async fn test_export_error_status() {
        let mut http = MockHttpClient::new();
        http.expect_open_stream().times(1).returning(|_| {
            Ok(StreamingResponse {
                status: 404,
                headers: HashMap::new(),
                content_length: None,
                body: Box::new(Cursor::new(
                    br#"{"error":{"code":404,"message":"File not found: doc1."}}"#.to_vec(),
                )),
            })
        });

        let source = DriveMediaSource::new(Arc::new(http));
        let result = source
            .open(
                "t",
                &MediaRequest::Export {
                    file_id: "doc1".to_string(),
                    mime_type: "application/pdf".to_string(),
                },
            )
            .await;

        assert!(matches!(result, Err(ApiError::NotFound(message)) if message == "File not found: doc1."));
    }
}
