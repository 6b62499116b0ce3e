//! HTTP transport for the evaluation stream.
//!
//! `FeedSource` is the seam between the driver and the network so the driver
//! can be exercised with scripted bodies.

use std::future::Future;
use std::time::Duration;

use bytes::Bytes;
use futures::StreamExt;
use futures::stream::BoxStream;
use gpstatus_core::RollNumber;
use reqwest::header::{ACCEPT, CACHE_CONTROL, CONTENT_TYPE};
use reqwest::{StatusCode, Url};
use thiserror::Error;

use crate::config::Settings;

/// Endpoint path segment; the roll number is appended as the next segment.
pub const STREAM_PATH: &str = "evaluate-stream";

const EVENT_STREAM_MIME: &str = "text/event-stream";

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("cannot build stream URL from {0}")]
    InvalidUrl(String),

    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("unexpected HTTP status {0}")]
    Status(u16),

    #[error("unexpected content type {0:?}")]
    ContentType(String),

    #[error("stream read failed: {0}")]
    Body(String),
}

/// Body of an opened stream. Dropping it closes the connection.
pub type FeedBody = BoxStream<'static, Result<Bytes, FeedError>>;

/// Opens one evaluation stream per call.
pub trait FeedSource: Send + Sync {
    /// Resolves once the response headers are accepted.
    fn open(&self, roll: &RollNumber) -> impl Future<Output = Result<FeedBody, FeedError>> + Send;
}

/// `{base}/evaluate-stream/{roll}` with the roll number as one encoded segment.
pub fn stream_url(base: &Url, roll: &RollNumber) -> Result<Url, FeedError> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|()| FeedError::InvalidUrl(base.to_string()))?
        .pop_if_empty()
        .push(STREAM_PATH)
        .push(roll.as_str());
    Ok(url)
}

/// Whether a Content-Type header names an event stream (parameters ignored).
pub fn is_event_stream(content_type: &str) -> bool {
    content_type
        .split(';')
        .next()
        .is_some_and(|essence| essence.trim().eq_ignore_ascii_case(EVENT_STREAM_MIME))
}

/// Real transport over reqwest.
pub struct HttpFeed {
    client: reqwest::Client,
    base: Url,
}

impl HttpFeed {
    pub fn new(settings: &Settings) -> Result<Self, FeedError> {
        Self::with_connect_timeout(settings.server.clone(), settings.connect_timeout)
    }

    pub fn with_connect_timeout(base: Url, connect_timeout: Duration) -> Result<Self, FeedError> {
        let client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .user_agent(concat!("gpstatus/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client, base })
    }

    pub fn base(&self) -> &Url {
        &self.base
    }
}

impl FeedSource for HttpFeed {
    fn open(&self, roll: &RollNumber) -> impl Future<Output = Result<FeedBody, FeedError>> + Send {
        let url = stream_url(&self.base, roll);
        let client = self.client.clone();
        async move {
            let url = url?;
            tracing::debug!(%url, "opening evaluation stream");

            let response = client
                .get(url)
                .header(ACCEPT, EVENT_STREAM_MIME)
                .header(CACHE_CONTROL, "no-cache")
                .send()
                .await?;

            // Same acceptance rule as a browser EventSource.
            let status = response.status();
            if status != StatusCode::OK {
                return Err(FeedError::Status(status.as_u16()));
            }
            let content_type = response
                .headers()
                .get(CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .unwrap_or("")
                .to_owned();
            if !is_event_stream(&content_type) {
                return Err(FeedError::ContentType(content_type));
            }

            Ok(response
                .bytes_stream()
                .map(|chunk| chunk.map_err(|e| FeedError::Body(e.to_string())))
                .boxed())
        }
    }
}
