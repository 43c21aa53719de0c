//! Bounded image retrieval
//!
//! Fetches a remote image with a hard per-call timeout and an incremental
//! size check: the body is streamed and counted as it arrives, so an
//! oversized payload is cut off mid-transfer instead of after a full
//! download. No retries here; retry policy belongs to the caller.

use std::time::Duration;

use bytes::{Bytes, BytesMut};
use futures_util::StreamExt;
use reqwest::Url;
use tracing::debug;

use crate::error::FetchError;

/// A retrieved image payload.
#[derive(Debug)]
pub struct FetchedImage {
    pub bytes: Bytes,
    /// Declared Content-Type, when the host sent one
    pub content_type: Option<String>,
}

/// Size- and time-bounded HTTP retrieval.
#[derive(Clone)]
pub struct ResourceFetcher {
    client: reqwest::Client,
    max_bytes: usize,
    timeout: Duration,
}

impl ResourceFetcher {
    pub fn new(client: reqwest::Client, max_bytes: usize, timeout: Duration) -> Self {
        Self {
            client,
            max_bytes,
            timeout,
        }
    }

    /// Retrieve the resource at `url`.
    ///
    /// Empty or malformed URLs are rejected before any I/O. The whole
    /// retrieval (connect, headers, body) races the configured timeout.
    pub async fn fetch(&self, url: &str) -> Result<FetchedImage, FetchError> {
        if url.trim().is_empty() {
            return Err(FetchError::InvalidUrl);
        }
        let url = Url::parse(url).map_err(|_| FetchError::InvalidUrl)?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(FetchError::InvalidUrl);
        }

        match tokio::time::timeout(self.timeout, self.fetch_inner(url)).await {
            Ok(result) => result,
            Err(_) => Err(FetchError::Timeout),
        }
    }

    async fn fetch_inner(&self, url: Url) -> Result<FetchedImage, FetchError> {
        let response = self.client.get(url.clone()).send().await.map_err(|e| {
            if e.is_timeout() {
                FetchError::Timeout
            } else {
                FetchError::Network(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Network(format!(
                "host returned {status} for {url}"
            )));
        }

        // Declared length is a fast path; the streamed count below is the
        // authoritative check since hosts can lie or omit it.
        if let Some(declared) = response.content_length() {
            if declared as usize > self.max_bytes {
                return Err(FetchError::TooLarge(self.max_bytes));
            }
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);

        let mut body = BytesMut::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| {
                if e.is_timeout() {
                    FetchError::Timeout
                } else {
                    FetchError::Network(format!("reading body: {e}"))
                }
            })?;
            if body.len() + chunk.len() > self.max_bytes {
                return Err(FetchError::TooLarge(self.max_bytes));
            }
            body.extend_from_slice(&chunk);
        }

        debug!(url = %url, bytes = body.len(), content_type = content_type.as_deref(), "image fetched");
        Ok(FetchedImage {
            bytes: body.freeze(),
            content_type,
        })
    }
}
