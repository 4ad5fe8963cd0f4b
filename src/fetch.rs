//! Downloading task inputs.
//!
//! A download only counts when the status is a success, the body is
//! non-empty and its size matches `Content-Length` when one was sent.
//! Anything else removes the partial file and fails with `Fetch`.

use crate::defaults;
use crate::error::{NarratorError, Result};
use futures_util::StreamExt;
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::AsyncWriteExt;

/// Retrieves a remote file into a local path.
#[async_trait::async_trait]
pub trait MediaFetcher: Send + Sync {
    /// Download `url` to `dest`; returns the number of bytes written.
    async fn fetch(&self, url: &str, dest: &Path) -> Result<u64>;

    fn name(&self) -> &str;
}

#[async_trait::async_trait]
impl<T: MediaFetcher + ?Sized> MediaFetcher for Arc<T> {
    async fn fetch(&self, url: &str, dest: &Path) -> Result<u64> {
        (**self).fetch(url, dest).await
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

fn fetch_error(url: &str, message: impl Into<String>) -> NarratorError {
    NarratorError::Fetch {
        url: url.to_string(),
        message: message.into(),
    }
}

/// HTTP client for media bodies: bounded connect and per-read stalls, no
/// deadline on the whole transfer.
pub(crate) fn transfer_client(connect: Duration, read: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .connect_timeout(connect)
        .read_timeout(read)
        .build()
        .map_err(|e| NarratorError::Other(format!("Failed to build HTTP client: {e}")))
}

/// Streaming HTTP downloader.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new() -> Result<Self> {
        Self::with_timeouts(
            Duration::from_secs(defaults::TRANSFER_CONNECT_TIMEOUT_SECS),
            Duration::from_secs(defaults::TRANSFER_READ_TIMEOUT_SECS),
        )
    }

    pub fn with_timeouts(connect: Duration, read: Duration) -> Result<Self> {
        Ok(Self {
            client: transfer_client(connect, read)?,
        })
    }

    async fn download(&self, url: &str, dest: &Path) -> Result<u64> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| fetch_error(url, format!("request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(fetch_error(url, format!("status {}", response.status())));
        }
        let expected = response.content_length();

        let mut file = tokio::fs::File::create(dest)
            .await
            .map_err(|e| fetch_error(url, format!("cannot create {}: {e}", dest.display())))?;
        let mut stream = response.bytes_stream();
        let mut written = 0u64;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| fetch_error(url, format!("read failed: {e}")))?;
            file.write_all(&chunk)
                .await
                .map_err(|e| fetch_error(url, format!("write failed: {e}")))?;
            written += chunk.len() as u64;
        }
        file.flush()
            .await
            .map_err(|e| fetch_error(url, format!("flush failed: {e}")))?;

        if let Some(expected) = expected
            && expected != written
        {
            return Err(fetch_error(
                url,
                format!("truncated body: expected {expected} bytes, got {written}"),
            ));
        }
        if written == 0 {
            return Err(fetch_error(url, "empty body"));
        }
        Ok(written)
    }
}

#[async_trait::async_trait]
impl MediaFetcher for HttpFetcher {
    async fn fetch(&self, url: &str, dest: &Path) -> Result<u64> {
        match self.download(url, dest).await {
            Ok(bytes) => {
                tracing::debug!(url, bytes, dest = %dest.display(), "fetched input");
                Ok(bytes)
            }
            Err(e) => {
                if dest.exists()
                    && let Err(remove_err) = tokio::fs::remove_file(dest).await
                {
                    tracing::warn!(error = %remove_err, "failed to remove partial download");
                }
                Err(e)
            }
        }
    }

    fn name(&self) -> &str {
        "http"
    }
}

/// Mock fetcher for testing
///
/// Serves registered byte payloads by URL; unknown URLs fail with `Fetch`.
#[derive(Debug, Clone, Default)]
pub struct MockFetcher {
    files: Arc<Mutex<HashMap<String, Vec<u8>>>>,
    fetched: Arc<Mutex<Vec<String>>>,
}

impl MockFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(self, url: &str, content: impl Into<Vec<u8>>) -> Self {
        if let Ok(mut files) = self.files.lock() {
            files.insert(url.to_string(), content.into());
        }
        self
    }

    /// URLs fetched so far, in order.
    pub fn fetched(&self) -> Vec<String> {
        self.fetched.lock().map(|f| f.clone()).unwrap_or_default()
    }
}

#[async_trait::async_trait]
impl MediaFetcher for MockFetcher {
    async fn fetch(&self, url: &str, dest: &Path) -> Result<u64> {
        if let Ok(mut fetched) = self.fetched.lock() {
            fetched.push(url.to_string());
        }
        let content = self
            .files
            .lock()
            .ok()
            .and_then(|files| files.get(url).cloned())
            .ok_or_else(|| fetch_error(url, "status 404 Not Found"))?;
        if content.is_empty() {
            return Err(fetch_error(url, "empty body"));
        }
        tokio::fs::write(dest, &content).await?;
        Ok(content.len() as u64)
    }

    fn name(&self) -> &str {
        "mock"
    }
}
