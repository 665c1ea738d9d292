//! Streaming file downloads with paced progress reporting.
//!
//! Bytes are written to `<destination>.part` and renamed into place only once
//! the stream completes, so a failed transfer never leaves a truncated file
//! under the final name.

use crate::config::NetworkConfig;
use crate::network::client::HttpClient;
use crate::network::retry::{retry_async, RetryConfig, RetryDecision};
use crate::{ModSyncError, Result};
use futures::StreamExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tracing::{debug, info};

/// Byte progress of one transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferProgress {
    pub downloaded: u64,
    /// Total size when the server announced it.
    pub total: Option<u64>,
}

/// Downloads files over the shared [`HttpClient`].
pub struct FileDownloader {
    http: Arc<HttpClient>,
    progress_interval: Duration,
    temp_suffix: &'static str,
    retry: RetryConfig,
}

impl FileDownloader {
    pub fn new(http: Arc<HttpClient>) -> Self {
        Self {
            http,
            progress_interval: NetworkConfig::DOWNLOAD_PROGRESS_INTERVAL,
            temp_suffix: NetworkConfig::DOWNLOAD_TEMP_SUFFIX,
            retry: RetryConfig::new().with_max_attempts(NetworkConfig::DOWNLOAD_MAX_RETRIES),
        }
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Download `url` to `destination`, retrying transient failures.
    ///
    /// Progress is sent at most once per progress interval, plus a final
    /// update when the stream ends. Returns the number of bytes written.
    pub async fn download(
        &self,
        url: &str,
        destination: &Path,
        progress_tx: Option<mpsc::Sender<TransferProgress>>,
    ) -> Result<u64> {
        let (result, stats) = retry_async(
            &self.retry,
            || self.download_once(url, destination, progress_tx.clone()),
            |e: &ModSyncError| match e {
                ModSyncError::RateLimited {
                    retry_after_secs, ..
                } => RetryDecision::Slow {
                    at_least: retry_after_secs.map(Duration::from_secs),
                },
                e if e.is_retryable() => RetryDecision::Retry,
                _ => RetryDecision::Stop,
            },
        )
        .await;

        if stats.attempts > 1 {
            debug!(
                "Download of {} took {} attempts (total delay: {:?})",
                url, stats.attempts, stats.total_delay
            );
        }

        result
    }

    async fn download_once(
        &self,
        url: &str,
        destination: &Path,
        progress_tx: Option<mpsc::Sender<TransferProgress>>,
    ) -> Result<u64> {
        if let Some(parent) = destination.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| ModSyncError::io_with_path(e, parent))?;
        }

        let temp_path = PathBuf::from(format!("{}{}", destination.display(), self.temp_suffix));

        match self.stream_to(url, &temp_path, progress_tx).await {
            Ok(bytes) => {
                tokio::fs::rename(&temp_path, destination)
                    .await
                    .map_err(|e| ModSyncError::io_with_path(e, destination))?;
                info!("Downloaded {} bytes to {}", bytes, destination.display());
                Ok(bytes)
            }
            Err(e) => {
                let _ = tokio::fs::remove_file(&temp_path).await;
                Err(e)
            }
        }
    }

    async fn stream_to(
        &self,
        url: &str,
        temp_path: &Path,
        progress_tx: Option<mpsc::Sender<TransferProgress>>,
    ) -> Result<u64> {
        let response = self
            .http
            .get_with_timeout(url, NetworkConfig::DOWNLOAD_REQUEST_TIMEOUT)
            .await?;

        let total = response.content_length();
        let mut file = tokio::fs::File::create(temp_path)
            .await
            .map_err(|e| ModSyncError::io_with_path(e, temp_path))?;

        let mut downloaded: u64 = 0;
        let mut last_update = Instant::now();
        let mut stream = response.bytes_stream();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| ModSyncError::Network {
                message: format!("Error reading download stream: {}", e),
                cause: Some(e.to_string()),
            })?;

            file.write_all(&chunk)
                .await
                .map_err(|e| ModSyncError::io_with_path(e, temp_path))?;
            downloaded += chunk.len() as u64;

            if last_update.elapsed() >= self.progress_interval {
                if let Some(ref tx) = progress_tx {
                    let _ = tx.send(TransferProgress { downloaded, total }).await;
                }
                last_update = Instant::now();
            }
        }

        file.flush()
            .await
            .map_err(|e| ModSyncError::io_with_path(e, temp_path))?;

        if downloaded == 0 {
            return Err(ModSyncError::UpstreamTransient {
                message: format!("empty download body from {}", url),
            });
        }

        if let Some(ref tx) = progress_tx {
            let _ = tx.send(TransferProgress { downloaded, total }).await;
        }

        Ok(downloaded)
    }
}
