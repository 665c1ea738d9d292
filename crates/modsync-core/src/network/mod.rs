//! Network utilities for HTTP operations, retries, and downloads.
//!
//! This module provides:
//! - Retry logic with exponential backoff, jitter and slowed rate-limit retries
//! - HTTP client with request pacing and status classification
//! - Streaming file downloader with paced progress

mod client;
mod download;
mod retry;

pub use client::{extract_domain, HttpClient};
pub use download::{FileDownloader, TransferProgress};
pub use retry::{retry_async, RetryConfig, RetryDecision, RetryStats};
