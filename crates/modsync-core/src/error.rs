//! Error types for the mod sync engine.
//!
//! Upstream failures are classified so the retry layer can tell transient
//! problems (empty bodies, 5xx, timeouts) from permanent ones, and download
//! failures carry a kind so the caller that queued them can react.

use serde::Serialize;
use std::path::PathBuf;
use thiserror::Error;

/// Why a queued download failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum DownloadFailureKind {
    Network,
    Disk,
    ArchiveFormat,
    Upstream,
    FileNotFound,
}

impl DownloadFailureKind {
    /// Classify the underlying error of a failed download.
    pub fn classify(err: &ModSyncError) -> Self {
        match err {
            ModSyncError::Network { .. }
            | ModSyncError::Timeout(_)
            | ModSyncError::RateLimited { .. }
            | ModSyncError::UpstreamTransient { .. } => DownloadFailureKind::Network,
            ModSyncError::Io { .. } | ModSyncError::Database { .. } => DownloadFailureKind::Disk,
            ModSyncError::UnsupportedArchive { .. } | ModSyncError::Archive { .. } => {
                DownloadFailureKind::ArchiveFormat
            }
            ModSyncError::ModNotFound { .. } => DownloadFailureKind::FileNotFound,
            ModSyncError::DownloadFailed { kind, .. } => *kind,
            _ => DownloadFailureKind::Upstream,
        }
    }
}

/// Main error type for the engine.
#[derive(Debug, Error)]
pub enum ModSyncError {
    // Network errors
    #[error("Network error: {message}")]
    Network {
        message: String,
        /// Optional cause description
        cause: Option<String>,
    },

    #[error("Request timeout after {0:?}")]
    Timeout(std::time::Duration),

    #[error("Rate limited by {service}, retry after {retry_after_secs:?} seconds")]
    RateLimited {
        service: String,
        retry_after_secs: Option<u64>,
    },

    // Upstream content API errors
    #[error("Upstream transient failure: {message}")]
    UpstreamTransient { message: String },

    #[error("Malformed upstream data: {message}")]
    UpstreamMalformed { message: String },

    #[error("Upstream unavailable after {attempts} attempts: {message}")]
    UpstreamUnavailable { attempts: u32, message: String },

    #[error("Upstream returned HTTP {status} for {url}")]
    UpstreamStatus { status: u16, url: String },

    // Database errors
    #[error("Database error: {message}")]
    Database {
        message: String,
        #[source]
        source: Option<rusqlite::Error>,
    },

    #[error("Cache write failed for section {section}: {message}")]
    CacheWriteFailed { section: String, message: String },

    // File system errors
    #[error("IO error at {path:?}: {message}")]
    Io {
        message: String,
        path: Option<PathBuf>,
        #[source]
        source: Option<std::io::Error>,
    },

    // Serialization errors
    #[error("JSON error: {message}")]
    Json {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    // Download and install errors
    #[error("Download of mod {mod_id} file {file_id:?} failed ({kind:?}): {message}")]
    DownloadFailed {
        mod_id: u64,
        file_id: Option<u64>,
        kind: DownloadFailureKind,
        message: String,
    },

    #[error("Download cancelled")]
    DownloadCancelled,

    #[error("Unsupported archive format: {extension}")]
    UnsupportedArchive { extension: String },

    #[error("Archive extraction failed for {path}: {message}")]
    Archive { path: PathBuf, message: String },

    #[error("Mod not found: {id}")]
    ModNotFound { id: String },

    #[error("Priority {priority} is already in use")]
    PriorityInUse { priority: u32 },

    // Configuration errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    // Validation errors
    #[error("Validation error for {field}: {message}")]
    Validation { field: String, message: String },

    #[error("Invalid parameters: {message}")]
    InvalidParams { message: String },

    #[error("Method not found: {method}")]
    MethodNotFound { method: String },

    // Generic errors
    #[error("{0}")]
    Other(String),
}

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, ModSyncError>;

impl From<std::io::Error> for ModSyncError {
    fn from(err: std::io::Error) -> Self {
        ModSyncError::Io {
            message: err.to_string(),
            path: None,
            source: Some(err),
        }
    }
}

impl From<serde_json::Error> for ModSyncError {
    fn from(err: serde_json::Error) -> Self {
        ModSyncError::Json {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl From<rusqlite::Error> for ModSyncError {
    fn from(err: rusqlite::Error) -> Self {
        ModSyncError::Database {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl From<reqwest::Error> for ModSyncError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ModSyncError::Timeout(std::time::Duration::from_secs(0))
        } else {
            ModSyncError::Network {
                message: err.to_string(),
                cause: std::error::Error::source(&err).map(|s| s.to_string()),
            }
        }
    }
}

impl ModSyncError {
    /// Create an IO error with path context.
    pub fn io_with_path(err: std::io::Error, path: impl Into<PathBuf>) -> Self {
        ModSyncError::Io {
            message: err.to_string(),
            path: Some(path.into()),
            source: Some(err),
        }
    }

    /// Convert to a JSON-RPC error code.
    ///
    /// Custom error codes (application-defined, -32000 to -32099):
    /// - -32000: Upstream/network error
    /// - -32002: Mod or file not found
    /// - -32003: Download or install failed
    /// - -32004: Cancelled
    /// - -32005: Validation error
    pub fn to_rpc_error_code(&self) -> i32 {
        match self {
            ModSyncError::Network { .. }
            | ModSyncError::Timeout(_)
            | ModSyncError::RateLimited { .. }
            | ModSyncError::UpstreamTransient { .. }
            | ModSyncError::UpstreamMalformed { .. }
            | ModSyncError::UpstreamUnavailable { .. }
            | ModSyncError::UpstreamStatus { .. } => -32000,

            ModSyncError::ModNotFound { .. } => -32002,

            ModSyncError::DownloadFailed { .. }
            | ModSyncError::UnsupportedArchive { .. }
            | ModSyncError::Archive { .. } => -32003,

            ModSyncError::DownloadCancelled => -32004,

            ModSyncError::Validation { .. } | ModSyncError::PriorityInUse { .. } => -32005,

            ModSyncError::InvalidParams { .. } => -32602,

            ModSyncError::MethodNotFound { .. } => -32601,

            _ => -32603,
        }
    }

    /// Check if this error should trigger a retry.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ModSyncError::Network { .. }
                | ModSyncError::Timeout(_)
                | ModSyncError::RateLimited { .. }
                | ModSyncError::UpstreamTransient { .. }
        )
    }
}
