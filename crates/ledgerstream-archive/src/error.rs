//! Error types for archive access.

use thiserror::Error;

/// Errors that can occur while reading from history archives.
#[derive(Debug, Error)]
pub enum ArchiveError {
    /// HTTP request failed (connection refused, timeout, non-2xx status).
    #[error("HTTP error from {url}: {reason}")]
    Http { url: String, reason: String },

    /// Response body could not be decoded.
    #[error("error decoding archive response from {url}: {reason}")]
    Decode { url: String, reason: String },

    /// The archive has no header for the requested ledger.
    #[error("ledger header {sequence} not found in archive")]
    HeaderNotFound { sequence: u32 },

    /// Pool construction requires at least one archive.
    #[error("no history archives provided")]
    NoArchives,

    /// Every archive in the pool failed the request.
    #[error("all {count} history archives failed (last: {last})")]
    AllArchivesFailed { count: usize, last: String },
}

impl ArchiveError {
    /// Returns `true` if another archive in a pool might still succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Http { .. } | Self::Decode { .. })
    }
}
