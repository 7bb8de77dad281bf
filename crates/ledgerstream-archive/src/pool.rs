//! Failover pool over several history archives.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use ledgerstream_core::checkpoint::CheckpointManager;
use ledgerstream_core::meta::LedgerHeaderEntry;

use crate::archive::HistoryArchive;
use crate::error::ArchiveError;
use crate::http::HttpArchive;
use crate::state::HistoryArchiveState;

/// Rotates requests over a set of archives and falls back to the next one
/// on failure. Archives publish identical content, so any member can answer
/// any request; rotation just spreads load and rides out outages.
pub struct ArchivePool {
    archives: Vec<Arc<dyn HistoryArchive>>,
    cursor: AtomicUsize,
}

impl std::fmt::Debug for ArchivePool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArchivePool")
            .field("archives", &self.archives.len())
            .field("cursor", &self.cursor)
            .finish()
    }
}

impl ArchivePool {
    /// Build a pool from existing archives. Fails on an empty set.
    pub fn new(archives: Vec<Arc<dyn HistoryArchive>>) -> Result<Self, ArchiveError> {
        if archives.is_empty() {
            return Err(ArchiveError::NoArchives);
        }
        Ok(Self {
            archives,
            cursor: AtomicUsize::new(0),
        })
    }

    /// Build a pool of HTTP archives, one per URL.
    pub fn from_urls<I, S>(urls: I, checkpoints: CheckpointManager) -> Result<Self, ArchiveError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(
            urls.into_iter()
                .map(|url| Arc::new(HttpArchive::new(url, checkpoints)) as Arc<dyn HistoryArchive>)
                .collect(),
        )
    }

    pub fn len(&self) -> usize {
        self.archives.len()
    }

    pub fn is_empty(&self) -> bool {
        self.archives.is_empty()
    }

    /// Rotation start index for the next request.
    fn start_index(&self) -> usize {
        self.cursor.fetch_add(1, Ordering::Relaxed) % self.archives.len()
    }
}

#[async_trait]
impl HistoryArchive for ArchivePool {
    async fn root_state(&self) -> Result<HistoryArchiveState, ArchiveError> {
        let start = self.start_index();
        let mut last = String::new();
        for i in 0..self.archives.len() {
            let archive = &self.archives[(start + i) % self.archives.len()];
            match archive.root_state().await {
                Ok(state) => return Ok(state),
                Err(e) => {
                    tracing::warn!(error = %e, "history archive failed root state request, trying next");
                    last = e.to_string();
                }
            }
        }
        Err(ArchiveError::AllArchivesFailed {
            count: self.archives.len(),
            last,
        })
    }

    async fn ledger_header(&self, sequence: u32) -> Result<LedgerHeaderEntry, ArchiveError> {
        let start = self.start_index();
        let mut last = String::new();
        for i in 0..self.archives.len() {
            let archive = &self.archives[(start + i) % self.archives.len()];
            match archive.ledger_header(sequence).await {
                Ok(entry) => return Ok(entry),
                // A transient failure on one archive may succeed on the
                // next; a definitive miss will not.
                Err(e) if e.is_retryable() => {
                    tracing::warn!(sequence, error = %e, "history archive failed header request, trying next");
                    last = e.to_string();
                }
                Err(e) => return Err(e),
            }
        }
        Err(ArchiveError::AllArchivesFailed {
            count: self.archives.len(),
            last,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryArchive;

    struct FailingArchive;

    #[async_trait]
    impl HistoryArchive for FailingArchive {
        async fn root_state(&self) -> Result<HistoryArchiveState, ArchiveError> {
            Err(ArchiveError::Http {
                url: "https://down.example.org".into(),
                reason: "connection refused".into(),
            })
        }

        async fn ledger_header(&self, _sequence: u32) -> Result<LedgerHeaderEntry, ArchiveError> {
            Err(ArchiveError::Http {
                url: "https://down.example.org".into(),
                reason: "connection refused".into(),
            })
        }
    }

    #[test]
    fn empty_pool_is_an_error() {
        let err = ArchivePool::new(vec![]).unwrap_err();
        assert!(matches!(err, ArchiveError::NoArchives));
    }

    #[tokio::test]
    async fn falls_back_past_a_failing_archive() {
        let pool = ArchivePool::new(vec![
            Arc::new(FailingArchive) as Arc<dyn HistoryArchive>,
            Arc::new(MemoryArchive::new(127)) as Arc<dyn HistoryArchive>,
        ])
        .unwrap();

        // Whichever member rotation lands on first, the request must succeed.
        for _ in 0..4 {
            let state = pool.root_state().await.unwrap();
            assert_eq!(state.current_ledger, 127);
        }
    }

    #[tokio::test]
    async fn reports_when_all_archives_fail() {
        let pool = ArchivePool::new(vec![
            Arc::new(FailingArchive) as Arc<dyn HistoryArchive>,
            Arc::new(FailingArchive) as Arc<dyn HistoryArchive>,
        ])
        .unwrap();
        let err = pool.root_state().await.unwrap_err();
        assert!(matches!(
            err,
            ArchiveError::AllArchivesFailed { count: 2, .. }
        ));
    }
}
