//! The read-only archive interface the ingestion core consumes.

use async_trait::async_trait;

use ledgerstream_core::meta::LedgerHeaderEntry;

use crate::error::ArchiveError;
use crate::state::HistoryArchiveState;

/// A read-only history archive.
///
/// Implementations include `HttpArchive` (one remote endpoint),
/// `ArchivePool` (failover over several), and `MemoryArchive` (tests).
#[async_trait]
pub trait HistoryArchive: Send + Sync {
    /// Fetch the archive's root state document.
    async fn root_state(&self) -> Result<HistoryArchiveState, ArchiveError>;

    /// Fetch the header entry for a single ledger.
    async fn ledger_header(&self, sequence: u32) -> Result<LedgerHeaderEntry, ArchiveError>;
}
