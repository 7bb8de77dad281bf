//! In-memory archive for tests and local development.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use ledgerstream_core::meta::LedgerHeaderEntry;

use crate::archive::HistoryArchive;
use crate::error::ArchiveError;
use crate::state::HistoryArchiveState;

/// An archive held entirely in memory.
pub struct MemoryArchive {
    state: Mutex<HistoryArchiveState>,
    headers: Mutex<HashMap<u32, LedgerHeaderEntry>>,
    header_requests: AtomicUsize,
}

impl MemoryArchive {
    /// Create an archive reporting `current_ledger` as its latest checkpoint.
    pub fn new(current_ledger: u32) -> Self {
        Self {
            state: Mutex::new(HistoryArchiveState {
                version: 1,
                server: "memory".into(),
                current_ledger,
                network_passphrase: None,
            }),
            headers: Mutex::new(HashMap::new()),
            header_requests: AtomicUsize::new(0),
        }
    }

    pub fn set_current_ledger(&self, current_ledger: u32) {
        self.state.lock().unwrap().current_ledger = current_ledger;
    }

    pub fn put_header(&self, entry: LedgerHeaderEntry) {
        self.headers
            .lock()
            .unwrap()
            .insert(entry.header.ledger_seq, entry);
    }

    /// Number of `ledger_header` calls served so far.
    pub fn header_requests(&self) -> usize {
        self.header_requests.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl HistoryArchive for MemoryArchive {
    async fn root_state(&self) -> Result<HistoryArchiveState, ArchiveError> {
        Ok(self.state.lock().unwrap().clone())
    }

    async fn ledger_header(&self, sequence: u32) -> Result<LedgerHeaderEntry, ArchiveError> {
        self.header_requests.fetch_add(1, Ordering::SeqCst);
        self.headers
            .lock()
            .unwrap()
            .get(&sequence)
            .cloned()
            .ok_or(ArchiveError::HeaderNotFound { sequence })
    }
}
