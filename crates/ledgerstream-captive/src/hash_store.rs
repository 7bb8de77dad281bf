//! Trusted ledger-hash lookup.
//!
//! History archives are public and untrusted; a trusted hash store holds
//! hashes the local deployment has already verified, letting an unbounded
//! session resume from a known-good anchor without re-deriving it from an
//! archive.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use ledgerstream_core::meta::LedgerHash;

use crate::error::CaptiveError;

/// A source of previously verified ledger hashes. Optional collaborator;
/// absence falls back to archive-derived hashes.
#[async_trait]
pub trait TrustedHashStore: Send + Sync {
    /// Hash of `sequence` if this store has verified it; `None` on a miss.
    async fn ledger_hash(&self, sequence: u32) -> Result<Option<LedgerHash>, CaptiveError>;

    /// Release any underlying connection. Idempotent.
    async fn close(&self) -> Result<(), CaptiveError>;
}

/// In-memory store for tests and ephemeral deployments.
#[derive(Default)]
pub struct MemoryHashStore {
    hashes: Mutex<HashMap<u32, LedgerHash>>,
    closed: AtomicBool,
}

impl MemoryHashStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&self, sequence: u32, hash: LedgerHash) {
        self.hashes.lock().unwrap().insert(sequence, hash);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TrustedHashStore for MemoryHashStore {
    async fn ledger_hash(&self, sequence: u32) -> Result<Option<LedgerHash>, CaptiveError> {
        Ok(self.hashes.lock().unwrap().get(&sequence).copied())
    }

    async fn close(&self) -> Result<(), CaptiveError> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn hit_and_miss() {
        let store = MemoryHashStore::new();
        store.put(63, LedgerHash([7; 32]));

        assert_eq!(
            store.ledger_hash(63).await.unwrap(),
            Some(LedgerHash([7; 32]))
        );
        assert_eq!(store.ledger_hash(64).await.unwrap(), None);
    }

    #[tokio::test]
    async fn close_marks_the_store() {
        let store = MemoryHashStore::new();
        assert!(!store.is_closed());
        store.close().await.unwrap();
        store.close().await.unwrap();
        assert!(store.is_closed());
    }
}
