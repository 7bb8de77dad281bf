//! Ledger-close metadata — the decoded record the core emits per ledger.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A 32-byte ledger hash, rendered as lowercase hex.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LedgerHash(pub [u8; 32]);

impl LedgerHash {
    pub const ZERO: LedgerHash = LedgerHash([0; 32]);

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse a 64-character hex string.
    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        let bytes = hex::decode(s)?;
        let bytes: [u8; 32] = bytes
            .try_into()
            .map_err(|_| hex::FromHexError::InvalidStringLength)?;
        Ok(Self(bytes))
    }
}

impl From<[u8; 32]> for LedgerHash {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl fmt::Display for LedgerHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for LedgerHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LedgerHash({})", self.to_hex())
    }
}

/// Decoded ledger header fields the ingestion core relies on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerHeader {
    pub ledger_seq: u32,
    /// Hash of the ledger this one closes on top of — the chain link.
    pub previous_ledger_hash: LedgerHash,
    pub bucket_list_hash: LedgerHash,
    /// Close time in seconds since the epoch.
    pub close_time: u64,
    pub base_fee: u32,
    pub ledger_version: u32,
}

/// A header together with the hash it closes to, as archives store them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerHeaderEntry {
    pub hash: LedgerHash,
    pub header: LedgerHeader,
}

/// Result and meta blobs for one applied transaction. Opaque to the
/// ingestion core; downstream processors decode them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionResultMeta {
    pub result: Vec<u8>,
    pub meta: Vec<u8>,
}

/// One ledger's full state-transition record: the closed header plus the
/// transaction processing that produced it. Atomic immutable data once
/// decoded off the meta pipe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerCloseMeta {
    pub ledger_header: LedgerHeaderEntry,
    pub tx_processing: Vec<TransactionResultMeta>,
}

impl LedgerCloseMeta {
    pub fn ledger_sequence(&self) -> u32 {
        self.ledger_header.header.ledger_seq
    }

    /// Hash of this ledger.
    pub fn ledger_hash(&self) -> LedgerHash {
        self.ledger_header.hash
    }

    /// Hash of the previous ledger — must match the hash of the ledger
    /// delivered immediately before this one.
    pub fn previous_ledger_hash(&self) -> LedgerHash {
        self.ledger_header.header.previous_ledger_hash
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_hex_roundtrip() {
        let hash = LedgerHash([0xab; 32]);
        let hex = hash.to_hex();
        assert_eq!(hex.len(), 64);
        assert_eq!(LedgerHash::from_hex(&hex).unwrap(), hash);
    }

    #[test]
    fn hash_rejects_wrong_length() {
        assert!(LedgerHash::from_hex("abcd").is_err());
        assert!(LedgerHash::from_hex("not hex at all").is_err());
    }

    #[test]
    fn meta_accessors() {
        let meta = LedgerCloseMeta {
            ledger_header: LedgerHeaderEntry {
                hash: LedgerHash([2; 32]),
                header: LedgerHeader {
                    ledger_seq: 7,
                    previous_ledger_hash: LedgerHash([1; 32]),
                    bucket_list_hash: LedgerHash::ZERO,
                    close_time: 35,
                    base_fee: 100,
                    ledger_version: 20,
                },
            },
            tx_processing: vec![],
        };
        assert_eq!(meta.ledger_sequence(), 7);
        assert_eq!(meta.ledger_hash(), LedgerHash([2; 32]));
        assert_eq!(meta.previous_ledger_hash(), LedgerHash([1; 32]));
    }
}
