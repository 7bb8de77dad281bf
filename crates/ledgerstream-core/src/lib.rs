//! ledgerstream-core — foundation types for the captive-core ingestion engine.
//!
//! # Architecture
//!
//! ```text
//! CaptiveCore (ledgerstream-captive)
//!     ├── LedgerRange        (what a caller asks to ingest)
//!     ├── CheckpointManager  (archive-aligned replay boundaries)
//!     ├── LedgerCloseMeta    (one ledger's decoded close record)
//!     └── frame codec        (length-prefixed records on the meta pipe)
//! ```

pub mod checkpoint;
pub mod error;
pub mod frame;
pub mod meta;
pub mod range;

pub use checkpoint::{CheckpointManager, CheckpointRange, DEFAULT_CHECKPOINT_FREQUENCY};
pub use error::FrameError;
pub use meta::{LedgerCloseMeta, LedgerHash, LedgerHeader, LedgerHeaderEntry, TransactionResultMeta};
pub use range::LedgerRange;
