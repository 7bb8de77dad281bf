//! ledgerstream-captive — the captive-core ledger backend.
//!
//! Runs an external consensus core as a subprocess, streams its ledger-close
//! metadata off a pipe, and serves it to callers as a gap-free, hash-chained,
//! strictly sequential stream.
//!
//! # Architecture
//!
//! ```text
//! CaptiveCore (orchestrator state machine)
//!     ├── CoreRunner        subprocess + meta-pipe reader + supervision
//!     ├── HistoryArchive    validates ranges, derives resume anchors
//!     ├── TrustedHashStore  optional verified-hash shortcut for anchors
//!     └── CloseHandle       cross-task shutdown signal
//! ```
//!
//! Except for `CloseHandle`, the backend is driven by a single sequential
//! caller: prepare a range, then read ledgers in non-decreasing order. Any
//! desynchronization tears the subprocess down and the caller recovers by
//! preparing a fresh range.

pub mod backend;
pub mod config;
pub mod error;
pub mod hash_store;
pub mod runner;

pub use backend::{CaptiveCore, CloseHandle, RunnerFactory};
pub use config::CaptiveConfig;
pub use error::CaptiveError;
pub use hash_store::{MemoryHashStore, TrustedHashStore};
pub use runner::{CoreRunner, MetaResult, RunnerMode, SubprocessRunner};
