//! ledgerstream-archive — read-only access to public history archives.
//!
//! Archives are the untrusted-but-public source of truth for what has been
//! published: the root state document says how far the archive reaches, and
//! per-checkpoint ledger files carry the headers needed to derive resume
//! anchors. Everything here is consumed read-only.
//!
//! ```text
//! ArchivePool ──► HttpArchive (reqwest)   one per configured URL
//!       │
//!       └──────► MemoryArchive           tests / local development
//! ```

pub mod archive;
pub mod error;
pub mod http;
pub mod memory;
pub mod pool;
pub mod state;

pub use archive::HistoryArchive;
pub use error::ArchiveError;
pub use http::{checkpoint_path, HttpArchive};
pub use memory::MemoryArchive;
pub use pool::ArchivePool;
pub use state::HistoryArchiveState;
