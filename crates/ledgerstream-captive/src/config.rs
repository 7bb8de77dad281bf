//! Static configuration for a captive core instance.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use ledgerstream_core::checkpoint::DEFAULT_CHECKPOINT_FREQUENCY;

/// Configuration for a `CaptiveCore` instance.
///
/// One instance is constructed per process; every prepared range spawns a
/// fresh subprocess from the same configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptiveConfig {
    /// File path to the core binary.
    pub binary_path: PathBuf,
    /// Network passphrase the core connects with.
    pub network_passphrase: String,
    /// History archive base URLs, tried in rotation.
    pub history_archive_urls: Vec<String>,
    /// Number of ledgers between checkpoints; 0 falls back to the default.
    pub checkpoint_frequency: u32,
    /// Base directory for the core's scratch storage. Each runner gets an
    /// exclusive subdirectory, removed on teardown. System temp if unset.
    pub storage_path: Option<PathBuf>,
    /// Operator-provided core config file, passed through as `--conf`.
    /// Generating this file is the operator's concern, not ours.
    pub config_path: Option<PathBuf>,
}

impl Default for CaptiveConfig {
    fn default() -> Self {
        Self {
            binary_path: PathBuf::from("core"),
            network_passphrase: String::new(),
            history_archive_urls: vec![],
            checkpoint_frequency: DEFAULT_CHECKPOINT_FREQUENCY,
            storage_path: None,
            config_path: None,
        }
    }
}
