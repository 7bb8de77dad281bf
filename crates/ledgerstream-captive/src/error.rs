//! Error taxonomy for the captive backend.

use thiserror::Error;

use ledgerstream_archive::ArchiveError;
use ledgerstream_core::FrameError;

/// Errors surfaced by the captive backend.
///
/// Range-validation errors are returned synchronously from `prepare_range`
/// and require a corrected range. Stream errors (unexpected sequence or
/// hash, core exit, decode fault) are fatal to the session: the subprocess
/// is torn down and recovery requires a fresh `prepare_range`. Nothing is
/// retried internally.
#[derive(Debug, Error)]
pub enum CaptiveError {
    /// Any call after the session closed, or before the first prepare.
    #[error("session is closed, call prepare_range first")]
    Closed,

    /// The core never streams ledger 1; ranges must start at 2 or later.
    #[error("cannot start from ledger 1, start from ledger 2")]
    StartFromLedgerOne,

    #[error("invalid range: from={from} is greater than to={to}")]
    InvalidRange { from: u32, to: u32 },

    #[error("from sequence {from} is greater than max checkpoint available in history archives {latest}")]
    FromBeyondArchive { from: u32, latest: u32 },

    #[error("to sequence {to} is greater than max checkpoint available in history archives {latest}")]
    ToBeyondArchive { to: u32, latest: u32 },

    /// Online requests more than two checkpoint lengths past the archive's
    /// latest checkpoint are almost certainly buggy.
    #[error("trying to start online mode too far in the future (latest checkpoint={latest}), only two checkpoints ahead allowed")]
    TooFarAhead { latest: u32 },

    /// The prior subprocess did not confirm its exit; its storage directory
    /// is still exclusive.
    #[error("the previous core instance is still running")]
    PreviousInstanceRunning,

    /// The stream cannot rewind; sequences must be requested non-decreasing.
    #[error("requested ledger {requested} is behind the stream (expected={expected})")]
    BehindStream { requested: u32, expected: u32 },

    #[error("reading past bounded range (requested sequence={requested}, last ledger in range={last})")]
    PastBoundedRange { requested: u32, last: u32 },

    #[error("unexpected ledger sequence (expected={expected} actual={actual})")]
    UnexpectedSequence { expected: u32, actual: u32 },

    #[error("unexpected first ledger sequence (expected<={expected} actual={actual})")]
    UnexpectedFirstLedger { expected: u32, actual: u32 },

    /// The chain-continuity check failed: the delivered ledger does not
    /// build on the previously delivered one.
    #[error("unexpected previous ledger hash for ledger {sequence} (expected={expected} actual={actual})")]
    UnexpectedPreviousHash {
        sequence: u32,
        expected: String,
        actual: String,
    },

    #[error("core process exited unexpectedly{}", display_reason(reason))]
    CoreExited { reason: Option<String> },

    /// The reader stopped without a recorded exit or error. Should be
    /// unreachable; reported defensively.
    #[error("meta pipe closed unexpectedly")]
    MetaPipeClosed,

    #[error("operation cancelled")]
    Cancelled,

    /// `catchup`/`run_from` called twice on one runner.
    #[error("core runner already started")]
    RunnerStarted,

    #[error("error fast-forwarding to ledger {sequence}")]
    FastForward {
        sequence: u32,
        #[source]
        source: Box<CaptiveError>,
    },

    #[error(transparent)]
    Frame(#[from] FrameError),

    #[error(transparent)]
    Archive(#[from] ArchiveError),

    #[error("trusted hash store error: {0}")]
    HashStore(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

fn display_reason(reason: &Option<String>) -> String {
    match reason {
        Some(reason) => format!(": {reason}"),
        None => String::new(),
    }
}

impl CaptiveError {
    /// Returns `true` when the failure is a voluntary shutdown rather than
    /// a fault, so callers can unwind quietly.
    pub fn is_cancelled(&self) -> bool {
        match self {
            Self::Cancelled => true,
            Self::FastForward { source, .. } => source.is_cancelled(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn core_exited_display() {
        let bare = CaptiveError::CoreExited { reason: None };
        assert_eq!(bare.to_string(), "core process exited unexpectedly");

        let detailed = CaptiveError::CoreExited {
            reason: Some("exit status: 1".into()),
        };
        assert_eq!(
            detailed.to_string(),
            "core process exited unexpectedly: exit status: 1"
        );
    }

    #[test]
    fn cancellation_classification() {
        assert!(CaptiveError::Cancelled.is_cancelled());
        assert!(CaptiveError::FastForward {
            sequence: 2,
            source: Box::new(CaptiveError::Cancelled),
        }
        .is_cancelled());
        assert!(!CaptiveError::Closed.is_cancelled());
    }
}
