//! Ledger range requests — the unit of work a caller prepares.

use std::fmt;

/// A ledger interval to ingest.
///
/// A bounded range replays a fixed historical window `from..=to`. An
/// unbounded range catches up to `from` and then follows the network live.
/// Ranges are compared structurally to decide whether a requested range is
/// already being served by the current session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LedgerRange {
    from: u32,
    to: u32,
    bounded: bool,
}

impl LedgerRange {
    /// A fixed replay window covering `from..=to`.
    ///
    /// `from <= to` is validated when the range is prepared, not here.
    pub fn bounded(from: u32, to: u32) -> Self {
        Self {
            from,
            to,
            bounded: true,
        }
    }

    /// Catch up to `from`, then stream live indefinitely.
    pub fn unbounded(from: u32) -> Self {
        Self {
            from,
            to: 0,
            bounded: false,
        }
    }

    /// First ledger of the range.
    pub fn from(&self) -> u32 {
        self.from
    }

    /// Last ledger of the range; `None` for unbounded ranges.
    pub fn to(&self) -> Option<u32> {
        self.bounded.then_some(self.to)
    }

    pub fn is_bounded(&self) -> bool {
        self.bounded
    }
}

impl fmt::Display for LedgerRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.bounded {
            write!(f, "[{}, {}]", self.from, self.to)
        } else {
            write!(f, "[{}, latest)", self.from)
        }
    }
}
