//! The captive-core orchestrator.
//!
//! `CaptiveCore` starts an internal core subprocess responsible for
//! streaming ledger-close data and serves that stream to a caller with the
//! guarantees the subprocess itself does not provide: strictly increasing
//! sequences with no gaps and a verified hash chain. The subprocess is
//! treated as an unreliable source; every delivery is validated.
//!
//! It operates in two modes:
//! - A bounded range starts the core in catchup mode, replaying a fixed
//!   archived window.
//! - An unbounded range first catches up to the starting ledger and then
//!   runs the core normally, following the network.
//!
//! The backend is driven by one sequential caller: prepare a range, then
//! read ledgers in non-decreasing order. Reading the same sequence twice is
//! served from a one-ledger cache. Any fatal condition (sequence or hash
//! mismatch, core exit, decode fault) tears the subprocess down; the caller
//! recovers with a fresh `prepare_range`, which respawns the core from a
//! clean state. Only `CloseHandle` may be used from another task.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use ledgerstream_archive::{ArchivePool, HistoryArchive};
use ledgerstream_core::checkpoint::CheckpointManager;
use ledgerstream_core::meta::{LedgerCloseMeta, LedgerHash};
use ledgerstream_core::range::LedgerRange;

use crate::config::CaptiveConfig;
use crate::error::CaptiveError;
use crate::hash_store::TrustedHashStore;
use crate::runner::{CoreRunner, MetaResult, RunnerMode, SubprocessRunner};

/// Builds a fresh runner for each prepared range. The token is a child of
/// the instance token, so instance shutdown reaches every runner.
pub type RunnerFactory =
    Box<dyn Fn(RunnerMode, CancellationToken) -> Result<Box<dyn CoreRunner>, CaptiveError> + Send + Sync>;

/// Ledger backend streaming from a captive core subprocess.
pub struct CaptiveCore {
    archive: Arc<dyn HistoryArchive>,
    checkpoints: CheckpointManager,
    hash_store: Option<Arc<dyn TrustedHashStore>>,
    runner_factory: RunnerFactory,
    cancel: CancellationToken,

    runner: Option<Box<dyn CoreRunner>>,
    /// Last delivered ledger, kept because callers read the same sequence
    /// several times for different extraction passes.
    cached_meta: Option<LedgerCloseMeta>,
    prepared: Option<LedgerRange>,
    /// Next sequence expected off the pipe; 0 until the first ledger of an
    /// online session arrives.
    next_ledger: u32,
    /// End of the current segment when bounded; `None` when online.
    last_ledger: Option<u32>,
    previous_ledger_hash: Option<LedgerHash>,
}

impl CaptiveCore {
    /// Create a backend that spawns the configured core binary and validates
    /// ranges against the configured history archives.
    pub fn new(
        config: CaptiveConfig,
        hash_store: Option<Arc<dyn TrustedHashStore>>,
    ) -> Result<Self, CaptiveError> {
        let checkpoints = CheckpointManager::new(config.checkpoint_frequency);
        let archive = Arc::new(ArchivePool::from_urls(
            config.history_archive_urls.clone(),
            checkpoints,
        )?);
        let factory: RunnerFactory = Box::new(move |mode, token| {
            Ok(Box::new(SubprocessRunner::new(&config, mode, token)?) as Box<dyn CoreRunner>)
        });
        Ok(Self::with_runner_factory(
            archive,
            checkpoints,
            hash_store,
            factory,
        ))
    }

    /// Inject a custom archive and runner factory — the seam embedders and
    /// tests use to run against fixtures instead of a real core binary.
    pub fn with_runner_factory(
        archive: Arc<dyn HistoryArchive>,
        checkpoints: CheckpointManager,
        hash_store: Option<Arc<dyn TrustedHashStore>>,
        runner_factory: RunnerFactory,
    ) -> Self {
        Self {
            archive,
            checkpoints,
            hash_store,
            runner_factory,
            cancel: CancellationToken::new(),
            runner: None,
            cached_meta: None,
            prepared: None,
            next_ledger: 0,
            last_ledger: None,
            previous_ledger_hash: None,
        }
    }

    /// Handle for shutting this instance down from another task.
    pub fn close_handle(&self) -> CloseHandle {
        CloseHandle {
            cancel: self.cancel.clone(),
            hash_store: self.hash_store.clone(),
        }
    }

    /// Prepare the given range (including both ends) for reading.
    ///
    /// A bounded range starts the core in catchup mode; an unbounded range
    /// catches up to the starting ledger and then runs the core against the
    /// network. If an equivalent range is already prepared this is a no-op,
    /// so callers may invoke it defensively before every read. After the
    /// subprocess opens, the stream is fast-forwarded to `range.from()` to
    /// confirm the session is healthy.
    pub async fn prepare_range(
        &mut self,
        ctx: &CancellationToken,
        range: LedgerRange,
    ) -> Result<(), CaptiveError> {
        if self.start_preparing_range(range).await? {
            return Ok(());
        }

        self.get_ledger(ctx, range.from())
            .await
            .map(|_| ())
            .map_err(|e| CaptiveError::FastForward {
                sequence: range.from(),
                source: Box::new(e),
            })
    }

    /// Returns `true` if the range was already prepared and nothing was done.
    async fn start_preparing_range(&mut self, range: LedgerRange) -> Result<bool, CaptiveError> {
        if self.cancel.is_cancelled() {
            return Err(CaptiveError::Closed);
        }
        if self.is_prepared(range) {
            return Ok(true);
        }

        // One subprocess at a time: the storage directory is exclusive, so
        // the old instance must be confirmed gone before a new one spawns.
        if let Some(runner) = self.runner.as_mut() {
            runner.close().await?;
            let (exited, _) = runner.process_exit();
            if !exited {
                return Err(CaptiveError::PreviousInstanceRunning);
            }
        }

        if range.from() <= 1 {
            return Err(CaptiveError::StartFromLedgerOne);
        }

        match range.to() {
            Some(to) => {
                if range.from() > to {
                    return Err(CaptiveError::InvalidRange {
                        from: range.from(),
                        to,
                    });
                }
                self.open_catchup_subprocess(range.from(), to).await?;
            }
            None => self.open_online_subprocess(range.from()).await?,
        }
        Ok(false)
    }

    async fn open_catchup_subprocess(&mut self, from: u32, to: u32) -> Result<(), CaptiveError> {
        let latest = self.latest_checkpoint().await?;
        if from > latest {
            return Err(CaptiveError::FromBeyondArchive { from, latest });
        }
        if to > latest {
            return Err(CaptiveError::ToBeyondArchive { to, latest });
        }

        let mut runner = (self.runner_factory)(RunnerMode::Catchup, self.cancel.child_token())?;
        runner.catchup(from, to).await?;
        self.runner = Some(runner);

        tracing::info!(from, to, "prepared bounded replay range");
        self.prepared = Some(LedgerRange::bounded(from, to));
        // Replay begins at the start of the checkpoint segment containing
        // `from`; intervening ledgers are consumed during fast-forward.
        self.next_ledger = self.checkpoints.first_replayable(from);
        self.last_ledger = Some(to);
        self.previous_ledger_hash = None;
        Ok(())
    }

    async fn open_online_subprocess(&mut self, from: u32) -> Result<(), CaptiveError> {
        let latest = self.latest_checkpoint().await?;
        // The root state can lag the network by up to a minute, so allow two
        // checkpoint lengths of headroom before calling the request buggy.
        let two_checkpoints = (u64::from(self.checkpoints.next_checkpoint(0)) + 1) * 2;
        if u64::from(from) > u64::from(latest) + two_checkpoints {
            return Err(CaptiveError::TooFarAhead { latest });
        }

        let (run_from, hash) = self.run_from_params(from).await?;

        let mut runner = (self.runner_factory)(RunnerMode::Online, self.cancel.child_token())?;
        runner.run_from(run_from, hash).await?;
        self.runner = Some(runner);

        tracing::info!(from, run_from, "prepared online range");
        self.prepared = Some(LedgerRange::unbounded(from));
        // The stream position is only known once the first ledger arrives.
        self.next_ledger = 0;
        self.last_ledger = None;
        self.previous_ledger_hash = None;
        Ok(())
    }

    /// Anchor for the online invocation: the ledger just before `from` and
    /// its hash — from the trusted store when verified there, otherwise
    /// derived from the archive header at `from`.
    async fn run_from_params(&self, from: u32) -> Result<(u32, LedgerHash), CaptiveError> {
        // Ledgers 2..=63 all anchor at 3: the core cannot start below
        // ledger 2 but fast-forwards from 2 within the first checkpoint
        // segment, so starting at 3 still streams everything from 2 on.
        let from = if from <= 63 { 3 } else { from };
        let run_from = from - 1;

        if let Some(store) = &self.hash_store {
            if let Some(hash) = store.ledger_hash(run_from).await? {
                return Ok((run_from, hash));
            }
        }

        let header = self.archive.ledger_header(from).await?;
        Ok((run_from, header.header.previous_ledger_hash))
    }

    async fn latest_checkpoint(&self) -> Result<u32, CaptiveError> {
        let state = self.archive.root_state().await?;
        Ok(state.current_ledger)
    }

    /// Returns `true` if the given range is already being served.
    pub fn is_prepared(&self, range: LedgerRange) -> bool {
        if self.is_closed() || self.prepared.is_none() {
            return false;
        }

        let cached = self.cached_meta.as_ref().map(|m| m.ledger_sequence());
        let start_satisfied =
            self.next_expected_sequence() <= range.from() || cached == Some(range.from());

        match self.last_ledger {
            // Current session is unbounded: it serves any range starting at
            // or after the stream position.
            None => start_satisfied,
            Some(last) => match range.to() {
                Some(to) => start_satisfied && last >= to,
                // Requested unbounded, current session bounded.
                None => false,
            },
        }
    }

    /// Block until ledger `sequence` is available, validate it, return it.
    ///
    /// Sequences must be requested in non-decreasing order; the subprocess
    /// cannot rewind a live stream. Reading the last ledger of a bounded
    /// range closes the subprocess automatically.
    pub async fn get_ledger(
        &mut self,
        ctx: &CancellationToken,
        sequence: u32,
    ) -> Result<LedgerCloseMeta, CaptiveError> {
        if let Some(cached) = &self.cached_meta {
            if cached.ledger_sequence() == sequence {
                return Ok(cached.clone());
            }
        }

        let expected = self.next_expected_sequence();
        if sequence < expected {
            return Err(CaptiveError::BehindStream {
                requested: sequence,
                expected,
            });
        }
        if let Some(last) = self.last_ledger {
            if sequence > last {
                return Err(CaptiveError::PastBoundedRange {
                    requested: sequence,
                    last,
                });
            }
        }
        if self.is_closed() {
            return Err(CaptiveError::Closed);
        }

        let ctx = ctx.clone();
        let instance = self.cancel.clone();
        loop {
            let received = {
                let runner = self.runner.as_mut().ok_or(CaptiveError::Closed)?;
                tokio::select! {
                    _ = ctx.cancelled() => return Err(CaptiveError::Cancelled),
                    _ = instance.cancelled() => return Err(CaptiveError::Cancelled),
                    received = runner.meta_pipe().recv() => received,
                }
            };
            if let Some(meta) = self.handle_meta_result(sequence, received).await? {
                return Ok(meta);
            }
        }
    }

    /// Process one pipe record. Returns `Some(meta)` once the requested
    /// ledger was delivered; `None` when an earlier in-range ledger was
    /// consumed and the loop continues.
    async fn handle_meta_result(
        &mut self,
        sequence: u32,
        received: Option<MetaResult>,
    ) -> Result<Option<LedgerCloseMeta>, CaptiveError> {
        let meta = match self.check_meta_result(received) {
            Ok(meta) => meta,
            Err(e) => {
                self.close_runner().await;
                return Err(e);
            }
        };

        let seq = meta.ledger_sequence();
        if self.next_ledger != 0 && seq != self.next_ledger {
            self.close_runner().await;
            return Err(CaptiveError::UnexpectedSequence {
                expected: self.next_ledger,
                actual: seq,
            });
        }
        if self.next_ledger == 0 {
            if let Some(range) = self.prepared {
                // The first streamed ledger may fall anywhere at or before
                // the range start (checkpoint fast-forward), never after it.
                if seq > range.from() {
                    self.close_runner().await;
                    return Err(CaptiveError::UnexpectedFirstLedger {
                        expected: range.from(),
                        actual: seq,
                    });
                }
            }
        }

        let new_previous = meta.previous_ledger_hash();
        if let Some(previous) = self.previous_ledger_hash {
            if previous != new_previous {
                self.close_runner().await;
                return Err(CaptiveError::UnexpectedPreviousHash {
                    sequence: seq,
                    expected: previous.to_hex(),
                    actual: new_previous.to_hex(),
                });
            }
        }

        self.next_ledger = seq + 1;
        self.previous_ledger_hash = Some(meta.ledger_hash());
        self.cached_meta = Some(meta);

        if seq == sequence {
            // Last ledger of a bounded segment: nothing more to stream, shut
            // the subprocess down before handing the ledger back.
            if self.last_ledger == Some(seq) {
                if let Some(runner) = self.runner.as_mut() {
                    runner.close().await?;
                }
            }
            return Ok(self.cached_meta.clone());
        }
        Ok(None)
    }

    /// Triage one raw channel receive. Order matters: a user-initiated
    /// shutdown must not be reported as an ingestion failure.
    fn check_meta_result(
        &self,
        received: Option<MetaResult>,
    ) -> Result<LedgerCloseMeta, CaptiveError> {
        let runner = match &self.runner {
            Some(runner) => runner,
            None => return Err(CaptiveError::Closed),
        };
        if runner.cancel_token().is_cancelled() || self.cancel.is_cancelled() {
            return Err(CaptiveError::Cancelled);
        }
        match received {
            Some(Ok(meta)) => Ok(meta),
            // Reader-side fault (e.g. an undecodable frame), verbatim.
            Some(Err(e)) => Err(e),
            None => {
                let (exited, reason) = runner.process_exit();
                if exited {
                    Err(CaptiveError::CoreExited { reason })
                } else {
                    // The channel only closes when the process exits or
                    // something cancels; anything else is an invariant
                    // violation, reported anyway.
                    Err(CaptiveError::MetaPipeClosed)
                }
            }
        }
    }

    async fn close_runner(&mut self) {
        if let Some(runner) = self.runner.as_mut() {
            if let Err(e) = runner.close().await {
                tracing::warn!(error = %e, "error closing core runner");
            }
        }
    }

    /// Sequence of the latest ledger available without consuming the stream.
    ///
    /// For an unbounded session this is the last value buffered in the
    /// backend, not necessarily the latest ledger closed by the network.
    pub fn latest_ledger_sequence(&self) -> Result<u32, CaptiveError> {
        if self.is_closed() {
            return Err(CaptiveError::Closed);
        }
        match self.last_ledger {
            Some(last) => Ok(last),
            None => {
                let buffered = self
                    .runner
                    .as_ref()
                    .map(|r| r.buffered_ledgers())
                    .unwrap_or(0);
                Ok(self.next_expected_sequence() - 1 + buffered as u32)
            }
        }
    }

    /// Shut the instance down. Once closed it is permanently unusable; all
    /// subsequent calls fail. Idempotent.
    pub async fn close(&mut self) -> Result<(), CaptiveError> {
        self.cancel.cancel();

        if let Some(store) = &self.hash_store {
            // Best effort: a hash-store failure must not block shutdown.
            if let Err(e) = store.close().await {
                tracing::warn!(error = %e, "error closing trusted hash store");
            }
        }

        if let Some(runner) = self.runner.as_mut() {
            runner.close().await?;
        }
        Ok(())
    }

    /// `next_ledger`, or the start of the prepared range while the online
    /// stream position is still unknown.
    fn next_expected_sequence(&self) -> u32 {
        match self.prepared {
            Some(range) if self.next_ledger == 0 => range.from(),
            _ => self.next_ledger,
        }
    }

    fn is_closed(&self) -> bool {
        if self.cancel.is_cancelled() {
            return true;
        }
        match (&self.prepared, &self.runner) {
            (Some(_), Some(runner)) => runner.cancel_token().is_cancelled(),
            _ => true,
        }
    }
}

/// Cancels a running `CaptiveCore` from another task.
///
/// The backend's mutating methods take `&mut self`, so a concurrent
/// shutdown cannot go through the instance itself. The handle only signals:
/// it cancels the instance token — unblocking any in-flight `get_ledger` —
/// and releases the hash store; subprocess teardown is delegated to the
/// runner's supervision task observing the same token.
#[derive(Clone)]
pub struct CloseHandle {
    cancel: CancellationToken,
    hash_store: Option<Arc<dyn TrustedHashStore>>,
}

impl CloseHandle {
    /// Cancel all in-flight operations and release the hash store.
    /// Idempotent and safe to call concurrently with any backend method.
    pub async fn close(&self) {
        self.cancel.cancel();
        if let Some(store) = &self.hash_store {
            if let Err(e) = store.close().await {
                tracing::warn!(error = %e, "error closing trusted hash store");
            }
        }
    }
}
