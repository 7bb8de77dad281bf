//! Core subprocess lifecycle and the meta-pipe reader.
//!
//! A runner owns everything about one core invocation: its exclusive scratch
//! directory, the spawned process, the background task decoding the metadata
//! stream into typed records, and the supervision task recording the process
//! exit. The orchestrator only ever sees the bounded channel and the exit
//! report — it never touches the raw pipe.

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use ledgerstream_core::frame;
use ledgerstream_core::meta::{LedgerCloseMeta, LedgerHash};

use crate::config::CaptiveConfig;
use crate::error::CaptiveError;

/// One record off the meta pipe: a decoded ledger, or the reader's fatal
/// error after which nothing more is sent.
pub type MetaResult = Result<LedgerCloseMeta, CaptiveError>;

/// How many decoded ledgers the reader may buffer ahead of the consumer.
/// The core blocks on an unread pipe, so this bounds read-ahead, not memory
/// for the whole stream.
pub const META_PIPE_BUFFER: usize = 16;

/// How long `close` waits for the process to die before giving up.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

/// Which invocation a runner was created for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunnerMode {
    /// Bounded replay of an archived window (`catchup`).
    Catchup,
    /// Catch up to an anchor ledger, then follow the network (`run`).
    Online,
}

/// Lifecycle surface of one core invocation, as the orchestrator sees it.
#[async_trait]
pub trait CoreRunner: Send {
    /// Start the process in bounded replay mode for `from..=to`.
    async fn catchup(&mut self, from: u32, to: u32) -> Result<(), CaptiveError>;

    /// Start the process anchored at `sequence` (whose hash is `hash`), then
    /// follow the network.
    async fn run_from(&mut self, sequence: u32, hash: LedgerHash) -> Result<(), CaptiveError>;

    /// The decoded metadata stream.
    fn meta_pipe(&mut self) -> &mut mpsc::Receiver<MetaResult>;

    /// Decoded ledgers currently buffered ahead of the consumer.
    fn buffered_ledgers(&self) -> usize;

    /// Whether the process has exited, and the failure it reported if so.
    fn process_exit(&self) -> (bool, Option<String>);

    /// Cancelled when this runner (or its owner) shuts down.
    fn cancel_token(&self) -> CancellationToken;

    /// Terminate the process and stop the reader. Idempotent.
    async fn close(&mut self) -> Result<(), CaptiveError>;
}

#[derive(Default)]
struct ExitState {
    exited: bool,
    error: Option<String>,
}

/// Production `CoreRunner` spawning the configured core binary.
///
/// The metadata stream rides the child's piped stdout
/// (`--metadata-output-stream fd:1`); core log output rides stderr and is
/// forwarded line-by-line into `tracing`.
pub struct SubprocessRunner {
    binary_path: PathBuf,
    config_path: Option<PathBuf>,
    mode: RunnerMode,
    storage: tempfile::TempDir,
    token: CancellationToken,
    rx: mpsc::Receiver<MetaResult>,
    tx: Option<mpsc::Sender<MetaResult>>,
    exit: Arc<Mutex<ExitState>>,
    wait_handle: Option<JoinHandle<()>>,
    started: bool,
    closed: bool,
}

impl SubprocessRunner {
    /// Set up a runner: exclusive scratch directory, pipe channel, child
    /// cancellation token. The process is not spawned until `catchup` or
    /// `run_from`.
    pub fn new(
        config: &CaptiveConfig,
        mode: RunnerMode,
        parent: CancellationToken,
    ) -> Result<Self, CaptiveError> {
        let storage = match &config.storage_path {
            Some(base) => {
                std::fs::create_dir_all(base)?;
                tempfile::Builder::new()
                    .prefix("captive-core-")
                    .tempdir_in(base)?
            }
            None => tempfile::Builder::new().prefix("captive-core-").tempdir()?,
        };
        let (tx, rx) = mpsc::channel(META_PIPE_BUFFER);
        Ok(Self {
            binary_path: config.binary_path.clone(),
            config_path: config.config_path.clone(),
            mode,
            storage,
            token: parent.child_token(),
            rx,
            tx: Some(tx),
            exit: Arc::new(Mutex::new(ExitState::default())),
            wait_handle: None,
            started: false,
            closed: false,
        })
    }

    fn base_args(&self) -> Vec<String> {
        let mut args = Vec::new();
        if let Some(conf) = &self.config_path {
            args.push("--conf".into());
            args.push(conf.display().to_string());
        }
        args.push("--storage-dir".into());
        args.push(self.storage.path().display().to_string());
        args.push("--metadata-output-stream".into());
        args.push("fd:1".into());
        args
    }

    fn start(&mut self, mode_args: Vec<String>) -> Result<(), CaptiveError> {
        if self.started {
            return Err(CaptiveError::RunnerStarted);
        }

        let mut args = mode_args;
        args.extend(self.base_args());
        tracing::info!(
            binary = %self.binary_path.display(),
            mode = ?self.mode,
            "starting core subprocess"
        );

        let mut child = Command::new(&self.binary_path)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| CaptiveError::Io(std::io::Error::other("child stdout missing")))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| CaptiveError::Io(std::io::Error::other("child stderr missing")))?;
        let tx = self.tx.take().ok_or(CaptiveError::RunnerStarted)?;
        self.started = true;

        spawn_meta_reader(BufReader::new(stdout), tx, self.token.clone());
        spawn_log_forwarder(stderr);

        let exit = Arc::clone(&self.exit);
        let token = self.token.clone();
        self.wait_handle = Some(tokio::spawn(async move {
            let status = tokio::select! {
                status = child.wait() => status,
                _ = token.cancelled() => {
                    let _ = child.start_kill();
                    child.wait().await
                }
            };
            let mut exit = exit.lock().unwrap();
            exit.exited = true;
            exit.error = match status {
                Ok(status) if status.success() => None,
                Ok(status) => Some(format!("exit status: {status}")),
                Err(e) => Some(format!("error waiting for core: {e}")),
            };
        }));
        Ok(())
    }
}

#[async_trait]
impl CoreRunner for SubprocessRunner {
    async fn catchup(&mut self, from: u32, to: u32) -> Result<(), CaptiveError> {
        let count = to.saturating_sub(from) + 1;
        self.start(vec!["catchup".into(), format!("{to}/{count}")])
    }

    async fn run_from(&mut self, sequence: u32, hash: LedgerHash) -> Result<(), CaptiveError> {
        self.start(vec![
            "run".into(),
            "--in-memory".into(),
            "--start-at-ledger".into(),
            sequence.to_string(),
            "--start-at-hash".into(),
            hash.to_hex(),
        ])
    }

    fn meta_pipe(&mut self) -> &mut mpsc::Receiver<MetaResult> {
        &mut self.rx
    }

    fn buffered_ledgers(&self) -> usize {
        self.rx.len()
    }

    fn process_exit(&self) -> (bool, Option<String>) {
        if !self.started {
            // Never spawned: nothing is left running.
            return (true, None);
        }
        let exit = self.exit.lock().unwrap();
        (exit.exited, exit.error.clone())
    }

    fn cancel_token(&self) -> CancellationToken {
        self.token.clone()
    }

    async fn close(&mut self) -> Result<(), CaptiveError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.token.cancel();
        if let Some(handle) = self.wait_handle.take() {
            if tokio::time::timeout(SHUTDOWN_GRACE, handle).await.is_err() {
                tracing::warn!("core did not exit within the shutdown grace period");
            }
        }
        Ok(())
    }
}

impl Drop for SubprocessRunner {
    fn drop(&mut self) {
        // Unblocks the reader and makes the supervision task kill the child.
        self.token.cancel();
    }
}

/// Decode frames off `reader` into `tx` until EOF, a decode fault, or
/// cancellation. On a fault the error is sent once and reading stops.
fn spawn_meta_reader<R>(
    mut reader: R,
    tx: mpsc::Sender<MetaResult>,
    token: CancellationToken,
) -> JoinHandle<()>
where
    R: AsyncRead + Send + Unpin + 'static,
{
    tokio::spawn(async move {
        loop {
            let next = tokio::select! {
                _ = token.cancelled() => break,
                next = frame::read_frame::<_, LedgerCloseMeta>(&mut reader) => next,
            };
            match next {
                Ok(Some(meta)) => {
                    // The send applies backpressure when the consumer lags;
                    // it must stay cancellable or shutdown would hang here.
                    let sent = tokio::select! {
                        _ = token.cancelled() => break,
                        sent = tx.send(Ok(meta)) => sent,
                    };
                    if sent.is_err() {
                        break;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    let _ = tx.send(Err(CaptiveError::Frame(e))).await;
                    break;
                }
            }
        }
    })
}

/// Forward core log lines from stderr into tracing.
fn spawn_log_forwarder<R>(stderr: R) -> JoinHandle<()>
where
    R: AsyncRead + Send + Unpin + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(stderr).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            tracing::debug!(target: "ledgerstream::core", "{line}");
        }
    })
}
