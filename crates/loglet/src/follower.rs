//! The entry source: decodes journal export data, either from an already attached stream or
//! from a `journalctl` child process this module owns.

use std::{
    future::Future,
    path::{Path, PathBuf},
    process::{ExitStatus, Stdio},
};

use journal_export::{AsyncExportDecoder, Cursor, DecodeError, DecodeLimits, JournalEntry};
use serde::Deserialize;
use thiserror::Error;
use tokio::{
    io::{AsyncRead, BufReader},
    process::{Child, Command},
    sync::mpsc,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::process::{journalctl_args, spawn_with_retry};

#[derive(Debug, Error)]
pub enum FollowError {
    #[error("could not execute `{binary}`: {source}")]
    Spawn {
        binary: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("journalctl stdout unavailable")]
    StdoutUnavailable,
    #[error("input stream was already consumed")]
    AlreadyStarted,
    #[error("could not decode entry: {0}")]
    Decode(#[from] DecodeError),
    #[error("unable to kill journalctl process: {source}")]
    Kill {
        #[source]
        source: std::io::Error,
    },
    #[error("failed to wait for journalctl process: {source}")]
    Wait {
        #[source]
        source: std::io::Error,
    },
    #[error("journalctl exited with {status}")]
    JournalctlExited { status: ExitStatus },
    #[error("unable to inspect stdin: {source}")]
    Stdin {
        #[source]
        source: std::io::Error,
    },
}

/// Producer of raw export-format bytes.
///
/// `stop` must be idempotent and succeed when the producer already went away on its own.
pub trait ExportSource: Send + 'static {
    type Stream: AsyncRead + Unpin + Send + 'static;

    fn start(&mut self, cursor: Option<&Cursor>) -> Result<Self::Stream, FollowError>;

    /// Tears the producer down after cancellation or a failure.
    fn stop(&mut self) -> impl Future<Output = Result<(), FollowError>> + Send;

    /// Called once the stream reached a clean end of input.
    fn finish(&mut self) -> impl Future<Output = Result<(), FollowError>> + Send {
        async { Ok(()) }
    }
}

/// Export data that is already being fed to the process, typically a pipe on stdin.
pub struct AttachedSource<R> {
    stream: Option<R>,
}

impl<R> AttachedSource<R> {
    pub fn new(stream: R) -> Self {
        Self {
            stream: Some(stream),
        }
    }
}

impl<R> ExportSource for AttachedSource<R>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    type Stream = R;

    fn start(&mut self, _cursor: Option<&Cursor>) -> Result<R, FollowError> {
        self.stream.take().ok_or(FollowError::AlreadyStarted)
    }

    async fn stop(&mut self) -> Result<(), FollowError> {
        Ok(())
    }
}

/// A `journalctl --follow` child process started at the saved cursor.
pub struct JournalctlSource {
    binary: PathBuf,
    child: Option<Child>,
}

impl JournalctlSource {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            child: None,
        }
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }
}

impl Default for JournalctlSource {
    fn default() -> Self {
        Self::new("journalctl")
    }
}

impl ExportSource for JournalctlSource {
    type Stream = tokio::process::ChildStdout;

    fn start(&mut self, cursor: Option<&Cursor>) -> Result<Self::Stream, FollowError> {
        let mut command = Command::new(&self.binary);
        command
            .args(journalctl_args(cursor))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);

        let mut child = spawn_with_retry(&mut command, &self.binary)?;
        let stdout = child.stdout.take().ok_or(FollowError::StdoutUnavailable)?;
        info!(binary = ?self.binary, pid = ?child.id(), resume = cursor.is_some(), "started journalctl");
        self.child = Some(child);
        Ok(stdout)
    }

    async fn stop(&mut self) -> Result<(), FollowError> {
        let Some(mut child) = self.child.take() else {
            return Ok(());
        };
        if let Ok(Some(status)) = child.try_wait() {
            debug!(%status, "journalctl already exited");
            return Ok(());
        }
        child
            .start_kill()
            .map_err(|source| FollowError::Kill { source })?;
        let status = child
            .wait()
            .await
            .map_err(|source| FollowError::Wait { source })?;
        debug!(%status, "journalctl stopped");
        Ok(())
    }

    async fn finish(&mut self) -> Result<(), FollowError> {
        let Some(mut child) = self.child.take() else {
            return Ok(());
        };
        let status = child
            .wait()
            .await
            .map_err(|source| FollowError::Wait { source })?;
        if !status.success() {
            return Err(FollowError::JournalctlExited { status });
        }
        Ok(())
    }
}

/// How the follower obtains its input.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum InputMode {
    /// Read stdin when it is a pipe or a file, otherwise spawn journalctl.
    #[default]
    Auto,
    Stdin,
    Journalctl,
}

impl InputMode {
    /// Resolves `Auto` against the current stdin.
    pub fn resolve(self) -> Result<InputMode, FollowError> {
        match self {
            InputMode::Auto => {
                if stdin_is_attached()? {
                    Ok(InputMode::Stdin)
                } else {
                    Ok(InputMode::Journalctl)
                }
            }
            mode => Ok(mode),
        }
    }
}

#[cfg(unix)]
fn stdin_is_attached() -> Result<bool, FollowError> {
    use std::os::{fd::AsFd, unix::fs::FileTypeExt};

    let fd = std::io::stdin()
        .as_fd()
        .try_clone_to_owned()
        .map_err(|source| FollowError::Stdin { source })?;
    let metadata = std::fs::File::from(fd)
        .metadata()
        .map_err(|source| FollowError::Stdin { source })?;
    Ok(!metadata.file_type().is_char_device())
}

#[cfg(not(unix))]
fn stdin_is_attached() -> Result<bool, FollowError> {
    use std::io::IsTerminal;

    Ok(!std::io::stdin().is_terminal())
}

/// Either input flavour behind one type, as picked from configuration.
pub enum Input {
    Attached(AttachedSource<Box<dyn AsyncRead + Unpin + Send>>),
    Journalctl(JournalctlSource),
}

impl Input {
    pub fn from_mode(mode: InputMode, journalctl: &Path) -> Result<Self, FollowError> {
        match mode.resolve()? {
            InputMode::Journalctl => Ok(Input::Journalctl(JournalctlSource::new(journalctl))),
            _ => {
                let stdin: Box<dyn AsyncRead + Unpin + Send> = Box::new(tokio::io::stdin());
                Ok(Input::Attached(AttachedSource::new(stdin)))
            }
        }
    }
}

impl ExportSource for Input {
    type Stream = Box<dyn AsyncRead + Unpin + Send>;

    fn start(&mut self, cursor: Option<&Cursor>) -> Result<Self::Stream, FollowError> {
        match self {
            Input::Attached(source) => source.start(cursor),
            Input::Journalctl(source) => {
                let stdout: Self::Stream = Box::new(source.start(cursor)?);
                Ok(stdout)
            }
        }
    }

    async fn stop(&mut self) -> Result<(), FollowError> {
        match self {
            Input::Attached(source) => source.stop().await,
            Input::Journalctl(source) => source.stop().await,
        }
    }

    async fn finish(&mut self) -> Result<(), FollowError> {
        match self {
            Input::Attached(source) => source.finish().await,
            Input::Journalctl(source) => source.finish().await,
        }
    }
}

enum Exit {
    EndOfInput,
    Cancelled,
    DownstreamClosed,
}

/// First pipeline stage: decodes entries and hands them downstream one at a time.
pub struct Follower<S> {
    source: S,
    cursor: Option<Cursor>,
    limits: DecodeLimits,
}

impl<S: ExportSource> Follower<S> {
    pub fn new(source: S, cursor: Option<Cursor>) -> Self {
        Self {
            source,
            cursor,
            limits: DecodeLimits::default(),
        }
    }

    pub fn limits(mut self, limits: DecodeLimits) -> Self {
        self.limits = limits;
        self
    }

    pub async fn run(
        mut self,
        entries: mpsc::Sender<JournalEntry>,
        cancel: CancellationToken,
    ) -> Result<(), FollowError> {
        let stream = self.source.start(self.cursor.as_ref())?;
        let mut decoder = AsyncExportDecoder::with_limits(BufReader::new(stream), self.limits);

        let outcome = loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => break Ok(Exit::Cancelled),
                next = decoder.next_entry() => next,
            };
            let entry = match next {
                Ok(Some(entry)) => entry,
                Ok(None) => break Ok(Exit::EndOfInput),
                Err(err) => break Err(FollowError::from(err)),
            };
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break Ok(Exit::Cancelled),
                sent = entries.send(entry) => {
                    if sent.is_err() {
                        break Ok(Exit::DownstreamClosed);
                    }
                }
            }
        };
        let records = decoder.records_decoded();
        drop(decoder);

        match outcome {
            Ok(Exit::EndOfInput) => {
                debug!(records, "export stream ended");
                let finished = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => None,
                    finished = self.source.finish() => Some(finished),
                };
                match finished {
                    Some(finished) => finished,
                    None => {
                        debug!("shutdown while waiting for the entry source to exit");
                        self.stop_source().await;
                        Ok(())
                    }
                }
            }
            Ok(Exit::Cancelled) | Ok(Exit::DownstreamClosed) => {
                self.stop_source().await;
                Ok(())
            }
            Err(err) => {
                self.stop_source().await;
                Err(err)
            }
        }
    }

    async fn stop_source(&mut self) {
        if let Err(err) = self.source.stop().await {
            warn!(error = %err, "journal: failed to stop entry source");
        }
    }
}
