use super::input::{Command, classify};
use crate::backend::ExecutionUnit;
use crate::pool::{Pool, ShutdownReport};
use crate::telemetry::{increment_inputs_rejected, increment_requests_accepted};
use fibpool_core::{Error, Result, UnitId};
use std::future::Future;
use std::io;
use tokio_stream::{Stream, StreamExt};

/// Lifecycle of the console.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DriverState {
    /// Reading lines and enqueueing requests.
    Accepting,
    /// Shutdown handshake in progress; no input is read.
    Draining,
    /// Every unit has been joined.
    Stopped,
}

/// Why the console stopped accepting input.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DrainCause {
    ExitKeyword,
    EndOfInput,
    Interrupt,
}

/// Summary of one console session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DriverReport {
    pub accepted: u64,
    pub rejected: u64,
    pub cause: DrainCause,
    pub shutdown: ShutdownReport,
}

/// Reads operator input and feeds the pool.
///
/// The driver is the only producer on the Work Channel. Every accepted line
/// becomes exactly one request; rejected lines are logged and dropped. Once
/// draining starts no further line is read, and the call returns only after
/// every unit has been joined.
pub struct ConsoleDriver<U: ExecutionUnit> {
    pool: Option<Pool<U>>,
    exit_keyword: String,
    state: DriverState,
    accepted: u64,
    rejected: u64,
}

impl<U: ExecutionUnit> ConsoleDriver<U> {
    pub fn new(pool: Pool<U>, exit_keyword: impl Into<String>) -> Self {
        Self {
            pool: Some(pool),
            exit_keyword: exit_keyword.into(),
            state: DriverState::Accepting,
            accepted: 0,
            rejected: 0,
        }
    }

    pub const fn state(&self) -> DriverState {
        self.state
    }

    /// Handles one line while accepting.
    ///
    /// Returns `Ok(true)` when the line was the exit keyword.
    ///
    /// # Errors
    ///
    /// Returns an error if the driver has left [`DriverState::Accepting`] or
    /// the request cannot be enqueued.
    pub fn accept_line(&mut self, line: &str) -> Result<bool> {
        let pool = match (&self.pool, self.state) {
            (Some(pool), DriverState::Accepting) => pool,
            _ => return Err(Error::closed("console is no longer accepting input")),
        };

        match classify(line, &self.exit_keyword) {
            Ok(Command::Exit) => Ok(true),
            Ok(Command::Submit(value)) => {
                pool.submit(value)?;
                self.accepted += 1;
                increment_requests_accepted();
                tracing::debug!("Enqueued request {value}");
                Ok(false)
            }
            Err(e) => {
                self.rejected += 1;
                increment_inputs_rejected();
                tracing::warn!("{e}");
                Ok(false)
            }
        }
    }

    /// Runs the session until the exit keyword, end of input, or `interrupt`
    /// resolves, then drains the pool.
    ///
    /// All three causes lead to the same orderly shutdown. The blocking joins
    /// run on the runtime's blocking pool. A driver runs once; afterwards it is
    /// [`DriverState::Stopped`].
    ///
    /// # Errors
    ///
    /// Returns an error if the driver already ran, or a request or sentinel
    /// cannot be enqueued. Unit failures are reported in
    /// [`DriverReport::shutdown`].
    pub async fn run<S, F>(&mut self, mut lines: S, interrupt: F) -> Result<DriverReport>
    where
        S: Stream<Item = io::Result<String>> + Unpin,
        F: Future<Output = ()>,
    {
        tokio::pin!(interrupt);

        let cause = loop {
            tokio::select! {
                () = &mut interrupt => {
                    tracing::info!("Interrupted");
                    break DrainCause::Interrupt;
                }
                line = lines.next() => match line {
                    Some(Ok(line)) => {
                        if self.accept_line(&line)? {
                            break DrainCause::ExitKeyword;
                        }
                    }
                    Some(Err(e)) => {
                        tracing::warn!("Console input failed: {e}");
                        break DrainCause::EndOfInput;
                    }
                    None => break DrainCause::EndOfInput,
                },
            }
        };

        self.state = DriverState::Draining;
        tracing::debug!("Draining after {cause:?}");

        let pool = self
            .pool
            .take()
            .ok_or_else(|| Error::closed("pool already stopped"))?;
        let span = tracing::Span::current();
        let shutdown = tokio::task::spawn_blocking(move || span.in_scope(|| pool.shutdown()))
            .await
            .map_err(|e| Error::UnitFailed {
                unit: UnitId::Driver,
                reason: e.to_string(),
            })??;
        self.state = DriverState::Stopped;

        Ok(DriverReport {
            accepted: self.accepted,
            rejected: self.rejected,
            cause,
            shutdown,
        })
    }
}
