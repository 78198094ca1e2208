use super::{Backend, ExecutionUnit, panic_reason};
use crossbeam_channel::{Receiver, Sender};
use fibpool_core::{
    Error, Result, ResultItem, UnitId, Upstream, WorkItem,
    channel::{Inbox, Outbox},
    wire::{FrameReader, FrameWriter},
};
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::thread::{self, JoinHandle};

/// Hosts every unit in a child process of the current executable.
///
/// Children are started with the hidden `worker` and `sink` subcommands and
/// speak JSON-lines frames over their stdin and stdout. Each child gets one
/// relay thread in the parent:
///
/// - A worker relay waits for the child's [`Upstream::Pull`], pops exactly one
///   [`WorkItem`] from the shared Work Channel and writes it down. Results
///   coming back as [`Upstream::Result`] are pushed onto the Result Channel.
///   A child therefore never holds more than the one item it is working on.
/// - The sink relay forwards every [`ResultItem`] down to the sink child up to
///   and including the sentinel, then closes the pipe. The sink child renders
///   to the inherited stdout.
///
/// On Unix every child is placed in its own process group so that a terminal
/// interrupt reaches only the console, which then drains the children through
/// the regular sentinel protocol.
#[derive(Debug, Clone)]
pub struct ProcessBackend {
    program: PathBuf,
    display_cap: usize,
}

impl ProcessBackend {
    pub fn new(program: impl Into<PathBuf>, display_cap: usize) -> Self {
        Self {
            program: program.into(),
            display_cap,
        }
    }

    /// Uses the running executable as the child program.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the executable path cannot be determined.
    pub fn current_exe(display_cap: usize) -> Result<Self> {
        Ok(Self::new(std::env::current_exe()?, display_cap))
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.stderr(Stdio::inherit());
        detach_from_terminal_group(&mut cmd);
        cmd
    }

    fn start_relay<F>(unit: UnitId, mut child: Child, relay: F) -> Result<ProcessUnit>
    where
        F: FnOnce() -> Result<()> + Send + 'static,
    {
        let spawned = thread::Builder::new()
            .name(format!("{unit}-relay"))
            .spawn(move || {
                let span = tracing::info_span!("relay", id = %unit);
                let _enter = span.enter();
                relay()
            });

        match spawned {
            Ok(relay) => Ok(ProcessUnit { unit, child, relay }),
            Err(source) => {
                let _ = child.kill();
                let _ = child.wait();
                Err(Error::Spawn { unit, source })
            }
        }
    }
}

impl Backend for ProcessBackend {
    type Unit = ProcessUnit;

    fn spawn_worker(
        &self,
        index: usize,
        work: Receiver<WorkItem>,
        results: Sender<ResultItem>,
    ) -> Result<ProcessUnit> {
        let unit = UnitId::Worker(index);
        let mut child = self
            .command()
            .args(["worker", "--id", &index.to_string()])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .spawn()
            .map_err(|source| Error::Spawn { unit, source })?;
        tracing::debug!("{unit} started as pid {}", child.id());

        let pipes = child.stdin.take().zip(child.stdout.take());
        let Some((downstream, upstream)) = pipes else {
            let _ = child.kill();
            let _ = child.wait();
            return Err(Error::closed(format!("{unit} pipes unavailable")));
        };

        Self::start_relay(unit, child, move || {
            relay_worker(unit, BufReader::new(upstream), downstream, work, results)
        })
    }

    fn spawn_sink(&self, results: Receiver<ResultItem>) -> Result<ProcessUnit> {
        let unit = UnitId::Sink;
        let mut child = self
            .command()
            .args(["sink", "--display-cap", &self.display_cap.to_string()])
            .stdin(Stdio::piped())
            .stdout(Stdio::inherit())
            .spawn()
            .map_err(|source| Error::Spawn { unit, source })?;
        tracing::debug!("{unit} started as pid {}", child.id());

        let Some(downstream) = child.stdin.take() else {
            let _ = child.kill();
            let _ = child.wait();
            return Err(Error::closed(format!("{unit} pipe unavailable")));
        };

        Self::start_relay(unit, child, move || relay_sink(downstream, results))
    }
}

#[cfg(unix)]
fn detach_from_terminal_group(cmd: &mut Command) {
    use std::os::unix::process::CommandExt;
    cmd.process_group(0);
}

#[cfg(not(unix))]
fn detach_from_terminal_group(_cmd: &mut Command) {}

/// Serves one worker child until it closes its stdout.
fn relay_worker<R, W>(
    unit: UnitId,
    upstream: R,
    downstream: W,
    mut work: Receiver<WorkItem>,
    mut results: Sender<ResultItem>,
) -> Result<()>
where
    R: BufRead,
    W: Write,
{
    let mut upstream: FrameReader<R, Upstream> = FrameReader::new(upstream);
    let mut downstream = FrameWriter::new(downstream);

    loop {
        match upstream.pop() {
            Ok(Upstream::Pull) => {
                let item = work.pop()?;
                downstream.push(item)?;
            }
            Ok(Upstream::Result(item @ ResultItem::Computed { .. })) => results.push(item)?,
            Ok(Upstream::Result(ResultItem::Shutdown)) => {
                tracing::warn!("{unit} sent a result sentinel, skipping");
            }
            Err(Error::ChannelClosed { .. }) => return Ok(()),
            Err(e) => return Err(e),
        }
    }
}

/// Forwards results to the sink child up to and including the sentinel.
fn relay_sink<W: Write>(downstream: W, mut results: Receiver<ResultItem>) -> Result<()> {
    let mut downstream = FrameWriter::new(downstream);
    loop {
        let item = results.pop()?;
        let last = matches!(item, ResultItem::Shutdown);
        downstream.push(item)?;
        if last {
            return Ok(());
        }
    }
}

/// A worker or sink child process and its relay thread.
#[derive(Debug)]
pub struct ProcessUnit {
    unit: UnitId,
    child: Child,
    relay: JoinHandle<Result<()>>,
}

impl ExecutionUnit for ProcessUnit {
    fn id(&self) -> UnitId {
        self.unit
    }

    fn join(mut self) -> Result<()> {
        let relay = self.relay.join();
        let status = self.child.wait()?;

        let fail = |reason: String| Error::UnitFailed {
            unit: self.unit,
            reason,
        };
        match relay {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(fail(format!("relay stopped: {e}"))),
            Err(payload) => return Err(fail(format!("relay {}", panic_reason(payload.as_ref())))),
        }
        if !status.success() {
            return Err(fail(format!("exited with {status}")));
        }

        tracing::debug!("{} exited with {status}", self.unit);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fibpool_core::channel::unbounded;
    use serde::{Serialize, de::DeserializeOwned};
    use std::io::Cursor;

    fn frames<T: Serialize>(items: Vec<T>) -> Cursor<Vec<u8>> {
        let mut writer = FrameWriter::new(Vec::new());
        for item in items {
            writer.push(item).unwrap();
        }
        Cursor::new(writer.into_inner())
    }

    fn decode<T: DeserializeOwned>(raw: Vec<u8>) -> Vec<T> {
        let mut reader = FrameReader::<_, T>::new(Cursor::new(raw));
        std::iter::from_fn(|| reader.pop().ok()).collect()
    }

    #[test]
    fn worker_relay_hands_out_one_item_per_pull() {
        let (work_tx, work_rx) = unbounded();
        let (result_tx, result_rx) = unbounded();
        work_tx.send(WorkItem::Request { value: 4 }).unwrap();
        work_tx.send(WorkItem::Shutdown).unwrap();
        work_tx.send(WorkItem::Request { value: 9 }).unwrap();

        let upstream = frames(vec![
            Upstream::Pull,
            Upstream::Result(ResultItem::Computed {
                source: 4,
                text: "Fibonacci(4) is 3".into(),
            }),
            Upstream::Pull,
        ]);
        let mut downstream = Vec::new();
        relay_worker(
            UnitId::Worker(0),
            upstream,
            &mut downstream,
            work_rx.clone(),
            result_tx,
        )
        .unwrap();

        let sent: Vec<WorkItem> = decode(downstream);
        assert_eq!(sent, vec![WorkItem::Request { value: 4 }, WorkItem::Shutdown]);
        assert_eq!(result_rx.try_recv().unwrap().source(), Some(4));
        // Two pulls, two items; the rest stays shared.
        assert_eq!(work_rx.len(), 1);
    }

    #[test]
    fn worker_relay_drops_stray_sentinels() {
        let (_work_tx, work_rx) = unbounded();
        let (result_tx, result_rx) = unbounded();
        let upstream = frames(vec![Upstream::Result(ResultItem::Shutdown)]);
        relay_worker(UnitId::Worker(1), upstream, Vec::new(), work_rx, result_tx).unwrap();
        assert!(result_rx.is_empty());
    }

    #[test]
    fn sink_relay_stops_after_sentinel() {
        let (tx, rx) = unbounded();
        tx.send(ResultItem::Computed {
            source: 2,
            text: "Fibonacci(2) is 1".into(),
        })
        .unwrap();
        tx.send(ResultItem::Shutdown).unwrap();
        tx.send(ResultItem::Computed {
            source: 3,
            text: "Fibonacci(3) is 2".into(),
        })
        .unwrap();

        let mut downstream = Vec::new();
        relay_sink(&mut downstream, rx.clone()).unwrap();

        let sent: Vec<ResultItem> = decode(downstream);
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[1], ResultItem::Shutdown);
        assert_eq!(rx.len(), 1);
    }

    #[test]
    fn missing_program_is_a_spawn_error() {
        let backend = ProcessBackend::new("/nonexistent/fibpool-child", 80);
        let (_tx, rx) = unbounded();
        let err = backend.spawn_sink(rx).unwrap_err();
        assert!(matches!(err, Error::Spawn { unit: UnitId::Sink, .. }));
    }
}
