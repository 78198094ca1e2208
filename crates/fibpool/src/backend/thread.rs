use super::{Backend, ExecutionUnit, panic_reason};
use crate::pool::{sink::sink_loop, worker::worker_loop};
use crossbeam_channel::{Receiver, Sender};
use fibpool_core::{
    Error, Result, ResultItem, UnitId, WorkItem, channel::Link, compute::Compute,
};
use std::io::Write;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// Produces the writer the sink renders into.
pub type OutputFactory = Arc<dyn Fn() -> Box<dyn Write + Send> + Send + Sync>;

/// Hosts every unit on its own named OS thread.
///
/// Threads share the pool's in-memory queues directly. A panic in one thread
/// terminates that unit only and is reported when it is joined.
pub struct ThreadBackend<C> {
    compute: Arc<C>,
    display_cap: usize,
    output: OutputFactory,
}

impl<C: Compute> ThreadBackend<C> {
    /// Creates a backend whose sink renders to stdout.
    pub fn new(compute: C, display_cap: usize) -> Self {
        Self {
            compute: Arc::new(compute),
            display_cap,
            output: Arc::new(|| Box::new(std::io::stdout())),
        }
    }

    /// Renders results into writers produced by `output` instead of stdout.
    #[must_use]
    pub fn with_output<F>(mut self, output: F) -> Self
    where
        F: Fn() -> Box<dyn Write + Send> + Send + Sync + 'static,
    {
        self.output = Arc::new(output);
        self
    }

    fn spawn<F>(unit: UnitId, body: F) -> Result<ThreadUnit>
    where
        F: FnOnce() -> Result<()> + Send + 'static,
    {
        let handle = thread::Builder::new()
            .name(unit.to_string())
            .spawn(move || {
                let span = tracing::info_span!("unit", id = %unit);
                let _enter = span.enter();
                body()
            })
            .map_err(|source| Error::Spawn { unit, source })?;

        Ok(ThreadUnit { unit, handle })
    }
}

impl<C: Compute> Backend for ThreadBackend<C> {
    type Unit = ThreadUnit;

    fn spawn_worker(
        &self,
        index: usize,
        work: Receiver<WorkItem>,
        results: Sender<ResultItem>,
    ) -> Result<ThreadUnit> {
        let unit = UnitId::Worker(index);
        let compute = Arc::clone(&self.compute);
        Self::spawn(unit, move || {
            let mut link = Link::new(work, results);
            worker_loop(unit, &mut link, compute.as_ref())
        })
    }

    fn spawn_sink(&self, mut results: Receiver<ResultItem>) -> Result<ThreadUnit> {
        let display_cap = self.display_cap;
        let mut out = (self.output)();
        Self::spawn(UnitId::Sink, move || {
            sink_loop(UnitId::Sink, &mut results, &mut out, display_cap)
        })
    }
}

/// A worker or sink running on an OS thread.
#[derive(Debug)]
pub struct ThreadUnit {
    unit: UnitId,
    handle: JoinHandle<Result<()>>,
}

impl ExecutionUnit for ThreadUnit {
    fn id(&self) -> UnitId {
        self.unit
    }

    fn join(self) -> Result<()> {
        match self.handle.join() {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(Error::UnitFailed {
                unit: self.unit,
                reason: e.to_string(),
            }),
            Err(payload) => Err(Error::UnitFailed {
                unit: self.unit,
                reason: panic_reason(payload.as_ref()),
            }),
        }
    }
}
