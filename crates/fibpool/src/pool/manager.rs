use crate::backend::{Backend, ExecutionUnit};
use crossbeam_channel::{Receiver, Sender};
use fibpool_core::{
    Result, ResultItem, UnitId, WorkItem,
    channel::{Outbox, unbounded},
};
use std::num::NonZeroUsize;

/// What happened during [`Pool::shutdown`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Workers that were started.
    pub workers: usize,
    /// Sentinels pushed onto the Work Channel.
    pub work_sentinels: usize,
    /// Sentinels pushed onto the Result Channel.
    pub result_sentinels: usize,
    /// Items left on the Work Channel after every unit was joined.
    pub residual_work: usize,
    /// Items left on the Result Channel after every unit was joined.
    pub residual_results: usize,
    /// Units whose join reported a failure.
    pub failed_units: Vec<UnitId>,
}

impl ShutdownReport {
    /// `true` when every unit stopped on its own sentinel and both channels
    /// were left empty.
    pub fn is_clean(&self) -> bool {
        self.failed_units.is_empty() && self.residual_work == 0 && self.residual_results == 0
    }
}

/// A running set of N workers and one result sink.
///
/// The pool owns the only producer handles the console ever uses. It also
/// keeps a receiver of each channel, which lets it report residual items after
/// shutdown and guarantees a push never fails while the pool is alive.
pub struct Pool<U: ExecutionUnit> {
    work_tx: Sender<WorkItem>,
    work_rx: Receiver<WorkItem>,
    result_tx: Sender<ResultItem>,
    result_rx: Receiver<ResultItem>,
    workers: Vec<U>,
    sink: U,
}

impl<U: ExecutionUnit> Pool<U> {
    /// Creates both channels and starts `num_workers` workers plus the sink.
    ///
    /// # Errors
    ///
    /// Returns the backend's spawn error. Units already running at that point
    /// are stopped through the regular sentinel protocol before returning.
    pub fn start<B>(backend: &B, num_workers: NonZeroUsize) -> Result<Self>
    where
        B: Backend<Unit = U>,
    {
        tracing::info!("Spinning up {num_workers} workers and the result sink...");
        let (work_tx, work_rx) = unbounded();
        let (result_tx, result_rx) = unbounded();

        let mut workers = Vec::with_capacity(num_workers.get());
        for index in 0..num_workers.get() {
            match backend.spawn_worker(index, work_rx.clone(), result_tx.clone()) {
                Ok(unit) => workers.push(unit),
                Err(e) => {
                    tracing::error!("Failed to start worker-{index}: {e}");
                    stop_workers(&work_tx, workers);
                    return Err(e);
                }
            }
        }

        let sink = match backend.spawn_sink(result_rx.clone()) {
            Ok(sink) => sink,
            Err(e) => {
                tracing::error!("Failed to start the result sink: {e}");
                stop_workers(&work_tx, workers);
                return Err(e);
            }
        };

        tracing::info!("Units ready");
        Ok(Self {
            work_tx,
            work_rx,
            result_tx,
            result_rx,
            workers,
            sink,
        })
    }

    /// Number of workers started.
    pub fn workers(&self) -> usize {
        self.workers.len()
    }

    /// Enqueues one request on the Work Channel. Never blocks.
    ///
    /// # Errors
    ///
    /// Returns [`fibpool_core::Error::ChannelClosed`] if the Work Channel has
    /// no receiver left, which cannot happen while the pool is alive.
    pub fn submit(&self, value: i64) -> Result<()> {
        self.work_tx.clone().push(WorkItem::Request { value })
    }

    /// Drains and stops every unit.
    ///
    /// 1. Push one [`WorkItem::Shutdown`] per worker. Requests already queued
    ///    are ahead of them and get computed first.
    /// 2. Join every worker. A failing worker is logged and recorded; the
    ///    remaining joins still happen.
    /// 3. Push one [`ResultItem::Shutdown`]. Every result is already queued
    ///    ahead of it because all producers have stopped.
    /// 4. Join the sink.
    ///
    /// Joins block without a timeout.
    ///
    /// # Errors
    ///
    /// Returns an error only if a sentinel cannot be pushed. Unit failures are
    /// reported in [`ShutdownReport::failed_units`].
    pub fn shutdown(self) -> Result<ShutdownReport> {
        let Self {
            mut work_tx,
            work_rx,
            mut result_tx,
            result_rx,
            workers,
            sink,
        } = self;

        tracing::info!("Finishing outstanding calculations and stopping all units...");
        let num_workers = workers.len();
        let mut work_sentinels = 0;
        for _ in 0..num_workers {
            work_tx.push(WorkItem::Shutdown)?;
            work_sentinels += 1;
        }
        let mut failed_units = join_all(workers);

        let mut result_sentinels = 0;
        result_tx.push(ResultItem::Shutdown)?;
        result_sentinels += 1;
        failed_units.extend(join_all([sink]));

        let report = ShutdownReport {
            workers: num_workers,
            work_sentinels,
            result_sentinels,
            residual_work: work_rx.len(),
            residual_results: result_rx.len(),
            failed_units,
        };
        if report.is_clean() {
            tracing::info!("All units re-joined");
        } else {
            tracing::warn!("Stopped with {report:?}");
        }
        Ok(report)
    }
}

/// Joins every unit, returning the ones that failed.
fn join_all<U: ExecutionUnit>(units: impl IntoIterator<Item = U>) -> Vec<UnitId> {
    let mut failed = Vec::new();
    for unit in units {
        let id = unit.id();
        match unit.join() {
            Ok(()) => tracing::debug!("{id} re-joined"),
            Err(e) => {
                tracing::error!("{e}");
                failed.push(id);
            }
        }
    }
    failed
}

/// Stops workers started before a failed startup.
fn stop_workers<U: ExecutionUnit>(work_tx: &Sender<WorkItem>, workers: Vec<U>) {
    for _ in 0..workers.len() {
        if work_tx.send(WorkItem::Shutdown).is_err() {
            break;
        }
    }
    join_all(workers);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::ThreadBackend;
    use fibpool_core::{Error, compute::Compute, compute::Fibonacci};
    use std::io::Write;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().write(buf)
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl SharedBuf {
        fn lines(&self) -> Vec<String> {
            String::from_utf8(self.0.lock().unwrap().clone())
                .unwrap()
                .lines()
                .map(str::to_owned)
                .collect()
        }
    }

    fn backend<C: Compute>(compute: C) -> (ThreadBackend<C>, SharedBuf) {
        let buf = SharedBuf::default();
        let out = buf.clone();
        let backend = ThreadBackend::new(compute, 80).with_output(move || Box::new(out.clone()));
        (backend, buf)
    }

    fn n(workers: usize) -> NonZeroUsize {
        NonZeroUsize::new(workers).unwrap()
    }

    #[test]
    fn immediate_shutdown_uses_exact_sentinel_counts() {
        for workers in 1..=8 {
            let (backend, out) = backend(Fibonacci);
            let pool = Pool::start(&backend, n(workers)).unwrap();
            assert_eq!(pool.workers(), workers);

            let report = pool.shutdown().unwrap();
            assert_eq!(
                report,
                ShutdownReport {
                    workers,
                    work_sentinels: workers,
                    result_sentinels: 1,
                    ..Default::default()
                }
            );
            assert!(out.lines().is_empty());
        }
    }

    #[test]
    fn every_counted_sentinel_is_consumed() {
        let (backend, _out) = backend(Fibonacci);
        let pool = Pool::start(&backend, n(4)).unwrap();
        let work_rx = pool.work_rx.clone();
        let result_rx = pool.result_rx.clone();

        let report = pool.shutdown().unwrap();
        // Each counted push was taken off its channel by exactly one unit.
        assert_eq!(report.work_sentinels, 4);
        assert_eq!(report.result_sentinels, 1);
        assert!(work_rx.is_empty());
        assert!(result_rx.is_empty());
    }

    #[test]
    fn every_accepted_request_is_rendered_once() {
        let (backend, out) = backend(Fibonacci);
        let pool = Pool::start(&backend, n(3)).unwrap();
        for value in 1..=30 {
            pool.submit(value).unwrap();
        }
        let report = pool.shutdown().unwrap();
        assert!(report.is_clean());

        let lines = out.lines();
        assert_eq!(lines.len(), 30);
        for value in 1..=30 {
            let needle = format!(": Fibonacci({value}) is ");
            assert_eq!(lines.iter().filter(|l| l.contains(&needle)).count(), 1);
        }
        assert!(lines.iter().any(|l| l.ends_with(": Fibonacci(30) is 832040")));
    }

    #[test]
    fn domain_errors_produce_no_result() {
        let (backend, out) = backend(Fibonacci);
        let pool = Pool::start(&backend, n(2)).unwrap();
        pool.submit(-1).unwrap();
        pool.submit(0).unwrap();
        pool.submit(6).unwrap();
        let report = pool.shutdown().unwrap();

        assert!(report.is_clean());
        let lines = out.lines();
        assert_eq!(lines.len(), 1);
        assert!(lines[0].ends_with(": Fibonacci(6) is 8"));
    }

    struct Unlucky;

    impl Compute for Unlucky {
        type Output = i64;
        const NAME: &'static str = "Unlucky";

        fn compute(&self, value: i64) -> fibpool_core::Result<i64> {
            if value == 13 {
                panic!("unlucky number");
            }
            if value <= 0 {
                return Err(Error::Domain { value });
            }
            Ok(value * 2)
        }
    }

    #[test]
    fn a_crashed_worker_does_not_block_shutdown() {
        let (backend, out) = backend(Unlucky);
        let pool = Pool::start(&backend, n(2)).unwrap();
        pool.submit(13).unwrap();
        let report = pool.shutdown().unwrap();

        assert_eq!(report.failed_units.len(), 1);
        assert!(matches!(report.failed_units[0], UnitId::Worker(_)));
        // The crashed worker never consumed its sentinel.
        assert_eq!(report.residual_work, 1);
        assert_eq!(report.residual_results, 0);
        assert!(!report.is_clean());
        assert!(out.lines().is_empty());
    }

    #[test]
    fn survivors_keep_serving_after_a_crash() {
        let (backend, out) = backend(Unlucky);
        let pool = Pool::start(&backend, n(3)).unwrap();
        pool.submit(13).unwrap();
        for value in 1..=5 {
            pool.submit(value).unwrap();
        }
        let report = pool.shutdown().unwrap();

        assert_eq!(report.failed_units.len(), 1);
        assert_eq!(out.lines().len(), 5);
    }
}
