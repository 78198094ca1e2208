//! The process backend driven directly through a [`Pool`].

use fibpool::backend::{Backend, ExecutionUnit, ProcessBackend};
use fibpool::pool::Pool;
use fibpool_core::{UnitId, channel::unbounded};
use std::num::NonZeroUsize;

fn backend() -> ProcessBackend {
    ProcessBackend::new(env!("CARGO_BIN_EXE_fibpool"), 80)
}

#[test]
fn immediate_shutdown_for_several_pool_sizes() {
    for workers in [1, 2, 4] {
        let pool = Pool::start(&backend(), NonZeroUsize::new(workers).unwrap()).unwrap();
        let report = pool.shutdown().unwrap();
        assert!(report.is_clean(), "{report:?}");
        assert_eq!(report.work_sentinels, workers);
        assert_eq!(report.result_sentinels, 1);
    }
}

#[test]
fn children_drain_all_accepted_work() {
    let pool = Pool::start(&backend(), NonZeroUsize::new(3).unwrap()).unwrap();
    for value in 1..=25 {
        pool.submit(value).unwrap();
    }
    pool.submit(0).unwrap();
    let report = pool.shutdown().unwrap();

    // Everything was consumed: requests by workers, results by the sink.
    assert!(report.is_clean(), "{report:?}");
}

#[test]
fn a_worker_child_stops_on_its_sentinel() {
    let (work_tx, work_rx) = unbounded();
    let (result_tx, result_rx) = unbounded();
    let unit = backend().spawn_worker(7, work_rx.clone(), result_tx).unwrap();
    assert_eq!(unit.id(), UnitId::Worker(7));

    work_tx.send(fibpool_core::WorkItem::Request { value: 12 }).unwrap();
    work_tx.send(fibpool_core::WorkItem::Shutdown).unwrap();
    unit.join().unwrap();

    let result = result_rx.try_recv().unwrap();
    assert_eq!(result.source(), Some(12));
    assert!(matches!(
        result,
        fibpool_core::ResultItem::Computed { ref text, .. } if text == "Fibonacci(12) is 144"
    ));
    assert!(work_rx.is_empty());
}
