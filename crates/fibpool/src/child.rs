//! Entry points for the child processes of the process backend.
//!
//! Both children keep stdout for their payload (frames for a worker, rendered
//! results for the sink) and log to stderr like the console does.

use crate::pool::{sink::sink_loop, worker::worker_loop};
use anyhow::Context;
use fibpool_core::{ResultItem, UnitId, compute::Fibonacci, wire::FrameReader, wire::PullLink};
use std::io;

/// Runs worker `index` over stdin/stdout until its sentinel arrives.
///
/// # Errors
///
/// Returns an error if the parent closes the pipes before the sentinel.
pub fn run_worker(index: usize) -> anyhow::Result<()> {
    let unit = UnitId::Worker(index);
    let span = tracing::info_span!("unit", id = %unit);
    let _enter = span.enter();

    let mut link = PullLink::new(io::stdin().lock(), io::stdout().lock());
    worker_loop(unit, &mut link, &Fibonacci).with_context(|| format!("{unit} stopped early"))
}

/// Runs the result sink over stdin, rendering to stdout.
///
/// # Errors
///
/// Returns an error if stdin closes before the sentinel or stdout fails.
pub fn run_sink(display_cap: usize) -> anyhow::Result<()> {
    let unit = UnitId::Sink;
    let span = tracing::info_span!("unit", id = %unit);
    let _enter = span.enter();

    let mut results = FrameReader::<_, ResultItem>::new(io::stdin().lock());
    let mut out = io::stdout().lock();
    sink_loop(unit, &mut results, &mut out, display_cap).with_context(|| format!("{unit} stopped early"))?;

    if results.skipped() > 0 {
        tracing::warn!("{unit} skipped {} undecodable frames", results.skipped());
    }
    Ok(())
}
