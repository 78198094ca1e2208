use crate::telemetry::{
    decrement_workers_live, increment_domain_errors, increment_results_computed,
    increment_workers_live, record_compute_duration,
};
use fibpool_core::{
    ResultItem, UnitId, WorkItem,
    channel::{Inbox, Outbox},
    compute::Compute,
    render::result_text,
};
use std::time::Instant;

/// Worker loop responsible for processing [`WorkItem`]s.
///
/// The same loop runs inside a pool thread and inside a worker child process;
/// only the `link` differs. It pops work until its own
/// [`WorkItem::Shutdown`] arrives, then returns without pushing anything else.
///
/// # Arguments
///
/// - `unit`: Identity of this worker (used for logs).
/// - `link`: Work Channel inbox and Result Channel outbox.
/// - `compute`: The function applied to every request.
///
/// # Request Types
///
/// - [`WorkItem::Request`] - computed and pushed as a
///   [`ResultItem::Computed`]. A [`fibpool_core::Error::Domain`] rejection is logged and the
///   loop continues with nothing pushed.
/// - [`WorkItem::Shutdown`] - terminates the loop.
///
/// # Errors
///
/// Returns an error only when a channel closes underneath the worker, which
/// ends this worker and nothing else.
pub fn worker_loop<L, C>(unit: UnitId, link: &mut L, compute: &C) -> fibpool_core::Result<()>
where
    L: Inbox<WorkItem> + Outbox<ResultItem>,
    C: Compute,
{
    tracing::info!("{unit} initialized");
    increment_workers_live();
    let res = serve(unit, link, compute);
    decrement_workers_live();
    res
}

fn serve<L, C>(unit: UnitId, link: &mut L, compute: &C) -> fibpool_core::Result<()>
where
    L: Inbox<WorkItem> + Outbox<ResultItem>,
    C: Compute,
{
    loop {
        let value = match link.pop()? {
            WorkItem::Shutdown => {
                tracing::debug!("{unit} received shutdown signal");
                return Ok(());
            }
            WorkItem::Request { value } => value,
        };

        tracing::info!("Calculating {}({value})...", C::NAME);
        let start = Instant::now();
        match compute.compute(value) {
            Ok(output) => {
                let elapsed = start.elapsed();
                record_compute_duration(elapsed.as_secs_f64() * 1000.0);
                tracing::info!("Done in {:.6} seconds.", elapsed.as_secs_f64());

                link.push(ResultItem::Computed {
                    source: value,
                    text: result_text(C::NAME, value, output),
                })?;
                increment_results_computed();
            }
            Err(e) if e.is_recoverable() => {
                increment_domain_errors();
                tracing::warn!("Failed! {e}");
            }
            Err(e) => return Err(e),
        }
    }
}
