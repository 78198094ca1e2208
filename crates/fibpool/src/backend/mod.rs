//! Execution-unit providers.
//!
//! The pool only needs four things from a backend: start a worker, start the
//! sink, know who a unit is, and wait for it to terminate. Everything else
//! (sentinel counts, drain ordering) lives in [`crate::pool`] and is shared
//! by both providers.
//!
//! ## Structure
//!
//! - [`thread`] - workers and sink as named OS threads sharing the in-memory
//!   queues directly.
//! - [`process`] - workers and sink as child processes of the current binary,
//!   bridged to the in-memory queues by one relay thread per child.

pub mod process;
pub mod thread;

pub use process::{ProcessBackend, ProcessUnit};
pub use thread::{OutputFactory, ThreadBackend, ThreadUnit};

use core::any::Any;
use crossbeam_channel::{Receiver, Sender};
use fibpool_core::{Result, ResultItem, UnitId, WorkItem};

/// A running worker or sink.
pub trait ExecutionUnit: Send + 'static {
    /// Identity assigned when the unit was started.
    fn id(&self) -> UnitId;

    /// Blocks until the unit has terminated. There is no timeout.
    ///
    /// # Errors
    ///
    /// Returns [`fibpool_core::Error::UnitFailed`] if the unit panicked,
    /// exited unsuccessfully, or stopped on a channel error.
    fn join(self) -> Result<()>;
}

/// Starts execution units wired to the pool's channels.
pub trait Backend {
    type Unit: ExecutionUnit;

    /// Starts worker `index`, consuming from `work` and producing into
    /// `results`.
    ///
    /// # Errors
    ///
    /// Returns [`fibpool_core::Error::Spawn`] if the unit cannot be started.
    fn spawn_worker(
        &self,
        index: usize,
        work: Receiver<WorkItem>,
        results: Sender<ResultItem>,
    ) -> Result<Self::Unit>;

    /// Starts the result sink, the only consumer of `results`.
    ///
    /// # Errors
    ///
    /// Returns [`fibpool_core::Error::Spawn`] if the unit cannot be started.
    fn spawn_sink(&self, results: Receiver<ResultItem>) -> Result<Self::Unit>;
}

/// Extracts a readable message from a thread's panic payload.
pub(crate) fn panic_reason(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        format!("panicked: {msg}")
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        format!("panicked: {msg}")
    } else {
        "panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn panic_reason_reads_common_payloads() {
        let payload: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_reason(payload.as_ref()), "panicked: boom");
        let payload: Box<dyn Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_reason(payload.as_ref()), "panicked: bang");
        let payload: Box<dyn Any + Send> = Box::new(7_u8);
        assert_eq!(panic_reason(payload.as_ref()), "panicked");
    }
}
