//! The dispatch engine: N workers feeding one result sink.
//!
//! - [`worker`] - the worker loop, identical for every backend.
//! - [`sink`] - the result sink loop.
//! - [`manager`] - channel wiring, startup and the sentinel shutdown protocol.

pub mod manager;
pub mod sink;
pub mod worker;

pub use manager::{Pool, ShutdownReport};
