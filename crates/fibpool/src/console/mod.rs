//! The interactive operator console.
//!
//! - [`input`] - line classification and the stdin line stream.
//! - [`driver`] - the accept/drain state machine on top of a [`crate::pool::Pool`].

pub mod driver;
pub mod input;

pub use driver::{ConsoleDriver, DrainCause, DriverReport, DriverState};
pub use input::{Command, classify, parse_value, parse_worker_count, stdin_lines};
