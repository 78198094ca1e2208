//! Error types for the dispatch engine.
//!
//! This module defines the central `Error` enum shared by the console driver,
//! the workers, the result sink and both execution-unit backends.
//!
//! ## Error Cases
//! - `InvalidInput`: An operator line was neither a positive integer nor the
//!   exit keyword. Recovered at the console driver.
//! - `Domain`: The compute function was asked for a non-positive value.
//!   Recovered at the worker.
//! - `ChannelClosed`: The other end of a channel or pipe is gone.
//! - `Codec`: A frame could not be encoded for the wire.
//! - `Io`: Reading or writing a pipe or the console failed.
//! - `Spawn`: An execution unit could not be started.
//! - `UnitFailed`: An execution unit terminated abnormally (panic, non-zero
//!   exit status, or a fatal channel error). Never retried.

use crate::UnitId;

pub type Result<T> = core::result::Result<T, Error>;

/// Unified error type for the dispatch engine.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// The operator entered something that is not a valid request.
    #[error("Skipping invalid input '{input}': {reason}")]
    InvalidInput { input: String, reason: String },

    /// The compute function only accepts values greater than zero.
    #[error("Must provide an integer argument greater than 0, was {value}")]
    Domain { value: i64 },

    /// Internal channel send/receive failure.
    #[error("Channel error: {context}")]
    ChannelClosed { context: String },

    /// A frame could not be serialized.
    #[error("Codec error: {context}")]
    Codec { context: String },

    /// Underlying pipe or console I/O failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The backend could not start an execution unit.
    #[error("Failed to spawn {unit}: {source}")]
    Spawn {
        unit: UnitId,
        #[source]
        source: std::io::Error,
    },

    /// An execution unit terminated abnormally.
    #[error("{unit} failed: {reason}")]
    UnitFailed { unit: UnitId, reason: String },
}

impl Error {
    /// Convenience constructor for [`Error::ChannelClosed`].
    pub fn closed(context: impl Into<String>) -> Self {
        Self::ChannelClosed {
            context: context.into(),
        }
    }

    /// Returns `true` for errors a unit recovers from locally and keeps
    /// running after.
    pub const fn is_recoverable(&self) -> bool {
        matches!(self, Self::InvalidInput { .. } | Self::Domain { .. })
    }
}
