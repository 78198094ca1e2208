//! # Protocol Types
//!
//! This module defines the payloads that travel through the two queues of the
//! dispatch engine and the identity attached to every execution unit. Both the
//! in-memory (thread) and the pipe-based (process) transports carry exactly
//! these types, so the coordination protocol is identical for each backend.
//!
//! ## Overview
//!
//! - [`WorkItem`] - produced by the console driver, consumed by one worker
//! - [`ResultItem`] - produced by a worker, consumed by the result sink
//! - [`Upstream`] - frames a worker child process writes back to its parent
//! - [`UnitId`] - diagnostic identity assigned at construction time
//!
//! Sentinels are dedicated enum variants rather than reserved strings, so a
//! malformed payload can never be mistaken for a control value.

use core::fmt;
use serde::{Deserialize, Serialize};

/// A unit of work on the Work Channel.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkItem {
    /// Compute the function for `value`.
    ///
    /// The console driver only ever submits positive values, but the field is
    /// signed so that workers can re-validate and reject anything else.
    Request { value: i64 },

    /// Tells exactly one worker to terminate.
    Shutdown,
}

/// A unit of output on the Result Channel.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultItem {
    /// A finished computation and its already formatted text.
    Computed { source: i64, text: String },

    /// Tells the result sink to terminate.
    Shutdown,
}

impl ResultItem {
    /// Returns the submitted value this result was computed from, if any.
    pub const fn source(&self) -> Option<i64> {
        match self {
            Self::Computed { source, .. } => Some(*source),
            Self::Shutdown => None,
        }
    }
}

/// Frames written by a worker child process to its parent.
///
/// A child asks for work with [`Upstream::Pull`] instead of having work pushed
/// at it, which keeps at most one [`WorkItem`] outstanding per child. Items
/// stay in the shared queue until a worker is actually free to take them.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Upstream {
    /// The child is idle and blocked waiting for the next [`WorkItem`].
    Pull,

    /// The child produced a result for the Result Channel.
    Result(ResultItem),
}

/// Identity of an execution unit.
///
/// Assigned once when the unit is constructed and threaded through its
/// closure (threads) or command line (processes).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitId {
    /// The interactive console loop.
    Driver,
    /// The worker with the given zero-based index.
    Worker(usize),
    /// The single result sink.
    Sink,
}

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Driver => write!(f, "driver"),
            Self::Worker(n) => write!(f, "worker-{n}"),
            Self::Sink => write!(f, "sink"),
        }
    }
}
