#![doc = include_str!("../README.md")]

pub mod backend;
pub mod child;
pub mod config;
pub mod console;
pub mod oneshot;
pub mod pool;
pub mod telemetry;
