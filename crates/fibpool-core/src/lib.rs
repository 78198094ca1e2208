#![doc = include_str!("../README.md")]

mod common;
pub use common::*;

pub mod channel;
pub mod compute;
pub mod render;
pub mod wire;
