//! The `compute` subcommand: one Fibonacci number, no pool.

use crate::console::input::{parse_value, read_console_line};
use anyhow::Context;
use fibpool_core::compute::{Compute, Fibonacci};
use std::io::{self, BufRead};

/// Computes the value given on the command line, or the first line of
/// `input` when none was given, and returns the full decimal result.
///
/// # Errors
///
/// Returns an error if no value arrives, or it is not a positive integer.
pub fn compute_one<R: BufRead>(value: Option<String>, mut input: R) -> anyhow::Result<String> {
    let line = match value {
        Some(value) => value,
        None => read_console_line(&mut input, &mut Vec::new())?.context("no value provided")?,
    };
    let value = parse_value(&line).context("cannot compute a Fibonacci number")?;
    Ok(Fibonacci.compute(value)?.to_string())
}

/// Prints the result of [`compute_one`] over stdin to stdout.
///
/// # Errors
///
/// Same as [`compute_one`].
pub fn run_compute(value: Option<String>) -> anyhow::Result<()> {
    let result = compute_one(value, io::stdin().lock())?;
    tracing::debug!("Computed a {} digit result", result.len());
    println!("{result}");
    Ok(())
}
