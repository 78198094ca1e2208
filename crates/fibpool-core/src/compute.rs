//! The CPU-bound work executed by every worker.
//!
//! [`Compute`] is the only boundary the engine calls across: a pure,
//! deterministic function of one integer. [`Fibonacci`] is the production
//! implementation; its result grows without bound, so it is carried in a
//! [`Natural`] rather than a fixed-width integer.

use crate::{Error, Result};
use core::{fmt, ops::Add};

/// Limb radix. Each limb holds 18 decimal digits, which keeps `Display` a
/// straight concatenation and leaves headroom for the carry in a `u64`.
const BASE: u64 = 1_000_000_000_000_000_000;
const BASE_DIGITS: usize = 18;

/// An arbitrary-precision non-negative integer.
///
/// Stored as little-endian limbs in base 10^18. The most significant limb is
/// never zero, except for the value zero itself which is a single `0` limb.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Natural {
    limbs: Vec<u64>,
}

impl Natural {
    pub fn one() -> Self {
        Self { limbs: vec![1] }
    }

    /// Number of decimal digits in the value.
    pub fn digits(&self) -> usize {
        let top = self.limbs[self.limbs.len() - 1];
        let top_digits = top.checked_ilog10().map_or(1, |d| d as usize + 1);
        (self.limbs.len() - 1) * BASE_DIGITS + top_digits
    }
}

impl From<u64> for Natural {
    fn from(value: u64) -> Self {
        if value < BASE {
            Self { limbs: vec![value] }
        } else {
            Self {
                limbs: vec![value % BASE, value / BASE],
            }
        }
    }
}

impl Add for &Natural {
    type Output = Natural;

    fn add(self, rhs: &Natural) -> Natural {
        let (long, short) = if self.limbs.len() >= rhs.limbs.len() {
            (&self.limbs, &rhs.limbs)
        } else {
            (&rhs.limbs, &self.limbs)
        };

        let mut limbs = Vec::with_capacity(long.len() + 1);
        let mut carry = 0;
        for (i, &limb) in long.iter().enumerate() {
            let sum = limb + short.get(i).copied().unwrap_or(0) + carry;
            limbs.push(sum % BASE);
            carry = sum / BASE;
        }
        if carry > 0 {
            limbs.push(carry);
        }

        Natural { limbs }
    }
}

impl fmt::Display for Natural {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut limbs = self.limbs.iter().rev();
        if let Some(top) = limbs.next() {
            write!(f, "{top}")?;
        }
        for limb in limbs {
            write!(f, "{limb:0width$}", width = BASE_DIGITS)?;
        }
        Ok(())
    }
}

/// A pure, deterministic, CPU-bound function of one integer.
///
/// Implementations must reject `n <= 0` with [`Error::Domain`] and must
/// always terminate; the engine has no way to cancel a running computation.
pub trait Compute: Send + Sync + 'static {
    /// Result of a successful computation.
    type Output: fmt::Display;

    /// Name used when formatting result text, e.g. `Fibonacci(10) is 55`.
    const NAME: &'static str;

    /// Computes the function for `n`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Domain`] if `n <= 0`.
    fn compute(&self, n: i64) -> Result<Self::Output>;
}

/// Iterative Fibonacci recurrence with `F(1) = F(2) = 1`.
#[derive(Clone, Copy, Debug, Default)]
pub struct Fibonacci;

impl Compute for Fibonacci {
    type Output = Natural;

    const NAME: &'static str = "Fibonacci";

    fn compute(&self, n: i64) -> Result<Natural> {
        if n <= 0 {
            return Err(Error::Domain { value: n });
        }

        let mut last = Natural::one();
        let mut curr = Natural::one();
        for _ in 2..n {
            let next = &last + &curr;
            last = core::mem::replace(&mut curr, next);
        }
        Ok(curr)
    }
}
