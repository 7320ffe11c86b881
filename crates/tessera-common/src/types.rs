//! Scalar values and value ranges.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A single value produced by an aggregate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Scalar {
    Int(i32),
    Long(i64),
    Float(f64),
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Int(v) => write!(f, "{}", v),
            Scalar::Long(v) => write!(f, "{}", v),
            Scalar::Float(v) => write!(f, "{:.2}", v),
        }
    }
}

/// Half-open value interval `[low, high)` used by selects.
///
/// A missing bound is unbounded on that side, so `ValueRange::all()` matches
/// every `i32` including `i32::MAX`. A range with `low >= high` is empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ValueRange {
    pub low: Option<i32>,
    pub high: Option<i32>,
}

impl ValueRange {
    pub fn new(low: Option<i32>, high: Option<i32>) -> Self {
        Self { low, high }
    }

    /// Range with both bounds given.
    pub fn bounded(low: i32, high: i32) -> Self {
        Self::new(Some(low), Some(high))
    }

    pub fn all() -> Self {
        Self::new(None, None)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        matches!((self.low, self.high), (Some(l), Some(h)) if l >= h)
    }

    #[inline]
    pub fn is_below(&self, value: i32) -> bool {
        self.low.is_some_and(|l| value < l)
    }

    #[inline]
    pub fn is_above(&self, value: i32) -> bool {
        self.high.is_some_and(|h| value >= h)
    }

    #[inline]
    pub fn contains(&self, value: i32) -> bool {
        !self.is_below(value) && !self.is_above(value)
    }
}
