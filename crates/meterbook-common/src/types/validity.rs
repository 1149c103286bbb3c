//! Validity intervals
//!
//! Catalog rows (queries, products, discounts) are in effect during a
//! half-open interval `[start, end)`. Either end may be unbounded.

use std::ops::Bound;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::postgres::types::PgRange;

use crate::error::ValidationError;

/// Half-open validity interval `[start, end)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Validity {
    /// Inclusive lower bound, `None` for unbounded
    pub start: Option<DateTime<Utc>>,
    /// Exclusive upper bound, `None` for unbounded
    pub end: Option<DateTime<Utc>>,
}

impl Validity {
    /// Interval covering all of time
    pub fn unbounded() -> Self {
        Self::default()
    }

    /// Interval `[start, end)`
    pub fn between(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            start: Some(start),
            end: Some(end),
        }
    }

    /// Interval `[start, ∞)`
    pub fn since(start: DateTime<Utc>) -> Self {
        Self {
            start: Some(start),
            end: None,
        }
    }

    /// Interval `(-∞, end)`
    pub fn until(end: DateTime<Utc>) -> Self {
        Self {
            start: None,
            end: Some(end),
        }
    }
}

/// Stored as `tstzrange` with `[start, end)` bounds
impl From<Validity> for PgRange<DateTime<Utc>> {
    fn from(v: Validity) -> Self {
        PgRange {
            start: v.start.map_or(Bound::Unbounded, Bound::Included),
            end: v.end.map_or(Bound::Unbounded, Bound::Excluded),
        }
    }
}

/// Only `[start, end)` shaped ranges are accepted, with either end possibly
/// unbounded. `tstzrange` is continuous, so other bound kinds cannot be
/// rewritten into that shape without changing which instants they cover.
impl TryFrom<PgRange<DateTime<Utc>>> for Validity {
    type Error = ValidationError;

    fn try_from(range: PgRange<DateTime<Utc>>) -> Result<Self, Self::Error> {
        let start = match range.start {
            Bound::Included(ts) => Some(ts),
            Bound::Unbounded => None,
            Bound::Excluded(_) => return Err(unsupported(&range)),
        };
        let end = match range.end {
            Bound::Excluded(ts) => Some(ts),
            Bound::Unbounded => None,
            Bound::Included(_) => return Err(unsupported(&range)),
        };
        Ok(Self { start, end })
    }
}

fn unsupported(range: &PgRange<DateTime<Utc>>) -> ValidationError {
    ValidationError::RangeBounds(format!("{:?}..{:?}", range.start, range.end))
}
