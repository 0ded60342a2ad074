//! Inclusive block-height ranges.

use std::cmp::{max, min};
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RangeError {
    #[error("Invalid range: from ({from}) is greater than to ({to})")]
    FromAfterTo { from: u64, to: u64 },
}

/// An inclusive span of block heights. `to == None` means the range is
/// open-ended and runs until the end of the requested run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawRange")]
pub struct Range {
    from: u64,
    to: Option<u64>,
}

#[derive(Deserialize)]
struct RawRange {
    #[serde(default)]
    from: u64,
    #[serde(default)]
    to: Option<u64>,
}

impl TryFrom<RawRange> for Range {
    type Error = RangeError;

    fn try_from(raw: RawRange) -> Result<Self, Self::Error> {
        Range::new(raw.from, raw.to)
    }
}

impl Range {
    pub fn new(from: u64, to: Option<u64>) -> Result<Self, RangeError> {
        match to {
            Some(to) if from > to => Err(RangeError::FromAfterTo { from, to }),
            _ => Ok(Self { from, to }),
        }
    }

    /// `[from, ∞)`
    pub fn starting_at(from: u64) -> Self {
        Self { from, to: None }
    }

    /// `[from, to]`
    pub fn bounded(from: u64, to: u64) -> Result<Self, RangeError> {
        Self::new(from, Some(to))
    }

    /// The whole chain, `[0, ∞)`.
    pub fn full() -> Self {
        Self::starting_at(0)
    }

    pub fn from(&self) -> u64 {
        self.from
    }

    pub fn to(&self) -> Option<u64> {
        self.to
    }

    pub fn is_bounded(&self) -> bool {
        self.to.is_some()
    }

    pub fn contains(&self, height: u64) -> bool {
        height >= self.from && self.to.map_or(true, |to| height <= to)
    }

    /// Overlapping sub-range of `self` and `other`, or `None` if they are disjoint.
    pub fn intersection(&self, other: &Range) -> Option<Range> {
        let from = max(self.from, other.from);
        let to = match (self.to, other.to) {
            (Some(a), Some(b)) => Some(min(a, b)),
            (Some(a), None) => Some(a),
            (None, b) => b,
        };
        match to {
            Some(to) if from > to => None,
            _ => Some(Range { from, to }),
        }
    }

    /// Parts of `self` not covered by `other`: zero, one or two ranges, left
    /// remainder first.
    pub fn difference(&self, other: &Range) -> Vec<Range> {
        let mut remainder = Vec::with_capacity(2);

        if self.from < other.from {
            let left_to = other.from - 1;
            remainder.push(Range {
                from: self.from,
                to: Some(self.to.map_or(left_to, |to| min(to, left_to))),
            });
        }

        // An open-ended `other` leaves nothing on the right, and neither does
        // one that ends at u64::MAX.
        if let Some(right_from) = other.to.and_then(|to| to.checked_add(1)) {
            let extends_past = self.to.map_or(true, |to| to >= right_from);
            if extends_past {
                remainder.push(Range {
                    from: max(self.from, right_from),
                    to: self.to,
                });
            }
        }

        remainder
    }

    /// Number of heights in the range up to and including `height`, which is
    /// zero when `height` is below `from`.
    pub fn len_until(&self, height: u64) -> u64 {
        if height < self.from {
            return 0;
        }
        let end = self.to.map_or(height, |to| min(to, height));
        end - self.from + 1
    }
}

impl fmt::Display for Range {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to {
            Some(to) => write!(f, "[{}, {}]", self.from, to),
            None => write!(f, "[{}, ∞)", self.from),
        }
    }
}

impl Default for Range {
    fn default() -> Self {
        Self::full()
    }
}
