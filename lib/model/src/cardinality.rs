use std::fmt::{Display, Formatter};

/// How much an estimate can be trusted.
///
/// The variants are ordered from most to least reliable. Comparing two [Cardinality] values
/// first compares their reliability, hence a less reliable estimate is never considered to be
/// smaller than a more reliable one.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Reliability {
    /// The number of results is known.
    Exact,
    /// There are at least this many results.
    LowerBound,
    /// There are at most this many results.
    UpperBound,
    /// A heuristic guess.
    Guess,
    /// There is at least one result, nothing more is known.
    NonEmpty,
    /// No estimate is available.
    Unsupported,
}

/// A cardinality estimate tagged with its [Reliability].
///
/// The derived ordering compares the reliability first and the value second. This is the order
/// used by the planners to rank alternatives.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Cardinality {
    reliability: Reliability,
    value: u64,
}

impl Cardinality {
    pub const UNSUPPORTED: Cardinality = Cardinality {
        reliability: Reliability::Unsupported,
        value: 0,
    };

    pub const NON_EMPTY: Cardinality = Cardinality {
        reliability: Reliability::NonEmpty,
        value: 1,
    };

    pub const EMPTY: Cardinality = Cardinality::exact(0);

    pub const fn exact(value: u64) -> Self {
        Self {
            reliability: Reliability::Exact,
            value,
        }
    }

    pub const fn lower_bound(value: u64) -> Self {
        Self {
            reliability: Reliability::LowerBound,
            value,
        }
    }

    pub const fn upper_bound(value: u64) -> Self {
        Self {
            reliability: Reliability::UpperBound,
            value,
        }
    }

    pub const fn guess(value: u64) -> Self {
        Self {
            reliability: Reliability::Guess,
            value,
        }
    }

    pub fn reliability(&self) -> Reliability {
        self.reliability
    }

    /// Returns the estimated number of results.
    ///
    /// Meaningless for [Reliability::Unsupported].
    pub fn value(&self) -> u64 {
        self.value
    }

    pub fn is_unsupported(&self) -> bool {
        self.reliability == Reliability::Unsupported
    }

    /// Returns true if this estimate proves that there are no results.
    pub fn is_empty(&self) -> bool {
        matches!(
            self.reliability,
            Reliability::Exact | Reliability::UpperBound
        ) && self.value == 0
    }

    /// Sums two estimates. The result is as reliable as the least reliable input.
    #[must_use]
    pub fn add(self, other: Cardinality) -> Cardinality {
        Self::combine(self, other, u64::saturating_add)
    }

    /// Multiplies two estimates. The result is as reliable as the least reliable input.
    #[must_use]
    pub fn multiply(self, other: Cardinality) -> Cardinality {
        if self.is_empty() || other.is_empty() {
            return Cardinality::EMPTY;
        }
        Self::combine(self, other, u64::saturating_mul)
    }

    /// Caps this estimate with a known maximum number of results (e.g. a `LIMIT`).
    #[must_use]
    pub fn limit(self, limit: u64) -> Cardinality {
        match self.reliability {
            Reliability::Exact => Cardinality::exact(self.value.min(limit)),
            Reliability::Unsupported | Reliability::NonEmpty | Reliability::LowerBound => {
                Cardinality::upper_bound(limit)
            }
            Reliability::UpperBound | Reliability::Guess => Cardinality {
                reliability: self.reliability,
                value: self.value.min(limit),
            },
        }
    }

    /// Returns the estimate of what remains after `consumed` results have been produced.
    #[must_use]
    pub fn remaining(self, consumed: u64) -> Cardinality {
        match self.reliability {
            Reliability::Unsupported | Reliability::NonEmpty => self,
            _ => Cardinality {
                reliability: self.reliability,
                value: self.value.saturating_sub(consumed),
            },
        }
    }

    /// Turns an exact estimate into an upper bound. Used by operators that may drop results.
    #[must_use]
    pub fn at_most(self) -> Cardinality {
        match self.reliability {
            Reliability::Exact => Cardinality::upper_bound(self.value),
            _ => self,
        }
    }

    fn combine(lhs: Cardinality, rhs: Cardinality, op: impl Fn(u64, u64) -> u64) -> Cardinality {
        let reliability = lhs.reliability.max(rhs.reliability);
        match reliability {
            Reliability::Unsupported => Cardinality::UNSUPPORTED,
            Reliability::NonEmpty => Cardinality::NON_EMPTY,
            _ => Cardinality {
                reliability,
                value: op(lhs.value, rhs.value),
            },
        }
    }
}

impl Display for Cardinality {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.reliability {
            Reliability::Unsupported => f.write_str("Unsupported"),
            Reliability::NonEmpty => f.write_str("NonEmpty"),
            reliability => write!(f, "{reliability:?}({})", self.value),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reliability_dominates_value() {
        assert!(Cardinality::exact(1_000) < Cardinality::guess(1));
        assert!(Cardinality::guess(5) < Cardinality::guess(6));
        assert!(Cardinality::guess(u64::MAX) < Cardinality::NON_EMPTY);
        assert!(Cardinality::NON_EMPTY < Cardinality::UNSUPPORTED);
    }

    #[test]
    fn arithmetic_keeps_least_reliable_tier() {
        let sum = Cardinality::exact(3).add(Cardinality::guess(4));
        assert_eq!(sum, Cardinality::guess(7));

        let product = Cardinality::exact(0).multiply(Cardinality::UNSUPPORTED);
        assert!(product.is_empty());

        let product = Cardinality::exact(2).multiply(Cardinality::UNSUPPORTED);
        assert!(product.is_unsupported());
    }

    #[test]
    fn limit_and_remaining() {
        assert_eq!(Cardinality::exact(10).limit(3), Cardinality::exact(3));
        assert_eq!(Cardinality::UNSUPPORTED.limit(3), Cardinality::upper_bound(3));
        assert_eq!(Cardinality::exact(10).remaining(4), Cardinality::exact(6));
        assert_eq!(Cardinality::guess(2).remaining(4), Cardinality::guess(0));
        assert_eq!(Cardinality::exact(2).to_string(), "Exact(2)");
    }
}
