//! Bit sets of enum ordinals
//!
//! An enum sample is stored as an `i32` bit set: bit `n` is set if ordinal `n`
//! was active. Down-sampled slots hold the union of all ordinals seen in the
//! slot. Two negative values are reserved as sentinels.
//!
//! ```text
//! NO_VALUE  = -1  (all bits set)   no sample could be recorded
//! PENDING   = -2                   not yet known / nothing recorded
//! 0b0101    = ordinals {0, 2}
//! ```
//!
//! Ordinals 0..=30 are usable; bit 31 is the sign bit and never a valid ordinal.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The ordinal of one enum value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct HistoryEnumOrdinal(pub i32);

impl HistoryEnumOrdinal {
    pub const NO_VALUE: HistoryEnumOrdinal = HistoryEnumOrdinal(-1);
    pub const PENDING: HistoryEnumOrdinal = HistoryEnumOrdinal(-2);
    pub const BOOLEAN_FALSE: HistoryEnumOrdinal = HistoryEnumOrdinal(0);
    pub const BOOLEAN_TRUE: HistoryEnumOrdinal = HistoryEnumOrdinal(1);
    /// The largest ordinal that fits into a `HistoryEnumSet`
    pub const MAX: HistoryEnumOrdinal = HistoryEnumOrdinal(30);

    pub fn value(&self) -> i32 {
        self.0
    }

    pub fn is_no_value(&self) -> bool {
        *self == Self::NO_VALUE
    }

    pub fn is_pending(&self) -> bool {
        *self == Self::PENDING
    }
}

impl fmt::Display for HistoryEnumOrdinal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::NO_VALUE => write!(f, "NoValue"),
            Self::PENDING => write!(f, "Pending"),
            HistoryEnumOrdinal(value) => write!(f, "{}", value),
        }
    }
}

/// A set of enum ordinals packed into an `i32`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HistoryEnumSet(pub i32);

impl HistoryEnumSet {
    pub const NO_VALUE: HistoryEnumSet = HistoryEnumSet(-1);
    pub const PENDING: HistoryEnumSet = HistoryEnumSet(-2);
    pub const EMPTY: HistoryEnumSet = HistoryEnumSet(0);
    pub const BOOLEAN_FALSE: HistoryEnumSet = HistoryEnumSet(1);
    pub const BOOLEAN_TRUE: HistoryEnumSet = HistoryEnumSet(1 << 1);

    /// The set containing only the n-th enum value
    pub fn for_enum_value(ordinal: i32) -> Self {
        assert!(
            (0..=HistoryEnumOrdinal::MAX.0).contains(&ordinal),
            "ordinal {} out of range",
            ordinal
        );
        HistoryEnumSet(1 << ordinal)
    }

    /// Converts an ordinal (including the sentinels) into a set
    pub fn for_enum_ordinal(ordinal: HistoryEnumOrdinal) -> Self {
        match ordinal {
            HistoryEnumOrdinal::NO_VALUE => Self::NO_VALUE,
            HistoryEnumOrdinal::PENDING => Self::PENDING,
            HistoryEnumOrdinal(value) => Self::for_enum_value(value),
        }
    }

    pub fn bits(&self) -> i32 {
        self.0
    }

    pub fn is_no_value(&self) -> bool {
        *self == Self::NO_VALUE
    }

    pub fn is_pending(&self) -> bool {
        *self == Self::PENDING
    }

    /// True for real sets (not one of the sentinels)
    pub fn is_value(&self) -> bool {
        self.0 >= 0
    }

    pub fn is_set(&self, ordinal: HistoryEnumOrdinal) -> bool {
        self.is_value()
            && (0..=HistoryEnumOrdinal::MAX.0).contains(&ordinal.0)
            && self.0 & (1 << ordinal.0) != 0
    }

    /// The lowest set ordinal.
    ///
    /// Sentinels map to their ordinal counterparts; an empty set returns `NO_VALUE`.
    pub fn first_set_ordinal(&self) -> HistoryEnumOrdinal {
        match *self {
            Self::NO_VALUE => HistoryEnumOrdinal::NO_VALUE,
            Self::PENDING => HistoryEnumOrdinal::PENDING,
            HistoryEnumSet(0) => HistoryEnumOrdinal::NO_VALUE,
            HistoryEnumSet(bits) => HistoryEnumOrdinal(bits.trailing_zeros() as i32),
        }
    }

    /// Iterates the set ordinals in ascending order. Sentinels yield nothing.
    pub fn set_ordinals(&self) -> impl Iterator<Item = HistoryEnumOrdinal> + '_ {
        let bits = if self.is_value() { self.0 } else { 0 };
        (0..=HistoryEnumOrdinal::MAX.0)
            .filter(move |ordinal| bits & (1 << ordinal) != 0)
            .map(HistoryEnumOrdinal)
    }

    /// Number of set ordinals
    pub fn count(&self) -> u32 {
        if self.is_value() {
            self.0.count_ones()
        } else {
            0
        }
    }

    /// Union of two sets. Pending is the neutral element; NoValue only
    /// survives if the other side has no real value.
    pub fn union(&self, other: HistoryEnumSet) -> HistoryEnumSet {
        match (self.is_value(), other.is_value()) {
            (true, true) => HistoryEnumSet(self.0 | other.0),
            (true, false) => *self,
            (false, true) => other,
            (false, false) => {
                if self.is_no_value() || other.is_no_value() {
                    Self::NO_VALUE
                } else {
                    Self::PENDING
                }
            }
        }
    }
}

impl fmt::Display for HistoryEnumSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::NO_VALUE => write!(f, "NoValue"),
            Self::PENDING => write!(f, "Pending"),
            HistoryEnumSet(bits) => write!(f, "{:#b}", bits),
        }
    }
}

/// Decides which ordinal represents an aggregated enum slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum EnumAggregationMode {
    /// The lowest ordinal that was active at any time in the slot
    #[default]
    ByOrdinal,
    /// The ordinal that was active for the largest part of the slot
    MostTime,
}
