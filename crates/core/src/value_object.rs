//! Value objects: equality by value, not identity.

use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};

/// Marker trait for value objects.
///
/// Value objects have no identity; two instances with the same attribute
/// values are the same value. They are immutable: "changing" one means
/// building a new one.
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}

/// A monetary amount in minor currency units (e.g. cents).
///
/// Integer arithmetic only; every operation that could overflow is checked
/// and reported as a validation failure instead of wrapping.
#[derive(
    Debug, Copy, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct MinorUnits(i64);

impl ValueObject for MinorUnits {}

impl MinorUnits {
    pub const ZERO: MinorUnits = MinorUnits(0);

    pub const fn new(amount: i64) -> Self {
        Self(amount)
    }

    pub const fn amount(self) -> i64 {
        self.0
    }

    /// `unit_price × quantity`, as used for purchase order line totals.
    pub fn line_total(unit_price: MinorUnits, quantity: i64) -> DomainResult<MinorUnits> {
        unit_price
            .0
            .checked_mul(quantity)
            .map(MinorUnits)
            .ok_or_else(|| DomainError::validation("line total overflows"))
    }

    pub fn checked_add(self, other: MinorUnits) -> DomainResult<MinorUnits> {
        self.0
            .checked_add(other.0)
            .map(MinorUnits)
            .ok_or_else(|| DomainError::validation("amount overflows"))
    }

    pub fn checked_sub(self, other: MinorUnits) -> DomainResult<MinorUnits> {
        self.0
            .checked_sub(other.0)
            .map(MinorUnits)
            .ok_or_else(|| DomainError::validation("amount overflows"))
    }

    /// Sum an iterator of amounts, failing on overflow.
    pub fn sum<I>(amounts: I) -> DomainResult<MinorUnits>
    where
        I: IntoIterator<Item = MinorUnits>,
    {
        amounts
            .into_iter()
            .try_fold(MinorUnits::ZERO, |acc, a| acc.checked_add(a))
    }

    pub fn is_negative(self) -> bool {
        self.0 < 0
    }
}

impl core::fmt::Display for MinorUnits {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}
