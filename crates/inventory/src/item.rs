use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use siteops_core::{DomainError, DomainResult, Entity, InventoryItemId, PurchaseId};

use crate::key::InventoryKey;

/// A stock record.
///
/// `quantity` is the authoritative counter. `qty` is a legacy mirror that
/// older reports still read; every mutation keeps the two equal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryItem {
    pub id: InventoryItemId,
    pub name: String,
    pub unit: String,
    pub quantity: i64,
    pub qty: i64,
    /// Site purchase this record was seeded from, if any.
    pub purchase_id: Option<PurchaseId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl InventoryItem {
    /// A new record holding `quantity` units.
    pub fn new(
        name: impl Into<String>,
        unit: impl Into<String>,
        quantity: i64,
        now: DateTime<Utc>,
    ) -> DomainResult<Self> {
        let name = name.into();
        let unit = unit.into();
        if name.trim().is_empty() {
            return Err(DomainError::validation("inventory name cannot be empty"));
        }
        if unit.trim().is_empty() {
            return Err(DomainError::validation("inventory unit cannot be empty"));
        }
        if quantity < 0 {
            return Err(DomainError::validation("inventory quantity cannot be negative"));
        }
        Ok(Self {
            id: InventoryItemId::new(),
            name: name.trim().to_string(),
            unit: unit.trim().to_string(),
            quantity,
            qty: quantity,
            purchase_id: None,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn seeded_from_purchase(mut self, purchase_id: PurchaseId) -> Self {
        self.purchase_id = Some(purchase_id);
        self
    }

    pub fn key(&self) -> InventoryKey {
        InventoryKey::new(&self.name, &self.unit)
    }

    /// Add `amount` units. Increments cannot race into a negative balance,
    /// so the only failure is a non-positive amount or overflow.
    pub fn credit(&mut self, amount: i64, now: DateTime<Utc>) -> DomainResult<()> {
        if amount <= 0 {
            return Err(DomainError::validation("credit amount must be positive"));
        }
        let next = self
            .quantity
            .checked_add(amount)
            .ok_or_else(|| DomainError::validation("inventory quantity overflows"))?;
        self.set_quantity(next, now);
        Ok(())
    }

    /// Remove `amount` units only if at least that many are on hand.
    ///
    /// Returns `false` (and changes nothing) when stock is short; this is the
    /// compare-and-set at the heart of handout.
    pub fn debit_if_available(&mut self, amount: i64, now: DateTime<Utc>) -> bool {
        if amount <= 0 || self.quantity < amount {
            return false;
        }
        self.set_quantity(self.quantity - amount, now);
        true
    }

    fn set_quantity(&mut self, quantity: i64, now: DateTime<Utc>) {
        self.quantity = quantity;
        self.qty = quantity;
        self.updated_at = now;
    }
}

impl Entity for InventoryItem {
    type Id = InventoryItemId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn cement(quantity: i64) -> InventoryItem {
        InventoryItem::new("Cement", "bags", quantity, Utc::now()).unwrap()
    }

    #[test]
    fn rejects_blank_name_and_negative_quantity() {
        assert!(InventoryItem::new("  ", "bags", 1, Utc::now()).is_err());
        assert!(InventoryItem::new("Cement", "bags", -1, Utc::now()).is_err());
    }

    #[test]
    fn credit_keeps_mirror_in_sync() {
        let mut item = cement(5);
        item.credit(7, Utc::now()).unwrap();
        assert_eq!(item.quantity, 12);
        assert_eq!(item.qty, 12);
    }

    #[test]
    fn short_debit_changes_nothing() {
        let mut item = cement(3);
        assert!(!item.debit_if_available(4, Utc::now()));
        assert_eq!(item.quantity, 3);
        assert!(item.debit_if_available(3, Utc::now()));
        assert_eq!((item.quantity, item.qty), (0, 0));
    }

    proptest! {
        #[test]
        fn debits_never_drive_stock_negative(
            start in 0i64..500,
            debits in proptest::collection::vec(1i64..100, 0..40),
        ) {
            let mut item = cement(start);
            let mut granted = 0;
            for d in debits {
                if item.debit_if_available(d, Utc::now()) {
                    granted += d;
                }
                prop_assert!(item.quantity >= 0);
                prop_assert_eq!(item.quantity, item.qty);
            }
            prop_assert_eq!(item.quantity, start - granted);
        }
    }
}
