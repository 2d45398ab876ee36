use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use siteops_core::{
    DomainError, DomainResult, Entity, MinorUnits, ProjectId, RequisitionId, RequisitionItemId,
    UserId,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequisitionStatus {
    Draft,
    Submitted,
    Ordered,
}

impl RequisitionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequisitionStatus::Draft => "DRAFT",
            RequisitionStatus::Submitted => "SUBMITTED",
            RequisitionStatus::Ordered => "ORDERED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "DRAFT" => RequisitionStatus::Draft,
            "SUBMITTED" => RequisitionStatus::Submitted,
            "ORDERED" => RequisitionStatus::Ordered,
            _ => return None,
        })
    }
}

/// One requested material on a requisition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequisitionItem {
    pub id: RequisitionItemId,
    pub description: String,
    pub unit: String,
    pub requested_qty: i64,
    pub estimated_unit_price: MinorUnits,
    pub approved_unit_price: Option<MinorUnits>,
    /// Quantity already placed on purchase orders.
    pub ordered_qty: i64,
}

impl RequisitionItem {
    pub fn new(
        description: impl Into<String>,
        unit: impl Into<String>,
        requested_qty: i64,
        estimated_unit_price: MinorUnits,
    ) -> DomainResult<Self> {
        let description = description.into();
        let unit = unit.into();
        if description.trim().is_empty() {
            return Err(DomainError::validation("requisition item needs a description"));
        }
        if unit.trim().is_empty() {
            return Err(DomainError::validation("requisition item needs a unit"));
        }
        if requested_qty <= 0 {
            return Err(DomainError::validation("requested quantity must be positive"));
        }
        if estimated_unit_price.is_negative() {
            return Err(DomainError::validation("estimated unit price cannot be negative"));
        }
        Ok(Self {
            id: RequisitionItemId::new(),
            description,
            unit,
            requested_qty,
            estimated_unit_price,
            approved_unit_price: None,
            ordered_qty: 0,
        })
    }
}

/// Internal request for materials; precursor to a purchase order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Requisition {
    pub id: RequisitionId,
    pub project_id: ProjectId,
    pub requested_by: UserId,
    pub status: RequisitionStatus,
    pub items: Vec<RequisitionItem>,
    pub created_at: DateTime<Utc>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub ordered_at: Option<DateTime<Utc>>,
}

impl Requisition {
    pub fn new(
        project_id: ProjectId,
        requested_by: UserId,
        items: Vec<RequisitionItem>,
        now: DateTime<Utc>,
    ) -> DomainResult<Self> {
        if items.is_empty() {
            return Err(DomainError::validation("requisition needs at least one item"));
        }
        Ok(Self {
            id: RequisitionId::new(),
            project_id,
            requested_by,
            status: RequisitionStatus::Draft,
            items,
            created_at: now,
            submitted_at: None,
            ordered_at: None,
        })
    }

    pub fn item(&self, id: RequisitionItemId) -> Option<&RequisitionItem> {
        self.items.iter().find(|i| i.id == id)
    }

    pub fn submit(&mut self, now: DateTime<Utc>) -> DomainResult<()> {
        if self.status != RequisitionStatus::Draft {
            return Err(DomainError::invalid_state(format!(
                "requisition {} is {:?}, only drafts can be submitted",
                self.id, self.status
            )));
        }
        self.status = RequisitionStatus::Submitted;
        self.submitted_at = Some(now);
        Ok(())
    }

    /// Move to ORDERED and book the ordered quantities against each item.
    ///
    /// Items are otherwise immutable once ordered, apart from approved prices.
    pub fn mark_ordered(
        &mut self,
        ordered: &[(RequisitionItemId, i64)],
        now: DateTime<Utc>,
    ) -> DomainResult<()> {
        if self.status != RequisitionStatus::Submitted {
            return Err(DomainError::invalid_state(format!(
                "requisition {} is {:?}, expected SUBMITTED",
                self.id, self.status
            )));
        }
        for (item_id, qty) in ordered {
            let item = self
                .items
                .iter_mut()
                .find(|i| i.id == *item_id)
                .ok_or_else(|| {
                    DomainError::validation(format!(
                        "requisition item {item_id} does not belong to requisition {}",
                        self.id
                    ))
                })?;
            item.ordered_qty = item.ordered_qty.saturating_add(*qty);
        }
        self.status = RequisitionStatus::Ordered;
        self.ordered_at = Some(now);
        Ok(())
    }

    /// Stamp the prices an approver settled on onto the matching items.
    /// Unknown item ids are ignored.
    pub fn record_approved_prices(&mut self, prices: &[(RequisitionItemId, MinorUnits)]) {
        for (item_id, price) in prices {
            if let Some(item) = self.items.iter_mut().find(|i| i.id == *item_id) {
                item.approved_unit_price = Some(*price);
            }
        }
    }
}

impl Entity for Requisition {
    type Id = RequisitionId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn requisition() -> Requisition {
        let items = vec![
            RequisitionItem::new("Cement OPC 53", "bags", 100, MinorUnits::new(42_000)).unwrap(),
        ];
        Requisition::new(ProjectId::new(), UserId::new(), items, Utc::now()).unwrap()
    }

    #[test]
    fn draft_submits_once() {
        let mut r = requisition();
        r.submit(Utc::now()).unwrap();
        assert_eq!(r.status, RequisitionStatus::Submitted);
        assert!(matches!(r.submit(Utc::now()), Err(DomainError::InvalidState(_))));
    }

    #[test]
    fn ordering_books_quantities() {
        let mut r = requisition();
        r.submit(Utc::now()).unwrap();
        let item_id = r.items[0].id;
        r.mark_ordered(&[(item_id, 60)], Utc::now()).unwrap();
        assert_eq!(r.status, RequisitionStatus::Ordered);
        assert_eq!(r.item(item_id).unwrap().ordered_qty, 60);
    }

    #[test]
    fn ordering_requires_submission() {
        let mut r = requisition();
        let err = r.mark_ordered(&[], Utc::now()).unwrap_err();
        assert!(matches!(err, DomainError::InvalidState(_)));
    }

    #[test]
    fn approved_prices_land_on_matching_items() {
        let mut r = requisition();
        let item_id = r.items[0].id;
        r.record_approved_prices(&[
            (item_id, MinorUnits::new(40_500)),
            (RequisitionItemId::new(), MinorUnits::new(1)),
        ]);
        assert_eq!(r.items[0].approved_unit_price, Some(MinorUnits::new(40_500)));
        assert_eq!(r.items[0].estimated_unit_price, MinorUnits::new(42_000));
    }

    #[test]
    fn item_validation() {
        assert!(RequisitionItem::new("", "bags", 1, MinorUnits::ZERO).is_err());
        assert!(RequisitionItem::new("Sand", "m3", 0, MinorUnits::ZERO).is_err());
        assert!(RequisitionItem::new("Sand", "m3", 1, MinorUnits::new(-1)).is_err());
    }
}
