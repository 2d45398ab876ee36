use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use siteops_core::{
    DomainError, DomainResult, Entity, MinorUnits, ProjectId, PurchaseOrderId,
    PurchaseOrderItemId, RequisitionId, RequisitionItemId, UserId,
};

use crate::requisition::{Requisition, RequisitionStatus};

/// Purchase order status lifecycle.
///
/// `Rejected` and `Received` are terminal. `Partial` stays open for further
/// receipts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PurchaseOrderStatus {
    Draft,
    Submitted,
    Approved,
    Rejected,
    Purchased,
    Partial,
    Received,
}

impl PurchaseOrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PurchaseOrderStatus::Draft => "DRAFT",
            PurchaseOrderStatus::Submitted => "SUBMITTED",
            PurchaseOrderStatus::Approved => "APPROVED",
            PurchaseOrderStatus::Rejected => "REJECTED",
            PurchaseOrderStatus::Purchased => "PURCHASED",
            PurchaseOrderStatus::Partial => "PARTIAL",
            PurchaseOrderStatus::Received => "RECEIVED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "DRAFT" => PurchaseOrderStatus::Draft,
            "SUBMITTED" => PurchaseOrderStatus::Submitted,
            "APPROVED" => PurchaseOrderStatus::Approved,
            "REJECTED" => PurchaseOrderStatus::Rejected,
            "PURCHASED" => PurchaseOrderStatus::Purchased,
            "PARTIAL" => PurchaseOrderStatus::Partial,
            "RECEIVED" => PurchaseOrderStatus::Received,
            _ => return None,
        })
    }

    /// Goods may be received against the order in this status.
    pub fn is_receivable(&self) -> bool {
        matches!(self, PurchaseOrderStatus::Purchased | PurchaseOrderStatus::Partial)
    }
}

impl core::fmt::Display for PurchaseOrderStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vendor {
    pub name: String,
    pub contact: Option<String>,
}

impl Vendor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            contact: None,
        }
    }

    pub fn with_contact(mut self, contact: impl Into<String>) -> Self {
        self.contact = Some(contact.into());
        self
    }
}

/// Requested line when creating a purchase order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseOrderLine {
    pub requisition_item_id: Option<RequisitionItemId>,
    pub description: String,
    pub unit: String,
    pub quantity: i64,
    pub unit_price: MinorUnits,
}

/// Ordered line on a purchase order.
///
/// Invariant: `total == quantity × unit_price`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseOrderItem {
    pub id: PurchaseOrderItemId,
    pub requisition_item_id: Option<RequisitionItemId>,
    pub description: String,
    pub unit: String,
    pub quantity: i64,
    pub unit_price: MinorUnits,
    pub total: MinorUnits,
}

impl PurchaseOrderItem {
    fn from_line(line: PurchaseOrderLine) -> DomainResult<Self> {
        if line.description.trim().is_empty() {
            return Err(DomainError::validation("purchase order line needs a description"));
        }
        if line.unit.trim().is_empty() {
            return Err(DomainError::validation("purchase order line needs a unit"));
        }
        if line.quantity <= 0 {
            return Err(DomainError::validation("quantity must be positive"));
        }
        if line.unit_price.is_negative() {
            return Err(DomainError::validation("unit price cannot be negative"));
        }
        let total = MinorUnits::line_total(line.unit_price, line.quantity)?;
        Ok(Self {
            id: PurchaseOrderItemId::new(),
            requisition_item_id: line.requisition_item_id,
            description: line.description.trim().to_string(),
            unit: line.unit.trim().to_string(),
            quantity: line.quantity,
            unit_price: line.unit_price,
            total,
        })
    }

    fn reprice(&mut self, unit_price: MinorUnits) -> DomainResult<()> {
        if unit_price.is_negative() {
            return Err(DomainError::validation("unit price cannot be negative"));
        }
        self.total = MinorUnits::line_total(unit_price, self.quantity)?;
        self.unit_price = unit_price;
        Ok(())
    }
}

/// Price revision entered by the approver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceEdit {
    pub item_id: PurchaseOrderItemId,
    pub unit_price: MinorUnits,
}

/// Purchase order: a vendor order raised from a submitted requisition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseOrder {
    pub id: PurchaseOrderId,
    pub requisition_id: RequisitionId,
    pub project_id: ProjectId,
    pub vendor: Vendor,
    pub status: PurchaseOrderStatus,
    pub requested_amount: MinorUnits,
    pub approved_amount: Option<MinorUnits>,
    pub total_amount: MinorUnits,
    pub items: Vec<PurchaseOrderItem>,
    pub created_by: UserId,
    pub created_at: DateTime<Utc>,
    pub approved_by: Option<UserId>,
    pub approved_at: Option<DateTime<Utc>>,
    pub rejected_by: Option<UserId>,
    pub rejected_at: Option<DateTime<Utc>>,
    pub rejection_reason: Option<String>,
    pub purchased_by: Option<UserId>,
    pub purchased_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl PurchaseOrder {
    /// Raise a purchase order against a SUBMITTED requisition.
    ///
    /// The order starts in SUBMITTED. Moving the requisition to ORDERED is the
    /// caller's job (same transaction), via [`PurchaseOrder::ordered_quantities`].
    pub fn create(
        requisition: &Requisition,
        vendor: Vendor,
        lines: Vec<PurchaseOrderLine>,
        created_by: UserId,
        now: DateTime<Utc>,
    ) -> DomainResult<Self> {
        if requisition.status != RequisitionStatus::Submitted {
            return Err(DomainError::invalid_state(format!(
                "requisition {} is {:?}, expected SUBMITTED",
                requisition.id, requisition.status
            )));
        }
        if vendor.name.trim().is_empty() {
            return Err(DomainError::validation("vendor name is required"));
        }
        if lines.is_empty() {
            return Err(DomainError::validation(
                "cannot create purchase order without lines",
            ));
        }

        for line in &lines {
            if let Some(req_item) = line.requisition_item_id {
                if requisition.item(req_item).is_none() {
                    return Err(DomainError::validation(format!(
                        "requisition item {req_item} does not belong to requisition {}",
                        requisition.id
                    )));
                }
            }
        }

        let items = lines
            .into_iter()
            .map(PurchaseOrderItem::from_line)
            .collect::<DomainResult<Vec<_>>>()?;
        let total = MinorUnits::sum(items.iter().map(|i| i.total))?;

        Ok(Self {
            id: PurchaseOrderId::new(),
            requisition_id: requisition.id,
            project_id: requisition.project_id,
            vendor: Vendor {
                name: vendor.name.trim().to_string(),
                contact: vendor.contact,
            },
            status: PurchaseOrderStatus::Submitted,
            requested_amount: total,
            approved_amount: None,
            total_amount: total,
            items,
            created_by,
            created_at: now,
            approved_by: None,
            approved_at: None,
            rejected_by: None,
            rejected_at: None,
            rejection_reason: None,
            purchased_by: None,
            purchased_at: None,
            updated_at: now,
        })
    }

    pub fn item(&self, id: PurchaseOrderItemId) -> Option<&PurchaseOrderItem> {
        self.items.iter().find(|i| i.id == id)
    }

    /// Quantities booked against requisition items by this order.
    pub fn ordered_quantities(&self) -> Vec<(RequisitionItemId, i64)> {
        self.items
            .iter()
            .filter_map(|i| i.requisition_item_id.map(|r| (r, i.quantity)))
            .collect()
    }

    /// Unit prices per requisition item, as currently priced on this order.
    pub fn unit_prices(&self) -> Vec<(RequisitionItemId, MinorUnits)> {
        self.items
            .iter()
            .filter_map(|i| i.requisition_item_id.map(|r| (r, i.unit_price)))
            .collect()
    }

    fn ensure_status(&self, expected: PurchaseOrderStatus, action: &str) -> DomainResult<()> {
        if self.status != expected {
            return Err(DomainError::invalid_state(format!(
                "cannot {action} purchase order {} in status {}, expected {expected}",
                self.id, self.status
            )));
        }
        Ok(())
    }

    /// Approve, applying any revised unit prices first.
    ///
    /// Every line total and the order total are recomputed, so the stored
    /// totals always reflect the approved prices.
    pub fn approve_with_price_updates(
        &mut self,
        edits: &[PriceEdit],
        approver: UserId,
        now: DateTime<Utc>,
    ) -> DomainResult<()> {
        self.ensure_status(PurchaseOrderStatus::Submitted, "approve")?;

        let mut seen = HashSet::new();
        for edit in edits {
            if !seen.insert(edit.item_id) {
                return Err(DomainError::validation(format!(
                    "duplicate price edit for line {}",
                    edit.item_id
                )));
            }
            if self.item(edit.item_id).is_none() {
                return Err(DomainError::validation(format!(
                    "line {} is not on purchase order {}",
                    edit.item_id, self.id
                )));
            }
        }

        let mut repriced = self.items.clone();
        for item in &mut repriced {
            let price = edits
                .iter()
                .find(|e| e.item_id == item.id)
                .map(|e| e.unit_price)
                .unwrap_or(item.unit_price);
            item.reprice(price)?;
        }
        let total = MinorUnits::sum(repriced.iter().map(|i| i.total))?;

        self.items = repriced;
        self.total_amount = total;
        self.approved_amount = Some(total);
        self.status = PurchaseOrderStatus::Approved;
        self.approved_by = Some(approver);
        self.approved_at = Some(now);
        self.updated_at = now;
        Ok(())
    }

    pub fn reject(&mut self, reason: &str, by: UserId, now: DateTime<Utc>) -> DomainResult<()> {
        self.ensure_status(PurchaseOrderStatus::Submitted, "reject")?;
        if reason.trim().is_empty() {
            return Err(DomainError::validation("rejection reason is required"));
        }
        self.status = PurchaseOrderStatus::Rejected;
        self.rejection_reason = Some(reason.trim().to_string());
        self.rejected_by = Some(by);
        self.rejected_at = Some(now);
        self.updated_at = now;
        Ok(())
    }

    pub fn place_order(&mut self, by: UserId, now: DateTime<Utc>) -> DomainResult<()> {
        self.ensure_status(PurchaseOrderStatus::Approved, "place")?;
        self.status = PurchaseOrderStatus::Purchased;
        self.purchased_by = Some(by);
        self.purchased_at = Some(now);
        self.updated_at = now;
        Ok(())
    }

    pub fn ensure_receivable(&self) -> DomainResult<()> {
        if !self.status.is_receivable() {
            return Err(DomainError::invalid_state(format!(
                "cannot receive goods against purchase order {} in status {}",
                self.id, self.status
            )));
        }
        Ok(())
    }

    /// Store a status computed by [`crate::status::derive_status`].
    pub fn apply_status(&mut self, status: PurchaseOrderStatus, now: DateTime<Utc>) {
        if self.status != status {
            self.status = status;
            self.updated_at = now;
        }
    }
}

impl Entity for PurchaseOrder {
    type Id = PurchaseOrderId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::requisition::RequisitionItem;

    fn submitted_requisition() -> Requisition {
        let items = vec![
            RequisitionItem::new("Cement OPC 53", "bags", 100, MinorUnits::new(40_000)).unwrap(),
            RequisitionItem::new("Rebar 12mm", "kg", 500, MinorUnits::new(900)).unwrap(),
        ];
        let mut r = Requisition::new(ProjectId::new(), UserId::new(), items, Utc::now()).unwrap();
        r.submit(Utc::now()).unwrap();
        r
    }

    fn lines_for(r: &Requisition) -> Vec<PurchaseOrderLine> {
        r.items
            .iter()
            .map(|i| PurchaseOrderLine {
                requisition_item_id: Some(i.id),
                description: i.description.clone(),
                unit: i.unit.clone(),
                quantity: i.requested_qty,
                unit_price: i.estimated_unit_price,
            })
            .collect()
    }

    fn submitted_order() -> PurchaseOrder {
        let r = submitted_requisition();
        PurchaseOrder::create(&r, Vendor::new("Acme Supplies"), lines_for(&r), UserId::new(), Utc::now())
            .unwrap()
    }

    #[test]
    fn create_totals_lines() {
        let po = submitted_order();
        assert_eq!(po.status, PurchaseOrderStatus::Submitted);
        // 100 × 40_000 + 500 × 900
        assert_eq!(po.total_amount, MinorUnits::new(4_450_000));
        assert_eq!(po.requested_amount, po.total_amount);
        assert!(po.items.iter().all(|i| i.total
            == MinorUnits::line_total(i.unit_price, i.quantity).unwrap()));
    }

    #[test]
    fn create_requires_submitted_requisition() {
        let mut r = submitted_requisition();
        r.status = RequisitionStatus::Draft;
        let err = PurchaseOrder::create(&r, Vendor::new("Acme"), lines_for(&r), UserId::new(), Utc::now())
            .unwrap_err();
        assert!(matches!(err, DomainError::InvalidState(_)));
    }

    #[test]
    fn create_requires_vendor_and_lines() {
        let r = submitted_requisition();
        let err = PurchaseOrder::create(&r, Vendor::new("  "), lines_for(&r), UserId::new(), Utc::now())
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));

        let err = PurchaseOrder::create(&r, Vendor::new("Acme"), vec![], UserId::new(), Utc::now())
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn create_rejects_foreign_requisition_items() {
        let r = submitted_requisition();
        let mut lines = lines_for(&r);
        lines[0].requisition_item_id = Some(RequisitionItemId::new());
        let err = PurchaseOrder::create(&r, Vendor::new("Acme"), lines, UserId::new(), Utc::now())
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn approval_reprices_and_recomputes_totals() {
        let mut po = submitted_order();
        let cement = po.items[0].id;
        let approver = UserId::new();

        po.approve_with_price_updates(
            &[PriceEdit {
                item_id: cement,
                unit_price: MinorUnits::new(38_000),
            }],
            approver,
            Utc::now(),
        )
        .unwrap();

        assert_eq!(po.status, PurchaseOrderStatus::Approved);
        assert_eq!(po.item(cement).unwrap().total, MinorUnits::new(3_800_000));
        assert_eq!(po.total_amount, MinorUnits::new(4_250_000));
        assert_eq!(po.approved_amount, Some(MinorUnits::new(4_250_000)));
        assert_eq!(po.requested_amount, MinorUnits::new(4_450_000));
        assert_eq!(po.approved_by, Some(approver));
    }

    #[test]
    fn approval_with_unknown_line_changes_nothing() {
        let mut po = submitted_order();
        let before = po.clone();
        let err = po
            .approve_with_price_updates(
                &[PriceEdit {
                    item_id: PurchaseOrderItemId::new(),
                    unit_price: MinorUnits::new(1),
                }],
                UserId::new(),
                Utc::now(),
            )
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
        assert_eq!(po, before);
    }

    #[test]
    fn approval_twice_is_invalid_state() {
        let mut po = submitted_order();
        po.approve_with_price_updates(&[], UserId::new(), Utc::now()).unwrap();
        let err = po
            .approve_with_price_updates(&[], UserId::new(), Utc::now())
            .unwrap_err();
        assert!(matches!(err, DomainError::InvalidState(_)));
    }

    #[test]
    fn rejection_is_terminal() {
        let mut po = submitted_order();
        po.reject("vendor blacklisted", UserId::new(), Utc::now()).unwrap();
        assert_eq!(po.status, PurchaseOrderStatus::Rejected);
        assert_eq!(po.rejection_reason.as_deref(), Some("vendor blacklisted"));

        assert!(po.approve_with_price_updates(&[], UserId::new(), Utc::now()).is_err());
        assert!(po.place_order(UserId::new(), Utc::now()).is_err());
        assert!(po.reject("again", UserId::new(), Utc::now()).is_err());
    }

    #[test]
    fn place_requires_approval() {
        let mut po = submitted_order();
        assert!(matches!(
            po.place_order(UserId::new(), Utc::now()),
            Err(DomainError::InvalidState(_))
        ));
        po.approve_with_price_updates(&[], UserId::new(), Utc::now()).unwrap();
        po.place_order(UserId::new(), Utc::now()).unwrap();
        assert_eq!(po.status, PurchaseOrderStatus::Purchased);
        assert!(po.ensure_receivable().is_ok());
    }

    #[test]
    fn status_strings_round_trip() {
        for s in [
            PurchaseOrderStatus::Draft,
            PurchaseOrderStatus::Submitted,
            PurchaseOrderStatus::Approved,
            PurchaseOrderStatus::Rejected,
            PurchaseOrderStatus::Purchased,
            PurchaseOrderStatus::Partial,
            PurchaseOrderStatus::Received,
        ] {
            assert_eq!(PurchaseOrderStatus::parse(s.as_str()), Some(s));
        }
    }
}
