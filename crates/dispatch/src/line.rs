use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use siteops_core::{
    DispatchId, DispatchItemId, DomainError, DomainResult, Entity, InventoryItemId, PurchaseId,
    RequisitionItemId, UserId,
};

/// Requested line when creating a dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchLine {
    pub description: String,
    pub unit: String,
    pub qty: i64,
    pub requisition_item_id: Option<RequisitionItemId>,
    pub inventory_item_id: Option<InventoryItemId>,
    pub purchase_id: Option<PurchaseId>,
}

impl DispatchLine {
    pub fn new(description: impl Into<String>, unit: impl Into<String>, qty: i64) -> Self {
        Self {
            description: description.into(),
            unit: unit.into(),
            qty,
            requisition_item_id: None,
            inventory_item_id: None,
            purchase_id: None,
        }
    }

    pub fn from_inventory(mut self, id: InventoryItemId) -> Self {
        self.inventory_item_id = Some(id);
        self
    }

    pub fn from_purchase(mut self, id: PurchaseId) -> Self {
        self.purchase_id = Some(id);
        self
    }

    pub fn for_requisition_item(mut self, id: RequisitionItemId) -> Self {
        self.requisition_item_id = Some(id);
        self
    }
}

/// Where a line stands in the handout flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineState {
    /// Nothing handed out yet.
    Untouched,
    /// The not-yet-handed remainder split off `parent` by a partial handout.
    PartiallyHandedSplit {
        parent: DispatchItemId,
        remainder: i64,
    },
    /// Handed out in full; `qty == handed_out_qty`.
    FullyHanded,
}

/// A dispatch line.
///
/// `qty` is the quantity this line currently stands for and changes when the
/// line is split or merged. Invariants: `handed_out_qty <= qty` and
/// `returned_qty + used_out_qty <= handed_out_qty`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchItem {
    pub id: DispatchItemId,
    pub dispatch_id: DispatchId,
    pub description: String,
    pub unit: String,
    pub qty: i64,
    pub handed_out_qty: i64,
    pub returned_qty: i64,
    pub used_out_qty: i64,
    pub handed_out: bool,
    pub handed_out_at: Option<DateTime<Utc>>,
    pub handed_out_by: Option<UserId>,
    pub received_at: Option<DateTime<Utc>>,
    pub received_by: Option<UserId>,
    pub used_out: bool,
    pub used_out_at: Option<DateTime<Utc>>,
    pub used_out_by: Option<UserId>,
    pub requisition_item_id: Option<RequisitionItemId>,
    pub inventory_item_id: Option<InventoryItemId>,
    pub purchase_id: Option<PurchaseId>,
    /// Line this one was split off from.
    pub split_from: Option<DispatchItemId>,
}

impl DispatchItem {
    pub(crate) fn from_line(dispatch_id: DispatchId, line: DispatchLine) -> DomainResult<Self> {
        if line.description.trim().is_empty() {
            return Err(DomainError::validation("dispatch line needs a description"));
        }
        if line.unit.trim().is_empty() {
            return Err(DomainError::validation("dispatch line needs a unit"));
        }
        if line.qty <= 0 {
            return Err(DomainError::validation("dispatch quantity must be positive"));
        }
        Ok(Self {
            id: DispatchItemId::new(),
            dispatch_id,
            description: line.description.trim().to_string(),
            unit: line.unit.trim().to_string(),
            qty: line.qty,
            handed_out_qty: 0,
            returned_qty: 0,
            used_out_qty: 0,
            handed_out: false,
            handed_out_at: None,
            handed_out_by: None,
            received_at: None,
            received_by: None,
            used_out: false,
            used_out_at: None,
            used_out_by: None,
            requisition_item_id: line.requisition_item_id,
            inventory_item_id: line.inventory_item_id,
            purchase_id: line.purchase_id,
            split_from: None,
        })
    }

    pub fn state(&self) -> LineState {
        match (self.handed_out, self.split_from) {
            (true, _) => LineState::FullyHanded,
            (false, Some(parent)) => LineState::PartiallyHandedSplit {
                parent,
                remainder: self.qty,
            },
            (false, None) => LineState::Untouched,
        }
    }

    pub fn is_fully_handed(&self) -> bool {
        self.handed_out_qty >= self.qty
    }

    /// Untouched sibling carrying `remainder` units of this line.
    pub(crate) fn remainder_sibling(&self, remainder: i64) -> Self {
        Self {
            id: DispatchItemId::new(),
            qty: remainder,
            handed_out_qty: 0,
            returned_qty: 0,
            used_out_qty: 0,
            handed_out: false,
            handed_out_at: None,
            handed_out_by: None,
            received_at: None,
            received_by: None,
            used_out: false,
            used_out_at: None,
            used_out_by: None,
            split_from: Some(self.id),
            ..self.clone()
        }
    }

    pub(crate) fn mark_handed(&mut self, qty: i64, actor: UserId, now: DateTime<Utc>) {
        self.qty = qty;
        self.handed_out_qty = qty;
        self.handed_out = true;
        self.handed_out_at = Some(now);
        self.handed_out_by = Some(actor);
    }

    pub(crate) fn check_invariants(&self) -> DomainResult<()> {
        if self.handed_out_qty > self.qty
            || self.returned_qty + self.used_out_qty > self.handed_out_qty
            || self.qty < 0
            || self.returned_qty < 0
            || self.used_out_qty < 0
        {
            return Err(DomainError::invariant(format!(
                "dispatch line {}: qty {}, handed {}, returned {}, used {}",
                self.id, self.qty, self.handed_out_qty, self.returned_qty, self.used_out_qty
            )));
        }
        Ok(())
    }
}

impl Entity for DispatchItem {
    type Id = DispatchItemId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}
