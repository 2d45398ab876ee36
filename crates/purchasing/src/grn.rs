use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use siteops_core::{
    DomainError, DomainResult, Entity, GrnId, GrnItemId, MinorUnits, PurchaseOrderId,
    PurchaseOrderItemId, UserId,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GrnStatus {
    Pending,
    Verified,
}

impl GrnStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            GrnStatus::Pending => "PENDING",
            GrnStatus::Verified => "VERIFIED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(GrnStatus::Pending),
            "VERIFIED" => Some(GrnStatus::Verified),
            _ => None,
        }
    }
}

/// One delivered line on a goods received note.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrnItem {
    pub id: GrnItemId,
    pub grn_id: GrnId,
    pub po_item_id: PurchaseOrderItemId,
    pub description: String,
    pub unit: String,
    /// Claimed by the receiver at delivery time.
    pub qty_delivered: i64,
    /// Zero until the note is verified.
    pub qty_accepted: i64,
    pub qty_rejected: i64,
    /// Unit price entered by the receiver.
    pub price: MinorUnits,
    /// Purchase order unit price minus `price`; positive means money saved.
    pub variance: MinorUnits,
}

/// Accountant's decision for one GRN line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineVerdict {
    pub grn_item_id: GrnItemId,
    pub qty_accepted: i64,
    pub qty_rejected: i64,
}

/// Goods received note: one delivery event, keyed by vendor and receipt number.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Grn {
    pub id: GrnId,
    pub purchase_order_id: PurchaseOrderId,
    pub vendor_name: String,
    pub receipt_number: String,
    pub status: GrnStatus,
    pub received_by: UserId,
    pub received_at: DateTime<Utc>,
    pub verified_by: Option<UserId>,
    pub verified_at: Option<DateTime<Utc>>,
    pub items: Vec<GrnItem>,
}

impl Grn {
    pub(crate) fn pending(
        purchase_order_id: PurchaseOrderId,
        vendor_name: String,
        receipt_number: String,
        received_by: UserId,
        received_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: GrnId::new(),
            purchase_order_id,
            vendor_name,
            receipt_number,
            status: GrnStatus::Pending,
            received_by,
            received_at,
            verified_by: None,
            verified_at: None,
            items: Vec::new(),
        }
    }

    pub fn is_verified(&self) -> bool {
        self.status == GrnStatus::Verified
    }

    pub fn item(&self, id: GrnItemId) -> Option<&GrnItem> {
        self.items.iter().find(|i| i.id == id)
    }

    /// Quantity this note currently holds against a purchase order line:
    /// everything delivered while pending, only the accepted part once verified.
    pub fn usage_for(&self, po_item_id: PurchaseOrderItemId) -> (i64, i64) {
        self.items
            .iter()
            .filter(|i| i.po_item_id == po_item_id)
            .fold((0, 0), |(accepted, pending), i| match self.status {
                GrnStatus::Pending => (accepted, pending.saturating_add(i.qty_delivered)),
                GrnStatus::Verified => (accepted.saturating_add(i.qty_accepted), pending),
            })
    }

    /// One-shot PENDING → VERIFIED.
    ///
    /// Every line needs exactly one verdict with
    /// `accepted + rejected == delivered`. Nothing changes unless all
    /// verdicts are valid.
    pub fn verify(
        &mut self,
        verdicts: &[LineVerdict],
        verifier: UserId,
        now: DateTime<Utc>,
    ) -> DomainResult<()> {
        if self.status != GrnStatus::Pending {
            return Err(DomainError::invalid_state(format!(
                "GRN {} is already verified",
                self.id
            )));
        }

        let mut seen = HashSet::new();
        for v in verdicts {
            if !seen.insert(v.grn_item_id) {
                return Err(DomainError::validation(format!(
                    "duplicate verdict for GRN line {}",
                    v.grn_item_id
                )));
            }
            let item = self.item(v.grn_item_id).ok_or_else(|| {
                DomainError::validation(format!(
                    "line {} is not on GRN {}",
                    v.grn_item_id, self.id
                ))
            })?;
            if v.qty_accepted < 0 || v.qty_rejected < 0 {
                return Err(DomainError::validation(
                    "accepted and rejected quantities cannot be negative",
                ));
            }
            let adjudicated = v
                .qty_accepted
                .checked_add(v.qty_rejected)
                .ok_or_else(|| DomainError::validation("verdict quantity overflows"))?;
            if adjudicated != item.qty_delivered {
                return Err(DomainError::validation(format!(
                    "GRN line {}: accepted {} + rejected {} must equal delivered {}",
                    item.id, v.qty_accepted, v.qty_rejected, item.qty_delivered
                )));
            }
        }
        if let Some(missing) = self.items.iter().find(|i| !seen.contains(&i.id)) {
            return Err(DomainError::validation(format!(
                "GRN line {} has no verdict",
                missing.id
            )));
        }

        for v in verdicts {
            if let Some(item) = self.items.iter_mut().find(|i| i.id == v.grn_item_id) {
                item.qty_accepted = v.qty_accepted;
                item.qty_rejected = v.qty_rejected;
            }
        }
        self.status = GrnStatus::Verified;
        self.verified_by = Some(verifier);
        self.verified_at = Some(now);
        Ok(())
    }
}

impl Entity for Grn {
    type Id = GrnId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}
