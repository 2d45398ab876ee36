//! Price variance per delivered line, for senior staff.

use serde::{Deserialize, Serialize};

use siteops_core::{DomainResult, GrnId, GrnItemId, MinorUnits, PurchaseOrderId};

use crate::grn::Grn;
use crate::order::PurchaseOrder;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VarianceLine {
    pub grn_id: GrnId,
    pub grn_item_id: GrnItemId,
    pub vendor_name: String,
    pub receipt_number: String,
    pub description: String,
    pub po_unit_price: MinorUnits,
    pub grn_unit_price: MinorUnits,
    /// Per unit; positive means the purchase cost less than approved.
    pub unit_variance: MinorUnits,
    /// Accepted quantity once verified, delivered quantity before.
    pub quantity: i64,
    pub line_variance: MinorUnits,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VarianceSummary {
    pub purchase_order_id: PurchaseOrderId,
    pub lines: Vec<VarianceLine>,
    pub total_variance: MinorUnits,
}

pub fn summarize_variance(po: &PurchaseOrder, grns: &[Grn]) -> DomainResult<VarianceSummary> {
    let mut lines = Vec::new();
    for grn in grns.iter().filter(|g| g.purchase_order_id == po.id) {
        for item in &grn.items {
            let quantity = if grn.is_verified() {
                item.qty_accepted
            } else {
                item.qty_delivered
            };
            let po_unit_price = match po.item(item.po_item_id) {
                Some(i) => i.unit_price,
                None => item.price.checked_add(item.variance)?,
            };
            lines.push(VarianceLine {
                grn_id: grn.id,
                grn_item_id: item.id,
                vendor_name: grn.vendor_name.clone(),
                receipt_number: grn.receipt_number.clone(),
                description: item.description.clone(),
                po_unit_price,
                grn_unit_price: item.price,
                unit_variance: item.variance,
                quantity,
                line_variance: MinorUnits::line_total(item.variance, quantity)?,
            });
        }
    }
    let total_variance = MinorUnits::sum(lines.iter().map(|l| l.line_variance))?;
    Ok(VarianceSummary {
        purchase_order_id: po.id,
        lines,
        total_variance,
    })
}
