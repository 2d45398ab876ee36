//! Receiving goods against a purchase order.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use siteops_core::{DomainError, DomainResult, GrnItemId, MinorUnits, PurchaseOrderItemId, UserId};

use crate::grn::{Grn, GrnItem};
use crate::order::{PurchaseOrder, PurchaseOrderStatus};
use crate::status::{derive_status, line_progress, UsageBasis};

/// One delivered line as captured at the gate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryLine {
    pub po_item_id: PurchaseOrderItemId,
    pub vendor_name: String,
    pub receipt_number: String,
    pub unit_price: MinorUnits,
    pub qty: i64,
}

/// New pending GRNs plus the order status they imply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceiptPlan {
    pub grns: Vec<Grn>,
    pub status: PurchaseOrderStatus,
}

/// Check a delivery batch against the ordered ceilings and build the GRNs.
///
/// `prior_grns` must be every GRN already recorded for `po`. The whole batch
/// fails with `OverDelivery` if any line's batch total exceeds
/// `ordered - (accepted + pending)`. Lines are grouped by trimmed
/// (vendor, receipt number) into one GRN each, in first-seen order.
pub fn plan_receipt(
    po: &PurchaseOrder,
    prior_grns: &[Grn],
    deliveries: &[DeliveryLine],
    received_by: UserId,
    now: DateTime<Utc>,
) -> DomainResult<ReceiptPlan> {
    po.ensure_receivable()?;
    if deliveries.is_empty() {
        return Err(DomainError::validation("delivery batch is empty"));
    }

    for d in deliveries {
        if d.vendor_name.trim().is_empty() {
            return Err(DomainError::validation("vendor name is required"));
        }
        if d.receipt_number.trim().is_empty() {
            return Err(DomainError::validation("receipt number is required"));
        }
        if d.qty <= 0 {
            return Err(DomainError::validation("delivered quantity must be positive"));
        }
        if d.unit_price.is_negative() {
            return Err(DomainError::validation("unit price cannot be negative"));
        }
        if po.item(d.po_item_id).is_none() {
            return Err(DomainError::validation(format!(
                "line {} is not on purchase order {}",
                d.po_item_id, po.id
            )));
        }
    }

    let progress = line_progress(po, prior_grns);
    let mut batch_totals: HashMap<PurchaseOrderItemId, i64> = HashMap::new();
    for d in deliveries {
        let total = batch_totals.entry(d.po_item_id).or_insert(0);
        *total = total.checked_add(d.qty).ok_or_else(|| {
            DomainError::over_delivery(format!(
                "line {}: delivered quantities in this batch overflow",
                d.po_item_id
            ))
        })?;
    }
    for p in &progress {
        let incoming = batch_totals.get(&p.po_item_id).copied().unwrap_or(0);
        if incoming > p.remaining() {
            return Err(DomainError::over_delivery(format!(
                "line {}: delivering {incoming} but only {} of {} remain",
                p.po_item_id,
                p.remaining().max(0),
                p.ordered
            )));
        }
    }

    let mut grns: Vec<Grn> = Vec::new();
    let mut by_receipt: HashMap<(String, String), usize> = HashMap::new();
    for d in deliveries {
        let vendor = d.vendor_name.trim().to_string();
        let receipt = d.receipt_number.trim().to_string();
        let idx = *by_receipt
            .entry((vendor.clone(), receipt.clone()))
            .or_insert_with(|| {
                grns.push(Grn::pending(po.id, vendor, receipt, received_by, now));
                grns.len() - 1
            });

        let Some(po_item) = po.item(d.po_item_id) else {
            continue;
        };
        let grn = &mut grns[idx];
        grn.items.push(GrnItem {
            id: GrnItemId::new(),
            grn_id: grn.id,
            po_item_id: po_item.id,
            description: po_item.description.clone(),
            unit: po_item.unit.clone(),
            qty_delivered: d.qty,
            qty_accepted: 0,
            qty_rejected: 0,
            price: d.unit_price,
            variance: po_item.unit_price.checked_sub(d.unit_price)?,
        });
    }

    let all: Vec<Grn> = prior_grns.iter().chain(grns.iter()).cloned().collect();
    let status = derive_status(po.status, &line_progress(po, &all), UsageBasis::Receipt);

    Ok(ReceiptPlan { grns, status })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grn::LineVerdict;
    use crate::order::{PurchaseOrderLine, Vendor};
    use crate::requisition::{Requisition, RequisitionItem};
    use siteops_core::ProjectId;

    fn purchased_order(quantities: &[i64]) -> PurchaseOrder {
        let items = quantities
            .iter()
            .map(|&q| RequisitionItem::new("Cement", "bags", q, MinorUnits::new(400)).unwrap())
            .collect();
        let mut r = Requisition::new(ProjectId::new(), UserId::new(), items, Utc::now()).unwrap();
        r.submit(Utc::now()).unwrap();
        let lines = r
            .items
            .iter()
            .enumerate()
            .map(|(n, i)| PurchaseOrderLine {
                requisition_item_id: Some(i.id),
                description: format!("Material {n}"),
                unit: "bags".into(),
                quantity: i.requested_qty,
                unit_price: MinorUnits::new(400),
            })
            .collect();
        let mut po =
            PurchaseOrder::create(&r, Vendor::new("Acme"), lines, UserId::new(), Utc::now()).unwrap();
        po.approve_with_price_updates(&[], UserId::new(), Utc::now()).unwrap();
        po.place_order(UserId::new(), Utc::now()).unwrap();
        po
    }

    fn delivery(po_item: PurchaseOrderItemId, vendor: &str, receipt: &str, qty: i64) -> DeliveryLine {
        DeliveryLine {
            po_item_id: po_item,
            vendor_name: vendor.into(),
            receipt_number: receipt.into(),
            unit_price: MinorUnits::new(380),
            qty,
        }
    }

    #[test]
    fn groups_by_vendor_and_receipt() {
        let po = purchased_order(&[100]);
        let line = po.items[0].id;
        let plan = plan_receipt(
            &po,
            &[],
            &[
                delivery(line, "Vendor A", "R1", 40),
                delivery(line, " Vendor B ", "R2", 60),
            ],
            UserId::new(),
            Utc::now(),
        )
        .unwrap();

        assert_eq!(plan.grns.len(), 2);
        assert_eq!(plan.grns[0].vendor_name, "Vendor A");
        assert_eq!(plan.grns[1].vendor_name, "Vendor B");
        assert_eq!(plan.status, PurchaseOrderStatus::Partial);
        assert_eq!(plan.grns[0].items[0].variance, MinorUnits::new(20));
    }

    #[test]
    fn same_receipt_shares_one_grn() {
        let po = purchased_order(&[10, 10]);
        let plan = plan_receipt(
            &po,
            &[],
            &[
                delivery(po.items[0].id, "Acme", "R9", 5),
                delivery(po.items[1].id, "Acme", "R9", 5),
            ],
            UserId::new(),
            Utc::now(),
        )
        .unwrap();
        assert_eq!(plan.grns.len(), 1);
        assert_eq!(plan.grns[0].items.len(), 2);
    }

    #[test]
    fn pending_deliveries_count_toward_the_ceiling() {
        let po = purchased_order(&[50]);
        let line = po.items[0].id;
        let first = plan_receipt(&po, &[], &[delivery(line, "Acme", "R1", 50)], UserId::new(), Utc::now())
            .unwrap();

        let err = plan_receipt(
            &po,
            &first.grns,
            &[delivery(line, "Acme", "R2", 1)],
            UserId::new(),
            Utc::now(),
        )
        .unwrap_err();
        assert!(matches!(err, DomainError::OverDelivery(_)));
    }

    #[test]
    fn batch_total_overflow_is_an_over_delivery() {
        let po = purchased_order(&[10]);
        let line = po.items[0].id;
        let err = plan_receipt(
            &po,
            &[],
            &[
                delivery(line, "Acme", "R1", i64::MAX),
                delivery(line, "Acme", "R2", i64::MAX),
            ],
            UserId::new(),
            Utc::now(),
        )
        .unwrap_err();
        assert!(matches!(err, DomainError::OverDelivery(_)));
    }

    #[test]
    fn rejected_quantities_free_up_the_ceiling() {
        let po = purchased_order(&[50]);
        let line = po.items[0].id;
        let mut grns = plan_receipt(&po, &[], &[delivery(line, "Acme", "R1", 50)], UserId::new(), Utc::now())
            .unwrap()
            .grns;
        let item = grns[0].items[0].id;
        grns[0]
            .verify(
                &[LineVerdict {
                    grn_item_id: item,
                    qty_accepted: 45,
                    qty_rejected: 5,
                }],
                UserId::new(),
                Utc::now(),
            )
            .unwrap();

        assert!(plan_receipt(&po, &grns, &[delivery(line, "Acme", "R2", 6)], UserId::new(), Utc::now()).is_err());
        assert!(plan_receipt(&po, &grns, &[delivery(line, "Acme", "R2", 5)], UserId::new(), Utc::now()).is_ok());
    }

    #[test]
    fn batch_lines_for_one_po_line_are_summed() {
        let po = purchased_order(&[10]);
        let line = po.items[0].id;
        let err = plan_receipt(
            &po,
            &[],
            &[delivery(line, "A", "R1", 6), delivery(line, "B", "R2", 6)],
            UserId::new(),
            Utc::now(),
        )
        .unwrap_err();
        assert!(matches!(err, DomainError::OverDelivery(_)));
    }

    #[test]
    fn requires_receivable_order_and_valid_lines() {
        let mut po = purchased_order(&[10]);
        let line = po.items[0].id;
        assert!(matches!(
            plan_receipt(&po, &[], &[delivery(line, "", "R1", 1)], UserId::new(), Utc::now()),
            Err(DomainError::Validation(_))
        ));
        assert!(matches!(
            plan_receipt(&po, &[], &[delivery(line, "Acme", " ", 1)], UserId::new(), Utc::now()),
            Err(DomainError::Validation(_))
        ));
        assert!(matches!(
            plan_receipt(&po, &[], &[delivery(line, "Acme", "R1", 0)], UserId::new(), Utc::now()),
            Err(DomainError::Validation(_))
        ));

        po.status = PurchaseOrderStatus::Approved;
        assert!(matches!(
            plan_receipt(&po, &[], &[delivery(line, "Acme", "R1", 1)], UserId::new(), Utc::now()),
            Err(DomainError::InvalidState(_))
        ));
    }
}
