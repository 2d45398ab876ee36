//! GRN verification: accountant adjudication, PO status recompute and the
//! inventory credits that follow from accepted quantities.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use siteops_core::{DomainError, DomainResult, GrnId, UserId};
use siteops_inventory::InventoryKey;

use crate::grn::{Grn, LineVerdict};
use crate::order::{PurchaseOrder, PurchaseOrderStatus};
use crate::status::{derive_status, line_progress, UsageBasis};

/// Verdicts for one GRN.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrnVerification {
    pub grn_id: GrnId,
    pub lines: Vec<LineVerdict>,
}

/// Accepted stock to add to one inventory record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InventoryCredit {
    pub key: InventoryKey,
    /// Display name/unit taken from the first contributing line.
    pub name: String,
    pub unit: String,
    pub quantity: i64,
    /// Per-GRN contributions, for the movement log.
    pub sources: Vec<(GrnId, i64)>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationOutcome {
    pub verified: Vec<GrnId>,
    pub credits: Vec<InventoryCredit>,
    pub status: PurchaseOrderStatus,
}

/// Verify several GRNs of one purchase order together.
///
/// `grns` must hold every GRN recorded for `po`; the verified ones are
/// updated in place. Either every request applies or `grns` is left
/// untouched. One status recompute and one credit pass follow.
pub fn verify_batch(
    po: &PurchaseOrder,
    grns: &mut [Grn],
    requests: &[GrnVerification],
    verifier: UserId,
    now: DateTime<Utc>,
) -> DomainResult<VerificationOutcome> {
    if requests.is_empty() {
        return Err(DomainError::validation("nothing to verify"));
    }

    let mut seen = HashSet::new();
    for r in requests {
        if !seen.insert(r.grn_id) {
            return Err(DomainError::validation(format!(
                "GRN {} appears twice in the batch",
                r.grn_id
            )));
        }
    }

    let mut working: Vec<Grn> = grns.to_vec();
    for r in requests {
        let grn = working
            .iter_mut()
            .find(|g| g.id == r.grn_id)
            .ok_or_else(|| DomainError::not_found(format!("GRN {}", r.grn_id)))?;
        if grn.purchase_order_id != po.id {
            return Err(DomainError::validation(format!(
                "GRN {} belongs to purchase order {}, not {}",
                grn.id, grn.purchase_order_id, po.id
            )));
        }
        grn.verify(&r.lines, verifier, now)?;
    }

    let status = derive_status(
        po.status,
        &line_progress(po, &working),
        UsageBasis::Verification,
    );

    let mut credits: Vec<InventoryCredit> = Vec::new();
    let mut index: HashMap<InventoryKey, usize> = HashMap::new();
    for r in requests {
        let Some(grn) = working.iter().find(|g| g.id == r.grn_id) else {
            continue;
        };
        for item in grn.items.iter().filter(|i| i.qty_accepted > 0) {
            let key = InventoryKey::new(&item.description, &item.unit);
            let idx = *index.entry(key.clone()).or_insert_with(|| {
                credits.push(InventoryCredit {
                    key,
                    name: item.description.clone(),
                    unit: item.unit.clone(),
                    quantity: 0,
                    sources: Vec::new(),
                });
                credits.len() - 1
            });
            let overflow =
                || DomainError::validation(format!("credit for {} overflows", item.description));
            let credit = &mut credits[idx];
            credit.quantity = credit
                .quantity
                .checked_add(item.qty_accepted)
                .ok_or_else(overflow)?;
            match credit.sources.iter_mut().find(|(id, _)| *id == grn.id) {
                Some((_, qty)) => *qty = qty.checked_add(item.qty_accepted).ok_or_else(overflow)?,
                None => credit.sources.push((grn.id, item.qty_accepted)),
            }
        }
    }

    grns.clone_from_slice(&working);
    Ok(VerificationOutcome {
        verified: requests.iter().map(|r| r.grn_id).collect(),
        credits,
        status,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::order::{PurchaseOrderLine, Vendor};
    use crate::receipt::{plan_receipt, DeliveryLine};
    use crate::requisition::{Requisition, RequisitionItem};
    use siteops_core::{MinorUnits, ProjectId};

    fn purchased_order(qty: i64) -> PurchaseOrder {
        let items = vec![RequisitionItem::new("Cement", "bags", qty, MinorUnits::new(400)).unwrap()];
        let mut r = Requisition::new(ProjectId::new(), UserId::new(), items, Utc::now()).unwrap();
        r.submit(Utc::now()).unwrap();
        let lines = vec![PurchaseOrderLine {
            requisition_item_id: Some(r.items[0].id),
            description: "Cement OPC 53".into(),
            unit: "Bags".into(),
            quantity: qty,
            unit_price: MinorUnits::new(400),
        }];
        let mut po =
            PurchaseOrder::create(&r, Vendor::new("Acme"), lines, UserId::new(), Utc::now()).unwrap();
        po.approve_with_price_updates(&[], UserId::new(), Utc::now()).unwrap();
        po.place_order(UserId::new(), Utc::now()).unwrap();
        po
    }

    fn receive(po: &mut PurchaseOrder, parts: &[(&str, &str, i64)]) -> Vec<Grn> {
        let deliveries: Vec<_> = parts
            .iter()
            .map(|&(v, r, q)| DeliveryLine {
                po_item_id: po.items[0].id,
                vendor_name: v.into(),
                receipt_number: r.into(),
                unit_price: MinorUnits::new(400),
                qty: q,
            })
            .collect();
        let plan = plan_receipt(po, &[], &deliveries, UserId::new(), Utc::now()).unwrap();
        po.apply_status(plan.status, Utc::now());
        plan.grns
    }

    fn accept_all(grn: &Grn) -> GrnVerification {
        GrnVerification {
            grn_id: grn.id,
            lines: grn
                .items
                .iter()
                .map(|i| LineVerdict {
                    grn_item_id: i.id,
                    qty_accepted: i.qty_delivered,
                    qty_rejected: 0,
                })
                .collect(),
        }
    }

    #[test]
    fn partial_then_received_across_vendors() {
        let mut po = purchased_order(100);
        let mut grns = receive(&mut po, &[("Vendor A", "R1", 40), ("Vendor B", "R2", 60)]);
        assert_eq!(po.status, PurchaseOrderStatus::Partial);

        let first = accept_all(&grns[0]);
        let out = verify_batch(&po, &mut grns, &[first], UserId::new(), Utc::now()).unwrap();
        assert_eq!(out.status, PurchaseOrderStatus::Partial);
        po.apply_status(out.status, Utc::now());

        let second = accept_all(&grns[1]);
        let out = verify_batch(&po, &mut grns, &[second], UserId::new(), Utc::now()).unwrap();
        assert_eq!(out.status, PurchaseOrderStatus::Received);
        assert_eq!(out.credits.len(), 1);
        assert_eq!(out.credits[0].quantity, 60);
    }

    #[test]
    fn batch_credits_aggregate_by_key() {
        let mut po = purchased_order(100);
        let mut grns = receive(&mut po, &[("Vendor A", "R1", 40), ("Vendor B", "R2", 60)]);
        let requests: Vec<_> = grns.iter().map(accept_all).collect();

        let out = verify_batch(&po, &mut grns, &requests, UserId::new(), Utc::now()).unwrap();
        assert_eq!(out.status, PurchaseOrderStatus::Received);
        assert_eq!(out.credits.len(), 1);
        let credit = &out.credits[0];
        assert_eq!(credit.key, InventoryKey::new("cement opc 53", "bags"));
        assert_eq!(credit.quantity, 100);
        assert_eq!(credit.sources.len(), 2);
        assert!(grns.iter().all(Grn::is_verified));
    }

    #[test]
    fn fully_rejected_delivery_credits_nothing() {
        let mut po = purchased_order(10);
        let mut grns = receive(&mut po, &[("Acme", "R1", 10)]);
        let request = GrnVerification {
            grn_id: grns[0].id,
            lines: vec![LineVerdict {
                grn_item_id: grns[0].items[0].id,
                qty_accepted: 0,
                qty_rejected: 10,
            }],
        };
        let out = verify_batch(&po, &mut grns, &[request], UserId::new(), Utc::now()).unwrap();
        assert!(out.credits.is_empty());
        assert_eq!(out.status, PurchaseOrderStatus::Purchased);
    }

    #[test]
    fn one_bad_request_leaves_every_grn_pending() {
        let mut po = purchased_order(100);
        let mut grns = receive(&mut po, &[("Vendor A", "R1", 40), ("Vendor B", "R2", 60)]);
        let good = accept_all(&grns[0]);
        let mut bad = accept_all(&grns[1]);
        bad.lines[0].qty_accepted = 1;

        let err = verify_batch(&po, &mut grns, &[good, bad], UserId::new(), Utc::now()).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
        assert!(grns.iter().all(|g| !g.is_verified()));
    }

    #[test]
    fn second_verification_is_invalid_state() {
        let mut po = purchased_order(10);
        let mut grns = receive(&mut po, &[("Acme", "R1", 10)]);
        let request = accept_all(&grns[0]);
        verify_batch(&po, &mut grns, &[request.clone()], UserId::new(), Utc::now()).unwrap();
        let err = verify_batch(&po, &mut grns, &[request], UserId::new(), Utc::now()).unwrap_err();
        assert!(matches!(err, DomainError::InvalidState(_)));
    }

    #[test]
    fn duplicate_and_unknown_requests_rejected() {
        let mut po = purchased_order(10);
        let mut grns = receive(&mut po, &[("Acme", "R1", 10)]);
        let request = accept_all(&grns[0]);
        assert!(matches!(
            verify_batch(&po, &mut grns, &[request.clone(), request], UserId::new(), Utc::now()),
            Err(DomainError::Validation(_))
        ));
        let stranger = GrnVerification {
            grn_id: GrnId::new(),
            lines: vec![],
        };
        assert!(matches!(
            verify_batch(&po, &mut grns, &[stranger], UserId::new(), Utc::now()),
            Err(DomainError::NotFound(_))
        ));
    }
}
