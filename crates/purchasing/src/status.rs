//! Purchase order status derived from its GRNs.
//!
//! Every mutation that touches GRNs (receipt, verification) recomputes the
//! order status here, inside the same transaction, from the full set of notes.

use serde::{Deserialize, Serialize};

use siteops_core::PurchaseOrderItemId;

use crate::grn::Grn;
use crate::order::{PurchaseOrder, PurchaseOrderStatus};

/// Which quantities count as "used" when deciding PARTIAL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UsageBasis {
    /// Pending deliveries count.
    Receipt,
    /// Only verified acceptance counts.
    Verification,
}

/// Per-line delivery position against the ordered quantity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineProgress {
    pub po_item_id: PurchaseOrderItemId,
    pub ordered: i64,
    /// Accepted on verified GRNs.
    pub accepted: i64,
    /// Delivered on GRNs still pending verification.
    pub pending: i64,
}

impl LineProgress {
    /// Quantity held against the ordered ceiling.
    /// Saturates, so a corrupt tally reads as "nothing remains".
    pub fn committed(&self) -> i64 {
        self.accepted.saturating_add(self.pending)
    }

    pub fn remaining(&self) -> i64 {
        self.ordered - self.committed()
    }

    fn used(&self, basis: UsageBasis) -> i64 {
        match basis {
            UsageBasis::Receipt => self.committed(),
            UsageBasis::Verification => self.accepted,
        }
    }
}

/// Tally every GRN of `po` per order line. Notes for other orders are ignored.
pub fn line_progress(po: &PurchaseOrder, grns: &[Grn]) -> Vec<LineProgress> {
    po.items
        .iter()
        .map(|item| {
            let (accepted, pending) = grns
                .iter()
                .filter(|g| g.purchase_order_id == po.id)
                .map(|g| g.usage_for(item.id))
                .fold((0_i64, 0_i64), |(a, p), (ga, gp)| {
                    (a.saturating_add(ga), p.saturating_add(gp))
                });
            LineProgress {
                po_item_id: item.id,
                ordered: item.quantity,
                accepted,
                pending,
            }
        })
        .collect()
}

/// RECEIVED once verified acceptance covers every line, PARTIAL once any line
/// has usage under `basis`, otherwise PURCHASED after a verification or the
/// prior status after a receipt.
///
/// Orders outside the receiving phase keep their status.
pub fn derive_status(
    prior: PurchaseOrderStatus,
    lines: &[LineProgress],
    basis: UsageBasis,
) -> PurchaseOrderStatus {
    if !matches!(
        prior,
        PurchaseOrderStatus::Purchased | PurchaseOrderStatus::Partial | PurchaseOrderStatus::Received
    ) || lines.is_empty()
    {
        return prior;
    }

    if lines.iter().all(|l| l.accepted >= l.ordered) {
        return PurchaseOrderStatus::Received;
    }
    if lines.iter().any(|l| l.used(basis) > 0) {
        return PurchaseOrderStatus::Partial;
    }
    match basis {
        UsageBasis::Receipt => prior,
        UsageBasis::Verification => PurchaseOrderStatus::Purchased,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn line(ordered: i64, accepted: i64, pending: i64) -> LineProgress {
        LineProgress {
            po_item_id: PurchaseOrderItemId::new(),
            ordered,
            accepted,
            pending,
        }
    }

    #[test]
    fn pending_only_is_partial_at_receipt() {
        let lines = [line(100, 0, 100)];
        assert_eq!(
            derive_status(PurchaseOrderStatus::Purchased, &lines, UsageBasis::Receipt),
            PurchaseOrderStatus::Partial
        );
    }

    #[test]
    fn pending_does_not_count_after_verification() {
        let lines = [line(100, 0, 60)];
        assert_eq!(
            derive_status(PurchaseOrderStatus::Partial, &lines, UsageBasis::Verification),
            PurchaseOrderStatus::Purchased
        );
    }

    #[test]
    fn full_acceptance_is_received() {
        let lines = [line(100, 100, 0), line(5, 6, 0)];
        for basis in [UsageBasis::Receipt, UsageBasis::Verification] {
            assert_eq!(
                derive_status(PurchaseOrderStatus::Partial, &lines, basis),
                PurchaseOrderStatus::Received
            );
        }
    }

    #[test]
    fn nothing_received_keeps_prior_at_receipt() {
        let lines = [line(10, 0, 0)];
        assert_eq!(
            derive_status(PurchaseOrderStatus::Purchased, &lines, UsageBasis::Receipt),
            PurchaseOrderStatus::Purchased
        );
    }

    #[test]
    fn orders_outside_receiving_are_untouched() {
        let lines = [line(10, 10, 0)];
        assert_eq!(
            derive_status(PurchaseOrderStatus::Approved, &lines, UsageBasis::Verification),
            PurchaseOrderStatus::Approved
        );
    }

    #[test]
    fn huge_tallies_saturate_instead_of_wrapping() {
        let l = line(10, i64::MAX, i64::MAX);
        assert_eq!(l.committed(), i64::MAX);
        assert!(l.remaining() < 0);
    }

    proptest! {
        #[test]
        fn received_iff_every_line_accepted(
            raw in proptest::collection::vec((1i64..50, 0i64..60, 0i64..60), 1..6),
        ) {
            let lines: Vec<_> = raw.iter().map(|&(o, a, p)| line(o, a, p)).collect();
            let all_accepted = lines.iter().all(|l| l.accepted >= l.ordered);
            for basis in [UsageBasis::Receipt, UsageBasis::Verification] {
                let status = derive_status(PurchaseOrderStatus::Purchased, &lines, basis);
                prop_assert_eq!(status == PurchaseOrderStatus::Received, all_accepted);
                prop_assert!(matches!(
                    status,
                    PurchaseOrderStatus::Purchased
                        | PurchaseOrderStatus::Partial
                        | PurchaseOrderStatus::Received
                ));
            }
        }
    }
}
