//! GRN verification and the inventory credits it produces.

use chrono::Utc;
use tracing::instrument;

use siteops_auth::Permission;
use siteops_core::{DomainError, GrnId, InventoryItemId, PurchaseOrderId, UserId};
use siteops_events::OperationsEvent;
use siteops_inventory::{InventoryItem, InventoryMovement, MovementKind, MovementReference};
use siteops_purchasing::{
    summarize_variance, verify_batch, GrnVerification, LineVerdict, PurchaseOrderStatus,
    VarianceSummary,
};

use super::{not_found, EngineResult, ReconciliationEngine};
use crate::store::{
    AuditLog, GrnRepository, InventoryLedger, PurchaseOrderRepository, Store, Transaction,
};

/// What a verification changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationReport {
    pub purchase_order_id: PurchaseOrderId,
    pub verified: Vec<GrnId>,
    pub status: PurchaseOrderStatus,
    /// Inventory records credited, with the amount added to each.
    pub credited: Vec<(InventoryItemId, i64)>,
}

impl<S> ReconciliationEngine<S>
where
    S: Store + AuditLog,
{
    /// Verify one GRN.
    pub async fn verify_grn(
        &self,
        actor: UserId,
        grn_id: GrnId,
        lines: Vec<LineVerdict>,
    ) -> EngineResult<VerificationReport> {
        self.verify_grn_batch(actor, vec![GrnVerification { grn_id, lines }])
            .await
    }

    /// Verify several GRNs of one purchase order in a single transaction,
    /// followed by one status recompute and one inventory credit pass.
    #[instrument(skip(self, requests), fields(actor = %actor, grns = requests.len()), err)]
    pub async fn verify_grn_batch(
        &self,
        actor: UserId,
        requests: Vec<GrnVerification>,
    ) -> EngineResult<VerificationReport> {
        self.authorize(actor, &Permission::GRN_VERIFY)?;
        let now = Utc::now();

        let (report, movements) = self
            .within_budget("verify_grn_batch", async {
                let mut tx = self.store.begin().await?;

                let Some(first) = requests.first() else {
                    return Err(DomainError::validation("nothing to verify").into());
                };
                let purchase_order_id = tx
                    .grn(first.grn_id)
                    .await?
                    .ok_or_else(|| not_found(format!("GRN {}", first.grn_id)))?
                    .purchase_order_id;
                for r in &requests[1..] {
                    let grn = tx
                        .grn(r.grn_id)
                        .await?
                        .ok_or_else(|| not_found(format!("GRN {}", r.grn_id)))?;
                    if grn.purchase_order_id != purchase_order_id {
                        return Err(DomainError::validation(format!(
                            "GRN {} belongs to purchase order {}, batch is for {}",
                            grn.id, grn.purchase_order_id, purchase_order_id
                        ))
                        .into());
                    }
                }

                let mut po = tx
                    .purchase_order_for_update(purchase_order_id)
                    .await?
                    .ok_or_else(|| not_found(format!("purchase order {purchase_order_id}")))?;
                let mut grns = tx.grns_for_order(purchase_order_id).await?;

                let outcome = verify_batch(&po, &mut grns, &requests, actor, now)?;

                for grn in grns.iter().filter(|g| outcome.verified.contains(&g.id)) {
                    tx.update_grn(grn).await?;
                }
                po.apply_status(outcome.status, now);
                tx.update_purchase_order(&po).await?;

                let mut credited = Vec::with_capacity(outcome.credits.len());
                let mut movements = Vec::new();
                for credit in &outcome.credits {
                    let fresh =
                        InventoryItem::new(&credit.name, &credit.unit, credit.quantity, now)?;
                    let item_id = tx.credit_by_key(&fresh).await?;
                    credited.push((item_id, credit.quantity));
                    movements.extend(credit.sources.iter().map(|(grn_id, qty)| {
                        InventoryMovement::new(
                            item_id,
                            MovementKind::GrnReceipt,
                            *qty,
                            MovementReference::Grn(*grn_id),
                            actor,
                            now,
                        )
                    }));
                }

                tx.commit().await?;
                Ok((
                    VerificationReport {
                        purchase_order_id,
                        verified: outcome.verified,
                        status: outcome.status,
                        credited,
                    },
                    movements,
                ))
            })
            .await?;

        tracing::info!(
            purchase_order_id = %report.purchase_order_id,
            verified = report.verified.len(),
            credited = report.credited.len(),
            status = report.status.as_str(),
            "GRNs verified"
        );
        self.audit(&movements).await;
        self.notify(
            actor,
            now,
            OperationsEvent::GrnsVerified {
                purchase_order_id: report.purchase_order_id,
                grn_ids: report.verified.clone(),
                credited: report.credited.iter().map(|(id, _)| *id).collect(),
            },
        );
        Ok(report)
    }

    /// Price variance per GRN line of an order, for senior staff.
    #[instrument(skip(self), fields(actor = %actor), err)]
    pub async fn variance_summary(
        &self,
        actor: UserId,
        purchase_order_id: PurchaseOrderId,
    ) -> EngineResult<VarianceSummary> {
        self.authorize(actor, &Permission::VARIANCE_VIEW)?;

        self.within_budget("variance_summary", async {
            let mut tx = self.store.begin().await?;
            let po = tx
                .purchase_order(purchase_order_id)
                .await?
                .ok_or_else(|| not_found(format!("purchase order {purchase_order_id}")))?;
            let grns = tx.grns_for_order(purchase_order_id).await?;
            Ok(summarize_variance(&po, &grns)?)
        })
        .await
    }
}
