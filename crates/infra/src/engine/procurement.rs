//! Requisitions, purchase orders, receipts and site purchases.

use chrono::Utc;
use tracing::instrument;

use siteops_auth::Permission;
use siteops_core::{MinorUnits, ProjectId, PurchaseId, PurchaseOrderId, RequisitionId, UserId};
use siteops_events::OperationsEvent;
use siteops_purchasing::{
    plan_receipt, DeliveryLine, PriceEdit, PurchaseOrder, PurchaseOrderLine, ReceiptPlan,
    Requisition, RequisitionItem, SitePurchase, Vendor,
};

use super::{not_found, EngineResult, ReconciliationEngine};
use crate::store::{
    AuditLog, GrnRepository, PurchaseOrderRepository, PurchaseRepository, RequisitionRepository,
    Store, Transaction,
};

impl<S> ReconciliationEngine<S>
where
    S: Store + AuditLog,
{
    /// Record a DRAFT requisition.
    #[instrument(skip(self, items), fields(actor = %actor, project_id = %project_id), err)]
    pub async fn create_requisition(
        &self,
        actor: UserId,
        project_id: ProjectId,
        items: Vec<RequisitionItem>,
    ) -> EngineResult<RequisitionId> {
        self.authorize(actor, &Permission::REQUISITION_SUBMIT)?;
        let now = Utc::now();
        let requisition = Requisition::new(project_id, actor, items, now)?;
        let id = requisition.id;

        self.within_budget("create_requisition", async {
            let mut tx = self.store.begin().await?;
            tx.insert_requisition(&requisition).await?;
            tx.commit().await?;
            Ok(())
        })
        .await?;

        self.notify(actor, now, OperationsEvent::RequisitionCreated { requisition_id: id });
        Ok(id)
    }

    /// DRAFT → SUBMITTED.
    #[instrument(skip(self), fields(actor = %actor), err)]
    pub async fn submit_requisition(
        &self,
        actor: UserId,
        requisition_id: RequisitionId,
    ) -> EngineResult<()> {
        self.authorize(actor, &Permission::REQUISITION_SUBMIT)?;
        let now = Utc::now();

        self.within_budget("submit_requisition", async {
            let mut tx = self.store.begin().await?;
            let mut requisition = tx
                .requisition_for_update(requisition_id)
                .await?
                .ok_or_else(|| not_found(format!("requisition {requisition_id}")))?;
            requisition.submit(now)?;
            tx.update_requisition(&requisition).await?;
            tx.commit().await?;
            Ok(())
        })
        .await?;

        self.notify(actor, now, OperationsEvent::RequisitionSubmitted { requisition_id });
        Ok(())
    }

    /// Raise a purchase order against a SUBMITTED requisition; the
    /// requisition moves to ORDERED in the same transaction.
    #[instrument(skip(self, vendor, lines), fields(actor = %actor, vendor = %vendor.name), err)]
    pub async fn create_purchase_order(
        &self,
        actor: UserId,
        requisition_id: RequisitionId,
        vendor: Vendor,
        lines: Vec<PurchaseOrderLine>,
    ) -> EngineResult<PurchaseOrderId> {
        self.authorize(actor, &Permission::PURCHASE_ORDER_CREATE)?;
        let now = Utc::now();

        let po_id = self
            .within_budget("create_purchase_order", async {
                let mut tx = self.store.begin().await?;
                let mut requisition = tx
                    .requisition_for_update(requisition_id)
                    .await?
                    .ok_or_else(|| not_found(format!("requisition {requisition_id}")))?;

                let po = PurchaseOrder::create(&requisition, vendor, lines, actor, now)?;
                requisition.mark_ordered(&po.ordered_quantities(), now)?;

                tx.insert_purchase_order(&po).await?;
                tx.update_requisition(&requisition).await?;
                tx.commit().await?;
                Ok(po.id)
            })
            .await?;

        tracing::info!(purchase_order_id = %po_id, "purchase order created");
        self.notify(
            actor,
            now,
            OperationsEvent::PurchaseOrderCreated {
                purchase_order_id: po_id,
                requisition_id,
            },
        );
        Ok(po_id)
    }

    /// SUBMITTED → APPROVED, repricing lines from the approver's edits and
    /// recording the settled prices on the requisition.
    #[instrument(skip(self, edits), fields(actor = %actor, edits = edits.len()), err)]
    pub async fn approve_purchase_order(
        &self,
        actor: UserId,
        purchase_order_id: PurchaseOrderId,
        edits: &[PriceEdit],
    ) -> EngineResult<PurchaseOrder> {
        self.authorize(actor, &Permission::PURCHASE_ORDER_APPROVE)?;
        let now = Utc::now();

        let po = self
            .within_budget("approve_purchase_order", async {
                let mut tx = self.store.begin().await?;
                let mut po = tx
                    .purchase_order_for_update(purchase_order_id)
                    .await?
                    .ok_or_else(|| not_found(format!("purchase order {purchase_order_id}")))?;
                po.approve_with_price_updates(edits, actor, now)?;
                let mut requisition = tx
                    .requisition_for_update(po.requisition_id)
                    .await?
                    .ok_or_else(|| not_found(format!("requisition {}", po.requisition_id)))?;
                requisition.record_approved_prices(&po.unit_prices());
                tx.update_purchase_order(&po).await?;
                tx.update_requisition(&requisition).await?;
                tx.commit().await?;
                Ok(po)
            })
            .await?;

        tracing::info!(
            purchase_order_id = %po.id,
            approved_amount = po.total_amount.amount(),
            "purchase order approved"
        );
        self.notify(actor, now, OperationsEvent::PurchaseOrderApproved { purchase_order_id });
        Ok(po)
    }

    /// SUBMITTED → REJECTED (terminal).
    #[instrument(skip(self, reason), fields(actor = %actor), err)]
    pub async fn reject_purchase_order(
        &self,
        actor: UserId,
        purchase_order_id: PurchaseOrderId,
        reason: &str,
    ) -> EngineResult<()> {
        self.authorize(actor, &Permission::PURCHASE_ORDER_REJECT)?;
        let now = Utc::now();

        self.within_budget("reject_purchase_order", async {
            let mut tx = self.store.begin().await?;
            let mut po = tx
                .purchase_order_for_update(purchase_order_id)
                .await?
                .ok_or_else(|| not_found(format!("purchase order {purchase_order_id}")))?;
            po.reject(reason, actor, now)?;
            tx.update_purchase_order(&po).await?;
            tx.commit().await?;
            Ok(())
        })
        .await?;

        self.notify(actor, now, OperationsEvent::PurchaseOrderRejected { purchase_order_id });
        Ok(())
    }

    /// APPROVED → PURCHASED.
    #[instrument(skip(self), fields(actor = %actor), err)]
    pub async fn place_purchase_order(
        &self,
        actor: UserId,
        purchase_order_id: PurchaseOrderId,
    ) -> EngineResult<()> {
        self.authorize(actor, &Permission::PURCHASE_ORDER_PLACE)?;
        let now = Utc::now();

        self.within_budget("place_purchase_order", async {
            let mut tx = self.store.begin().await?;
            let mut po = tx
                .purchase_order_for_update(purchase_order_id)
                .await?
                .ok_or_else(|| not_found(format!("purchase order {purchase_order_id}")))?;
            po.place_order(actor, now)?;
            tx.update_purchase_order(&po).await?;
            tx.commit().await?;
            Ok(())
        })
        .await?;

        self.notify(actor, now, OperationsEvent::PurchaseOrderPlaced { purchase_order_id });
        Ok(())
    }

    /// Record a delivery batch as PENDING GRNs, one per (vendor, receipt).
    ///
    /// The order row is locked while the ceilings are checked, so two gates
    /// receiving against the same order cannot both pass the check.
    #[instrument(skip(self, deliveries), fields(actor = %actor, lines = deliveries.len()), err)]
    pub async fn receive_goods(
        &self,
        actor: UserId,
        purchase_order_id: PurchaseOrderId,
        deliveries: &[DeliveryLine],
    ) -> EngineResult<ReceiptPlan> {
        self.authorize(actor, &Permission::GOODS_RECEIVE)?;
        let now = Utc::now();

        let plan = self
            .within_budget("receive_goods", async {
                let mut tx = self.store.begin().await?;
                let mut po = tx
                    .purchase_order_for_update(purchase_order_id)
                    .await?
                    .ok_or_else(|| not_found(format!("purchase order {purchase_order_id}")))?;
                let prior = tx.grns_for_order(purchase_order_id).await?;

                let plan = plan_receipt(&po, &prior, deliveries, actor, now)?;
                for grn in &plan.grns {
                    tx.insert_grn(grn).await?;
                }
                po.apply_status(plan.status, now);
                tx.update_purchase_order(&po).await?;
                tx.commit().await?;
                Ok(plan)
            })
            .await?;

        tracing::info!(
            purchase_order_id = %purchase_order_id,
            grns = plan.grns.len(),
            status = plan.status.as_str(),
            "goods received"
        );
        self.notify(
            actor,
            now,
            OperationsEvent::GoodsReceived {
                purchase_order_id,
                grn_ids: plan.grns.iter().map(|g| g.id).collect(),
            },
        );
        Ok(plan)
    }

    /// Direct site purchase; later the origin for lazily seeded stock.
    #[instrument(
        skip(self, description, unit),
        fields(actor = %actor, project_id = %project_id),
        err
    )]
    pub async fn record_site_purchase(
        &self,
        actor: UserId,
        project_id: ProjectId,
        description: &str,
        unit: &str,
        quantity: i64,
        unit_price: MinorUnits,
    ) -> EngineResult<PurchaseId> {
        self.authorize(actor, &Permission::SITE_PURCHASE_RECORD)?;
        let now = Utc::now();
        let purchase =
            SitePurchase::record(project_id, description, unit, quantity, unit_price, actor, now)?;
        let purchase_id = purchase.id;

        self.within_budget("record_site_purchase", async {
            let mut tx = self.store.begin().await?;
            tx.insert_site_purchase(&purchase).await?;
            tx.commit().await?;
            Ok(())
        })
        .await?;

        self.notify(actor, now, OperationsEvent::SitePurchaseRecorded { purchase_id });
        Ok(purchase_id)
    }
}
