//! Read helpers. Each runs in its own transaction that is never committed.

use siteops_core::{DispatchId, InventoryItemId, PurchaseOrderId, RequisitionId};
use siteops_dispatch::Dispatch;
use siteops_inventory::{InventoryItem, InventoryKey};
use siteops_purchasing::{Grn, PurchaseOrder, Requisition};

use super::{EngineResult, ReconciliationEngine};
use crate::store::{
    AuditLog, DispatchRepository, GrnRepository, InventoryLedger, PurchaseOrderRepository,
    RequisitionRepository, Store,
};

impl<S> ReconciliationEngine<S>
where
    S: Store + AuditLog,
{
    pub async fn inventory_item(&self, id: InventoryItemId) -> EngineResult<Option<InventoryItem>> {
        self.within_budget("inventory_item", async {
            let mut tx = self.store.begin().await?;
            Ok(tx.inventory_item(id).await?)
        })
        .await
    }

    /// Stock record for a (name, unit) pair, matched after normalization.
    pub async fn inventory_by_key(
        &self,
        name: &str,
        unit: &str,
    ) -> EngineResult<Option<InventoryItem>> {
        let key = InventoryKey::new(name, unit);
        self.within_budget("inventory_by_key", async {
            let mut tx = self.store.begin().await?;
            Ok(tx.inventory_by_key(&key).await?)
        })
        .await
    }

    pub async fn requisition(&self, id: RequisitionId) -> EngineResult<Option<Requisition>> {
        self.within_budget("requisition", async {
            let mut tx = self.store.begin().await?;
            Ok(tx.requisition(id).await?)
        })
        .await
    }

    pub async fn purchase_order(&self, id: PurchaseOrderId) -> EngineResult<Option<PurchaseOrder>> {
        self.within_budget("purchase_order", async {
            let mut tx = self.store.begin().await?;
            Ok(tx.purchase_order(id).await?)
        })
        .await
    }

    pub async fn grns_for_purchase_order(&self, id: PurchaseOrderId) -> EngineResult<Vec<Grn>> {
        self.within_budget("grns_for_purchase_order", async {
            let mut tx = self.store.begin().await?;
            Ok(tx.grns_for_order(id).await?)
        })
        .await
    }

    pub async fn dispatch(&self, id: DispatchId) -> EngineResult<Option<Dispatch>> {
        self.within_budget("dispatch", async {
            let mut tx = self.store.begin().await?;
            Ok(tx.dispatch(id).await?)
        })
        .await
    }
}
