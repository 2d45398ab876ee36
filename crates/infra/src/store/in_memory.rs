//! In-memory store for tests/dev.
//!
//! Transactions are serialized by one async mutex: `begin` takes the lock and
//! copies the tables, `commit` swaps the copy in. Dropping a transaction
//! releases the lock and throws the copy away.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, OwnedMutexGuard};

use siteops_core::{
    DispatchId, DispatchItemId, GrnId, InventoryItemId, PurchaseId, PurchaseOrderId,
    RequisitionId,
};
use siteops_dispatch::{Dispatch, DispatchItem, ReturnRecord};
use siteops_inventory::{InventoryItem, InventoryKey, InventoryMovement};
use siteops_purchasing::{Grn, PurchaseOrder, Requisition, SitePurchase};

use super::{
    AuditLog, DispatchRepository, GrnRepository, InventoryLedger, PurchaseOrderRepository,
    PurchaseRepository, RequisitionRepository, ReturnRepository, Store, StoreError, StoreResult,
    Transaction,
};

#[derive(Debug, Default, Clone)]
struct Tables {
    requisitions: HashMap<RequisitionId, Requisition>,
    purchase_orders: HashMap<PurchaseOrderId, PurchaseOrder>,
    grns: Vec<Grn>,
    site_purchases: HashMap<PurchaseId, SitePurchase>,
    inventory: HashMap<InventoryItemId, InventoryItem>,
    dispatches: HashMap<DispatchId, Dispatch>,
    returns: Vec<ReturnRecord>,
}

#[derive(Debug, Default)]
pub struct InMemoryStore {
    tables: Arc<Mutex<Tables>>,
    movements: RwLock<Vec<InventoryMovement>>,
    fail_audit: AtomicBool,
    commit_delay_ms: AtomicU64,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every audit write fail until switched back.
    pub fn fail_audit_writes(&self, fail: bool) {
        self.fail_audit.store(fail, Ordering::SeqCst);
    }

    /// Sleep this long inside every commit, before anything is applied.
    pub fn delay_commits(&self, delay: Duration) {
        let ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        self.commit_delay_ms.store(ms, Ordering::SeqCst);
    }

    /// Movement log contents, oldest first.
    pub fn movements(&self) -> Vec<InventoryMovement> {
        self.movements
            .read()
            .map(|m| m.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl Store for InMemoryStore {
    type Tx = InMemoryTransaction;

    async fn begin(&self) -> StoreResult<InMemoryTransaction> {
        let guard = Arc::clone(&self.tables).lock_owned().await;
        let working = guard.clone();
        let delay = self.commit_delay_ms.load(Ordering::SeqCst);
        Ok(InMemoryTransaction {
            guard,
            working,
            commit_delay: (delay > 0).then(|| Duration::from_millis(delay)),
        })
    }
}

#[async_trait]
impl AuditLog for InMemoryStore {
    async fn record_movement(&self, movement: &InventoryMovement) -> StoreResult<()> {
        if self.fail_audit.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("movement log unavailable".to_string()));
        }
        self.movements
            .write()
            .map_err(|_| StoreError::Poisoned)?
            .push(movement.clone());
        Ok(())
    }
}

pub struct InMemoryTransaction {
    guard: OwnedMutexGuard<Tables>,
    working: Tables,
    commit_delay: Option<Duration>,
}

impl InMemoryTransaction {
    fn dispatch_holding(&mut self, item: DispatchItemId) -> Option<&mut Dispatch> {
        self.working
            .dispatches
            .values_mut()
            .find(|d| d.items.iter().any(|i| i.id == item))
    }
}

#[async_trait]
impl Transaction for InMemoryTransaction {
    async fn commit(mut self) -> StoreResult<()> {
        if let Some(delay) = self.commit_delay {
            tokio::time::sleep(delay).await;
        }
        *self.guard = self.working;
        Ok(())
    }
}

#[async_trait]
impl RequisitionRepository for InMemoryTransaction {
    async fn requisition(&mut self, id: RequisitionId) -> StoreResult<Option<Requisition>> {
        Ok(self.working.requisitions.get(&id).cloned())
    }

    async fn requisition_for_update(
        &mut self,
        id: RequisitionId,
    ) -> StoreResult<Option<Requisition>> {
        self.requisition(id).await
    }

    async fn insert_requisition(&mut self, requisition: &Requisition) -> StoreResult<()> {
        self.working
            .requisitions
            .insert(requisition.id, requisition.clone());
        Ok(())
    }

    async fn update_requisition(&mut self, requisition: &Requisition) -> StoreResult<()> {
        self.insert_requisition(requisition).await
    }
}

#[async_trait]
impl PurchaseOrderRepository for InMemoryTransaction {
    async fn purchase_order(&mut self, id: PurchaseOrderId) -> StoreResult<Option<PurchaseOrder>> {
        Ok(self.working.purchase_orders.get(&id).cloned())
    }

    async fn purchase_order_for_update(
        &mut self,
        id: PurchaseOrderId,
    ) -> StoreResult<Option<PurchaseOrder>> {
        self.purchase_order(id).await
    }

    async fn insert_purchase_order(&mut self, po: &PurchaseOrder) -> StoreResult<()> {
        self.working.purchase_orders.insert(po.id, po.clone());
        Ok(())
    }

    async fn update_purchase_order(&mut self, po: &PurchaseOrder) -> StoreResult<()> {
        self.insert_purchase_order(po).await
    }
}

#[async_trait]
impl GrnRepository for InMemoryTransaction {
    async fn grn(&mut self, id: GrnId) -> StoreResult<Option<Grn>> {
        Ok(self.working.grns.iter().find(|g| g.id == id).cloned())
    }

    async fn grns_for_order(&mut self, po: PurchaseOrderId) -> StoreResult<Vec<Grn>> {
        Ok(self
            .working
            .grns
            .iter()
            .filter(|g| g.purchase_order_id == po)
            .cloned()
            .collect())
    }

    async fn insert_grn(&mut self, grn: &Grn) -> StoreResult<()> {
        self.working.grns.push(grn.clone());
        Ok(())
    }

    async fn update_grn(&mut self, grn: &Grn) -> StoreResult<()> {
        let slot = self
            .working
            .grns
            .iter_mut()
            .find(|g| g.id == grn.id)
            .ok_or_else(|| StoreError::Backend(format!("GRN {} does not exist", grn.id)))?;
        *slot = grn.clone();
        Ok(())
    }
}

#[async_trait]
impl PurchaseRepository for InMemoryTransaction {
    async fn site_purchase(&mut self, id: PurchaseId) -> StoreResult<Option<SitePurchase>> {
        Ok(self.working.site_purchases.get(&id).cloned())
    }

    async fn insert_site_purchase(&mut self, purchase: &SitePurchase) -> StoreResult<()> {
        self.working
            .site_purchases
            .insert(purchase.id, purchase.clone());
        Ok(())
    }
}

#[async_trait]
impl InventoryLedger for InMemoryTransaction {
    async fn inventory_item(&mut self, id: InventoryItemId) -> StoreResult<Option<InventoryItem>> {
        Ok(self.working.inventory.get(&id).cloned())
    }

    async fn inventory_by_key(&mut self, key: &InventoryKey) -> StoreResult<Option<InventoryItem>> {
        Ok(self
            .working
            .inventory
            .values()
            .filter(|i| &i.key() == key)
            .min_by_key(|i| (i.created_at, i.id))
            .cloned())
    }

    async fn inventory_by_purchase(
        &mut self,
        purchase: PurchaseId,
    ) -> StoreResult<Option<InventoryItem>> {
        Ok(self
            .working
            .inventory
            .values()
            .find(|i| i.purchase_id == Some(purchase))
            .cloned())
    }

    async fn insert_inventory(&mut self, item: &InventoryItem) -> StoreResult<()> {
        let key = item.key();
        if self.working.inventory.values().any(|i| i.key() == key) {
            return Err(StoreError::Backend(format!("inventory key {key} already exists")));
        }
        self.working.inventory.insert(item.id, item.clone());
        Ok(())
    }

    async fn increment(&mut self, id: InventoryItemId, amount: i64) -> StoreResult<()> {
        let item = self
            .working
            .inventory
            .get_mut(&id)
            .ok_or_else(|| StoreError::Backend(format!("inventory item {id} does not exist")))?;
        item.credit(amount, chrono::Utc::now())
            .map_err(|e| StoreError::Backend(e.to_string()))
    }

    async fn credit_by_key(&mut self, fresh: &InventoryItem) -> StoreResult<InventoryItemId> {
        match self.inventory_by_key(&fresh.key()).await? {
            Some(existing) => {
                self.increment(existing.id, fresh.quantity).await?;
                Ok(existing.id)
            }
            None => {
                self.insert_inventory(fresh).await?;
                Ok(fresh.id)
            }
        }
    }

    async fn conditional_decrement(
        &mut self,
        id: InventoryItemId,
        amount: i64,
    ) -> StoreResult<bool> {
        Ok(self
            .working
            .inventory
            .get_mut(&id)
            .is_some_and(|item| item.debit_if_available(amount, chrono::Utc::now())))
    }
}

#[async_trait]
impl DispatchRepository for InMemoryTransaction {
    async fn dispatch(&mut self, id: DispatchId) -> StoreResult<Option<Dispatch>> {
        Ok(self.working.dispatches.get(&id).cloned())
    }

    async fn dispatch_for_update(&mut self, id: DispatchId) -> StoreResult<Option<Dispatch>> {
        self.dispatch(id).await
    }

    async fn dispatch_of_item(&mut self, item: DispatchItemId) -> StoreResult<Option<DispatchId>> {
        Ok(self.dispatch_holding(item).map(|d| d.id))
    }

    async fn insert_dispatch(&mut self, dispatch: &Dispatch) -> StoreResult<()> {
        self.working.dispatches.insert(dispatch.id, dispatch.clone());
        Ok(())
    }

    async fn update_dispatch(&mut self, dispatch: &Dispatch) -> StoreResult<()> {
        let stored = self
            .working
            .dispatches
            .get_mut(&dispatch.id)
            .ok_or_else(|| StoreError::Backend(format!("dispatch {} does not exist", dispatch.id)))?;
        let items = std::mem::take(&mut stored.items);
        *stored = Dispatch {
            items,
            ..dispatch.clone()
        };
        Ok(())
    }

    async fn upsert_dispatch_items(&mut self, items: &[DispatchItem]) -> StoreResult<()> {
        for item in items {
            let dispatch = self
                .working
                .dispatches
                .get_mut(&item.dispatch_id)
                .ok_or_else(|| {
                    StoreError::Backend(format!("dispatch {} does not exist", item.dispatch_id))
                })?;
            match dispatch.items.iter_mut().find(|i| i.id == item.id) {
                Some(existing) => *existing = item.clone(),
                None => dispatch.items.push(item.clone()),
            }
        }
        Ok(())
    }

    async fn delete_dispatch_items(&mut self, ids: &[DispatchItemId]) -> StoreResult<()> {
        for id in ids {
            if let Some(dispatch) = self.dispatch_holding(*id) {
                dispatch.items.retain(|i| i.id != *id);
            }
        }
        Ok(())
    }
}

#[async_trait]
impl ReturnRepository for InMemoryTransaction {
    async fn returned_total(&mut self, item: DispatchItemId) -> StoreResult<i64> {
        Ok(self
            .working
            .returns
            .iter()
            .filter(|r| r.dispatch_item_id == item)
            .map(|r| r.quantity)
            .sum())
    }

    async fn insert_return(&mut self, record: &ReturnRecord) -> StoreResult<()> {
        self.working.returns.push(record.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    async fn seeded(store: &InMemoryStore, quantity: i64) -> InventoryItemId {
        let item = InventoryItem::new("Cement", "bags", quantity, Utc::now()).unwrap();
        let mut tx = store.begin().await.unwrap();
        tx.insert_inventory(&item).await.unwrap();
        tx.commit().await.unwrap();
        item.id
    }

    #[tokio::test]
    async fn dropped_transaction_discards_writes() {
        let store = InMemoryStore::new();
        let id = seeded(&store, 10).await;

        {
            let mut tx = store.begin().await.unwrap();
            assert!(tx.conditional_decrement(id, 4).await.unwrap());
        }

        let mut tx = store.begin().await.unwrap();
        assert_eq!(tx.inventory_item(id).await.unwrap().unwrap().quantity, 10);
    }

    #[tokio::test]
    async fn conditional_decrement_refuses_overdraw() {
        let store = InMemoryStore::new();
        let id = seeded(&store, 3).await;

        let mut tx = store.begin().await.unwrap();
        assert!(!tx.conditional_decrement(id, 4).await.unwrap());
        assert!(tx.conditional_decrement(id, 3).await.unwrap());
        tx.commit().await.unwrap();

        let mut tx = store.begin().await.unwrap();
        let item = tx.inventory_item(id).await.unwrap().unwrap();
        assert_eq!((item.quantity, item.qty), (0, 0));
    }

    #[tokio::test]
    async fn key_lookup_ignores_case_and_spacing() {
        let store = InMemoryStore::new();
        let id = seeded(&store, 1).await;
        let mut tx = store.begin().await.unwrap();
        let found = tx
            .inventory_by_key(&InventoryKey::new(" CEMENT ", "Bags"))
            .await
            .unwrap();
        assert_eq!(found.map(|i| i.id), Some(id));
    }

    #[tokio::test]
    async fn credit_by_key_tops_up_the_existing_record() {
        let store = InMemoryStore::new();
        let id = seeded(&store, 4).await;

        let mut tx = store.begin().await.unwrap();
        let fresh = InventoryItem::new(" cement", "BAGS", 6, Utc::now()).unwrap();
        assert_eq!(tx.credit_by_key(&fresh).await.unwrap(), id);
        let sand = InventoryItem::new("Sand", "tonnes", 2, Utc::now()).unwrap();
        assert_eq!(tx.credit_by_key(&sand).await.unwrap(), sand.id);
        tx.commit().await.unwrap();

        let mut tx = store.begin().await.unwrap();
        let item = tx.inventory_item(id).await.unwrap().unwrap();
        assert_eq!((item.quantity, item.qty), (10, 10));
        assert_eq!(tx.inventory_item(sand.id).await.unwrap().unwrap().quantity, 2);
    }

    #[tokio::test]
    async fn inventory_keys_are_unique() {
        let store = InMemoryStore::new();
        seeded(&store, 1).await;
        let mut tx = store.begin().await.unwrap();
        let twin = InventoryItem::new("CEMENT", "bags", 1, Utc::now()).unwrap();
        assert!(matches!(
            tx.insert_inventory(&twin).await,
            Err(StoreError::Backend(_))
        ));
    }

    #[tokio::test]
    async fn audit_failures_can_be_injected() {
        let store = InMemoryStore::new();
        store.fail_audit_writes(true);
        let movement = InventoryMovement::new(
            InventoryItemId::new(),
            siteops_inventory::MovementKind::Return,
            1,
            siteops_inventory::MovementReference::Return(siteops_core::ReturnId::new()),
            siteops_core::UserId::new(),
            Utc::now(),
        );
        assert!(store.record_movement(&movement).await.is_err());
        store.fail_audit_writes(false);
        store.record_movement(&movement).await.unwrap();
        assert_eq!(store.movements().len(), 1);
    }
}
