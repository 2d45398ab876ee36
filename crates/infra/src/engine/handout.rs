//! Security handout: debit stock, then split or merge the dispatch line.

use chrono::{DateTime, Utc};
use tracing::instrument;

use siteops_auth::Permission;
use siteops_core::{DispatchId, DispatchItemId, DomainError, InventoryItemId, UserId};
use siteops_dispatch::{DispatchItem, DispatchStatus, HandoutKind};
use siteops_events::OperationsEvent;
use siteops_inventory::{
    InventoryItem, InventoryKey, InventoryMovement, MovementKind, MovementReference,
};

use super::{not_found, EngineResult, ReconciliationEngine};
use crate::store::{
    AuditLog, DispatchRepository, InventoryLedger, PurchaseRepository, Store, Transaction,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandoutReceipt {
    pub inventory_item_id: InventoryItemId,
    pub handed_qty: i64,
    pub dispatch_id: DispatchId,
    /// Line now carrying the handed quantity (the merge target when merged).
    pub handed_line: DispatchItemId,
    pub kind: HandoutKind,
    pub status: DispatchStatus,
}

/// Find the stock record backing a line: explicit link, then the line's site
/// purchase, then the normalized (description, unit) key, then a record
/// seeded from the site purchase when allowed.
async fn resolve_inventory<T: Transaction>(
    tx: &mut T,
    item: &DispatchItem,
    allow_seeding: bool,
    now: DateTime<Utc>,
) -> EngineResult<InventoryItem> {
    if let Some(id) = item.inventory_item_id {
        if let Some(found) = tx.inventory_item(id).await? {
            return Ok(found);
        }
        tracing::debug!(inventory_item_id = %id, "linked inventory record missing, falling back");
    }
    if let Some(purchase_id) = item.purchase_id {
        if let Some(found) = tx.inventory_by_purchase(purchase_id).await? {
            return Ok(found);
        }
    }
    if let Some(found) = tx
        .inventory_by_key(&InventoryKey::new(&item.description, &item.unit))
        .await?
    {
        return Ok(found);
    }

    if allow_seeding {
        if let Some(purchase_id) = item.purchase_id {
            if let Some(purchase) = tx.site_purchase(purchase_id).await? {
                let seeded = InventoryItem::new(
                    &purchase.description,
                    &purchase.unit,
                    purchase.quantity,
                    now,
                )?
                .seeded_from_purchase(purchase_id);
                tx.insert_inventory(&seeded).await?;
                tracing::info!(
                    inventory_item_id = %seeded.id,
                    purchase_id = %purchase_id,
                    quantity = seeded.quantity,
                    "inventory seeded from site purchase"
                );
                return Ok(seeded);
            }
        }
    }

    Err(DomainError::not_linked(format!(
        "dispatch line {} ({} [{}]) has no inventory record",
        item.id, item.description, item.unit
    ))
    .into())
}

impl<S> ReconciliationEngine<S>
where
    S: Store + AuditLog,
{
    /// Hand out `qty` of a dispatch line.
    ///
    /// The guarded decrement is the only thing standing between concurrent
    /// handouts and negative stock: the loser sees zero rows affected and
    /// gets `InsufficientStock`, with nothing written.
    #[instrument(skip(self), fields(actor = %actor), err)]
    pub async fn hand_out_dispatch_item(
        &self,
        actor: UserId,
        dispatch_item_id: DispatchItemId,
        qty: i64,
    ) -> EngineResult<HandoutReceipt> {
        self.authorize(actor, &Permission::DISPATCH_HAND_OUT)?;
        let now = Utc::now();
        let allow_seeding = self.config.dispatch.allow_inventory_seeding;

        let (receipt, movement) = self
            .within_budget("hand_out_dispatch_item", async {
                let mut tx = self.store.begin().await?;
                let dispatch_id = tx
                    .dispatch_of_item(dispatch_item_id)
                    .await?
                    .ok_or_else(|| not_found(format!("dispatch line {dispatch_item_id}")))?;
                let mut dispatch = tx
                    .dispatch_for_update(dispatch_id)
                    .await?
                    .ok_or_else(|| not_found(format!("dispatch {dispatch_id}")))?;

                let line = dispatch.check_handout(dispatch_item_id, qty)?.clone();
                let stock = resolve_inventory(&mut tx, &line, allow_seeding, now).await?;

                if !tx.conditional_decrement(stock.id, qty).await? {
                    return Err(DomainError::insufficient_stock(format!(
                        "{} [{}]: requested {qty}, {} on hand when read",
                        stock.name, stock.unit, stock.quantity
                    ))
                    .into());
                }

                let result = dispatch.hand_out(dispatch_item_id, qty, stock.id, actor, now)?;
                tx.upsert_dispatch_items(&result.change.upserted).await?;
                tx.delete_dispatch_items(&result.change.removed).await?;
                tx.update_dispatch(&dispatch).await?;
                tx.commit().await?;

                let movement = InventoryMovement::new(
                    stock.id,
                    MovementKind::Handout,
                    qty,
                    MovementReference::DispatchItem(result.change.handed_line),
                    actor,
                    now,
                );
                Ok((
                    HandoutReceipt {
                        inventory_item_id: stock.id,
                        handed_qty: qty,
                        dispatch_id,
                        handed_line: result.change.handed_line,
                        kind: result.change.kind,
                        status: result.status,
                    },
                    movement,
                ))
            })
            .await?;

        tracing::info!(
            dispatch_id = %receipt.dispatch_id,
            handed_line = %receipt.handed_line,
            inventory_item_id = %receipt.inventory_item_id,
            qty,
            status = receipt.status.as_str(),
            "dispatch line handed out"
        );
        self.audit(std::slice::from_ref(&movement)).await;
        self.notify(
            actor,
            now,
            OperationsEvent::DispatchItemHandedOut {
                dispatch_id: receipt.dispatch_id,
                dispatch_item_id: receipt.handed_line,
                inventory_item_id: receipt.inventory_item_id,
                quantity: qty,
            },
        );
        Ok(receipt)
    }
}
