//! PostgreSQL store.
//!
//! Each [`PostgresTransaction`] wraps one database transaction with a
//! `statement_timeout`. Aggregates are read with their lines; `*_for_update`
//! readers take `FOR UPDATE` on the header row so concurrent writers to the
//! same order or dispatch queue behind each other. Stock changes are single
//! guarded `UPDATE` statements.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgConnection, PgPool, PgPoolOptions};
use sqlx::{FromRow, Postgres};
use tracing::instrument;
use uuid::Uuid;

use siteops_core::{
    DispatchId, DispatchItemId, GrnId, GrnItemId, InventoryItemId, MinorUnits, ProjectId,
    PurchaseId, PurchaseOrderId, PurchaseOrderItemId, RequisitionId, RequisitionItemId, UserId,
};
use siteops_dispatch::{Dispatch, DispatchItem, DispatchStatus, ReturnRecord};
use siteops_inventory::{InventoryItem, InventoryKey, InventoryMovement, MovementReference};
use siteops_purchasing::{
    Grn, GrnItem, GrnStatus, PurchaseOrder, PurchaseOrderItem, PurchaseOrderStatus, Requisition,
    RequisitionItem, RequisitionStatus, SitePurchase, Vendor,
};

use super::{
    AuditLog, DispatchRepository, GrnRepository, InventoryLedger, PurchaseOrderRepository,
    PurchaseRepository, RequisitionRepository, ReturnRepository, Store, StoreError, StoreResult,
    Transaction,
};

#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: PgPool,
    statement_timeout_ms: u64,
}

impl PostgresStore {
    pub fn new(pool: PgPool, statement_timeout: Duration) -> Self {
        Self {
            pool,
            statement_timeout_ms: u64::try_from(statement_timeout.as_millis()).unwrap_or(u64::MAX),
        }
    }

    pub async fn connect(
        url: &str,
        max_connections: u32,
        statement_timeout: Duration,
    ) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(statement_timeout)
            .connect(url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self::new(pool, statement_timeout))
    }

    /// Apply pending schema migrations.
    pub async fn migrate(&self) -> StoreResult<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::Backend(format!("migration failed: {e}")))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl Store for PostgresStore {
    type Tx = PostgresTransaction;

    #[instrument(skip(self), err)]
    async fn begin(&self) -> StoreResult<PostgresTransaction> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin", e))?;
        let set_timeout = format!("SET LOCAL statement_timeout = {}", self.statement_timeout_ms);
        sqlx::query(&set_timeout)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("set statement_timeout", e))?;
        Ok(PostgresTransaction { tx })
    }
}

#[async_trait]
impl AuditLog for PostgresStore {
    #[instrument(
        skip(self, movement),
        fields(movement_id = %movement.id, kind = movement.kind.as_str()),
        err
    )]
    async fn record_movement(&self, movement: &InventoryMovement) -> StoreResult<()> {
        let (reference_kind, reference_id) = reference_columns(&movement.reference);
        sqlx::query(
            r#"
            INSERT INTO inventory_movements (
                id, inventory_item_id, kind, quantity,
                reference_kind, reference_id, actor, occurred_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(movement.id.as_uuid())
        .bind(movement.inventory_item_id.as_uuid())
        .bind(movement.kind.as_str())
        .bind(movement.quantity)
        .bind(reference_kind)
        .bind(reference_id)
        .bind(movement.actor.as_uuid())
        .bind(movement.occurred_at)
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("record_movement", e))?;
        Ok(())
    }
}

fn reference_columns(reference: &MovementReference) -> (&'static str, Uuid) {
    match reference {
        MovementReference::Grn(id) => ("GRN", *id.as_uuid()),
        MovementReference::DispatchItem(id) => ("DISPATCH_ITEM", *id.as_uuid()),
        MovementReference::Return(id) => ("RETURN", *id.as_uuid()),
    }
}

pub struct PostgresTransaction {
    tx: sqlx::Transaction<'static, Postgres>,
}

impl PostgresTransaction {
    fn conn(&mut self) -> &mut PgConnection {
        &mut self.tx
    }
}

#[async_trait]
impl Transaction for PostgresTransaction {
    async fn commit(self) -> StoreResult<()> {
        self.tx
            .commit()
            .await
            .map_err(|e| map_sqlx_error("commit", e))
    }
}

// ---------------------------------------------------------------------------
// Rows
// ---------------------------------------------------------------------------

fn corrupt(what: &str, raw: &str) -> StoreError {
    StoreError::Corrupt(format!("unknown {what} '{raw}'"))
}

fn opt_user(id: Option<Uuid>) -> Option<UserId> {
    id.map(UserId::from_uuid)
}

#[derive(Debug, FromRow)]
struct RequisitionRow {
    id: Uuid,
    project_id: Uuid,
    requested_by: Uuid,
    status: String,
    created_at: DateTime<Utc>,
    submitted_at: Option<DateTime<Utc>>,
    ordered_at: Option<DateTime<Utc>>,
}

#[derive(Debug, FromRow)]
struct RequisitionItemRow {
    id: Uuid,
    description: String,
    unit: String,
    requested_qty: i64,
    estimated_unit_price: i64,
    approved_unit_price: Option<i64>,
    ordered_qty: i64,
}

impl RequisitionRow {
    fn into_requisition(self, items: Vec<RequisitionItemRow>) -> StoreResult<Requisition> {
        let status =
            RequisitionStatus::parse(&self.status).ok_or_else(|| corrupt("requisition status", &self.status))?;
        Ok(Requisition {
            id: RequisitionId::from_uuid(self.id),
            project_id: ProjectId::from_uuid(self.project_id),
            requested_by: UserId::from_uuid(self.requested_by),
            status,
            items: items
                .into_iter()
                .map(|r| RequisitionItem {
                    id: RequisitionItemId::from_uuid(r.id),
                    description: r.description,
                    unit: r.unit,
                    requested_qty: r.requested_qty,
                    estimated_unit_price: MinorUnits::new(r.estimated_unit_price),
                    approved_unit_price: r.approved_unit_price.map(MinorUnits::new),
                    ordered_qty: r.ordered_qty,
                })
                .collect(),
            created_at: self.created_at,
            submitted_at: self.submitted_at,
            ordered_at: self.ordered_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct PurchaseOrderRow {
    id: Uuid,
    requisition_id: Uuid,
    project_id: Uuid,
    vendor_name: String,
    vendor_contact: Option<String>,
    status: String,
    requested_amount: i64,
    approved_amount: Option<i64>,
    total_amount: i64,
    created_by: Uuid,
    created_at: DateTime<Utc>,
    approved_by: Option<Uuid>,
    approved_at: Option<DateTime<Utc>>,
    rejected_by: Option<Uuid>,
    rejected_at: Option<DateTime<Utc>>,
    rejection_reason: Option<String>,
    purchased_by: Option<Uuid>,
    purchased_at: Option<DateTime<Utc>>,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, FromRow)]
struct PurchaseOrderItemRow {
    id: Uuid,
    requisition_item_id: Option<Uuid>,
    description: String,
    unit: String,
    quantity: i64,
    unit_price: i64,
    total: i64,
}

impl PurchaseOrderRow {
    fn into_order(self, items: Vec<PurchaseOrderItemRow>) -> StoreResult<PurchaseOrder> {
        let status = PurchaseOrderStatus::parse(&self.status)
            .ok_or_else(|| corrupt("purchase order status", &self.status))?;
        Ok(PurchaseOrder {
            id: PurchaseOrderId::from_uuid(self.id),
            requisition_id: RequisitionId::from_uuid(self.requisition_id),
            project_id: ProjectId::from_uuid(self.project_id),
            vendor: Vendor {
                name: self.vendor_name,
                contact: self.vendor_contact,
            },
            status,
            requested_amount: MinorUnits::new(self.requested_amount),
            approved_amount: self.approved_amount.map(MinorUnits::new),
            total_amount: MinorUnits::new(self.total_amount),
            items: items
                .into_iter()
                .map(|r| PurchaseOrderItem {
                    id: PurchaseOrderItemId::from_uuid(r.id),
                    requisition_item_id: r.requisition_item_id.map(RequisitionItemId::from_uuid),
                    description: r.description,
                    unit: r.unit,
                    quantity: r.quantity,
                    unit_price: MinorUnits::new(r.unit_price),
                    total: MinorUnits::new(r.total),
                })
                .collect(),
            created_by: UserId::from_uuid(self.created_by),
            created_at: self.created_at,
            approved_by: opt_user(self.approved_by),
            approved_at: self.approved_at,
            rejected_by: opt_user(self.rejected_by),
            rejected_at: self.rejected_at,
            rejection_reason: self.rejection_reason,
            purchased_by: opt_user(self.purchased_by),
            purchased_at: self.purchased_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct GrnRow {
    id: Uuid,
    purchase_order_id: Uuid,
    vendor_name: String,
    receipt_number: String,
    status: String,
    received_by: Uuid,
    received_at: DateTime<Utc>,
    verified_by: Option<Uuid>,
    verified_at: Option<DateTime<Utc>>,
}

#[derive(Debug, FromRow)]
struct GrnItemRow {
    id: Uuid,
    grn_id: Uuid,
    po_item_id: Uuid,
    description: String,
    unit: String,
    qty_delivered: i64,
    qty_accepted: i64,
    qty_rejected: i64,
    price: i64,
    variance: i64,
}

impl GrnRow {
    fn into_grn(self, items: Vec<GrnItemRow>) -> StoreResult<Grn> {
        let status = GrnStatus::parse(&self.status).ok_or_else(|| corrupt("GRN status", &self.status))?;
        Ok(Grn {
            id: GrnId::from_uuid(self.id),
            purchase_order_id: PurchaseOrderId::from_uuid(self.purchase_order_id),
            vendor_name: self.vendor_name,
            receipt_number: self.receipt_number,
            status,
            received_by: UserId::from_uuid(self.received_by),
            received_at: self.received_at,
            verified_by: opt_user(self.verified_by),
            verified_at: self.verified_at,
            items: items
                .into_iter()
                .map(|r| GrnItem {
                    id: GrnItemId::from_uuid(r.id),
                    grn_id: GrnId::from_uuid(r.grn_id),
                    po_item_id: PurchaseOrderItemId::from_uuid(r.po_item_id),
                    description: r.description,
                    unit: r.unit,
                    qty_delivered: r.qty_delivered,
                    qty_accepted: r.qty_accepted,
                    qty_rejected: r.qty_rejected,
                    price: MinorUnits::new(r.price),
                    variance: MinorUnits::new(r.variance),
                })
                .collect(),
        })
    }
}

#[derive(Debug, FromRow)]
struct SitePurchaseRow {
    id: Uuid,
    project_id: Uuid,
    description: String,
    unit: String,
    quantity: i64,
    unit_price: i64,
    total: i64,
    purchased_by: Uuid,
    purchased_at: DateTime<Utc>,
}

impl From<SitePurchaseRow> for SitePurchase {
    fn from(r: SitePurchaseRow) -> Self {
        SitePurchase {
            id: PurchaseId::from_uuid(r.id),
            project_id: ProjectId::from_uuid(r.project_id),
            description: r.description,
            unit: r.unit,
            quantity: r.quantity,
            unit_price: MinorUnits::new(r.unit_price),
            total: MinorUnits::new(r.total),
            purchased_by: UserId::from_uuid(r.purchased_by),
            purchased_at: r.purchased_at,
        }
    }
}

#[derive(Debug, FromRow)]
struct InventoryRow {
    id: Uuid,
    name: String,
    unit: String,
    quantity: i64,
    qty: i64,
    purchase_id: Option<Uuid>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<InventoryRow> for InventoryItem {
    fn from(r: InventoryRow) -> Self {
        InventoryItem {
            id: InventoryItemId::from_uuid(r.id),
            name: r.name,
            unit: r.unit,
            quantity: r.quantity,
            qty: r.qty,
            purchase_id: r.purchase_id.map(PurchaseId::from_uuid),
            created_at: r.created_at,
            updated_at: r.updated_at,
        }
    }
}

#[derive(Debug, FromRow)]
struct DispatchRow {
    id: Uuid,
    project_id: Uuid,
    status: String,
    created_by: Uuid,
    created_at: DateTime<Utc>,
    approved_by: Option<Uuid>,
    approved_at: Option<DateTime<Utc>>,
    dispatched_at: Option<DateTime<Utc>>,
    driver_id: Option<Uuid>,
    in_transit_at: Option<DateTime<Utc>>,
    received_by: Option<Uuid>,
    delivered_at: Option<DateTime<Utc>>,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, FromRow)]
struct DispatchItemRow {
    id: Uuid,
    dispatch_id: Uuid,
    description: String,
    unit: String,
    qty: i64,
    handed_out_qty: i64,
    returned_qty: i64,
    used_out_qty: i64,
    handed_out: bool,
    handed_out_at: Option<DateTime<Utc>>,
    handed_out_by: Option<Uuid>,
    received_at: Option<DateTime<Utc>>,
    received_by: Option<Uuid>,
    used_out: bool,
    used_out_at: Option<DateTime<Utc>>,
    used_out_by: Option<Uuid>,
    requisition_item_id: Option<Uuid>,
    inventory_item_id: Option<Uuid>,
    purchase_id: Option<Uuid>,
    split_from: Option<Uuid>,
}

impl From<DispatchItemRow> for DispatchItem {
    fn from(r: DispatchItemRow) -> Self {
        DispatchItem {
            id: DispatchItemId::from_uuid(r.id),
            dispatch_id: DispatchId::from_uuid(r.dispatch_id),
            description: r.description,
            unit: r.unit,
            qty: r.qty,
            handed_out_qty: r.handed_out_qty,
            returned_qty: r.returned_qty,
            used_out_qty: r.used_out_qty,
            handed_out: r.handed_out,
            handed_out_at: r.handed_out_at,
            handed_out_by: opt_user(r.handed_out_by),
            received_at: r.received_at,
            received_by: opt_user(r.received_by),
            used_out: r.used_out,
            used_out_at: r.used_out_at,
            used_out_by: opt_user(r.used_out_by),
            requisition_item_id: r.requisition_item_id.map(RequisitionItemId::from_uuid),
            inventory_item_id: r.inventory_item_id.map(InventoryItemId::from_uuid),
            purchase_id: r.purchase_id.map(PurchaseId::from_uuid),
            split_from: r.split_from.map(DispatchItemId::from_uuid),
        }
    }
}

impl DispatchRow {
    fn into_dispatch(self, items: Vec<DispatchItemRow>) -> StoreResult<Dispatch> {
        let status =
            DispatchStatus::parse(&self.status).ok_or_else(|| corrupt("dispatch status", &self.status))?;
        Ok(Dispatch {
            id: DispatchId::from_uuid(self.id),
            project_id: ProjectId::from_uuid(self.project_id),
            status,
            items: items.into_iter().map(DispatchItem::from).collect(),
            created_by: UserId::from_uuid(self.created_by),
            created_at: self.created_at,
            approved_by: opt_user(self.approved_by),
            approved_at: self.approved_at,
            dispatched_at: self.dispatched_at,
            driver_id: opt_user(self.driver_id),
            in_transit_at: self.in_transit_at,
            received_by: opt_user(self.received_by),
            delivered_at: self.delivered_at,
            updated_at: self.updated_at,
        })
    }
}

// ---------------------------------------------------------------------------
// Loaders shared by the plain and locking readers
// ---------------------------------------------------------------------------

const SELECT_PURCHASE_ORDER: &str = r#"
    SELECT id, requisition_id, project_id, vendor_name, vendor_contact, status,
           requested_amount, approved_amount, total_amount, created_by, created_at,
           approved_by, approved_at, rejected_by, rejected_at, rejection_reason,
           purchased_by, purchased_at, updated_at
    FROM purchase_orders
    WHERE id = $1
"#;

const SELECT_DISPATCH: &str = r#"
    SELECT id, project_id, status, created_by, created_at, approved_by, approved_at,
           dispatched_at, driver_id, in_transit_at, received_by, delivered_at, updated_at
    FROM dispatches
    WHERE id = $1
"#;

const SELECT_INVENTORY: &str = r#"
    SELECT id, name, unit, quantity, qty, purchase_id, created_at, updated_at
    FROM inventory_items
"#;

const SELECT_REQUISITION: &str = r#"
    SELECT id, project_id, requested_by, status, created_at, submitted_at, ordered_at
    FROM requisitions
    WHERE id = $1
"#;

async fn load_requisition(
    conn: &mut PgConnection,
    id: RequisitionId,
    lock: bool,
) -> StoreResult<Option<Requisition>> {
    let sql = if lock {
        format!("{SELECT_REQUISITION} FOR UPDATE")
    } else {
        SELECT_REQUISITION.to_string()
    };
    let Some(row) = sqlx::query_as::<_, RequisitionRow>(&sql)
        .bind(id.as_uuid())
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| map_sqlx_error("load requisition", e))?
    else {
        return Ok(None);
    };

    let items = sqlx::query_as::<_, RequisitionItemRow>(
        r#"
        SELECT id, description, unit, requested_qty, estimated_unit_price,
               approved_unit_price, ordered_qty
        FROM requisition_items
        WHERE requisition_id = $1
        ORDER BY position
        "#,
    )
    .bind(id.as_uuid())
    .fetch_all(&mut *conn)
    .await
    .map_err(|e| map_sqlx_error("load requisition items", e))?;

    row.into_requisition(items).map(Some)
}

async fn load_purchase_order(
    conn: &mut PgConnection,
    id: PurchaseOrderId,
    lock: bool,
) -> StoreResult<Option<PurchaseOrder>> {
    let sql = if lock {
        format!("{SELECT_PURCHASE_ORDER} FOR UPDATE")
    } else {
        SELECT_PURCHASE_ORDER.to_string()
    };
    let Some(row) = sqlx::query_as::<_, PurchaseOrderRow>(&sql)
        .bind(id.as_uuid())
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| map_sqlx_error("load purchase order", e))?
    else {
        return Ok(None);
    };

    let items = sqlx::query_as::<_, PurchaseOrderItemRow>(
        r#"
        SELECT id, requisition_item_id, description, unit, quantity, unit_price, total
        FROM purchase_order_items
        WHERE purchase_order_id = $1
        ORDER BY position
        "#,
    )
    .bind(id.as_uuid())
    .fetch_all(&mut *conn)
    .await
    .map_err(|e| map_sqlx_error("load purchase order items", e))?;

    row.into_order(items).map(Some)
}

async fn load_grn_items(conn: &mut PgConnection, grn_ids: &[Uuid]) -> StoreResult<Vec<GrnItemRow>> {
    sqlx::query_as::<_, GrnItemRow>(
        r#"
        SELECT id, grn_id, po_item_id, description, unit, qty_delivered,
               qty_accepted, qty_rejected, price, variance
        FROM grn_items
        WHERE grn_id = ANY($1)
        ORDER BY grn_id, position
        "#,
    )
    .bind(grn_ids)
    .fetch_all(&mut *conn)
    .await
    .map_err(|e| map_sqlx_error("load GRN items", e))
}

async fn load_dispatch(
    conn: &mut PgConnection,
    id: DispatchId,
    lock: bool,
) -> StoreResult<Option<Dispatch>> {
    let sql = if lock {
        format!("{SELECT_DISPATCH} FOR UPDATE")
    } else {
        SELECT_DISPATCH.to_string()
    };
    let Some(row) = sqlx::query_as::<_, DispatchRow>(&sql)
        .bind(id.as_uuid())
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| map_sqlx_error("load dispatch", e))?
    else {
        return Ok(None);
    };

    let items = sqlx::query_as::<_, DispatchItemRow>(
        r#"
        SELECT id, dispatch_id, description, unit, qty, handed_out_qty, returned_qty,
               used_out_qty, handed_out, handed_out_at, handed_out_by, received_at,
               received_by, used_out, used_out_at, used_out_by, requisition_item_id,
               inventory_item_id, purchase_id, split_from
        FROM dispatch_items
        WHERE dispatch_id = $1
        ORDER BY seq
        "#,
    )
    .bind(id.as_uuid())
    .fetch_all(&mut *conn)
    .await
    .map_err(|e| map_sqlx_error("load dispatch items", e))?;

    row.into_dispatch(items).map(Some)
}

async fn write_purchase_order_header(conn: &mut PgConnection, po: &PurchaseOrder) -> StoreResult<()> {
    sqlx::query(
        r#"
        UPDATE purchase_orders
        SET vendor_name = $2, vendor_contact = $3, status = $4, requested_amount = $5,
            approved_amount = $6, total_amount = $7, approved_by = $8, approved_at = $9,
            rejected_by = $10, rejected_at = $11, rejection_reason = $12,
            purchased_by = $13, purchased_at = $14, updated_at = $15
        WHERE id = $1
        "#,
    )
    .bind(po.id.as_uuid())
    .bind(&po.vendor.name)
    .bind(po.vendor.contact.as_deref())
    .bind(po.status.as_str())
    .bind(po.requested_amount.amount())
    .bind(po.approved_amount.map(MinorUnits::amount))
    .bind(po.total_amount.amount())
    .bind(po.approved_by.map(|u| *u.as_uuid()))
    .bind(po.approved_at)
    .bind(po.rejected_by.map(|u| *u.as_uuid()))
    .bind(po.rejected_at)
    .bind(po.rejection_reason.as_deref())
    .bind(po.purchased_by.map(|u| *u.as_uuid()))
    .bind(po.purchased_at)
    .bind(po.updated_at)
    .execute(&mut *conn)
    .await
    .map_err(|e| map_sqlx_error("update purchase order", e))?;
    Ok(())
}

async fn upsert_dispatch_item(conn: &mut PgConnection, item: &DispatchItem) -> StoreResult<()> {
    sqlx::query(
        r#"
        INSERT INTO dispatch_items (
            id, dispatch_id, description, unit, qty, handed_out_qty, returned_qty,
            used_out_qty, handed_out, handed_out_at, handed_out_by, received_at,
            received_by, used_out, used_out_at, used_out_by, requisition_item_id,
            inventory_item_id, purchase_id, split_from
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16,
                $17, $18, $19, $20)
        ON CONFLICT (id) DO UPDATE SET
            qty = EXCLUDED.qty,
            handed_out_qty = EXCLUDED.handed_out_qty,
            returned_qty = EXCLUDED.returned_qty,
            used_out_qty = EXCLUDED.used_out_qty,
            handed_out = EXCLUDED.handed_out,
            handed_out_at = EXCLUDED.handed_out_at,
            handed_out_by = EXCLUDED.handed_out_by,
            received_at = EXCLUDED.received_at,
            received_by = EXCLUDED.received_by,
            used_out = EXCLUDED.used_out,
            used_out_at = EXCLUDED.used_out_at,
            used_out_by = EXCLUDED.used_out_by,
            inventory_item_id = EXCLUDED.inventory_item_id,
            purchase_id = EXCLUDED.purchase_id,
            split_from = EXCLUDED.split_from
        "#,
    )
    .bind(item.id.as_uuid())
    .bind(item.dispatch_id.as_uuid())
    .bind(&item.description)
    .bind(&item.unit)
    .bind(item.qty)
    .bind(item.handed_out_qty)
    .bind(item.returned_qty)
    .bind(item.used_out_qty)
    .bind(item.handed_out)
    .bind(item.handed_out_at)
    .bind(item.handed_out_by.map(|u| *u.as_uuid()))
    .bind(item.received_at)
    .bind(item.received_by.map(|u| *u.as_uuid()))
    .bind(item.used_out)
    .bind(item.used_out_at)
    .bind(item.used_out_by.map(|u| *u.as_uuid()))
    .bind(item.requisition_item_id.map(|i| *i.as_uuid()))
    .bind(item.inventory_item_id.map(|i| *i.as_uuid()))
    .bind(item.purchase_id.map(|i| *i.as_uuid()))
    .bind(item.split_from.map(|i| *i.as_uuid()))
    .execute(&mut *conn)
    .await
    .map_err(|e| map_sqlx_error("upsert dispatch item", e))?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Repositories
// ---------------------------------------------------------------------------

#[async_trait]
impl RequisitionRepository for PostgresTransaction {
    #[instrument(skip(self), fields(requisition_id = %id), err)]
    async fn requisition(&mut self, id: RequisitionId) -> StoreResult<Option<Requisition>> {
        load_requisition(self.conn(), id, false).await
    }

    #[instrument(skip(self), fields(requisition_id = %id), err)]
    async fn requisition_for_update(
        &mut self,
        id: RequisitionId,
    ) -> StoreResult<Option<Requisition>> {
        load_requisition(self.conn(), id, true).await
    }

    #[instrument(skip(self, requisition), fields(requisition_id = %requisition.id), err)]
    async fn insert_requisition(&mut self, requisition: &Requisition) -> StoreResult<()> {
        let conn = self.conn();
        sqlx::query(
            r#"
            INSERT INTO requisitions (
                id, project_id, requested_by, status, created_at, submitted_at, ordered_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(requisition.id.as_uuid())
        .bind(requisition.project_id.as_uuid())
        .bind(requisition.requested_by.as_uuid())
        .bind(requisition.status.as_str())
        .bind(requisition.created_at)
        .bind(requisition.submitted_at)
        .bind(requisition.ordered_at)
        .execute(&mut *conn)
        .await
        .map_err(|e| map_sqlx_error("insert requisition", e))?;

        for (position, item) in requisition.items.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO requisition_items (
                    id, requisition_id, position, description, unit, requested_qty,
                    estimated_unit_price, approved_unit_price, ordered_qty
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                "#,
            )
            .bind(item.id.as_uuid())
            .bind(requisition.id.as_uuid())
            .bind(position as i32)
            .bind(&item.description)
            .bind(&item.unit)
            .bind(item.requested_qty)
            .bind(item.estimated_unit_price.amount())
            .bind(item.approved_unit_price.map(MinorUnits::amount))
            .bind(item.ordered_qty)
            .execute(&mut *conn)
            .await
            .map_err(|e| map_sqlx_error("insert requisition item", e))?;
        }
        Ok(())
    }

    #[instrument(skip(self, requisition), fields(requisition_id = %requisition.id), err)]
    async fn update_requisition(&mut self, requisition: &Requisition) -> StoreResult<()> {
        let conn = self.conn();
        sqlx::query(
            r#"
            UPDATE requisitions
            SET status = $2, submitted_at = $3, ordered_at = $4
            WHERE id = $1
            "#,
        )
        .bind(requisition.id.as_uuid())
        .bind(requisition.status.as_str())
        .bind(requisition.submitted_at)
        .bind(requisition.ordered_at)
        .execute(&mut *conn)
        .await
        .map_err(|e| map_sqlx_error("update requisition", e))?;

        for item in &requisition.items {
            sqlx::query(
                r#"
                UPDATE requisition_items
                SET approved_unit_price = $2, ordered_qty = $3
                WHERE id = $1
                "#,
            )
            .bind(item.id.as_uuid())
            .bind(item.approved_unit_price.map(MinorUnits::amount))
            .bind(item.ordered_qty)
            .execute(&mut *conn)
            .await
            .map_err(|e| map_sqlx_error("update requisition item", e))?;
        }
        Ok(())
    }
}

#[async_trait]
impl PurchaseOrderRepository for PostgresTransaction {
    #[instrument(skip(self), fields(purchase_order_id = %id), err)]
    async fn purchase_order(&mut self, id: PurchaseOrderId) -> StoreResult<Option<PurchaseOrder>> {
        load_purchase_order(self.conn(), id, false).await
    }

    #[instrument(skip(self), fields(purchase_order_id = %id), err)]
    async fn purchase_order_for_update(
        &mut self,
        id: PurchaseOrderId,
    ) -> StoreResult<Option<PurchaseOrder>> {
        load_purchase_order(self.conn(), id, true).await
    }

    #[instrument(skip(self, po), fields(purchase_order_id = %po.id), err)]
    async fn insert_purchase_order(&mut self, po: &PurchaseOrder) -> StoreResult<()> {
        let conn = self.conn();
        sqlx::query(
            r#"
            INSERT INTO purchase_orders (
                id, requisition_id, project_id, vendor_name, vendor_contact, status,
                requested_amount, approved_amount, total_amount, created_by, created_at,
                updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(po.id.as_uuid())
        .bind(po.requisition_id.as_uuid())
        .bind(po.project_id.as_uuid())
        .bind(&po.vendor.name)
        .bind(po.vendor.contact.as_deref())
        .bind(po.status.as_str())
        .bind(po.requested_amount.amount())
        .bind(po.approved_amount.map(MinorUnits::amount))
        .bind(po.total_amount.amount())
        .bind(po.created_by.as_uuid())
        .bind(po.created_at)
        .bind(po.updated_at)
        .execute(&mut *conn)
        .await
        .map_err(|e| map_sqlx_error("insert purchase order", e))?;

        for (position, item) in po.items.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO purchase_order_items (
                    id, purchase_order_id, position, requisition_item_id, description,
                    unit, quantity, unit_price, total
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                "#,
            )
            .bind(item.id.as_uuid())
            .bind(po.id.as_uuid())
            .bind(position as i32)
            .bind(item.requisition_item_id.map(|i| *i.as_uuid()))
            .bind(&item.description)
            .bind(&item.unit)
            .bind(item.quantity)
            .bind(item.unit_price.amount())
            .bind(item.total.amount())
            .execute(&mut *conn)
            .await
            .map_err(|e| map_sqlx_error("insert purchase order item", e))?;
        }
        Ok(())
    }

    #[instrument(skip(self, po), fields(purchase_order_id = %po.id, status = po.status.as_str()), err)]
    async fn update_purchase_order(&mut self, po: &PurchaseOrder) -> StoreResult<()> {
        let conn = self.conn();
        write_purchase_order_header(&mut *conn, po).await?;
        for item in &po.items {
            sqlx::query(
                r#"
                UPDATE purchase_order_items
                SET unit_price = $2, total = $3
                WHERE id = $1
                "#,
            )
            .bind(item.id.as_uuid())
            .bind(item.unit_price.amount())
            .bind(item.total.amount())
            .execute(&mut *conn)
            .await
            .map_err(|e| map_sqlx_error("update purchase order item", e))?;
        }
        Ok(())
    }
}

#[async_trait]
impl GrnRepository for PostgresTransaction {
    #[instrument(skip(self), fields(grn_id = %id), err)]
    async fn grn(&mut self, id: GrnId) -> StoreResult<Option<Grn>> {
        let conn = self.conn();
        let Some(row) = sqlx::query_as::<_, GrnRow>(
            r#"
            SELECT id, purchase_order_id, vendor_name, receipt_number, status,
                   received_by, received_at, verified_by, verified_at
            FROM grns
            WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| map_sqlx_error("load GRN", e))?
        else {
            return Ok(None);
        };
        let items = load_grn_items(&mut *conn, &[row.id]).await?;
        row.into_grn(items).map(Some)
    }

    #[instrument(skip(self), fields(purchase_order_id = %po), err)]
    async fn grns_for_order(&mut self, po: PurchaseOrderId) -> StoreResult<Vec<Grn>> {
        let conn = self.conn();
        let rows = sqlx::query_as::<_, GrnRow>(
            r#"
            SELECT id, purchase_order_id, vendor_name, receipt_number, status,
                   received_by, received_at, verified_by, verified_at
            FROM grns
            WHERE purchase_order_id = $1
            ORDER BY received_at, id
            "#,
        )
        .bind(po.as_uuid())
        .fetch_all(&mut *conn)
        .await
        .map_err(|e| map_sqlx_error("load GRNs for order", e))?;

        let ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();
        let mut items = load_grn_items(&mut *conn, &ids).await?;

        rows.into_iter()
            .map(|row| {
                let (mine, rest): (Vec<_>, Vec<_>) =
                    std::mem::take(&mut items).into_iter().partition(|i| i.grn_id == row.id);
                items = rest;
                row.into_grn(mine)
            })
            .collect()
    }

    #[instrument(skip(self, grn), fields(grn_id = %grn.id), err)]
    async fn insert_grn(&mut self, grn: &Grn) -> StoreResult<()> {
        let conn = self.conn();
        sqlx::query(
            r#"
            INSERT INTO grns (
                id, purchase_order_id, vendor_name, receipt_number, status,
                received_by, received_at, verified_by, verified_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(grn.id.as_uuid())
        .bind(grn.purchase_order_id.as_uuid())
        .bind(&grn.vendor_name)
        .bind(&grn.receipt_number)
        .bind(grn.status.as_str())
        .bind(grn.received_by.as_uuid())
        .bind(grn.received_at)
        .bind(grn.verified_by.map(|u| *u.as_uuid()))
        .bind(grn.verified_at)
        .execute(&mut *conn)
        .await
        .map_err(|e| map_sqlx_error("insert GRN", e))?;

        for (position, item) in grn.items.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO grn_items (
                    id, grn_id, position, po_item_id, description, unit, qty_delivered,
                    qty_accepted, qty_rejected, price, variance
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
                "#,
            )
            .bind(item.id.as_uuid())
            .bind(grn.id.as_uuid())
            .bind(position as i32)
            .bind(item.po_item_id.as_uuid())
            .bind(&item.description)
            .bind(&item.unit)
            .bind(item.qty_delivered)
            .bind(item.qty_accepted)
            .bind(item.qty_rejected)
            .bind(item.price.amount())
            .bind(item.variance.amount())
            .execute(&mut *conn)
            .await
            .map_err(|e| map_sqlx_error("insert GRN item", e))?;
        }
        Ok(())
    }

    #[instrument(skip(self, grn), fields(grn_id = %grn.id, status = grn.status.as_str()), err)]
    async fn update_grn(&mut self, grn: &Grn) -> StoreResult<()> {
        let conn = self.conn();
        sqlx::query(
            r#"
            UPDATE grns
            SET status = $2, verified_by = $3, verified_at = $4
            WHERE id = $1
            "#,
        )
        .bind(grn.id.as_uuid())
        .bind(grn.status.as_str())
        .bind(grn.verified_by.map(|u| *u.as_uuid()))
        .bind(grn.verified_at)
        .execute(&mut *conn)
        .await
        .map_err(|e| map_sqlx_error("update GRN", e))?;

        for item in &grn.items {
            sqlx::query(
                r#"
                UPDATE grn_items
                SET qty_accepted = $2, qty_rejected = $3
                WHERE id = $1
                "#,
            )
            .bind(item.id.as_uuid())
            .bind(item.qty_accepted)
            .bind(item.qty_rejected)
            .execute(&mut *conn)
            .await
            .map_err(|e| map_sqlx_error("update GRN item", e))?;
        }
        Ok(())
    }
}

#[async_trait]
impl PurchaseRepository for PostgresTransaction {
    #[instrument(skip(self), fields(purchase_id = %id), err)]
    async fn site_purchase(&mut self, id: PurchaseId) -> StoreResult<Option<SitePurchase>> {
        let row = sqlx::query_as::<_, SitePurchaseRow>(
            r#"
            SELECT id, project_id, description, unit, quantity, unit_price, total,
                   purchased_by, purchased_at
            FROM site_purchases
            WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .fetch_optional(self.conn())
        .await
        .map_err(|e| map_sqlx_error("load site purchase", e))?;
        Ok(row.map(SitePurchase::from))
    }

    #[instrument(skip(self, purchase), fields(purchase_id = %purchase.id), err)]
    async fn insert_site_purchase(&mut self, purchase: &SitePurchase) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO site_purchases (
                id, project_id, description, unit, quantity, unit_price, total,
                purchased_by, purchased_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(purchase.id.as_uuid())
        .bind(purchase.project_id.as_uuid())
        .bind(&purchase.description)
        .bind(&purchase.unit)
        .bind(purchase.quantity)
        .bind(purchase.unit_price.amount())
        .bind(purchase.total.amount())
        .bind(purchase.purchased_by.as_uuid())
        .bind(purchase.purchased_at)
        .execute(self.conn())
        .await
        .map_err(|e| map_sqlx_error("insert site purchase", e))?;
        Ok(())
    }
}

#[async_trait]
impl InventoryLedger for PostgresTransaction {
    #[instrument(skip(self), fields(inventory_item_id = %id), err)]
    async fn inventory_item(&mut self, id: InventoryItemId) -> StoreResult<Option<InventoryItem>> {
        let sql = format!("{SELECT_INVENTORY} WHERE id = $1");
        let row = sqlx::query_as::<_, InventoryRow>(&sql)
            .bind(id.as_uuid())
            .fetch_optional(self.conn())
            .await
            .map_err(|e| map_sqlx_error("load inventory item", e))?;
        Ok(row.map(InventoryItem::from))
    }

    #[instrument(skip(self, key), fields(key = %key), err)]
    async fn inventory_by_key(&mut self, key: &InventoryKey) -> StoreResult<Option<InventoryItem>> {
        let sql = format!(
            "{SELECT_INVENTORY} WHERE name_key = $1 AND unit_key = $2 ORDER BY created_at, id LIMIT 1"
        );
        let row = sqlx::query_as::<_, InventoryRow>(&sql)
            .bind(key.name())
            .bind(key.unit())
            .fetch_optional(self.conn())
            .await
            .map_err(|e| map_sqlx_error("load inventory by key", e))?;
        Ok(row.map(InventoryItem::from))
    }

    #[instrument(skip(self), fields(purchase_id = %purchase), err)]
    async fn inventory_by_purchase(
        &mut self,
        purchase: PurchaseId,
    ) -> StoreResult<Option<InventoryItem>> {
        let sql = format!("{SELECT_INVENTORY} WHERE purchase_id = $1");
        let row = sqlx::query_as::<_, InventoryRow>(&sql)
            .bind(purchase.as_uuid())
            .fetch_optional(self.conn())
            .await
            .map_err(|e| map_sqlx_error("load inventory by purchase", e))?;
        Ok(row.map(InventoryItem::from))
    }

    #[instrument(skip(self, item), fields(inventory_item_id = %item.id), err)]
    async fn insert_inventory(&mut self, item: &InventoryItem) -> StoreResult<()> {
        let key = item.key();
        sqlx::query(
            r#"
            INSERT INTO inventory_items (
                id, name, unit, name_key, unit_key, quantity, qty, purchase_id,
                created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(item.id.as_uuid())
        .bind(&item.name)
        .bind(&item.unit)
        .bind(key.name())
        .bind(key.unit())
        .bind(item.quantity)
        .bind(item.qty)
        .bind(item.purchase_id.map(|p| *p.as_uuid()))
        .bind(item.created_at)
        .bind(item.updated_at)
        .execute(self.conn())
        .await
        .map_err(|e| map_sqlx_error("insert inventory item", e))?;
        Ok(())
    }

    #[instrument(skip(self), fields(inventory_item_id = %id), err)]
    async fn increment(&mut self, id: InventoryItemId, amount: i64) -> StoreResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE inventory_items
            SET quantity = quantity + $2, qty = qty + $2, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .bind(amount)
        .execute(self.conn())
        .await
        .map_err(|e| map_sqlx_error("increment inventory", e))?;

        if result.rows_affected() != 1 {
            return Err(StoreError::Backend(format!(
                "inventory item {id} does not exist"
            )));
        }
        Ok(())
    }

    #[instrument(skip(self, fresh), fields(key = %fresh.key()), err)]
    async fn credit_by_key(&mut self, fresh: &InventoryItem) -> StoreResult<InventoryItemId> {
        let key = fresh.key();
        let id: Uuid = sqlx::query_scalar(
            r#"
            INSERT INTO inventory_items (
                id, name, unit, name_key, unit_key, quantity, qty, purchase_id,
                created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $6, NULL, $7, $7)
            ON CONFLICT (name_key, unit_key) DO UPDATE
            SET quantity = inventory_items.quantity + EXCLUDED.quantity,
                qty = inventory_items.qty + EXCLUDED.qty,
                updated_at = EXCLUDED.updated_at
            RETURNING id
            "#,
        )
        .bind(fresh.id.as_uuid())
        .bind(&fresh.name)
        .bind(&fresh.unit)
        .bind(key.name())
        .bind(key.unit())
        .bind(fresh.quantity)
        .bind(fresh.updated_at)
        .fetch_one(self.conn())
        .await
        .map_err(|e| map_sqlx_error("credit inventory by key", e))?;
        Ok(InventoryItemId::from_uuid(id))
    }

    #[instrument(skip(self), fields(inventory_item_id = %id), err)]
    async fn conditional_decrement(&mut self, id: InventoryItemId, amount: i64) -> StoreResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE inventory_items
            SET quantity = quantity - $2, qty = qty - $2, updated_at = NOW()
            WHERE id = $1 AND quantity >= $2
            "#,
        )
        .bind(id.as_uuid())
        .bind(amount)
        .execute(self.conn())
        .await
        .map_err(|e| map_sqlx_error("decrement inventory", e))?;
        Ok(result.rows_affected() == 1)
    }
}

#[async_trait]
impl DispatchRepository for PostgresTransaction {
    #[instrument(skip(self), fields(dispatch_id = %id), err)]
    async fn dispatch(&mut self, id: DispatchId) -> StoreResult<Option<Dispatch>> {
        load_dispatch(self.conn(), id, false).await
    }

    #[instrument(skip(self), fields(dispatch_id = %id), err)]
    async fn dispatch_for_update(&mut self, id: DispatchId) -> StoreResult<Option<Dispatch>> {
        load_dispatch(self.conn(), id, true).await
    }

    #[instrument(skip(self), fields(dispatch_item_id = %item), err)]
    async fn dispatch_of_item(&mut self, item: DispatchItemId) -> StoreResult<Option<DispatchId>> {
        let id: Option<Uuid> =
            sqlx::query_scalar("SELECT dispatch_id FROM dispatch_items WHERE id = $1")
                .bind(item.as_uuid())
                .fetch_optional(self.conn())
                .await
                .map_err(|e| map_sqlx_error("find dispatch of item", e))?;
        Ok(id.map(DispatchId::from_uuid))
    }

    #[instrument(skip(self, dispatch), fields(dispatch_id = %dispatch.id), err)]
    async fn insert_dispatch(&mut self, dispatch: &Dispatch) -> StoreResult<()> {
        let conn = self.conn();
        sqlx::query(
            r#"
            INSERT INTO dispatches (
                id, project_id, status, created_by, created_at, approved_by, approved_at,
                dispatched_at, driver_id, in_transit_at, received_by, delivered_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(dispatch.id.as_uuid())
        .bind(dispatch.project_id.as_uuid())
        .bind(dispatch.status.as_str())
        .bind(dispatch.created_by.as_uuid())
        .bind(dispatch.created_at)
        .bind(dispatch.approved_by.map(|u| *u.as_uuid()))
        .bind(dispatch.approved_at)
        .bind(dispatch.dispatched_at)
        .bind(dispatch.driver_id.map(|u| *u.as_uuid()))
        .bind(dispatch.in_transit_at)
        .bind(dispatch.received_by.map(|u| *u.as_uuid()))
        .bind(dispatch.delivered_at)
        .bind(dispatch.updated_at)
        .execute(&mut *conn)
        .await
        .map_err(|e| map_sqlx_error("insert dispatch", e))?;

        for item in &dispatch.items {
            upsert_dispatch_item(&mut *conn, item).await?;
        }
        Ok(())
    }

    #[instrument(skip(self, dispatch), fields(dispatch_id = %dispatch.id, status = dispatch.status.as_str()), err)]
    async fn update_dispatch(&mut self, dispatch: &Dispatch) -> StoreResult<()> {
        sqlx::query(
            r#"
            UPDATE dispatches
            SET status = $2, approved_by = $3, approved_at = $4, dispatched_at = $5,
                driver_id = $6, in_transit_at = $7, received_by = $8, delivered_at = $9,
                updated_at = $10
            WHERE id = $1
            "#,
        )
        .bind(dispatch.id.as_uuid())
        .bind(dispatch.status.as_str())
        .bind(dispatch.approved_by.map(|u| *u.as_uuid()))
        .bind(dispatch.approved_at)
        .bind(dispatch.dispatched_at)
        .bind(dispatch.driver_id.map(|u| *u.as_uuid()))
        .bind(dispatch.in_transit_at)
        .bind(dispatch.received_by.map(|u| *u.as_uuid()))
        .bind(dispatch.delivered_at)
        .bind(dispatch.updated_at)
        .execute(self.conn())
        .await
        .map_err(|e| map_sqlx_error("update dispatch", e))?;
        Ok(())
    }

    #[instrument(skip(self, items), fields(count = items.len()), err)]
    async fn upsert_dispatch_items(&mut self, items: &[DispatchItem]) -> StoreResult<()> {
        let conn = self.conn();
        for item in items {
            upsert_dispatch_item(&mut *conn, item).await?;
        }
        Ok(())
    }

    #[instrument(skip(self, ids), fields(count = ids.len()), err)]
    async fn delete_dispatch_items(&mut self, ids: &[DispatchItemId]) -> StoreResult<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let ids: Vec<Uuid> = ids.iter().map(|i| *i.as_uuid()).collect();
        sqlx::query("DELETE FROM dispatch_items WHERE id = ANY($1)")
            .bind(&ids)
            .execute(self.conn())
            .await
            .map_err(|e| map_sqlx_error("delete dispatch items", e))?;
        Ok(())
    }
}

#[async_trait]
impl ReturnRepository for PostgresTransaction {
    #[instrument(skip(self), fields(dispatch_item_id = %item), err)]
    async fn returned_total(&mut self, item: DispatchItemId) -> StoreResult<i64> {
        sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COALESCE(SUM(quantity), 0)::BIGINT
            FROM dispatch_returns
            WHERE dispatch_item_id = $1
            "#,
        )
        .bind(item.as_uuid())
        .fetch_one(self.conn())
        .await
        .map_err(|e| map_sqlx_error("sum returns", e))
    }

    #[instrument(skip(self, record), fields(return_id = %record.id, quantity = record.quantity), err)]
    async fn insert_return(&mut self, record: &ReturnRecord) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO dispatch_returns (
                id, dispatch_id, dispatch_item_id, inventory_item_id, quantity, note,
                returned_by, returned_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(record.id.as_uuid())
        .bind(record.dispatch_id.as_uuid())
        .bind(record.dispatch_item_id.as_uuid())
        .bind(record.inventory_item_id.as_uuid())
        .bind(record.quantity)
        .bind(record.note.as_deref())
        .bind(record.returned_by.as_uuid())
        .bind(record.returned_at)
        .execute(self.conn())
        .await
        .map_err(|e| map_sqlx_error("insert return", e))?;
        Ok(())
    }
}

/// Map sqlx errors to store errors.
fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code().as_deref() {
                // query_canceled: statement_timeout fired
                Some("57014") => StoreError::Timeout(msg),
                // lock_not_available
                Some("55P03") => StoreError::Timeout(msg),
                _ => StoreError::Backend(msg),
            }
        }
        sqlx::Error::PoolTimedOut => {
            StoreError::Timeout(format!("connection pool timed out in {operation}"))
        }
        sqlx::Error::RowNotFound => StoreError::Backend(format!("row not found in {operation}")),
        sqlx::Error::ColumnDecode { index, source } => {
            StoreError::Corrupt(format!("column {index} in {operation}: {source}"))
        }
        _ => StoreError::Backend(format!("{operation}: {err}")),
    }
}
