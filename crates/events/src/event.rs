use serde::{Deserialize, Serialize};

use siteops_core::{
    DispatchId, DispatchItemId, GrnId, InventoryItemId, PurchaseId, PurchaseOrderId,
    RequisitionId,
};

/// A domain-agnostic event.
///
/// Events are immutable facts about something that already committed.
pub trait Event: Clone + core::fmt::Debug + Send + Sync + 'static {
    /// Stable event name/type identifier (e.g. "purchasing.grn.verified").
    fn event_type(&self) -> &'static str;

    /// Schema version for this event type.
    fn version(&self) -> u32;
}

/// Cached views that may need to be refreshed after a change.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViewTopic {
    Requisitions,
    PurchaseOrders,
    Grns,
    Inventory,
    Dispatches,
}

/// Everything the reconciliation engine can change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OperationsEvent {
    RequisitionCreated {
        requisition_id: RequisitionId,
    },
    RequisitionSubmitted {
        requisition_id: RequisitionId,
    },
    PurchaseOrderCreated {
        purchase_order_id: PurchaseOrderId,
        requisition_id: RequisitionId,
    },
    PurchaseOrderApproved {
        purchase_order_id: PurchaseOrderId,
    },
    PurchaseOrderRejected {
        purchase_order_id: PurchaseOrderId,
    },
    PurchaseOrderPlaced {
        purchase_order_id: PurchaseOrderId,
    },
    GoodsReceived {
        purchase_order_id: PurchaseOrderId,
        grn_ids: Vec<GrnId>,
    },
    GrnsVerified {
        purchase_order_id: PurchaseOrderId,
        grn_ids: Vec<GrnId>,
        credited: Vec<InventoryItemId>,
    },
    SitePurchaseRecorded {
        purchase_id: PurchaseId,
    },
    DispatchCreated {
        dispatch_id: DispatchId,
    },
    DispatchStatusChanged {
        dispatch_id: DispatchId,
    },
    DispatchItemHandedOut {
        dispatch_id: DispatchId,
        dispatch_item_id: DispatchItemId,
        inventory_item_id: InventoryItemId,
        quantity: i64,
    },
    DispatchLinesReturned {
        dispatch_id: DispatchId,
        dispatch_item_ids: Vec<DispatchItemId>,
    },
}

impl OperationsEvent {
    /// Views invalidated by this change.
    pub fn topics(&self) -> &'static [ViewTopic] {
        use ViewTopic as T;
        match self {
            OperationsEvent::RequisitionCreated { .. }
            | OperationsEvent::RequisitionSubmitted { .. } => &[T::Requisitions],
            OperationsEvent::PurchaseOrderCreated { .. } => &[T::Requisitions, T::PurchaseOrders],
            OperationsEvent::PurchaseOrderApproved { .. }
            | OperationsEvent::PurchaseOrderRejected { .. }
            | OperationsEvent::PurchaseOrderPlaced { .. } => &[T::PurchaseOrders],
            OperationsEvent::GoodsReceived { .. } => &[T::PurchaseOrders, T::Grns],
            OperationsEvent::GrnsVerified { .. } => &[T::PurchaseOrders, T::Grns, T::Inventory],
            OperationsEvent::SitePurchaseRecorded { .. } => &[T::Inventory],
            OperationsEvent::DispatchCreated { .. } | OperationsEvent::DispatchStatusChanged { .. } => {
                &[T::Dispatches]
            }
            OperationsEvent::DispatchItemHandedOut { .. }
            | OperationsEvent::DispatchLinesReturned { .. } => &[T::Dispatches, T::Inventory],
        }
    }
}

impl Event for OperationsEvent {
    fn event_type(&self) -> &'static str {
        match self {
            OperationsEvent::RequisitionCreated { .. } => "purchasing.requisition.created",
            OperationsEvent::RequisitionSubmitted { .. } => "purchasing.requisition.submitted",
            OperationsEvent::PurchaseOrderCreated { .. } => "purchasing.order.created",
            OperationsEvent::PurchaseOrderApproved { .. } => "purchasing.order.approved",
            OperationsEvent::PurchaseOrderRejected { .. } => "purchasing.order.rejected",
            OperationsEvent::PurchaseOrderPlaced { .. } => "purchasing.order.placed",
            OperationsEvent::GoodsReceived { .. } => "purchasing.order.goods_received",
            OperationsEvent::GrnsVerified { .. } => "purchasing.grn.verified",
            OperationsEvent::SitePurchaseRecorded { .. } => "purchasing.site_purchase.recorded",
            OperationsEvent::DispatchCreated { .. } => "dispatch.created",
            OperationsEvent::DispatchStatusChanged { .. } => "dispatch.status_changed",
            OperationsEvent::DispatchItemHandedOut { .. } => "dispatch.item.handed_out",
            OperationsEvent::DispatchLinesReturned { .. } => "dispatch.lines.returned",
        }
    }

    fn version(&self) -> u32 {
        1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verification_invalidates_inventory() {
        let event = OperationsEvent::GrnsVerified {
            purchase_order_id: PurchaseOrderId::new(),
            grn_ids: vec![GrnId::new()],
            credited: vec![],
        };
        assert!(event.topics().contains(&ViewTopic::Inventory));
        assert_eq!(event.event_type(), "purchasing.grn.verified");
    }

    #[test]
    fn serializes_with_type_tag() {
        let event = OperationsEvent::PurchaseOrderPlaced {
            purchase_order_id: PurchaseOrderId::new(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "purchase_order_placed");
    }
}
