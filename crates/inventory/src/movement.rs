use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use siteops_core::{DispatchItemId, GrnId, InventoryItemId, MovementId, ReturnId, UserId};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MovementKind {
    /// Accepted quantity from a verified GRN.
    GrnReceipt,
    /// Released to site by security.
    Handout,
    /// Returned from site.
    Return,
}

impl MovementKind {
    /// +1 for stock coming in, -1 for stock going out.
    pub fn sign(&self) -> i64 {
        match self {
            MovementKind::GrnReceipt | MovementKind::Return => 1,
            MovementKind::Handout => -1,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MovementKind::GrnReceipt => "GRN_RECEIPT",
            MovementKind::Handout => "HANDOUT",
            MovementKind::Return => "RETURN",
        }
    }
}

/// What caused a movement.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum MovementReference {
    Grn(GrnId),
    DispatchItem(DispatchItemId),
    Return(ReturnId),
}

/// Audit record of a quantity change, written best-effort after commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryMovement {
    pub id: MovementId,
    pub inventory_item_id: InventoryItemId,
    pub kind: MovementKind,
    /// Always positive; direction comes from `kind`.
    pub quantity: i64,
    pub reference: MovementReference,
    pub actor: UserId,
    pub occurred_at: DateTime<Utc>,
}

impl InventoryMovement {
    pub fn new(
        inventory_item_id: InventoryItemId,
        kind: MovementKind,
        quantity: i64,
        reference: MovementReference,
        actor: UserId,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: MovementId::new(),
            inventory_item_id,
            kind,
            quantity,
            reference,
            actor,
            occurred_at,
        }
    }

    pub fn signed_quantity(&self) -> i64 {
        self.kind.sign() * self.quantity
    }
}
