//! Strongly-typed identifiers used across the domain.

use core::str::FromStr;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DomainError;

macro_rules! uuid_newtype {
    ($(#[$meta:meta])* $t:ident, $name:literal) => {
        $(#[$meta])*
        #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $t(Uuid);

        impl $t {
            /// Create a new identifier.
            ///
            /// Uses UUIDv7 (time-ordered), so freshly created records sort by
            /// creation time.
            pub fn new() -> Self {
                Self(Uuid::now_v7())
            }

            pub fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $t {
            fn default() -> Self {
                Self::new()
            }
        }

        impl core::fmt::Display for $t {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                core::fmt::Display::fmt(&self.0, f)
            }
        }

        impl From<Uuid> for $t {
            fn from(value: Uuid) -> Self {
                Self(value)
            }
        }

        impl From<$t> for Uuid {
            fn from(value: $t) -> Self {
                value.0
            }
        }

        impl FromStr for $t {
            type Err = DomainError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let uuid = Uuid::from_str(s)
                    .map_err(|e| DomainError::validation(format!("{}: {}", $name, e)))?;
                Ok(Self(uuid))
            }
        }
    };
}

uuid_newtype!(
    /// Identifier of a user (actor identity).
    UserId,
    "UserId"
);
uuid_newtype!(
    /// Identifier of a construction project.
    ProjectId,
    "ProjectId"
);
uuid_newtype!(RequisitionId, "RequisitionId");
uuid_newtype!(RequisitionItemId, "RequisitionItemId");
uuid_newtype!(PurchaseOrderId, "PurchaseOrderId");
uuid_newtype!(PurchaseOrderItemId, "PurchaseOrderItemId");
uuid_newtype!(
    /// Identifier of a goods received note (one delivery event).
    GrnId,
    "GrnId"
);
uuid_newtype!(GrnItemId, "GrnItemId");
uuid_newtype!(
    /// Identifier of a direct site purchase (material bought outside a PO).
    PurchaseId,
    "PurchaseId"
);
uuid_newtype!(InventoryItemId, "InventoryItemId");
uuid_newtype!(
    /// Identifier of an inventory movement (audit record).
    MovementId,
    "MovementId"
);
uuid_newtype!(DispatchId, "DispatchId");
uuid_newtype!(DispatchItemId, "DispatchItemId");
uuid_newtype!(
    /// Identifier of a return record against a dispatch line.
    ReturnId,
    "ReturnId"
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_round_trips_display() {
        let id = GrnId::new();
        let parsed: GrnId = id.to_string().parse().unwrap();
        assert_eq!(parsed, id);
    }

    #[test]
    fn parse_failure_names_the_type() {
        let err = "not-a-uuid".parse::<DispatchItemId>().unwrap_err();
        match err {
            DomainError::Validation(msg) => assert!(msg.starts_with("DispatchItemId")),
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn serializes_transparently() {
        let uuid = Uuid::now_v7();
        let id = InventoryItemId::from_uuid(uuid);
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{uuid}\""));
    }
}
