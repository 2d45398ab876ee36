use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use siteops_core::{DomainError, DomainResult, Entity, MinorUnits, ProjectId, PurchaseId, UserId};

/// Material bought directly for a project, outside the PO/GRN flow.
///
/// Dispatch lines can point at one; handout then seeds an inventory record
/// from it the first time no existing record matches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SitePurchase {
    pub id: PurchaseId,
    pub project_id: ProjectId,
    pub description: String,
    pub unit: String,
    pub quantity: i64,
    pub unit_price: MinorUnits,
    pub total: MinorUnits,
    pub purchased_by: UserId,
    pub purchased_at: DateTime<Utc>,
}

impl SitePurchase {
    pub fn record(
        project_id: ProjectId,
        description: impl Into<String>,
        unit: impl Into<String>,
        quantity: i64,
        unit_price: MinorUnits,
        purchased_by: UserId,
        now: DateTime<Utc>,
    ) -> DomainResult<Self> {
        let description = description.into();
        let unit = unit.into();
        if description.trim().is_empty() {
            return Err(DomainError::validation("purchase needs a description"));
        }
        if unit.trim().is_empty() {
            return Err(DomainError::validation("purchase needs a unit"));
        }
        if quantity <= 0 {
            return Err(DomainError::validation("purchased quantity must be positive"));
        }
        if unit_price.is_negative() {
            return Err(DomainError::validation("unit price cannot be negative"));
        }
        Ok(Self {
            id: PurchaseId::new(),
            project_id,
            description: description.trim().to_string(),
            unit: unit.trim().to_string(),
            quantity,
            unit_price,
            total: MinorUnits::line_total(unit_price, quantity)?,
            purchased_by,
            purchased_at: now,
        })
    }
}

impl Entity for SitePurchase {
    type Id = PurchaseId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_computes_total() {
        let p = SitePurchase::record(
            ProjectId::new(),
            " River sand ",
            "m3",
            12,
            MinorUnits::new(2_500),
            UserId::new(),
            Utc::now(),
        )
        .unwrap();
        assert_eq!(p.description, "River sand");
        assert_eq!(p.total, MinorUnits::new(30_000));
    }

    #[test]
    fn record_rejects_non_positive_quantity() {
        let err = SitePurchase::record(
            ProjectId::new(),
            "Sand",
            "m3",
            0,
            MinorUnits::ZERO,
            UserId::new(),
            Utc::now(),
        )
        .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }
}
