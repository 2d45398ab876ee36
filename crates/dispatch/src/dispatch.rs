use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use siteops_core::{
    find_by_id, DispatchId, DispatchItemId, DomainError, DomainResult, Entity, InventoryItemId,
    ProjectId, UserId,
};

use crate::handout::{HandoutChange, LineArena};
use crate::line::{DispatchItem, DispatchLine};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DispatchStatus {
    Draft,
    Submitted,
    Approved,
    Dispatched,
    InTransit,
    Delivered,
}

impl DispatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DispatchStatus::Draft => "DRAFT",
            DispatchStatus::Submitted => "SUBMITTED",
            DispatchStatus::Approved => "APPROVED",
            DispatchStatus::Dispatched => "DISPATCHED",
            DispatchStatus::InTransit => "IN_TRANSIT",
            DispatchStatus::Delivered => "DELIVERED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "DRAFT" => DispatchStatus::Draft,
            "SUBMITTED" => DispatchStatus::Submitted,
            "APPROVED" => DispatchStatus::Approved,
            "DISPATCHED" => DispatchStatus::Dispatched,
            "IN_TRANSIT" => DispatchStatus::InTransit,
            "DELIVERED" => DispatchStatus::Delivered,
            _ => return None,
        })
    }

    /// Security may hand lines out in this status.
    pub fn allows_handout(&self) -> bool {
        matches!(
            self,
            DispatchStatus::Submitted
                | DispatchStatus::Approved
                | DispatchStatus::InTransit
                | DispatchStatus::Dispatched
        )
    }
}

impl core::fmt::Display for DispatchStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of one handout on a dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandoutResult {
    pub change: HandoutChange,
    pub status: DispatchStatus,
}

/// A movement of materials from the store to a project site.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dispatch {
    pub id: DispatchId,
    pub project_id: ProjectId,
    pub status: DispatchStatus,
    pub items: Vec<DispatchItem>,
    pub created_by: UserId,
    pub created_at: DateTime<Utc>,
    pub approved_by: Option<UserId>,
    pub approved_at: Option<DateTime<Utc>>,
    pub dispatched_at: Option<DateTime<Utc>>,
    pub driver_id: Option<UserId>,
    pub in_transit_at: Option<DateTime<Utc>>,
    pub received_by: Option<UserId>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl Dispatch {
    pub fn create(
        project_id: ProjectId,
        lines: Vec<DispatchLine>,
        created_by: UserId,
        now: DateTime<Utc>,
    ) -> DomainResult<Self> {
        if lines.is_empty() {
            return Err(DomainError::validation("dispatch needs at least one line"));
        }
        let id = DispatchId::new();
        let items = lines
            .into_iter()
            .map(|l| DispatchItem::from_line(id, l))
            .collect::<DomainResult<Vec<_>>>()?;
        Ok(Self {
            id,
            project_id,
            status: DispatchStatus::Draft,
            items,
            created_by,
            created_at: now,
            approved_by: None,
            approved_at: None,
            dispatched_at: None,
            driver_id: None,
            in_transit_at: None,
            received_by: None,
            delivered_at: None,
            updated_at: now,
        })
    }

    pub fn item(&self, id: DispatchItemId) -> Option<&DispatchItem> {
        find_by_id(&self.items, &id)
    }

    pub(crate) fn item_mut(&mut self, id: DispatchItemId) -> Option<&mut DispatchItem> {
        self.items.iter_mut().find(|i| i.id == id)
    }

    fn transition(
        &mut self,
        from: &[DispatchStatus],
        to: DispatchStatus,
        now: DateTime<Utc>,
    ) -> DomainResult<()> {
        if !from.contains(&self.status) {
            return Err(DomainError::invalid_state(format!(
                "dispatch {} is {}, cannot move to {to}",
                self.id, self.status
            )));
        }
        self.status = to;
        self.updated_at = now;
        Ok(())
    }

    pub fn submit(&mut self, now: DateTime<Utc>) -> DomainResult<()> {
        self.transition(&[DispatchStatus::Draft], DispatchStatus::Submitted, now)
    }

    pub fn approve(&mut self, by: UserId, now: DateTime<Utc>) -> DomainResult<()> {
        self.transition(&[DispatchStatus::Submitted], DispatchStatus::Approved, now)?;
        self.approved_by = Some(by);
        self.approved_at = Some(now);
        Ok(())
    }

    pub fn start_transit(&mut self, driver: UserId, now: DateTime<Utc>) -> DomainResult<()> {
        self.transition(&[DispatchStatus::Dispatched], DispatchStatus::InTransit, now)?;
        self.driver_id = Some(driver);
        self.in_transit_at = Some(now);
        Ok(())
    }

    /// Driver confirms arrival on site; handed-out lines are stamped received.
    pub fn acknowledge_delivery(&mut self, driver: UserId, now: DateTime<Utc>) -> DomainResult<()> {
        self.transition(
            &[DispatchStatus::Dispatched, DispatchStatus::InTransit],
            DispatchStatus::Delivered,
            now,
        )?;
        self.received_by = Some(driver);
        self.delivered_at = Some(now);
        for item in self.items.iter_mut().filter(|i| i.handed_out) {
            item.received_by = Some(driver);
            item.received_at = Some(now);
        }
        Ok(())
    }

    /// Check a handout against the dispatch before any stock is touched.
    pub fn check_handout(&self, item_id: DispatchItemId, qty: i64) -> DomainResult<&DispatchItem> {
        if !self.status.allows_handout() {
            return Err(DomainError::invalid_state(format!(
                "dispatch {} is {}, items cannot be handed out",
                self.id, self.status
            )));
        }
        let item = self
            .item(item_id)
            .ok_or_else(|| DomainError::not_found(format!("dispatch line {item_id}")))?;
        if item.handed_out {
            return Err(DomainError::invalid_state(format!(
                "dispatch line {item_id} is already handed out"
            )));
        }
        if qty <= 0 || qty > item.qty {
            return Err(DomainError::validation(format!(
                "handout quantity must be between 1 and {}",
                item.qty
            )));
        }
        Ok(item)
    }

    /// Apply the split/merge for a handout already debited from stock, then
    /// promote to DISPATCHED once every line is fully handed out.
    pub fn hand_out(
        &mut self,
        item_id: DispatchItemId,
        qty: i64,
        inventory_item_id: InventoryItemId,
        actor: UserId,
        now: DateTime<Utc>,
    ) -> DomainResult<HandoutResult> {
        self.check_handout(item_id, qty)?;

        let mut arena = LineArena::new(std::mem::take(&mut self.items));
        let outcome = arena.hand_out(item_id, qty, inventory_item_id, actor, now);
        self.items = arena.into_lines();
        let change = outcome?;

        if matches!(
            self.status,
            DispatchStatus::Submitted | DispatchStatus::Approved
        ) && self.items.iter().all(DispatchItem::is_fully_handed)
        {
            self.status = DispatchStatus::Dispatched;
            self.dispatched_at = Some(now);
        }
        self.updated_at = now;

        Ok(HandoutResult {
            change,
            status: self.status,
        })
    }

    /// Σ qty across lines; split and merge never change it.
    pub fn total_qty(&self) -> i64 {
        self.items.iter().map(|i| i.qty).sum()
    }
}

impl Entity for Dispatch {
    type Id = DispatchId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handout::HandoutKind;

    fn submitted(quantities: &[i64]) -> Dispatch {
        let lines = quantities
            .iter()
            .map(|&q| DispatchLine::new("Rebar 12mm", "kg", q))
            .collect();
        let mut d = Dispatch::create(ProjectId::new(), lines, UserId::new(), Utc::now()).unwrap();
        d.submit(Utc::now()).unwrap();
        d
    }

    #[test]
    fn draft_cannot_hand_out() {
        let d = Dispatch::create(
            ProjectId::new(),
            vec![DispatchLine::new("Sand", "m3", 2)],
            UserId::new(),
            Utc::now(),
        )
        .unwrap();
        let err = d.check_handout(d.items[0].id, 1).unwrap_err();
        assert!(matches!(err, DomainError::InvalidState(_)));
    }

    #[test]
    fn full_handout_promotes_to_dispatched() {
        let mut d = submitted(&[10]);
        let line = d.items[0].id;
        let stock = InventoryItemId::new();

        let r = d.hand_out(line, 3, stock, UserId::new(), Utc::now()).unwrap();
        assert_eq!(r.status, DispatchStatus::Submitted);
        let HandoutKind::Split { remainder } = r.change.kind else {
            panic!("expected split");
        };

        let r = d.hand_out(remainder, 7, stock, UserId::new(), Utc::now()).unwrap();
        assert_eq!(r.status, DispatchStatus::Dispatched);
        assert_eq!(d.items.len(), 1);
        assert_eq!(d.total_qty(), 10);
    }

    #[test]
    fn lifecycle_through_delivery() {
        let mut d = submitted(&[4]);
        d.approve(UserId::new(), Utc::now()).unwrap();
        d.hand_out(d.items[0].id, 4, InventoryItemId::new(), UserId::new(), Utc::now())
            .unwrap();
        assert_eq!(d.status, DispatchStatus::Dispatched);

        let driver = UserId::new();
        d.start_transit(driver, Utc::now()).unwrap();
        d.acknowledge_delivery(driver, Utc::now()).unwrap();
        assert_eq!(d.status, DispatchStatus::Delivered);
        assert_eq!(d.items[0].received_by, Some(driver));
        assert!(matches!(
            d.start_transit(driver, Utc::now()),
            Err(DomainError::InvalidState(_))
        ));
    }

    #[test]
    fn in_transit_handout_keeps_status() {
        let mut d = submitted(&[4, 2]);
        d.hand_out(d.items[0].id, 4, InventoryItemId::new(), UserId::new(), Utc::now())
            .unwrap();
        d.status = DispatchStatus::InTransit;
        let remaining = d.items.iter().find(|i| !i.handed_out).unwrap().id;
        let r = d
            .hand_out(remaining, 2, InventoryItemId::new(), UserId::new(), Utc::now())
            .unwrap();
        assert_eq!(r.status, DispatchStatus::InTransit);
    }

    #[test]
    fn failed_handout_leaves_lines_intact() {
        let mut d = submitted(&[5]);
        let before = d.items.clone();
        assert!(d
            .hand_out(d.items[0].id, 9, InventoryItemId::new(), UserId::new(), Utc::now())
            .is_err());
        assert_eq!(d.items, before);
    }

    #[test]
    fn status_strings_round_trip() {
        for s in [
            DispatchStatus::Draft,
            DispatchStatus::Submitted,
            DispatchStatus::Approved,
            DispatchStatus::Dispatched,
            DispatchStatus::InTransit,
            DispatchStatus::Delivered,
        ] {
            assert_eq!(DispatchStatus::parse(s.as_str()), Some(s));
        }
    }
}
