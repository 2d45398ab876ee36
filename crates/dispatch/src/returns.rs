//! Returns and used-out close-out of handed-out lines.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use siteops_core::{
    DispatchId, DispatchItemId, DomainError, DomainResult, InventoryItemId, ReturnId, UserId,
};

use crate::dispatch::Dispatch;
use crate::line::DispatchItem;

/// Stored record of material coming back from site.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReturnRecord {
    pub id: ReturnId,
    pub dispatch_id: DispatchId,
    pub dispatch_item_id: DispatchItemId,
    pub inventory_item_id: InventoryItemId,
    pub quantity: i64,
    pub note: Option<String>,
    pub returned_by: UserId,
    pub returned_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReturnRequest {
    pub dispatch_item_id: DispatchItemId,
    pub qty: i64,
    pub note: Option<String>,
    /// Close the line: whatever is left after this return was consumed.
    pub mark_used_out: bool,
}

impl ReturnRequest {
    pub fn returning(dispatch_item_id: DispatchItemId, qty: i64) -> Self {
        Self {
            dispatch_item_id,
            qty,
            note: None,
            mark_used_out: false,
        }
    }

    pub fn used_out(dispatch_item_id: DispatchItemId) -> Self {
        Self {
            dispatch_item_id,
            qty: 0,
            note: None,
            mark_used_out: true,
        }
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    pub fn and_mark_used_out(mut self) -> Self {
        self.mark_used_out = true;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReturnOutcome {
    pub dispatch_item_id: DispatchItemId,
    /// Present when stock came back; the caller credits inventory with it.
    pub record: Option<ReturnRecord>,
    pub returned: i64,
    pub used_out: i64,
}

/// What is still out on site and may come back or be closed as used.
///
/// `prior_returned` is the sum of stored return records for the line.
pub fn available_to_return(item: &DispatchItem, prior_returned: i64) -> i64 {
    item.handed_out_qty - prior_returned - item.used_out_qty
}

impl DispatchItem {
    fn apply_return(
        &mut self,
        request: &ReturnRequest,
        prior_returned: i64,
        actor: UserId,
        now: DateTime<Utc>,
    ) -> DomainResult<ReturnOutcome> {
        if !self.handed_out {
            return Err(DomainError::invalid_state(format!(
                "dispatch line {} has not been handed out",
                self.id
            )));
        }
        if request.qty < 0 {
            return Err(DomainError::validation("return quantity cannot be negative"));
        }
        if request.qty == 0 && !request.mark_used_out {
            return Err(DomainError::validation("return quantity must be positive"));
        }

        let available = available_to_return(self, prior_returned);
        if request.qty > available {
            return Err(DomainError::over_return(format!(
                "line {}: returning {} but only {} available",
                self.id,
                request.qty,
                available.max(0)
            )));
        }
        let leftover = available - request.qty;
        if request.mark_used_out && request.qty == 0 && leftover == 0 {
            return Err(DomainError::validation(format!(
                "line {} has nothing left to mark used",
                self.id
            )));
        }

        let record = if request.qty > 0 {
            let inventory_item_id = self.inventory_item_id.ok_or_else(|| {
                DomainError::not_linked(format!(
                    "dispatch line {} has no inventory record to return to",
                    self.id
                ))
            })?;
            Some(ReturnRecord {
                id: ReturnId::new(),
                dispatch_id: self.dispatch_id,
                dispatch_item_id: self.id,
                inventory_item_id,
                quantity: request.qty,
                note: request
                    .note
                    .as_deref()
                    .map(str::trim)
                    .filter(|n| !n.is_empty())
                    .map(str::to_string),
                returned_by: actor,
                returned_at: now,
            })
        } else {
            None
        };

        self.returned_qty = prior_returned + request.qty;
        let used_out = if request.mark_used_out { leftover } else { 0 };
        if request.mark_used_out {
            self.used_out_qty += leftover;
            self.used_out = true;
            self.used_out_at = Some(now);
            self.used_out_by = Some(actor);
        }
        self.check_invariants()?;

        Ok(ReturnOutcome {
            dispatch_item_id: self.id,
            record,
            returned: request.qty,
            used_out,
        })
    }
}

impl Dispatch {
    /// Apply a batch of returns in order.
    ///
    /// `prior_returned` maps a line to the sum of its stored return records.
    /// Several entries for one line see each other's effect. Either every
    /// entry applies or the dispatch is left unchanged.
    pub fn apply_returns(
        &mut self,
        requests: &[ReturnRequest],
        prior_returned: impl Fn(DispatchItemId) -> i64,
        actor: UserId,
        now: DateTime<Utc>,
    ) -> DomainResult<Vec<ReturnOutcome>> {
        if requests.is_empty() {
            return Err(DomainError::validation("no return lines given"));
        }

        let mut working = self.clone();
        let mut outcomes: Vec<ReturnOutcome> = Vec::with_capacity(requests.len());
        for request in requests {
            let earlier: i64 = outcomes
                .iter()
                .filter(|o| o.dispatch_item_id == request.dispatch_item_id)
                .map(|o| o.returned)
                .sum();
            let dispatch_id = working.id;
            let item = working.item_mut(request.dispatch_item_id).ok_or_else(|| {
                DomainError::not_found(format!(
                    "dispatch line {} on dispatch {dispatch_id}",
                    request.dispatch_item_id
                ))
            })?;
            let prior = prior_returned(request.dispatch_item_id) + earlier;
            outcomes.push(item.apply_return(request, prior, actor, now)?);
        }

        working.updated_at = now;
        *self = working;
        Ok(outcomes)
    }
}
