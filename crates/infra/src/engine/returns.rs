//! Returns and used-out close-out.

use std::collections::HashMap;

use chrono::Utc;
use tracing::instrument;

use siteops_auth::Permission;
use siteops_core::{DispatchId, DispatchItemId, DomainError, UserId};
use siteops_dispatch::{ReturnOutcome, ReturnRequest};
use siteops_events::OperationsEvent;
use siteops_inventory::{InventoryMovement, MovementKind, MovementReference};

use super::{not_found, EngineResult, ReconciliationEngine};
use crate::store::{AuditLog, DispatchRepository, InventoryLedger, ReturnRepository, Store, Transaction};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReturnSummary {
    pub returned: i64,
    pub used_out: i64,
}

impl<S> ReconciliationEngine<S>
where
    S: Store + AuditLog,
{
    /// Return `qty` of a handed-out line and/or close it as used on site.
    pub async fn return_dispatch_line(
        &self,
        actor: UserId,
        dispatch_item_id: DispatchItemId,
        qty: i64,
        note: Option<String>,
        mark_used_out: bool,
    ) -> EngineResult<ReturnSummary> {
        let request = ReturnRequest {
            dispatch_item_id,
            qty,
            note,
            mark_used_out,
        };
        let outcomes = self.return_dispatch_lines(actor, vec![request]).await?;
        let outcome = outcomes
            .into_iter()
            .next()
            .ok_or_else(|| DomainError::invariant("return produced no outcome"))?;
        Ok(ReturnSummary {
            returned: outcome.returned,
            used_out: outcome.used_out,
        })
    }

    /// Batch form: every entry applies in one transaction or none does.
    /// Outcomes come back in request order.
    #[instrument(skip(self, requests), fields(actor = %actor, entries = requests.len()), err)]
    pub async fn return_dispatch_lines(
        &self,
        actor: UserId,
        requests: Vec<ReturnRequest>,
    ) -> EngineResult<Vec<ReturnOutcome>> {
        self.authorize(actor, &Permission::DISPATCH_RETURN)?;
        if requests.is_empty() {
            return Err(DomainError::validation("no return lines given").into());
        }
        let now = Utc::now();

        let (outcomes, touched, movements) = self
            .within_budget("return_dispatch_lines", async {
                let mut tx = self.store.begin().await?;

                // Group entries by dispatch, remembering each entry's position.
                let mut groups: Vec<(DispatchId, Vec<usize>)> = Vec::new();
                for (pos, request) in requests.iter().enumerate() {
                    let dispatch_id = tx
                        .dispatch_of_item(request.dispatch_item_id)
                        .await?
                        .ok_or_else(|| {
                            not_found(format!("dispatch line {}", request.dispatch_item_id))
                        })?;
                    match groups.iter_mut().find(|(id, _)| *id == dispatch_id) {
                        Some((_, positions)) => positions.push(pos),
                        None => groups.push((dispatch_id, vec![pos])),
                    }
                }

                let mut slots: Vec<Option<ReturnOutcome>> = vec![None; requests.len()];
                let mut movements = Vec::new();
                let mut touched = Vec::with_capacity(groups.len());

                for (dispatch_id, positions) in groups {
                    let mut dispatch = tx
                        .dispatch_for_update(dispatch_id)
                        .await?
                        .ok_or_else(|| not_found(format!("dispatch {dispatch_id}")))?;

                    let batch: Vec<ReturnRequest> =
                        positions.iter().map(|&p| requests[p].clone()).collect();
                    let mut prior: HashMap<DispatchItemId, i64> = HashMap::new();
                    for request in &batch {
                        if !prior.contains_key(&request.dispatch_item_id) {
                            let total = tx.returned_total(request.dispatch_item_id).await?;
                            prior.insert(request.dispatch_item_id, total);
                        }
                    }

                    let outcomes = dispatch.apply_returns(
                        &batch,
                        |id| prior.get(&id).copied().unwrap_or(0),
                        actor,
                        now,
                    )?;

                    for outcome in &outcomes {
                        if let Some(record) = &outcome.record {
                            tx.insert_return(record).await?;
                            tx.increment(record.inventory_item_id, record.quantity)
                                .await?;
                            movements.push(InventoryMovement::new(
                                record.inventory_item_id,
                                MovementKind::Return,
                                record.quantity,
                                MovementReference::Return(record.id),
                                actor,
                                now,
                            ));
                        }
                    }

                    let changed: Vec<_> = dispatch
                        .items
                        .iter()
                        .filter(|i| prior.contains_key(&i.id))
                        .cloned()
                        .collect();
                    tx.upsert_dispatch_items(&changed).await?;
                    tx.update_dispatch(&dispatch).await?;
                    touched.push((dispatch_id, changed.iter().map(|i| i.id).collect::<Vec<_>>()));
                    for (pos, outcome) in positions.into_iter().zip(outcomes) {
                        slots[pos] = Some(outcome);
                    }
                }

                tx.commit().await?;
                Ok((slots.into_iter().flatten().collect::<Vec<_>>(), touched, movements))
            })
            .await?;

        tracing::info!(
            entries = outcomes.len(),
            returned = outcomes.iter().map(|o| o.returned).sum::<i64>(),
            used_out = outcomes.iter().map(|o| o.used_out).sum::<i64>(),
            "dispatch returns recorded"
        );
        self.audit(&movements).await;
        for (dispatch_id, dispatch_item_ids) in touched {
            self.notify(
                actor,
                now,
                OperationsEvent::DispatchLinesReturned {
                    dispatch_id,
                    dispatch_item_ids,
                },
            );
        }
        Ok(outcomes)
    }
}
