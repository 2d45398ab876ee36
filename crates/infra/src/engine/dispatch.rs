//! Dispatch lifecycle outside of handout and returns.

use chrono::{DateTime, Utc};
use tracing::instrument;

use siteops_auth::Permission;
use siteops_core::{DispatchId, DomainResult, ProjectId, UserId};
use siteops_dispatch::{Dispatch, DispatchLine, DispatchStatus};
use siteops_events::OperationsEvent;

use super::{not_found, EngineResult, ReconciliationEngine};
use crate::store::{AuditLog, DispatchRepository, Store, Transaction};

impl<S> ReconciliationEngine<S>
where
    S: Store + AuditLog,
{
    /// New DRAFT dispatch for a project.
    #[instrument(skip(self, lines), fields(actor = %actor, project_id = %project_id, lines = lines.len()), err)]
    pub async fn create_dispatch(
        &self,
        actor: UserId,
        project_id: ProjectId,
        lines: Vec<DispatchLine>,
    ) -> EngineResult<Dispatch> {
        self.authorize(actor, &Permission::DISPATCH_CREATE)?;
        let now = Utc::now();
        let dispatch = Dispatch::create(project_id, lines, actor, now)?;

        self.within_budget("create_dispatch", async {
            let mut tx = self.store.begin().await?;
            tx.insert_dispatch(&dispatch).await?;
            tx.commit().await?;
            Ok(())
        })
        .await?;

        self.notify(
            actor,
            now,
            OperationsEvent::DispatchCreated {
                dispatch_id: dispatch.id,
            },
        );
        Ok(dispatch)
    }

    /// DRAFT → SUBMITTED.
    pub async fn submit_dispatch(
        &self,
        actor: UserId,
        dispatch_id: DispatchId,
    ) -> EngineResult<DispatchStatus> {
        self.transition_dispatch(
            actor,
            dispatch_id,
            &Permission::DISPATCH_SUBMIT,
            "submit_dispatch",
            |d, _, now| d.submit(now),
        )
        .await
    }

    /// SUBMITTED → APPROVED.
    pub async fn approve_dispatch(
        &self,
        actor: UserId,
        dispatch_id: DispatchId,
    ) -> EngineResult<DispatchStatus> {
        self.transition_dispatch(
            actor,
            dispatch_id,
            &Permission::DISPATCH_APPROVE,
            "approve_dispatch",
            |d, by, now| d.approve(by, now),
        )
        .await
    }

    /// DISPATCHED → IN_TRANSIT; the acting driver is recorded.
    pub async fn start_transit(
        &self,
        actor: UserId,
        dispatch_id: DispatchId,
    ) -> EngineResult<DispatchStatus> {
        self.transition_dispatch(
            actor,
            dispatch_id,
            &Permission::DISPATCH_TRANSIT,
            "start_transit",
            |d, driver, now| d.start_transit(driver, now),
        )
        .await
    }

    /// DISPATCHED/IN_TRANSIT → DELIVERED; handed-out lines are stamped received.
    pub async fn acknowledge_delivery(
        &self,
        actor: UserId,
        dispatch_id: DispatchId,
    ) -> EngineResult<DispatchStatus> {
        self.transition_dispatch(
            actor,
            dispatch_id,
            &Permission::DISPATCH_ACKNOWLEDGE,
            "acknowledge_delivery",
            |d, driver, now| d.acknowledge_delivery(driver, now),
        )
        .await
    }

    #[instrument(skip(self, permission, change), fields(actor = %actor), err)]
    async fn transition_dispatch<F>(
        &self,
        actor: UserId,
        dispatch_id: DispatchId,
        permission: &Permission,
        operation: &'static str,
        change: F,
    ) -> EngineResult<DispatchStatus>
    where
        F: FnOnce(&mut Dispatch, UserId, DateTime<Utc>) -> DomainResult<()> + Send,
    {
        self.authorize(actor, permission)?;
        let now = Utc::now();

        let status = self
            .within_budget(operation, async {
                let mut tx = self.store.begin().await?;
                let mut dispatch = tx
                    .dispatch_for_update(dispatch_id)
                    .await?
                    .ok_or_else(|| not_found(format!("dispatch {dispatch_id}")))?;
                change(&mut dispatch, actor, now)?;
                tx.update_dispatch(&dispatch).await?;
                tx.upsert_dispatch_items(&dispatch.items).await?;
                tx.commit().await?;
                Ok(dispatch.status)
            })
            .await?;

        tracing::info!(dispatch_id = %dispatch_id, status = status.as_str(), operation, "dispatch status changed");
        self.notify(actor, now, OperationsEvent::DispatchStatusChanged { dispatch_id });
        Ok(status)
    }
}
