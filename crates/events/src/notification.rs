//! Fire-and-forget notification hook invoked after each successful commit.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use siteops_core::UserId;

use crate::bus::EventBus;
use crate::event::{Event, OperationsEvent};

/// An operations event plus delivery metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub notification_id: Uuid,
    pub actor: UserId,
    pub occurred_at: DateTime<Utc>,
    pub event: OperationsEvent,
}

impl Notification {
    pub fn new(actor: UserId, occurred_at: DateTime<Utc>, event: OperationsEvent) -> Self {
        Self {
            notification_id: Uuid::now_v7(),
            actor,
            occurred_at,
            event,
        }
    }
}

/// Post-commit side effect (cache/view invalidation).
///
/// Implementations must not block for long and must not fail the caller:
/// by the time `notify` runs the mutation is already durable.
pub trait NotificationHook: Send + Sync {
    fn notify(&self, notification: Notification);
}

impl<H> NotificationHook for std::sync::Arc<H>
where
    H: NotificationHook + ?Sized,
{
    fn notify(&self, notification: Notification) {
        (**self).notify(notification)
    }
}

/// Hook that does nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopNotifier;

impl NotificationHook for NoopNotifier {
    fn notify(&self, _notification: Notification) {}
}

/// Adapts an [`EventBus`] into a [`NotificationHook`].
///
/// Publish failures are logged and swallowed.
#[derive(Debug)]
pub struct BusNotifier<B> {
    bus: B,
}

impl<B> BusNotifier<B> {
    pub fn new(bus: B) -> Self {
        Self { bus }
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }
}

impl<B> NotificationHook for BusNotifier<B>
where
    B: EventBus<Notification>,
{
    fn notify(&self, notification: Notification) {
        let event_type = notification.event.event_type();
        let notification_id = notification.notification_id;
        if let Err(err) = self.bus.publish(notification) {
            tracing::warn!(
                event_type,
                %notification_id,
                error = ?err,
                "notification publish failed; views may refresh late"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use siteops_core::PurchaseOrderId;

    use super::*;
    use crate::in_memory_bus::InMemoryEventBus;

    fn placed() -> Notification {
        Notification::new(
            UserId::new(),
            Utc::now(),
            OperationsEvent::PurchaseOrderPlaced {
                purchase_order_id: PurchaseOrderId::new(),
            },
        )
    }

    #[test]
    fn bus_notifier_publishes() {
        let bus = Arc::new(InMemoryEventBus::<Notification>::new());
        let sub = bus.subscribe();
        let notifier = BusNotifier::new(bus.clone());

        let n = placed();
        notifier.notify(n.clone());

        assert_eq!(sub.try_recv().unwrap(), n);
    }

    #[test]
    fn publish_failure_is_swallowed() {
        let bus = Arc::new(InMemoryEventBus::<Notification>::new());
        bus.close();
        let notifier = BusNotifier::new(bus);

        // Must not panic or propagate.
        notifier.notify(placed());
    }
}
