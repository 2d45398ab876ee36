//! Operations events and the post-commit notification hook.
//!
//! Every successful reconciliation mutation emits one [`OperationsEvent`].
//! Delivery is fire-and-forget: events are published after the transaction
//! commits, and a failed publish never undoes the mutation.

pub mod bus;
pub mod event;
pub mod in_memory_bus;
pub mod notification;

pub use bus::{EventBus, Subscription};
pub use event::{Event, OperationsEvent, ViewTopic};
pub use in_memory_bus::{InMemoryBusError, InMemoryEventBus};
pub use notification::{BusNotifier, NoopNotifier, Notification, NotificationHook};
