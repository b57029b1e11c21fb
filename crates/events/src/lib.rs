//! Task event bus and real-time owner notifications.
//!
//! - [`TaskEventBus`]: in-process publish/subscribe hub for task lifecycle
//!   changes, backed by `tokio::sync::broadcast`.
//! - [`ConnectionRegistry`]: live duplex connections keyed by owner.
//! - [`Notifier`]: builds task messages and fans them out to an owner.
//! - [`NotificationRelay`]: background loop wiring the bus to the notifier.

pub mod bus;
pub mod connections;
pub mod notifier;
pub mod relay;

pub use bus::{TaskEvent, TaskEventBus, TaskEventKind};
pub use connections::{ChannelSink, ConnectionRegistry, DeliveryError, MessageSink};
pub use notifier::Notifier;
pub use relay::NotificationRelay;
