pub mod connection;
pub mod in_memory;
pub mod rabbitmq;
pub mod subscriptions;

pub use connection::{ConnectionEvent, RabbitMqConnection};
pub use in_memory::{DeliveryStats, InMemoryEventBus};
pub use rabbitmq::RabbitMqEventBus;
pub use subscriptions::{DeliveryDecision, SubscriptionsManager};
