pub mod key_value_store;
pub mod mediator;
pub mod message_bus;
pub mod service_directory;

pub use key_value_store::KeyValueStore;
pub use mediator::{Mediator, TaskRequestHandler};
pub use message_bus::{IntegrationEventHandler, MessageBus};
pub use service_directory::ServiceDirectory;
