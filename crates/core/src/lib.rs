pub mod config;
pub mod errors;
pub mod logging;
pub mod mediator;
pub mod models;
pub mod traits;

pub use errors::*;
pub use logging::{emit_log, LogLevel};
pub use mediator::InProcessMediator;
pub use traits::{
    IntegrationEventHandler, KeyValueStore, Mediator, MessageBus, ServiceDirectory,
    TaskRequestHandler,
};
