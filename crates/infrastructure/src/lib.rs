pub mod message_bus;
pub mod observability;
pub mod store;

pub use message_bus::*;
pub use observability::*;
pub use store::*;
