//! Consumer side of the service keeper
//!
//! The [`TaskReceiver`] is subscribed on the consumer's own logical name. It
//! hands each received task to application code through the mediator and
//! replies with the outcome to the active producer.

pub mod task_receiver;

pub use task_receiver::TaskReceiver;
