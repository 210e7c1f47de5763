pub mod app_config;
pub mod message_queue;
pub mod scheduler_observability;
pub mod service;

// Re-export main types for easier imports
pub use app_config::AppConfig;
pub use message_queue::{MessageQueueConfig, MessageQueueType, RedisConfig};
pub use scheduler_observability::{ObservabilityConfig, SchedulerConfig};
pub use service::{DuplicatePolicy, ServiceConfig};
