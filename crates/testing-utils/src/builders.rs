//! Test data builders for creating test entities
//!
//! This module provides builder patterns for creating test data with
//! sensible defaults and easy customization.

use std::time::Duration;

use keeper_core::models::{
    ServiceAdvertisement, ServiceRole, ServiceStatus, SpecificTime, TaskEntity, TaskTrigger,
    TimeInterval,
};
use uuid::Uuid;

/// Builder for creating test task graph nodes
pub struct TaskEntityBuilder {
    task: TaskEntity,
}

impl TaskEntityBuilder {
    pub fn new() -> Self {
        Self {
            task: TaskEntity::new("test_task", "test-consumer", "{}"),
        }
    }

    pub fn with_id(mut self, id: Uuid) -> Self {
        self.task.id = id;
        self
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.task.name = name.to_string();
        self
    }

    pub fn with_publish_key(mut self, publish_key: &str) -> Self {
        self.task.publish_key = publish_key.to_string();
        self
    }

    pub fn with_payload(mut self, payload: &str) -> Self {
        self.task.payload = payload.to_string();
        self
    }

    pub fn with_interval(mut self, seconds: u64) -> Self {
        self.task.trigger = Some(TaskTrigger::interval(TimeInterval::new(seconds)));
        self
    }

    pub fn with_specific_time(mut self, specific: SpecificTime) -> Self {
        self.task.trigger = Some(TaskTrigger::specific(specific));
        self
    }

    pub fn with_trigger(mut self, trigger: TaskTrigger) -> Self {
        self.task.trigger = Some(trigger);
        self
    }

    pub fn on_success(mut self, node: TaskEntity) -> Self {
        self.task.on_success = Some(Box::new(node));
        self
    }

    pub fn on_failure(mut self, node: TaskEntity) -> Self {
        self.task.on_failure = Some(Box::new(node));
        self
    }

    pub fn on_not_found(mut self, node: TaskEntity) -> Self {
        self.task.on_not_found = Some(Box::new(node));
        self
    }

    pub fn build(self) -> TaskEntity {
        self.task
    }
}

impl Default for TaskEntityBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for creating test service advertisements
pub struct AdvertisementBuilder {
    name: String,
    host: String,
    role: ServiceRole,
    status: ServiceStatus,
    lease_seconds: u64,
    heartbeat_seconds: u64,
}

impl AdvertisementBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            host: "test-host".to_string(),
            role: ServiceRole::Consumer,
            status: ServiceStatus::Standby,
            lease_seconds: 30,
            heartbeat_seconds: 10,
        }
    }

    pub fn with_host(mut self, host: &str) -> Self {
        self.host = host.to_string();
        self
    }

    pub fn with_role(mut self, role: ServiceRole) -> Self {
        self.role = role;
        self
    }

    pub fn active(mut self) -> Self {
        self.status = ServiceStatus::Active;
        self
    }

    pub fn with_timing(mut self, lease_seconds: u64, heartbeat_seconds: u64) -> Self {
        self.lease_seconds = lease_seconds;
        self.heartbeat_seconds = heartbeat_seconds;
        self
    }

    pub fn build(self) -> ServiceAdvertisement {
        let mut advertisement = ServiceAdvertisement::new(
            self.name,
            self.host,
            self.role,
            Duration::from_secs(self.lease_seconds),
            Duration::from_secs(self.heartbeat_seconds),
        )
        .expect("valid test advertisement");
        advertisement.set_status(self.status);
        advertisement
    }
}
