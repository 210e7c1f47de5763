//! Metrics collector for the service keeper
//!
//! Handles are created once through the `metrics` macros; without an installed
//! recorder every call is a no-op.

use metrics::{counter, gauge, Counter, Gauge};
use tracing::debug;

/// Metrics collector for scheduling, registry and bus activity
#[derive(Clone)]
pub struct MetricsCollector {
    // Task dispatch metrics
    tasks_executed_total: Counter,
    tasks_succeeded_total: Counter,
    tasks_failed_total: Counter,
    tasks_not_found_total: Counter,
    tasks_registered: Gauge,

    // Registry metrics
    registry_peers: Gauge,
    registry_changes_total: Counter,
    election_active: Gauge,

    // Message bus metrics
    bus_messages_acked_total: Counter,
    bus_messages_rejected_total: Counter,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            tasks_executed_total: counter!("keeper_tasks_executed_total"),
            tasks_succeeded_total: counter!("keeper_tasks_succeeded_total"),
            tasks_failed_total: counter!("keeper_tasks_failed_total"),
            tasks_not_found_total: counter!("keeper_tasks_not_found_total"),
            tasks_registered: gauge!("keeper_tasks_registered"),
            registry_peers: gauge!("keeper_registry_peers"),
            registry_changes_total: counter!("keeper_registry_changes_total"),
            election_active: gauge!("keeper_election_active"),
            bus_messages_acked_total: counter!("keeper_bus_messages_acked_total"),
            bus_messages_rejected_total: counter!("keeper_bus_messages_rejected_total"),
        }
    }

    // Task dispatch metrics

    pub fn record_task_executed(&self) {
        self.tasks_executed_total.increment(1);
    }

    pub fn record_task_succeeded(&self) {
        self.tasks_succeeded_total.increment(1);
    }

    pub fn record_task_failed(&self) {
        self.tasks_failed_total.increment(1);
    }

    pub fn record_task_not_found(&self) {
        self.tasks_not_found_total.increment(1);
    }

    pub fn set_tasks_registered(&self, count: u64) {
        self.tasks_registered.set(count as f64);
    }

    // Registry metrics

    pub fn set_registry_peers(&self, count: usize) {
        self.registry_peers.set(count as f64);
    }

    pub fn record_registry_change(&self) {
        self.registry_changes_total.increment(1);
    }

    pub fn set_election_active(&self, active: bool) {
        self.election_active.set(if active { 1.0 } else { 0.0 });
        debug!(active = active, "Election status updated");
    }

    // Message bus metrics

    pub fn record_message_acked(&self) {
        self.bus_messages_acked_total.increment(1);
    }

    pub fn record_message_rejected(&self) {
        self.bus_messages_rejected_total.increment(1);
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}
