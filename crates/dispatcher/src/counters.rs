use std::sync::atomic::{AtomicU64, Ordering};

use keeper_infrastructure::MetricsCollector;

/// 某一时刻的计数器读数
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CounterSnapshot {
    pub executed: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub not_found: u64,
}

#[derive(Debug, Default)]
struct CounterSet {
    executed: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
    not_found: AtomicU64,
}

impl CounterSet {
    fn read(&self) -> CounterSnapshot {
        CounterSnapshot {
            executed: self.executed.load(Ordering::Relaxed),
            succeeded: self.succeeded.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            not_found: self.not_found.load(Ordering::Relaxed),
        }
    }

    fn take(&self) -> CounterSnapshot {
        CounterSnapshot {
            executed: self.executed.swap(0, Ordering::Relaxed),
            succeeded: self.succeeded.swap(0, Ordering::Relaxed),
            failed: self.failed.swap(0, Ordering::Relaxed),
            not_found: self.not_found.swap(0, Ordering::Relaxed),
        }
    }
}

/// 调度计数器
///
/// 累计值与时间段值分开维护：时间段值供外部周期性上报后清零。每个计数器各自原子更新，
/// 互不阻塞，同时镜像到 Prometheus 指标。
pub struct TaskCounters {
    total: CounterSet,
    time_range: CounterSet,
    registered: AtomicU64,
    metrics: MetricsCollector,
}

impl TaskCounters {
    pub fn new(metrics: MetricsCollector) -> Self {
        Self {
            total: CounterSet::default(),
            time_range: CounterSet::default(),
            registered: AtomicU64::new(0),
            metrics,
        }
    }

    pub fn record_executed(&self) {
        self.total.executed.fetch_add(1, Ordering::Relaxed);
        self.time_range.executed.fetch_add(1, Ordering::Relaxed);
        self.metrics.record_task_executed();
    }

    pub fn record_succeeded(&self) {
        self.total.succeeded.fetch_add(1, Ordering::Relaxed);
        self.time_range.succeeded.fetch_add(1, Ordering::Relaxed);
        self.metrics.record_task_succeeded();
    }

    pub fn record_failed(&self) {
        self.total.failed.fetch_add(1, Ordering::Relaxed);
        self.time_range.failed.fetch_add(1, Ordering::Relaxed);
        self.metrics.record_task_failed();
    }

    pub fn record_not_found(&self) {
        self.total.not_found.fetch_add(1, Ordering::Relaxed);
        self.time_range.not_found.fetch_add(1, Ordering::Relaxed);
        self.metrics.record_task_not_found();
    }

    pub fn task_registered(&self) {
        let count = self.registered.fetch_add(1, Ordering::Relaxed) + 1;
        self.metrics.set_tasks_registered(count);
    }

    pub fn task_unregistered(&self) {
        let previous = self
            .registered
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| {
                Some(n.saturating_sub(1))
            })
            .unwrap_or(0);
        self.metrics
            .set_tasks_registered(previous.saturating_sub(1));
    }

    pub fn reset_registered(&self) {
        self.registered.store(0, Ordering::Relaxed);
        self.metrics.set_tasks_registered(0);
    }

    pub fn registered(&self) -> u64 {
        self.registered.load(Ordering::Relaxed)
    }

    /// 累计值
    pub fn totals(&self) -> CounterSnapshot {
        self.total.read()
    }

    /// 当前时间段的值
    pub fn time_range(&self) -> CounterSnapshot {
        self.time_range.read()
    }

    /// 读取并清零当前时间段的值
    pub fn take_time_range(&self) -> CounterSnapshot {
        self.time_range.take()
    }
}

impl Default for TaskCounters {
    fn default() -> Self {
        Self::new(MetricsCollector::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_time_range_resets_independently_of_totals() {
        let counters = TaskCounters::default();
        counters.record_executed();
        counters.record_executed();
        counters.record_succeeded();
        counters.record_not_found();

        let window = counters.take_time_range();
        assert_eq!(window.executed, 2);
        assert_eq!(window.succeeded, 1);
        assert_eq!(window.not_found, 1);
        assert_eq!(counters.time_range(), CounterSnapshot::default());

        counters.record_failed();
        assert_eq!(counters.time_range().failed, 1);

        let totals = counters.totals();
        assert_eq!(totals.executed, 2);
        assert_eq!(totals.failed, 1);
    }

    #[test]
    fn test_registered_never_underflows() {
        let counters = TaskCounters::default();
        counters.task_unregistered();
        assert_eq!(counters.registered(), 0);

        counters.task_registered();
        counters.task_registered();
        counters.task_unregistered();
        assert_eq!(counters.registered(), 1);
    }
}
