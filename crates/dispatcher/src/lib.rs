//! 任务调度器
//!
//! 持有任务图，为每个根节点创建一个定时器，把定时触发与远程回复转换为消息总线上的发布。

pub mod counters;
pub mod reply_handler;
pub mod scheduler;
pub mod task_graph;

pub use counters::{CounterSnapshot, TaskCounters};
pub use reply_handler::ReplyHandler;
pub use scheduler::{DispatchOutcome, ServiceScheduler};
