//! 分布式注册表与主备选举
//!
//! 每个进程在共享存储中维护自己的服务通告，并运行三个独立的周期循环：
//!
//! - 心跳：每个心跳周期以租约时长为 TTL 写入自己的通告
//! - 选举：Active 实例刷新选举键的 TTL，Standby 实例尝试条件创建选举键
//! - 快照：每个租约周期整体重建所有对等进程的本地快照
//!
//! 关闭顺序固定为：停止循环 → 退选 → 注销。

mod election;
mod heartbeat;
mod registry;
mod snapshot;

pub use registry::ServiceRegistry;
