//! # 数据模型
//!
//! 服务协调引擎的核心数据结构：
//!
//! - [`ServiceAdvertisement`] 进程在共享注册表中的身份与角色
//! - [`TaskEntity`] 任务图节点，以及发布给消费端的 [`TaskDetail`]
//! - [`TaskTrigger`] 触发器与纯函数式的触发判断
//! - [`ReplyEnvelope`] 消费端回复给生产端的执行结果
//! - [`Notification`] 进程内广播的日志与生命周期通知
//!
//! 所有模型都实现了 `serde` 序列化，线上格式为 JSON。

pub mod advertisement;
pub mod notification;
pub mod reply;
pub mod task;
pub mod trigger;

pub use advertisement::*;
pub use notification::*;
pub use reply::*;
pub use task::*;
pub use trigger::*;
