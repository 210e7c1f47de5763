pub mod log_level;

pub use log_level::LogLevel;

use crate::{models::Notification, traits::Mediator};

/// 记录一条日志并作为 [`Notification::Log`] 广播
///
/// `tracing` 负责本地输出，通知供外部监听者（例如日志面板）订阅。
pub fn emit_log(mediator: &dyn Mediator, level: LogLevel, message: impl Into<String>) {
    let message = message.into();
    match level {
        LogLevel::Debug => tracing::debug!("{}", message),
        LogLevel::Info => tracing::info!("{}", message),
        LogLevel::Warning => tracing::warn!("{}", message),
        LogLevel::Error | LogLevel::Fatal => tracing::error!(level = level.as_str(), "{}", message),
    }
    mediator.publish(Notification::log(level, message));
}
