use std::net::SocketAddr;

use anyhow::{Context, Result};
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// 初始化日志系统
///
/// `RUST_LOG` 存在时优先使用，否则使用传入的级别；`format` 为 `json` 或 `pretty`。
pub fn init_logging(log_level: &str, log_format: &str) -> Result<()> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

    let registry = tracing_subscriber::registry().with(env_filter);

    match log_format {
        "json" => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_target(true),
            )
            .try_init()
            .context("初始化JSON日志失败")?,
        _ => registry
            .with(tracing_subscriber::fmt::layer().pretty().with_target(true))
            .try_init()
            .context("初始化日志失败")?,
    }

    info!(
        logging.format = log_format,
        logging.level = log_level,
        "Structured logging initialized"
    );
    Ok(())
}

/// 安装 Prometheus 指标导出器，在 `bind_address` 上提供 `/metrics`
pub fn init_metrics(bind_address: &str) -> Result<()> {
    let addr: SocketAddr = bind_address
        .parse()
        .with_context(|| format!("无效的指标监听地址: {bind_address}"))?;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .context("安装Prometheus指标导出器失败")?;

    info!("Prometheus metrics exporter listening on {}", addr);
    Ok(())
}
