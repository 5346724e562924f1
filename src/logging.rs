//! # 日志配置模块
//!
//! 初始化 tracing 日志，`RUST_LOG` 优先于传入的级别

use std::env;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// 默认过滤规则
#[must_use]
pub fn default_filter(level: Option<&str>) -> String {
    let level = level.unwrap_or("info");
    format!("{level},service_control_filter=debug,reqwest=warn,hyper=warn")
}

/// 初始化日志系统
///
/// 重复调用时保留第一次安装的订阅者。
pub fn init_logging(level: Option<&str>) {
    let log_filter = env::var("RUST_LOG").unwrap_or_else(|_| default_filter(level));

    let installed = tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| log_filter.into()))
        .with(
            fmt::layer()
                .with_target(true)
                .with_level(true)
                .with_thread_ids(false)
                .with_thread_names(false)
                .with_file(false)
                .with_line_number(false)
                .compact(),
        )
        .try_init()
        .is_ok();

    if installed {
        tracing::info!(
            component = "service_control.logging",
            "Service control logging initialized"
        );
    }
}
