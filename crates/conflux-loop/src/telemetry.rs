//! `tracing` 订阅器安装入口。
//!
//! - 组装 `EnvFilter + fmt` 两层并设置为全局默认订阅器；`RUST_LOG` 未设置时过滤级别为 `info`；
//! - 全局订阅器只能设置一次：若外部已安装，返回 [`TelemetryError::SubscriberAlreadySet`] 而不是覆盖。

use thiserror::Error;
use tracing::dispatcher;
use tracing::subscriber::SetGlobalDefaultError;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;

/// 安装失败原因。
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// 进程内已存在全局订阅器。
    #[error("a global tracing subscriber is already installed")]
    SubscriberAlreadySet,
    /// 设置全局订阅器失败。
    #[error("failed to install the global tracing subscriber")]
    SetGlobalSubscriber(#[from] SetGlobalDefaultError),
}

/// 安装全局订阅器。
pub fn install() -> Result<(), TelemetryError> {
    if dispatcher::has_been_set() {
        return Err(TelemetryError::SubscriberAlreadySet);
    }
    let subscriber = tracing_subscriber::registry()
        .with(build_env_filter())
        .with(tracing_subscriber::fmt::layer());
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

fn build_env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}
