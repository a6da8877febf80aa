use std::sync::OnceLock;

use thiserror::Error;
use tracing::dispatcher;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt};

static INSTALLED: OnceLock<()> = OnceLock::new();

/// 日志安装失败的原因。
#[derive(Debug, Error)]
pub enum LoggingError {
    /// `install` 被重复调用。
    #[error("relay logging is already installed")]
    AlreadyInstalled,

    /// 外部已设置全局 Subscriber。
    #[error("a global tracing subscriber is already set")]
    SubscriberAlreadySet,

    /// 设置全局 Subscriber 失败。
    #[error("failed to set global tracing subscriber: {0}")]
    SetGlobalSubscriber(#[from] dispatcher::SetGlobalDefaultError),
}

impl LoggingError {
    /// 稳定错误码。
    pub fn code(&self) -> &'static str {
        match self {
            LoggingError::AlreadyInstalled => "relay.logging.already_installed",
            LoggingError::SubscriberAlreadySet => "relay.logging.subscriber_already_set",
            LoggingError::SetGlobalSubscriber(_) => "relay.logging.set_global",
        }
    }
}

/// 安装全局日志：`EnvFilter`（`RUST_LOG`，缺省 `info`）+ `fmt` 输出层。
///
/// # 教案式说明
/// - **意图（Why）**：数据面只通过 `tracing` 宏产出事件，宿主进程调用一次即可看到读写与过滤链日志；
/// - **逻辑（How）**：先检查本模块与外部是否已经安装，再组装 registry 并设为全局默认；
/// - **契约（What）**：重复调用返回 [`LoggingError::AlreadyInstalled`]；
///   外部已设置 Subscriber 时返回 [`LoggingError::SubscriberAlreadySet`]。
pub fn install() -> Result<(), LoggingError> {
    if INSTALLED.get().is_some() {
        return Err(LoggingError::AlreadyInstalled);
    }
    if dispatcher::has_been_set() {
        return Err(LoggingError::SubscriberAlreadySet);
    }

    let subscriber = tracing_subscriber::registry()
        .with(build_env_filter())
        .with(tracing_subscriber::fmt::layer());
    tracing::subscriber::set_global_default(subscriber)?;
    INSTALLED
        .set(())
        .map_err(|_| LoggingError::AlreadyInstalled)
}

fn build_env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}
