//! # error 模块说明
//!
//! ## 角色定位（Why）
//! - 集中定义过滤链装配、过滤器执行、端点配对与配置加载的错误语义；
//! - 传输层失败不在此列：它们以 [`ReadStatus`](crate::ReadStatus) /
//!   [`WriteStatus`](crate::WriteStatus) 的形式返回，绝不以 `Err` 或 panic 穿越过滤链边界。
//!
//! ## 设计要求（What）
//! - 所有错误派生 `thiserror::Error`，消息使用英文，便于日志检索；
//! - 每个枚举提供 `code()`，返回 `relay.<领域>.<原因>` 形式的稳定错误码。

use relay_buffer::BufferError;
use thiserror::Error;

use crate::{EndpointId, FilterStage};

/// 过滤器在单次调用中报告的失败。
///
/// - **意图 (Why)**：过滤器遇到无法处理的输入时需要区别于“主动截断”（`proceed = false`）；
///   前者是故障，会以 [`ReadStatus::FilterFault`](crate::ReadStatus::FilterFault) 暴露给调用方。
/// - **契约 (What)**：返回 `Err` 时过滤器不得持有任何新租借的缓冲（直接丢弃将被计为泄漏）。
#[derive(Clone, Debug, Eq, PartialEq, Error)]
pub enum FilterError {
    /// 输入帧结构不合法。
    #[error("filter `{filter}` rejected malformed input during {stage}: {detail}")]
    Malformed {
        filter: &'static str,
        stage: FilterStage,
        detail: String,
    },

    /// 写入输出缓冲失败。
    #[error("filter output buffer error: {0}")]
    Buffer(#[from] BufferError),

    /// 过滤器内部异常，包括被捕获的 panic。
    #[error("filter internal failure: {detail}")]
    Internal { detail: String },
}

impl FilterError {
    /// 稳定错误码。
    pub fn code(&self) -> &'static str {
        match self {
            FilterError::Malformed { .. } => "relay.filter.malformed",
            FilterError::Buffer(_) => "relay.filter.buffer",
            FilterError::Internal { .. } => "relay.filter.internal",
        }
    }
}

/// 过滤器挂载被拒绝的原因。
#[derive(Clone, Debug, Eq, PartialEq, Error)]
pub enum AttachError {
    /// 过滤器绑定的端点与链所属端点不一致。
    #[error("filter `{filter}` is bound to endpoint {actual}, chain belongs to {expected}")]
    ForeignEndpoint {
        filter: &'static str,
        expected: EndpointId,
        actual: EndpointId,
    },

    /// 同一过滤器实例（按引用判定）已在链中。
    #[error("filter `{filter}` is already attached")]
    Duplicate { filter: &'static str },
}

impl AttachError {
    /// 稳定错误码。
    pub fn code(&self) -> &'static str {
        match self {
            AttachError::ForeignEndpoint { .. } => "relay.chain.foreign_endpoint",
            AttachError::Duplicate { .. } => "relay.chain.duplicate",
        }
    }
}

/// 读写端配对的错误。
#[derive(Clone, Debug, Eq, PartialEq, Error)]
pub enum PairError {
    /// 两侧绑定了同一个端点。
    #[error("both sides of the pair are bound to endpoint {0}")]
    SameEndpoint(EndpointId),

    /// 查询的端点不属于任何一侧。
    #[error("endpoint {0} does not belong to this pair")]
    UnknownEndpoint(EndpointId),

    /// 命中的一侧尚未装配。
    #[error("pair side {0} is vacant")]
    Vacant(&'static str),
}

impl PairError {
    /// 稳定错误码。
    pub fn code(&self) -> &'static str {
        match self {
            PairError::SameEndpoint(_) => "relay.pair.same_endpoint",
            PairError::UnknownEndpoint(_) => "relay.pair.unknown_endpoint",
            PairError::Vacant(_) => "relay.pair.vacant",
        }
    }
}

/// 配置加载与校验错误。
#[derive(Clone, Debug, Eq, PartialEq, Error)]
pub enum ConfigError {
    /// TOML 文本无法解析。
    #[error("failed to parse pipe configuration: {0}")]
    Parse(String),

    /// 字段取值越界。
    #[error("invalid pipe configuration `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },
}

impl ConfigError {
    /// 稳定错误码。
    pub fn code(&self) -> &'static str {
        match self {
            ConfigError::Parse(_) => "relay.config.parse",
            ConfigError::Invalid { .. } => "relay.config.invalid",
        }
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(error: toml::de::Error) -> Self {
        ConfigError::Parse(error.to_string())
    }
}
