//! 数据面配置：读缓冲大小与缓冲池参数。
//!
//! # 教案式说明
//! - **意图（Why）**：宿主通常从 TOML 文件加载中继参数，数据面只关心其中与缓冲相关的少量字段；
//! - **逻辑（How）**：结构体派生 `serde::Deserialize`，缺省字段回落到 [`Default`]，
//!   [`PipeConfig::from_toml_str`] 在解析后立即执行 [`PipeConfig::validate`]；
//! - **契约（What）**：未知字段视为配置错误，避免拼写错误被静默忽略。

use relay_buffer::{PoolConfig, SlabBufferPool};
use serde::Deserialize;

use crate::ConfigError;

/// 默认读缓冲大小。
pub const DEFAULT_READ_BUFFER_SIZE: usize = 8192;

/// 读缓冲大小上限，覆盖最大 UDP 报文。
pub const MAX_READ_BUFFER_SIZE: usize = 65536;

/// 读写端配置。
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct PipeConfig {
    /// 每次读取租借的缓冲大小。
    pub read_buffer_size: usize,
    /// 缓冲池参数。
    pub pool: PoolSettings,
}

/// 缓冲池参数的配置表示。
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct PoolSettings {
    /// 自由链表最多缓存的内存块数；0 表示不缓存。
    pub max_cached_blocks: usize,
}

impl Default for PipeConfig {
    fn default() -> Self {
        Self {
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
            pool: PoolSettings::default(),
        }
    }
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            max_cached_blocks: PoolConfig::default().max_cached_blocks,
        }
    }
}

impl PipeConfig {
    /// 解析并校验 TOML 文本。
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// 校验字段取值。
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=MAX_READ_BUFFER_SIZE).contains(&self.read_buffer_size) {
            return Err(ConfigError::Invalid {
                field: "read_buffer_size",
                reason: format!(
                    "{} is outside 1..={MAX_READ_BUFFER_SIZE}",
                    self.read_buffer_size
                ),
            });
        }
        Ok(())
    }

    /// 转换为缓冲池配置。
    pub fn pool_config(&self) -> PoolConfig {
        PoolConfig {
            max_cached_blocks: self.pool.max_cached_blocks,
        }
    }

    /// 按配置创建缓冲池。
    pub fn build_pool(&self) -> SlabBufferPool {
        SlabBufferPool::with_config(self.pool_config())
    }
}
