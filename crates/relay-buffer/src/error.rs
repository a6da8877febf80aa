use thiserror::Error;

/// 池化缓冲操作的错误域。
///
/// - **意图 (Why)**：写入方越界设置有效长度会让下游读到未定义内容，必须在设置点拒绝；
/// - **契约 (What)**：`code()` 返回稳定错误码，供日志与告警聚合。
#[derive(Clone, Debug, Eq, PartialEq, Error)]
pub enum BufferError {
    /// 请求的长度或偏移超出了内存块容量。
    #[error("requested length {requested} exceeds buffer capacity {capacity}")]
    LengthOutOfRange { requested: usize, capacity: usize },
}

impl BufferError {
    /// 稳定错误码。
    pub fn code(&self) -> &'static str {
        match self {
            BufferError::LengthOutOfRange { .. } => "relay.buffer.length_out_of_range",
        }
    }
}
