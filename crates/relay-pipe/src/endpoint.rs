use core::{
    fmt,
    sync::atomic::{AtomicU64, Ordering},
};
use std::{borrow::Cow, io};

use async_trait::async_trait;

use crate::Cancellation;

/// 端点身份。
///
/// # 设计背景（Why）
/// - 过滤器永久绑定到一个端点，挂载与查找都只需要“是不是同一个端点”的判断；
///   使用进程内唯一的整数身份即可，无需持有端点对象本身。
///
/// # 契约说明（What）
/// - [`allocate`](Self::allocate) 在进程生命周期内从不返回重复值；
/// - 身份只承担相等性比较，数值本身没有语义。
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct EndpointId(u64);

static NEXT_ENDPOINT_ID: AtomicU64 = AtomicU64::new(1);

impl EndpointId {
    /// 分配一个新的端点身份。
    pub fn allocate() -> Self {
        Self(NEXT_ENDPOINT_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// 原始数值，仅用于日志。
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for EndpointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "endpoint#{}", self.0)
    }
}

/// 数据面消费的端点能力：身份、诊断名，以及异步读写原语。
///
/// # 契约说明（What）
/// - `read` 把数据写入 `buf` 前缀并返回字节数；`Ok(0)` 表示流结束，`Err` 表示传输错误，
///   两者在读端都被映射为 [`ReadStatus::Failed`](crate::ReadStatus::Failed)；
/// - 返回值超过 `buf.len()` 属于契约破坏，读端同样按失败处理；
/// - `cancellation` 供实现者在等待前自行检查，调用方不会在读取进行中强行打断；
/// - `write` 返回实际发送的字节数，语义与 `read` 对称。
///
/// # 并发说明
/// - 同一端点的读取由调用方串行化；读与写可以在不同任务中并发进行。
#[async_trait]
pub trait Endpoint: Send + Sync {
    /// 端点身份。
    fn id(&self) -> EndpointId;

    /// 诊断用名称，例如 `udp://127.0.0.1:5000->127.0.0.1:8388`。
    fn display(&self) -> Cow<'_, str>;

    /// 读取一段数据。
    async fn read(&self, buf: &mut [u8], cancellation: &Cancellation) -> io::Result<usize>;

    /// 发送一段数据。
    async fn write(&self, data: &[u8], cancellation: &Cancellation) -> io::Result<usize>;
}
