//! 过滤器契约：上下文、结果与两阶段变换。
//!
//! # 教案式说明
//! - **意图（Why）**：读端与写端之间的所有变换（解密、重新分帧、封装）都以过滤器表达，
//!   过滤器只关心“给定一段只读字节，产出一块新缓冲或终止链路”；
//! - **逻辑（How）**：[`Filter`] 是对象安全 trait，链路以 `Arc<dyn Filter>` 的同构序列逐步动态分派；
//!   排序数据（[`FilterOrder`]）作为普通字段暴露，由链路在外部比较，过滤器自身不实现比较器；
//! - **契约（What）**：过滤器不得保留 [`FilterContext::data`] 的引用（借用在调用结束时失效），
//!   需要输出新数据时必须从 [`FilterContext::pool`] 租借新缓冲。

mod chain;

pub use chain::{ChainOutcome, FilterChain};

use core::fmt;

use relay_buffer::{PooledBuffer, SlabBufferPool};

use crate::{EndpointId, FilterError};

/// 过滤器的粗粒度分组，声明顺序即执行顺序。
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum FilterCategory {
    /// 协议封装/拆封，例如 SOCKS5 UDP 头的增删。
    Encapsulation,
    /// 业务自定义过滤器。
    Custom,
}

/// 过滤器排序数据：先比较分类，再比较优先级（数值小者先执行）。
///
/// 链路会在此之上追加挂载序号，构成 `(category, priority, sequence)` 全序键，
/// 因此排序数据完全相同的两个过滤器按挂载先后执行。
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct FilterOrder {
    pub category: FilterCategory,
    pub priority: i32,
}

impl FilterOrder {
    /// 构造排序数据。
    pub const fn new(category: FilterCategory, priority: i32) -> Self {
        Self { category, priority }
    }
}

/// 过滤器运行的两个对称阶段。
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum FilterStage {
    /// 数据从传输层到达之后。
    AfterReceive,
    /// 数据交给传输层之前。
    BeforeSend,
}

impl fmt::Display for FilterStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterStage::AfterReceive => f.write_str("after-receive"),
            FilterStage::BeforeSend => f.write_str("before-send"),
        }
    }
}

/// 单次过滤器调用的输入。
///
/// - `endpoint`：数据所属端点，恒等于过滤器绑定的端点；
/// - `data`：当前缓冲有效前缀的只读视图，调用结束后即被链路归还；
/// - `pool`：读写端使用的缓冲池，过滤器的输出缓冲应从这里租借。
#[derive(Clone, Copy)]
pub struct FilterContext<'a> {
    pub endpoint: EndpointId,
    pub data: &'a [u8],
    pub pool: &'a SlabBufferPool,
}

impl<'a> FilterContext<'a> {
    /// 构造上下文。
    pub fn new(endpoint: EndpointId, data: &'a [u8], pool: &'a SlabBufferPool) -> Self {
        Self {
            endpoint,
            data,
            pool,
        }
    }
}

impl fmt::Debug for FilterContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilterContext")
            .field("endpoint", &self.endpoint)
            .field("len", &self.data.len())
            .finish()
    }
}

/// 单次过滤器调用（或整条链）的输出。
///
/// # 契约说明（What）
/// - `buffer` 的所有权随结果一起交给链路；`None` 表示没有后续有效数据；
/// - `proceed == false` 表示“到此为止”，链路不再调用后续过滤器，读端返回
///   [`ReadStatus::BrokenByFilter`](crate::ReadStatus::BrokenByFilter) 并归还 `buffer`。
#[derive(Debug)]
pub struct FilterResult {
    pub endpoint: EndpointId,
    pub buffer: Option<PooledBuffer>,
    pub proceed: bool,
}

impl FilterResult {
    /// 产出新缓冲并继续执行后续过滤器。
    pub fn next(endpoint: EndpointId, buffer: PooledBuffer) -> Self {
        Self {
            endpoint,
            buffer: Some(buffer),
            proceed: true,
        }
    }

    /// 截断链路，不产出数据。
    pub fn halt(endpoint: EndpointId) -> Self {
        Self {
            endpoint,
            buffer: None,
            proceed: false,
        }
    }

    /// 继续执行但不再有数据，链路将以“无数据”完成。
    pub fn finish(endpoint: EndpointId) -> Self {
        Self {
            endpoint,
            buffer: None,
            proceed: true,
        }
    }
}

/// 过滤器契约。
///
/// # 设计背景（Why）
/// - 与 Netty 的入站/出站 Handler 类似，但以“消费输入、产出新缓冲”为核心，
///   使缓冲所有权在每一步都有唯一的交接点。
///
/// # 契约说明（What）
/// - `endpoint()` 在过滤器生命周期内不变，链路据此拒绝挂载到其它端点；
/// - `after_receive` / `before_send` 都是同步 CPU 计算，不得在内部等待 I/O；
/// - 返回 `Err` 或发生 panic 都视为过滤器故障：链路立即终止、归还已持有的缓冲，
///   并以 `FilterFault` 状态通知调用方；
/// - 对可逆的分帧过滤器，两个阶段应互为逆变换。
///
/// # 风险提示（Trade-offs）
/// - 过滤器以 `Arc` 共享，可同时挂载到读端与写端；内部若有可变状态需自行同步。
pub trait Filter: Send + Sync {
    /// 绑定的端点。
    fn endpoint(&self) -> EndpointId;

    /// 排序数据。
    fn order(&self) -> FilterOrder;

    /// 诊断名称。
    fn name(&self) -> &'static str {
        "anonymous-filter"
    }

    /// 数据到达后的变换。
    fn after_receive(&self, ctx: &FilterContext<'_>) -> Result<FilterResult, FilterError>;

    /// 数据发送前的变换。
    fn before_send(&self, ctx: &FilterContext<'_>) -> Result<FilterResult, FilterError>;

    /// 按阶段分派。
    fn apply_stage(
        &self,
        stage: FilterStage,
        ctx: &FilterContext<'_>,
    ) -> Result<FilterResult, FilterError> {
        match stage {
            FilterStage::AfterReceive => self.after_receive(ctx),
            FilterStage::BeforeSend => self.before_send(ctx),
        }
    }
}
