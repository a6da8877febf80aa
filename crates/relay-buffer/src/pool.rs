use core::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use bytes::BytesMut;
use spin::Mutex;

use crate::pooled_buffer::{BufferRecycler, PooledBuffer, ReclaimedBuffer};

/// 自由链表默认保留的内存块上限。
pub const DEFAULT_MAX_CACHED_BLOCKS: usize = 1024;

/// 缓冲池配置。
///
/// - `max_cached_blocks`：自由链表最多缓存的内存块数量；链表已满时归还的块直接释放，
///   并计入 [`PoolStats::discarded`]。
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct PoolConfig {
    pub max_cached_blocks: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_cached_blocks: DEFAULT_MAX_CACHED_BLOCKS,
        }
    }
}

/// 缓冲池统计快照。
///
/// # 契约说明（What）
/// - `rented == released + leaked + active_leases` 在无并发操作的观察点恒成立；
/// - `leaked` 非零意味着存在未显式归还的句柄，测试应以此断言“不泄漏”；
/// - 字节类指标均为近似值，仅用于观测，不参与调度决策。
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct PoolStats {
    pub rented: u64,
    pub released: u64,
    pub leaked: u64,
    pub discarded: u64,
    pub active_leases: usize,
    pub cached_blocks: usize,
    pub cached_bytes: usize,
    pub allocated_bytes: usize,
}

/// `SlabBufferPool` 是基于自由链表的共享缓冲池，在并发的中继方向之间共用。
///
/// # 模块角色（Why）
/// - 读端每次读取都要租借一块读缓冲，过滤器每一步又要租借输出缓冲；
///   复用内存块可以把热路径上的堆分配降到接近零。
///
/// # 核心机制（How）
/// - `spin::Mutex<Vec<BytesMut>>` 作为自由链表，租借时挑选容量足够的最小块（best-fit），
///   避免小请求长期占用大块；
/// - `PoolMetrics` 用原子计数记录租借、归还、泄漏等指标，[`stats`](Self::stats) 输出快照；
/// - `PooledBuffer` 通过 [`BufferRecycler`] 回调回到本池，池本身以 `Arc` 共享，克隆开销极低。
///
/// # 契约说明（What）
/// - **线程安全**：租借与归还可以在任意线程并发进行；
/// - **后置条件**：`rent(size)` 返回的缓冲容量不小于 `size`，有效长度为 0，
///   有效长度之外的内容未定义（复用块可能残留旧数据）。
///
/// # 设计权衡（Trade-offs）
/// - 选择自旋锁而非阻塞锁：临界区只有一次线性扫描与 `Vec` 操作，持锁时间极短；
/// - best-fit 需要遍历链表，链表长度受 `max_cached_blocks` 约束。
#[derive(Clone)]
pub struct SlabBufferPool {
    inner: Arc<PoolInner>,
}

impl Default for SlabBufferPool {
    fn default() -> Self {
        Self::with_config(PoolConfig::default())
    }
}

impl SlabBufferPool {
    /// 创建使用默认配置的空池。
    pub fn new() -> Self {
        Self::default()
    }

    /// 使用指定配置创建空池。
    pub fn with_config(config: PoolConfig) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                free_list: Mutex::new(Vec::new()),
                config,
                metrics: PoolMetrics::default(),
            }),
        }
    }

    /// 租借容量至少为 `size` 的缓冲。
    pub fn rent(&self, size: usize) -> PooledBuffer {
        let block = self.inner.acquire_block(size);
        let recycler: Arc<dyn BufferRecycler> = self.inner.clone();
        PooledBuffer::new(block, recycler)
    }

    /// 清空自由链表，返回释放的字节数。
    pub fn shrink_to_fit(&self) -> usize {
        self.inner.shrink_free_list()
    }

    /// 读取统计快照。
    pub fn stats(&self) -> PoolStats {
        self.inner.snapshot()
    }

    /// 当前池配置。
    pub fn config(&self) -> PoolConfig {
        self.inner.config
    }
}

impl core::fmt::Debug for SlabBufferPool {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SlabBufferPool")
            .field("config", &self.inner.config)
            .field("stats", &self.stats())
            .finish()
    }
}

struct PoolInner {
    free_list: Mutex<Vec<BytesMut>>,
    config: PoolConfig,
    metrics: PoolMetrics,
}

impl PoolInner {
    /// 从自由链表挑选最小的合适块，未命中时向分配器申请。
    fn acquire_block(&self, size: usize) -> BytesMut {
        let reused = {
            let mut list = self.free_list.lock();
            let best = list
                .iter()
                .enumerate()
                .filter(|(_, block)| block.len() >= size)
                .min_by_key(|(_, block)| block.len())
                .map(|(index, _)| index);
            best.map(|index| list.swap_remove(index))
        };

        let block = match reused {
            Some(block) => {
                saturating_sub(&self.metrics.cached_bytes, block.len());
                block
            }
            None => {
                self.metrics
                    .allocated_bytes
                    .fetch_add(size, Ordering::Relaxed);
                BytesMut::zeroed(size)
            }
        };
        self.metrics.rented.fetch_add(1, Ordering::Relaxed);
        self.metrics.active_leases.fetch_add(1, Ordering::Relaxed);
        block
    }

    fn shrink_free_list(&self) -> usize {
        let mut list = self.free_list.lock();
        let reclaimed: usize = list.iter().map(BytesMut::len).sum();
        list.clear();
        saturating_sub(&self.metrics.cached_bytes, reclaimed);
        saturating_sub(&self.metrics.allocated_bytes, reclaimed);
        reclaimed
    }

    fn snapshot(&self) -> PoolStats {
        let cached_blocks = self.free_list.lock().len();
        let metrics = &self.metrics;
        PoolStats {
            rented: metrics.rented.load(Ordering::Relaxed),
            released: metrics.released.load(Ordering::Relaxed),
            leaked: metrics.leaked.load(Ordering::Relaxed),
            discarded: metrics.discarded.load(Ordering::Relaxed),
            active_leases: metrics.active_leases.load(Ordering::Relaxed),
            cached_blocks,
            cached_bytes: metrics.cached_bytes.load(Ordering::Relaxed),
            allocated_bytes: metrics.allocated_bytes.load(Ordering::Relaxed),
        }
    }
}

impl BufferRecycler for PoolInner {
    fn reclaim(&self, reclaimed: ReclaimedBuffer) {
        saturating_sub(&self.metrics.active_leases, 1);
        match reclaimed {
            ReclaimedBuffer::Released(block) => {
                self.metrics.released.fetch_add(1, Ordering::Relaxed);
                let capacity = block.len();
                let mut list = self.free_list.lock();
                if list.len() < self.config.max_cached_blocks {
                    list.push(block);
                    self.metrics
                        .cached_bytes
                        .fetch_add(capacity, Ordering::Relaxed);
                } else {
                    drop(list);
                    self.metrics.discarded.fetch_add(1, Ordering::Relaxed);
                    saturating_sub(&self.metrics.allocated_bytes, capacity);
                }
            }
            ReclaimedBuffer::Abandoned { capacity } => {
                self.metrics.leaked.fetch_add(1, Ordering::Relaxed);
                saturating_sub(&self.metrics.allocated_bytes, capacity);
                tracing::warn!(capacity, "pooled buffer dropped without release");
            }
        }
    }
}

#[derive(Default)]
struct PoolMetrics {
    rented: AtomicU64,
    released: AtomicU64,
    leaked: AtomicU64,
    discarded: AtomicU64,
    active_leases: AtomicUsize,
    cached_bytes: AtomicUsize,
    allocated_bytes: AtomicUsize,
}

fn saturating_sub(target: &AtomicUsize, value: usize) {
    let _ = target.fetch_update(Ordering::Relaxed, Ordering::Relaxed, |current| {
        Some(current.saturating_sub(value))
    });
}
