use core::{fmt, mem};
use std::sync::Arc;

use bytes::BytesMut;

use crate::BufferError;

/// `BufferRecycler` 描述缓冲池在租借结束时的回收入口。
///
/// # 设计初衷（Why）
/// - [`PooledBuffer`] 只负责“何时归还”，不关心池如何复用内存；
///   通过该 trait 将回收路径显式化，句柄与具体池实现保持松耦合。
///
/// # 契约定义（What）
/// - **前置条件**：实现必须线程安全，且 `reclaim` 不得 panic，
///   否则 `Drop` 路径上的 panic 会直接终止进程；
/// - **后置条件**：每个句柄恰好触发一次 `reclaim`，无论是显式归还还是被遗弃。
pub trait BufferRecycler: Send + Sync + 'static {
    /// 接收一次回收事件。
    fn reclaim(&self, reclaimed: ReclaimedBuffer);
}

/// 一次回收动作携带的上下文。
///
/// - `Released`：调用方显式归还，内存块可以进入自由链表；
/// - `Abandoned`：句柄在未归还的情况下被丢弃，内存块已经交还分配器，仅剩容量统计。
#[derive(Debug)]
pub enum ReclaimedBuffer {
    Released(BytesMut),
    Abandoned { capacity: usize },
}

impl ReclaimedBuffer {
    /// 本次回收涉及的容量。
    pub fn capacity(&self) -> usize {
        match self {
            ReclaimedBuffer::Released(block) => block.len(),
            ReclaimedBuffer::Abandoned { capacity } => *capacity,
        }
    }
}

/// `PooledBuffer` 是对一块池化内存的独占引用，外加一个“有效长度”标记。
///
/// # 设计动机（Why）
/// - 过滤链的每一步都会“消费输入、产出新缓冲”，所有权转移必须清晰可审计；
///   用只可移动的句柄表达所有权，转移即 `move`，归还即 `release(self)`。
/// - 归还时机属于协议的一部分，因此不依赖析构函数把内存送回池：
///   析构只负责兜底，把遗失的句柄登记为泄漏。
///
/// # 结构说明（How）
/// - `block`：长度恒等于容量的 `BytesMut`，整个容量都可被传输层直接填充；
/// - `significant_length`：由最后一次填充者设置，标记前缀中有意义的字节数；
/// - `returned`：显式归还后置位，析构据此判断是否发生泄漏。
///
/// # 契约说明（What）
/// - `0 <= significant_length <= capacity` 恒成立，越界设置返回 [`BufferError`]；
/// - [`significant`](Self::significant) 等视图永远只暴露有效前缀；
/// - 句柄不实现 `Clone`，同一块内存任一时刻只有一个逻辑所有者。
pub struct PooledBuffer {
    block: BytesMut,
    significant_length: usize,
    recycler: Arc<dyn BufferRecycler>,
    returned: bool,
}

impl PooledBuffer {
    /// 使用池分配的内存块与回收句柄创建缓冲。
    ///
    /// # 前置条件
    /// - `block.len()` 即为容量，调用方需保证其未被其它句柄共享。
    ///
    /// # 后置条件
    /// - 新句柄的有效长度为 0。
    pub fn new(block: BytesMut, recycler: Arc<dyn BufferRecycler>) -> Self {
        Self {
            block,
            significant_length: 0,
            recycler,
            returned: false,
        }
    }

    /// 内存块容量。
    pub fn capacity(&self) -> usize {
        self.block.len()
    }

    /// 当前有效长度。
    pub fn significant_length(&self) -> usize {
        self.significant_length
    }

    /// 设置有效长度，超出容量时拒绝并保持原值。
    pub fn set_significant_length(&mut self, len: usize) -> Result<(), BufferError> {
        if len > self.capacity() {
            return Err(BufferError::LengthOutOfRange {
                requested: len,
                capacity: self.capacity(),
            });
        }
        self.significant_length = len;
        Ok(())
    }

    /// 有效前缀的只读视图。
    pub fn significant(&self) -> &[u8] {
        &self.block[..self.significant_length]
    }

    /// 有效前缀的可写视图。
    pub fn significant_mut(&mut self) -> &mut [u8] {
        &mut self.block[..self.significant_length]
    }

    /// 整个容量的可写视图，供传输层一次性填充。
    ///
    /// 填充完成后调用方必须通过 [`set_significant_length`](Self::set_significant_length)
    /// 登记实际写入的字节数，否则有效长度保持旧值。
    pub fn memory_mut(&mut self) -> &mut [u8] {
        &mut self.block[..]
    }

    /// 从 `offset` 开始写入 `src`，并把有效长度推进到写入末尾。
    ///
    /// # 契约
    /// - `offset + src.len()` 不得超过容量，否则返回错误且缓冲内容保持不变；
    /// - 有效长度被设置为 `offset + src.len()`，`offset` 之前的内容由调用方负责。
    pub fn copy_from(&mut self, offset: usize, src: &[u8]) -> Result<(), BufferError> {
        let end = offset
            .checked_add(src.len())
            .filter(|end| *end <= self.capacity())
            .ok_or(BufferError::LengthOutOfRange {
                requested: offset.saturating_add(src.len()),
                capacity: self.capacity(),
            })?;
        self.block[offset..end].copy_from_slice(src);
        self.significant_length = end;
        Ok(())
    }

    /// 将内存块交还缓冲池，句柄随之失效。
    pub fn release(mut self) {
        let block = mem::take(&mut self.block);
        self.returned = true;
        self.recycler.reclaim(ReclaimedBuffer::Released(block));
    }
}

impl Drop for PooledBuffer {
    fn drop(&mut self) {
        // 未显式归还：内存交给分配器，池只登记泄漏。
        if !self.returned {
            let capacity = self.block.len();
            self.block = BytesMut::new();
            self.recycler
                .reclaim(ReclaimedBuffer::Abandoned { capacity });
        }
    }
}

impl fmt::Debug for PooledBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledBuffer")
            .field("capacity", &self.capacity())
            .field("significant_length", &self.significant_length)
            .finish()
    }
}
