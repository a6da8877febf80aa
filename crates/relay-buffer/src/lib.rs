//! `relay-buffer` 提供中继数据面使用的池化缓冲。
//!
//! # 模块定位（Why）
//! - 每个报文的读取、过滤、发送都需要临时内存；若逐次向分配器申请，热路径上的抖动不可接受。
//! - 过滤链在多个第三方变换之间传递缓冲，必须保证任一时刻只有一个所有者，且每块缓冲恰好归还一次。
//!
//! # 设计概要（How）
//! - [`SlabBufferPool`] 以 `spin::Mutex<Vec<BytesMut>>` 维护自由链表，计数器全部使用原子变量；
//! - [`PooledBuffer`] 是只可移动的句柄，`release(self)` 消耗句柄并将内存块交还池，
//!   因而“归还后再读”在编译期即被拒绝；
//! - 未显式归还便被丢弃的句柄不会回到池中，而是释放给分配器并计入 `leaked`，让泄漏在统计中可见。
//!
//! # 契约说明（What）
//! - 租借只会在池内部的锁上短暂阻塞，从不执行 I/O；
//! - 所有切片/拷贝操作都以 `significant_length` 为界，而非容量。

mod error;
mod pool;
mod pooled_buffer;

pub use error::BufferError;
pub use pool::{PoolConfig, PoolStats, SlabBufferPool};
pub use pooled_buffer::{BufferRecycler, PooledBuffer, ReclaimedBuffer};
