//! `relay-pipe` 是代理中继的数据面：端点读写、有序过滤链与双向配对。
//!
//! # 模块定位（Why）
//! - 一条中继连接的每个方向都是“从一个端点读、经过滤链变换、向另一个端点写”；
//!   本 crate 负责其中与传输无关的全部逻辑，端点以 [`Endpoint`] trait 注入；
//! - 过滤链运行在每个报文的热路径上，必须同时保证确定的执行顺序、缓冲恰好归还一次、
//!   以及截断/故障/取消路径上不泄漏内存。
//!
//! # 结构概览（How）
//! - [`filter`]：过滤器契约 [`Filter`]、上下文与结果，以及有序链 [`FilterChain`]；
//! - [`Reader`] / [`Writer`]：在“到达后”与“发送前”两个阶段执行过滤链的读写端；
//! - [`ReaderPair`] / [`WriterPair`]：双向中继按端点寻址的配对；
//! - [`forward`]：单方向“读→写”循环；
//! - [`PipeConfig`]、[`logging`]、[`testing`]：配置、日志安装与测试替身。
//!
//! # 契约说明（What）
//! - 传输层失败以 [`ReadStatus`] / [`WriteStatus`] 返回，从不以 panic 或 `Err` 穿越过滤链；
//! - 缓冲池 [`SlabBufferPool`](relay_buffer::SlabBufferPool) 是读写端之间唯一共享的可变结构。

mod cancellation;
mod config;
mod endpoint;
mod error;
pub mod filter;
mod forward;
pub mod logging;
mod pair;
mod reader;
pub mod testing;
mod writer;

pub use cancellation::Cancellation;
pub use config::{DEFAULT_READ_BUFFER_SIZE, MAX_READ_BUFFER_SIZE, PipeConfig, PoolSettings};
pub use endpoint::{Endpoint, EndpointId};
pub use error::{AttachError, ConfigError, FilterError, PairError};
pub use filter::{
    ChainOutcome, Filter, FilterCategory, FilterChain, FilterContext, FilterOrder, FilterResult,
    FilterStage,
};
pub use forward::{ForwardReport, StopReason, forward};
pub use pair::{EndpointBound, EndpointPair, ReaderPair, WriterPair};
pub use reader::{ReadResult, ReadStatus, Reader};
pub use writer::{WriteResult, WriteStatus, Writer};
