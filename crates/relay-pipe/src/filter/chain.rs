use core::{fmt, ptr};
use std::{
    any::Any,
    panic::{self, AssertUnwindSafe},
    sync::Arc,
};

use relay_buffer::{PooledBuffer, SlabBufferPool};

use super::{Filter, FilterContext, FilterOrder, FilterResult, FilterStage};
use crate::{AttachError, Cancellation, EndpointId, FilterError};

/// 链路内部的全序键：`(category, priority)` 之后追加挂载序号。
type ChainKey = (FilterOrder, u64);

struct ChainEntry {
    key: ChainKey,
    filter: Arc<dyn Filter>,
}

/// 绑定到单一端点的有序过滤器集合。
///
/// # 设计背景（Why）
/// - 过滤器执行顺序必须确定：同一份挂载集合，无论挂载先后，执行顺序只由排序键决定；
///   排序数据相同的过滤器则按挂载先后执行。
///
/// # 核心机制（How）
/// - 以 `Vec` 保存条目，挂载时用 `partition_point` 找到插入位置，始终保持有序；
/// - 成员判定按 `Arc` 数据指针比较引用身份，而非按值比较。
///
/// # 契约说明（What）
/// - 链中所有过滤器绑定到同一端点；
/// - 同一过滤器实例至多出现一次；
/// - 挂载需要 `&mut self`，执行只需要 `&self`：借用规则保证执行期间链路不会被修改。
pub struct FilterChain {
    endpoint: EndpointId,
    entries: Vec<ChainEntry>,
    next_sequence: u64,
}

/// 一次链路执行的结果。
///
/// 除 `Completed` 外的变体都不携带缓冲：链路在返回前已经归还了自己持有的全部缓冲。
#[derive(Debug)]
pub enum ChainOutcome {
    /// 所有过滤器执行完毕，或某个过滤器以“无数据”结束。
    Completed(Option<PooledBuffer>),
    /// 过滤器返回 `proceed = false`。
    Broken { filter: &'static str },
    /// 过滤器返回错误或发生 panic。
    Faulted {
        filter: &'static str,
        error: FilterError,
    },
    /// 在过滤器之间观察到取消，`remaining` 个过滤器未执行。
    Cancelled { remaining: usize },
}

impl FilterChain {
    /// 创建绑定到 `endpoint` 的空链。
    pub fn new(endpoint: EndpointId) -> Self {
        Self {
            endpoint,
            entries: Vec::new(),
            next_sequence: 0,
        }
    }

    /// 链路所属端点。
    pub fn endpoint(&self) -> EndpointId {
        self.endpoint
    }

    /// 过滤器数量。
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// 是否为空链。
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 按执行顺序遍历过滤器。
    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn Filter>> + '_ {
        self.entries.iter().map(|entry| &entry.filter)
    }

    /// 按引用身份判断过滤器是否已挂载。
    pub fn contains(&self, filter: &Arc<dyn Filter>) -> bool {
        self.entries
            .iter()
            .any(|entry| same_filter(&entry.filter, filter))
    }

    /// 挂载过滤器。
    ///
    /// # 契约
    /// - 过滤器绑定的端点必须与链路一致，否则返回 [`AttachError::ForeignEndpoint`]；
    /// - 同一实例重复挂载返回 [`AttachError::Duplicate`]；
    /// - 被拒绝时链路保持不变。
    pub fn attach(&mut self, filter: Arc<dyn Filter>) -> Result<(), AttachError> {
        if filter.endpoint() != self.endpoint {
            return Err(AttachError::ForeignEndpoint {
                filter: filter.name(),
                expected: self.endpoint,
                actual: filter.endpoint(),
            });
        }
        if self.contains(&filter) {
            return Err(AttachError::Duplicate {
                filter: filter.name(),
            });
        }

        let key = (filter.order(), self.next_sequence);
        self.next_sequence += 1;
        let index = self.entries.partition_point(|entry| entry.key <= key);
        self.entries.insert(index, ChainEntry { key, filter });
        Ok(())
    }

    /// 以 `stage` 阶段依次执行全部过滤器。
    ///
    /// # 执行协议（How）
    /// 1. 以当前缓冲的有效前缀构造上下文并调用过滤器；首个过滤器的输入为 `input`；
    /// 2. 无论调用结果如何，被消费的输入缓冲都恰好归还一次；
    /// 3. 采纳过滤器的输出作为新的当前缓冲；
    /// 4. 过滤器返回 `proceed = false` 时立即停止，归还当前缓冲并返回 `Broken`；
    /// 5. 过滤器返回 `Err` 或 panic 时立即停止并返回 `Faulted`，不再恢复后续过滤器；
    /// 6. 每个过滤器的簿记完成后检查取消，若仍有过滤器待执行则归还当前缓冲并返回 `Cancelled`；
    /// 7. 某个过滤器以“无数据”继续时，后续过滤器无可变换，链路以 `Completed(None)` 结束。
    ///
    /// # 契约（What）
    /// - 返回 `Completed(Some(buffer))` 时，缓冲所有权交给调用方；其余结果不遗留任何未归还缓冲。
    pub fn execute(
        &self,
        stage: FilterStage,
        input: PooledBuffer,
        pool: &SlabBufferPool,
        cancellation: &Cancellation,
        label: &str,
    ) -> ChainOutcome {
        let total = self.entries.len();
        let mut current = Some(input);

        for (index, entry) in self.entries.iter().enumerate() {
            let Some(consumed) = current.take() else {
                break;
            };
            let filter = &entry.filter;
            let invocation = {
                let ctx = FilterContext::new(self.endpoint, consumed.significant(), pool);
                panic::catch_unwind(AssertUnwindSafe(|| filter.apply_stage(stage, &ctx)))
            };
            consumed.release();

            let result = match invocation {
                Ok(Ok(result)) => result,
                Ok(Err(error)) => return self.fault(filter.name(), stage, error, label),
                Err(payload) => {
                    let error = FilterError::Internal {
                        detail: panic_message(payload.as_ref()),
                    };
                    return self.fault(filter.name(), stage, error, label);
                }
            };
            let FilterResult {
                endpoint,
                buffer,
                proceed,
            } = result;

            if endpoint != self.endpoint {
                if let Some(buffer) = buffer {
                    buffer.release();
                }
                let error = FilterError::Internal {
                    detail: format!("result addressed to {endpoint}, expected {}", self.endpoint),
                };
                return self.fault(filter.name(), stage, error, label);
            }

            current = buffer;
            if !proceed {
                if let Some(buffer) = current.take() {
                    buffer.release();
                }
                tracing::debug!(
                    endpoint = %label,
                    filter = filter.name(),
                    %stage,
                    "chain broken by filter"
                );
                return ChainOutcome::Broken {
                    filter: filter.name(),
                };
            }

            let remaining = total - index - 1;
            if remaining > 0 && current.is_some() && cancellation.is_cancelled() {
                if let Some(buffer) = current.take() {
                    buffer.release();
                }
                tracing::debug!(endpoint = %label, remaining, %stage, "chain cancelled");
                return ChainOutcome::Cancelled { remaining };
            }
        }

        ChainOutcome::Completed(current)
    }

    fn fault(
        &self,
        filter: &'static str,
        stage: FilterStage,
        error: FilterError,
        label: &str,
    ) -> ChainOutcome {
        tracing::error!(
            endpoint = %label,
            filter,
            %stage,
            code = error.code(),
            %error,
            "filter fault, chain aborted"
        );
        ChainOutcome::Faulted { filter, error }
    }
}

impl fmt::Debug for FilterChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilterChain")
            .field("endpoint", &self.endpoint)
            .field(
                "filters",
                &self
                    .entries
                    .iter()
                    .map(|entry| entry.filter.name())
                    .collect::<Vec<_>>(),
            )
            .finish()
    }
}

fn same_filter(a: &Arc<dyn Filter>, b: &Arc<dyn Filter>) -> bool {
    ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        format!("filter panicked: {message}")
    } else if let Some(message) = payload.downcast_ref::<String>() {
        format!("filter panicked: {message}")
    } else {
        "filter panicked".to_owned()
    }
}
