use std::sync::Arc;

use relay_buffer::{PooledBuffer, SlabBufferPool};

use crate::{
    AttachError, Cancellation, ChainOutcome, Endpoint, EndpointId, Filter, FilterChain,
    FilterStage,
};

/// 一次写入的结果分类，与 [`ReadStatus`](crate::ReadStatus) 一一对应。
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum WriteStatus {
    Succeeded,
    /// 传输层写入失败、写入 0 字节或只写出部分帧。
    Failed,
    BrokenByFilter,
    FilterFault,
    Cancelled,
}

/// 写端一次 `write` 的产出；写端总会归还交给它的缓冲，因此结果不携带缓冲。
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct WriteResult {
    pub status: WriteStatus,
    pub bytes_written: usize,
}

impl WriteResult {
    fn new(status: WriteStatus, bytes_written: usize) -> Self {
        Self {
            status,
            bytes_written,
        }
    }

    /// 是否写入成功。
    pub fn is_success(&self) -> bool {
        self.status == WriteStatus::Succeeded
    }
}

/// 读端的镜像：在“发送前”阶段执行过滤链，再把结果交给传输层。
///
/// # 契约说明（What）
/// - 过滤链与读端一样按 `(category, priority, sequence)` 升序执行；
/// - `write` 接管传入缓冲的所有权，无论成功与否都会归还链路产生的全部缓冲；
/// - 链路以“无数据”完成时不调用传输层，视为成功写入 0 字节。
pub struct Writer {
    endpoint: Arc<dyn Endpoint>,
    chain: FilterChain,
    pool: SlabBufferPool,
}

impl Writer {
    /// 基于端点与缓冲池创建写端。
    pub fn new(endpoint: Arc<dyn Endpoint>, pool: SlabBufferPool) -> Self {
        let chain = FilterChain::new(endpoint.id());
        Self {
            endpoint,
            chain,
            pool,
        }
    }

    /// 创建写端并挂载一组过滤器；被拒绝的过滤器记录日志后跳过。
    pub fn with_filters<I>(endpoint: Arc<dyn Endpoint>, pool: SlabBufferPool, filters: I) -> Self
    where
        I: IntoIterator<Item = Arc<dyn Filter>>,
    {
        let mut writer = Self::new(endpoint, pool);
        for filter in filters {
            if let Err(error) = writer.apply(filter) {
                tracing::warn!(
                    endpoint = %writer.endpoint.display(),
                    code = error.code(),
                    %error,
                    "writer filter skipped"
                );
            }
        }
        writer
    }

    /// 所属端点身份。
    pub fn endpoint_id(&self) -> EndpointId {
        self.chain.endpoint()
    }

    /// 所属端点。
    pub fn endpoint(&self) -> &Arc<dyn Endpoint> {
        &self.endpoint
    }

    /// 已挂载的过滤器。
    pub fn filters(&self) -> &FilterChain {
        &self.chain
    }

    /// 挂载过滤器。
    pub fn apply(&mut self, filter: Arc<dyn Filter>) -> Result<(), AttachError> {
        self.chain.attach(filter)
    }

    /// 执行“发送前”阶段并写出数据。
    ///
    /// 一次 `write` 对应一帧：传输层必须一次写出全部有效字节，短写按 `Failed` 上报，
    /// `bytes_written` 保留实际写出的字节数。
    pub async fn write(&mut self, data: PooledBuffer, cancellation: &Cancellation) -> WriteResult {
        if cancellation.is_cancelled() {
            data.release();
            return WriteResult::new(WriteStatus::Cancelled, 0);
        }

        let label = self.endpoint.display();
        let outgoing = if self.chain.is_empty() {
            data
        } else {
            match self.chain.execute(
                FilterStage::BeforeSend,
                data,
                &self.pool,
                cancellation,
                &label,
            ) {
                ChainOutcome::Completed(Some(buffer)) => buffer,
                ChainOutcome::Completed(None) => {
                    return WriteResult::new(WriteStatus::Succeeded, 0);
                }
                ChainOutcome::Broken { .. } => {
                    return WriteResult::new(WriteStatus::BrokenByFilter, 0);
                }
                ChainOutcome::Faulted { .. } => {
                    return WriteResult::new(WriteStatus::FilterFault, 0);
                }
                ChainOutcome::Cancelled { .. } => {
                    return WriteResult::new(WriteStatus::Cancelled, 0);
                }
            }
        };

        if outgoing.significant_length() == 0 {
            outgoing.release();
            return WriteResult::new(WriteStatus::Succeeded, 0);
        }

        let expected = outgoing.significant_length();
        let outcome = self
            .endpoint
            .write(outgoing.significant(), cancellation)
            .await;
        outgoing.release();
        match outcome {
            Ok(0) => {
                tracing::warn!(endpoint = %label, "transport accepted zero bytes");
                WriteResult::new(WriteStatus::Failed, 0)
            }
            Ok(written) if written < expected => {
                tracing::warn!(
                    endpoint = %label,
                    written,
                    expected,
                    "transport wrote a partial frame"
                );
                WriteResult::new(WriteStatus::Failed, written)
            }
            Ok(written) => {
                tracing::debug!(endpoint = %label, bytes = written, "sent");
                WriteResult::new(WriteStatus::Succeeded, written)
            }
            Err(error) => {
                tracing::warn!(endpoint = %label, %error, "transport write failed");
                WriteResult::new(WriteStatus::Failed, 0)
            }
        }
    }
}

impl core::fmt::Debug for Writer {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Writer")
            .field("endpoint", &self.endpoint.display())
            .field("chain", &self.chain)
            .finish()
    }
}
