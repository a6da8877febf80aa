use std::sync::Arc;

use relay_buffer::{PooledBuffer, SlabBufferPool};

use crate::{
    AttachError, Cancellation, ChainOutcome, Endpoint, EndpointId, Filter, FilterChain,
    FilterStage, MAX_READ_BUFFER_SIZE, PipeConfig,
};

/// 一次读取的结果分类。
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum ReadStatus {
    /// 读取成功，过滤链完整执行（或为空）。
    Succeeded,
    /// 传输层返回 0 字节或错误；在本层不可重试。
    Failed,
    /// 过滤器主动截断链路（例如输入为空或格式不符），调用方应丢弃该报文。
    BrokenByFilter,
    /// 过滤器返回错误或 panic，等价于截断，但以独立状态暴露。
    FilterFault,
    /// 在读取前或过滤器之间观察到取消，剩余过滤器未执行。
    Cancelled,
}

/// 读端一次 `read` 的产出。
///
/// # 契约说明（What）
/// - `status == Succeeded` 时 `bytes_valid` 等于 `buffer` 的有效长度，`buffer` 为 `None` 时为 0；
/// - 其余状态下 `buffer` 恒为 `None`、`bytes_valid` 恒为 0：读端已归还全部缓冲；
/// - 调用方取得 `buffer` 后负责归还，或把它交给写端继续传递。
#[derive(Debug)]
#[must_use = "a successful read carries a pooled buffer that must be released or forwarded"]
pub struct ReadResult {
    pub status: ReadStatus,
    pub buffer: Option<PooledBuffer>,
    pub bytes_valid: usize,
}

impl ReadResult {
    fn succeeded(buffer: Option<PooledBuffer>) -> Self {
        let bytes_valid = buffer
            .as_ref()
            .map_or(0, PooledBuffer::significant_length);
        Self {
            status: ReadStatus::Succeeded,
            buffer,
            bytes_valid,
        }
    }

    fn empty(status: ReadStatus) -> Self {
        Self {
            status,
            buffer: None,
            bytes_valid: 0,
        }
    }

    /// 是否读取成功。
    pub fn is_success(&self) -> bool {
        self.status == ReadStatus::Succeeded
    }

    /// 有效数据视图；无缓冲时为空切片。
    pub fn data(&self) -> &[u8] {
        self.buffer
            .as_ref()
            .map_or(&[][..], PooledBuffer::significant)
    }

    /// 取出缓冲所有权。
    pub fn into_buffer(self) -> Option<PooledBuffer> {
        self.buffer
    }

    /// 归还携带的缓冲（若有）。
    pub fn release(self) {
        if let Some(buffer) = self.buffer {
            buffer.release();
        }
    }
}

/// 带过滤链的读端。
///
/// # 设计背景（Why）
/// - 一个读端服务一条逻辑数据流：租借读缓冲、等待传输层填充、执行“到达后”阶段的过滤链；
/// - 过滤链在装配阶段通过 [`apply`](Self::apply) 构建，之后只读。
///
/// # 契约说明（What）
/// - `apply` 与 `read` 都要求 `&mut self`：装配与读取不可能交错，同一读端的读取也不可能重叠；
/// - 每条退出路径都保证缓冲要么交给调用方，要么已归还池。
///
/// # 并发说明
/// - 同一 [`ReaderPair`](crate::ReaderPair) 的两个读端互不依赖，可以在不同任务中并发读取；
///   它们共享的只有线程安全的缓冲池。
pub struct Reader {
    endpoint: Arc<dyn Endpoint>,
    chain: FilterChain,
    pool: SlabBufferPool,
    buffer_size: usize,
}

impl Reader {
    /// 基于端点、缓冲池与配置创建读端。
    ///
    /// 未经 [`PipeConfig::validate`] 的 `read_buffer_size` 超出 `1..=MAX_READ_BUFFER_SIZE` 时
    /// 收敛到最近的边界并记录告警。
    pub fn new(endpoint: Arc<dyn Endpoint>, pool: SlabBufferPool, config: &PipeConfig) -> Self {
        let buffer_size = config.read_buffer_size.clamp(1, MAX_READ_BUFFER_SIZE);
        if buffer_size != config.read_buffer_size {
            tracing::warn!(
                endpoint = %endpoint.display(),
                requested = config.read_buffer_size,
                buffer_size,
                "read buffer size clamped"
            );
        }
        let chain = FilterChain::new(endpoint.id());
        Self {
            endpoint,
            chain,
            pool,
            buffer_size,
        }
    }

    /// 创建读端并挂载一组过滤器；不属于该端点或重复的过滤器被跳过并记录日志。
    pub fn with_filters<I>(
        endpoint: Arc<dyn Endpoint>,
        pool: SlabBufferPool,
        config: &PipeConfig,
        filters: I,
    ) -> Self
    where
        I: IntoIterator<Item = Arc<dyn Filter>>,
    {
        let mut reader = Self::new(endpoint, pool, config);
        for filter in filters {
            if let Err(error) = reader.apply(filter) {
                tracing::warn!(
                    endpoint = %reader.endpoint.display(),
                    code = error.code(),
                    %error,
                    "reader filter skipped"
                );
            }
        }
        reader
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

    /// 每次读取租借的缓冲大小。
    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    /// 挂载过滤器：仅当其绑定到本端点且尚未挂载时生效。
    pub fn apply(&mut self, filter: Arc<dyn Filter>) -> Result<(), AttachError> {
        self.chain.attach(filter)
    }

    /// 读取一次并执行“到达后”阶段的过滤链。
    ///
    /// # 执行步骤（How）
    /// 1. 若已取消，直接返回 `Cancelled`，不租借缓冲；
    /// 2. 租借 `read_buffer_size` 大小的缓冲并发起传输读取（唯一的挂起点）；
    /// 3. 字节数为 0、传输错误或字节数超出缓冲：归还缓冲，返回 `Failed`；
    /// 4. 过滤链非空时执行 [`FilterChain::execute`]，把链路结果映射为读取状态；
    /// 5. 成功时返回最终缓冲及其有效长度。
    pub async fn read(&mut self, cancellation: &Cancellation) -> ReadResult {
        if cancellation.is_cancelled() {
            return ReadResult::empty(ReadStatus::Cancelled);
        }

        let label = self.endpoint.display();
        let mut received = self.pool.rent(self.buffer_size);
        let outcome = self
            .endpoint
            .read(received.memory_mut(), cancellation)
            .await;

        let count = match outcome {
            Ok(count) => count,
            Err(error) => {
                tracing::warn!(endpoint = %label, %error, "transport read failed");
                received.release();
                return ReadResult::empty(ReadStatus::Failed);
            }
        };
        if received.set_significant_length(count).is_err() {
            tracing::warn!(
                endpoint = %label,
                count,
                capacity = received.capacity(),
                "transport reported more bytes than the buffer holds"
            );
            received.release();
            return ReadResult::empty(ReadStatus::Failed);
        }
        tracing::debug!(endpoint = %label, bytes = count, "received");

        if count == 0 {
            received.release();
            return ReadResult::empty(ReadStatus::Failed);
        }
        if self.chain.is_empty() {
            return ReadResult::succeeded(Some(received));
        }

        let result = match self.chain.execute(
            FilterStage::AfterReceive,
            received,
            &self.pool,
            cancellation,
            &label,
        ) {
            ChainOutcome::Completed(buffer) => ReadResult::succeeded(buffer),
            ChainOutcome::Broken { .. } => ReadResult::empty(ReadStatus::BrokenByFilter),
            ChainOutcome::Faulted { .. } => ReadResult::empty(ReadStatus::FilterFault),
            ChainOutcome::Cancelled { .. } => ReadResult::empty(ReadStatus::Cancelled),
        };
        tracing::debug!(
            endpoint = %label,
            status = ?result.status,
            bytes = result.bytes_valid,
            "after-receive filtering done"
        );
        result
    }
}

impl core::fmt::Debug for Reader {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Reader")
            .field("endpoint", &self.endpoint.display())
            .field("chain", &self.chain)
            .field("buffer_size", &self.buffer_size)
            .finish()
    }
}
