//! 测试替身：脚本化端点与可观察的过滤器。
//!
//! # 教案式说明
//! - **意图（Why）**：读写端与过滤链的契约测试需要可控的传输层与可记录调用顺序的过滤器，
//!   而不是真实套接字；下游 crate（过滤器、传输适配）的测试同样复用这些替身；
//! - **契约（What）**：替身全部线程安全，可以在多线程运行时中使用；
//!   它们只服务于测试与基准，不应出现在生产装配中。

use std::{
    borrow::Cow,
    collections::VecDeque,
    io,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
};

use async_trait::async_trait;
use spin::Mutex;

use crate::{
    Cancellation, Endpoint, EndpointId, Filter, FilterContext, FilterError, FilterOrder,
    FilterResult, FilterStage,
};

enum ReadStep {
    Data(Vec<u8>),
    Error(io::ErrorKind),
    Overclaim(usize),
}

/// 按脚本返回读取结果、并记录全部写入的端点。
///
/// - 读取脚本耗尽后返回 `Ok(0)`（流结束）；
/// - 写入默认成功并原样记录，[`fail_writes`](Self::fail_writes) 之后返回 `BrokenPipe`；
/// - [`limit_writes`](Self::limit_writes) 之后每次写入至多接受给定字节数。
pub struct ScriptedEndpoint {
    id: EndpointId,
    name: String,
    reads: Mutex<VecDeque<ReadStep>>,
    writes: Mutex<Vec<Vec<u8>>>,
    reads_served: AtomicUsize,
    fail_writes: AtomicBool,
    write_limit: AtomicUsize,
}

impl ScriptedEndpoint {
    /// 创建带诊断名的端点，身份自动分配。
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: EndpointId::allocate(),
            name: name.into(),
            reads: Mutex::new(VecDeque::new()),
            writes: Mutex::new(Vec::new()),
            reads_served: AtomicUsize::new(0),
            fail_writes: AtomicBool::new(false),
            write_limit: AtomicUsize::new(usize::MAX),
        }
    }

    /// 追加一次返回 `data` 的读取。
    pub fn push_read(&self, data: &[u8]) -> &Self {
        self.reads.lock().push_back(ReadStep::Data(data.to_vec()));
        self
    }

    /// 追加一次返回传输错误的读取。
    pub fn push_read_error(&self, kind: io::ErrorKind) -> &Self {
        self.reads.lock().push_back(ReadStep::Error(kind));
        self
    }

    /// 追加一次谎报字节数（超出缓冲 `excess` 字节）的读取。
    pub fn push_overclaim(&self, excess: usize) -> &Self {
        self.reads.lock().push_back(ReadStep::Overclaim(excess));
        self
    }

    /// 之后的写入全部失败。
    pub fn fail_writes(&self) {
        self.fail_writes.store(true, Ordering::Release);
    }

    /// 之后的每次写入至多接受 `max` 字节，模拟短写。
    pub fn limit_writes(&self, max: usize) {
        self.write_limit.store(max, Ordering::Release);
    }

    /// 已记录的写入。
    pub fn written(&self) -> Vec<Vec<u8>> {
        self.writes.lock().clone()
    }

    /// 已执行的读取次数（含脚本耗尽后的 `Ok(0)`）。
    pub fn reads_served(&self) -> usize {
        self.reads_served.load(Ordering::Acquire)
    }
}

#[async_trait]
impl Endpoint for ScriptedEndpoint {
    fn id(&self) -> EndpointId {
        self.id
    }

    fn display(&self) -> Cow<'_, str> {
        Cow::Borrowed(&self.name)
    }

    async fn read(&self, buf: &mut [u8], _cancellation: &Cancellation) -> io::Result<usize> {
        self.reads_served.fetch_add(1, Ordering::AcqRel);
        let step = self.reads.lock().pop_front();
        match step {
            Some(ReadStep::Data(data)) => {
                let count = data.len().min(buf.len());
                buf[..count].copy_from_slice(&data[..count]);
                Ok(count)
            }
            Some(ReadStep::Error(kind)) => Err(io::Error::from(kind)),
            Some(ReadStep::Overclaim(excess)) => Ok(buf.len() + excess),
            None => Ok(0),
        }
    }

    async fn write(&self, data: &[u8], _cancellation: &Cancellation) -> io::Result<usize> {
        if self.fail_writes.load(Ordering::Acquire) {
            return Err(io::Error::from(io::ErrorKind::BrokenPipe));
        }
        let accepted = data.len().min(self.write_limit.load(Ordering::Acquire));
        self.writes.lock().push(data[..accepted].to_vec());
        Ok(accepted)
    }
}

/// 多个过滤器共享的调用日志，按调用先后记录 `(name, stage)`。
#[derive(Clone, Default)]
pub struct CallJournal {
    calls: Arc<Mutex<Vec<(&'static str, FilterStage)>>>,
}

impl CallJournal {
    /// 创建空日志。
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&self, name: &'static str, stage: FilterStage) {
        self.calls.lock().push((name, stage));
    }

    /// 按调用顺序返回过滤器名称。
    pub fn names(&self) -> Vec<&'static str> {
        self.calls.lock().iter().map(|(name, _)| *name).collect()
    }

    /// 完整调用记录。
    pub fn entries(&self) -> Vec<(&'static str, FilterStage)> {
        self.calls.lock().clone()
    }

    /// 清空记录。
    pub fn clear(&self) {
        self.calls.lock().clear();
    }
}

/// 原样复制输入并记录调用的过滤器。
pub struct RecordingFilter {
    endpoint: EndpointId,
    order: FilterOrder,
    name: &'static str,
    journal: CallJournal,
}

impl RecordingFilter {
    /// 创建过滤器。
    pub fn new(
        endpoint: EndpointId,
        order: FilterOrder,
        name: &'static str,
        journal: &CallJournal,
    ) -> Self {
        Self {
            endpoint,
            order,
            name,
            journal: journal.clone(),
        }
    }
}

impl Filter for RecordingFilter {
    fn endpoint(&self) -> EndpointId {
        self.endpoint
    }

    fn order(&self) -> FilterOrder {
        self.order
    }

    fn name(&self) -> &'static str {
        self.name
    }

    fn after_receive(&self, ctx: &FilterContext<'_>) -> Result<FilterResult, FilterError> {
        self.journal.record(self.name, FilterStage::AfterReceive);
        copy_through(ctx)
    }

    fn before_send(&self, ctx: &FilterContext<'_>) -> Result<FilterResult, FilterError> {
        self.journal.record(self.name, FilterStage::BeforeSend);
        copy_through(ctx)
    }
}

/// [`ScriptedFilter`] 在两个阶段上的行为。
#[derive(Clone, Debug)]
pub enum FilterBehavior {
    /// 原样复制输入。
    PassThrough,
    /// 复制输入并在末尾追加字节。
    Append(Vec<u8>),
    /// `proceed = false`，不产出缓冲。
    Halt,
    /// 复制输入后 `proceed = false`，验证截断时链路归还过滤器产出的缓冲。
    HaltWithBuffer,
    /// `proceed = true` 但不产出缓冲。
    Finish,
    /// 返回 [`FilterError::Internal`]。
    Fail,
    /// 在过滤器内部 panic。
    Panic,
    /// 复制输入但把结果标注到另一个端点。
    Misaddress(EndpointId),
    /// 复制输入后触发取消。
    CancelAfter(Cancellation),
}

/// 行为可脚本化、并统计调用次数的过滤器。
pub struct ScriptedFilter {
    endpoint: EndpointId,
    order: FilterOrder,
    name: &'static str,
    behavior: FilterBehavior,
    invocations: AtomicUsize,
    journal: Option<CallJournal>,
}

impl ScriptedFilter {
    /// 创建过滤器。
    pub fn new(
        endpoint: EndpointId,
        order: FilterOrder,
        name: &'static str,
        behavior: FilterBehavior,
    ) -> Self {
        Self {
            endpoint,
            order,
            name,
            behavior,
            invocations: AtomicUsize::new(0),
            journal: None,
        }
    }

    /// 把调用同时记录到共享日志。
    pub fn with_journal(mut self, journal: &CallJournal) -> Self {
        self.journal = Some(journal.clone());
        self
    }

    /// 被调用的次数（两个阶段合计）。
    pub fn invocations(&self) -> usize {
        self.invocations.load(Ordering::Acquire)
    }

    fn run(&self, stage: FilterStage, ctx: &FilterContext<'_>) -> Result<FilterResult, FilterError> {
        self.invocations.fetch_add(1, Ordering::AcqRel);
        if let Some(journal) = &self.journal {
            journal.record(self.name, stage);
        }
        match &self.behavior {
            FilterBehavior::PassThrough => copy_through(ctx),
            FilterBehavior::Append(suffix) => {
                let mut out = ctx.pool.rent(ctx.data.len() + suffix.len());
                out.copy_from(0, ctx.data)?;
                out.copy_from(ctx.data.len(), suffix)?;
                Ok(FilterResult::next(ctx.endpoint, out))
            }
            FilterBehavior::Halt => Ok(FilterResult::halt(ctx.endpoint)),
            FilterBehavior::HaltWithBuffer => {
                let mut result = copy_through(ctx)?;
                result.proceed = false;
                Ok(result)
            }
            FilterBehavior::Finish => Ok(FilterResult::finish(ctx.endpoint)),
            FilterBehavior::Fail => Err(FilterError::Internal {
                detail: format!("{} scripted failure", self.name),
            }),
            FilterBehavior::Panic => panic!("{} scripted panic", self.name),
            FilterBehavior::Misaddress(other) => {
                let mut result = copy_through(ctx)?;
                result.endpoint = *other;
                Ok(result)
            }
            FilterBehavior::CancelAfter(cancellation) => {
                let result = copy_through(ctx)?;
                cancellation.cancel();
                Ok(result)
            }
        }
    }
}

impl Filter for ScriptedFilter {
    fn endpoint(&self) -> EndpointId {
        self.endpoint
    }

    fn order(&self) -> FilterOrder {
        self.order
    }

    fn name(&self) -> &'static str {
        self.name
    }

    fn after_receive(&self, ctx: &FilterContext<'_>) -> Result<FilterResult, FilterError> {
        self.run(FilterStage::AfterReceive, ctx)
    }

    fn before_send(&self, ctx: &FilterContext<'_>) -> Result<FilterResult, FilterError> {
        self.run(FilterStage::BeforeSend, ctx)
    }
}

fn copy_through(ctx: &FilterContext<'_>) -> Result<FilterResult, FilterError> {
    let mut out = ctx.pool.rent(ctx.data.len());
    out.copy_from(0, ctx.data)?;
    Ok(FilterResult::next(ctx.endpoint, out))
}
