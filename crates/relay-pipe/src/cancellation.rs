use core::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// 协作式取消令牌。
///
/// # 设计背景（Why）
/// - 读端只在两个位置观察取消：发起传输读取之前，以及相邻两个过滤器之间；
///   正在执行的传输读取与过滤器调用永远不会被强行打断。
///
/// # 契约说明（What）
/// - 克隆或 [`child`](Self::child) 得到的令牌共享同一原子位，任一处取消对全部可见；
/// - 取消不可撤销。
#[derive(Clone, Debug)]
pub struct Cancellation {
    inner: Arc<AtomicBool>,
}

impl Cancellation {
    /// 创建处于“未取消”状态的令牌。
    pub fn new() -> Self {
        Self {
            inner: Arc::new(AtomicBool::new(false)),
        }
    }

    /// 查询是否已被取消。
    pub fn is_cancelled(&self) -> bool {
        self.inner.load(Ordering::Acquire)
    }

    /// 标记取消。
    ///
    /// 返回 `true` 表示本次调用首次触发取消；返回 `false` 表示之前已被取消。
    pub fn cancel(&self) -> bool {
        self.inner
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// 派生共享同一原子位的子令牌。
    pub fn child(&self) -> Self {
        self.clone()
    }
}

impl Default for Cancellation {
    fn default() -> Self {
        Self::new()
    }
}
