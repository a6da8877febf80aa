use relay_pipe::{
    EndpointId, Filter, FilterCategory, FilterContext, FilterError, FilterOrder, FilterResult,
    FilterStage,
};

/// SOCKS5 UDP 请求/响应头长度：2 字节 RSV + 1 字节 FRAG。
pub const SOCKS5_UDP_HEADER_LEN: usize = 3;

const NAME: &str = "udp-encapsulation";

/// 本地 UDP 中继侧的封装过滤器。
///
/// # 设计背景（Why）
/// - 本地应用看到的是带 SOCKS5 信封的报文，远端 shadowsocks 服务只接受去掉信封的报文；
///   过滤器在两个方向上补齐或剥离这 3 个字节。
///
/// # 契约说明（What）
/// - `after_receive(P)`：输出长度 `n + 3`，前 3 字节为 0，其余为 `P`；
/// - `before_send(Q)`：输出 `Q[3..]`，长度 `n - 3`；
/// - 空输入在两个阶段都返回 `proceed = false` 且不产出缓冲；
/// - 发送方向上非空但不足 3 字节的输入无法构成合法信封，按 [`FilterError::Malformed`] 报告故障。
#[derive(Debug)]
pub struct UdpEncapsulationFilter {
    endpoint: EndpointId,
}

impl UdpEncapsulationFilter {
    /// 固定排序数据：封装类，优先级 0。
    pub const ORDER: FilterOrder = FilterOrder::new(FilterCategory::Encapsulation, 0);

    /// 创建绑定到 `endpoint` 的过滤器。
    pub fn new(endpoint: EndpointId) -> Self {
        Self { endpoint }
    }
}

impl Filter for UdpEncapsulationFilter {
    fn endpoint(&self) -> EndpointId {
        self.endpoint
    }

    fn order(&self) -> FilterOrder {
        Self::ORDER
    }

    fn name(&self) -> &'static str {
        NAME
    }

    fn after_receive(&self, ctx: &FilterContext<'_>) -> Result<FilterResult, FilterError> {
        if ctx.data.is_empty() {
            tracing::warn!(
                endpoint = %ctx.endpoint,
                stage = %FilterStage::AfterReceive,
                "empty datagram, chain halted"
            );
            return Ok(FilterResult::halt(ctx.endpoint));
        }

        let mut out = ctx.pool.rent(ctx.data.len() + SOCKS5_UDP_HEADER_LEN);
        // 复用块可能残留旧数据，头部必须显式清零。
        out.copy_from(0, &[0; SOCKS5_UDP_HEADER_LEN])?;
        out.copy_from(SOCKS5_UDP_HEADER_LEN, ctx.data)?;
        Ok(FilterResult::next(ctx.endpoint, out))
    }

    fn before_send(&self, ctx: &FilterContext<'_>) -> Result<FilterResult, FilterError> {
        if ctx.data.is_empty() {
            tracing::warn!(
                endpoint = %ctx.endpoint,
                stage = %FilterStage::BeforeSend,
                "empty datagram, chain halted"
            );
            return Ok(FilterResult::halt(ctx.endpoint));
        }
        let Some(payload) = ctx.data.get(SOCKS5_UDP_HEADER_LEN..) else {
            return Err(FilterError::Malformed {
                filter: NAME,
                stage: FilterStage::BeforeSend,
                detail: format!(
                    "{} bytes cannot hold the {SOCKS5_UDP_HEADER_LEN}-byte SOCKS5 UDP header",
                    ctx.data.len()
                ),
            });
        };

        let mut out = ctx.pool.rent(payload.len());
        out.copy_from(0, payload)?;
        Ok(FilterResult::next(ctx.endpoint, out))
    }
}
