use relay_pipe::{
    EndpointId, Filter, FilterCategory, FilterContext, FilterError, FilterOrder, FilterResult,
};

/// 缺省标记字节。
pub const DEFAULT_MARKER: [u8; 4] = [0x12, 0x34, 0xcd, 0xab];

/// 联调用的标记过滤器：发送前在报文头部加上固定标记，到达后校验并剥离。
///
/// - 到达的报文不以标记开头时截断链路，说明对端没有经过同样的过滤链；
/// - 两个阶段都在 `trace` 级别输出十六进制转储。
#[derive(Debug)]
pub struct MarkerFilter {
    endpoint: EndpointId,
    marker: Vec<u8>,
}

impl MarkerFilter {
    /// 业务自定义类，优先级 0。
    pub const ORDER: FilterOrder = FilterOrder::new(FilterCategory::Custom, 0);

    /// 使用指定标记创建过滤器。
    pub fn new(endpoint: EndpointId, marker: impl Into<Vec<u8>>) -> Self {
        Self {
            endpoint,
            marker: marker.into(),
        }
    }

    /// 使用 [`DEFAULT_MARKER`] 创建过滤器。
    pub fn with_default_marker(endpoint: EndpointId) -> Self {
        Self::new(endpoint, DEFAULT_MARKER)
    }

    /// 当前标记。
    pub fn marker(&self) -> &[u8] {
        &self.marker
    }
}

impl Filter for MarkerFilter {
    fn endpoint(&self) -> EndpointId {
        self.endpoint
    }

    fn order(&self) -> FilterOrder {
        Self::ORDER
    }

    fn name(&self) -> &'static str {
        "marker"
    }

    fn after_receive(&self, ctx: &FilterContext<'_>) -> Result<FilterResult, FilterError> {
        tracing::trace!(
            endpoint = %ctx.endpoint,
            data = %hex::encode(ctx.data),
            "marker after-receive"
        );
        let Some(payload) = ctx.data.strip_prefix(self.marker.as_slice()) else {
            tracing::debug!(
                endpoint = %ctx.endpoint,
                expected = %hex::encode(&self.marker),
                "marker missing, chain halted"
            );
            return Ok(FilterResult::halt(ctx.endpoint));
        };

        let mut out = ctx.pool.rent(payload.len());
        out.copy_from(0, payload)?;
        Ok(FilterResult::next(ctx.endpoint, out))
    }

    fn before_send(&self, ctx: &FilterContext<'_>) -> Result<FilterResult, FilterError> {
        tracing::trace!(
            endpoint = %ctx.endpoint,
            data = %hex::encode(ctx.data),
            "marker before-send"
        );
        let mut out = ctx.pool.rent(self.marker.len() + ctx.data.len());
        out.copy_from(0, &self.marker)?;
        out.copy_from(self.marker.len(), ctx.data)?;
        Ok(FilterResult::next(ctx.endpoint, out))
    }
}
