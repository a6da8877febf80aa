use crate::{EndpointId, PairError, Reader, Writer};

/// 绑定到单一端点的组件，配对据此定位两侧。
pub trait EndpointBound {
    /// 组件所属端点。
    fn endpoint_id(&self) -> EndpointId;
}

impl EndpointBound for Reader {
    fn endpoint_id(&self) -> EndpointId {
        Reader::endpoint_id(self)
    }
}

impl EndpointBound for Writer {
    fn endpoint_id(&self) -> EndpointId {
        Writer::endpoint_id(self)
    }
}

/// 双向中继的两侧组件，A 与 B 必须绑定不同端点。
///
/// # 设计背景（Why）
/// - 双向中继的每个方向都要通过“这段字节来自哪个端点”找到对应的过滤链；
///   配对是这一寻址关系的唯一持有者。
///
/// # 契约说明（What）
/// - 配对拥有两侧组件，同一个组件不可能同时出现在两侧；
/// - 任一侧装配时若与另一侧端点相同，返回 [`PairError::SameEndpoint`]，配对保持不变；
/// - 按端点查询时，不属于任一已装配侧的端点返回 [`PairError::UnknownEndpoint`]。
#[derive(Debug)]
pub struct EndpointPair<T> {
    a: Option<T>,
    b: Option<T>,
}

/// 读端配对。
pub type ReaderPair = EndpointPair<Reader>;

/// 写端配对。
pub type WriterPair = EndpointPair<Writer>;

impl<T: EndpointBound> EndpointPair<T> {
    /// 以两侧组件构造配对。
    pub fn new(a: T, b: T) -> Result<Self, PairError> {
        let id = a.endpoint_id();
        if id == b.endpoint_id() {
            return Err(PairError::SameEndpoint(id));
        }
        Ok(Self {
            a: Some(a),
            b: Some(b),
        })
    }

    /// 两侧均未装配的配对。
    pub fn empty() -> Self {
        Self { a: None, b: None }
    }

    /// 装配 A 侧，返回被替换的旧组件。
    pub fn assign_a(&mut self, value: T) -> Result<Option<T>, PairError> {
        Self::check_distinct(&value, self.b.as_ref())?;
        Ok(self.a.replace(value))
    }

    /// 装配 B 侧，返回被替换的旧组件。
    pub fn assign_b(&mut self, value: T) -> Result<Option<T>, PairError> {
        Self::check_distinct(&value, self.a.as_ref())?;
        Ok(self.b.replace(value))
    }

    /// A 侧组件。
    pub fn a(&self) -> Option<&T> {
        self.a.as_ref()
    }

    /// B 侧组件。
    pub fn b(&self) -> Option<&T> {
        self.b.as_ref()
    }

    /// 两侧是否都已装配。
    pub fn is_complete(&self) -> bool {
        self.a.is_some() && self.b.is_some()
    }

    /// 按端点查找所属一侧。
    pub fn get(&self, endpoint: EndpointId) -> Result<&T, PairError> {
        match self.side_of(endpoint) {
            Some(Side::A) => self.a.as_ref().ok_or(PairError::Vacant("a")),
            Some(Side::B) => self.b.as_ref().ok_or(PairError::Vacant("b")),
            None => Err(PairError::UnknownEndpoint(endpoint)),
        }
    }

    /// 按端点查找所属一侧的可变引用。
    pub fn get_mut(&mut self, endpoint: EndpointId) -> Result<&mut T, PairError> {
        match self.side_of(endpoint) {
            Some(Side::A) => self.a.as_mut().ok_or(PairError::Vacant("a")),
            Some(Side::B) => self.b.as_mut().ok_or(PairError::Vacant("b")),
            None => Err(PairError::UnknownEndpoint(endpoint)),
        }
    }

    /// 与 `endpoint` 相对的另一侧，用于把一个方向的数据路由到对端。
    pub fn other(&self, endpoint: EndpointId) -> Result<&T, PairError> {
        match self.side_of(endpoint) {
            Some(Side::A) => self.b.as_ref().ok_or(PairError::Vacant("b")),
            Some(Side::B) => self.a.as_ref().ok_or(PairError::Vacant("a")),
            None => Err(PairError::UnknownEndpoint(endpoint)),
        }
    }

    /// 同时借出两侧的可变引用，供两个方向在同一任务内并发推进。
    pub fn split_mut(&mut self) -> (Option<&mut T>, Option<&mut T>) {
        (self.a.as_mut(), self.b.as_mut())
    }

    /// 拆出两侧组件，供两个方向分别移交到独立任务。
    pub fn into_parts(self) -> (Option<T>, Option<T>) {
        (self.a, self.b)
    }

    fn side_of(&self, endpoint: EndpointId) -> Option<Side> {
        if self.a.as_ref().map(T::endpoint_id) == Some(endpoint) {
            Some(Side::A)
        } else if self.b.as_ref().map(T::endpoint_id) == Some(endpoint) {
            Some(Side::B)
        } else {
            None
        }
    }

    fn check_distinct(value: &T, other: Option<&T>) -> Result<(), PairError> {
        let id = value.endpoint_id();
        match other {
            Some(other) if other.endpoint_id() == id => Err(PairError::SameEndpoint(id)),
            _ => Ok(()),
        }
    }
}

impl<T: EndpointBound> Default for EndpointPair<T> {
    fn default() -> Self {
        Self::empty()
    }
}

impl ReaderPair {
    /// 返回绑定到 `endpoint` 的读端。
    pub fn reader_for(&mut self, endpoint: EndpointId) -> Result<&mut Reader, PairError> {
        self.get_mut(endpoint)
    }
}

impl WriterPair {
    /// 返回绑定到 `endpoint` 的写端。
    pub fn writer_for(&mut self, endpoint: EndpointId) -> Result<&mut Writer, PairError> {
        self.get_mut(endpoint)
    }
}

#[derive(Clone, Copy)]
enum Side {
    A,
    B,
}
