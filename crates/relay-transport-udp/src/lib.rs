#![doc = r#"
# relay-transport-udp

## 模块使命（Why）
- 为数据面提供真实的 UDP 端点：[`UdpEndpoint`] 把 Tokio `UdpSocket` 适配为 `relay_pipe::Endpoint`，
  读写端无需感知套接字细节即可在其上运行过滤链。

## 核心契约（What）
- 端点在 `bind` 时分配进程内唯一的 `EndpointId`，之后 `connect` 不改变身份；
- `read` 对应一次 `recv`，`write` 对应一次 `send`，均要求先 `connect` 到对端；
- 读写开始前若已观察到取消，返回 `ErrorKind::Interrupted`，读写端将其映射为失败；
- 报文长于调用方缓冲时返回 `ErrorKind::InvalidData`，绝不把截断后的报文当作完整帧交出。

## 实现策略（How）
- 绑定与连接直接委托给 Tokio，失败时以 [`UdpError`] 携带地址与底层错误；
- 诊断名在绑定/连接后预先格式化，`display()` 只做借用；
- 内核会静默截断放不下的报文，因此小于 [`MAX_DATAGRAM_SIZE`] 的读取先收进比调用方缓冲多 1 字节的
  暂存区，收到的字节数超出调用方缓冲即判定为超长。
"#]

use std::{borrow::Cow, io, mem, net::SocketAddr};

use async_trait::async_trait;
use relay_pipe::{Cancellation, Endpoint, EndpointId};
use spin::Mutex;
use thiserror::Error;
use tokio::net::UdpSocket;

/// 单个 UDP 报文的最大长度；不小于该值的读缓冲不可能被截断。
pub const MAX_DATAGRAM_SIZE: usize = 65_535;

/// UDP 端点的建立错误。
#[derive(Debug, Error)]
pub enum UdpError {
    /// 绑定失败。
    #[error("failed to bind udp socket to {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        source: io::Error,
    },
    /// 连接（设置默认对端）失败。
    #[error("failed to connect udp socket to {peer}: {source}")]
    Connect {
        peer: SocketAddr,
        source: io::Error,
    },
    /// 查询本地地址失败。
    #[error("failed to query udp local address: {0}")]
    LocalAddr(#[source] io::Error),
}

impl UdpError {
    /// 稳定错误码。
    pub fn code(&self) -> &'static str {
        match self {
            UdpError::Bind { .. } => "relay.udp.bind",
            UdpError::Connect { .. } => "relay.udp.connect",
            UdpError::LocalAddr(_) => "relay.udp.local_addr",
        }
    }
}

/// 封装 Tokio `UdpSocket` 的中继端点。
///
/// # Why
/// - 本地 UDP 中继的两侧（应用侧与远端服务侧）各是一个已连接的 UDP 套接字，
///   每一侧由一个读端和一个写端共享。
///
/// # What
/// - 通过 `Arc<UdpEndpoint>` 在读端与写端之间共享；`recv` 与 `send` 可并发进行。
#[derive(Debug)]
pub struct UdpEndpoint {
    id: EndpointId,
    sock: UdpSocket,
    local: SocketAddr,
    peer: Option<SocketAddr>,
    label: String,
    scratch: Mutex<Vec<u8>>,
}

impl UdpEndpoint {
    /// 绑定到 `addr`；端口为 0 时由系统分配。
    pub async fn bind(addr: SocketAddr) -> Result<Self, UdpError> {
        let sock = UdpSocket::bind(addr)
            .await
            .map_err(|source| UdpError::Bind { addr, source })?;
        let local = sock.local_addr().map_err(UdpError::LocalAddr)?;
        let id = EndpointId::allocate();
        tracing::debug!(endpoint = %id, %local, "udp endpoint bound");
        Ok(Self {
            id,
            sock,
            local,
            peer: None,
            label: format!("udp://{local}"),
            scratch: Mutex::new(Vec::new()),
        })
    }

    /// 把默认对端设置为 `peer`；之后只接收来自该对端的报文。
    pub async fn connect(mut self, peer: SocketAddr) -> Result<Self, UdpError> {
        self.sock
            .connect(peer)
            .await
            .map_err(|source| UdpError::Connect { peer, source })?;
        self.peer = Some(peer);
        self.label = format!("udp://{}->{peer}", self.local);
        tracing::debug!(
            endpoint = %self.id,
            local = %self.local,
            %peer,
            "udp endpoint connected"
        );
        Ok(self)
    }

    /// 本地绑定地址。
    pub fn local_addr(&self) -> SocketAddr {
        self.local
    }

    /// 已连接的对端。
    pub fn peer(&self) -> Option<SocketAddr> {
        self.peer
    }

    fn ensure_ready(&self, cancellation: &Cancellation) -> io::Result<()> {
        if cancellation.is_cancelled() {
            return Err(io::Error::new(
                io::ErrorKind::Interrupted,
                "udp operation cancelled",
            ));
        }
        if self.peer.is_none() {
            return Err(io::Error::new(
                io::ErrorKind::NotConnected,
                "udp endpoint has no peer",
            ));
        }
        Ok(())
    }

    /// 接收一个报文，长于 `buf` 时返回 `InvalidData`。
    ///
    /// 暂存区在等待期间被取出，并发读取各自分配，互不阻塞。
    async fn recv_whole(&self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.len() >= MAX_DATAGRAM_SIZE {
            return self.sock.recv(buf).await;
        }

        let mut scratch = mem::take(&mut *self.scratch.lock());
        scratch.resize(buf.len() + 1, 0);
        let outcome = match self.sock.recv(&mut scratch).await {
            Ok(count) if count > buf.len() => {
                tracing::warn!(
                    endpoint = %self.id,
                    capacity = buf.len(),
                    "udp datagram larger than read buffer"
                );
                Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("udp datagram exceeds {} byte read buffer", buf.len()),
                ))
            }
            Ok(count) => {
                buf[..count].copy_from_slice(&scratch[..count]);
                Ok(count)
            }
            Err(error) => Err(error),
        };
        *self.scratch.lock() = scratch;
        outcome
    }
}

#[async_trait]
impl Endpoint for UdpEndpoint {
    fn id(&self) -> EndpointId {
        self.id
    }

    fn display(&self) -> Cow<'_, str> {
        Cow::Borrowed(&self.label)
    }

    async fn read(&self, buf: &mut [u8], cancellation: &Cancellation) -> io::Result<usize> {
        self.ensure_ready(cancellation)?;
        self.recv_whole(buf).await
    }

    async fn write(&self, data: &[u8], cancellation: &Cancellation) -> io::Result<usize> {
        self.ensure_ready(cancellation)?;
        self.sock.send(data).await
    }
}
