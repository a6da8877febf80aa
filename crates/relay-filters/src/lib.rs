//! `relay-filters` 提供挂载在读写端上的具体过滤器。
//!
//! # 模块定位（Why）
//! - [`UdpEncapsulationFilter`] 在本地 SOCKS5 UDP 信封与线上 shadowsocks UDP 报文之间增删 3 字节头，
//!   是过滤器契约的参考实现：两阶段互为逆变换，空输入一律截断；
//! - [`MarkerFilter`] 为报文加上固定标记并在对端剥离，用于联调时确认双向链路确实经过了过滤链。
//!
//! # 线上格式（What）
//! ```text
//! 本地信封:   | RSV(2) = 0x0000 | FRAG(1) = 0x00 | ATYP | DST.ADDR | DST.PORT | DATA |
//! 线上报文:                                      | ATYP | DST.ADDR | DST.PORT | DATA |
//! ```
//! 分片重组不受支持：到达方向总是写入全零头，发送方向不检查头内容。

mod marker;
mod udp_encapsulation;

pub use marker::{DEFAULT_MARKER, MarkerFilter};
pub use udp_encapsulation::{SOCKS5_UDP_HEADER_LEN, UdpEncapsulationFilter};
