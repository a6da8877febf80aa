use crate::{Cancellation, ReadStatus, Reader, WriteStatus, Writer};

/// 转发循环停止的原因。
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum StopReason {
    /// 读端报告流结束或传输错误。
    ReadFailed,
    /// 写端传输失败。
    WriteFailed,
    /// 观察到取消。
    Cancelled,
}

/// 单方向转发的统计。
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ForwardReport {
    /// 成功写出的报文数。
    pub packets: u64,
    /// 成功写出的字节数。
    pub bytes: u64,
    /// 被过滤器截断或故障而丢弃的报文数（读写两侧合计）。
    pub dropped: u64,
    pub stop: StopReason,
}

/// 把 `reader` 读到的数据持续写入 `writer`，直到流结束、写失败或取消。
///
/// # 执行协议（How）
/// - 读端 `BrokenByFilter` / `FilterFault`：丢弃该报文并继续读取；
/// - 读端成功但链路以“无数据”完成：没有可发送内容，继续读取；
/// - 读端成功且携带缓冲：缓冲所有权移交写端，写端负责归还；
/// - 写端 `BrokenByFilter` / `FilterFault`：计为丢弃并继续。
///
/// # 契约（What）
/// - 循环内不持有任何缓冲跨越迭代，返回时不存在未归还的缓冲。
pub async fn forward(
    reader: &mut Reader,
    writer: &mut Writer,
    cancellation: &Cancellation,
) -> ForwardReport {
    let mut report = ForwardReport {
        packets: 0,
        bytes: 0,
        dropped: 0,
        stop: StopReason::Cancelled,
    };

    loop {
        if cancellation.is_cancelled() {
            report.stop = StopReason::Cancelled;
            break;
        }

        let read = reader.read(cancellation).await;
        let status = read.status;
        let buffer = match status {
            ReadStatus::Succeeded => match read.into_buffer() {
                Some(buffer) => buffer,
                None => continue,
            },
            ReadStatus::BrokenByFilter | ReadStatus::FilterFault => {
                report.dropped += 1;
                read.release();
                continue;
            }
            ReadStatus::Failed => {
                report.stop = StopReason::ReadFailed;
                read.release();
                break;
            }
            ReadStatus::Cancelled => {
                report.stop = StopReason::Cancelled;
                read.release();
                break;
            }
        };

        let written = writer.write(buffer, cancellation).await;
        match written.status {
            WriteStatus::Succeeded => {
                if written.bytes_written > 0 {
                    report.packets += 1;
                    report.bytes += written.bytes_written as u64;
                }
            }
            WriteStatus::BrokenByFilter | WriteStatus::FilterFault => report.dropped += 1,
            WriteStatus::Failed => {
                report.stop = StopReason::WriteFailed;
                break;
            }
            WriteStatus::Cancelled => {
                report.stop = StopReason::Cancelled;
                break;
            }
        }
    }

    tracing::debug!(
        reader = %reader.endpoint().display(),
        writer = %writer.endpoint().display(),
        packets = report.packets,
        bytes = report.bytes,
        dropped = report.dropped,
        stop = ?report.stop,
        "forwarding stopped"
    );
    report
}
