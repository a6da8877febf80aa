//! `pair_contract` 集成测试：配对寻址与单方向转发。

use std::sync::Arc;

use relay_buffer::SlabBufferPool;
use relay_pipe::{
    Cancellation, Endpoint, EndpointId, FilterCategory, FilterOrder, PairError, PipeConfig,
    Reader, ReaderPair, StopReason, Writer, WriterPair, forward,
    testing::{FilterBehavior, ScriptedEndpoint, ScriptedFilter},
};

fn reader_on(endpoint: &Arc<ScriptedEndpoint>, pool: &SlabBufferPool) -> Reader {
    let endpoint: Arc<dyn Endpoint> = endpoint.clone();
    Reader::new(endpoint, pool.clone(), &PipeConfig::default())
}

fn writer_on(endpoint: &Arc<ScriptedEndpoint>, pool: &SlabBufferPool) -> Writer {
    let endpoint: Arc<dyn Endpoint> = endpoint.clone();
    Writer::new(endpoint, pool.clone())
}

/// `reader_for` 对两个绑定端点分别返回对应读端，对第三个端点失败。
#[test]
fn reader_for_resolves_each_side_and_rejects_strangers() {
    let pool = SlabBufferPool::new();
    let left = Arc::new(ScriptedEndpoint::new("left"));
    let right = Arc::new(ScriptedEndpoint::new("right"));
    let mut pair = ReaderPair::new(reader_on(&left, &pool), reader_on(&right, &pool))
        .expect("端点不同的读端应能配对");

    let found_left = pair.reader_for(left.id()).expect("左侧应命中");
    assert_eq!(found_left.endpoint_id(), left.id());
    let found_right = pair.reader_for(right.id()).expect("右侧应命中");
    assert_eq!(found_right.endpoint_id(), right.id());

    let stranger = EndpointId::allocate();
    let err = pair.reader_for(stranger).expect_err("第三个端点不属于配对");
    assert_eq!(err, PairError::UnknownEndpoint(stranger));
    assert_eq!(err.code(), "relay.pair.unknown_endpoint");
}

/// 两侧绑定同一端点时拒绝配对；装配被拒后配对保持不变。
#[test]
fn same_endpoint_on_both_sides_is_rejected() {
    let pool = SlabBufferPool::new();
    let shared = Arc::new(ScriptedEndpoint::new("shared"));
    let other = Arc::new(ScriptedEndpoint::new("other"));

    let err = ReaderPair::new(reader_on(&shared, &pool), reader_on(&shared, &pool))
        .expect_err("同端点不得配对");
    assert_eq!(err, PairError::SameEndpoint(shared.id()));

    let mut pair = ReaderPair::empty();
    assert!(
        pair.assign_a(reader_on(&shared, &pool))
            .expect("空配对可装配")
            .is_none()
    );
    assert_eq!(
        pair.assign_b(reader_on(&shared, &pool)).map(|_| ()),
        Err(PairError::SameEndpoint(shared.id()))
    );
    assert!(pair.b().is_none());
    pair.assign_b(reader_on(&other, &pool))
        .expect("不同端点应装配成功");
    assert!(pair.is_complete());
    assert_eq!(
        pair.other(shared.id()).map(Reader::endpoint_id),
        Ok(other.id())
    );
}

/// 写端配对同样按端点寻址。
#[test]
fn writer_pair_routes_by_endpoint() {
    let pool = SlabBufferPool::new();
    let left = Arc::new(ScriptedEndpoint::new("left"));
    let right = Arc::new(ScriptedEndpoint::new("right"));
    let mut pair = WriterPair::new(writer_on(&left, &pool), writer_on(&right, &pool))
        .expect("端点不同");

    assert_eq!(
        pair.writer_for(right.id()).map(|writer| writer.endpoint_id()),
        Ok(right.id())
    );
    let (a, b) = pair.split_mut();
    assert_eq!(a.map(|writer| writer.endpoint_id()), Some(left.id()));
    assert_eq!(b.map(|writer| writer.endpoint_id()), Some(right.id()));
}

/// 转发循环：读到的报文经过过滤链写到对端，被截断的报文计为丢弃，流结束时停止。
#[tokio::test]
async fn forward_relays_until_end_of_stream() {
    let pool = SlabBufferPool::new();
    let source = Arc::new(ScriptedEndpoint::new("source"));
    let sink = Arc::new(ScriptedEndpoint::new("sink"));
    source.push_read(b"first").push_read(b"second");

    let mut reader = reader_on(&source, &pool);
    reader
        .apply(Arc::new(ScriptedFilter::new(
            source.id(),
            FilterOrder::new(FilterCategory::Custom, 0),
            "tag",
            FilterBehavior::Append(b"#".to_vec()),
        )))
        .expect("挂载应成功");
    let mut writer = writer_on(&sink, &pool);

    let report = forward(&mut reader, &mut writer, &Cancellation::new()).await;
    assert_eq!(report.stop, StopReason::ReadFailed);
    assert_eq!(report.packets, 2);
    assert_eq!(report.bytes, 13);
    assert_eq!(report.dropped, 0);
    assert_eq!(sink.written(), [b"first#".to_vec(), b"second#".to_vec()]);
    assert_eq!(pool.stats().leaked, 0);
    assert_eq!(pool.stats().active_leases, 0);
}

#[tokio::test]
async fn forward_drops_halted_packets_and_stops_on_write_failure() {
    let pool = SlabBufferPool::new();
    let source = Arc::new(ScriptedEndpoint::new("source"));
    let sink = Arc::new(ScriptedEndpoint::new("sink"));
    source.push_read(b"a").push_read(b"b");
    sink.fail_writes();

    let mut reader = reader_on(&source, &pool);
    let mut writer = writer_on(&sink, &pool);
    let report = forward(&mut reader, &mut writer, &Cancellation::new()).await;
    assert_eq!(report.stop, StopReason::WriteFailed);
    assert_eq!(report.packets, 0);

    let halting_source = Arc::new(ScriptedEndpoint::new("halting"));
    let healthy_sink = Arc::new(ScriptedEndpoint::new("healthy"));
    halting_source.push_read(b"x").push_read(b"y");
    let mut halting = reader_on(&halting_source, &pool);
    halting
        .apply(Arc::new(ScriptedFilter::new(
            halting_source.id(),
            FilterOrder::new(FilterCategory::Custom, 0),
            "halt",
            FilterBehavior::Halt,
        )))
        .expect("挂载应成功");
    let mut healthy = writer_on(&healthy_sink, &pool);
    let report = forward(&mut halting, &mut healthy, &Cancellation::new()).await;
    assert_eq!(report.stop, StopReason::ReadFailed);
    assert_eq!(report.dropped, 2);
    assert!(healthy_sink.written().is_empty());
    assert_eq!(pool.stats().leaked, 0);
    assert_eq!(pool.stats().active_leases, 0);
}

#[tokio::test]
async fn forward_honours_prior_cancellation() {
    let pool = SlabBufferPool::new();
    let source = Arc::new(ScriptedEndpoint::new("source"));
    let sink = Arc::new(ScriptedEndpoint::new("sink"));
    source.push_read(b"never");
    let cancellation = Cancellation::new();
    cancellation.cancel();

    let report = forward(
        &mut reader_on(&source, &pool),
        &mut writer_on(&sink, &pool),
        &cancellation,
    )
    .await;
    assert_eq!(report.stop, StopReason::Cancelled);
    assert_eq!(source.reads_served(), 0);
}
