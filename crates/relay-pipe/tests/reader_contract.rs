//! `reader_contract` 集成测试：从外部 crate 视角验证读端的读取与过滤链执行协议。
//!
//! # 测试目标（Why）
//! - 读端的每一条退出路径（传输失败、截断、故障、取消、成功）都必须把缓冲交给调用方或归还池；
//!   这里统一以池统计中的 `leaked` 与 `active_leases` 断言“不泄漏”；
//! - 过滤器执行顺序只由 `(category, priority, sequence)` 决定，与挂载先后无关。

use std::{io, sync::Arc};

use relay_buffer::SlabBufferPool;
use relay_pipe::{
    AttachError, Cancellation, Endpoint, Filter, FilterCategory, FilterOrder,
    MAX_READ_BUFFER_SIZE, PipeConfig, ReadStatus, Reader,
    testing::{CallJournal, FilterBehavior, RecordingFilter, ScriptedEndpoint, ScriptedFilter},
};
use tracing_test::traced_test;

const ENCAPSULATION: FilterOrder = FilterOrder::new(FilterCategory::Encapsulation, 0);
const CUSTOM: FilterOrder = FilterOrder::new(FilterCategory::Custom, 0);

fn reader_on(endpoint: &Arc<ScriptedEndpoint>, pool: &SlabBufferPool) -> Reader {
    let endpoint: Arc<dyn Endpoint> = endpoint.clone();
    Reader::new(endpoint, pool.clone(), &PipeConfig::default())
}

fn assert_no_outstanding(pool: &SlabBufferPool) {
    let stats = pool.stats();
    assert_eq!(stats.leaked, 0, "不得存在未归还便被丢弃的缓冲");
    assert_eq!(stats.active_leases, 0, "所有租借都应已归还");
    assert_eq!(stats.rented, stats.released);
}

/// 无过滤器时，读端原样返回传输层写入的字节。
#[tokio::test]
async fn zero_filters_return_transport_bytes_unmodified() {
    let pool = SlabBufferPool::new();
    let endpoint = Arc::new(ScriptedEndpoint::new("scripted-a"));
    endpoint.push_read(b"\x01\x7f\x00\x00\x01\x1f\x90hello");
    let mut reader = reader_on(&endpoint, &pool);

    let result = reader.read(&Cancellation::new()).await;
    assert_eq!(result.status, ReadStatus::Succeeded);
    assert_eq!(result.bytes_valid, 12);
    assert_eq!(result.data(), b"\x01\x7f\x00\x00\x01\x1f\x90hello");
    result.release();
    assert_no_outstanding(&pool);
}

/// 传输层返回 0 字节：`Failed`、无缓冲，读缓冲已归还。
#[tokio::test]
async fn zero_byte_read_fails_and_releases_receive_buffer() {
    let pool = SlabBufferPool::new();
    let endpoint = Arc::new(ScriptedEndpoint::new("scripted-eof"));
    let journal = CallJournal::new();
    let mut reader = reader_on(&endpoint, &pool);
    reader
        .apply(Arc::new(RecordingFilter::new(
            endpoint.id(),
            CUSTOM,
            "never",
            &journal,
        )))
        .expect("同端点过滤器应挂载成功");

    let result = reader.read(&Cancellation::new()).await;
    assert_eq!(result.status, ReadStatus::Failed);
    assert_eq!(result.bytes_valid, 0);
    assert!(result.buffer.is_none());
    assert!(journal.names().is_empty(), "读取失败时不执行过滤链");
    assert_eq!(pool.stats().rented, 1);
    assert_no_outstanding(&pool);
}

/// 传输错误与谎报字节数同样映射为 `Failed`。
#[tokio::test]
async fn transport_errors_and_overclaims_fail_without_leaking() {
    let pool = SlabBufferPool::new();
    let endpoint = Arc::new(ScriptedEndpoint::new("scripted-err"));
    endpoint
        .push_read_error(io::ErrorKind::ConnectionReset)
        .push_overclaim(1);
    let mut reader = reader_on(&endpoint, &pool);

    let first = reader.read(&Cancellation::new()).await;
    assert_eq!(first.status, ReadStatus::Failed);
    let second = reader.read(&Cancellation::new()).await;
    assert_eq!(second.status, ReadStatus::Failed);
    assert!(second.buffer.is_none());
    assert_no_outstanding(&pool);
}

/// 挂载顺序 `[Custom, Encapsulation]`，执行顺序仍为 `Encapsulation` 在前；
/// 排序数据相同的过滤器按挂载先后执行。
#[tokio::test]
async fn execution_order_is_determined_by_key_not_attach_order() {
    let pool = SlabBufferPool::new();
    let endpoint = Arc::new(ScriptedEndpoint::new("scripted-order"));
    endpoint.push_read(b"payload");
    let journal = CallJournal::new();
    let id = endpoint.id();
    let mut reader = reader_on(&endpoint, &pool);
    for (order, name) in [
        (CUSTOM, "custom-first"),
        (ENCAPSULATION, "encapsulation"),
        (CUSTOM, "custom-second"),
    ] {
        reader
            .apply(Arc::new(RecordingFilter::new(id, order, name, &journal)))
            .expect("挂载应成功");
    }

    let names: Vec<_> = reader.filters().iter().map(|filter| filter.name()).collect();
    assert_eq!(names, ["encapsulation", "custom-first", "custom-second"]);

    let result = reader.read(&Cancellation::new()).await;
    assert_eq!(result.status, ReadStatus::Succeeded);
    assert_eq!(result.data(), b"payload");
    assert_eq!(
        journal.names(),
        ["encapsulation", "custom-first", "custom-second"]
    );
    result.release();
    assert_no_outstanding(&pool);
}

/// 绑定到其它端点的过滤器被拒绝，且不会出现在过滤器集合中。
#[test]
fn foreign_endpoint_filter_is_rejected() {
    let pool = SlabBufferPool::new();
    let endpoint = Arc::new(ScriptedEndpoint::new("scripted-own"));
    let stranger = ScriptedEndpoint::new("scripted-stranger");
    let journal = CallJournal::new();
    let mut reader = reader_on(&endpoint, &pool);

    let foreign: Arc<dyn Filter> = Arc::new(RecordingFilter::new(
        stranger.id(),
        CUSTOM,
        "foreign",
        &journal,
    ));
    let outcome = reader.apply(foreign.clone());
    assert!(matches!(
        outcome,
        Err(AttachError::ForeignEndpoint { filter: "foreign", .. })
    ));
    assert!(reader.filters().is_empty());
    assert!(!reader.filters().contains(&foreign));
}

/// 同一实例重复挂载被拒绝。
#[test]
fn duplicate_filter_instance_is_rejected() {
    let pool = SlabBufferPool::new();
    let endpoint = Arc::new(ScriptedEndpoint::new("scripted-dup"));
    let journal = CallJournal::new();
    let mut reader = reader_on(&endpoint, &pool);
    let filter: Arc<dyn Filter> =
        Arc::new(RecordingFilter::new(endpoint.id(), CUSTOM, "once", &journal));

    reader.apply(filter.clone()).expect("首次挂载应成功");
    let err = reader.apply(filter).expect_err("重复挂载应被拒绝");
    assert_eq!(err.code(), "relay.chain.duplicate");
    assert_eq!(reader.filters().len(), 1);
}

/// 3 个过滤器中第 2 个截断：`BrokenByFilter`，第 3 个从未被调用，第 1 个的输出已归还。
#[tokio::test]
async fn halt_in_the_middle_stops_the_chain_without_leaking() {
    for behavior in [FilterBehavior::Halt, FilterBehavior::HaltWithBuffer] {
        let pool = SlabBufferPool::new();
        let endpoint = Arc::new(ScriptedEndpoint::new("scripted-halt"));
        endpoint.push_read(b"segment");
        let id = endpoint.id();
        let first = Arc::new(ScriptedFilter::new(
            id,
            FilterOrder::new(FilterCategory::Custom, 1),
            "first",
            FilterBehavior::Append(b"+1".to_vec()),
        ));
        let second = Arc::new(ScriptedFilter::new(
            id,
            FilterOrder::new(FilterCategory::Custom, 2),
            "second",
            behavior,
        ));
        let third = Arc::new(ScriptedFilter::new(
            id,
            FilterOrder::new(FilterCategory::Custom, 3),
            "third",
            FilterBehavior::PassThrough,
        ));
        let mut reader = reader_on(&endpoint, &pool);
        for filter in [third.clone(), first.clone(), second.clone()] {
            reader.apply(filter).expect("挂载应成功");
        }

        let result = reader.read(&Cancellation::new()).await;
        assert_eq!(result.status, ReadStatus::BrokenByFilter);
        assert_eq!(result.bytes_valid, 0);
        assert!(result.buffer.is_none());
        assert_eq!(first.invocations(), 1);
        assert_eq!(second.invocations(), 1);
        assert_eq!(third.invocations(), 0, "截断之后的过滤器不得被调用");
        assert_no_outstanding(&pool);
    }
}

/// 过滤器返回错误：`FilterFault`，带端点与过滤器名的错误日志，缓冲全部归还。
#[tokio::test]
#[traced_test]
async fn filter_error_is_reported_as_fault_and_logged() {
    let pool = SlabBufferPool::new();
    let endpoint = Arc::new(ScriptedEndpoint::new("scripted-fault"));
    endpoint.push_read(b"bad");
    let id = endpoint.id();
    let later = Arc::new(ScriptedFilter::new(
        id,
        CUSTOM,
        "later",
        FilterBehavior::PassThrough,
    ));
    let mut reader = reader_on(&endpoint, &pool);
    reader
        .apply(Arc::new(ScriptedFilter::new(
            id,
            ENCAPSULATION,
            "failing",
            FilterBehavior::Fail,
        )))
        .expect("挂载应成功");
    reader.apply(later.clone()).expect("挂载应成功");

    let result = reader.read(&Cancellation::new()).await;
    assert_eq!(result.status, ReadStatus::FilterFault);
    assert!(result.buffer.is_none());
    assert_eq!(later.invocations(), 0, "故障之后不得恢复执行");
    assert!(logs_contain("filter fault, chain aborted"));
    assert!(logs_contain("scripted-fault"));
    assert!(logs_contain("relay.filter.internal"));
    assert_no_outstanding(&pool);
}

/// 过滤器 panic 被捕获并视为故障。
#[tokio::test]
async fn filter_panic_is_contained_as_fault() {
    let pool = SlabBufferPool::new();
    let endpoint = Arc::new(ScriptedEndpoint::new("scripted-panic"));
    endpoint.push_read(b"boom").push_read(b"after");
    let id = endpoint.id();
    let mut reader = reader_on(&endpoint, &pool);
    reader
        .apply(Arc::new(ScriptedFilter::new(
            id,
            CUSTOM,
            "append",
            FilterBehavior::Append(b"!".to_vec()),
        )))
        .expect("挂载应成功");
    reader
        .apply(Arc::new(ScriptedFilter::new(
            id,
            FilterOrder::new(FilterCategory::Custom, 1),
            "panicking",
            FilterBehavior::Panic,
        )))
        .expect("挂载应成功");

    let result = reader.read(&Cancellation::new()).await;
    assert_eq!(result.status, ReadStatus::FilterFault);
    assert_no_outstanding(&pool);
}

/// 过滤器把结果标注到其它端点属于契约破坏，按故障处理。
#[tokio::test]
async fn misaddressed_result_is_a_fault() {
    let pool = SlabBufferPool::new();
    let endpoint = Arc::new(ScriptedEndpoint::new("scripted-misaddress"));
    endpoint.push_read(b"data");
    let stranger = ScriptedEndpoint::new("scripted-stranger");
    let mut reader = reader_on(&endpoint, &pool);
    reader
        .apply(Arc::new(ScriptedFilter::new(
            endpoint.id(),
            CUSTOM,
            "misaddress",
            FilterBehavior::Misaddress(stranger.id()),
        )))
        .expect("挂载应成功");

    let result = reader.read(&Cancellation::new()).await;
    assert_eq!(result.status, ReadStatus::FilterFault);
    assert_no_outstanding(&pool);
}

/// 读取前已取消：不租借缓冲、不调用传输层。
#[tokio::test]
async fn cancellation_before_read_skips_transport() {
    let pool = SlabBufferPool::new();
    let endpoint = Arc::new(ScriptedEndpoint::new("scripted-cancelled"));
    endpoint.push_read(b"unused");
    let mut reader = reader_on(&endpoint, &pool);
    let cancellation = Cancellation::new();
    cancellation.cancel();

    let result = reader.read(&cancellation).await;
    assert_eq!(result.status, ReadStatus::Cancelled);
    assert_eq!(endpoint.reads_served(), 0);
    assert_eq!(pool.stats().rented, 0);
}

/// 过滤器之间观察到取消：剩余过滤器不执行，返回 `Cancelled` 且不泄漏；
/// 最后一个过滤器之后的取消不影响已完成的结果。
#[tokio::test]
async fn cancellation_between_filters_truncates_remaining_steps() {
    let pool = SlabBufferPool::new();
    let endpoint = Arc::new(ScriptedEndpoint::new("scripted-mid-cancel"));
    endpoint.push_read(b"one").push_read(b"two");
    let id = endpoint.id();
    let cancellation = Cancellation::new();
    let tail = Arc::new(ScriptedFilter::new(
        id,
        CUSTOM,
        "tail",
        FilterBehavior::PassThrough,
    ));
    let mut reader = reader_on(&endpoint, &pool);
    reader
        .apply(Arc::new(ScriptedFilter::new(
            id,
            ENCAPSULATION,
            "cancel-after",
            FilterBehavior::CancelAfter(cancellation.clone()),
        )))
        .expect("挂载应成功");
    reader.apply(tail.clone()).expect("挂载应成功");

    let result = reader.read(&cancellation).await;
    assert_eq!(result.status, ReadStatus::Cancelled);
    assert!(result.buffer.is_none());
    assert_eq!(tail.invocations(), 0);
    assert_no_outstanding(&pool);

    let last_step = Cancellation::new();
    let mut solo = reader_on(&endpoint, &pool);
    solo.apply(Arc::new(ScriptedFilter::new(
        id,
        CUSTOM,
        "cancel-last",
        FilterBehavior::CancelAfter(last_step.clone()),
    )))
    .expect("挂载应成功");
    let completed = solo.read(&last_step).await;
    assert_eq!(completed.status, ReadStatus::Succeeded);
    assert_eq!(completed.data(), b"two");
    completed.release();
    assert_no_outstanding(&pool);
}

/// 过滤器以“无数据”继续：读取成功但没有缓冲，后续过滤器无可变换。
#[tokio::test]
async fn finish_without_data_succeeds_with_no_buffer() {
    let pool = SlabBufferPool::new();
    let endpoint = Arc::new(ScriptedEndpoint::new("scripted-finish"));
    endpoint.push_read(b"consumed");
    let id = endpoint.id();
    let after = Arc::new(ScriptedFilter::new(
        id,
        CUSTOM,
        "after",
        FilterBehavior::PassThrough,
    ));
    let mut reader = reader_on(&endpoint, &pool);
    reader
        .apply(Arc::new(ScriptedFilter::new(
            id,
            ENCAPSULATION,
            "finish",
            FilterBehavior::Finish,
        )))
        .expect("挂载应成功");
    reader.apply(after.clone()).expect("挂载应成功");

    let result = reader.read(&Cancellation::new()).await;
    assert!(result.is_success());
    assert_eq!(result.bytes_valid, 0);
    assert!(result.data().is_empty());
    assert_eq!(after.invocations(), 0);
    result.release();
    assert_no_outstanding(&pool);
}

/// 每一步变换都基于上一步的输出，读缓冲大小遵循配置。
#[tokio::test]
async fn each_filter_sees_previous_output() {
    let pool = SlabBufferPool::new();
    let endpoint = Arc::new(ScriptedEndpoint::new("scripted-compose"));
    endpoint.push_read(b"0123456789");
    let id = endpoint.id();
    let config = PipeConfig {
        read_buffer_size: 4,
        ..PipeConfig::default()
    };
    let dyn_endpoint: Arc<dyn Endpoint> = endpoint.clone();
    let filters: Vec<Arc<dyn Filter>> = vec![
        Arc::new(ScriptedFilter::new(
            id,
            FilterOrder::new(FilterCategory::Custom, 2),
            "suffix-b",
            FilterBehavior::Append(b"b".to_vec()),
        )),
        Arc::new(ScriptedFilter::new(
            id,
            FilterOrder::new(FilterCategory::Custom, 1),
            "suffix-a",
            FilterBehavior::Append(b"a".to_vec()),
        )),
    ];
    let mut reader = Reader::with_filters(dyn_endpoint, pool.clone(), &config, filters);
    assert_eq!(reader.buffer_size(), 4);

    let result = reader.read(&Cancellation::new()).await;
    assert_eq!(result.data(), b"0123ab", "传输层只能填满配置大小的读缓冲");
    assert_eq!(result.bytes_valid, 6);
    result.release();
    assert_no_outstanding(&pool);
}

/// 传输失败与接收日志都以端点诊断名标注。
#[tokio::test]
#[traced_test]
async fn transport_logs_carry_endpoint_label() {
    let pool = SlabBufferPool::new();
    let endpoint = Arc::new(ScriptedEndpoint::new("scripted-labelled"));
    endpoint
        .push_read(b"ok")
        .push_read_error(io::ErrorKind::ConnectionReset);
    let mut reader = reader_on(&endpoint, &pool);

    reader.read(&Cancellation::new()).await.release();
    let failed = reader.read(&Cancellation::new()).await;
    assert_eq!(failed.status, ReadStatus::Failed);

    assert!(logs_contain("received"));
    assert!(logs_contain("transport read failed"));
    assert!(logs_contain("endpoint=scripted-labelled"));
    assert_no_outstanding(&pool);
}

/// 未经校验的读缓冲大小被收敛到 `1..=MAX_READ_BUFFER_SIZE`。
#[tokio::test]
#[traced_test]
async fn unvalidated_buffer_size_is_clamped() {
    let pool = SlabBufferPool::new();
    let endpoint = Arc::new(ScriptedEndpoint::new("scripted-clamp"));
    endpoint.push_read(b"xyz");
    let as_dyn: Arc<dyn Endpoint> = endpoint.clone();

    let zero = PipeConfig {
        read_buffer_size: 0,
        ..PipeConfig::default()
    };
    let mut reader = Reader::new(as_dyn.clone(), pool.clone(), &zero);
    assert_eq!(reader.buffer_size(), 1);
    assert!(logs_contain("read buffer size clamped"));

    let result = reader.read(&Cancellation::new()).await;
    assert_eq!(result.status, ReadStatus::Succeeded);
    assert_eq!(result.data(), b"x");
    result.release();

    let huge = PipeConfig {
        read_buffer_size: MAX_READ_BUFFER_SIZE * 4,
        ..PipeConfig::default()
    };
    let reader = Reader::new(as_dyn, pool.clone(), &huge);
    assert_eq!(reader.buffer_size(), MAX_READ_BUFFER_SIZE);
    assert_no_outstanding(&pool);
}
