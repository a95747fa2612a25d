//! `bounded_copy_contract` 集成测试：以管道为源，按时间线重放有界拷贝的四种结局。
//!
//! # 测试目标（Why）
//! - 无数据时必须在截止时间之后、且不远超截止时间时返回超时；
//! - 延迟到达的数据、停止字节与有序结束都应返回“完成”，且汇中只包含应拷贝的字节；
//! - 源或汇被关闭后再次拷贝只能是失败，绝不能伪装成超时或完成。
//!
//! # 结构安排（How）
//! - `copy_timeline_over_pipe` 在同一条管道上依次执行五个阶段，前一阶段未消费的字节
//!   自然成为下一阶段的输入，与真实的流式消费方式一致。

use std::thread;
use std::time::{Duration, Instant};

use spark_pipe::{
    BoundedCopy, CompletionReason, CopyOutcome, CopyPolicy, PipeError, StopBytes, copy_bounded,
    pipe, read_exact_within,
};

fn elapsed_between(started: Instant, min: Duration, max: Duration) {
    let elapsed = started.elapsed();
    assert!(elapsed >= min, "耗时过短: {elapsed:?} < {min:?}");
    assert!(elapsed < max, "耗时过长: {elapsed:?} >= {max:?}");
}

#[test]
fn copy_timeline_over_pipe() {
    let (dst, src) = pipe();
    let mut out = Vec::new();

    // 阶段一：无数据，超时
    let started = Instant::now();
    let outcome = copy_bounded(
        &src,
        &mut out,
        Duration::from_millis(1000),
        5,
        StopBytes::empty(),
    )
    .unwrap();
    assert_eq!(outcome, CopyOutcome::TimedOut { copied: 0 });
    assert!(out.is_empty());
    elapsed_between(started, Duration::from_millis(1000), Duration::from_millis(2000));

    thread::scope(|s| {
        // 阶段二：延迟到达、多于所需的数据
        s.spawn(|| {
            thread::sleep(Duration::from_millis(500));
            dst.write(&[1, 2, 3, 4, 5, 6, 7, 8, 9, 10]).unwrap();
        });
        let started = Instant::now();
        let outcome = copy_bounded(
            &src,
            &mut out,
            Duration::from_millis(2000),
            5,
            StopBytes::empty(),
        )
        .unwrap();
        assert_eq!(
            outcome,
            CopyOutcome::Completed {
                copied: 5,
                reason: CompletionReason::MaxBytes
            }
        );
        assert_eq!(out, [1, 2, 3, 4, 5]);
        elapsed_between(started, Duration::from_millis(500), Duration::from_millis(3000));
    });
    out.clear();

    // 阶段三：停止字节，停在第一个命中的字节之后
    let started = Instant::now();
    let outcome = copy_bounded(
        &src,
        &mut out,
        Duration::from_millis(2000),
        5,
        [9u8, 7],
    )
    .unwrap();
    assert_eq!(
        outcome,
        CopyOutcome::Completed {
            copied: 2,
            reason: CompletionReason::StopByte(7)
        }
    );
    assert_eq!(out, [6, 7]);
    elapsed_between(started, Duration::ZERO, Duration::from_millis(500));
    out.clear();

    thread::scope(|s| {
        // 阶段四：写端延迟关闭，有序结束
        s.spawn(|| {
            thread::sleep(Duration::from_millis(500));
            dst.close();
        });
        let started = Instant::now();
        let outcome = copy_bounded(
            &src,
            &mut out,
            Duration::from_millis(10_000),
            10,
            StopBytes::empty(),
        )
        .unwrap();
        assert_eq!(
            outcome,
            CopyOutcome::Completed {
                copied: 3,
                reason: CompletionReason::EndOfStream
            }
        );
        assert_eq!(out, [8, 9, 10]);
        elapsed_between(started, Duration::from_millis(500), Duration::from_millis(1000));
    });
    out.clear();

    // 阶段五：两端均已关闭，只能失败
    dst.close();
    src.close();
    let err = copy_bounded(
        &src,
        &mut out,
        Duration::from_millis(10_000),
        10,
        StopBytes::empty(),
    )
    .unwrap_err();
    assert!(matches!(err, PipeError::Closed), "{err:?}");
    assert!(out.is_empty());
}

#[test]
fn closed_sink_fails_the_copy_with_its_own_error() {
    let (input, src) = pipe();
    let (dst, drained) = pipe();
    input.write(&[1, 2, 3]).unwrap();
    drained.close();

    let err = BoundedCopy::new(Duration::from_secs(1))
        .max_bytes(3)
        .run(&src, &dst)
        .unwrap_err();
    assert!(matches!(err, PipeError::Closed), "{err:?}");
}

#[test]
fn copy_into_pipe_sink_preserves_order() {
    let (input, src) = pipe();
    let (dst, output) = pipe();
    input.write(b"hello\nworld\n").unwrap();

    let outcome = BoundedCopy::new(Duration::from_secs(1))
        .stop_bytes([b'\n'])
        .run(&src, &dst)
        .unwrap();
    assert_eq!(
        outcome,
        CopyOutcome::Completed {
            copied: 6,
            reason: CompletionReason::StopByte(b'\n')
        }
    );
    assert_eq!(output.available().unwrap(), 6);

    let mut line = [0u8; 6];
    assert_eq!(output.read(&mut line).unwrap(), 6);
    assert_eq!(&line, b"hello\n");
}

#[test]
fn forced_close_during_copy_is_a_failure() {
    let (_dst, src) = pipe();
    let mut out = Vec::new();

    thread::scope(|s| {
        s.spawn(|| {
            thread::sleep(Duration::from_millis(100));
            src.close();
        });
        let err = BoundedCopy::new(Duration::from_secs(5))
            .policy(CopyPolicy::default().with_poll_interval(Duration::from_secs(1)))
            .run(&src, &mut out)
            .unwrap_err();
        assert!(
            matches!(err, PipeError::ForcedClose | PipeError::Closed),
            "{err:?}"
        );
    });
}

#[test]
fn absolute_deadline_in_the_past_times_out_immediately() {
    let (dst, src) = pipe();
    dst.write(&[1]).unwrap();
    let mut out = Vec::new();
    let outcome = BoundedCopy::new(Duration::from_secs(1))
        .run_until(&src, &mut out, Instant::now())
        .unwrap();
    assert!(outcome.is_timed_out());
    assert_eq!(outcome.copied(), 0);
    assert_eq!(src.available().unwrap(), 1);
}

#[test]
fn read_exact_within_waits_for_late_bytes() {
    let (dst, src) = pipe();

    thread::scope(|s| {
        s.spawn(|| {
            dst.write(&[1, 2]).unwrap();
            thread::sleep(Duration::from_millis(100));
            dst.write(&[3, 4, 5]).unwrap();
        });
        let bytes =
            read_exact_within(&src, 4, Duration::from_secs(2), &CopyPolicy::default()).unwrap();
        assert_eq!(bytes, [1, 2, 3, 4]);
    });

    let err = read_exact_within(&src, 2, Duration::from_millis(100), &CopyPolicy::default())
        .unwrap_err();
    assert!(matches!(
        err,
        PipeError::Truncated {
            expected: 2,
            received: 1
        }
    ));
}

#[test]
fn unrepresentable_timeout_copies_without_a_deadline() {
    let (dst, src) = pipe();
    dst.write(&[1, 2, 3]).unwrap();
    let mut out = Vec::new();

    let outcome = BoundedCopy::new(Duration::MAX)
        .max_bytes(3)
        .run(&src, &mut out)
        .unwrap();
    assert_eq!(
        outcome,
        CopyOutcome::Completed {
            copied: 3,
            reason: CompletionReason::MaxBytes
        }
    );
    assert_eq!(out, [1, 2, 3]);
    out.clear();

    thread::scope(|s| {
        s.spawn(|| {
            thread::sleep(Duration::from_millis(100));
            dst.write(&[4]).unwrap();
            dst.close();
        });
        let outcome = copy_bounded(
            &src,
            &mut out,
            Duration::MAX,
            usize::MAX,
            StopBytes::empty(),
        )
        .unwrap();
        assert_eq!(
            outcome,
            CopyOutcome::Completed {
                copied: 1,
                reason: CompletionReason::EndOfStream
            }
        );
    });
    assert_eq!(out, [4]);
}

#[test]
fn read_exact_within_accepts_unbounded_timeout() {
    let (dst, src) = pipe();
    dst.write(&[7, 8, 9]).unwrap();
    let bytes = read_exact_within(&src, 2, Duration::MAX, &CopyPolicy::default()).unwrap();
    assert_eq!(bytes, [7, 8]);
    assert_eq!(src.available().unwrap(), 1);
}
