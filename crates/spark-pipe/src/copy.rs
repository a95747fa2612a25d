use std::io::Write;
use std::thread;
use std::time::{Duration, Instant};

use crate::Result;
use crate::config::CopyPolicy;
use crate::error::{Operation, PipeError};
use crate::pipe::Source;

/// 非阻塞探测的结果。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Readiness {
    /// 至少有这么多字节可以不阻塞地读取。
    Ready(usize),
    /// 暂无数据，对端仍可能写入。
    Pending,
    /// 对端已有序结束，且没有剩余数据。
    Ended,
}

/// 有界拷贝所需的读侧能力集合。
///
/// # 设计背景（Why）
/// - 有界拷贝不能假设源自身支持带截止时间的读取，因此只要求两项最小能力：
///   非阻塞探测与单字节阻塞读取；
/// - 探测必须能区分“暂无数据”与“对端已关闭”，否则关闭的源只会表现为永远没有数据，
///   最终被误报为超时。
///
/// # 契约说明（What）
/// - `probe`：绝不阻塞；
/// - `read_byte`：仅在 `probe` 报告 `Ready` 或 `Ended` 后调用，此时不得无限阻塞，
///   `None` 表示数据结束；
/// - `wait_readable`：最多等待 `timeout`，可以提前返回；默认实现直接休眠，
///   能感知写入的源（如 [`Source`]）应覆盖它以便数据到达时立即唤醒。
pub trait ByteSource {
    fn probe(&mut self) -> Result<Readiness>;

    fn read_byte(&mut self) -> Result<Option<u8>>;

    fn wait_readable(&mut self, timeout: Duration) -> Result<()> {
        thread::sleep(timeout);
        Ok(())
    }
}

impl<S: ByteSource + ?Sized> ByteSource for &mut S {
    fn probe(&mut self) -> Result<Readiness> {
        (**self).probe()
    }

    fn read_byte(&mut self) -> Result<Option<u8>> {
        (**self).read_byte()
    }

    fn wait_readable(&mut self, timeout: Duration) -> Result<()> {
        (**self).wait_readable(timeout)
    }
}

impl ByteSource for &Source {
    fn probe(&mut self) -> Result<Readiness> {
        Source::probe(self)
    }

    fn read_byte(&mut self) -> Result<Option<u8>> {
        Source::read_byte(self)
    }

    fn wait_readable(&mut self, timeout: Duration) -> Result<()> {
        Source::wait_readable(self, timeout)
    }
}

impl ByteSource for Source {
    fn probe(&mut self) -> Result<Readiness> {
        Source::probe(self)
    }

    fn read_byte(&mut self) -> Result<Option<u8>> {
        Source::read_byte(self)
    }

    fn wait_readable(&mut self, timeout: Duration) -> Result<()> {
        Source::wait_readable(self, timeout)
    }
}

/// 停止字节集合，以 256 位位图表示。
#[derive(Clone, Copy, Default, PartialEq, Eq)]
pub struct StopBytes {
    bits: [u64; 4],
}

impl StopBytes {
    pub const fn empty() -> Self {
        Self { bits: [0; 4] }
    }

    pub fn insert(&mut self, byte: u8) {
        self.bits[usize::from(byte >> 6)] |= 1 << (byte & 63);
    }

    pub fn contains(&self, byte: u8) -> bool {
        self.bits[usize::from(byte >> 6)] & (1 << (byte & 63)) != 0
    }

    pub fn is_empty(&self) -> bool {
        self.bits.iter().all(|word| *word == 0)
    }
}

impl From<&[u8]> for StopBytes {
    fn from(bytes: &[u8]) -> Self {
        bytes.iter().copied().collect()
    }
}

impl<const N: usize> From<[u8; N]> for StopBytes {
    fn from(bytes: [u8; N]) -> Self {
        bytes.into_iter().collect()
    }
}

impl FromIterator<u8> for StopBytes {
    fn from_iter<I: IntoIterator<Item = u8>>(iter: I) -> Self {
        let mut set = StopBytes::empty();
        for byte in iter {
            set.insert(byte);
        }
        set
    }
}

impl std::fmt::Debug for StopBytes {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set()
            .entries((0..=u8::MAX).filter(|byte| self.contains(*byte)))
            .finish()
    }
}

/// 拷贝以“完成”结束的原因。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CompletionReason {
    /// 已拷贝 `max_bytes` 个字节。
    MaxBytes,
    /// 最后拷贝的字节属于停止字节集合（该字节已写入）。
    StopByte(u8),
    /// 源有序结束。
    EndOfStream,
}

/// 一次有界拷贝的非故障结果；故障以 `Err` 返回。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CopyOutcome {
    Completed {
        copied: usize,
        reason: CompletionReason,
    },
    /// 截止时间先于任何停止条件到达；已拷贝的字节保留在汇中。
    TimedOut { copied: usize },
}

impl CopyOutcome {
    pub fn copied(&self) -> usize {
        match self {
            CopyOutcome::Completed { copied, .. } | CopyOutcome::TimedOut { copied } => *copied,
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, CopyOutcome::Completed { .. })
    }

    pub fn is_timed_out(&self) -> bool {
        matches!(self, CopyOutcome::TimedOut { .. })
    }
}

/// 受截止时间、字节上限与停止字节集约束的逐字节拷贝。
///
/// # 教案式注释
///
/// ## 意图 (Why)
/// - 从任意字节源排空数据到任意 `Write`，在三个独立停止条件中任一满足时返回，并告知是哪一个；
/// - 必须按字节推进：停止字节的**位置**（而不只是是否出现）决定拷贝在何处停下。
///
/// ## 逻辑 (How)
/// 1. 每个字节前先比较已用时间与截止时间，到期即返回 `TimedOut`；
/// 2. 调用 `probe`：`Pending` 时在剩余时间与 `poll_interval` 的较小值内有界等待后复查；
/// 3. 只有 `Ready`/`Ended` 时才发起阻塞的 `read_byte`，因此单次底层读取不会无限阻塞；
/// 4. 写入字节后依次检查停止字节与字节上限。
///
/// ## 契约 (What)
/// - `Completed`：达到 `max_bytes`、拷贝到停止字节（包含该字节）或源有序结束；
/// - `TimedOut`：截止时间到达且无停止条件满足，已拷贝部分不回滚；
/// - `Err`：源或汇的任何 IO 故障，包括在操作期间被关闭的源或汇；
/// - `max_bytes == 0` 时立即完成。
///
/// ## 注意事项 (Trade-offs)
/// - 截止时间为软实时边界：实际超出量受 `poll_interval` 与调度延迟约束，不为零；
/// - 逐字节写入对未缓冲的汇代价较高，调用方可自行套上 `BufWriter`，拷贝结束时会 `flush`。
#[derive(Clone, Debug)]
pub struct BoundedCopy {
    timeout: Duration,
    max_bytes: usize,
    stop_bytes: StopBytes,
    policy: CopyPolicy,
}

impl BoundedCopy {
    /// 以相对超时构造，字节上限默认无限、停止字节集默认为空。
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            max_bytes: usize::MAX,
            stop_bytes: StopBytes::empty(),
            policy: CopyPolicy::default(),
        }
    }

    pub fn max_bytes(mut self, max_bytes: usize) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    pub fn stop_bytes(mut self, stop_bytes: impl Into<StopBytes>) -> Self {
        self.stop_bytes = stop_bytes.into();
        self
    }

    pub fn policy(mut self, policy: CopyPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// 以 `run` 调用时刻为起点计算截止时间并执行拷贝。
    ///
    /// 超时大到无法表示为时间点（如 `Duration::MAX`）时视为没有截止时间，
    /// 拷贝只在字节上限、停止字节、数据结束或故障时返回。
    pub fn run<S, W>(&self, source: S, sink: W) -> Result<CopyOutcome>
    where
        S: ByteSource,
        W: Write,
    {
        let deadline = Instant::now().checked_add(self.timeout);
        self.execute(source, sink, deadline)
    }

    /// 以绝对截止时间执行拷贝。
    pub fn run_until<S, W>(&self, source: S, sink: W, deadline: Instant) -> Result<CopyOutcome>
    where
        S: ByteSource,
        W: Write,
    {
        self.execute(source, sink, Some(deadline))
    }

    fn execute<S, W>(
        &self,
        mut source: S,
        mut sink: W,
        deadline: Option<Instant>,
    ) -> Result<CopyOutcome>
    where
        S: ByteSource,
        W: Write,
    {
        self.policy.validate()?;
        let started = Instant::now();
        let outcome = self.pump(&mut source, &mut sink, deadline);
        let flushed = sink
            .flush()
            .map_err(|err| PipeError::io(Operation::Flush, err));
        let outcome = outcome.and_then(|outcome| flushed.map(|()| outcome));
        match &outcome {
            Ok(result) => tracing::debug!(
                ?result,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "bounded copy finished"
            ),
            Err(err) => tracing::debug!(
                code = err.code(),
                error = %err,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "bounded copy failed"
            ),
        }
        outcome
    }

    fn pump<S, W>(
        &self,
        source: &mut S,
        sink: &mut W,
        deadline: Option<Instant>,
    ) -> Result<CopyOutcome>
    where
        S: ByteSource,
        W: Write,
    {
        let mut copied = 0usize;
        loop {
            if copied >= self.max_bytes {
                return Ok(CopyOutcome::Completed {
                    copied,
                    reason: CompletionReason::MaxBytes,
                });
            }
            if !self.await_byte(source, deadline)? {
                return Ok(CopyOutcome::TimedOut { copied });
            }
            let Some(byte) = source.read_byte()? else {
                return Ok(CopyOutcome::Completed {
                    copied,
                    reason: CompletionReason::EndOfStream,
                });
            };
            sink.write_all(&[byte])
                .map_err(|err| PipeError::io(Operation::Write, err))?;
            copied += 1;
            if self.stop_bytes.contains(byte) {
                return Ok(CopyOutcome::Completed {
                    copied,
                    reason: CompletionReason::StopByte(byte),
                });
            }
        }
    }

    /// 等待直到源可读，返回 `false` 表示截止时间先到；`None` 表示不设截止时间。
    fn await_byte<S: ByteSource>(
        &self,
        source: &mut S,
        deadline: Option<Instant>,
    ) -> Result<bool> {
        loop {
            let wait = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Ok(false);
                    }
                    (deadline - now).min(self.policy.poll_interval)
                }
                None => self.policy.poll_interval,
            };
            match source.probe()? {
                Readiness::Ready(_) | Readiness::Ended => return Ok(true),
                Readiness::Pending => source.wait_readable(wait)?,
            }
        }
    }
}

/// [`BoundedCopy`] 的便捷入口。
pub fn copy_bounded<S, W>(
    source: S,
    sink: W,
    timeout: Duration,
    max_bytes: usize,
    stop_bytes: impl Into<StopBytes>,
) -> Result<CopyOutcome>
where
    S: ByteSource,
    W: Write,
{
    BoundedCopy::new(timeout)
        .max_bytes(max_bytes)
        .stop_bytes(stop_bytes)
        .run(source, sink)
}

/// 在 `timeout` 内恰好读取 `len` 个字节。
///
/// 源提前结束或超时都返回 [`PipeError::Truncated`]，已读部分随错误丢弃。
pub fn read_exact_within<S: ByteSource>(
    source: S,
    len: usize,
    timeout: Duration,
    policy: &CopyPolicy,
) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(len);
    let outcome = BoundedCopy::new(timeout)
        .max_bytes(len)
        .policy(policy.clone())
        .run(source, &mut out)?;
    match outcome {
        CopyOutcome::Completed {
            reason: CompletionReason::MaxBytes,
            ..
        } => Ok(out),
        other => Err(PipeError::Truncated {
            expected: len,
            received: other.copied(),
        }),
    }
}
