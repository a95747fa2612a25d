use std::io::{self, Read};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::Result;
use crate::config::CopyPolicy;
use crate::copy::{ByteSource, Readiness};
use crate::error::{Operation, PipeError};
use crate::pipe::{Sink, Source, pipe};
use crate::sync::Mutex;

/// 为只有阻塞读取能力的外部流合成“有数据或对端已关闭”的探测能力。
///
/// # 教案式注释
///
/// ## 意图 (Why)
/// - 标准库的 `Read` 没有非阻塞探测，直接对它做有界拷贝时，单次 `read` 可能永远阻塞，
///   截止时间无从兑现；
/// - 通过把阻塞读取移到专用线程，有界拷贝只与内部管道交互，等待总是有界的。
///
/// ## 逻辑 (How)
/// - 泵送线程以 `pump_chunk_size` 为单位读取外部流并写入内部管道；
/// - 外部流正常结束时关闭写端，读者观测到有序 EOF；
/// - 外部流出错时先记录故障再关闭写端，读者排空已缓冲数据后在 `probe`/`read_byte`
///   处得到 [`PipeError::Io`]，因此真正的故障绝不会被误报为超时或正常结束；
/// - 第一次报告原样交出外部流的 `io::Error`（保留自定义负载与 `source` 链），
///   此后的报告只能按相同 `kind` 与文案重建，因为 `io::Error` 不可克隆；
/// - 截止时间到达时有界拷贝放弃等待并报告超时，泵送线程可以仍阻塞在外部读取上。
///
/// ## 契约 (What)
/// - 实现 [`ByteSource`]，可直接交给 [`BoundedCopy`](crate::BoundedCopy)；
/// - 丢弃时强制关闭内部读端，泵送线程在下一次写入时收到 `Closed` 后退出。
///
/// ## 注意事项 (Trade-offs)
/// - 线程不会被回收直到外部读取返回；对永不返回的流，线程将一直驻留；
/// - 泵送会提前读取外部流，读到内部管道但未被消费的数据在丢弃时一并丢失。
pub struct PumpedSource {
    source: Source,
    fault: Arc<Mutex<Option<Fault>>>,
}

/// 泵送线程记录的外部流故障。
struct Fault {
    original: Option<io::Error>,
    kind: io::ErrorKind,
    message: String,
}

impl Fault {
    fn new(error: io::Error) -> Self {
        Self {
            kind: error.kind(),
            message: error.to_string(),
            original: Some(error),
        }
    }

    fn report(&mut self) -> io::Error {
        self.original
            .take()
            .unwrap_or_else(|| io::Error::new(self.kind, self.message.clone()))
    }
}

impl PumpedSource {
    /// 启动泵送线程。
    pub fn spawn<R>(reader: R, policy: &CopyPolicy) -> Result<Self>
    where
        R: Read + Send + 'static,
    {
        policy.validate()?;
        let (sink, source) = pipe();
        let fault = Arc::new(Mutex::new(None));
        let chunk_size = policy.pump_chunk_size;
        let recorded = Arc::clone(&fault);
        thread::Builder::new()
            .name(policy.pump_thread_name.clone())
            .spawn(move || run_pump(reader, sink, chunk_size, &recorded))
            .map_err(|err| PipeError::io(Operation::SpawnPump, err))?;
        tracing::debug!(chunk_size, "pump started");
        Ok(Self { source, fault })
    }

    /// 内部管道的读端，可直接用于阻塞读取。
    pub fn source(&self) -> &Source {
        &self.source
    }

    fn recorded_fault(&self) -> Option<PipeError> {
        self.fault.lock().as_mut().map(|fault| PipeError::Io {
            op: Operation::Read,
            source: fault.report(),
        })
    }
}

fn run_pump<R: Read>(
    mut reader: R,
    sink: Sink,
    chunk_size: usize,
    fault: &Mutex<Option<Fault>>,
) {
    let mut buf = vec![0u8; chunk_size];
    let mut total = 0u64;
    loop {
        match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => {
                if sink.write(&buf[..n]).is_err() {
                    tracing::debug!(total, "pump stopped, reader side closed");
                    return;
                }
                total += n as u64;
            }
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => {
                tracing::warn!(error = %err, total, "pump source failed");
                *fault.lock() = Some(Fault::new(err));
                break;
            }
        }
    }
    sink.close();
    tracing::debug!(total, "pump finished");
}

impl ByteSource for PumpedSource {
    fn probe(&mut self) -> Result<Readiness> {
        match self.source.probe()? {
            Readiness::Ended => match self.recorded_fault() {
                Some(err) => Err(err),
                None => Ok(Readiness::Ended),
            },
            other => Ok(other),
        }
    }

    fn read_byte(&mut self) -> Result<Option<u8>> {
        match self.source.read_byte()? {
            Some(byte) => Ok(Some(byte)),
            None => match self.recorded_fault() {
                Some(err) => Err(err),
                None => Ok(None),
            },
        }
    }

    fn wait_readable(&mut self, timeout: Duration) -> Result<()> {
        self.source.wait_readable(timeout)
    }
}

impl std::fmt::Debug for PumpedSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PumpedSource")
            .field("source", &self.source)
            .finish_non_exhaustive()
    }
}
