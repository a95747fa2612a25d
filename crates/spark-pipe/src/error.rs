use std::io;

/// 描述一次底层 IO 操作，对应稳定错误码与默认文案。
///
/// # 契约说明（What）
/// - `code()` 返回形如 `spark.pipe.read_failed` 的稳定错误码，可直接用于日志与告警聚合；
/// - `message()` 返回用于拼接错误文案的短语。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum Operation {
    /// 从字节源读取。
    Read,
    /// 向字节汇写入。
    Write,
    /// 刷新字节汇。
    Flush,
    /// 启动泵送线程。
    SpawnPump,
}

impl Operation {
    pub const fn code(self) -> &'static str {
        match self {
            Operation::Read => "spark.pipe.read_failed",
            Operation::Write => "spark.pipe.write_failed",
            Operation::Flush => "spark.pipe.flush_failed",
            Operation::SpawnPump => "spark.pipe.spawn_pump_failed",
        }
    }

    pub const fn message(self) -> &'static str {
        match self {
            Operation::Read => "pipe read",
            Operation::Write => "pipe write",
            Operation::Flush => "pipe flush",
            Operation::SpawnPump => "pipe pump spawn",
        }
    }
}

/// 管道与有界拷贝共享的错误分类。
///
/// # 设计背景（Why）
/// - 区分“使用方式错误”（`NotConnected`/`AlreadyConnected`/`Closed`）与“致命故障”
///   （`ForcedClose`/`Io`）：前者说明调用发生在状态机的合法窗口之外，后者说明通道已不可用；
/// - 数据结束（EOF）从不以错误表达，读取接口通过返回值区分。
///
/// # 契约说明（What）
/// - 所有错误都同步返回给触发它的调用者，库内部不做重试；
/// - `code()` 提供稳定错误码；
/// - 通过 [`From`] 与 [`io::Error`] 双向转换：包裹进 `io::Error` 后再取回时保持原变体，
///   使经过 `std::io::Write` 的错误不丢失身份。
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum PipeError {
    /// 在 `connect` 之前调用了读写操作。
    #[error("pipe not connected")]
    NotConnected,
    /// 对已绑定的一端再次 `connect`。
    #[error("pipe already connected")]
    AlreadyConnected,
    /// 在本端 `close` 之后继续操作。
    #[error("pipe closed")]
    Closed,
    /// 阻塞中的读取因读端被其他线程关闭而中止，区别于有序 EOF。
    #[error("pipe forcibly closed while a read was pending")]
    ForcedClose,
    /// 协作流的底层 IO 故障，原样携带。
    #[error("{}: {source}", op.message())]
    Io {
        op: Operation,
        #[source]
        source: io::Error,
    },
    /// 在超时或数据结束前未能读满期望的字节数。
    #[error("expected {expected} bytes but received only {received}")]
    Truncated { expected: usize, received: usize },
    /// 拷贝策略配置非法。
    #[error("invalid copy policy: {reason}")]
    InvalidPolicy { reason: &'static str },
}

impl PipeError {
    /// 以指定操作包装底层 IO 错误；若其中已携带 `PipeError`，则原样取回。
    pub fn io(op: Operation, error: io::Error) -> Self {
        match error.downcast::<PipeError>() {
            Ok(pipe) => pipe,
            Err(source) => PipeError::Io { op, source },
        }
    }

    /// 稳定错误码。
    pub fn code(&self) -> &'static str {
        match self {
            PipeError::NotConnected => "spark.pipe.not_connected",
            PipeError::AlreadyConnected => "spark.pipe.already_connected",
            PipeError::Closed => "spark.pipe.closed",
            PipeError::ForcedClose => "spark.pipe.forced_close",
            PipeError::Io { op, .. } => op.code(),
            PipeError::Truncated { .. } => "spark.pipe.truncated",
            PipeError::InvalidPolicy { .. } => "spark.pipe.invalid_policy",
        }
    }

    /// 是否为状态机窗口之外的误用。
    pub fn is_usage_error(&self) -> bool {
        matches!(
            self,
            PipeError::NotConnected | PipeError::AlreadyConnected | PipeError::Closed
        )
    }

    /// 是否意味着通道已不可用，调用方应放弃它。
    pub fn is_fatal(&self) -> bool {
        matches!(self, PipeError::ForcedClose | PipeError::Io { .. })
    }

    fn io_kind(&self) -> io::ErrorKind {
        match self {
            PipeError::NotConnected => io::ErrorKind::NotConnected,
            PipeError::AlreadyConnected => io::ErrorKind::AlreadyExists,
            PipeError::Closed => io::ErrorKind::BrokenPipe,
            PipeError::ForcedClose => io::ErrorKind::ConnectionAborted,
            PipeError::Io { source, .. } => source.kind(),
            PipeError::Truncated { .. } => io::ErrorKind::UnexpectedEof,
            PipeError::InvalidPolicy { .. } => io::ErrorKind::InvalidInput,
        }
    }
}

impl From<PipeError> for io::Error {
    fn from(error: PipeError) -> Self {
        match error {
            PipeError::Io { source, .. } => source,
            other => io::Error::new(other.io_kind(), other),
        }
    }
}

impl From<io::Error> for PipeError {
    fn from(error: io::Error) -> Self {
        PipeError::io(Operation::Read, error)
    }
}
