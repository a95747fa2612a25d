use std::collections::VecDeque;
use std::fmt;
use std::io;
use std::sync::Arc;
use std::time::Duration;

use bytes::{Buf, Bytes, BytesMut};

use crate::Result;
use crate::copy::Readiness;
use crate::error::PipeError;
use crate::sync::{Condvar, Mutex, MutexGuard};

/// 保留的零长度块，表示“不会再有数据写入”。
///
/// 真实写入的零字节在入队前即被丢弃，因此队列中的空块只可能是该哨兵。
const EOF_SENTINEL: Bytes = Bytes::new();

/// 有序、无上限的不可变字节块队列，仅在本模块内部使用。
#[derive(Default)]
struct ChunkQueue {
    chunks: VecDeque<Bytes>,
    pending_bytes: usize,
}

impl ChunkQueue {
    fn push(&mut self, chunk: Bytes) {
        debug_assert!(!chunk.is_empty(), "空块保留给 EOF 哨兵");
        self.pending_bytes += chunk.len();
        self.chunks.push_back(chunk);
    }

    fn push_eof(&mut self) {
        self.chunks.push_back(EOF_SENTINEL);
    }

    fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// 将当前排队的全部块拼接到 `buffered` 之后，返回是否消费到 EOF 哨兵。
    ///
    /// 只有一个数据块且 `buffered` 为空时直接移交所有权，不做拷贝。
    fn drain_into(&mut self, buffered: &mut Bytes) -> bool {
        let mut merged: Option<BytesMut> = None;
        let mut eof = false;
        while let Some(chunk) = self.chunks.pop_front() {
            if chunk.is_empty() {
                eof = true;
                break;
            }
            self.pending_bytes -= chunk.len();
            if buffered.is_empty() && merged.is_none() {
                *buffered = chunk;
                continue;
            }
            let pending = self.pending_bytes;
            let out = merged.get_or_insert_with(|| {
                let mut head = BytesMut::with_capacity(buffered.len() + chunk.len() + pending);
                head.extend_from_slice(buffered);
                head
            });
            out.extend_from_slice(&chunk);
        }
        if let Some(merged) = merged {
            *buffered = merged.freeze();
        }
        eof
    }

    /// 丢弃所有排队块，返回被丢弃的数据字节数。
    fn clear(&mut self) -> usize {
        let discarded = self.pending_bytes;
        self.chunks.clear();
        self.pending_bytes = 0;
        discarded
    }
}

/// 读写两端共享的全部可变状态；所有影响阻塞判断的迁移都在同一把锁下完成。
#[derive(Default)]
struct ChannelState {
    queue: ChunkQueue,
    /// 已从队列取出、尚未被读走的数据。
    buffered: Bytes,
    eof_observed: bool,
    sink_closed: bool,
    source_closed: bool,
}

impl ChannelState {
    fn refill(&mut self) {
        if !self.eof_observed && !self.queue.is_empty() {
            self.eof_observed = self.queue.drain_into(&mut self.buffered);
        }
    }

    fn is_readable(&self) -> bool {
        !self.buffered.is_empty() || self.eof_observed
    }

    fn take_into(&mut self, buf: &mut [u8]) -> usize {
        let n = buf.len().min(self.buffered.len());
        buf[..n].copy_from_slice(&self.buffered[..n]);
        self.buffered.advance(n);
        n
    }
}

struct Channel {
    state: Mutex<ChannelState>,
    readable: Condvar,
}

impl Channel {
    fn new() -> Self {
        Self {
            state: Mutex::new(ChannelState::default()),
            readable: Condvar::new(),
        }
    }

    /// 以读端身份加锁；读端已关闭时返回 `Closed`。
    fn lock_source(&self) -> Result<MutexGuard<'_, ChannelState>> {
        let state = self.state.lock();
        if state.source_closed {
            return Err(PipeError::Closed);
        }
        Ok(state)
    }

    /// 阻塞直到有数据或已观测到 EOF。
    ///
    /// 等待期间读端被关闭时返回 `ForcedClose`。
    fn await_readable(&self, state: &mut MutexGuard<'_, ChannelState>) -> Result<()> {
        loop {
            state.refill();
            if state.is_readable() {
                return Ok(());
            }
            self.readable.wait(state);
            if state.source_closed {
                return Err(PipeError::ForcedClose);
            }
        }
    }

    fn send(&self, data: &[u8]) -> Result<()> {
        let mut state = self.state.lock();
        if state.sink_closed {
            return Err(PipeError::Closed);
        }
        if data.is_empty() {
            return Ok(());
        }
        state.queue.push(Bytes::copy_from_slice(data));
        self.readable.notify_one();
        Ok(())
    }

    fn close_sink(&self) {
        let mut state = self.state.lock();
        if state.sink_closed {
            return;
        }
        state.sink_closed = true;
        state.queue.push_eof();
        self.readable.notify_all();
        tracing::debug!(
            pending_bytes = state.queue.pending_bytes,
            "pipe sink closed, end-of-data queued"
        );
    }

    fn close_source(&self) {
        let mut state = self.state.lock();
        if state.source_closed {
            return;
        }
        state.source_closed = true;
        state.sink_closed = true;
        let discarded = state.buffered.len() + state.queue.clear();
        state.buffered = Bytes::new();
        self.readable.notify_all();
        tracing::debug!(discarded, "pipe source closed, pending readers aborted");
    }
}

#[derive(Default)]
struct Link {
    channel: Option<Arc<Channel>>,
    closed: bool,
}

/// 一端的连接绑定：未连接 → 已连接 → 关闭，绑定一经建立永不更换。
#[derive(Default)]
struct End {
    link: Mutex<Link>,
}

impl End {
    fn bound(channel: Arc<Channel>) -> Self {
        Self {
            link: Mutex::new(Link {
                channel: Some(channel),
                closed: false,
            }),
        }
    }

    fn channel(&self) -> Result<Arc<Channel>> {
        self.link
            .lock()
            .channel
            .clone()
            .ok_or(PipeError::NotConnected)
    }

    /// 标记本端关闭，返回已绑定的通道（若有）。
    fn mark_closed(&self) -> Option<Arc<Channel>> {
        let mut link = self.link.lock();
        link.closed = true;
        link.channel.clone()
    }

    fn is_connected(&self) -> bool {
        self.link.lock().channel.is_some()
    }
}

/// 将读端与写端绑定为一条管道。
///
/// # 契约说明（What）
/// - 任一端已有对端时返回 [`PipeError::AlreadyConnected`]，原绑定不受影响；
/// - 任一端在连接前已关闭时返回 [`PipeError::Closed`]；
/// - 两端的锁总是按“读端 → 写端”的顺序获取，因此并发的 `connect` 之间不会死锁，
///   也不可能形成两次绑定。
pub fn connect(source: &Source, sink: &Sink) -> Result<()> {
    let mut source_link = source.end.link.lock();
    let mut sink_link = sink.end.link.lock();
    if source_link.channel.is_some() || sink_link.channel.is_some() {
        return Err(PipeError::AlreadyConnected);
    }
    if source_link.closed || sink_link.closed {
        return Err(PipeError::Closed);
    }
    let channel = Arc::new(Channel::new());
    source_link.channel = Some(Arc::clone(&channel));
    sink_link.channel = Some(channel);
    tracing::debug!("pipe connected");
    Ok(())
}

/// 创建一对已连接的写端与读端。
pub fn pipe() -> (Sink, Source) {
    let channel = Arc::new(Channel::new());
    let source = Source {
        end: End::bound(Arc::clone(&channel)),
    };
    let sink = Sink {
        end: End::bound(channel),
    };
    (sink, source)
}

/// 管道读端。
///
/// # 教案式注释
///
/// ## 意图 (Why)
/// - 以阻塞语义向唯一的读者线程交付写端写入的字节，并把“写端有序结束”与
///   “读端被强制拆除”区分为两种可观测结果。
///
/// ## 逻辑 (How)
/// - 队列为空且尚未 EOF 时在条件变量上等待；被唤醒后一次性取走当前排队的全部块并拼接，
///   以批量唤醒减少上下文切换；
/// - EOF 以零长度哨兵块的形式与数据走同一同步点，唤醒与排序不会错位。
///
/// ## 契约 (What)
/// - `read`/`read_byte`：有数据立即返回；空队列时阻塞；EOF 后永远返回“数据结束”且不再阻塞；
/// - `close`：幂等；强制关闭写端，并以 [`PipeError::ForcedClose`] 唤醒阻塞中的读取；
///   已缓冲但未读取的数据被丢弃，此后任何读取、`available`、`probe` 都返回 [`PipeError::Closed`]；
/// - 所有方法接收 `&self`，允许其他线程通过共享引用调用 `close` 作为取消原语。
///
/// ## 注意事项 (Trade-offs)
/// - 仅支持一个读者线程；多个线程同时读取不会破坏内存安全，但字节的归属不再有序可言。
pub struct Source {
    end: End,
}

impl Source {
    /// 创建未连接的读端。
    pub fn new() -> Self {
        Self {
            end: End::default(),
        }
    }

    /// 创建读端并立即与 `sink` 连接。
    pub fn with_sink(sink: &Sink) -> Result<Self> {
        let source = Self::new();
        connect(&source, sink)?;
        Ok(source)
    }

    pub fn connect(&self, sink: &Sink) -> Result<()> {
        connect(self, sink)
    }

    pub fn is_connected(&self) -> bool {
        self.end.is_connected()
    }

    /// 读取到 `buf`，返回读取的字节数；`buf` 非空时返回 `0` 表示数据结束。
    ///
    /// 只交付当前已可用的数据，不会为了填满 `buf` 而继续阻塞。
    pub fn read(&self, buf: &mut [u8]) -> Result<usize> {
        let channel = self.end.channel()?;
        let mut state = channel.lock_source()?;
        if buf.is_empty() {
            return Ok(0);
        }
        channel.await_readable(&mut state)?;
        Ok(state.take_into(buf))
    }

    /// 读取单个字节，`None` 表示数据结束。
    pub fn read_byte(&self) -> Result<Option<u8>> {
        let mut byte = [0u8; 1];
        match self.read(&mut byte)? {
            0 => Ok(None),
            _ => Ok(Some(byte[0])),
        }
    }

    /// 无需阻塞即可读取的字节数。
    pub fn available(&self) -> Result<usize> {
        let channel = self.end.channel()?;
        let mut state = channel.lock_source()?;
        state.refill();
        Ok(state.buffered.len())
    }

    /// 非阻塞探测：有数据、尚无数据，还是写端已有序结束且数据已排空。
    pub fn probe(&self) -> Result<Readiness> {
        let channel = self.end.channel()?;
        let mut state = channel.lock_source()?;
        state.refill();
        Ok(if !state.buffered.is_empty() {
            Readiness::Ready(state.buffered.len())
        } else if state.eof_observed {
            Readiness::Ended
        } else {
            Readiness::Pending
        })
    }

    /// 最多等待 `timeout`，直到可读（有数据或 EOF）。
    ///
    /// 超时本身不是错误，调用方应重新 [`probe`](Self::probe)；等待期间被强制关闭时返回
    /// [`PipeError::ForcedClose`]。
    pub fn wait_readable(&self, timeout: Duration) -> Result<()> {
        let channel = self.end.channel()?;
        let mut state = channel.lock_source()?;
        state.refill();
        if state.is_readable() {
            return Ok(());
        }
        let _ = channel.readable.wait_for(&mut state, timeout);
        if state.source_closed {
            return Err(PipeError::ForcedClose);
        }
        Ok(())
    }

    /// 关闭读端；幂等。
    pub fn close(&self) {
        if let Some(channel) = self.end.mark_closed() {
            channel.close_source();
        }
    }
}

impl Default for Source {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Source {
    fn drop(&mut self) {
        self.close();
    }
}

impl fmt::Debug for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Source")
            .field("connected", &self.is_connected())
            .finish_non_exhaustive()
    }
}

impl io::Read for &Source {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Source::read(self, buf).map_err(io::Error::from)
    }
}

impl io::Read for Source {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Source::read(self, buf).map_err(io::Error::from)
    }
}

/// 管道写端。
///
/// 每次 `write` 都对入参做防御性拷贝后作为一个新块入队，调用方随后修改自己的缓冲不会
/// 影响管道内容。零长度写入是空操作，绝不会被误当作 EOF。`close` 幂等，连接状态下会投递
/// EOF 哨兵以唤醒阻塞的读者；被丢弃时自动关闭。
pub struct Sink {
    end: End,
}

impl Sink {
    /// 创建未连接的写端。
    pub fn new() -> Self {
        Self {
            end: End::default(),
        }
    }

    /// 创建写端并立即与 `source` 连接。
    pub fn with_source(source: &Source) -> Result<Self> {
        let sink = Self::new();
        connect(source, &sink)?;
        Ok(sink)
    }

    pub fn connect(&self, source: &Source) -> Result<()> {
        connect(source, self)
    }

    pub fn is_connected(&self) -> bool {
        self.end.is_connected()
    }

    pub fn write(&self, data: &[u8]) -> Result<()> {
        self.end.channel()?.send(data)
    }

    pub fn write_byte(&self, byte: u8) -> Result<()> {
        self.write(&[byte])
    }

    /// 关闭写端；幂等。
    pub fn close(&self) {
        if let Some(channel) = self.end.mark_closed() {
            channel.close_sink();
        }
    }
}

impl Default for Sink {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Sink {
    fn drop(&mut self) {
        self.close();
    }
}

impl fmt::Debug for Sink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sink")
            .field("connected", &self.is_connected())
            .finish_non_exhaustive()
    }
}

impl io::Write for &Sink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        Sink::write(self, buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl io::Write for Sink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        Sink::write(self, buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
