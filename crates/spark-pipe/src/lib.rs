#![doc = r#"
# spark-pipe

## 设计动机（Why）
- **定位**：提供进程内的单生产者/单消费者阻塞字节管道（[`Sink`] → [`Source`]），
  以及一个受截止时间、字节上限与停止字节集约束的有界拷贝例程（[`BoundedCopy`]）。
- **架构角色**：两者都以 `std::io::Read`/`std::io::Write` 作为对外形态，可以插入任何
  期望通用字节流的位置；`BoundedCopy` 则只依赖窄能力接口 [`ByteSource`] 与 `Write`，
  与具体流类型解耦。
- **设计理念**：区分“有序结束”（EOF）与“被强制关闭”（[`PipeError::ForcedClose`]），
  并保证关闭与阻塞读之间不存在丢失唤醒的竞态。

## 核心契约（What）
- 写入顺序即读出顺序，块边界不具备语义，可被合并；
- `Sink::close` 投递 EOF 哨兵块，读端排空后永远返回“数据结束”而非错误；
- `Source::close` 是管道的取消原语：强制关闭写端，并以 `ForcedClose` 唤醒阻塞中的读者；
- `BoundedCopy` 返回 `Completed`/`TimedOut`，底层故障以 `Err` 传播，绝不伪装成超时。

## 实现策略（How）
- 入队、出队、关闭全部在同一把锁与同一条件变量下完成，读者对
  “是否有数据 / 是否 EOF / 是否被强制关闭”的判断是原子的；
- 有界拷贝先探测可用字节，只在确知有数据时才发起阻塞读取，否则在剩余时间内
  有界等待后复查；对不具备探测能力的外部阻塞流，[`PumpedSource`] 以专用线程
  泵送数据到内部管道，从而合成“有数据或对端已关闭”的探测能力。

## 风险与考量（Trade-offs）
- 缓冲无上限，不提供背压；
- 截止时间是软实时边界，实际超出量取决于 [`CopyPolicy::poll_interval`] 与调度延迟。
"#]

mod config;
mod copy;
mod error;
mod pipe;
mod pump;
mod sync;

pub use config::CopyPolicy;
pub use copy::{
    BoundedCopy, ByteSource, CompletionReason, CopyOutcome, Readiness, StopBytes, copy_bounded,
    read_exact_within,
};
pub use error::{Operation, PipeError};
pub use pipe::{Sink, Source, connect, pipe};
pub use pump::PumpedSource;

/// 本 crate 统一使用的结果别名。
pub type Result<T, E = PipeError> = core::result::Result<T, E>;
