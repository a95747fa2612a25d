use std::time::Duration;

use crate::Result;
use crate::error::PipeError;

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(10);
const DEFAULT_PUMP_CHUNK_SIZE: usize = 8192;
const DEFAULT_PUMP_THREAD_NAME: &str = "spark-pipe-pump";

/// 有界拷贝与泵送线程的可调参数。
///
/// # 契约说明（What）
/// - `poll_interval`：源不支持有界等待时两次探测之间的休眠上限，也即截止时间的最大超出量；
/// - `pump_chunk_size`：[`PumpedSource`](crate::PumpedSource) 每次从外部流读取的缓冲大小；
/// - `pump_thread_name`：泵送线程名，便于在线程转储中定位。
///
/// 启用 `serde` 特性后可由宿主从 TOML/JSON 加载，缺省字段取默认值。
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct CopyPolicy {
    pub poll_interval: Duration,
    pub pump_chunk_size: usize,
    pub pump_thread_name: String,
}

impl CopyPolicy {
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_pump_chunk_size(mut self, size: usize) -> Self {
        self.pump_chunk_size = size;
        self
    }

    pub fn with_pump_thread_name(mut self, name: impl Into<String>) -> Self {
        self.pump_thread_name = name.into();
        self
    }

    /// 拒绝会导致忙等或无法推进的配置。
    pub fn validate(&self) -> Result<()> {
        if self.poll_interval.is_zero() {
            return Err(PipeError::InvalidPolicy {
                reason: "poll_interval must be greater than zero",
            });
        }
        if self.pump_chunk_size == 0 {
            return Err(PipeError::InvalidPolicy {
                reason: "pump_chunk_size must be greater than zero",
            });
        }
        Ok(())
    }
}

impl Default for CopyPolicy {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            pump_chunk_size: DEFAULT_PUMP_CHUNK_SIZE,
            pump_thread_name: DEFAULT_PUMP_THREAD_NAME.to_owned(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_policy_is_valid() {
        let policy = CopyPolicy::default();
        assert!(policy.validate().is_ok());
        assert_eq!(policy.poll_interval, Duration::from_millis(10));
        assert_eq!(policy.pump_chunk_size, 8192);
    }

    #[test]
    fn zero_values_are_rejected() {
        let err = CopyPolicy::default()
            .with_poll_interval(Duration::ZERO)
            .validate()
            .unwrap_err();
        assert_eq!(err.code(), "spark.pipe.invalid_policy");

        let err = CopyPolicy::default()
            .with_pump_chunk_size(0)
            .validate()
            .unwrap_err();
        assert!(matches!(err, PipeError::InvalidPolicy { .. }));
    }
}
