//! 锁与条件变量的统一入口。
//!
//! 教案级说明：常规构建直接使用 `parking_lot`；启用 `--cfg loom`（或 `spark_loom`）时
//! 切换到 Loom 提供的同步原语，使模型检查能够穷举“关闭 vs 阻塞读”的调度交错。
//! Loom 的 API 与标准库一致（按值传递 guard），这里包装成 `parking_lot` 风格，
//! 保证 `pipe` 模块在两种构建下代码完全相同。

#[cfg(not(any(loom, spark_loom)))]
pub(crate) use parking_lot::{Condvar, Mutex, MutexGuard};

#[cfg(any(loom, spark_loom))]
pub(crate) use self::model::{Condvar, Mutex, MutexGuard};

#[cfg(any(loom, spark_loom))]
mod model {
    use core::ops::{Deref, DerefMut};
    use std::time::Duration;

    pub(crate) struct Mutex<T>(loom::sync::Mutex<T>);

    pub(crate) struct MutexGuard<'a, T>(Option<loom::sync::MutexGuard<'a, T>>);

    pub(crate) struct Condvar(loom::sync::Condvar);

    impl<T> Mutex<T> {
        pub(crate) fn new(value: T) -> Self {
            Self(loom::sync::Mutex::new(value))
        }

        pub(crate) fn lock(&self) -> MutexGuard<'_, T> {
            // Loom 中不存在锁中毒
            MutexGuard(Some(self.0.lock().unwrap_or_else(|e| e.into_inner())))
        }
    }

    impl<T> Deref for MutexGuard<'_, T> {
        type Target = T;

        fn deref(&self) -> &T {
            self.0.as_deref().expect("guard is only vacated inside Condvar::wait")
        }
    }

    impl<T> DerefMut for MutexGuard<'_, T> {
        fn deref_mut(&mut self) -> &mut T {
            self.0
                .as_deref_mut()
                .expect("guard is only vacated inside Condvar::wait")
        }
    }

    impl Condvar {
        pub(crate) fn new() -> Self {
            Self(loom::sync::Condvar::new())
        }

        pub(crate) fn wait<T>(&self, guard: &mut MutexGuard<'_, T>) {
            if let Some(inner) = guard.0.take() {
                guard.0 = Some(self.0.wait(inner).unwrap_or_else(|e| e.into_inner()));
            }
        }

        /// 超时与否由调用方重新检查状态得知，这里不再单独报告。
        pub(crate) fn wait_for<T>(&self, guard: &mut MutexGuard<'_, T>, timeout: Duration) {
            if let Some(inner) = guard.0.take() {
                let (inner, _) = self
                    .0
                    .wait_timeout(inner, timeout)
                    .unwrap_or_else(|e| e.into_inner());
                guard.0 = Some(inner);
            }
        }

        pub(crate) fn notify_all(&self) {
            self.0.notify_all();
        }

        pub(crate) fn notify_one(&self) {
            self.0.notify_one();
        }
    }

    impl<T: Default> Default for Mutex<T> {
        fn default() -> Self {
            Self::new(T::default())
        }
    }

    impl Default for Condvar {
        fn default() -> Self {
            Self::new()
        }
    }
}
