//! 任务完成句柄。
//!
//! # 模块定位（Why）
//! - 事件循环线程与提交方线程之间需要一个可阻塞等待、也可 `.await` 的一次性结果通道；
//! - 调度任务的取消同样经由该句柄表达：取消完成句柄即意味着任务不再执行。
//!
//! # 核心机制（How）
//! - `parking_lot::Mutex` 保护结果槽与已登记的 `Waker` 列表，`Condvar` 唤醒阻塞等待者；
//! - `resolve`/`reject`/`cancel` 中最先到达者写入结果，其后调用全部返回 `false`。

use std::future::Future;
use std::mem;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, Waker};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use thiserror::Error;

/// 任务执行结果。
pub type TaskResult<T> = Result<T, TaskError>;

/// 任务未能成功完成的原因。
#[derive(Clone, Debug, Eq, PartialEq, Error)]
pub enum TaskError {
    /// 任务在执行前被取消。
    #[error("task was cancelled")]
    Cancelled,
    /// 任务报告失败。
    #[error("task failed: {0}")]
    Failed(String),
    /// 任务执行期间 panic。
    #[error("task panicked")]
    Panicked,
}

struct State<T> {
    outcome: Option<TaskResult<T>>,
    wakers: Vec<Waker>,
}

struct Shared<T> {
    state: Mutex<State<T>>,
    ready: Condvar,
}

/// 可克隆的一次性完成句柄。
///
/// # 契约说明（What）
/// - 所有克隆共享同一结果槽；结果一经写入不可更改；
/// - 读取结果（`try_result`/`wait`/`.await`）返回结果的克隆，因此要求 `T: Clone`；
/// - `Future` 实现在结果写入时唤醒所有登记过的任务。
pub struct Promise<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for Promise<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T> Default for Promise<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Promise<T> {
    /// 创建未完成的句柄。
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(State {
                    outcome: None,
                    wakers: Vec::new(),
                }),
                ready: Condvar::new(),
            }),
        }
    }

    /// 以成功值完成。
    pub fn resolve(&self, value: T) -> bool {
        self.complete(Ok(value))
    }

    /// 以失败完成。
    pub fn reject(&self, error: TaskError) -> bool {
        self.complete(Err(error))
    }

    /// 取消。
    pub fn cancel(&self) -> bool {
        self.complete(Err(TaskError::Cancelled))
    }

    /// 是否已完成（含失败与取消）。
    pub fn is_done(&self) -> bool {
        self.shared.state.lock().outcome.is_some()
    }

    /// 是否以取消告终。
    pub fn is_cancelled(&self) -> bool {
        matches!(
            self.shared.state.lock().outcome,
            Some(Err(TaskError::Cancelled))
        )
    }

    fn complete(&self, outcome: TaskResult<T>) -> bool {
        let wakers = {
            let mut state = self.shared.state.lock();
            if state.outcome.is_some() {
                return false;
            }
            state.outcome = Some(outcome);
            mem::take(&mut state.wakers)
        };
        self.shared.ready.notify_all();
        for waker in wakers {
            waker.wake();
        }
        true
    }
}

impl<T: Clone> Promise<T> {
    /// 非阻塞读取结果。
    pub fn try_result(&self) -> Option<TaskResult<T>> {
        self.shared.state.lock().outcome.clone()
    }

    /// 阻塞直到完成。
    pub fn wait(&self) -> TaskResult<T> {
        let mut state = self.shared.state.lock();
        loop {
            if let Some(outcome) = &state.outcome {
                return outcome.clone();
            }
            self.shared.ready.wait(&mut state);
        }
    }

    /// 最多阻塞 `timeout`；超时返回 `None`。超出 `Instant` 可表示范围的 `timeout` 视为无限等待。
    pub fn wait_timeout(&self, timeout: Duration) -> Option<TaskResult<T>> {
        let Some(deadline) = Instant::now().checked_add(timeout) else {
            return Some(self.wait());
        };
        let mut state = self.shared.state.lock();
        loop {
            if let Some(outcome) = &state.outcome {
                return Some(outcome.clone());
            }
            if self.shared.ready.wait_until(&mut state, deadline).timed_out() {
                return state.outcome.clone();
            }
        }
    }
}

impl<T: Clone> Future for Promise<T> {
    type Output = TaskResult<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut state = self.shared.state.lock();
        if let Some(outcome) = &state.outcome {
            return Poll::Ready(outcome.clone());
        }
        if !state.wakers.iter().any(|waker| waker.will_wake(cx.waker())) {
            state.wakers.push(cx.waker().clone());
        }
        Poll::Pending
    }
}

impl<T> std::fmt::Debug for Promise<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.shared.state.lock();
        let status = match &state.outcome {
            None => "pending",
            Some(Ok(_)) => "resolved",
            Some(Err(TaskError::Cancelled)) => "cancelled",
            Some(Err(_)) => "rejected",
        };
        f.debug_struct("Promise").field("status", &status).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_completion_wins() {
        let promise = Promise::new();
        assert!(promise.resolve(7));
        assert!(!promise.reject(TaskError::Failed("late".into())));
        assert!(!promise.cancel());
        assert_eq!(promise.try_result(), Some(Ok(7)));
        assert!(!promise.is_cancelled());
    }

    #[test]
    fn wait_observes_completion_from_other_thread() {
        let promise = Promise::<u32>::new();
        let remote = promise.clone();
        let worker = std::thread::spawn(move || remote.resolve(42));
        assert_eq!(promise.wait(), Ok(42));
        assert!(worker.join().expect("完成线程不应 panic"));
    }

    #[test]
    fn wait_timeout_expires_while_pending() {
        let promise = Promise::<()>::new();
        assert_eq!(promise.wait_timeout(Duration::from_millis(10)), None);
        promise.cancel();
        assert_eq!(
            promise.wait_timeout(Duration::from_millis(10)),
            Some(Err(TaskError::Cancelled))
        );
    }

    #[test]
    fn unbounded_timeout_waits_for_completion() {
        let promise = Promise::<u8>::new();
        let remote = promise.clone();
        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(5));
            remote.resolve(3);
        });
        assert_eq!(promise.wait_timeout(Duration::MAX), Some(Ok(3)));
    }

    #[test]
    fn future_resolves_after_completion() {
        let promise = Promise::<&'static str>::new();
        let remote = promise.clone();
        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(5));
            remote.resolve("done");
        });
        assert_eq!(futures::executor::block_on(promise), Ok("done"));
    }
}
