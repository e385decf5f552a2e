//! 带截止时间的调度任务。
//!
//! # 模块定位（Why）
//! - 事件循环除立即任务外还需执行延时任务与固定频率任务，二者共享同一优先队列；
//! - 优先队列按 `(deadline, id)` 排序：截止时间相同的任务按入队顺序执行。
//!
//! # 核心机制（How）
//! - [`ScheduledWork`] 是唯一的扩展点，闭包与 [`ActionWithContext`] 均实现它；
//! - 固定频率任务的下一次截止时间以**上一次截止时间**加周期计算，执行耗时不会累积漂移；
//! - 取消通过完成句柄表达，循环在任务浮出队首时丢弃已取消任务。

use std::cmp::Ordering;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::time::{Duration, Instant};

use tracing::{trace, warn};

use crate::promise::{Promise, TaskError};

/// 可被调度执行的工作单元。
pub trait ScheduledWork: Send + 'static {
    /// 执行一次。返回错误时任务终止，完成句柄以该错误失败。
    fn execute(&mut self) -> Result<(), TaskError>;
}

impl<F> ScheduledWork for F
where
    F: FnMut() + Send + 'static,
{
    fn execute(&mut self) -> Result<(), TaskError> {
        self();
        Ok(())
    }
}

/// 携带上下文与可变状态的动作。
///
/// 每次执行以 `(&context, &mut state)` 调用动作，状态在周期执行之间保留。
pub struct ActionWithContext<C, S> {
    action: Box<dyn FnMut(&C, &mut S) -> Result<(), TaskError> + Send>,
    context: C,
    state: S,
}

impl<C, S> ActionWithContext<C, S>
where
    C: Send + 'static,
    S: Send + 'static,
{
    /// 以上下文、初始状态与动作构造。
    pub fn new<F>(context: C, state: S, action: F) -> Self
    where
        F: FnMut(&C, &mut S) -> Result<(), TaskError> + Send + 'static,
    {
        Self {
            action: Box::new(action),
            context,
            state,
        }
    }

    /// 只读上下文。
    pub fn context(&self) -> &C {
        &self.context
    }

    /// 当前状态。
    pub fn state(&self) -> &S {
        &self.state
    }
}

impl<C, S> ScheduledWork for ActionWithContext<C, S>
where
    C: Send + 'static,
    S: Send + 'static,
{
    fn execute(&mut self) -> Result<(), TaskError> {
        (self.action)(&self.context, &mut self.state)
    }
}

/// [`ScheduledTask::run`] 的结果。
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TaskOutcome {
    /// 任务已结束，不再入队。
    Retired,
    /// 周期任务，已推进截止时间，需要重新入队。
    Requeue,
}

/// 调度任务。
///
/// # 契约说明（What）
/// - `id` 由事件循环在入队时分配，单个循环内单调递增；
/// - 零周期视为一次性任务；
/// - 排序与相等性只看 `(deadline, id)`。
pub struct ScheduledTask {
    id: u64,
    deadline: Instant,
    period: Option<Duration>,
    completion: Promise<()>,
    work: Box<dyn ScheduledWork>,
}

impl ScheduledTask {
    /// 在 `deadline` 执行一次的任务。
    pub fn once<W: ScheduledWork>(deadline: Instant, work: W) -> Self {
        Self::new(deadline, None, work)
    }

    /// 从 `deadline` 开始、每隔 `period` 执行一次的任务。
    pub fn periodic<W: ScheduledWork>(deadline: Instant, period: Duration, work: W) -> Self {
        Self::new(deadline, Some(period), work)
    }

    fn new<W: ScheduledWork>(deadline: Instant, period: Option<Duration>, work: W) -> Self {
        Self {
            id: 0,
            deadline,
            period: period.filter(|period| !period.is_zero()),
            completion: Promise::new(),
            work: Box::new(work),
        }
    }

    /// 入队时分配的序号，入队前为 0。
    pub fn id(&self) -> u64 {
        self.id
    }

    pub(crate) fn assign_id(&mut self, id: u64) {
        self.id = id;
    }

    /// 下一次执行的截止时间。
    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// 执行周期；一次性任务为 `None`。
    pub fn period(&self) -> Option<Duration> {
        self.period
    }

    /// 完成句柄：一次性任务执行后完成，周期任务只在失败或取消时完成。
    pub fn completion(&self) -> Promise<()> {
        self.completion.clone()
    }

    /// 取消任务；任务已完成时返回 `false`。
    pub fn cancel(&self) -> bool {
        self.completion.cancel()
    }

    /// 是否已被取消。
    pub fn is_cancelled(&self) -> bool {
        self.completion.is_cancelled()
    }

    /// 执行一次并决定任务去向。
    ///
    /// 周期任务的下一次截止时间超出 `Instant` 可表示范围时，完成句柄以 `Failed` 失败并退役。
    pub fn run(&mut self) -> TaskOutcome {
        if self.completion.is_done() {
            return TaskOutcome::Retired;
        }

        trace!(task_id = self.id, periodic = self.period.is_some(), "running scheduled task");
        match panic::catch_unwind(AssertUnwindSafe(|| self.work.execute())) {
            Ok(Ok(())) => match self.period {
                Some(period) => match self.deadline.checked_add(period) {
                    Some(next) => {
                        self.deadline = next;
                        TaskOutcome::Requeue
                    }
                    None => {
                        warn!(task_id = self.id, ?period, "periodic task deadline overflowed");
                        self.completion.reject(TaskError::Failed(
                            "next deadline is out of range".to_owned(),
                        ));
                        TaskOutcome::Retired
                    }
                },
                None => {
                    self.completion.resolve(());
                    TaskOutcome::Retired
                }
            },
            Ok(Err(error)) => {
                self.completion.reject(error);
                TaskOutcome::Retired
            }
            Err(_) => {
                warn!(task_id = self.id, "scheduled task panicked");
                self.completion.reject(TaskError::Panicked);
                TaskOutcome::Retired
            }
        }
    }
}

impl PartialEq for ScheduledTask {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for ScheduledTask {}

impl PartialOrd for ScheduledTask {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ScheduledTask {
    fn cmp(&self, other: &Self) -> Ordering {
        self.deadline
            .cmp(&other.deadline)
            .then_with(|| self.id.cmp(&other.id))
    }
}

impl fmt::Debug for ScheduledTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScheduledTask")
            .field("id", &self.id)
            .field("deadline", &self.deadline)
            .field("period", &self.period)
            .field("completion", &self.completion)
            .finish()
    }
}
