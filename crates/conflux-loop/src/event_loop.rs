//! 单线程事件循环。
//!
//! # 模块定位（Why）
//! - 每个事件循环独占一个操作系统线程与一个原生循环句柄，组内的通道注册、定时任务与普通任务
//!   都在该线程上串行执行，通道状态因此无需加锁；
//! - 调用方线程只做入队与唤醒，任何提交操作都不会阻塞在任务执行上。
//!
//! # 核心机制（How）
//! - `parking_lot::Mutex` 保护立即队列（`VecDeque`）与定时队列（按 `(deadline, id)` 排序的小顶堆），
//!   `Condvar` 在入队与关闭时唤醒循环线程；
//! - 每一轮先按 FIFO 执行全部立即任务，再执行所有已到期的定时任务，随后休眠到
//!   “下一个截止时间”与“breakout 间隔”二者中较早的一个；
//! - 循环线程启动时写入线程本地的“当前循环”标记，[`current_loop_handle`] 据此判断调用方是否
//!   处于某个事件循环内。
//!
//! # 契约说明（What）
//! - 积压任务数达到 `max_pending_tasks` 或循环已开始关闭时，提交返回 [`LoopError::Rejected`]；
//!   已取消的定时任务不计入积压，循环每个 breakout 间隔至少清理一次定时队列中的已取消任务；
//! - 延迟换算出的截止时间超出 `Instant` 可表示范围时，调度返回 [`LoopError::InvalidArgument`]；
//! - 关闭流程：停止接收新任务，执行完已入队的立即任务，取消剩余定时任务，然后线程退出；
//! - 任务 panic 被捕获并记录，不会终止循环线程。

use std::cell::Cell;
use std::cmp::Reverse;
use std::collections::{BinaryHeap, VecDeque};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle, ThreadId};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tracing::{debug, trace, warn};

use crate::channel::{NativeChannel, NativeLoopHandle};
use crate::chooser::LoopExecutor;
use crate::config::EventLoopGroupConfig;
use crate::error::LoopError;
use crate::promise::{Promise, TaskError};
use crate::task::{ScheduledTask, ScheduledWork, TaskOutcome};

type Job = Box<dyn FnOnce() + Send + 'static>;

thread_local! {
    static CURRENT_LOOP: Cell<Option<NativeLoopHandle>> = const { Cell::new(None) };
}

/// 当前线程所属事件循环的原生句柄；不在事件循环线程上时返回 `None`。
pub fn current_loop_handle() -> Option<NativeLoopHandle> {
    CURRENT_LOOP.try_with(Cell::get).ok().flatten()
}

struct Queues {
    immediate: VecDeque<Job>,
    scheduled: BinaryHeap<Reverse<ScheduledTask>>,
    next_task_id: u64,
    shutting_down: bool,
}

impl Queues {
    fn pending(&self) -> usize {
        self.immediate.len() + self.scheduled.len()
    }

    /// 移除定时队列中已取消的任务，返回移除数量。
    fn purge_cancelled(&mut self) -> usize {
        let before = self.scheduled.len();
        self.scheduled.retain(|Reverse(task)| !task.is_cancelled());
        before - self.scheduled.len()
    }

    fn next_deadline(&self) -> Option<Instant> {
        self.scheduled.peek().map(|Reverse(task)| task.deadline())
    }

    fn take_due(&mut self, now: Instant) -> Vec<ScheduledTask> {
        let mut due = Vec::new();
        while self
            .scheduled
            .peek()
            .is_some_and(|Reverse(task)| task.deadline() <= now)
        {
            if let Some(Reverse(task)) = self.scheduled.pop() {
                due.push(task);
            }
        }
        due
    }
}

struct Shared {
    handle: NativeLoopHandle,
    queues: Mutex<Queues>,
    wakeup: Condvar,
    breakout_interval: Duration,
    max_pending_tasks: usize,
}

impl Shared {
    fn admit(&self, queues: &mut Queues) -> Result<(), LoopError> {
        if queues.shutting_down {
            return Err(LoopError::Rejected("event loop is shutting down"));
        }
        if queues.pending() >= self.max_pending_tasks
            && (queues.purge_cancelled() == 0 || queues.pending() >= self.max_pending_tasks)
        {
            return Err(LoopError::Rejected("event loop pending task limit reached"));
        }
        Ok(())
    }
}

/// 运行在独占线程上的单线程事件循环。
pub struct EventLoop {
    index: usize,
    owner: ThreadId,
    shared: Arc<Shared>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl EventLoop {
    /// 启动第 `index` 个事件循环线程。
    pub fn spawn(index: usize, config: &EventLoopGroupConfig) -> Result<Self, LoopError> {
        config.validate()?;
        let shared = Arc::new(Shared {
            handle: NativeLoopHandle::allocate(),
            queues: Mutex::new(Queues {
                immediate: VecDeque::new(),
                scheduled: BinaryHeap::new(),
                next_task_id: 0,
                shutting_down: false,
            }),
            wakeup: Condvar::new(),
            breakout_interval: config.breakout_interval(),
            max_pending_tasks: config.max_pending_tasks,
        });

        let name = format!("{}-{index}", config.thread_name_prefix);
        let worker = Arc::clone(&shared);
        let join = thread::Builder::new()
            .name(name.clone())
            .spawn(move || run(worker))
            .map_err(LoopError::Spawn)?;
        let owner = join.thread().id();
        debug!(loop_index = index, thread = %name, handle = %shared.handle, "event loop started");

        Ok(Self {
            index,
            owner,
            shared,
            thread: Mutex::new(Some(join)),
        })
    }

    /// 在组内的位置。
    pub fn index(&self) -> usize {
        self.index
    }

    /// 循环线程的身份。
    pub fn owner_thread(&self) -> ThreadId {
        self.owner
    }

    /// 原生循环句柄。
    pub fn native_handle(&self) -> NativeLoopHandle {
        self.shared.handle
    }

    /// 调用方是否运行在本循环线程上。
    pub fn in_event_loop(&self) -> bool {
        current_loop_handle() == Some(self.shared.handle)
    }

    /// 是否已开始关闭。
    pub fn is_shutting_down(&self) -> bool {
        self.shared.queues.lock().shutting_down
    }

    /// 尚未执行的任务数（立即任务与未取消的定时任务之和）。
    pub fn pending_tasks(&self) -> usize {
        let mut queues = self.shared.queues.lock();
        queues.purge_cancelled();
        queues.pending()
    }

    /// 提交立即任务。
    pub fn execute<F>(&self, job: F) -> Result<(), LoopError>
    where
        F: FnOnce() + Send + 'static,
    {
        {
            let mut queues = self.shared.queues.lock();
            self.shared.admit(&mut queues)?;
            queues.immediate.push_back(Box::new(job));
        }
        self.shared.wakeup.notify_one();
        Ok(())
    }

    /// 提交带返回值的任务，返回其完成句柄。
    pub fn submit<T, F>(&self, job: F) -> Result<Promise<T>, LoopError>
    where
        T: Send + 'static,
        F: FnOnce() -> T + Send + 'static,
    {
        let promise = Promise::new();
        let completion = promise.clone();
        self.execute(move || {
            if completion.is_done() {
                return;
            }
            match panic::catch_unwind(AssertUnwindSafe(job)) {
                Ok(value) => {
                    completion.resolve(value);
                }
                Err(_) => {
                    warn!("submitted task panicked");
                    completion.reject(TaskError::Panicked);
                }
            }
        })?;
        Ok(promise)
    }

    /// 延迟 `delay` 后执行一次。
    pub fn schedule<F>(&self, delay: Duration, job: F) -> Result<Promise<()>, LoopError>
    where
        F: FnOnce() + Send + 'static,
    {
        self.schedule_at(deadline_after(delay)?, job)
    }

    /// 在 `deadline` 执行一次。
    pub fn schedule_at<F>(&self, deadline: Instant, job: F) -> Result<Promise<()>, LoopError>
    where
        F: FnOnce() + Send + 'static,
    {
        let mut job = Some(job);
        self.schedule_task(ScheduledTask::once(deadline, move || {
            if let Some(job) = job.take() {
                job();
            }
        }))
    }

    /// 延迟 `initial_delay` 后以固定频率 `period` 重复执行，直到完成句柄被取消。
    pub fn schedule_at_fixed_rate<W>(
        &self,
        initial_delay: Duration,
        period: Duration,
        work: W,
    ) -> Result<Promise<()>, LoopError>
    where
        W: ScheduledWork,
    {
        self.schedule_task(ScheduledTask::periodic(
            deadline_after(initial_delay)?,
            period,
            work,
        ))
    }

    /// 入队已构造的调度任务。
    pub fn schedule_task(&self, mut task: ScheduledTask) -> Result<Promise<()>, LoopError> {
        let completion = task.completion();
        {
            let mut queues = self.shared.queues.lock();
            self.shared.admit(&mut queues)?;
            task.assign_id(queues.next_task_id);
            queues.next_task_id += 1;
            queues.scheduled.push(Reverse(task));
        }
        self.shared.wakeup.notify_one();
        Ok(completion)
    }

    /// 在本循环线程上注册原生通道。
    pub fn register(
        self: &Arc<Self>,
        channel: Arc<dyn NativeChannel>,
    ) -> Result<Promise<()>, LoopError> {
        let promise = Promise::new();
        let completion = promise.clone();
        let event_loop = Arc::clone(self);
        self.execute(move || {
            if completion.is_done() {
                return;
            }
            match channel.register_with(&event_loop) {
                Ok(()) => {
                    trace!(handle = %event_loop.native_handle(), "channel registered");
                    completion.resolve(());
                }
                Err(err) => {
                    warn!(handle = %event_loop.native_handle(), error = %err, "channel registration failed");
                    completion.reject(TaskError::Failed(err.to_string()));
                }
            }
        })?;
        Ok(promise)
    }

    /// 停止接收任务，执行完已入队的立即任务后退出；在其他线程调用时等待线程结束。
    pub fn shutdown_gracefully(&self) {
        {
            let mut queues = self.shared.queues.lock();
            if !queues.shutting_down {
                queues.shutting_down = true;
                debug!(loop_index = self.index, "event loop shutting down");
            }
        }
        self.shared.wakeup.notify_all();

        if thread::current().id() == self.owner {
            return;
        }
        let join = self.thread.lock().take();
        if let Some(join) = join {
            if join.join().is_err() {
                warn!(loop_index = self.index, "event loop thread terminated abnormally");
            }
        }
    }
}

impl LoopExecutor for EventLoop {
    fn owner_thread(&self) -> Option<ThreadId> {
        Some(self.owner)
    }
}

impl Drop for EventLoop {
    fn drop(&mut self) {
        self.shutdown_gracefully();
    }
}

impl fmt::Debug for EventLoop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventLoop")
            .field("index", &self.index)
            .field("handle", &self.shared.handle)
            .field("owner", &self.owner)
            .finish()
    }
}

fn deadline_after(delay: Duration) -> Result<Instant, LoopError> {
    Instant::now().checked_add(delay).ok_or_else(|| {
        LoopError::InvalidArgument(format!(
            "delay {delay:?} exceeds the representable deadline range"
        ))
    })
}

fn run_job(job: Job) {
    if panic::catch_unwind(AssertUnwindSafe(job)).is_err() {
        warn!("event loop job panicked");
    }
}

fn run(shared: Arc<Shared>) {
    CURRENT_LOOP.with(|current| current.set(Some(shared.handle)));
    let mut last_purge = Instant::now();

    loop {
        let (jobs, due) = {
            let mut queues = shared.queues.lock();
            loop {
                let jobs: Vec<Job> = queues.immediate.drain(..).collect();
                if queues.shutting_down {
                    if jobs.is_empty() {
                        let remaining: Vec<_> = queues.scheduled.drain().collect();
                        drop(queues);
                        for Reverse(task) in &remaining {
                            task.cancel();
                        }
                        debug!(
                            handle = %shared.handle,
                            cancelled_tasks = remaining.len(),
                            "event loop terminated"
                        );
                        CURRENT_LOOP.with(|current| current.set(None));
                        return;
                    }
                    break (jobs, Vec::new());
                }

                let now = Instant::now();
                if now.saturating_duration_since(last_purge) >= shared.breakout_interval {
                    let purged = queues.purge_cancelled();
                    if purged > 0 {
                        trace!(handle = %shared.handle, purged, "purged cancelled scheduled tasks");
                    }
                    last_purge = now;
                }
                let due = queues.take_due(now);
                if !jobs.is_empty() || !due.is_empty() {
                    break (jobs, due);
                }
                let breakout = now.checked_add(shared.breakout_interval);
                let wake_at = match (breakout, queues.next_deadline()) {
                    (Some(breakout), Some(deadline)) => Some(breakout.min(deadline)),
                    (breakout, deadline) => breakout.or(deadline),
                };
                match wake_at {
                    Some(wake_at) => {
                        shared.wakeup.wait_until(&mut queues, wake_at);
                    }
                    None => shared.wakeup.wait(&mut queues),
                }
            }
        };

        for job in jobs {
            run_job(job);
        }

        for mut task in due {
            if task.is_cancelled() {
                continue;
            }
            if task.run() == TaskOutcome::Requeue {
                let mut queues = shared.queues.lock();
                if queues.shutting_down {
                    task.cancel();
                } else {
                    queues.scheduled.push(Reverse(task));
                }
            }
        }
    }
}
