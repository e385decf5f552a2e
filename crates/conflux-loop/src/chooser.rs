//! 亲和性感知的事件循环选择器。
//!
//! # 模块定位（Why）
//! - 事件循环组每接到一次派发请求都要挑选一个循环；若调用方本身就运行在组内某个循环的线程上，
//!   把工作留在该循环可避免跨线程交接与缓存失效；
//! - 否则按轮询均衡负载。循环数量为 2 的幂时用位掩码替代取模。
//!
//! # 核心机制（How）
//! - 选择策略在构造时由 [`EventLoopChooserFactory`] 按池形状确定，之后以枚举分派，热路径无虚调用；
//! - 轮询计数器是派发路径上唯一的跨线程可变状态，使用 `Relaxed` 原子自增：
//!   只要求各调用拿到互不相同的序号，不承担任何同步职责；
//! - 计数器取自增前的值，因此第一次非亲和选择落在下标 0。
//!
//! # 风险与取舍（Trade-offs）
//! - 亲和扫描是 O(P) 线性查找，P 为循环数量，通常不超过 CPU 核数；
//! - 计数器回绕后通用策略仍以无符号取模得到合法下标，位掩码策略天然不受影响。

use std::fmt;
use std::sync::Arc;
use std::thread::{self, ThreadId};

use crate::error::LoopError;
use crate::sync::{AtomicUsize, Ordering};

/// 选择器对事件循环的唯一要求：报告其所在线程。
pub trait LoopExecutor: Send + Sync + 'static {
    /// 循环线程的身份；尚未启动或不绑定线程时返回 `None`。
    fn owner_thread(&self) -> Option<ThreadId>;
}

fn affine<E: LoopExecutor>(executors: &[Arc<E>]) -> Option<&Arc<E>> {
    let current = thread::current().id();
    executors
        .iter()
        .find(|executor| executor.owner_thread() == Some(current))
}

/// 循环数量为 2 的幂时使用的位掩码轮询选择器。
pub struct PowerOfTwoChooser<E> {
    executors: Arc<[Arc<E>]>,
    counter: AtomicUsize,
    mask: usize,
}

impl<E: LoopExecutor> PowerOfTwoChooser<E> {
    fn new(executors: Arc<[Arc<E>]>) -> Self {
        let mask = executors.len() - 1;
        Self {
            executors,
            counter: AtomicUsize::new(0),
            mask,
        }
    }

    /// 亲和命中则返回当前线程的循环，否则以位掩码轮询。
    pub fn next(&self) -> &Arc<E> {
        if self.executors.len() == 1 {
            return &self.executors[0];
        }
        if let Some(executor) = affine(&self.executors) {
            return executor;
        }
        let index = self.counter.fetch_add(1, Ordering::Relaxed) & self.mask;
        &self.executors[index]
    }
}

/// 任意循环数量下使用的取模轮询选择器。
pub struct GenericChooser<E> {
    executors: Arc<[Arc<E>]>,
    counter: AtomicUsize,
}

impl<E: LoopExecutor> GenericChooser<E> {
    fn new(executors: Arc<[Arc<E>]>) -> Self {
        Self {
            executors,
            counter: AtomicUsize::new(0),
        }
    }

    /// 亲和命中则返回当前线程的循环，否则以取模轮询。
    pub fn next(&self) -> &Arc<E> {
        if let Some(executor) = affine(&self.executors) {
            return executor;
        }
        let index = self.counter.fetch_add(1, Ordering::Relaxed) % self.executors.len();
        &self.executors[index]
    }
}

/// 事件循环选择器，策略在构造时固定。
pub enum EventExecutorChooser<E> {
    PowerOfTwo(PowerOfTwoChooser<E>),
    Generic(GenericChooser<E>),
}

impl<E: LoopExecutor> EventExecutorChooser<E> {
    /// 选出下一个事件循环：优先当前线程所属的循环，否则轮询。
    pub fn next(&self) -> &Arc<E> {
        match self {
            EventExecutorChooser::PowerOfTwo(chooser) => chooser.next(),
            EventExecutorChooser::Generic(chooser) => chooser.next(),
        }
    }

    /// 构造时传入的循环池，顺序不变。
    pub fn executors(&self) -> &[Arc<E>] {
        match self {
            EventExecutorChooser::PowerOfTwo(chooser) => &chooser.executors,
            EventExecutorChooser::Generic(chooser) => &chooser.executors,
        }
    }

    /// 循环数量。
    pub fn len(&self) -> usize {
        self.executors().len()
    }

    /// 恒为 `false`：工厂拒绝空池。
    pub fn is_empty(&self) -> bool {
        self.executors().is_empty()
    }
}

impl<E> fmt::Debug for EventExecutorChooser<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (strategy, len) = match self {
            EventExecutorChooser::PowerOfTwo(chooser) => ("power_of_two", chooser.executors.len()),
            EventExecutorChooser::Generic(chooser) => ("generic", chooser.executors.len()),
        };
        f.debug_struct("EventExecutorChooser")
            .field("strategy", &strategy)
            .field("executors", &len)
            .finish()
    }
}

/// 按池形状构造选择器的无状态工厂。
#[derive(Clone, Copy, Debug, Default)]
pub struct EventLoopChooserFactory;

impl EventLoopChooserFactory {
    /// 进程级共享实例。
    pub const INSTANCE: EventLoopChooserFactory = EventLoopChooserFactory;

    /// 为给定循环池构造选择器；空池返回 `InvalidArgument`。
    pub fn new_chooser<E: LoopExecutor>(
        &self,
        executors: Arc<[Arc<E>]>,
    ) -> Result<EventExecutorChooser<E>, LoopError> {
        if executors.is_empty() {
            return Err(LoopError::InvalidArgument(
                "event loop pool must not be empty".to_owned(),
            ));
        }
        if executors.len().is_power_of_two() {
            Ok(EventExecutorChooser::PowerOfTwo(PowerOfTwoChooser::new(
                executors,
            )))
        } else {
            Ok(EventExecutorChooser::Generic(GenericChooser::new(executors)))
        }
    }
}
