//! 事件循环组。
//!
//! # 模块定位（Why）
//! - 组持有固定数量的单线程事件循环，对外提供“挑一个循环执行”的统一入口；
//! - 原生通道例外：它们已经绑定在某个原生循环上，必须回到持有同一原生句柄的那个循环注册，
//!   否则后续 I/O 事件会在错误的线程上触发。
//!
//! # 契约说明（What）
//! - [`EventLoopGroup::next`] 经由 [`EventExecutorChooser`] 选择循环，当前线程若属于组内某循环则返回该循环；
//! - [`EventLoopGroup::register_channel`]：非原生通道返回 `InvalidArgument`；句柄无人认领返回
//!   `InvalidState` 并记录 `warn` 日志；否则委托给匹配循环的 [`EventLoop::register`]；
//! - 组被丢弃时优雅关闭全部循环。

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::channel::Channel;
use crate::chooser::{EventExecutorChooser, EventLoopChooserFactory};
use crate::config::EventLoopGroupConfig;
use crate::error::LoopError;
use crate::event_loop::EventLoop;
use crate::promise::Promise;

/// 多个单线程事件循环组成的调度组。
pub struct EventLoopGroup {
    loops: Arc<[Arc<EventLoop>]>,
    chooser: EventExecutorChooser<EventLoop>,
}

impl EventLoopGroup {
    /// 按配置启动事件循环并构造选择器。
    pub fn new(config: EventLoopGroupConfig) -> Result<Self, LoopError> {
        config.validate()?;
        let count = config.resolved_loop_count();
        let loops = (0..count)
            .map(|index| EventLoop::spawn(index, &config).map(Arc::new))
            .collect::<Result<Arc<[_]>, _>>()?;
        let chooser = EventLoopChooserFactory::INSTANCE.new_chooser(Arc::clone(&loops))?;
        debug!(loops = count, chooser = ?chooser, "event loop group started");
        Ok(Self { loops, chooser })
    }

    /// 组内全部事件循环。
    pub fn loops(&self) -> &[Arc<EventLoop>] {
        &self.loops
    }

    /// 选出下一个事件循环。
    pub fn next(&self) -> &Arc<EventLoop> {
        self.chooser.next()
    }

    /// 把原生通道注册到持有相同原生句柄的事件循环。
    pub fn register_channel(&self, channel: Arc<dyn Channel>) -> Result<Promise<()>, LoopError> {
        let Some(native) = channel.as_native() else {
            return Err(LoopError::InvalidArgument(
                "channel is not bound to a native event loop".to_owned(),
            ));
        };
        let handle = native.native_loop_handle();
        match self
            .loops
            .iter()
            .find(|event_loop| event_loop.native_handle() == handle)
        {
            Some(event_loop) => event_loop.register(native),
            None => {
                warn!(
                    %handle,
                    loops = self.loops.len(),
                    "no event loop in this group owns the channel's native handle"
                );
                Err(LoopError::InvalidState { handle })
            }
        }
    }

    /// 经选择器挑选的循环执行立即任务。
    pub fn execute<F>(&self, job: F) -> Result<(), LoopError>
    where
        F: FnOnce() + Send + 'static,
    {
        self.next().execute(job)
    }

    /// 经选择器挑选的循环执行带返回值的任务。
    pub fn submit<T, F>(&self, job: F) -> Result<Promise<T>, LoopError>
    where
        T: Send + 'static,
        F: FnOnce() -> T + Send + 'static,
    {
        self.next().submit(job)
    }

    /// 经选择器挑选的循环延迟执行。
    pub fn schedule<F>(&self, delay: Duration, job: F) -> Result<Promise<()>, LoopError>
    where
        F: FnOnce() + Send + 'static,
    {
        self.next().schedule(delay, job)
    }

    /// 关闭全部事件循环并等待线程退出。
    pub fn shutdown_gracefully(&self) {
        for event_loop in self.loops.iter() {
            event_loop.shutdown_gracefully();
        }
    }

    /// 全部循环是否都已开始关闭。
    pub fn is_shutting_down(&self) -> bool {
        self.loops.iter().all(|event_loop| event_loop.is_shutting_down())
    }
}

impl Drop for EventLoopGroup {
    fn drop(&mut self) {
        self.shutdown_gracefully();
    }
}

impl std::fmt::Debug for EventLoopGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventLoopGroup")
            .field("loops", &self.loops)
            .field("chooser", &self.chooser)
            .finish()
    }
}
