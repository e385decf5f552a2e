//! `conflux-loop` 提供单线程事件循环、亲和性感知的循环选择与原生通道注册。
//!
//! # 模块定位（Why）
//! - 每个事件循环独占一个线程，组内工作按“就近优先、其余轮询”的策略派发；
//! - 原生通道只能回到持有同一原生句柄的循环注册，组负责完成这次路由。
//!
//! # 设计概要（How）
//! - `promise`：跨线程一次性完成句柄，支持阻塞等待与 `.await`；
//! - `task`：按 `(deadline, id)` 排序的调度任务及其扩展点 [`ScheduledWork`]；
//! - `event_loop`：独占线程的 [`EventLoop`]，含立即队列、定时队列与拒绝策略；
//! - `chooser`：[`EventExecutorChooser`] 及其工厂；
//! - `group`：[`EventLoopGroup`]，组合以上能力并处理通道注册；
//! - [`telemetry`]：`tracing-subscriber` 安装入口。
//!
//! # Loom
//! - 轮询计数器经 `sync` 垫片取用原子类型，`RUSTFLAGS="--cfg loom"` 配合 `loom-model` Feature
//!   切换为 Loom 实现。

mod channel;
mod chooser;
mod config;
mod error;
mod event_loop;
mod group;
mod promise;
mod sync;
mod task;
pub mod telemetry;

pub use channel::{Channel, NativeChannel, NativeLoopHandle};
pub use chooser::{
    EventExecutorChooser, EventLoopChooserFactory, GenericChooser, LoopExecutor, PowerOfTwoChooser,
};
pub use config::EventLoopGroupConfig;
pub use error::{LoopError, codes};
pub use event_loop::{EventLoop, current_loop_handle};
pub use group::EventLoopGroup;
pub use promise::{Promise, TaskError, TaskResult};
pub use task::{ActionWithContext, ScheduledTask, ScheduledWork, TaskOutcome};
