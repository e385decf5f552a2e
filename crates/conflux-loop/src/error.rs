//! # error 模块说明
//!
//! ## 角色定位（Why）
//! - 统一事件循环组在构建、派发、注册与配置阶段的失败表达；
//! - 任务自身的执行结果由 [`TaskError`](crate::TaskError) 承载，二者分离：前者描述“交不进去”，
//!   后者描述“交进去之后没有成功”。
//!
//! ## 设计要求（What）
//! - 派生 [`thiserror::Error`]；每个变体提供稳定错误码（[`LoopError::code`]）。

use std::io;

use thiserror::Error;

use crate::channel::NativeLoopHandle;

/// 事件循环相关稳定错误码。
pub mod codes {
    /// 调用方传入的参数不合法（空池、非原生通道等）。
    pub const INVALID_ARGUMENT: &str = "conflux.loop.invalid_argument";
    /// 组内没有任何事件循环持有目标原生句柄。
    pub const INVALID_STATE: &str = "conflux.loop.invalid_state";
    /// 任务因关闭或积压上限被拒绝。
    pub const REJECTED: &str = "conflux.loop.rejected";
    /// 配置解析或校验失败。
    pub const CONFIG: &str = "conflux.loop.config";
    /// 事件循环线程创建失败。
    pub const SPAWN: &str = "conflux.loop.spawn";
    /// 通道在目标循环上注册失败。
    pub const REGISTRATION: &str = "conflux.loop.registration";
}

/// 事件循环错误域。
///
/// # 教案式说明
/// - **意图 (Why)**：区分调用方错误（`InvalidArgument`/`Config`）、拓扑错误（`InvalidState`）、
///   背压与生命周期（`Rejected`）以及操作系统失败（`Spawn`），便于上层选择重试、降级或告警；
/// - **契约 (What)**：`InvalidState` 携带无人认领的原生句柄，日志与错误信息可直接定位到具体通道；
/// - **设计权衡 (Trade-offs)**：`Rejected` 仅携带静态原因，热路径拒绝不分配。
#[derive(Debug, Error)]
pub enum LoopError {
    /// 参数不合法。
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// 组内没有事件循环持有 `handle`。
    #[error("no event loop in this group owns native handle {handle}")]
    InvalidState { handle: NativeLoopHandle },

    /// 任务被拒绝。
    #[error("task rejected: {0}")]
    Rejected(&'static str),

    /// 配置无效。
    #[error("invalid configuration: {0}")]
    Config(String),

    /// 线程创建失败。
    #[error("failed to spawn event loop thread")]
    Spawn(#[source] io::Error),

    /// 通道注册失败。
    #[error("channel registration failed: {0}")]
    Registration(String),
}

impl LoopError {
    /// 返回稳定错误码。
    pub fn code(&self) -> &'static str {
        match self {
            LoopError::InvalidArgument(_) => codes::INVALID_ARGUMENT,
            LoopError::InvalidState { .. } => codes::INVALID_STATE,
            LoopError::Rejected(_) => codes::REJECTED,
            LoopError::Config(_) => codes::CONFIG,
            LoopError::Spawn(_) => codes::SPAWN,
            LoopError::Registration(_) => codes::REGISTRATION,
        }
    }
}
