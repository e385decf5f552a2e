//! 通道能力与原生事件循环句柄。
//!
//! # 模块定位（Why）
//! - 原生通道（例如已绑定到某个 epoll/kqueue 实例的套接字）只能在创建它的那个事件循环上注册；
//!   事件循环组据此把注册请求路由到句柄匹配的循环，而不是交给负载均衡器随意挑选；
//! - 句柄对本 crate 而言是不透明的身份值，只用于相等比较。
//!
//! # 契约说明（What）
//! - [`Channel::as_native`] 默认返回 `None`；原生通道覆盖它并返回自身；
//! - [`NativeChannel::register_with`] 总在目标事件循环线程上调用。

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::LoopError;
use crate::event_loop::EventLoop;

static NEXT_HANDLE: AtomicU64 = AtomicU64::new(1);

/// 进程内唯一的原生事件循环身份。
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct NativeLoopHandle(u64);

impl NativeLoopHandle {
    /// 分配一个新的、不与任何已分配句柄重复的身份。
    pub fn allocate() -> Self {
        Self(NEXT_HANDLE.fetch_add(1, Ordering::Relaxed))
    }

    /// 句柄的数值形式，仅用于日志与诊断。
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for NativeLoopHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "native-loop#{}", self.0)
    }
}

/// 可被事件循环组接收的通道。
pub trait Channel: Send + Sync + 'static {
    /// 若通道绑定了原生事件循环，返回其原生能力视图。
    fn as_native(self: Arc<Self>) -> Option<Arc<dyn NativeChannel>> {
        None
    }
}

/// 绑定到特定原生事件循环的通道。
pub trait NativeChannel: Channel {
    /// 通道所属原生事件循环的身份。
    fn native_loop_handle(&self) -> NativeLoopHandle;

    /// 在 `event_loop` 的线程上完成注册。
    fn register_with(&self, event_loop: &EventLoop) -> Result<(), LoopError>;
}
