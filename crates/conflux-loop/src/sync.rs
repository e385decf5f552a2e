//! 原子类型垫片：`cfg(loom)` 下切换为 Loom 的可建模实现。

#[cfg(not(loom))]
pub(crate) use core::sync::atomic::{AtomicUsize, Ordering};
#[cfg(loom)]
pub(crate) use loom::sync::atomic::{AtomicUsize, Ordering};
