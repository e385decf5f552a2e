//! 线程本地的分片列表暂存池。
//!
//! # 模块定位（Why）
//! - 构建分片序列时需要一个可增长的临时列表收集 `&[u8]`，逐次分配会在热路径上制造抖动；
//! - 每个线程维护一条自由链表（Free List），租借时优先复用已有容量，归还时清空后放回。
//!
//! # 核心机制（How）
//! - [`ScratchList`] 是租约守卫：`checkout` 取出列表，`Drop` 时无论正常返回还是 `?` 提前退出都会归还；
//! - 池中只保存**空**列表，借助 `into_iter().filter_map(..).collect()` 的原地收集在不同生命周期之间
//!   转换元素类型，从而复用同一块堆内存；
//! - 进程级原子计数记录租借、复用与新分配次数，供 [`statistics`] 快照读取。
//!
//! # 设计权衡（Trade-offs）
//! - 每线程最多保留 [`MAX_POOLED_LISTS`] 条列表，容量超过 [`MAX_RETAINED_CAPACITY`] 的列表直接释放，
//!   防止一次超大请求长期占住内存；
//! - 线程退出后本地池随之销毁，`try_with` 保证析构期间的归还静默降级为释放。

use alloc::vec::Vec;
use core::mem;
use core::sync::atomic::{AtomicU64, Ordering};
use std::cell::RefCell;

/// 每个线程最多缓存的空闲列表数。
pub const MAX_POOLED_LISTS: usize = 8;

/// 归还时允许保留的最大列表容量（元素个数）。
pub const MAX_RETAINED_CAPACITY: usize = 1024;

thread_local! {
    static FREE_LISTS: RefCell<Vec<Vec<&'static [u8]>>> = const { RefCell::new(Vec::new()) };
}

static CHECKOUTS: AtomicU64 = AtomicU64::new(0);
static REUSES: AtomicU64 = AtomicU64::new(0);
static ALLOCATIONS: AtomicU64 = AtomicU64::new(0);

/// 暂存池的进程级统计快照。
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct ScratchStats {
    /// 累计租借次数。
    pub checkouts: u64,
    /// 命中自由链表的次数。
    pub reuses: u64,
    /// 自由链表为空而新分配的次数。
    pub allocations: u64,
}

/// 读取统计快照。
pub fn statistics() -> ScratchStats {
    ScratchStats {
        checkouts: CHECKOUTS.load(Ordering::Relaxed),
        reuses: REUSES.load(Ordering::Relaxed),
        allocations: ALLOCATIONS.load(Ordering::Relaxed),
    }
}

/// 当前线程自由链表中的列表数。
pub fn pooled_lists() -> usize {
    FREE_LISTS
        .try_with(|lists| lists.borrow().len())
        .unwrap_or(0)
}

/// 清空列表并把元素生命周期转换为 `'b`，原地收集会复用原有分配。
fn recycle<'a, 'b>(mut list: Vec<&'a [u8]>) -> Vec<&'b [u8]> {
    list.clear();
    list.into_iter().filter_map(|_| None).collect()
}

/// 从暂存池租借的分片列表。
pub(crate) struct ScratchList<'a> {
    segments: Vec<&'a [u8]>,
}

impl<'a> ScratchList<'a> {
    /// 租借一条至少能容纳 `min_capacity` 个分片的空列表。
    pub(crate) fn checkout(min_capacity: usize) -> Self {
        CHECKOUTS.fetch_add(1, Ordering::Relaxed);
        let reused = FREE_LISTS
            .try_with(|lists| lists.borrow_mut().pop())
            .ok()
            .flatten();
        let segments = match reused {
            Some(list) => {
                REUSES.fetch_add(1, Ordering::Relaxed);
                let mut list = recycle(list);
                list.reserve(min_capacity);
                list
            }
            None => {
                ALLOCATIONS.fetch_add(1, Ordering::Relaxed);
                Vec::with_capacity(min_capacity)
            }
        };
        Self { segments }
    }

    pub(crate) fn push(&mut self, segment: &'a [u8]) {
        self.segments.push(segment);
    }

    pub(crate) fn extend_from_slice(&mut self, segments: &[&'a [u8]]) {
        self.segments.extend_from_slice(segments);
    }

    pub(crate) fn as_slice(&self) -> &[&'a [u8]] {
        &self.segments
    }
}

impl Drop for ScratchList<'_> {
    fn drop(&mut self) {
        let list = mem::take(&mut self.segments);
        if list.capacity() == 0 || list.capacity() > MAX_RETAINED_CAPACITY {
            return;
        }
        let list: Vec<&'static [u8]> = recycle(list);
        let _ = FREE_LISTS.try_with(|lists| {
            let mut lists = lists.borrow_mut();
            if lists.len() < MAX_POOLED_LISTS {
                lists.push(list);
            }
        });
    }
}
