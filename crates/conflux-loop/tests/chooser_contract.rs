//! `chooser_contract` 集成测试：校验选择器的轮询均衡与线程亲和性。
//!
//! # 测试总览（Why）
//! - 非亲和线程上的连续选择必须按 0,1,…,P-1 循环访问每个循环，两种策略一致；
//! - 运行在某循环线程上的调用方必须总是拿回该循环，且不消耗轮询序号；
//! - 以 `Probe` 替身隔离真实线程，只模拟 `owner_thread` 报告。
#![cfg(not(loom))]

use std::sync::Arc;
use std::thread::{self, ThreadId};

use conflux_loop::{EventExecutorChooser, EventLoopChooserFactory, LoopError, LoopExecutor};
use proptest::prelude::*;

struct Probe {
    owner: Option<ThreadId>,
}

impl LoopExecutor for Probe {
    fn owner_thread(&self) -> Option<ThreadId> {
        self.owner
    }
}

fn unowned(len: usize) -> Arc<[Arc<Probe>]> {
    (0..len).map(|_| Arc::new(Probe { owner: None })).collect()
}

fn picks(chooser: &EventExecutorChooser<Probe>, rounds: usize) -> Vec<usize> {
    (0..rounds)
        .map(|_| {
            let picked = chooser.next();
            chooser
                .executors()
                .iter()
                .position(|executor| Arc::ptr_eq(executor, picked))
                .expect("选择结果必须来自池内")
        })
        .collect()
}

/// 四个循环的池从下标 0 开始轮询。
#[test]
fn power_of_two_round_robin_starts_at_zero() {
    let chooser = EventLoopChooserFactory::INSTANCE
        .new_chooser(unowned(4))
        .expect("非空池");
    assert!(matches!(chooser, EventExecutorChooser::PowerOfTwo(_)));
    assert_eq!(picks(&chooser, 6), vec![0, 1, 2, 3, 0, 1]);
}

/// 非 2 的幂池同样逐一访问每个循环。
#[test]
fn generic_round_robin_visits_each_loop_once_per_cycle() {
    let chooser = EventLoopChooserFactory::INSTANCE
        .new_chooser(unowned(3))
        .expect("非空池");
    assert!(matches!(chooser, EventExecutorChooser::Generic(_)));
    assert_eq!(picks(&chooser, 7), vec![0, 1, 2, 0, 1, 2, 0]);
}

/// 单循环池总是返回唯一循环。
#[test]
fn single_loop_pool_always_returns_it() {
    let chooser = EventLoopChooserFactory::INSTANCE
        .new_chooser(unowned(1))
        .expect("非空池");
    assert_eq!(picks(&chooser, 3), vec![0, 0, 0]);
}

/// 空池在构造阶段即被拒绝。
#[test]
fn empty_pool_is_invalid_argument() {
    let err = EventLoopChooserFactory::INSTANCE
        .new_chooser(unowned(0))
        .expect_err("空池");
    assert!(matches!(err, LoopError::InvalidArgument(_)));
}

/// 运行在循环线程上的调用方总是拿回该循环，且轮询序号不被消耗。
#[test]
fn affinity_wins_over_round_robin() {
    for len in [4usize, 5] {
        let chooser = thread::scope(|scope| {
            scope
                .spawn(|| {
                    let me = thread::current().id();
                    let pool: Arc<[Arc<Probe>]> = (0..len)
                        .map(|i| {
                            Arc::new(Probe {
                                owner: (i == 2).then_some(me),
                            })
                        })
                        .collect();
                    let chooser = EventLoopChooserFactory::INSTANCE
                        .new_chooser(pool)
                        .expect("非空池");
                    assert_eq!(picks(&chooser, 5), vec![2; 5], "亲和线程应总是拿回自身循环");
                    chooser
                })
                .join()
                .expect("亲和线程不应 panic")
        });
        assert_eq!(picks(&chooser, 3), vec![0, 1, 2], "亲和选择不应推进轮询计数器");
    }
}

proptest! {
    /// 任意池大小下，连续 `rounds` 次非亲和选择的第 i 次落在下标 `i % len`。
    #[test]
    fn prop_round_robin_is_cyclic(len in 1usize..33, rounds in 0usize..100) {
        let chooser = EventLoopChooserFactory::INSTANCE
            .new_chooser(unowned(len))
            .expect("非空池");
        let expected: Vec<usize> = (0..rounds).map(|i| i % len).collect();
        prop_assert_eq!(picks(&chooser, rounds), expected);
    }
}
