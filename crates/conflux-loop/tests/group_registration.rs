//! `group_registration` 集成测试：原生通道注册路由与组级派发。
//!
//! # 测试总览（Why）
//! - 注册必须落在持有同一原生句柄的循环上，并在该循环线程内执行 `register_with`；
//! - 非原生通道与无人认领的句柄分别以 `InvalidArgument`、`InvalidState` 失败；
//! - 在循环线程内经组派发的工作应回到同一循环（亲和性）。
#![cfg(not(loom))]

use std::sync::Arc;
use std::thread::ThreadId;
use std::time::Duration;

use conflux_loop::{
    Channel, EventLoop, EventLoopGroup, EventLoopGroupConfig, LoopError, NativeChannel,
    NativeLoopHandle, TaskError, codes,
};
use parking_lot::Mutex;

fn group(loop_count: usize) -> Arc<EventLoopGroup> {
    let config = EventLoopGroupConfig::default()
        .with_loop_count(loop_count)
        .with_thread_name_prefix("registration")
        .with_breakout_interval(Duration::from_millis(10));
    Arc::new(EventLoopGroup::new(config).expect("启动事件循环组"))
}

/// `Recorder`：记录注册发生在哪个线程、哪个循环上的原生通道替身。
struct Recorder {
    handle: NativeLoopHandle,
    fail_with: Option<&'static str>,
    seen: Mutex<Option<(ThreadId, bool)>>,
}

impl Recorder {
    fn new(handle: NativeLoopHandle) -> Arc<Self> {
        Arc::new(Self {
            handle,
            fail_with: None,
            seen: Mutex::new(None),
        })
    }
}

impl Channel for Recorder {
    fn as_native(self: Arc<Self>) -> Option<Arc<dyn NativeChannel>> {
        Some(self)
    }
}

impl NativeChannel for Recorder {
    fn native_loop_handle(&self) -> NativeLoopHandle {
        self.handle
    }

    fn register_with(&self, event_loop: &EventLoop) -> Result<(), LoopError> {
        *self.seen.lock() = Some((std::thread::current().id(), event_loop.in_event_loop()));
        match self.fail_with {
            Some(reason) => Err(LoopError::Registration(reason.to_owned())),
            None => Ok(()),
        }
    }
}

struct Plain;

impl Channel for Plain {}

/// 注册被路由到句柄匹配的循环，并在该循环线程上执行。
#[test]
fn registration_runs_on_owning_loop() {
    let group = group(3);
    let target = &group.loops()[1];
    let channel = Recorder::new(target.native_handle());

    let promise = group
        .register_channel(channel.clone())
        .expect("句柄属于组内循环");
    assert_eq!(promise.wait_timeout(Duration::from_secs(5)), Some(Ok(())));
    assert_eq!(*channel.seen.lock(), Some((target.owner_thread(), true)));
}

/// `register_with` 的失败通过完成句柄传回。
#[test]
fn registration_failure_rejects_promise() {
    let group = group(2);
    let channel = Arc::new(Recorder {
        handle: group.loops()[0].native_handle(),
        fail_with: Some("socket closed"),
        seen: Mutex::new(None),
    });
    let outcome = group
        .register_channel(channel)
        .expect("句柄属于组内循环")
        .wait();
    match outcome {
        Err(TaskError::Failed(message)) => assert!(message.contains("socket closed")),
        other => panic!("期望注册失败，实际为 {other:?}"),
    }
}

/// 非原生通道与无人认领的句柄被拒绝。
#[test]
fn non_native_and_unknown_handles_are_rejected() {
    let group = group(2);
    let err = group
        .register_channel(Arc::new(Plain))
        .expect_err("非原生通道");
    assert_eq!(err.code(), codes::INVALID_ARGUMENT);

    let stranger = NativeLoopHandle::allocate();
    let err = group
        .register_channel(Recorder::new(stranger))
        .expect_err("句柄不属于任何循环");
    assert!(matches!(err, LoopError::InvalidState { handle } if handle == stranger));
    assert_eq!(err.code(), codes::INVALID_STATE);
}

/// 在循环线程内经组派发时，选择器返回调用方所在的循环。
#[test]
fn dispatch_from_loop_thread_stays_on_that_loop() {
    let group = group(4);
    for event_loop in group.loops() {
        let inner = Arc::clone(&group);
        let expected = event_loop.native_handle();
        let chosen = event_loop
            .submit(move || {
                (0..8)
                    .map(|_| inner.next().native_handle())
                    .collect::<Vec<_>>()
            })
            .expect("提交")
            .wait_timeout(Duration::from_secs(5))
            .expect("任务应及时完成")
            .expect("任务成功");
        assert!(chosen.iter().all(|handle| *handle == expected));
    }
}

/// 非亲和线程上的组级派发依次访问每个循环。
#[test]
fn group_next_round_robins_from_outside() {
    let group = group(4);
    let handles: Vec<_> = (0..8).map(|_| group.next().native_handle()).collect();
    let expected: Vec<_> = group
        .loops()
        .iter()
        .chain(group.loops())
        .map(|event_loop| event_loop.native_handle())
        .collect();
    assert_eq!(handles, expected);
}

/// 组级 `submit` 的结果可被异步等待。
#[test]
fn submitted_work_can_be_awaited() {
    let group = group(2);
    let promise = group.submit(|| 6 * 7).expect("提交");
    assert_eq!(futures::executor::block_on(promise), Ok(42));
    group.shutdown_gracefully();
    assert!(group.is_shutting_down());
    assert!(matches!(group.execute(|| {}), Err(LoopError::Rejected(_))));
}
