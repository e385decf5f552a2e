//! 事件循环组配置。
//!
//! # 模块定位（Why）
//! - 宿主通常以 TOML 文件描述运行时参数；本模块负责反序列化、补齐默认值与校验；
//! - 代码内构造则使用 `with_*` 链式设置，二者共享同一套校验逻辑。
//!
//! # 契约说明（What）
//! - `loop_count = 0` 表示按可用并行度自动决定；
//! - `breakout_interval_ms` 是空闲循环两次检查之间的最长休眠时间，必须大于零；
//! - `max_pending_tasks` 限制单个循环尚未执行的任务数，超过即拒绝。

use std::num::NonZeroUsize;
use std::thread;
use std::time::Duration;

use serde::Deserialize;

use crate::error::LoopError;

/// 事件循环组配置。
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct EventLoopGroupConfig {
    /// 事件循环数量，0 表示自动。
    pub loop_count: usize,
    /// 线程名前缀，线程名为 `{prefix}-{index}`。
    pub thread_name_prefix: String,
    /// 空闲时的最长休眠（毫秒）。
    pub breakout_interval_ms: u64,
    /// 单个循环允许积压的任务数。
    pub max_pending_tasks: usize,
}

impl Default for EventLoopGroupConfig {
    fn default() -> Self {
        Self {
            loop_count: 0,
            thread_name_prefix: "conflux-loop".to_owned(),
            breakout_interval_ms: 100,
            max_pending_tasks: usize::MAX,
        }
    }
}

impl EventLoopGroupConfig {
    /// 解析 TOML 文本并校验。
    pub fn from_toml_str(source: &str) -> Result<Self, LoopError> {
        let config: Self =
            toml::from_str(source).map_err(|err| LoopError::Config(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// 校验字段取值。
    pub fn validate(&self) -> Result<(), LoopError> {
        if self.thread_name_prefix.trim().is_empty() {
            return Err(LoopError::Config(
                "thread_name_prefix must not be empty".to_owned(),
            ));
        }
        if self.breakout_interval_ms == 0 {
            return Err(LoopError::Config(
                "breakout_interval_ms must be greater than zero".to_owned(),
            ));
        }
        if self.max_pending_tasks == 0 {
            return Err(LoopError::Config(
                "max_pending_tasks must be greater than zero".to_owned(),
            ));
        }
        Ok(())
    }

    /// 设置循环数量，0 表示自动。
    pub fn with_loop_count(mut self, loop_count: usize) -> Self {
        self.loop_count = loop_count;
        self
    }

    /// 设置线程名前缀。
    pub fn with_thread_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.thread_name_prefix = prefix.into();
        self
    }

    /// 设置空闲休眠上限，按毫秒截断。
    pub fn with_breakout_interval(mut self, interval: Duration) -> Self {
        self.breakout_interval_ms = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// 设置单个循环的积压上限。
    pub fn with_max_pending_tasks(mut self, max_pending_tasks: usize) -> Self {
        self.max_pending_tasks = max_pending_tasks;
        self
    }

    /// 空闲休眠上限。
    pub fn breakout_interval(&self) -> Duration {
        Duration::from_millis(self.breakout_interval_ms)
    }

    /// 实际要创建的循环数量。
    pub fn resolved_loop_count(&self) -> usize {
        match self.loop_count {
            0 => thread::available_parallelism().map_or(1, NonZeroUsize::get),
            count => count,
        }
    }
}
