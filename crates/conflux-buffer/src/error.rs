//! # error 模块说明
//!
//! ## 角色定位（Why）
//! - 汇总组合缓冲、分片序列与叶子缓冲在参数校验阶段可能返回的全部失败；
//! - 所有失败均为“输入决定”的确定性条件，不存在内部重试，调用方据错误种类自行决定降级路径。
//!
//! ## 设计要求（What）
//! - 派生 [`thiserror::Error`]，可直接接入 `std::error::Error` 生态；
//! - 每个变体提供稳定错误码（[`BufferError::code`]），便于日志与告警按码聚合。

use thiserror::Error;

/// 缓冲相关稳定错误码。
pub mod codes {
    /// 请求区间越过缓冲的可寻址范围。
    pub const OUT_OF_RANGE: &str = "conflux.buffer.out_of_range";
    /// 请求的视图形态不受支持（例如跨多个组件的可写连续视图）。
    pub const UNSUPPORTED: &str = "conflux.buffer.unsupported";
    /// 组件声明存在可读字节却未暴露任何分片。
    pub const EMPTY_SEGMENTS: &str = "conflux.buffer.empty_segments";
    /// 对只读缓冲执行写入。
    pub const READ_ONLY: &str = "conflux.buffer.read_only";
    /// 组件位置越界。
    pub const INVALID_COMPONENT: &str = "conflux.buffer.invalid_component";
}

/// 缓冲错误域。
///
/// # 教案式说明
/// - **意图 (Why)**：区分“越界”“形态不支持”“契约违背”三类问题，调用方可据此选择
///   改用分散写入、缩小窗口或直接丢弃连接；
/// - **契约 (What)**：所有变体 `Send + Sync + 'static`；越界检查总在任何拷贝或写入之前完成，
///   因此返回错误时缓冲内容保持原状；
/// - **设计权衡 (Trade-offs)**：`Unsupported` 与 `ReadOnly` 携带静态操作名而非动态字符串，
///   失败路径零分配。
#[derive(Clone, Debug, Eq, PartialEq, Error)]
pub enum BufferError {
    /// `[index, index + len)` 超出 `[0, capacity)`。
    #[error("range [{index}, {index} + {len}) is out of bounds for capacity {capacity}")]
    OutOfRange {
        index: usize,
        len: usize,
        capacity: usize,
    },

    /// 请求的视图无法以当前缓冲形态表达。
    #[error("operation `{operation}` is not supported by this buffer shape")]
    Unsupported { operation: &'static str },

    /// 缓冲声称持有 `readable` 字节却报告零个分片。
    #[error("buffer claims {readable} readable bytes but exposes no segments")]
    EmptySegments { readable: usize },

    /// 只读缓冲拒绝写入。
    #[error("buffer is read-only, `{operation}` rejected")]
    ReadOnly { operation: &'static str },

    /// 组件位置 `position` 不在 `[0, count)`（插入时为 `[0, count]`）内。
    #[error("component position {position} is invalid for {count} components")]
    InvalidComponent { position: usize, count: usize },
}

impl BufferError {
    /// 返回稳定错误码。
    pub fn code(&self) -> &'static str {
        match self {
            BufferError::OutOfRange { .. } => codes::OUT_OF_RANGE,
            BufferError::Unsupported { .. } => codes::UNSUPPORTED,
            BufferError::EmptySegments { .. } => codes::EMPTY_SEGMENTS,
            BufferError::ReadOnly { .. } => codes::READ_ONLY,
            BufferError::InvalidComponent { .. } => codes::INVALID_COMPONENT,
        }
    }
}

/// 校验 `[index, index + len)` 落在 `[0, capacity)` 内，溢出同样视为越界。
pub(crate) fn check_range(index: usize, len: usize, capacity: usize) -> Result<(), BufferError> {
    match index.checked_add(len) {
        Some(end) if end <= capacity => Ok(()),
        _ => Err(BufferError::OutOfRange {
            index,
            len,
            capacity,
        }),
    }
}
