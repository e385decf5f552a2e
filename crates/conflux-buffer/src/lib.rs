//! `conflux-buffer` 提供多分片零拷贝组合缓冲与分片序列构建。
//!
//! # 模块定位（Why）
//! - 协议栈在帧头、负载、尾部之间频繁拼接数据，逐次复制会把带宽浪费在 memcpy 上；
//! - 组合缓冲把多个独立分配的缓冲呈现为一段逻辑连续的字节区间，读取时优先返回零拷贝视图，
//!   只有在调用方坚持要求连续内存且区间跨越组件边界时才退化为合并拷贝。
//!
//! # 设计概要（How）
//! - `buf` 模块定义 [`ByteBuf`] 能力及两个叶子实现：基于 `BytesMut` 的 [`HeapByteBuf`]
//!   与基于 `Bytes` 的只读 [`SharedByteBuf`]；
//! - `composite` 模块实现 [`CompositeByteBuffer`]，自身同样实现 [`ByteBuf`]，因此可以嵌套；
//! - `sequence` 模块提供 [`BufferSequence`] 与实现 `bytes::Buf` 的 [`SequenceCursor`]；
//! - [`scratch`] 模块维护构建序列时复用的线程本地暂存列表，并暴露统计快照。
//!
//! # 并发约束（What）
//! - 缓冲由单一逻辑所有者驱动：所有修改都需要 `&mut self`，类型仅保证 `Send`。

extern crate alloc;

mod buf;
mod composite;
mod error;
pub mod scratch;
mod sequence;

pub use buf::{ByteBuf, HeapByteBuf, SharedByteBuf};
pub use composite::{ComponentEntry, CompositeByteBuffer, DEFAULT_MAX_COMPONENTS};
pub use error::{BufferError, codes};
pub use sequence::{BufferSequence, SequenceCursor};
