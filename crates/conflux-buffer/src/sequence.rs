use alloc::{boxed::Box, vec::Vec};
use std::io::IoSlice;

use bytes::Buf;

use crate::error::BufferError;
use crate::scratch::ScratchList;

/// `BufferSequence` 是覆盖某个字节区间的有序零拷贝分片集合。
///
/// # 设计动机（Why）
/// - 分散/聚合 I/O 与分帧解码能够直接消费碎片化视图，没有必要为它们合并拷贝；
/// - 组合缓冲的合并回退路径同样以序列为输入，保证“序列拼接 == 连续视图”这一性质只有一份实现。
///
/// # 契约说明（What）
/// - 分片按字节顺序排列、互不重叠且均非空，长度之和等于 [`len`](Self::len)；
/// - 分片借用自底层组件（生命周期 `'a`），序列本身只是瞬时访问器，可随时丢弃；
/// - 序列不可变：构建完成后不再暴露任何修改入口。
///
/// # 风险提示（Trade-offs）
/// - 分片引用数组单独装箱一次；构建期间的可增长列表来自线程本地暂存池，
///   序列复制完引用后即归还。
#[derive(Clone, Debug, Default)]
pub struct BufferSequence<'a> {
    segments: Box<[&'a [u8]]>,
    len: usize,
}

impl<'a> BufferSequence<'a> {
    /// 空序列，不分配。
    pub fn empty() -> Self {
        Self::default()
    }

    /// 由单个连续切片构成的序列；空切片得到空序列。
    pub fn single(segment: &'a [u8]) -> Self {
        if segment.is_empty() {
            return Self::empty();
        }
        Self {
            segments: Box::new([segment]),
            len: segment.len(),
        }
    }

    /// 捕获暂存列表中的分片引用，调用方随后释放列表即可归还暂存池。
    pub(crate) fn capture(scratch: &ScratchList<'a>) -> Self {
        let segments: Box<[&'a [u8]]> = scratch.as_slice().into();
        let len = segments.iter().map(|segment| segment.len()).sum();
        Self { segments, len }
    }

    /// 覆盖的总字节数。
    pub fn len(&self) -> usize {
        self.len
    }

    /// 是否为空。
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// 分片数量。
    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }

    /// 分片切片。
    pub fn segments(&self) -> &[&'a [u8]] {
        &self.segments
    }

    /// 按顺序遍历分片。
    pub fn iter(&self) -> impl ExactSizeIterator<Item = &'a [u8]> + '_ {
        self.segments.iter().copied()
    }

    /// 将全部分片顺序拷贝到 `dst`，要求 `dst.len() == self.len()`。
    pub fn copy_to_slice(&self, dst: &mut [u8]) -> Result<(), BufferError> {
        if dst.len() != self.len {
            return Err(BufferError::OutOfRange {
                index: 0,
                len: dst.len(),
                capacity: self.len,
            });
        }
        let mut offset = 0;
        for segment in self.iter() {
            dst[offset..offset + segment.len()].copy_from_slice(segment);
            offset += segment.len();
        }
        Ok(())
    }

    /// 扁平化为新分配的 `Vec<u8>`。
    pub fn to_vec(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.len);
        for segment in self.iter() {
            out.extend_from_slice(segment);
        }
        out
    }

    /// 转换为向量化写入所需的 `IoSlice` 列表。
    pub fn io_slices(&self) -> Vec<IoSlice<'a>> {
        self.iter().map(IoSlice::new).collect()
    }

    /// 返回实现了 [`bytes::Buf`] 的读游标。
    pub fn cursor(&self) -> SequenceCursor<'_> {
        SequenceCursor {
            segments: &self.segments,
            position: 0,
            offset: 0,
            remaining: self.len,
        }
    }
}

impl<'s, 'a> IntoIterator for &'s BufferSequence<'a> {
    type Item = &'a [u8];
    type IntoIter = core::iter::Copied<core::slice::Iter<'s, &'a [u8]>>;

    fn into_iter(self) -> Self::IntoIter {
        self.segments.iter().copied()
    }
}

/// 以 [`bytes::Buf`] 语义顺序消费 [`BufferSequence`] 的游标。
///
/// - `chunk` 返回当前分片剩余部分，`advance` 可跨越分片边界；
/// - `chunks_vectored` 一次性填充剩余分片，便于直接交给 `write_vectored`。
#[derive(Clone, Debug)]
pub struct SequenceCursor<'s> {
    segments: &'s [&'s [u8]],
    position: usize,
    offset: usize,
    remaining: usize,
}

impl Buf for SequenceCursor<'_> {
    fn remaining(&self) -> usize {
        self.remaining
    }

    fn chunk(&self) -> &[u8] {
        match self.segments.get(self.position) {
            Some(segment) => &segment[self.offset..],
            None => &[],
        }
    }

    fn advance(&mut self, mut cnt: usize) {
        assert!(
            cnt <= self.remaining,
            "cannot advance past remaining: {cnt} > {}",
            self.remaining
        );
        self.remaining -= cnt;
        while cnt > 0 {
            let available = self.segments[self.position].len() - self.offset;
            if cnt < available {
                self.offset += cnt;
                return;
            }
            cnt -= available;
            self.position += 1;
            self.offset = 0;
        }
    }

    fn chunks_vectored<'b>(&'b self, dst: &mut [IoSlice<'b>]) -> usize {
        let mut filled = 0;
        let mut offset = self.offset;
        for segment in self.segments.iter().skip(self.position) {
            if filled == dst.len() {
                break;
            }
            dst[filled] = IoSlice::new(&segment[offset..]);
            filled += 1;
            offset = 0;
        }
        filled
    }
}
