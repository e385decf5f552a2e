use alloc::{borrow::Cow, boxed::Box, vec, vec::Vec};
use core::fmt;

use tracing::{debug, trace};

use crate::buf::{ByteBuf, HeapByteBuf};
use crate::error::{BufferError, check_range};
use crate::scratch::ScratchList;
use crate::sequence::BufferSequence;

/// 组件数量上限的默认值，超过后自动合并。
pub const DEFAULT_MAX_COMPONENTS: usize = 16;

/// `ComponentEntry` 描述组合缓冲中的一个分段。
///
/// # 契约说明（What）
/// - `offset..end_offset` 是该分段在组合索引空间中的位置，长度恒等于插入时组件的可读字节数；
/// - `adjustment` 为组件插入时的读指针，用于把全局索引换算成组件本地索引：
///   `local = global - offset + adjustment`；
/// - 组件缓冲归组合缓冲独占，组合缓冲释放（`Drop`）时组件一并释放。
pub struct ComponentEntry {
    buf: Box<dyn ByteBuf>,
    offset: usize,
    end_offset: usize,
    adjustment: usize,
}

impl ComponentEntry {
    fn new(buf: Box<dyn ByteBuf>, offset: usize) -> Self {
        let len = buf.readable_len();
        let adjustment = buf.reader_index();
        Self {
            buf,
            offset,
            end_offset: offset + len,
            adjustment,
        }
    }

    /// 底层缓冲。
    pub fn buffer(&self) -> &dyn ByteBuf {
        self.buf.as_ref()
    }

    /// 全局起始偏移。
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// 全局结束偏移（不含）。
    pub fn end_offset(&self) -> usize {
        self.end_offset
    }

    /// 分段长度。
    pub fn len(&self) -> usize {
        self.end_offset - self.offset
    }

    /// 分段是否为空。
    pub fn is_empty(&self) -> bool {
        self.end_offset == self.offset
    }

    /// 全局索引到组件本地索引的换算因子。
    pub fn adjustment(&self) -> usize {
        self.adjustment
    }

    /// 把全局索引换算为组件本地索引。
    pub fn idx(&self, index: usize) -> usize {
        index - self.offset + self.adjustment
    }

    fn reposition(&mut self, new_offset: usize) {
        let len = self.len();
        self.offset = new_offset;
        self.end_offset = new_offset + len;
    }

    fn into_buffer(self) -> Box<dyn ByteBuf> {
        self.buf
    }
}

impl fmt::Debug for ComponentEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentEntry")
            .field("offset", &self.offset)
            .field("end_offset", &self.end_offset)
            .field("adjustment", &self.adjustment)
            .field("buffer", &self.buf)
            .finish()
    }
}

/// `CompositeByteBuffer` 把多个独立分配的缓冲呈现为一段逻辑连续、可索引的字节区间。
///
/// # 设计动机（Why）
/// - 协议栈常需要在帧头、负载、尾部之间拼接而不复制数据；组合缓冲只接管组件引用，
///   读取时尽可能返回零拷贝视图；
/// - 当调用方坚持要求连续视图而区间跨越组件边界时，退化为一次精确大小的合并拷贝。
///
/// # 架构关系（How）
/// - `components` 按 `offset` 有序且首尾相接：`components[i].end_offset == components[i + 1].offset`；
/// - 全局索引通过二分查找（`partition_point`）定位组件，空组件永远不会被命中；
/// - 分片序列的构建借用线程本地暂存池，合并回退路径复用同一套序列逻辑。
///
/// # 契约说明（What）
/// - 写指针恒等于容量（所有组件长度之和），读指针不超过写指针；
/// - 所有区间操作先做越界校验再动数据；
/// - 组件数量超过上限（默认 [`DEFAULT_MAX_COMPONENTS`]）时整体合并为单个堆缓冲。
///
/// # 风险与取舍（Trade-offs）
/// - 非线程安全：所有修改需要 `&mut self`，并发读取需调用方保证期间没有写者；
/// - 合并结果不做缓存，同一区间重复请求会重复分配，换取无状态的简单语义。
pub struct CompositeByteBuffer {
    components: Vec<ComponentEntry>,
    max_components: usize,
    reader_index: usize,
}

impl Default for CompositeByteBuffer {
    fn default() -> Self {
        Self::with_max_components(DEFAULT_MAX_COMPONENTS)
    }
}

impl CompositeByteBuffer {
    /// 创建空组合缓冲。
    pub fn new() -> Self {
        Self::default()
    }

    /// 指定组件数量上限创建空组合缓冲；上限至少为 2。
    pub fn with_max_components(max_components: usize) -> Self {
        Self {
            components: Vec::new(),
            max_components: max_components.max(2),
            reader_index: 0,
        }
    }

    /// 按顺序接管给定组件。
    pub fn from_components<I>(buffers: I) -> Result<Self, BufferError>
    where
        I: IntoIterator<Item = Box<dyn ByteBuf>>,
    {
        let mut composite = Self::new();
        for buf in buffers {
            composite.add_component(buf)?;
        }
        Ok(composite)
    }

    /// 组件数量。
    pub fn component_count(&self) -> usize {
        self.components.len()
    }

    /// 组件数量上限。
    pub fn max_components(&self) -> usize {
        self.max_components
    }

    /// 指定位置的组件。
    pub fn component(&self, position: usize) -> Option<&ComponentEntry> {
        self.components.get(position)
    }

    /// 按顺序遍历组件。
    pub fn components(&self) -> impl ExactSizeIterator<Item = &ComponentEntry> {
        self.components.iter()
    }

    /// 在末尾追加组件，不复制数据。
    pub fn add_component(&mut self, buf: Box<dyn ByteBuf>) -> Result<(), BufferError> {
        let position = self.components.len();
        self.add_component_at(position, buf)
    }

    /// 在 `position` 处插入组件，其后组件整体后移。
    pub fn add_component_at(
        &mut self,
        position: usize,
        buf: Box<dyn ByteBuf>,
    ) -> Result<(), BufferError> {
        let count = self.components.len();
        if position > count {
            return Err(BufferError::InvalidComponent { position, count });
        }
        let offset = match position {
            0 => 0,
            _ => self.components[position - 1].end_offset,
        };
        self.components
            .insert(position, ComponentEntry::new(buf, offset));
        self.update_offsets_from(position + 1);

        if self.components.len() > self.max_components {
            self.consolidate()?;
        }
        Ok(())
    }

    /// 移除 `position` 处的组件并把所有权交还调用方。
    pub fn remove_component(&mut self, position: usize) -> Result<Box<dyn ByteBuf>, BufferError> {
        let count = self.components.len();
        if position >= count {
            return Err(BufferError::InvalidComponent { position, count });
        }
        let removed = self.components.remove(position);
        self.update_offsets_from(position);
        self.reader_index = self.reader_index.min(self.capacity());
        Ok(removed.into_buffer())
    }

    /// 将全部组件合并为单个堆缓冲。
    pub fn consolidate(&mut self) -> Result<(), BufferError> {
        let count = self.components.len();
        self.consolidate_range(0, count)
    }

    /// 将 `[position, position + count)` 的组件合并为单个堆缓冲，全局偏移保持不变。
    pub fn consolidate_range(&mut self, position: usize, count: usize) -> Result<(), BufferError> {
        let total = self.components.len();
        match position.checked_add(count) {
            Some(end) if end <= total => {}
            _ => {
                return Err(BufferError::InvalidComponent {
                    position,
                    count: total,
                });
            }
        }
        if count <= 1 {
            return Ok(());
        }

        let run = &self.components[position..position + count];
        let offset = run[0].offset;
        let len = run[count - 1].end_offset - offset;
        let mut merged = HeapByteBuf::with_capacity(len);
        for component in run {
            let sequence = component
                .buf
                .sequence(component.adjustment, component.len())?;
            for segment in &sequence {
                merged.write_bytes(segment);
            }
        }

        let entry = ComponentEntry::new(Box::new(merged), offset);
        self.components.drain(position + 1..position + count);
        self.components[position] = entry;
        debug!(
            merged_components = count,
            merged_bytes = len,
            remaining_components = self.components.len(),
            "composite buffer consolidated"
        );
        Ok(())
    }

    /// 丢弃完全位于读指针之前的组件，并把剩余组件偏移整体前移。
    pub fn discard_read_components(&mut self) {
        if self.reader_index == 0 {
            return;
        }
        let first_live = self
            .components
            .partition_point(|component| component.end_offset <= self.reader_index);
        if first_live == 0 {
            return;
        }
        let removed_bytes = match self.components.get(first_live) {
            Some(component) => component.offset,
            None => self.capacity(),
        };
        self.components.drain(..first_live);
        self.update_offsets_from(0);
        self.reader_index -= removed_bytes;
        debug!(
            discarded_components = first_live,
            discarded_bytes = removed_bytes,
            "composite buffer discarded read components"
        );
    }

    /// 读指针前移 `len` 字节。
    pub fn skip_bytes(&mut self, len: usize) -> Result<(), BufferError> {
        check_range(self.reader_index, len, self.capacity())?;
        self.reader_index += len;
        Ok(())
    }

    /// 返回包含全局索引 `index` 的组件位置。
    pub fn to_component_index(&self, index: usize) -> Result<usize, BufferError> {
        check_range(index, 1, self.capacity())?;
        Ok(self.to_component_index0(index))
    }

    /// 释放组合缓冲，按顺序交还全部组件。
    pub fn into_components(self) -> Vec<Box<dyn ByteBuf>> {
        self.components
            .into_iter()
            .map(ComponentEntry::into_buffer)
            .collect()
    }

    fn to_component_index0(&self, index: usize) -> usize {
        self.components
            .partition_point(|component| component.end_offset <= index)
    }

    fn update_offsets_from(&mut self, position: usize) {
        let mut offset = match position {
            0 => 0,
            _ => self.components[position - 1].end_offset,
        };
        for component in &mut self.components[position..] {
            component.reposition(offset);
            offset = component.end_offset;
        }
    }
}

impl fmt::Debug for CompositeByteBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompositeByteBuffer")
            .field("capacity", &self.capacity())
            .field("reader_index", &self.reader_index)
            .field("max_components", &self.max_components)
            .field("components", &self.components)
            .finish()
    }
}

impl ByteBuf for CompositeByteBuffer {
    fn capacity(&self) -> usize {
        self.components
            .last()
            .map_or(0, |component| component.end_offset)
    }

    fn reader_index(&self) -> usize {
        self.reader_index
    }

    fn writer_index(&self) -> usize {
        self.capacity()
    }

    fn segment_count(&self) -> usize {
        match self.components.as_slice() {
            [] => 1,
            [only] => only.buf.segment_count(),
            components => components
                .iter()
                .map(|component| component.buf.segment_count())
                .sum(),
        }
    }

    fn readable_view(&self, index: usize, count: usize) -> Result<Cow<'_, [u8]>, BufferError> {
        check_range(index, count, self.capacity())?;
        if count == 0 {
            return Ok(Cow::Borrowed(&[]));
        }

        match self.components.as_slice() {
            [] => return Ok(Cow::Borrowed(&[])),
            [only] if only.buf.segment_count() == 1 => {
                return only.buf.readable_view(only.idx(index), count);
            }
            _ => {}
        }

        let mut merged = vec![0u8; count];
        let sequence = self.sequence(index, count)?;
        let mut offset = 0;
        for segment in &sequence {
            debug_assert!(merged.len() - offset >= segment.len());
            merged[offset..offset + segment.len()].copy_from_slice(segment);
            offset += segment.len();
        }
        trace!(
            index,
            count,
            segments = sequence.segment_count(),
            "composite readable view merge-copied"
        );
        Ok(Cow::Owned(merged))
    }

    fn sequence(&self, index: usize, count: usize) -> Result<BufferSequence<'_>, BufferError> {
        check_range(index, count, self.capacity())?;
        if count == 0 {
            return Ok(BufferSequence::empty());
        }

        let mut scratch = ScratchList::checkout(self.components.len());
        let mut index = index;
        let mut remaining = count;
        let mut i = self.to_component_index0(index);
        while remaining > 0 {
            let component = &self.components[i];
            let local_len = remaining.min(component.end_offset - index);
            if local_len > 0 {
                let buf = component.buf.as_ref();
                match buf.segment_count() {
                    0 => {
                        return Err(BufferError::EmptySegments {
                            readable: buf.readable_len(),
                        });
                    }
                    1 => match buf.readable_view(component.idx(index), local_len)? {
                        Cow::Borrowed(view) => scratch.push(view),
                        Cow::Owned(_) => {
                            return Err(BufferError::Unsupported {
                                operation: "single-segment readable_view",
                            });
                        }
                    },
                    _ => {
                        let nested = buf.sequence(component.idx(index), local_len)?;
                        scratch.extend_from_slice(nested.segments());
                    }
                }
                index += local_len;
                remaining -= local_len;
            }
            i += 1;
        }

        Ok(BufferSequence::capture(&scratch))
    }

    fn is_writable(&self) -> bool {
        self.components
            .iter()
            .all(|component| component.buf.is_writable())
    }

    fn set_bytes(&mut self, index: usize, src: &[u8]) -> Result<(), BufferError> {
        check_range(index, src.len(), self.capacity())?;
        if src.is_empty() {
            return Ok(());
        }

        // 写入任何字节前确认区间内每个非空组件都可写。
        let start = self.to_component_index0(index);
        let end = index + src.len();
        let read_only = self.components[start..]
            .iter()
            .take_while(|component| component.offset < end)
            .any(|component| !component.is_empty() && !component.buf.is_writable());
        if read_only {
            return Err(BufferError::ReadOnly {
                operation: "set_bytes",
            });
        }

        let mut index = index;
        let mut src_index = 0;
        let mut remaining = src.len();
        let mut i = start;
        while remaining > 0 {
            let component = &mut self.components[i];
            let local_len = remaining.min(component.end_offset - index);
            if local_len > 0 {
                let local = component.idx(index);
                component
                    .buf
                    .set_bytes(local, &src[src_index..src_index + local_len])?;
                index += local_len;
                src_index += local_len;
                remaining -= local_len;
            }
            i += 1;
        }
        Ok(())
    }

    fn writable_view(&mut self, index: usize, count: usize) -> Result<&mut [u8], BufferError> {
        check_range(index, count, self.capacity())?;
        if count == 0 {
            return Ok(&mut []);
        }
        match self.components.as_mut_slice() {
            [] => Ok(&mut []),
            [only] => {
                let local = only.idx(index);
                only.buf.writable_view(local, count)
            }
            _ => Err(BufferError::Unsupported {
                operation: "writable_view",
            }),
        }
    }

    fn set_reader_index(&mut self, index: usize) -> Result<(), BufferError> {
        let writer_index = self.capacity();
        if index > writer_index {
            return Err(BufferError::OutOfRange {
                index,
                len: 0,
                capacity: writer_index,
            });
        }
        self.reader_index = index;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn heap(bytes: &[u8]) -> Box<dyn ByteBuf> {
        Box::new(HeapByteBuf::from_slice(bytes))
    }

    fn offsets(composite: &CompositeByteBuffer) -> Vec<(usize, usize)> {
        composite
            .components()
            .map(|component| (component.offset(), component.end_offset()))
            .collect()
    }

    #[test]
    fn component_index_skips_empty_components() {
        let composite = CompositeByteBuffer::from_components([heap(b"ab"), heap(b""), heap(b"cd")])
            .expect("构造组合缓冲");
        assert_eq!(composite.to_component_index(1), Ok(0));
        assert_eq!(composite.to_component_index(2), Ok(2), "空组件不应被命中");
        assert!(composite.to_component_index(4).is_err());
    }

    #[test]
    fn insert_and_remove_keep_offsets_contiguous() {
        let mut composite =
            CompositeByteBuffer::from_components([heap(b"abc"), heap(b"gh")]).expect("构造");
        composite
            .add_component_at(1, heap(b"def"))
            .expect("中间插入");
        assert_eq!(offsets(&composite), vec![(0, 3), (3, 6), (6, 8)]);
        assert_eq!(composite.readable_view(0, 8).expect("全量视图"), &b"abcdefgh"[..]);

        let removed = composite.remove_component(0).expect("移除首个组件");
        assert_eq!(removed.readable_len(), 3);
        assert_eq!(offsets(&composite), vec![(0, 3), (3, 5)]);
        assert!(composite.remove_component(2).is_err());
        assert!(composite.add_component_at(5, heap(b"x")).is_err());
    }

    #[test]
    fn component_reader_index_becomes_adjustment() {
        let mut leaf = HeapByteBuf::from_slice(b"xxpayload");
        leaf.set_reader_index(2).expect("跳过前缀");
        let mut composite = CompositeByteBuffer::new();
        composite.add_component(Box::new(leaf)).expect("追加");
        let entry = composite.component(0).expect("存在组件");
        assert_eq!(entry.adjustment(), 2);
        assert_eq!(entry.len(), 7);
        assert_eq!(composite.readable_view(0, 3).expect("视图"), &b"pay"[..]);
    }

    #[test]
    fn exceeding_max_components_consolidates() {
        let mut composite = CompositeByteBuffer::with_max_components(2);
        composite.add_component(heap(b"ab")).expect("追加");
        composite.add_component(heap(b"cd")).expect("追加");
        composite.add_component(heap(b"ef")).expect("追加触发合并");
        assert_eq!(composite.component_count(), 1);
        assert_eq!(composite.capacity(), 6);
        assert!(matches!(
            composite.readable_view(1, 4).expect("视图"),
            Cow::Borrowed(view) if view == b"bcde"
        ));
    }

    #[test]
    fn consolidate_range_merges_only_the_run() {
        let mut composite = CompositeByteBuffer::from_components([
            heap(b"a"),
            heap(b"bc"),
            heap(b"def"),
            heap(b"g"),
        ])
        .expect("构造");
        composite.consolidate_range(1, 2).expect("合并中段");
        assert_eq!(offsets(&composite), vec![(0, 1), (1, 6), (6, 7)]);
        assert_eq!(composite.readable_view(0, 7).expect("视图"), &b"abcdefg"[..]);
        assert!(composite.consolidate_range(2, 2).is_err());
    }

    #[test]
    fn discard_read_components_rebases_offsets() {
        let mut composite =
            CompositeByteBuffer::from_components([heap(b"abc"), heap(b"de"), heap(b"fgh")])
                .expect("构造");
        composite.skip_bytes(6).expect("读过前两个组件并进入第三个");
        composite.discard_read_components();
        assert_eq!(composite.component_count(), 1);
        assert_eq!(composite.reader_index(), 1);
        assert_eq!(offsets(&composite), vec![(0, 3)]);
        assert_eq!(composite.readable_view(1, 2).expect("视图"), &b"gh"[..]);
    }

    #[test]
    fn discard_everything_when_fully_read() {
        let mut composite =
            CompositeByteBuffer::from_components([heap(b"ab"), heap(b"cd")]).expect("构造");
        composite.skip_bytes(4).expect("读完");
        composite.discard_read_components();
        assert_eq!(composite.component_count(), 0);
        assert_eq!(composite.reader_index(), 0);
        assert!(composite.skip_bytes(1).is_err());
    }

    #[test]
    fn empty_composite_reports_single_segment() {
        let composite = CompositeByteBuffer::new();
        assert_eq!(composite.segment_count(), 1);
        assert!(composite.readable_view(0, 0).expect("零长度").is_empty());
        assert!(composite.sequence(0, 0).expect("零长度").is_empty());
        assert!(composite.readable_view(0, 1).is_err());
    }
}
