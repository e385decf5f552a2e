use alloc::borrow::Cow;
use core::fmt;

use bytes::{Bytes, BytesMut};

use crate::error::{BufferError, check_range};
use crate::sequence::BufferSequence;

/// `ByteBuf` 描述组合缓冲消费、并向上层再次暴露的字节缓冲能力。
///
/// # 设计背景（Why）
/// - 组合缓冲需要把任意来源的内存（堆内、共享只读、嵌套组合）按统一接口拼接成逻辑连续区间；
/// - 读视图返回 [`Cow`]：`Borrowed` 表示零拷贝别名，`Owned` 表示合并拷贝，调用方可据此判断
///   是否发生了分配，而无需额外的标记位。
///
/// # 契约说明（What）
/// - **索引空间**：所有 `index` 都是缓冲自身索引空间 `[0, capacity())` 内的绝对位置，
///   与读写指针无关；
/// - **可读区**：`[reader_index(), writer_index())`，`readable_len()` 为二者之差；
/// - **分片数**：`segment_count()` 报告底层连续分片数量，叶子缓冲恒为 1；
/// - **越界**：所有区间操作在拷贝或写入前完成校验，越界返回 [`BufferError::OutOfRange`]；
/// - **零长度**：校验通过后返回空结果，不视为错误。
///
/// # 风险提示（Trade-offs）
/// - trait 仅要求 `Send`：缓冲由单一逻辑所有者驱动，并发读写需调用方自行约束。
pub trait ByteBuf: fmt::Debug + Send + 'static {
    /// 索引空间大小。
    fn capacity(&self) -> usize;

    /// 读指针。
    fn reader_index(&self) -> usize;

    /// 写指针。
    fn writer_index(&self) -> usize;

    /// 可读字节数。
    fn readable_len(&self) -> usize {
        self.writer_index() - self.reader_index()
    }

    /// 底层连续分片数量。
    fn segment_count(&self) -> usize;

    /// 返回 `[index, index + len)` 的连续只读视图。
    fn readable_view(&self, index: usize, len: usize) -> Result<Cow<'_, [u8]>, BufferError>;

    /// 返回 `[index, index + len)` 的有序零拷贝分片序列。
    fn sequence(&self, index: usize, len: usize) -> Result<BufferSequence<'_>, BufferError>;

    /// 是否接受写入。只读缓冲返回 `false`，组合缓冲要求全部组件可写。
    fn is_writable(&self) -> bool {
        true
    }

    /// 将 `src` 写入 `index` 起始的位置，不移动读写指针。
    fn set_bytes(&mut self, index: usize, src: &[u8]) -> Result<(), BufferError>;

    /// 返回 `[index, index + len)` 的连续可写视图；多分片缓冲返回 `Unsupported`。
    fn writable_view(&mut self, index: usize, len: usize) -> Result<&mut [u8], BufferError>;

    /// 移动读指针，要求 `index <= writer_index()`。
    fn set_reader_index(&mut self, index: usize) -> Result<(), BufferError>;
}

fn check_reader_index(index: usize, writer_index: usize) -> Result<(), BufferError> {
    if index > writer_index {
        return Err(BufferError::OutOfRange {
            index,
            len: 0,
            capacity: writer_index,
        });
    }
    Ok(())
}

/// `HeapByteBuf` 是基于 `BytesMut` 的单分片可写缓冲。
///
/// # 设计动机（Why）
/// - 作为组合缓冲最常见的叶子组件，需要同时支持零拷贝读视图与原地写入；
/// - `BytesMut` 的长度即索引空间大小，整个区间始终已初始化，可直接切片返回可写视图。
///
/// # 契约说明（What）
/// - `from_slice` 复制输入并令可读区覆盖全部字节；
/// - `with_capacity` 分配清零空间，可读区为空，配合 [`write_bytes`](Self::write_bytes) 追加；
/// - [`freeze`](Self::freeze) 转换为 [`SharedByteBuf`]，保留读写指针。
pub struct HeapByteBuf {
    data: BytesMut,
    reader_index: usize,
    writer_index: usize,
}

impl HeapByteBuf {
    /// 复制 `src` 构造缓冲，可读区即 `src` 全部内容。
    pub fn from_slice(src: &[u8]) -> Self {
        Self {
            data: BytesMut::from(src),
            reader_index: 0,
            writer_index: src.len(),
        }
    }

    /// 分配 `capacity` 字节清零空间，可读区为空。
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: BytesMut::zeroed(capacity),
            reader_index: 0,
            writer_index: 0,
        }
    }

    /// 在写指针处追加 `src`，空间不足时扩容。
    pub fn write_bytes(&mut self, src: &[u8]) {
        let end = self.writer_index + src.len();
        if end > self.data.len() {
            self.data.resize(end, 0);
        }
        self.data[self.writer_index..end].copy_from_slice(src);
        self.writer_index = end;
    }

    /// 可读区切片。
    pub fn readable_bytes(&self) -> &[u8] {
        &self.data[self.reader_index..self.writer_index]
    }

    /// 冻结为只读共享缓冲。
    pub fn freeze(self) -> SharedByteBuf {
        SharedByteBuf {
            data: self.data.freeze(),
            reader_index: self.reader_index,
            writer_index: self.writer_index,
        }
    }
}

impl fmt::Debug for HeapByteBuf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HeapByteBuf")
            .field("capacity", &self.data.len())
            .field("reader_index", &self.reader_index)
            .field("writer_index", &self.writer_index)
            .finish()
    }
}

impl ByteBuf for HeapByteBuf {
    fn capacity(&self) -> usize {
        self.data.len()
    }

    fn reader_index(&self) -> usize {
        self.reader_index
    }

    fn writer_index(&self) -> usize {
        self.writer_index
    }

    fn segment_count(&self) -> usize {
        1
    }

    fn readable_view(&self, index: usize, len: usize) -> Result<Cow<'_, [u8]>, BufferError> {
        check_range(index, len, self.data.len())?;
        Ok(Cow::Borrowed(&self.data[index..index + len]))
    }

    fn sequence(&self, index: usize, len: usize) -> Result<BufferSequence<'_>, BufferError> {
        check_range(index, len, self.data.len())?;
        Ok(BufferSequence::single(&self.data[index..index + len]))
    }

    fn set_bytes(&mut self, index: usize, src: &[u8]) -> Result<(), BufferError> {
        check_range(index, src.len(), self.data.len())?;
        self.data[index..index + src.len()].copy_from_slice(src);
        Ok(())
    }

    fn writable_view(&mut self, index: usize, len: usize) -> Result<&mut [u8], BufferError> {
        check_range(index, len, self.data.len())?;
        Ok(&mut self.data[index..index + len])
    }

    fn set_reader_index(&mut self, index: usize) -> Result<(), BufferError> {
        check_reader_index(index, self.writer_index)?;
        self.reader_index = index;
        Ok(())
    }
}

/// `SharedByteBuf` 是基于 `Bytes` 的单分片只读缓冲。
///
/// - 适合承载协议层已冻结、可能被多处共享引用的数据块；
/// - 写入类操作统一返回 [`BufferError::ReadOnly`]。
#[derive(Clone)]
pub struct SharedByteBuf {
    data: Bytes,
    reader_index: usize,
    writer_index: usize,
}

impl SharedByteBuf {
    /// 底层共享字节的廉价克隆。
    pub fn bytes(&self) -> Bytes {
        self.data.clone()
    }
}

impl From<Bytes> for SharedByteBuf {
    fn from(data: Bytes) -> Self {
        let writer_index = data.len();
        Self {
            data,
            reader_index: 0,
            writer_index,
        }
    }
}

impl fmt::Debug for SharedByteBuf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedByteBuf")
            .field("capacity", &self.data.len())
            .field("reader_index", &self.reader_index)
            .field("writer_index", &self.writer_index)
            .finish()
    }
}

impl ByteBuf for SharedByteBuf {
    fn capacity(&self) -> usize {
        self.data.len()
    }

    fn reader_index(&self) -> usize {
        self.reader_index
    }

    fn writer_index(&self) -> usize {
        self.writer_index
    }

    fn segment_count(&self) -> usize {
        1
    }

    fn readable_view(&self, index: usize, len: usize) -> Result<Cow<'_, [u8]>, BufferError> {
        check_range(index, len, self.data.len())?;
        Ok(Cow::Borrowed(&self.data[index..index + len]))
    }

    fn sequence(&self, index: usize, len: usize) -> Result<BufferSequence<'_>, BufferError> {
        check_range(index, len, self.data.len())?;
        Ok(BufferSequence::single(&self.data[index..index + len]))
    }

    fn is_writable(&self) -> bool {
        false
    }

    fn set_bytes(&mut self, _index: usize, _src: &[u8]) -> Result<(), BufferError> {
        Err(BufferError::ReadOnly {
            operation: "set_bytes",
        })
    }

    fn writable_view(&mut self, _index: usize, _len: usize) -> Result<&mut [u8], BufferError> {
        Err(BufferError::ReadOnly {
            operation: "writable_view",
        })
    }

    fn set_reader_index(&mut self, index: usize) -> Result<(), BufferError> {
        check_reader_index(index, self.writer_index)?;
        self.reader_index = index;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heap_write_bytes_grows_and_tracks_writer() {
        let mut buf = HeapByteBuf::with_capacity(2);
        buf.write_bytes(b"abcd");
        assert_eq!(buf.capacity(), 4);
        assert_eq!(buf.readable_bytes(), b"abcd");
        buf.set_reader_index(1).expect("读指针应可前移");
        assert_eq!(buf.readable_len(), 3);
        assert!(buf.set_reader_index(5).is_err(), "读指针不得越过写指针");
    }

    #[test]
    fn heap_views_alias_storage() {
        let mut buf = HeapByteBuf::from_slice(b"hello");
        let ptr = buf.readable_bytes().as_ptr();
        match buf.readable_view(1, 3).expect("区间合法") {
            Cow::Borrowed(view) => {
                assert_eq!(view, b"ell");
                assert_eq!(view.as_ptr(), ptr.wrapping_add(1));
            }
            Cow::Owned(_) => panic!("叶子缓冲不应分配"),
        }
        buf.writable_view(0, 1).expect("可写视图")[0] = b'j';
        assert_eq!(buf.readable_bytes(), b"jello");
    }

    #[test]
    fn shared_rejects_writes() {
        let mut buf = HeapByteBuf::from_slice(b"xyz").freeze();
        assert_eq!(
            buf.set_bytes(0, b"a"),
            Err(BufferError::ReadOnly {
                operation: "set_bytes"
            })
        );
        assert!(buf.writable_view(0, 1).is_err());
        assert!(!buf.is_writable());
        assert_eq!(&buf.bytes()[..], b"xyz");
    }
}
