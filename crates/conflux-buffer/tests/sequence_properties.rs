//! 组合缓冲视图与分片序列的性质验证。
//!
//! # 教案级注释概览
//!
//! - **核心目标 (Why)**：对任意组件切分方式与任意合法区间，断言三条性质：
//!   1. 连续视图等于分片序列的拼接；
//!   2. 分片序列的各段非空、顺序排列且长度之和等于请求长度；
//!   3. `set_bytes` 写入后立即读取得到写入内容。
//! - **设计手法 (How)**：以随机字节串作为“影子模型”，再随机切分为若干组件构造组合缓冲，
//!   所有断言都与影子模型对照，不依赖实现细节。
//! - **边界 (What)**：切分允许产生空组件，用于覆盖“空组件永不被索引命中”的约束。

use conflux_buffer::{ByteBuf, CompositeByteBuffer, HeapByteBuf};
use proptest::prelude::*;

/// 生成影子字节串及其切分点（允许重复切分点以制造空组件）。
fn split_payload() -> impl Strategy<Value = (Vec<u8>, Vec<usize>)> {
    prop::collection::vec(any::<u8>(), 0..64).prop_flat_map(|payload| {
        let len = payload.len();
        (
            Just(payload),
            prop::collection::vec(0..=len, 0..6).prop_map(|mut cuts| {
                cuts.sort_unstable();
                cuts
            }),
        )
    })
}

fn build(payload: &[u8], cuts: &[usize]) -> CompositeByteBuffer {
    let mut composite = CompositeByteBuffer::new();
    let mut start = 0;
    for &cut in cuts.iter().chain(core::iter::once(&payload.len())) {
        composite
            .add_component(Box::new(HeapByteBuf::from_slice(&payload[start..cut])))
            .expect("组件数量未超过上限");
        start = cut;
    }
    composite
}

/// 在 `[0, len]` 内生成合法区间。
fn window(len: usize) -> impl Strategy<Value = (usize, usize)> {
    (0..=len).prop_flat_map(move |index| (Just(index), 0..=len - index))
}

proptest! {
    #[test]
    fn prop_view_equals_sequence_concatenation(
        (payload, cuts, (index, count)) in split_payload()
            .prop_flat_map(|(payload, cuts)| {
                let len = payload.len();
                (Just(payload), Just(cuts), window(len))
            })
    ) {
        let composite = build(&payload, &cuts);
        prop_assert_eq!(composite.capacity(), payload.len());

        let view = composite.readable_view(index, count).expect("区间合法");
        let sequence = composite.sequence(index, count).expect("区间合法");
        prop_assert_eq!(&view[..], &payload[index..index + count]);
        prop_assert_eq!(sequence.to_vec(), view.to_vec());
        prop_assert_eq!(sequence.len(), count);
        prop_assert!(sequence.iter().all(|segment| !segment.is_empty()));
        prop_assert!(sequence.segment_count() <= composite.component_count());
    }

    #[test]
    fn prop_set_bytes_then_view_round_trips(
        (payload, cuts, (index, count), fill) in split_payload()
            .prop_flat_map(|(payload, cuts)| {
                let len = payload.len();
                (Just(payload), Just(cuts), window(len), any::<u8>())
            })
    ) {
        let mut composite = build(&payload, &cuts);
        let src: Vec<u8> = (0..count).map(|i| fill.wrapping_add(i as u8)).collect();
        composite.set_bytes(index, &src).expect("区间合法");

        let mut expected = payload.clone();
        expected[index..index + count].copy_from_slice(&src);
        let whole = composite.readable_view(0, expected.len()).expect("全量视图");
        prop_assert_eq!(&whole[..], &expected[..]);
    }

    #[test]
    fn prop_out_of_range_never_panics(
        (payload, cuts) in split_payload(),
        extra in 1usize..16,
    ) {
        let composite = build(&payload, &cuts);
        let len = payload.len();
        prop_assert!(composite.readable_view(len, extra).is_err());
        prop_assert!(composite.sequence(len + extra, 0).is_err());
        prop_assert!(composite.readable_view(usize::MAX, 2).is_err());
    }
}
