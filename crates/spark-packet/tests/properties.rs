//! 缓冲、迭代器与标签表的性质测试。
//!
//! # 教案级注释概览
//!
//! - **核心目标 (Why)**：以随机操作序列覆盖单元测试难以穷举的组合：四级扩展路径的任意交错、
//!   零压缩区两侧的裁剪、任意窗口的分片；
//! - **设计手法 (How)**：对 `Buffer` 维护一个 `Vec<u8>` 影子模型，每步操作后比较尺寸与内容；
//!   标签存活性质直接按区间相交关系断言；
//! - **合同 (What)**：尺寸恒等于 `max(0, 初始 + 扩展 - 裁剪)`；复制出的副本在对方变化后内容不变；
//!   分片保留的标签恰为与窗口相交的标签。

use proptest::prelude::*;
use spark_packet::{Buffer, BufferLayout, Endian, Packet, TagId, TagList};

#[derive(Clone, Debug)]
enum Op {
    AddAtStart(usize),
    AddAtEnd(usize),
    RemoveAtStart(usize),
    RemoveAtEnd(usize),
    Snapshot,
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0usize..40).prop_map(Op::AddAtStart),
        (0usize..40).prop_map(Op::AddAtEnd),
        (0usize..60).prop_map(Op::RemoveAtStart),
        (0usize..60).prop_map(Op::RemoveAtEnd),
        Just(Op::Snapshot),
    ]
}

fn layout() -> impl Strategy<Value = BufferLayout> {
    (0usize..32, 0usize..32, 0usize..32).prop_map(|(headroom, zero_size, tailroom)| BufferLayout {
        headroom,
        zero_size,
        tailroom,
    })
}

/// 新扩展出的字节以递增序号填充，便于在影子模型中追踪。
fn stamp(buffer: &Buffer, at: usize, len: usize, seed: &mut u8) -> Vec<u8> {
    let bytes: Vec<u8> = (0..len)
        .map(|_| {
            *seed = seed.wrapping_add(1).max(1);
            *seed
        })
        .collect();
    let mut it = buffer.begin();
    it.move_forward(at).expect("定位新区间");
    it.write_bytes(&bytes).expect("新区间可写");
    bytes
}

proptest! {
    #[test]
    fn prop_resize_sequences_match_model(layout in layout(), ops in prop::collection::vec(op(), 1..40)) {
        let mut buffer = Buffer::with_layout(layout).expect("布局合法");
        let mut model = vec![0u8; layout.zero_size];
        let mut snapshots: Vec<(Buffer, Vec<u8>)> = Vec::new();
        let mut seed = 0u8;

        for op in ops {
            match op {
                Op::AddAtStart(n) => {
                    buffer.add_at_start(n).expect("扩展不失败");
                    let bytes = stamp(&buffer, 0, n, &mut seed);
                    model = [bytes, model].concat();
                }
                Op::AddAtEnd(n) => {
                    buffer.add_at_end(n).expect("扩展不失败");
                    let bytes = stamp(&buffer, model.len(), n, &mut seed);
                    model.extend(bytes);
                }
                Op::RemoveAtStart(n) => {
                    buffer.remove_at_start(n).expect("裁剪不失败");
                    model.drain(..n.min(model.len()));
                }
                Op::RemoveAtEnd(n) => {
                    buffer.remove_at_end(n).expect("裁剪不失败");
                    model.truncate(model.len().saturating_sub(n));
                }
                Op::Snapshot => snapshots.push((buffer.clone(), model.clone())),
            }
            prop_assert_eq!(buffer.size(), model.len());
            prop_assert_eq!(buffer.to_vec(), model.clone());
        }

        for (copy, expected) in snapshots {
            prop_assert_eq!(copy.to_vec(), expected);
        }
    }

    #[test]
    fn prop_scalar_roundtrip_any_endian(
        a in any::<u16>(),
        b in any::<i32>(),
        c in any::<u64>(),
        d in any::<i128>(),
        e in any::<f64>().prop_filter("NaN 不满足自反相等", |v| !v.is_nan()),
        endian in prop_oneof![Just(Endian::Native), Just(Endian::Little), Just(Endian::Big)],
    ) {
        let mut buffer = Buffer::new();
        buffer.add_at_end(2 + 4 + 8 + 16 + 8).expect("扩展");
        let mut it = buffer.begin();
        it.write_endian(a, endian).expect("u16");
        it.write_endian(b, endian).expect("i32");
        it.write_endian(c, endian).expect("u64");
        it.write_endian(d, endian).expect("i128");
        it.write_endian(e, endian).expect("f64");
        prop_assert!(it.is_end());
        drop(it);

        let mut it = buffer.begin();
        prop_assert_eq!(it.read_endian::<u16>(endian).expect("u16"), a);
        prop_assert_eq!(it.read_endian::<i32>(endian).expect("i32"), b);
        prop_assert_eq!(it.read_endian::<u64>(endian).expect("u64"), c);
        prop_assert_eq!(it.read_endian::<i128>(endian).expect("i128"), d);
        prop_assert_eq!(it.read_endian::<f64>(endian).expect("f64"), e);
    }

    #[test]
    fn prop_fragment_retains_intersecting_tags(
        (size, r0, r1) in (2usize..64).prop_flat_map(|size| (Just(size), 0..size))
            .prop_flat_map(|(size, r0)| (Just(size), Just(r0), (r0 + 1)..=size)),
        f0 in 0usize..64,
        f_len in 0usize..64,
    ) {
        let f0 = f0 % size;
        let f_len = f_len % (size - f0 + 1);
        let tag = TagId::new(1);
        let mut list = TagList::with_size(size);
        list.insert(tag, (), r0, r1 - r0).expect("插入");

        let fragment = list.fragment(f0, f_len);
        let f1 = f0 + f_len;
        let intersects = f0 < f1 && r0 < f1 && f0 < r1;
        prop_assert_eq!(fragment.len() == 1, intersects);
        if intersects {
            let span = fragment.iter().next().map(|span| span.range);
            prop_assert_eq!(span, Some(r0.max(f0) - f0..r1.min(f1) - f0));
        }
    }

    #[test]
    fn prop_packet_fragments_reassemble(payload in prop::collection::vec(any::<u8>(), 1..128), cut in 0usize..128) {
        let cut = cut % (payload.len() + 1);
        let packet = Packet::from_bytes(&payload).expect("构造");
        let mut head = packet.make_fragment(0, cut).expect("前段");
        let tail = packet.make_fragment(cut, payload.len() - cut).expect("后段");
        head.append_packet(&tail).expect("重组");
        prop_assert_eq!(head.to_vec(), payload);
    }
}
