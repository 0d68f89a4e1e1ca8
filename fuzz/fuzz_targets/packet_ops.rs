#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use spark_packet::{Packet, TagId};

/// Fuzz 输入：一组报文与施加其上的操作序列。
///
/// - **Why**：头尾增删、复制、分片与重组的任意交错最容易暴露写时复制泄漏与尺寸簿记错误；
/// - **How**：维护一组报文及其影子字节模型，操作通过索引选择目标报文；
/// - **What**：每一步之后，每个报文的字节都必须与影子模型一致。
#[derive(Debug, Arbitrary)]
struct PacketCase {
    seed: Vec<u8>,
    ops: Vec<PacketOp>,
}

#[derive(Debug, Arbitrary)]
enum PacketOp {
    /// 压入头部并以 `fill` 填充。
    AddHeader { id: u8, len: u8, fill: u8 },
    /// 压入尾部并以 `fill` 填充。
    AddTrailer { id: u8, len: u8, fill: u8 },
    RemoveHeader { id: u8, len: u8 },
    RemoveTrailer { id: u8, len: u8 },
    /// 复制报文，模拟广播给另一个接收者。
    Clone { id: u8 },
    /// 截取分片作为新报文。
    Fragment { id: u8, offset: u8, len: u8 },
    /// 将 `other` 拼接到 `id` 的尾部。
    Append { id: u8, other: u8 },
    /// 在 `id` 上打一个字节标签。
    Tag { id: u8, offset: u8, len: u8 },
}

fuzz_target!(|case: PacketCase| {
    let Ok(first) = Packet::from_bytes(&case.seed) else {
        return;
    };
    let mut packets = vec![first];
    let mut models = vec![case.seed.clone()];

    for op in case.ops {
        match op {
            PacketOp::AddHeader { id, len, fill } => {
                let idx = map_index(&packets, id);
                let len = usize::from(len);
                let header = packets[idx].add_header(len).expect("压入头部");
                header.begin().fill(fill, len).expect("新头部可写");
                let mut grown = vec![fill; len];
                grown.extend_from_slice(&models[idx]);
                models[idx] = grown;
            }
            PacketOp::AddTrailer { id, len, fill } => {
                let idx = map_index(&packets, id);
                let len = usize::from(len);
                let trailer = packets[idx].add_trailer(len).expect("压入尾部");
                trailer.begin().fill(fill, len).expect("新尾部可写");
                models[idx].extend(std::iter::repeat_n(fill, len));
            }
            PacketOp::RemoveHeader { id, len } => {
                let idx = map_index(&packets, id);
                let len = usize::from(len);
                packets[idx].remove_header(len).expect("弹出头部");
                let model = &mut models[idx];
                model.drain(..len.min(model.len()));
            }
            PacketOp::RemoveTrailer { id, len } => {
                let idx = map_index(&packets, id);
                let len = usize::from(len);
                packets[idx].remove_trailer(len).expect("弹出尾部");
                let model = &mut models[idx];
                model.truncate(model.len().saturating_sub(len));
            }
            PacketOp::Clone { id } => {
                let idx = map_index(&packets, id);
                packets.push(packets[idx].clone());
                models.push(models[idx].clone());
            }
            PacketOp::Fragment { id, offset, len } => {
                let idx = map_index(&packets, id);
                let size = packets[idx].size();
                let offset = usize::from(offset).min(size);
                let len = usize::from(len).min(size - offset);
                let fragment = packets[idx].make_fragment(offset, len).expect("窗口合法");
                packets.push(fragment);
                models.push(models[idx][offset..offset + len].to_vec());
            }
            PacketOp::Append { id, other } => {
                let idx = map_index(&packets, id);
                let other_idx = map_index(&packets, other);
                let other_packet = packets[other_idx].clone();
                packets[idx].append_packet(&other_packet).expect("重组");
                let tail = models[other_idx].clone();
                models[idx].extend(tail);
            }
            PacketOp::Tag { id, offset, len } => {
                let idx = map_index(&packets, id);
                let size = packets[idx].size();
                let offset = usize::from(offset);
                let len = usize::from(len);
                let accepted = packets[idx]
                    .add_byte_tag(TagId::new(1), &b"fuzz"[..], offset, len)
                    .is_ok();
                assert_eq!(accepted, len > 0 && offset + len <= size);
            }
        }

        for (packet, model) in packets.iter().zip(&models) {
            assert_eq!(packet.size(), model.len());
            assert_eq!(&packet.to_vec(), model);
        }
    }
});

fn map_index<T>(items: &[T], raw: u8) -> usize {
    usize::from(raw) % items.len()
}
