//! 缓冲上的有界游标。
//!
//! # 设计概要（How）
//! - 迭代器借用 [`Buffer`]，借用期间该缓冲无法被扩展或裁剪，悬垂游标在编译期即被排除；
//! - 同时持有存储的 [`DataLock`]：共享同一存储的其它缓冲在锁存活期间调整尺寸会被拒绝；
//! - 游标区间在创建时固定为缓冲数据区 `[0, size)`，所有读写都在游标处进行并推进游标。
//!
//! # 契约说明（What）
//! - 任何越界的移动或读写返回 `OutOfBounds`，游标保持不变；
//! - 写入零压缩区返回 `ZeroAreaWrite`，写入仍与写时复制兄弟共享的字节返回 `SharedWrite`，
//!   两种情况下都不会写入任何字节，游标也不移动。

use alloc::vec::Vec;
use core::fmt;

use super::{Buffer, storage::DataLock};
use crate::{
    endian::{Endian, Scalar},
    error::{PacketError, Result},
};

/// 有界、按字节序读写的缓冲游标。
pub struct BufferIterator<'a> {
    buffer: &'a Buffer,
    lock: Option<DataLock>,
    start: usize,
    end: usize,
    cursor: usize,
}

impl<'a> BufferIterator<'a> {
    pub(crate) fn new(buffer: &'a Buffer, cursor: usize) -> Self {
        Self {
            buffer,
            lock: buffer.storage().map(DataLock::acquire),
            start: 0,
            end: buffer.size(),
            cursor,
        }
    }

    /// 游标相对数据区起点的偏移。
    pub fn position(&self) -> usize {
        self.cursor - self.start
    }

    /// 游标可移动区间的长度。
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// 游标之后剩余的字节数。
    pub fn remaining(&self) -> usize {
        self.end - self.cursor
    }

    pub fn is_start(&self) -> bool {
        self.cursor == self.start
    }

    pub fn is_end(&self) -> bool {
        self.cursor == self.end
    }

    pub fn move_forward(&mut self, len: usize) -> Result<()> {
        let pos = self.reserve("BufferIterator::move_forward", len)?;
        self.cursor = pos + len;
        Ok(())
    }

    pub fn move_backward(&mut self, len: usize) -> Result<()> {
        if len > self.cursor - self.start {
            return Err(PacketError::out_of_bounds(
                "BufferIterator::move_backward",
                self.position(),
                len,
                self.len(),
            ));
        }
        self.cursor -= len;
        Ok(())
    }

    /// `self` 相对 `other` 的游标距离（`self - other`）。
    ///
    /// 两个迭代器必须指向同一块存储，否则返回 `InvalidArgument`。
    pub fn distance_from(&self, other: &BufferIterator<'_>) -> Result<isize> {
        let same = match (&self.lock, &other.lock) {
            (Some(a), Some(b)) => a.storage().same_as(b.storage()),
            (None, None) => core::ptr::eq(self.buffer, other.buffer),
            _ => false,
        };
        if !same {
            return Err(PacketError::invalid(
                "BufferIterator::distance_from",
                "iterators view different storages",
            ));
        }
        Ok(self.cursor as isize - other.cursor as isize)
    }

    /// 以平台字节序写入标量。
    pub fn write<T: Scalar>(&mut self, value: T) -> Result<()> {
        self.write_endian(value, Endian::Native)
    }

    /// 以小端序写入标量。
    pub fn write_le<T: Scalar>(&mut self, value: T) -> Result<()> {
        self.write_endian(value, Endian::Little)
    }

    /// 以大端序（网络序）写入标量。
    pub fn write_be<T: Scalar>(&mut self, value: T) -> Result<()> {
        self.write_endian(value, Endian::Big)
    }

    pub fn write_endian<T: Scalar>(&mut self, value: T, endian: Endian) -> Result<()> {
        let bytes = endian.encode(value);
        self.write_bytes(bytes.as_ref())
    }

    /// 以平台字节序读取标量。
    pub fn read<T: Scalar>(&mut self) -> Result<T> {
        self.read_endian(Endian::Native)
    }

    pub fn read_le<T: Scalar>(&mut self) -> Result<T> {
        self.read_endian(Endian::Little)
    }

    pub fn read_be<T: Scalar>(&mut self) -> Result<T> {
        self.read_endian(Endian::Big)
    }

    pub fn read_endian<T: Scalar>(&mut self, endian: Endian) -> Result<T> {
        let mut bytes = T::Bytes::default();
        self.read_bytes(bytes.as_mut())?;
        Ok(endian.decode(bytes))
    }

    /// 顺序写入字节切片。
    pub fn write_bytes(&mut self, src: &[u8]) -> Result<()> {
        let pos = self.reserve("BufferIterator::write_bytes", src.len())?;
        self.buffer.write_at(pos, src)?;
        self.cursor = pos + src.len();
        Ok(())
    }

    /// 逆序写入字节切片：`src` 的最后一个字节落在游标处。
    pub fn write_bytes_reversed(&mut self, src: &[u8]) -> Result<()> {
        let reversed: Vec<u8> = src.iter().rev().copied().collect();
        self.write_bytes(&reversed)
    }

    /// 顺序读取 `dst.len()` 个字节。
    pub fn read_bytes(&mut self, dst: &mut [u8]) -> Result<()> {
        let pos = self.reserve("BufferIterator::read_bytes", dst.len())?;
        self.buffer.read_at(pos, dst);
        self.cursor = pos + dst.len();
        Ok(())
    }

    /// 读取 `dst.len()` 个字节并逆序存放。
    pub fn read_bytes_reversed(&mut self, dst: &mut [u8]) -> Result<()> {
        self.read_bytes(dst)?;
        dst.reverse();
        Ok(())
    }

    /// 写入 `len` 个值为 `value` 的字节。
    pub fn fill(&mut self, value: u8, len: usize) -> Result<()> {
        let pos = self.reserve("BufferIterator::fill", len)?;
        self.buffer.fill_at(pos, len, value)?;
        self.cursor = pos + len;
        Ok(())
    }

    /// 从 `src` 的游标处复制 `len` 字节到当前游标，两个游标都前移 `len`。
    ///
    /// 任一侧越界或写入被拒绝时两个游标都不移动。
    pub fn write_from(&mut self, src: &mut BufferIterator<'_>, len: usize) -> Result<()> {
        let dst_pos = self.reserve("BufferIterator::write_from", len)?;
        let src_pos = src.reserve("BufferIterator::write_from", len)?;
        let mut staging = alloc::vec![0u8; len];
        src.buffer.read_at(src_pos, &mut staging);
        self.buffer.write_at(dst_pos, &staging)?;
        src.cursor = src_pos + len;
        self.cursor = dst_pos + len;
        Ok(())
    }

    /// 对接下来 `len` 字节计算 RFC 1071 互联网校验和并推进游标。
    ///
    /// 奇数长度时末字节按高位补零处理。
    pub fn checksum(&mut self, len: usize) -> Result<u16> {
        let mut bytes = alloc::vec![0u8; len];
        self.read_bytes(&mut bytes)?;
        let mut sum: u64 = bytes
            .chunks(2)
            .map(|pair| match pair {
                [hi, lo] => u64::from(u16::from_be_bytes([*hi, *lo])),
                [hi] => u64::from(*hi) << 8,
                _ => 0,
            })
            .sum();
        while sum >> 16 != 0 {
            sum = (sum & 0xffff) + (sum >> 16);
        }
        Ok(!(sum as u16))
    }

    /// 校验游标后还剩 `len` 字节，返回当前游标。
    fn reserve(&self, op: &'static str, len: usize) -> Result<usize> {
        if len > self.remaining() {
            return Err(PacketError::out_of_bounds(
                op,
                self.position(),
                len,
                self.len(),
            ));
        }
        Ok(self.cursor)
    }
}

impl fmt::Debug for BufferIterator<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BufferIterator")
            .field("start", &self.start)
            .field("end", &self.end)
            .field("cursor", &self.cursor)
            .field("locked", &self.lock.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use crate::{Buffer, BufferLayout, PacketError};

    #[test]
    fn big_endian_write_produces_network_order() {
        let mut buffer = Buffer::new();
        buffer.add_at_end(4).expect("扩展");
        buffer.begin().write_be(0xfedc_ba98u32).expect("写入");
        assert_eq!(buffer.to_vec(), [0xfe, 0xdc, 0xba, 0x98]);
        assert_eq!(buffer.begin().read_le::<u32>().expect("读取"), 0x98ba_dcfe);
    }

    #[test]
    fn failed_read_leaves_cursor_in_place() {
        let mut buffer = Buffer::new();
        buffer.add_at_end(3).expect("扩展");
        let mut it = buffer.begin();
        it.move_forward(2).expect("前移");
        let err = it.read::<u16>().unwrap_err();
        assert!(matches!(err, PacketError::OutOfBounds { offset: 2, len: 2, limit: 3, .. }));
        assert_eq!(it.position(), 2);
        assert!(it.move_backward(3).is_err());
        assert_eq!(it.position(), 2);
    }

    #[test]
    fn zero_area_reads_zero_and_rejects_writes() {
        let buffer = Buffer::with_layout(BufferLayout {
            headroom: 0,
            zero_size: 6,
            tailroom: 0,
        })
        .expect("布局");
        let mut it = buffer.begin();
        assert_eq!(it.read_be::<u32>().expect("零区可读"), 0);
        it.move_backward(4).expect("回退");
        assert!(matches!(
            it.write::<u8>(1),
            Err(PacketError::ZeroAreaWrite { offset: 0, len: 1 })
        ));
        assert!(it.is_start());
    }

    #[test]
    fn iterator_lock_blocks_sibling_resize() {
        let original = Buffer::from_slice(&[1, 2, 3, 4]).expect("构造");
        let mut sibling = original.clone();
        let it = original.begin();
        assert!(matches!(
            sibling.add_at_end(2),
            Err(PacketError::DataLocked { locks: 1, .. })
        ));
        assert_eq!(sibling.size(), 4);
        drop(it);
        sibling.add_at_end(2).expect("锁释放后可扩展");
    }

    #[test]
    fn checksum_matches_rfc1071_example() {
        let buffer =
            Buffer::from_slice(&[0x00, 0x01, 0xf2, 0x03, 0xf4, 0xf5, 0xf6, 0xf7]).expect("构造");
        let sum = buffer.begin().checksum(8).expect("校验和");
        assert_eq!(sum, !0xddf2u16);
    }
}
