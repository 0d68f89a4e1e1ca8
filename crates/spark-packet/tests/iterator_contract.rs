//! `iterator_contract` 集成测试：`BufferIterator` 的字节序、边界与批量读写契约。

use spark_packet::{Buffer, Endian, ErrorClass, PacketError, is_little_endian};

fn sized(len: usize) -> Buffer {
    let mut buffer = Buffer::new();
    buffer.add_at_end(len).expect("扩展");
    buffer
}

/// 三种字节序写入同一位模式时的原始字节。
#[test]
fn endian_modes_lay_out_bytes() {
    let buffer = sized(12);
    let mut it = buffer.begin();
    it.write_be(0xfedc_ba98u32).expect("大端");
    it.write_le(0xfedc_ba98u32).expect("小端");
    it.write(0xfedc_ba98u32).expect("平台序");
    drop(it);

    let bytes = buffer.to_vec();
    assert_eq!(&bytes[0..4], &[0xfe, 0xdc, 0xba, 0x98]);
    assert_eq!(&bytes[4..8], &[0x98, 0xba, 0xdc, 0xfe]);
    let native = if is_little_endian() {
        &bytes[4..8]
    } else {
        &bytes[0..4]
    };
    assert_eq!(&bytes[8..12], native);
}

#[test]
fn floats_and_signed_values_roundtrip() {
    let buffer = sized(8 + 4 + 2 + 16);
    let mut it = buffer.begin();
    it.write_be(-1.5f64).expect("f64");
    it.write_le(3.25f32).expect("f32");
    it.write_endian(-2i16, Endian::Big).expect("i16");
    it.write_le(u128::MAX - 7).expect("u128");
    assert!(it.is_end());
    drop(it);

    let mut it = buffer.begin();
    assert_eq!(it.read_be::<f64>().expect("f64"), -1.5);
    assert_eq!(it.read_le::<f32>().expect("f32"), 3.25);
    assert_eq!(it.read_endian::<i16>(Endian::Big).expect("i16"), -2);
    assert_eq!(it.read_le::<u128>().expect("u128"), u128::MAX - 7);
}

/// 越界的读写与移动返回 `OutOfBounds`，游标保持不变。
#[test]
fn bounds_violations_leave_cursor_unchanged() {
    let buffer = sized(5);
    let mut it = buffer.begin();
    it.move_forward(3).expect("前移");
    for err in [
        it.write_be(1u32).unwrap_err(),
        it.read::<u64>().unwrap_err(),
        it.move_forward(3).unwrap_err(),
        it.move_backward(4).unwrap_err(),
        it.fill(0, 3).unwrap_err(),
    ] {
        assert_eq!(err.class(), ErrorClass::OutOfBounds);
    }
    assert_eq!(it.position(), 3);
    assert_eq!(it.remaining(), 2);
    assert_eq!(it.len(), 5);
}

#[test]
fn reversed_bulk_copies() {
    let buffer = sized(4);
    let mut it = buffer.begin();
    it.write_bytes_reversed(&[1, 2, 3, 4]).expect("逆序写");
    drop(it);
    assert_eq!(buffer.to_vec(), [4, 3, 2, 1]);

    let mut out = [0u8; 4];
    buffer.begin().read_bytes_reversed(&mut out).expect("逆序读");
    assert_eq!(out, [1, 2, 3, 4]);
}

/// 迭代器之间复制字节，任一侧越界时两侧游标都不动。
#[test]
fn write_from_copies_between_buffers() {
    let src = Buffer::from_slice(&[10, 11, 12, 13]).expect("源");
    let dst = sized(3);
    let mut from = src.begin();
    from.move_forward(1).expect("前移");
    let mut to = dst.begin();
    to.write_from(&mut from, 3).expect("复制");
    assert_eq!(from.position(), 4);
    assert_eq!(to.position(), 3);

    let mut from = src.begin();
    let mut to = dst.begin();
    to.move_forward(1).expect("前移");
    assert!(to.write_from(&mut from, 3).is_err());
    assert_eq!(from.position(), 0);
    assert_eq!(to.position(), 1);
    drop((from, to));
    assert_eq!(dst.to_vec(), [11, 12, 13]);
}

#[test]
fn distance_requires_same_storage() {
    let buffer = sized(6);
    let mut a = buffer.begin();
    let b = buffer.end();
    a.move_forward(2).expect("前移");
    assert_eq!(b.distance_from(&a).expect("同一存储"), 4);
    assert_eq!(a.distance_from(&b).expect("同一存储"), -4);

    let other = sized(6);
    let err = a.distance_from(&other.begin()).unwrap_err();
    assert!(matches!(err, PacketError::InvalidArgument { .. }));
}

/// 校验和覆盖奇数长度，结果写回后整体校验和为 0。
#[test]
fn checksum_verifies_to_zero() {
    let header = [
        0x45, 0x00, 0x00, 0x1c, 0x00, 0x00, 0x00, 0x00, 0x40, 0x11, 0x00, 0x00, 0x0a, 0x00, 0x00,
        0x01, 0x0a, 0x00, 0x00, 0x02,
    ];
    let buffer = Buffer::from_slice(&header).expect("构造");
    let sum = buffer.begin().checksum(20).expect("首部校验和");
    let mut it = buffer.begin();
    it.move_forward(10).expect("定位校验和字段");
    it.write_be(sum).expect("回写");
    drop(it);
    assert_eq!(buffer.begin().checksum(20).expect("复验"), 0);

    let odd = Buffer::from_slice(&[0x01]).expect("构造");
    assert_eq!(odd.begin().checksum(1).expect("奇数长度"), !0x0100u16);
}
