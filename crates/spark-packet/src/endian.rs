//! 字节序探测与标量编解码。
//!
//! 标量与字节数组之间一律通过 `to_*_bytes`/`from_*_bytes` 显式转换，不做内存布局重解释。
//! `Native` 在编译期解析为 `Little` 或 `Big`，因此与平台一致的那一路就是直接拷贝，另一路是字节翻转。

/// 当前平台是否为小端。
#[inline]
pub const fn is_little_endian() -> bool {
    cfg!(target_endian = "little")
}

/// 读写时采用的字节序。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Endian {
    /// 平台字节序。
    Native,
    /// 最低有效字节在前。
    Little,
    /// 最高有效字节在前（网络序）。
    Big,
}

impl Endian {
    /// 平台字节序对应的具体取值。
    #[inline]
    pub const fn native() -> Self {
        if is_little_endian() {
            Endian::Little
        } else {
            Endian::Big
        }
    }

    /// 将 `Native` 解析为 `Little`/`Big`。
    #[inline]
    pub const fn resolve(self) -> Self {
        match self {
            Endian::Native => Self::native(),
            other => other,
        }
    }

    pub fn encode<T: Scalar>(self, value: T) -> T::Bytes {
        match self.resolve() {
            Endian::Big => value.to_be(),
            _ => value.to_le(),
        }
    }

    pub fn decode<T: Scalar>(self, bytes: T::Bytes) -> T {
        match self.resolve() {
            Endian::Big => T::from_be(bytes),
            _ => T::from_le(bytes),
        }
    }
}

mod sealed {
    pub trait Sealed {}
}

/// 可经 `BufferIterator` 读写的定宽标量。
///
/// 该 trait 是封闭的：宽度与字节序规则由本 crate 统一维护。
pub trait Scalar: Copy + sealed::Sealed {
    /// 编码后的字节数。
    const WIDTH: usize;
    /// 定长字节数组。
    type Bytes: AsRef<[u8]> + AsMut<[u8]> + Default;

    fn to_le(self) -> Self::Bytes;
    fn to_be(self) -> Self::Bytes;
    fn from_le(bytes: Self::Bytes) -> Self;
    fn from_be(bytes: Self::Bytes) -> Self;
}

macro_rules! impl_scalar {
    ($($ty:ty),* $(,)?) => {
        $(
            impl sealed::Sealed for $ty {}

            impl Scalar for $ty {
                const WIDTH: usize = core::mem::size_of::<$ty>();
                type Bytes = [u8; core::mem::size_of::<$ty>()];

                #[inline]
                fn to_le(self) -> Self::Bytes {
                    self.to_le_bytes()
                }

                #[inline]
                fn to_be(self) -> Self::Bytes {
                    self.to_be_bytes()
                }

                #[inline]
                fn from_le(bytes: Self::Bytes) -> Self {
                    <$ty>::from_le_bytes(bytes)
                }

                #[inline]
                fn from_be(bytes: Self::Bytes) -> Self {
                    <$ty>::from_be_bytes(bytes)
                }
            }
        )*
    };
}

impl_scalar!(u8, u16, u32, u64, u128, i8, i16, i32, i64, i128, f32, f64);
