//! 附着在字节区间上的元数据（标签）。
//!
//! - 字节标签的载荷是一段只读的 `bytes::Bytes`；
//! - 报文标签的载荷是一个完整报文，见 [`PacketTag`](crate::PacketTag)；
//! - 两者共用同一个泛型容器 [`TagList`]，坐标随缓冲头尾的增删同步平移。

mod list;

use core::fmt;

pub use list::{TagList, TagSpan};

/// 不透明的标签键。
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TagId(u32);

impl TagId {
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    pub const fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for TagId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tag#{}", self.0)
    }
}

impl From<u32> for TagId {
    fn from(raw: u32) -> Self {
        Self(raw)
    }
}
