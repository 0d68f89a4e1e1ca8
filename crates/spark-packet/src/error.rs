//! # error 模块说明
//!
//! ## 角色定位（Why）
//! - 为缓冲、迭代器、标签表与报文的全部失败路径提供集中定义；
//! - 每个错误都映射到稳定错误码（见 [`codes`]）与四类处置语义（见 [`ErrorClass`]），
//!   调用方无需解析自然语言消息即可决定是修正参数、释放迭代器还是放弃查询。
//!
//! ## 设计要求（What）
//! - 所有变体派生 `thiserror::Error`，与 `std::error::Error` 生态兼容；
//! - 错误均同步返回给直接调用方，库内部不重试、不吞错；
//! - 唯一刻意“吞掉”的情形是 `remove_at_*` 超量裁剪时的截断语义，它不是错误。

use alloc::string::String;

use thiserror::Error;

use crate::tag::TagId;

/// crate 内统一的结果别名。
pub type Result<T, E = PacketError> = core::result::Result<T, E>;

/// 稳定错误码表，命名遵循 `<域>.<语义>`。
pub mod codes {
    /// 参数非法：零长度分配、区间起点越过存储、报文尺寸不一致等。
    pub const INVALID_ARGUMENT: &str = "buffer.invalid_argument";
    /// 迭代器移动或读写越出 `[start, end)`。
    pub const OUT_OF_BOUNDS: &str = "buffer.out_of_bounds";
    /// 别名或锁安全约束被破坏。
    pub const UNEXPECTED: &str = "buffer.unexpected";
    /// 指定偏移处不存在匹配的标签。
    pub const TAG_NOT_FOUND: &str = "tag.not_found";
    /// 分配器拒绝了内存请求。
    pub const ALLOCATION: &str = "buffer.allocation";
    /// 配置文档无法解析。
    pub const CONFIG_INVALID: &str = "config.invalid";
}

/// 错误的处置类别。
///
/// - `InvalidArgument`：调用方需修正输入后重试；
/// - `OutOfBounds`：游标或区间越界，状态保持不变；
/// - `Unexpected`：别名/锁安全约束被破坏，通常意味着仍有迭代器存活或需先调用
///   [`Buffer::make_exclusive`](crate::Buffer::make_exclusive)；
/// - `TagNotFound`：查询未命中。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    InvalidArgument,
    OutOfBounds,
    Unexpected,
    TagNotFound,
}

/// 报文缓冲核心的错误域。
///
/// # 教案式说明
/// - **意图 (Why)**：把存储生命周期、游标越界、别名保护与标签查询的失败合流为一个枚举，
///   上层编解码器可直接 `?` 传播。
/// - **契约 (What)**：
///   - 调整尺寸类操作失败时接收者保持调用前状态（强异常安全）；
///   - `copy_from` 类操作失败时源对象不变、目标对象处于某个合法（可能为空）的状态。
/// - **执行逻辑 (How)**：每个变体携带定位所需的上下文（操作名、偏移、长度、上限），
///   [`PacketError::code`] 与 [`PacketError::class`] 依变体返回稳定分类。
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum PacketError {
    /// 参数违反前置条件。
    #[error("invalid argument in `{op}`: {detail}")]
    InvalidArgument { op: &'static str, detail: String },

    /// 游标移动或读写越界。
    #[error("`{op}` out of bounds: offset {offset} + len {len} exceeds limit {limit}")]
    OutOfBounds {
        op: &'static str,
        offset: usize,
        len: usize,
        limit: usize,
    },

    /// 存储仍被迭代器持有数据锁时尝试移动或调整布局。
    #[error("`{op}` refused: storage is data-locked by {locks} live iterator(s)")]
    DataLocked { op: &'static str, locks: usize },

    /// 目标字节仍与写时复制的兄弟缓冲共享。
    #[error("write of {len} byte(s) at offset {offset} touches bytes shared with another buffer")]
    SharedWrite { offset: usize, len: usize },

    /// 系留片段所属的缓冲已切换存储或已析构，写入不会再到达它。
    #[error("write of {len} byte(s) at offset {offset} targets storage its owner no longer uses")]
    StaleFragment { offset: usize, len: usize },

    /// 向零压缩区写入。
    #[error("write of {len} byte(s) at offset {offset} lands in the zero-compressed area")]
    ZeroAreaWrite { offset: usize, len: usize },

    /// 查询的偏移处没有对应标签。
    #[error("no tag {id} covers offset {offset}")]
    TagNotFound { id: TagId, offset: usize },

    /// 分配器拒绝请求。
    #[error("failed to allocate {requested} byte(s) of storage")]
    Allocation { requested: usize },

    /// 配置文档非法。
    #[error("invalid packet configuration: {reason}")]
    Config { reason: String },
}

impl PacketError {
    pub(crate) fn invalid(op: &'static str, detail: impl Into<String>) -> Self {
        PacketError::InvalidArgument {
            op,
            detail: detail.into(),
        }
    }

    pub(crate) fn out_of_bounds(op: &'static str, offset: usize, len: usize, limit: usize) -> Self {
        PacketError::OutOfBounds {
            op,
            offset,
            len,
            limit,
        }
    }

    /// 返回稳定错误码。
    pub fn code(&self) -> &'static str {
        match self {
            PacketError::InvalidArgument { .. } => codes::INVALID_ARGUMENT,
            PacketError::OutOfBounds { .. } => codes::OUT_OF_BOUNDS,
            PacketError::DataLocked { .. }
            | PacketError::SharedWrite { .. }
            | PacketError::StaleFragment { .. }
            | PacketError::ZeroAreaWrite { .. } => codes::UNEXPECTED,
            PacketError::TagNotFound { .. } => codes::TAG_NOT_FOUND,
            PacketError::Allocation { .. } => codes::ALLOCATION,
            PacketError::Config { .. } => codes::CONFIG_INVALID,
        }
    }

    /// 返回处置类别。
    ///
    /// 分配失败与配置错误都归入 `InvalidArgument`：两者都要求调用方换一组输入再试。
    pub fn class(&self) -> ErrorClass {
        match self {
            PacketError::InvalidArgument { .. }
            | PacketError::Allocation { .. }
            | PacketError::Config { .. } => ErrorClass::InvalidArgument,
            PacketError::OutOfBounds { .. } => ErrorClass::OutOfBounds,
            PacketError::DataLocked { .. }
            | PacketError::SharedWrite { .. }
            | PacketError::StaleFragment { .. }
            | PacketError::ZeroAreaWrite { .. } => ErrorClass::Unexpected,
            PacketError::TagNotFound { .. } => ErrorClass::TagNotFound,
        }
    }
}
