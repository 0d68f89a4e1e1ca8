//! 缓冲与报文的可调参数。
//!
//! # 模块定位（Why）
//! - 新存储分配时预留多少头/尾余量、深拷贝时复用目标存储的策略，都是仿真场景相关的取舍，
//!   不应硬编码在算法里；
//! - 配置项以 `serde` 结构描述，启用 `std` 特性时可从 TOML 文档加载。
//!
//! # 契约说明（What）
//! - 所有字段都有默认值，空文档等价于 [`PacketConfig::default`]；
//! - 默认 `GrowthPolicy` 的余量为 0，即“恰好容纳数据 + 增量”的分配方式。

use serde::Deserialize;

#[cfg(feature = "std")]
use crate::error::{PacketError, Result};

/// 分配新存储时在数据两侧额外预留的字节数。
///
/// 预留余量让后续的 `add_at_start`/`add_at_end` 有机会走 O(1) 的原地扩展路径，
/// 代价是每次分配多占用 `headroom + tailroom` 字节。
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GrowthPolicy {
    pub headroom: usize,
    pub tailroom: usize,
}

impl GrowthPolicy {
    pub const fn new(headroom: usize, tailroom: usize) -> Self {
        Self { headroom, tailroom }
    }

    /// 两侧余量之和，溢出时返回 `None`。
    pub(crate) fn slack(&self) -> Option<usize> {
        self.headroom.checked_add(self.tailroom)
    }
}

/// `Buffer::copy_from` 复用目标存储的判定策略。
///
/// - `AccommodateData`：目标存储容量能放下源的已存储字节即复用，必要时压缩两侧余量；
/// - `AccommodateSize`：目标存储容量能放下源的整个存储占用才复用，并保留源的余量布局。
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CopyPolicy {
    #[default]
    AccommodateData,
    AccommodateSize,
}

/// 报文级配置。
///
/// ```toml
/// copy_policy = "accommodate_size"
///
/// [growth]
/// headroom = 64
/// tailroom = 16
/// ```
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PacketConfig {
    pub growth: GrowthPolicy,
    pub copy_policy: CopyPolicy,
}

impl PacketConfig {
    /// 从 TOML 文本解析配置。
    ///
    /// # 契约说明（What）
    /// - 未出现的字段取默认值；
    /// - 未知字段或类型不匹配返回 [`PacketError::Config`]，消息携带解析器给出的位置说明。
    #[cfg(feature = "std")]
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        toml::from_str(raw).map_err(|err| PacketError::Config {
            reason: err.to_string(),
        })
    }
}
