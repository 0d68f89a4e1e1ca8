#![cfg_attr(not(feature = "std"), no_std)]

//! `spark-packet` 提供网络仿真使用的写时复制报文缓冲核心。
//!
//! # 教案背景（Why）
//! - 仿真器中“同一报文递交给多个接收者”是最常见的数据流形态，逐份深拷贝的代价与报文数量成正比；
//! - 本 crate 让报文副本共享同一块引用计数存储，只有在某个副本需要改变布局时才复制字节，
//!   并通过数据锁与写时复制窗口保证一个接收者的修改不会被另一个接收者观察到。
//!
//! # 使用概览（How）
//! - [`Buffer`]：可从两端伸缩的字节缓冲，支持零压缩区与 O(1) 分片；
//! - [`BufferIterator`]：借用缓冲的有界游标，按平台序、小端序或大端序读写标量；
//! - [`TagList`]：附着在字节区间上的标签表，随头尾增删自动平移；
//! - [`Packet`]：缓冲与两张标签表的聚合，提供头/尾增删、打标签、分片与重组。
//!
//! # 合约说明（What）
//! - 所有类型均为单线程值类型（`!Send`），共享通过 `Rc` 完成；
//! - 失败统一以 [`PacketError`] 同步返回，错误码见 [`codes`]；
//! - 库内部只在慢路径（分配、搬移、重新分配、写时复制）输出 `tracing` 事件，不安装订阅者。

extern crate alloc;

mod buffer;
mod config;
mod endian;
mod error;
mod packet;
mod tag;

pub use crate::buffer::{Buffer, BufferIterator, BufferLayout, DataLock, Storage};
pub use crate::config::{CopyPolicy, GrowthPolicy, PacketConfig};
pub use crate::endian::{Endian, Scalar, is_little_endian};
pub use crate::error::{ErrorClass, PacketError, Result, codes};
pub use crate::packet::{Packet, PacketTag, PacketUid};
pub use crate::tag::{TagId, TagList, TagSpan};
