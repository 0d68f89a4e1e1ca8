//! 报文：缓冲与两张标签表的写时复制聚合。
//!
//! # 模块定位（Why）
//! - 仿真中的报文会被广播、分片、重组、封装进另一个报文；[`Packet`] 把
//!   `{Buffer, 字节标签表, 报文标签表}` 放在同一个引用计数的 `Body` 之后，
//!   让复制报文始终是 O(1) 的，并让三部分的修改看起来是一个原子操作。
//!
//! # 设计概要（How）
//! - 读操作直接访问共享的 `Body`，从不触发复制；
//! - 任何修改先经过 `body_mut`：`Body` 被共享时以 `Rc::make_mut` 克隆一份，克隆本身只是
//!   缓冲与标签表的写时复制副本，真正的字节复制推迟到缓冲需要重新布局时；
//! - 报文标签的载荷在构造时即深拷贝，因此标签永远不会与持有它的报文共享 `Body`，
//!   引用环在结构上不可能出现。
//!
//! # 契约说明（What）
//! - 缓冲与两张标签表的长度始终一致；
//! - 修改失败时报文内容保持调用前状态（`Body` 可能已被私有化，但内容相同）。

use alloc::{rc::Rc, vec::Vec};
use core::{
    fmt,
    sync::atomic::{AtomicU64, Ordering},
};

use bytes::Bytes;

use crate::{
    buffer::Buffer,
    config::PacketConfig,
    error::{PacketError, Result},
    tag::{TagId, TagList, TagSpan},
};

static NEXT_UID: AtomicU64 = AtomicU64::new(1);

/// 进程内唯一的报文编号。
///
/// 复制、分片与深拷贝都保留编号（它们仍是同一个逻辑报文）；重组保留接收方的编号。
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PacketUid(u64);

impl PacketUid {
    fn next() -> Self {
        Self(NEXT_UID.fetch_add(1, Ordering::Relaxed))
    }

    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for PacketUid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "packet#{}", self.0)
    }
}

/// 作为标签载荷的报文。
///
/// 只能通过 [`PacketTag::new`] 构造，构造时总是深拷贝原报文。
#[derive(Clone, Debug)]
pub struct PacketTag {
    packet: Packet,
}

impl PacketTag {
    pub fn new(packet: &Packet) -> Result<Self> {
        Ok(Self {
            packet: packet.deep_clone()?,
        })
    }

    pub fn packet(&self) -> &Packet {
        &self.packet
    }

    pub fn into_packet(self) -> Packet {
        self.packet
    }
}

#[derive(Clone)]
struct Body {
    buffer: Buffer,
    byte_tags: TagList<Bytes>,
    packet_tags: TagList<PacketTag>,
}

impl Body {
    fn new(mut buffer: Buffer) -> Self {
        buffer.untether();
        let size = buffer.size();
        Self {
            buffer,
            byte_tags: TagList::with_size(size),
            packet_tags: TagList::with_size(size),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Edge {
    Header,
    Trailer,
}

/// 写时复制的报文。
///
/// # 教案式说明
/// - **意图 (Why)**：让“同一报文发给多个接收者”只花一次引用计数，接收者各自的修改互不可见。
/// - **契约 (What)**：
///   - 复制（`Clone`）共享 `Body`，并把当前数据区登记进缓冲存储的写时复制窗口，
///     此前由 [`add_header`](Self::add_header) 等返回的片段此后不能再写入共享字节；
///   - 头/尾增删、打标签、`copy_tags_from` 会先私有化 `Body`；
///   - 查询（`size`、`buffer`、标签查询）从不私有化。
/// - **执行逻辑 (How)**：见模块文档。
pub struct Packet {
    body: Rc<Body>,
    uid: PacketUid,
    config: PacketConfig,
}

impl Packet {
    /// 创建空报文。
    pub fn new() -> Self {
        Self::with_config(PacketConfig::default())
    }

    /// 创建使用指定配置的空报文；后续分配的存储按 `config.growth` 预留余量。
    pub fn with_config(config: PacketConfig) -> Self {
        Self::assemble(Buffer::with_policy(config.growth), config)
    }

    /// 创建 `size` 字节的零负载报文，负载位于零压缩区，不分配存储。
    pub fn with_size(size: usize) -> Self {
        let config = PacketConfig::default();
        Self::assemble(Buffer::zeroed_with_policy(size, config.growth), config)
    }

    /// 以既有缓冲为负载创建报文，与该缓冲共享存储。
    pub fn from_buffer(buffer: Buffer) -> Self {
        Self::assemble(buffer, PacketConfig::default())
    }

    /// 复制 `bytes` 作为负载创建报文。
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let config = PacketConfig::default();
        let buffer = Buffer::from_slice_with_policy(bytes, config.growth)?;
        Ok(Self::assemble(buffer, config))
    }

    fn assemble(buffer: Buffer, config: PacketConfig) -> Self {
        Self {
            body: Rc::new(Body::new(buffer)),
            uid: PacketUid::next(),
            config,
        }
    }

    pub fn size(&self) -> usize {
        self.body.buffer.size()
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    pub fn uid(&self) -> PacketUid {
        self.uid
    }

    pub fn config(&self) -> PacketConfig {
        self.config
    }

    /// 返回负载缓冲的写时复制副本，O(1)。
    ///
    /// 副本存活期间其数据区受写时复制窗口保护；需要写入时先调用
    /// [`Buffer::make_exclusive`]，报文本身不受影响。
    pub fn buffer(&self) -> Buffer {
        self.body.buffer.clone()
    }

    /// 扁平化负载，零压缩区以 0 填充。
    pub fn to_vec(&self) -> Vec<u8> {
        self.body.buffer.to_vec()
    }

    /// 在前端扩展 `len` 字节，返回覆盖新区间的可写片段，调用方经由片段填充头部。
    ///
    /// # 契约说明（What）
    /// - 片段应在报文下一次调整尺寸之前填充：调整尺寸可能让报文迁往新存储，
    ///   此后经由片段的写入返回 `StaleFragment`，报文内容不变；
    /// - 报文被复制后，片段与副本共享的字节不可写（`SharedWrite`）；
    /// - 报文析构后片段的写入同样返回 `StaleFragment`。
    pub fn add_header(&mut self, len: usize) -> Result<Buffer> {
        self.extend(Edge::Header, len)?;
        self.body_mut().buffer.tethered_fragment(0, len)
    }

    /// 在末端扩展 `len` 字节，返回覆盖新区间的可写片段；片段的有效期与
    /// [`add_header`](Self::add_header) 相同。
    pub fn add_trailer(&mut self, len: usize) -> Result<Buffer> {
        self.extend(Edge::Trailer, len)?;
        let size = self.size();
        self.body_mut().buffer.tethered_fragment(size - len, len)
    }

    /// 以 `header` 的字节作为新头部；零压缩区以真实零字节写入。
    pub fn add_header_from(&mut self, header: &Buffer) -> Result<()> {
        let bytes = header.to_vec();
        self.extend_with(Edge::Header, &bytes)?;
        let body = self.body_mut();
        body.byte_tags.add_at_start(bytes.len());
        body.packet_tags.add_at_start(bytes.len());
        Ok(())
    }

    /// 以 `trailer` 的字节作为新尾部。
    pub fn add_trailer_from(&mut self, trailer: &Buffer) -> Result<()> {
        let bytes = trailer.to_vec();
        self.extend_with(Edge::Trailer, &bytes)?;
        let body = self.body_mut();
        body.byte_tags.add_at_end(bytes.len());
        body.packet_tags.add_at_end(bytes.len());
        Ok(())
    }

    /// 从前端移除 `len` 字节，超量时报文变为空；标签随之裁剪。
    pub fn remove_header(&mut self, len: usize) -> Result<()> {
        let body = self.body_mut();
        body.buffer.remove_at_start(len)?;
        body.byte_tags.remove_at_start(len);
        body.packet_tags.remove_at_start(len);
        Ok(())
    }

    /// 从末端移除 `len` 字节，超量时报文变为空；标签随之裁剪。
    pub fn remove_trailer(&mut self, len: usize) -> Result<()> {
        let body = self.body_mut();
        body.buffer.remove_at_end(len)?;
        body.byte_tags.remove_at_end(len);
        body.packet_tags.remove_at_end(len);
        Ok(())
    }

    /// 截取 `[offset, offset + len)` 窗口为新报文。
    ///
    /// # 契约说明（What）
    /// - 越界返回 `OutOfBounds`；
    /// - 与原报文写时复制地共享存储，窗口外的字节与标签被丢弃；
    /// - 窗口内哪怕只覆盖一个字节的标签也会保留；
    /// - 新报文保留原报文的 [`PacketUid`]。
    pub fn make_fragment(&self, offset: usize, len: usize) -> Result<Packet> {
        let body = &self.body;
        let shared = body.buffer.clone();
        let buffer = shared.make_fragment(offset, len)?;
        Ok(Packet {
            body: Rc::new(Body {
                buffer,
                byte_tags: body.byte_tags.fragment(offset, len),
                packet_tags: body.packet_tags.fragment(offset, len),
            }),
            uid: self.uid,
            config: self.config,
        })
    }

    /// 将 `other` 整体作为头部拼接（重组或封装），合并其标签。
    pub fn prepend_packet(&mut self, other: &Packet) -> Result<()> {
        self.reassemble(Edge::Header, other)
    }

    /// 将 `other` 整体作为尾部拼接（重组或封装），合并其标签。
    pub fn append_packet(&mut self, other: &Packet) -> Result<()> {
        self.reassemble(Edge::Trailer, other)
    }

    /// 在 `[offset, offset + len)` 上附加字节标签。
    pub fn add_byte_tag(
        &mut self,
        id: TagId,
        payload: impl Into<Bytes>,
        offset: usize,
        len: usize,
    ) -> Result<()> {
        self.body_mut()
            .byte_tags
            .insert(id, payload.into(), offset, len)
    }

    /// 在 `[offset, offset + len)` 上附加报文标签，`packet` 被深拷贝后存入。
    pub fn add_packet_tag(
        &mut self,
        id: TagId,
        packet: &Packet,
        offset: usize,
        len: usize,
    ) -> Result<()> {
        let tag = PacketTag::new(packet)?;
        self.body_mut().packet_tags.insert(id, tag, offset, len)
    }

    pub fn has_byte_tag(&self, id: TagId, offset: usize) -> bool {
        self.body.byte_tags.exists(id, offset)
    }

    /// 返回覆盖 `offset` 的字节标签；多个同 id 标签重叠时取最近附加的。
    pub fn byte_tag(&self, id: TagId, offset: usize) -> Result<&Bytes> {
        self.body.byte_tags.get(id, offset)
    }

    pub fn has_packet_tag(&self, id: TagId, offset: usize) -> bool {
        self.body.packet_tags.exists(id, offset)
    }

    pub fn packet_tag(&self, id: TagId, offset: usize) -> Result<&Packet> {
        self.body
            .packet_tags
            .get(id, offset)
            .map(PacketTag::packet)
    }

    pub fn byte_tags(&self) -> impl Iterator<Item = TagSpan<'_, Bytes>> + '_ {
        self.body.byte_tags.iter()
    }

    pub fn packet_tags(&self) -> impl Iterator<Item = TagSpan<'_, PacketTag>> + '_ {
        self.body.packet_tags.iter()
    }

    pub fn remove_all_byte_tags(&mut self) {
        self.body_mut().byte_tags.remove_all();
    }

    pub fn remove_all_packet_tags(&mut self) {
        self.body_mut().packet_tags.remove_all();
    }

    /// 以 `src` 的两张标签表整体替换当前标签。
    ///
    /// 任一报文为空时什么也不做；两者长度不同返回 `InvalidArgument`。
    pub fn copy_tags_from(&mut self, src: &Packet) -> Result<()> {
        if self.is_empty() || src.is_empty() {
            return Ok(());
        }
        if self.size() != src.size() {
            return Err(PacketError::invalid(
                "Packet::copy_tags_from",
                alloc::format!(
                    "source size {} differs from destination size {}",
                    src.size(),
                    self.size()
                ),
            ));
        }
        let byte_tags = src.body.byte_tags.clone();
        let packet_tags = src.body.packet_tags.clone();
        let body = self.body_mut();
        body.byte_tags = byte_tags;
        body.packet_tags = packet_tags;
        Ok(())
    }

    /// 显式深拷贝：新报文拥有私有存储与私有标签表，按 `config.copy_policy` 复制缓冲。
    pub fn deep_clone(&self) -> Result<Packet> {
        let body = &self.body;
        let mut buffer = Buffer::with_policy(self.config.growth);
        buffer.copy_from(&body.buffer, self.config.copy_policy)?;
        tracing::trace!(uid = %self.uid, size = buffer.size(), "packet deep cloned");
        Ok(Packet {
            body: Rc::new(Body {
                buffer,
                byte_tags: body.byte_tags.detached(),
                packet_tags: body.packet_tags.detached(),
            }),
            uid: self.uid,
            config: self.config,
        })
    }

    fn body_mut(&mut self) -> &mut Body {
        let shared = Rc::strong_count(&self.body);
        if shared > 1 {
            tracing::trace!(uid = %self.uid, shared, "packet body copied on write");
        }
        Rc::make_mut(&mut self.body)
    }

    /// 扩展缓冲与两张标签表；新区间内容未定义。
    fn extend(&mut self, edge: Edge, len: usize) -> Result<()> {
        let body = self.body_mut();
        match edge {
            Edge::Header => {
                body.buffer.add_at_start(len)?;
                body.byte_tags.add_at_start(len);
                body.packet_tags.add_at_start(len);
            }
            Edge::Trailer => {
                body.buffer.add_at_end(len)?;
                body.byte_tags.add_at_end(len);
                body.packet_tags.add_at_end(len);
            }
        }
        Ok(())
    }

    /// 只扩展缓冲并写入 `bytes`；写入失败时撤销扩展。标签表由调用方同步。
    fn extend_with(&mut self, edge: Edge, bytes: &[u8]) -> Result<()> {
        let len = bytes.len();
        if len == 0 {
            return Ok(());
        }
        let buffer = &mut self.body_mut().buffer;
        match edge {
            Edge::Header => buffer.add_at_start(len)?,
            Edge::Trailer => buffer.add_at_end(len)?,
        }
        let pos = match edge {
            Edge::Header => 0,
            Edge::Trailer => buffer.size() - len,
        };
        if let Err(err) = buffer.write_at(pos, bytes) {
            let rollback = match edge {
                Edge::Header => buffer.remove_at_start(len),
                Edge::Trailer => buffer.remove_at_end(len),
            };
            if let Err(rollback) = rollback {
                tracing::warn!(error = %rollback, "failed to roll back packet growth");
            }
            return Err(err);
        }
        Ok(())
    }

    fn reassemble(&mut self, edge: Edge, other: &Packet) -> Result<()> {
        let byte_tags = other.body.byte_tags.clone();
        let packet_tags = other.body.packet_tags.clone();
        if self.is_empty() {
            let buffer = other.body.buffer.clone();
            let body = self.body_mut();
            body.buffer = buffer;
        } else {
            let bytes = other.to_vec();
            self.extend_with(edge, &bytes)?;
        }
        let body = self.body_mut();
        match edge {
            Edge::Header => {
                body.byte_tags.prepend(&byte_tags);
                body.packet_tags.prepend(&packet_tags);
            }
            Edge::Trailer => {
                body.byte_tags.append(&byte_tags);
                body.packet_tags.append(&packet_tags);
            }
        }
        tracing::trace!(
            uid = %self.uid,
            other = %other.uid,
            ?edge,
            size = self.size(),
            "packets reassembled"
        );
        Ok(())
    }
}

impl Default for Packet {
    fn default() -> Self {
        Self::new()
    }
}

/// O(1) 复制：共享 `Body`，并保护当前数据区不被此前交出的片段改写。
impl Clone for Packet {
    fn clone(&self) -> Self {
        self.body.buffer.protect_data();
        Self {
            body: Rc::clone(&self.body),
            uid: self.uid,
            config: self.config,
        }
    }
}

impl fmt::Debug for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Packet")
            .field("uid", &self.uid)
            .field("size", &self.size())
            .field("byte_tags", &self.body.byte_tags.len())
            .field("packet_tags", &self.body.packet_tags.len())
            .finish()
    }
}
