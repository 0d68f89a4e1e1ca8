//! 可伸缩、写时复制的字节缓冲。
//!
//! # 模块定位（Why）
//! - 仿真中“一份报文发给多个接收者”极其常见；[`Buffer`] 让这些副本共享同一块
//!   [`Storage`]，直到某个副本需要改变布局时才真正分配私有内存。
//! - 逻辑数据区被划分为“头部 / 零压缩区 / 尾部”三段：零压缩区的字节读出恒为 0，
//!   但并不占用存储，适合承载仿真中大量的空负载。
//!
//! # 设计概要（How）
//! - `start..end` 是存储坐标下真实存放的字节（头部字节紧接尾部字节）；
//! - `zero_start` 是零压缩区在逻辑坐标下的起点，等于头部已存储字节数，`zero_len` 为其长度；
//! - 扩展按四级策略依次尝试：私有余量原地移动、共享但未被声明的余量原地移动、
//!   同一存储内 memmove、重新分配恰好容纳的存储；
//! - 复制（`Clone`）只增加引用计数，并把当前数据区登记进存储的写时复制窗口；
//!   片段（`make_fragment`）是同一存储上的视图，不登记窗口，写入对父缓冲可见。
//!
//! # 契约说明（What）
//! - `size() == 存储字节数 + zero_len`；
//! - 调整尺寸的操作失败时缓冲保持调用前状态；
//! - 迭代器借用缓冲本身，借用期间该缓冲无法被调整尺寸；共享同一存储的其它缓冲
//!   在迭代器存活期间调整尺寸会得到 [`PacketError::DataLocked`]。

mod iterator;
mod storage;

use alloc::{
    rc::{Rc, Weak},
    vec::Vec,
};
use core::{cell::Cell, fmt, ops::Range};

use bytes::Bytes;

pub use iterator::BufferIterator;
pub use storage::{DataLock, Storage};

use crate::{
    config::{CopyPolicy, GrowthPolicy},
    error::{PacketError, Result},
};

/// 显式构造缓冲时的布局描述。
///
/// `headroom`/`tailroom` 为预留余量（不计入 `size()`），`zero_size` 为零压缩区长度。
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BufferLayout {
    pub headroom: usize,
    pub zero_size: usize,
    pub tailroom: usize,
}

/// 扩展时实际采用的路径，仅用于日志。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum GrowthPath {
    /// 独占存储，余量足够，只移动边界。
    PrivateMargin,
    /// 共享存储，但该侧余量从未被任何共享者声明。
    FreeMargin,
    /// 独占存储，总容量足够但余量在另一侧，原地搬移数据。
    Shift,
    /// 分配新存储。
    Reallocate,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Side {
    Start,
    End,
}

/// 写时复制的字节缓冲。
///
/// # 教案式说明
/// - **意图 (Why)**：为报文头/尾的频繁增删提供 O(1) 的常见路径，同时保证共享副本之间互不可见。
/// - **契约 (What)**：
///   - 空缓冲不持有存储；只含零压缩区的缓冲同样不持有存储；
///   - 存储上不属于本缓冲私有的字节（写时复制窗口内、且存储被多方持有）不可写，
///     需要写入时先调用 [`Buffer::make_exclusive`]；
///   - 新扩展出的字节内容未定义，调用方应在读取前写入；
///   - 写时复制窗口按区间的外包络记录：先后登记两段不相交的区间后，两段之间未被共享的
///     空隙同样返回 `SharedWrite`，`make_exclusive` 之后即可写入。
/// - **执行逻辑 (How)**：见模块文档的四级扩展策略。
pub struct Buffer {
    storage: Option<Storage>,
    start: usize,
    end: usize,
    zero_start: usize,
    zero_len: usize,
    policy: GrowthPolicy,
    /// 交出过系留片段时存在，记录本缓冲当前所用存储的标识。
    home: Option<Rc<Cell<usize>>>,
    /// 系留片段指回所属缓冲的 `home`。
    tether: Option<Weak<Cell<usize>>>,
}

impl Buffer {
    /// 创建空缓冲。
    pub fn new() -> Self {
        Self::with_policy(GrowthPolicy::default())
    }

    /// 创建使用指定扩展策略的空缓冲。
    pub fn with_policy(policy: GrowthPolicy) -> Self {
        Self {
            storage: None,
            start: 0,
            end: 0,
            zero_start: 0,
            zero_len: 0,
            policy,
            home: None,
            tether: None,
        }
    }

    /// 创建 `size` 字节、全部位于零压缩区的缓冲，不分配存储。
    pub fn zeroed(size: usize) -> Self {
        Self::zeroed_with_policy(size, GrowthPolicy::default())
    }

    pub(crate) fn zeroed_with_policy(size: usize, policy: GrowthPolicy) -> Self {
        let mut buffer = Self::with_policy(policy);
        buffer.zero_len = size;
        buffer
    }

    /// 按显式布局创建缓冲：预留 `headroom + tailroom` 字节的存储，数据区仅含零压缩区。
    ///
    /// 两侧余量都为 0 时不分配存储。
    pub fn with_layout(layout: BufferLayout) -> Result<Self> {
        let mut buffer = Self::zeroed(layout.zero_size);
        let capacity = checked_sum(
            "Buffer::with_layout",
            &[layout.headroom, layout.tailroom],
        )?;
        if capacity > 0 {
            let storage = Storage::allocate(capacity)?;
            storage.set_dirty(layout.headroom, layout.headroom);
            buffer.storage = Some(storage);
            buffer.start = layout.headroom;
            buffer.end = layout.headroom;
        }
        Ok(buffer)
    }

    /// 复制 `bytes` 构造缓冲。
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        Self::from_slice_with_policy(bytes, GrowthPolicy::default())
    }

    pub(crate) fn from_slice_with_policy(bytes: &[u8], policy: GrowthPolicy) -> Result<Self> {
        let mut buffer = Self::with_policy(policy);
        if bytes.is_empty() {
            return Ok(buffer);
        }
        let capacity = buffer.capacity_for(bytes.len(), "Buffer::from_slice")?;
        let storage = Storage::allocate(capacity)?;
        let base = policy.headroom;
        storage.write(base, bytes);
        storage.set_dirty(base, base + bytes.len());
        buffer.storage = Some(storage);
        buffer.start = base;
        buffer.end = base + bytes.len();
        buffer.zero_start = bytes.len();
        Ok(buffer)
    }

    /// 逻辑字节数。
    pub fn size(&self) -> usize {
        self.stored_len() + self.zero_len
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// 底层存储容量；无存储时为 0。
    pub fn capacity(&self) -> usize {
        self.storage.as_ref().map_or(0, Storage::capacity)
    }

    pub fn storage(&self) -> Option<&Storage> {
        self.storage.as_ref()
    }

    /// 底层存储的引用计数；无存储时为 0。
    pub fn storage_ref_count(&self) -> usize {
        self.storage.as_ref().map_or(0, Storage::ref_count)
    }

    /// 零压缩区在逻辑坐标下的区间。
    pub fn zero_area(&self) -> Range<usize> {
        self.zero_start..self.zero_start + self.zero_len
    }

    pub fn policy(&self) -> GrowthPolicy {
        self.policy
    }

    /// 在数据区前端扩展 `len` 字节。
    ///
    /// # 契约说明（What）
    /// - **前置条件**：没有迭代器持有该存储的数据锁，否则返回 `DataLocked`；
    /// - **后置条件**：`size()` 增加 `len`，新字节位于 `[0, len)`，原有字节整体后移；
    ///   存储的脏区间覆盖新的数据区；
    /// - 失败时缓冲不变。
    pub fn add_at_start(&mut self, len: usize) -> Result<()> {
        self.grow(len, Side::Start, "Buffer::add_at_start")
    }

    /// 在数据区末端扩展 `len` 字节，语义与 [`add_at_start`](Self::add_at_start) 对称。
    pub fn add_at_end(&mut self, len: usize) -> Result<()> {
        self.grow(len, Side::End, "Buffer::add_at_end")
    }

    /// 从前端移除 `len` 字节；超过 `size()` 时缓冲变为空并释放存储。
    pub fn remove_at_start(&mut self, len: usize) -> Result<()> {
        self.shrink(len, Side::Start, "Buffer::remove_at_start")
    }

    /// 从末端移除 `len` 字节；超过 `size()` 时缓冲变为空并释放存储。
    pub fn remove_at_end(&mut self, len: usize) -> Result<()> {
        self.shrink(len, Side::End, "Buffer::remove_at_end")
    }

    /// 以 `policy` 深拷贝 `src` 的数据区到当前缓冲。
    ///
    /// # 契约说明（What）
    /// - 仅当当前存储独占且容量满足策略要求时复用，否则分配新存储；
    /// - 源缓冲保持不变；
    /// - 失败时当前缓冲被置空（基本异常安全）；数据锁存活时直接返回 `DataLocked` 且不改变当前缓冲。
    pub fn copy_from(&mut self, src: &Buffer, policy: CopyPolicy) -> Result<()> {
        if let Some(storage) = &self.storage {
            storage.ensure_unlocked("Buffer::copy_from")?;
        }
        let stored = src.stored_len();
        if stored == 0 {
            self.release();
            self.zero_len = src.zero_len;
            return Ok(());
        }

        let reuse_at = self.storage.as_ref().and_then(|storage| {
            if !storage.is_exclusive() {
                return None;
            }
            let capacity = storage.capacity();
            match policy {
                CopyPolicy::AccommodateData if capacity >= stored => {
                    Some(self.start.min(capacity - stored))
                }
                CopyPolicy::AccommodateSize if capacity >= src.capacity() => Some(src.start),
                _ => None,
            }
        });

        let (storage, base) = match (reuse_at, self.storage.take()) {
            (Some(base), Some(storage)) => (storage, base),
            _ => {
                let capacity = match policy {
                    CopyPolicy::AccommodateData => self.capacity_for(stored, "Buffer::copy_from"),
                    CopyPolicy::AccommodateSize => Ok(src.capacity()),
                };
                let allocated = capacity.and_then(Storage::allocate);
                match allocated {
                    Ok(storage) => {
                        let base = match policy {
                            CopyPolicy::AccommodateData => self.policy.headroom,
                            CopyPolicy::AccommodateSize => src.start,
                        };
                        (storage, base)
                    }
                    Err(err) => {
                        self.release();
                        return Err(err);
                    }
                }
            }
        };

        if let Some(src_storage) = &src.storage {
            src_storage.with_slice(src.start..src.end, |bytes| storage.write(base, bytes));
        }
        storage.reset_sharing(base, base + stored);
        self.storage = Some(storage);
        self.start = base;
        self.end = base + stored;
        self.zero_start = src.zero_start;
        self.zero_len = src.zero_len;
        self.sync_home();
        Ok(())
    }

    /// 返回数据区的深拷贝，与当前缓冲不共享存储。
    pub fn copy(&self) -> Result<Buffer> {
        let mut copy = Buffer::with_policy(self.policy);
        copy.copy_from(self, CopyPolicy::AccommodateData)?;
        tracing::trace!(size = self.size(), "buffer deep copied");
        Ok(copy)
    }

    /// 返回 `[offset, offset + len)` 的浅视图，与当前缓冲共享存储，O(1)。
    ///
    /// 越界时返回 `OutOfBounds`。
    pub fn make_fragment(&self, offset: usize, len: usize) -> Result<Buffer> {
        let size = self.size();
        let end = offset
            .checked_add(len)
            .filter(|end| *end <= size)
            .ok_or_else(|| PacketError::out_of_bounds("Buffer::make_fragment", offset, len, size))?;
        if len == 0 {
            return Ok(Buffer::with_policy(self.policy));
        }
        let mut fragment = self.view();
        fragment.trim_front(offset);
        fragment.trim_back(size - end);
        if fragment.stored_len() == 0 {
            fragment.storage = None;
            fragment.start = 0;
            fragment.end = 0;
            fragment.zero_start = 0;
        }
        Ok(fragment)
    }

    /// 与 [`make_fragment`](Self::make_fragment) 相同，但片段系留在当前缓冲上：
    /// 当前缓冲此后切换存储（重新分配、释放、物化）或被析构时，片段的写入返回
    /// `StaleFragment`，而不是落进无人再读的旧存储。
    pub(crate) fn tethered_fragment(&mut self, offset: usize, len: usize) -> Result<Buffer> {
        let mut fragment = self.make_fragment(offset, len)?;
        let id = storage_id(self.storage.as_ref());
        let home = self.home.get_or_insert_with(|| Rc::new(Cell::new(id)));
        home.set(id);
        fragment.tether = Some(Rc::downgrade(home));
        Ok(fragment)
    }

    /// 解除系留：缓冲被报文接管、自身成为数据的归属方时调用。
    pub(crate) fn untether(&mut self) {
        self.tether = None;
    }

    /// 返回零压缩区已物化为真实零字节的等价缓冲；本身无零压缩区时返回共享副本。
    pub fn make_real_buffer(&self) -> Result<Buffer> {
        if self.zero_len == 0 {
            return Ok(self.clone());
        }
        let size = self.size();
        let mut real = Buffer::with_policy(self.policy);
        let capacity = self.capacity_for(size, "Buffer::make_real_buffer")?;
        let storage = Storage::allocate(capacity)?;
        let base = self.policy.headroom;
        if let Some(source) = &self.storage {
            let split = self.start + self.zero_start;
            source.with_slice(self.start..split, |header| storage.write(base, header));
            source.with_slice(split..self.end, |trailer| {
                storage.write(base + self.zero_start + self.zero_len, trailer)
            });
        }
        storage.fill(base + self.zero_start, self.zero_len, 0);
        storage.set_dirty(base, base + size);
        real.storage = Some(storage);
        real.start = base;
        real.end = base + size;
        real.zero_start = size;
        tracing::debug!(size, zero = self.zero_len, "zero area realized");
        Ok(real)
    }

    /// 就地物化零压缩区，`size()` 不变。
    pub fn realize(&mut self) -> Result<()> {
        if self.zero_len == 0 {
            return Ok(());
        }
        if let Some(storage) = &self.storage {
            storage.ensure_unlocked("Buffer::realize")?;
        }
        let real = self.make_real_buffer()?;
        self.storage = real.storage;
        self.start = real.start;
        self.end = real.end;
        self.zero_start = real.zero_start;
        self.zero_len = real.zero_len;
        self.sync_home();
        Ok(())
    }

    /// 若存储被多个缓冲共享，则重新分配私有存储；之后数据区内任意字节均可写入。
    pub fn make_exclusive(&mut self) -> Result<()> {
        let Some(storage) = &self.storage else {
            return Ok(());
        };
        if storage.is_exclusive() {
            return Ok(());
        }
        storage.ensure_unlocked("Buffer::make_exclusive")?;
        self.reallocate(0, 0)
    }

    /// 数据区起点的迭代器。
    pub fn begin(&self) -> BufferIterator<'_> {
        BufferIterator::new(self, 0)
    }

    /// 数据区终点的迭代器。
    pub fn end(&self) -> BufferIterator<'_> {
        BufferIterator::new(self, self.size())
    }

    /// 将逻辑字节复制到 `dst`，返回复制的字节数。
    pub fn copy_data(&self, dst: &mut [u8]) -> usize {
        let len = dst.len().min(self.size());
        self.read_at(0, &mut dst[..len]);
        len
    }

    /// 扁平化为 `Vec<u8>`，零压缩区以 0 填充。
    pub fn to_vec(&self) -> Vec<u8> {
        let mut out = alloc::vec![0u8; self.size()];
        self.read_at(0, &mut out);
        out
    }

    /// 生成 `Bytes` 快照。
    pub fn to_bytes(&self) -> Bytes {
        Bytes::from(self.to_vec())
    }

    pub(crate) fn stored_len(&self) -> usize {
        self.end - self.start
    }

    /// 将当前数据区登记进存储的写时复制窗口。
    pub(crate) fn protect_data(&self) {
        if let Some(storage) = &self.storage {
            storage.protect(self.start, self.end);
        }
    }

    /// 同一存储上的视图，不登记写时复制窗口。
    pub(crate) fn view(&self) -> Buffer {
        Buffer {
            storage: self.storage.clone(),
            start: self.start,
            end: self.end,
            zero_start: self.zero_start,
            zero_len: self.zero_len,
            policy: self.policy,
            home: None,
            tether: self.tether.clone(),
        }
    }

    /// 读取逻辑区间 `[pos, pos + dst.len())`，调用方保证不越界。
    pub(crate) fn read_at(&self, pos: usize, dst: &mut [u8]) {
        let mut pos = pos;
        let mut written = 0;
        let zero_end = self.zero_start + self.zero_len;
        while written < dst.len() {
            let remaining = dst.len() - written;
            let out = &mut dst[written..];
            let chunk = if pos < self.zero_start {
                let chunk = remaining.min(self.zero_start - pos);
                self.read_stored(self.start + pos, &mut out[..chunk]);
                chunk
            } else if pos < zero_end {
                let chunk = remaining.min(zero_end - pos);
                out[..chunk].fill(0);
                chunk
            } else {
                self.read_stored(self.start + pos - self.zero_len, &mut out[..remaining]);
                remaining
            };
            pos += chunk;
            written += chunk;
        }
    }

    fn read_stored(&self, offset: usize, dst: &mut [u8]) {
        if let Some(storage) = &self.storage {
            storage.read(offset, dst);
        }
    }

    /// 将逻辑位置映射到存储偏移，并校验写入许可。
    fn writable_offset(&self, pos: usize, len: usize) -> Result<Option<(&Storage, usize)>> {
        if len == 0 {
            return Ok(None);
        }
        let zero_end = self.zero_start + self.zero_len;
        if self.zero_len > 0 && pos < zero_end && pos + len > self.zero_start {
            return Err(PacketError::ZeroAreaWrite { offset: pos, len });
        }
        let offset = if pos < self.zero_start {
            self.start + pos
        } else {
            self.start + pos - self.zero_len
        };
        if let Some(tether) = &self.tether {
            let home = tether.upgrade().map(|home| home.get());
            if home != Some(storage_id(self.storage.as_ref())) {
                return Err(PacketError::StaleFragment { offset: pos, len });
            }
        }
        let Some(storage) = &self.storage else {
            return Err(PacketError::out_of_bounds("Buffer::write", pos, len, self.size()));
        };
        if !storage.is_exclusive() && storage.is_protected(offset, offset + len) {
            return Err(PacketError::SharedWrite { offset: pos, len });
        }
        Ok(Some((storage, offset)))
    }

    /// 写入逻辑区间，调用方保证不越界；零压缩区或共享字节返回错误且不写入任何字节。
    pub(crate) fn write_at(&self, pos: usize, src: &[u8]) -> Result<()> {
        if let Some((storage, offset)) = self.writable_offset(pos, src.len())? {
            storage.write(offset, src);
        }
        Ok(())
    }

    pub(crate) fn fill_at(&self, pos: usize, len: usize, value: u8) -> Result<()> {
        if let Some((storage, offset)) = self.writable_offset(pos, len)? {
            storage.fill(offset, len, value);
        }
        Ok(())
    }

    fn capacity_for(&self, data: usize, op: &'static str) -> Result<usize> {
        self.policy
            .slack()
            .and_then(|slack| data.checked_add(slack))
            .ok_or_else(|| PacketError::invalid(op, "size overflows usize"))
    }

    fn grow(&mut self, len: usize, side: Side, op: &'static str) -> Result<()> {
        if len == 0 {
            return Ok(());
        }
        checked_sum(op, &[self.size(), len])?;
        if let Some(storage) = &self.storage {
            storage.ensure_unlocked(op)?;
        }
        let path = self.plan_growth(len, side);
        match path {
            GrowthPath::PrivateMargin | GrowthPath::FreeMargin => {
                match side {
                    Side::Start => self.start -= len,
                    Side::End => self.end += len,
                }
                if let Some(storage) = &self.storage {
                    if path == GrowthPath::PrivateMargin {
                        storage.reset_sharing(self.start, self.end);
                    } else {
                        storage.claim(self.start, self.end);
                    }
                }
            }
            GrowthPath::Shift => self.shift(len, side),
            GrowthPath::Reallocate => match side {
                Side::Start => self.reallocate(len, 0)?,
                Side::End => self.reallocate(0, len)?,
            },
        }
        if side == Side::Start {
            self.zero_start += len;
        }
        tracing::trace!(?path, ?side, requested = len, size = self.size(), "buffer grown");
        Ok(())
    }

    fn plan_growth(&self, len: usize, side: Side) -> GrowthPath {
        let Some(storage) = &self.storage else {
            return GrowthPath::Reallocate;
        };
        let exclusive = storage.is_exclusive();
        let capacity = storage.capacity();
        let dirty = storage.dirty_range();
        let (margin, untouched) = match side {
            Side::Start => (self.start, self.start == dirty.start),
            Side::End => (capacity - self.end, self.end == dirty.end),
        };
        if margin >= len {
            if exclusive {
                return GrowthPath::PrivateMargin;
            }
            if untouched {
                return GrowthPath::FreeMargin;
            }
        }
        if exclusive && capacity - self.stored_len() >= len {
            return GrowthPath::Shift;
        }
        GrowthPath::Reallocate
    }

    /// 在独占存储内搬移数据，为 `side` 一侧腾出 `len` 字节，剩余空闲量平分到两侧。
    fn shift(&mut self, len: usize, side: Side) {
        let Some(storage) = &self.storage else {
            return;
        };
        let stored = self.stored_len();
        let slack = storage.capacity() - stored - len;
        let new_start = slack / 2;
        let data_at = match side {
            Side::Start => new_start + len,
            Side::End => new_start,
        };
        storage.copy_within(self.start..self.end, data_at);
        self.start = new_start;
        self.end = new_start + stored + len;
        storage.reset_sharing(self.start, self.end);
        tracing::debug!(
            moved = stored,
            capacity = storage.capacity(),
            "buffer data shifted in place"
        );
    }

    /// 分配恰好容纳 `front + 已存储字节 + back`（外加策略余量）的新存储并切换过去。
    ///
    /// 分配成功之前不修改任何字段。
    fn reallocate(&mut self, front: usize, back: usize) -> Result<()> {
        let stored = self.stored_len();
        let data = checked_sum("Buffer::reallocate", &[front, stored, back])?;
        let capacity = self.capacity_for(data, "Buffer::reallocate")?;
        let storage = Storage::allocate(capacity)?;
        let base = self.policy.headroom;
        if let Some(old) = &self.storage {
            old.with_slice(self.start..self.end, |bytes| storage.write(base + front, bytes));
        }
        storage.set_dirty(base, base + data);
        tracing::debug!(capacity, moved = stored, "buffer reallocated");
        self.storage = Some(storage);
        self.start = base;
        self.end = base + data;
        self.sync_home();
        Ok(())
    }

    fn shrink(&mut self, len: usize, side: Side, op: &'static str) -> Result<()> {
        if len == 0 {
            return Ok(());
        }
        if let Some(storage) = &self.storage {
            storage.ensure_unlocked(op)?;
        }
        if len >= self.size() {
            self.release();
            return Ok(());
        }
        match side {
            Side::Start => self.trim_front(len),
            Side::End => self.trim_back(len),
        }
        Ok(())
    }

    /// 从前端裁掉 `len` 字节，调用方保证 `len <= size()`。
    fn trim_front(&mut self, len: usize) {
        let header = self.zero_start;
        if len <= header {
            self.start += len;
            self.zero_start -= len;
            return;
        }
        self.start += header;
        self.zero_start = 0;
        let rest = len - header;
        if rest <= self.zero_len {
            self.zero_len -= rest;
            return;
        }
        self.start += rest - self.zero_len;
        self.zero_len = 0;
    }

    /// 从末端裁掉 `len` 字节，调用方保证 `len <= size()`。
    fn trim_back(&mut self, len: usize) {
        let trailer = self.stored_len() - self.zero_start;
        if len <= trailer {
            self.end -= len;
            return;
        }
        self.end -= trailer;
        let rest = len - trailer;
        if rest <= self.zero_len {
            self.zero_len -= rest;
            return;
        }
        let rest = rest - self.zero_len;
        self.zero_len = 0;
        self.end -= rest;
        self.zero_start -= rest;
    }

    /// 释放存储并清空。
    fn release(&mut self) {
        self.storage = None;
        self.start = 0;
        self.end = 0;
        self.zero_start = 0;
        self.zero_len = 0;
        self.sync_home();
    }

    /// 存储切换后刷新 `home`，此前交出的系留片段随即失效。
    fn sync_home(&self) {
        if let Some(home) = &self.home {
            home.set(storage_id(self.storage.as_ref()));
        }
    }
}

fn storage_id(storage: Option<&Storage>) -> usize {
    storage.map_or(0, Storage::id)
}

fn checked_sum(op: &'static str, parts: &[usize]) -> Result<usize> {
    parts
        .iter()
        .try_fold(0usize, |acc, part| acc.checked_add(*part))
        .ok_or_else(|| PacketError::invalid(op, "size overflows usize"))
}

impl Default for Buffer {
    fn default() -> Self {
        Self::new()
    }
}

/// 写时复制：共享存储并把当前数据区登记进写时复制窗口。
impl Clone for Buffer {
    fn clone(&self) -> Self {
        self.protect_data();
        self.view()
    }
}

impl PartialEq for Buffer {
    fn eq(&self, other: &Self) -> bool {
        self.size() == other.size() && self.to_vec() == other.to_vec()
    }
}

impl Eq for Buffer {}

impl fmt::Debug for Buffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Buffer")
            .field("size", &self.size())
            .field("stored", &(self.start..self.end))
            .field("zero_area", &self.zero_area())
            .field("storage", &self.storage)
            .finish()
    }
}
