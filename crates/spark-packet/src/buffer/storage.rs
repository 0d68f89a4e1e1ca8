//! 引用计数的底层字节存储。
//!
//! # 模块定位（Why）
//! - 任何 `Buffer` 或迭代器都不直接拥有内存，而是持有一个 [`Storage`] 句柄；
//!   句柄克隆即增加引用计数，析构即释放，最后一个持有者离开时内存归还分配器。
//! - 存储上记录两类簿记：
//!   - **脏区间**（`dirty_start..dirty_end`）：曾被任一共享者声明为数据的字节并集，
//!     共享状态下的原地扩展只能进入脏区间之外的空闲余量；
//!   - **写时复制窗口**：缓冲被复制那一刻双方共同可见的字节，共享期间任何一方都不得写入。
//! - 迭代器存活期间持有 [`DataLock`]，布局调整操作据此拒绝移动内存。
//!
//! # 契约说明（What）
//! - `ref_count() >= 1` 恒成立；引用计数归零时存储被销毁；
//! - 释放句柄时剩余引用数不得低于数据锁数量，否则说明有迭代器即将访问已释放内存，直接断言失败。

use alloc::{boxed::Box, rc::Rc, vec::Vec};
use core::{
    cell::{Cell, RefCell},
    fmt,
    ops::Range,
};

use crate::error::{PacketError, Result};

struct StorageCell {
    bytes: RefCell<Box<[u8]>>,
    dirty_start: Cell<usize>,
    dirty_end: Cell<usize>,
    cow_window: Cell<Option<(usize, usize)>>,
    locks: Cell<usize>,
}

/// 单线程引用计数的字节存储句柄。
pub struct Storage {
    inner: Rc<StorageCell>,
}

impl Storage {
    /// 分配 `size` 字节的新存储，内容初始化为 0。
    ///
    /// # 契约说明（What）
    /// - `size == 0` 返回 `InvalidArgument`；
    /// - 分配器拒绝时返回 `Allocation`，不会中止进程；
    /// - 新存储的脏区间为空，由调用方随后声明。
    pub fn allocate(size: usize) -> Result<Self> {
        if size == 0 {
            return Err(PacketError::invalid(
                "Storage::allocate",
                "zero-sized storage request",
            ));
        }
        let mut bytes = Vec::new();
        bytes
            .try_reserve_exact(size)
            .map_err(|_| PacketError::Allocation { requested: size })?;
        bytes.resize(size, 0);
        tracing::trace!(capacity = size, "storage allocated");
        Ok(Self {
            inner: Rc::new(StorageCell {
                bytes: RefCell::new(bytes.into_boxed_slice()),
                dirty_start: Cell::new(0),
                dirty_end: Cell::new(0),
                cow_window: Cell::new(None),
                locks: Cell::new(0),
            }),
        })
    }

    /// 分配的字节数。
    pub fn capacity(&self) -> usize {
        self.inner.bytes.borrow().len()
    }

    /// 当前持有该存储的句柄数量（缓冲、片段与迭代器）。
    pub fn ref_count(&self) -> usize {
        Rc::strong_count(&self.inner)
    }

    /// 持有该存储的缓冲与片段数量，不计迭代器数据锁附带的引用。
    pub fn owner_count(&self) -> usize {
        self.ref_count().saturating_sub(self.lock_count())
    }

    /// 是否只有一个缓冲持有该存储。
    pub fn is_exclusive(&self) -> bool {
        self.owner_count() == 1
    }

    pub fn dirty_range(&self) -> Range<usize> {
        self.inner.dirty_start.get()..self.inner.dirty_end.get()
    }

    /// 未释放的数据锁数量。
    pub fn lock_count(&self) -> usize {
        self.inner.locks.get()
    }

    pub fn is_data_locked(&self) -> bool {
        self.lock_count() > 0
    }

    /// 两个句柄是否指向同一块存储。
    pub fn same_as(&self, other: &Storage) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// 存储的身份标识，存储存活期间不与其它存储重复。
    pub(crate) fn id(&self) -> usize {
        Rc::as_ptr(&self.inner).addr()
    }

    /// 数据锁存活时拒绝布局调整。
    pub(crate) fn ensure_unlocked(&self, op: &'static str) -> Result<()> {
        match self.lock_count() {
            0 => Ok(()),
            locks => Err(PacketError::DataLocked { op, locks }),
        }
    }

    /// 重置脏区间为 `[start, end)`。
    pub(crate) fn set_dirty(&self, start: usize, end: usize) {
        self.inner.dirty_start.set(start);
        self.inner.dirty_end.set(end);
    }

    /// 独占持有者重置簿记：脏区间收敛为 `[start, end)`，写时复制窗口清空。
    pub(crate) fn reset_sharing(&self, start: usize, end: usize) {
        self.set_dirty(start, end);
        self.inner.cow_window.set(None);
    }

    /// 将 `[start, end)` 并入脏区间。
    pub(crate) fn claim(&self, start: usize, end: usize) {
        let cell = &self.inner;
        if cell.dirty_start.get() == cell.dirty_end.get() {
            self.set_dirty(start, end);
            return;
        }
        cell.dirty_start.set(cell.dirty_start.get().min(start));
        cell.dirty_end.set(cell.dirty_end.get().max(end));
    }

    /// 将 `[start, end)` 并入写时复制窗口。
    ///
    /// 窗口只保存外包络：两段不相交的区间之间的空隙也被视为受保护。
    pub(crate) fn protect(&self, start: usize, end: usize) {
        if start >= end {
            return;
        }
        let merged = match self.inner.cow_window.get() {
            None => (start, end),
            Some((s, e)) => (s.min(start), e.max(end)),
        };
        self.inner.cow_window.set(Some(merged));
    }

    /// `[start, end)` 是否与写时复制窗口相交。
    pub(crate) fn is_protected(&self, start: usize, end: usize) -> bool {
        match self.inner.cow_window.get() {
            Some((s, e)) => start < e && s < end,
            None => false,
        }
    }

    pub(crate) fn read(&self, offset: usize, dst: &mut [u8]) {
        let bytes = self.inner.bytes.borrow();
        dst.copy_from_slice(&bytes[offset..offset + dst.len()]);
    }

    pub(crate) fn write(&self, offset: usize, src: &[u8]) {
        let mut bytes = self.inner.bytes.borrow_mut();
        bytes[offset..offset + src.len()].copy_from_slice(src);
    }

    pub(crate) fn fill(&self, offset: usize, len: usize, value: u8) {
        let mut bytes = self.inner.bytes.borrow_mut();
        bytes[offset..offset + len].fill(value);
    }

    /// 存储内部的 memmove。
    pub(crate) fn copy_within(&self, src: Range<usize>, dst: usize) {
        self.inner.bytes.borrow_mut().copy_within(src, dst);
    }

    /// 以只读切片访问 `range`，闭包内不得再访问同一存储的可变接口。
    pub(crate) fn with_slice<R>(&self, range: Range<usize>, f: impl FnOnce(&[u8]) -> R) -> R {
        let bytes = self.inner.bytes.borrow();
        f(&bytes[range])
    }

    fn add_lock(&self) {
        self.inner.locks.set(self.inner.locks.get() + 1);
    }

    fn release_lock(&self) {
        let locks = self.inner.locks.get();
        debug_assert!(locks > 0, "data lock released twice");
        self.inner.locks.set(locks.saturating_sub(1));
    }
}

impl Clone for Storage {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl Drop for Storage {
    fn drop(&mut self) {
        let remaining = Rc::strong_count(&self.inner) - 1;
        let locks = self.inner.locks.get();
        assert!(
            remaining >= locks,
            "storage released while {locks} data lock(s) outstanding with {remaining} reference(s) left"
        );
    }
}

impl fmt::Debug for Storage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Storage")
            .field("capacity", &self.capacity())
            .field("ref_count", &self.ref_count())
            .field("dirty", &self.dirty_range())
            .field("locks", &self.lock_count())
            .finish()
    }
}

/// 迭代器持有的数据锁。
///
/// 锁本身也持有一份存储引用，因此只要锁存活，存储的引用数就不会低于锁数量。
#[derive(Debug)]
pub struct DataLock {
    storage: Storage,
}

impl DataLock {
    pub(crate) fn acquire(storage: &Storage) -> Self {
        storage.add_lock();
        Self {
            storage: storage.clone(),
        }
    }

    pub(crate) fn storage(&self) -> &Storage {
        &self.storage
    }
}

impl Drop for DataLock {
    fn drop(&mut self) {
        self.storage.release_lock();
    }
}
