use alloc::{rc::Rc, vec::Vec};
use core::{
    fmt,
    ops::Range,
    sync::atomic::{AtomicU64, Ordering},
};

use super::TagId;
use crate::error::{PacketError, Result};

/// 标签序号生成器；同一次 `insert` 产生的标签在分片与重组中保持同一序号，重组据此识别同一标签。
static NEXT_SERIAL: AtomicU64 = AtomicU64::new(1);

#[derive(Clone)]
struct TagEntry<P> {
    id: TagId,
    serial: u64,
    /// 标签插入时的起点；分片与重组只平移、不裁剪它，同一标签的各段据此判断是否首尾衔接。
    base: i128,
    start: i128,
    end: i128,
    payload: P,
}

impl<P> TagEntry<P> {
    /// `other` 是否与本条目出自同一次插入、摆放位置一致，且区间相交或相邻。
    fn joins(&self, other: &TagEntry<P>) -> bool {
        self.id == other.id
            && self.serial == other.serial
            && self.base == other.base
            && self.start <= other.end
            && other.start <= self.end
    }
}

/// 迭代时暴露的标签视图，`range` 为裁剪到当前数据区后的区间。
#[derive(Debug)]
pub struct TagSpan<'a, P> {
    pub id: TagId,
    pub range: Range<usize>,
    pub payload: &'a P,
}

/// 有序的（区间，载荷）关联表。
///
/// # 教案式说明
/// - **意图 (Why)**：报文头尾的增删不应触碰每一个标签；标签表只维护一个坐标原点，
///   条目只在裁剪与重组时调整区间。
/// - **执行逻辑 (How)**：
///   - 条目区间保存在表内部坐标系中，数据区起点在该坐标系下为 `origin`，长度为 `size`；
///   - `add_at_start(n)` 让 `origin` 左移 `n`，既有条目随之在数据区坐标下右移；
///   - `remove_at_*` 平移原点或缩短长度后，丢弃完全落在数据区之外的条目；部分存活的条目
///     保留原始区间，查询时按新原点解释；
///   - 数据区再次扩展前，越界条目先被裁剪到旧数据区，新字节上不会出现旧标签；
///   - 条目向量由 `Rc` 共享，复制表是 O(1)，首次修改集合时才克隆。
/// - **契约 (What)**：
///   - 查询偏移以当前数据区为基准；
///   - 多个同 id 标签覆盖同一偏移时返回最近插入的那个。
pub struct TagList<P> {
    entries: Rc<Vec<TagEntry<P>>>,
    origin: i128,
    size: usize,
}

impl<P> TagList<P> {
    /// 创建跟踪空数据区的标签表。
    pub fn new() -> Self {
        Self::with_size(0)
    }

    /// 创建跟踪 `size` 字节数据区的标签表。
    pub fn with_size(size: usize) -> Self {
        Self {
            entries: Rc::new(Vec::new()),
            origin: 0,
            size,
        }
    }

    /// 所跟踪数据区的长度。
    pub fn size(&self) -> usize {
        self.size
    }

    /// 标签条目数。
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 是否存在覆盖 `offset` 的 `id` 标签。
    pub fn exists(&self, id: TagId, offset: usize) -> bool {
        self.find(id, offset).is_some()
    }

    /// 返回覆盖 `offset` 的 `id` 标签载荷，未命中时返回 `TagNotFound`。
    pub fn get(&self, id: TagId, offset: usize) -> Result<&P> {
        self.find(id, offset)
            .map(|entry| &entry.payload)
            .ok_or(PacketError::TagNotFound { id, offset })
    }

    /// 按插入顺序遍历标签。
    pub fn iter(&self) -> impl Iterator<Item = TagSpan<'_, P>> + '_ {
        let lo = self.origin;
        let hi = self.origin + self.size as i128;
        self.entries.iter().map(move |entry| {
            let start = (entry.start.max(lo) - lo) as usize;
            let end = (entry.end.min(hi) - lo) as usize;
            TagSpan {
                id: entry.id,
                range: start..end,
                payload: &entry.payload,
            }
        })
    }

    /// 丢弃全部标签，数据区长度不变。
    pub fn remove_all(&mut self) {
        self.entries = Rc::new(Vec::new());
    }

    fn find(&self, id: TagId, offset: usize) -> Option<&TagEntry<P>> {
        if offset >= self.size {
            return None;
        }
        let at = self.origin + offset as i128;
        self.entries
            .iter()
            .rev()
            .find(|entry| entry.id == id && entry.start <= at && at < entry.end)
    }
}

impl<P: Clone> TagList<P> {
    /// 跟踪数据区前端扩展 `len` 字节；新区间上没有标签。
    pub fn add_at_start(&mut self, len: usize) {
        if len == 0 {
            return;
        }
        self.clip();
        self.origin -= len as i128;
        self.size = self.size.saturating_add(len);
    }

    /// 跟踪数据区末端扩展 `len` 字节；新区间上没有标签。
    pub fn add_at_end(&mut self, len: usize) {
        if len == 0 {
            return;
        }
        self.clip();
        self.size = self.size.saturating_add(len);
    }

    /// 在数据区 `[offset, offset + len)` 上插入标签。
    ///
    /// `len == 0` 返回 `InvalidArgument`，区间越出数据区返回 `OutOfBounds`。
    pub fn insert(&mut self, id: TagId, payload: P, offset: usize, len: usize) -> Result<()> {
        if len == 0 {
            return Err(PacketError::invalid("TagList::insert", "empty tag range"));
        }
        offset
            .checked_add(len)
            .filter(|end| *end <= self.size)
            .ok_or_else(|| PacketError::out_of_bounds("TagList::insert", offset, len, self.size))?;
        let start = self.origin + offset as i128;
        Rc::make_mut(&mut self.entries).push(TagEntry {
            id,
            serial: NEXT_SERIAL.fetch_add(1, Ordering::Relaxed),
            base: start,
            start,
            end: start + len as i128,
            payload,
        });
        Ok(())
    }

    /// 跟踪数据区前端移除 `len` 字节（超过长度时截断为空）。
    pub fn remove_at_start(&mut self, len: usize) {
        let len = len.min(self.size);
        self.origin += len as i128;
        self.size -= len;
        self.prune();
    }

    /// 跟踪数据区末端移除 `len` 字节（超过长度时截断为空）。
    pub fn remove_at_end(&mut self, len: usize) {
        self.size -= len.min(self.size);
        self.prune();
    }

    /// 保留 `[offset, offset + len)` 窗口内的标签，返回新表。
    pub fn fragment(&self, offset: usize, len: usize) -> Self {
        let mut fragment = self.clone();
        fragment.remove_at_start(offset);
        let tail = fragment.size.saturating_sub(len);
        fragment.remove_at_end(tail);
        fragment
    }

    /// 将 `other` 所跟踪的数据区拼接在末尾，并合并其标签。
    pub fn append(&mut self, other: &TagList<P>) {
        self.clip();
        let shift = self.origin + self.size as i128 - other.origin;
        self.merge(other, shift);
        self.size = self.size.saturating_add(other.size);
    }

    /// 将 `other` 所跟踪的数据区拼接在前端，并合并其标签。
    pub fn prepend(&mut self, other: &TagList<P>) {
        self.add_at_start(other.size);
        let shift = self.origin - other.origin;
        self.merge(other, shift);
    }

    /// 不与当前表共享条目向量的副本。
    pub fn detached(&self) -> Self {
        Self {
            entries: Rc::new(self.entries.as_ref().clone()),
            origin: self.origin,
            size: self.size,
        }
    }

    /// 合并 `other` 的条目，条目先裁剪到 `other` 的数据区再平移 `shift`。
    ///
    /// 同一次插入的标签被分片后，各段的 `base` 平移量相同；与既有条目同 id、同序号、
    /// 同 `base` 且区间相交或相邻的条目合并为一段（完全相同的条目因此不会重复）。
    /// 同一分片的两份拷贝前后拼接时 `base` 不同，仍是两个标签。
    fn merge(&mut self, other: &TagList<P>, shift: i128) {
        if other.entries.is_empty() {
            return;
        }
        let lo = other.origin;
        let hi = other.origin + other.size as i128;
        let entries = Rc::make_mut(&mut self.entries);
        for incoming in other.entries.iter() {
            let placed = TagEntry {
                base: incoming.base + shift,
                start: incoming.start.max(lo) + shift,
                end: incoming.end.min(hi) + shift,
                ..incoming.clone()
            };
            match entries.iter_mut().find(|existing| existing.joins(&placed)) {
                Some(existing) => {
                    existing.start = existing.start.min(placed.start);
                    existing.end = existing.end.max(placed.end);
                }
                None => entries.push(placed),
            }
        }
    }

    /// 将越出当前数据区的条目裁剪到数据区内，保证随后扩展出的字节上没有旧标签。
    fn clip(&mut self) {
        let lo = self.origin;
        let hi = self.origin + self.size as i128;
        if !self.entries.iter().any(|entry| entry.start < lo || entry.end > hi) {
            return;
        }
        for entry in Rc::make_mut(&mut self.entries).iter_mut() {
            entry.start = entry.start.max(lo);
            entry.end = entry.end.min(hi);
        }
    }

    fn prune(&mut self) {
        let lo = self.origin;
        let hi = self.origin + self.size as i128;
        let outside = |entry: &TagEntry<P>| self.size == 0 || entry.end <= lo || entry.start >= hi;
        if !self.entries.iter().any(outside) {
            return;
        }
        let kept: Vec<TagEntry<P>> = self
            .entries
            .iter()
            .filter(|entry| !outside(*entry))
            .cloned()
            .collect();
        self.entries = Rc::new(kept);
    }
}

impl<P> Default for TagList<P> {
    fn default() -> Self {
        Self::new()
    }
}

/// 与缓冲一致的写时复制语义：只复制条目向量的引用。
impl<P> Clone for TagList<P> {
    fn clone(&self) -> Self {
        Self {
            entries: Rc::clone(&self.entries),
            origin: self.origin,
            size: self.size,
        }
    }
}

impl<P> fmt::Debug for TagList<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TagList")
            .field("size", &self.size)
            .field("tags", &self.entries.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MARK: TagId = TagId::new(1);

    #[test]
    fn growth_shifts_existing_tags() {
        let mut list = TagList::with_size(10);
        list.insert(MARK, "payload", 2, 3).expect("插入");
        list.add_at_start(4);
        assert!(!list.exists(MARK, 2));
        assert!(list.exists(MARK, 6));
        assert_eq!(list.get(MARK, 8).copied(), Ok("payload"));
        assert!(matches!(
            list.get(MARK, 9),
            Err(PacketError::TagNotFound { offset: 9, .. })
        ));
    }

    #[test]
    fn partially_trimmed_tag_keeps_original_extent() {
        let mut list = TagList::with_size(10);
        list.insert(MARK, 7u8, 0, 6).expect("插入");
        list.remove_at_start(4);
        assert_eq!(list.len(), 1);
        assert!(list.exists(MARK, 0));
        assert!(list.exists(MARK, 1));
        assert!(!list.exists(MARK, 2));
        let spans: Vec<_> = list.iter().map(|span| span.range).collect();
        assert_eq!(spans, [0..2]);
        list.remove_at_start(2);
        assert!(list.is_empty());
    }

    #[test]
    fn shared_lists_do_not_observe_each_others_pruning() {
        let mut list = TagList::with_size(8);
        list.insert(MARK, 1u8, 6, 2).expect("插入");
        let snapshot = list.clone();
        list.remove_at_end(4);
        assert!(list.is_empty());
        assert_eq!(snapshot.len(), 1);
        assert!(snapshot.exists(MARK, 7));
    }

    #[test]
    fn reassembling_fragments_merges_split_tag() {
        let mut list = TagList::with_size(10);
        list.insert(MARK, 'x', 3, 4).expect("插入");
        let mut head = list.fragment(0, 5);
        let tail = list.fragment(5, 5);
        assert_eq!(head.len(), 1);
        assert_eq!(tail.len(), 1);
        head.append(&tail);
        assert_eq!(head.size(), 10);
        assert_eq!(head.len(), 1, "同一标签的两段应合并");
        assert!(head.exists(MARK, 3));
        assert!(head.exists(MARK, 6));
        assert!(!head.exists(MARK, 7));
    }

    #[test]
    fn prepend_places_other_tags_first() {
        let mut body = TagList::with_size(4);
        body.insert(MARK, 'b', 0, 4).expect("插入");
        let mut header = TagList::with_size(2);
        header.insert(TagId::new(2), 'h', 0, 2).expect("插入");
        body.prepend(&header);
        assert_eq!(body.size(), 6);
        assert!(body.exists(TagId::new(2), 1));
        assert!(!body.exists(MARK, 1));
        assert_eq!(body.get(MARK, 2).copied(), Ok('b'));
    }

    #[test]
    fn regrown_bytes_are_not_covered_by_trimmed_tag() {
        let mut list = TagList::with_size(6);
        list.insert(MARK, (), 0, 4).expect("插入");
        list.remove_at_start(2);
        list.add_at_start(2);
        assert!(!list.exists(MARK, 1));
        assert!(list.exists(MARK, 2));
        assert!(list.exists(MARK, 3));
    }

    #[test]
    fn foreign_tags_do_not_spill_onto_receiver() {
        let mut source = TagList::with_size(8);
        source.insert(MARK, 'f', 0, 8).expect("插入");
        let tail = source.fragment(4, 4);
        let mut receiver = TagList::with_size(4);
        receiver.append(&tail);
        assert!(!receiver.exists(MARK, 3));
        assert!(receiver.exists(MARK, 4));
    }

    #[test]
    fn regions_beyond_i64_keep_live_tags() {
        let mut list = TagList::with_size(usize::MAX);
        list.insert(MARK, 'x', 0, 10).expect("插入");
        list.remove_at_end(1);
        assert_eq!(list.len(), 1);
        assert!(list.exists(MARK, 0));
        list.remove_at_start(5);
        let spans: Vec<_> = list.iter().map(|span| span.range).collect();
        assert_eq!(spans, [0..5]);
    }

    #[test]
    fn duplicated_fragment_keeps_two_tags() {
        let mut list = TagList::with_size(4);
        list.insert(MARK, 'd', 0, 4).expect("插入");
        let piece = list.fragment(0, 4);
        let mut doubled = piece.clone();
        doubled.append(&piece);
        assert_eq!(doubled.size(), 8);
        assert_eq!(doubled.len(), 2);
        assert!(doubled.exists(MARK, 3));
        assert!(doubled.exists(MARK, 4));
    }

    #[test]
    fn insert_validates_range() {
        let mut list: TagList<u8> = TagList::with_size(4);
        assert!(list.insert(MARK, 0, 3, 2).is_err());
        assert!(list.insert(MARK, 0, 1, 0).is_err());
        assert!(list.is_empty());
    }
}
