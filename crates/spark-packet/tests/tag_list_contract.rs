//! `tag_list_contract` 集成测试：标签在头尾增删、分片与重组中的存活规则。

use spark_packet::{ErrorClass, TagId, TagList};

const A: TagId = TagId::new(10);
const B: TagId = TagId::new(11);

#[test]
fn lookup_prefers_most_recent_overlapping_tag() {
    let mut list = TagList::with_size(8);
    list.insert(A, "old", 0, 8).expect("插入");
    list.insert(A, "new", 4, 2).expect("插入");
    assert_eq!(list.get(A, 3).copied(), Ok("old"));
    assert_eq!(list.get(A, 4).copied(), Ok("new"));
    assert_eq!(list.get(A, 6).copied(), Ok("old"));
    assert_eq!(list.get(B, 4).unwrap_err().class(), ErrorClass::TagNotFound);
}

/// 扩展出的区间上没有标签，既有标签随数据平移。
#[test]
fn growth_on_both_sides_tracks_tags() {
    let mut list = TagList::with_size(4);
    list.insert(A, 1u8, 0, 4).expect("插入");
    list.add_at_start(3);
    list.add_at_end(2);
    assert_eq!(list.size(), 9);
    let spans: Vec<_> = list.iter().map(|span| span.range).collect();
    assert_eq!(spans, [3..7]);
    assert!(!list.exists(A, 2));
    assert!(!list.exists(A, 7));
}

/// 裁剪到与标签不再相交时标签被丢弃，仍相交时保留。
#[test]
fn removal_prunes_only_fully_trimmed_tags() {
    let mut list = TagList::with_size(10);
    list.insert(A, 'a', 0, 3).expect("插入");
    list.insert(B, 'b', 7, 3).expect("插入");
    list.remove_at_start(2);
    list.remove_at_end(3);
    assert_eq!(list.len(), 1);
    assert!(list.exists(A, 0));
    list.remove_at_start(1);
    assert!(list.is_empty());
    assert_eq!(list.size(), 4);
}

/// 标签存活当且仅当标签区间与分片窗口相交，且区间以分片坐标表示。
#[test]
fn fragment_keeps_intersecting_tags_in_local_coordinates() {
    let mut list = TagList::with_size(20);
    list.insert(A, (), 5, 5).expect("插入");
    for (offset, len, expected) in [
        (0, 5, None),
        (0, 6, Some(5..6)),
        (7, 10, Some(0..3)),
        (9, 1, Some(0..1)),
        (10, 10, None),
    ] {
        let fragment = list.fragment(offset, len);
        let span = fragment.iter().next().map(|span| span.range);
        assert_eq!(span, expected, "窗口 [{offset}, {})", offset + len);
    }
}

#[test]
fn reassembly_restores_original_tags_without_duplicates() {
    let mut list = TagList::with_size(12);
    list.insert(A, 1, 2, 8).expect("插入");
    list.insert(B, 2, 10, 2).expect("插入");

    let mut rebuilt = list.fragment(4, 4);
    rebuilt.prepend(&list.fragment(0, 4));
    rebuilt.append(&list.fragment(8, 4));
    assert_eq!(rebuilt.size(), 12);
    assert_eq!(rebuilt.len(), 2);
    let spans: Vec<_> = rebuilt.iter().map(|span| (span.id, span.range)).collect();
    assert!(spans.contains(&(A, 2..10)));
    assert!(spans.contains(&(B, 10..12)));
}

#[test]
fn distinct_insertions_are_not_merged() {
    let mut left = TagList::with_size(2);
    left.insert(A, 0, 0, 2).expect("插入");
    let mut right = TagList::with_size(2);
    right.insert(A, 0, 0, 2).expect("插入");
    left.append(&right);
    assert_eq!(left.len(), 2);
    assert!(left.exists(A, 3));
}

#[test]
fn detached_copy_is_independent() {
    let mut list = TagList::with_size(4);
    list.insert(A, 5, 0, 4).expect("插入");
    let detached = list.detached();
    list.remove_all();
    assert!(list.is_empty());
    assert_eq!(detached.get(A, 0).copied(), Ok(5));
}
