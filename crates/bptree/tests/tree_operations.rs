//! End-to-end tests for the public tree API.
//!
//! Every scenario runs the integrity scrubber after each mutation, so a
//! failure points at the first operation that broke a structural rule
//! rather than at a later lookup that happened to notice.

// Test code is allowed to use unwrap for simplicity
#![allow(clippy::unwrap_used, clippy::expect_used, clippy::disallowed_methods)]

use bptree::{Bound, Error, NaturalOrder, Range, Tree, TreeConfig};
use bptree_test_utils::{
    assert_sorted_scan, assert_tree_valid, init_test_tracing, test_tree_config, tiny_tree_config,
};

fn keys<K: Clone, C: bptree::KeyComparator<K>>(tree: &Tree<K, C>) -> Vec<K> {
    tree.iter().map(|record| record.unwrap().key.clone()).collect()
}

// ============================================
// Worked example
// ============================================

#[test]
fn test_worked_example_insert_then_delete() {
    init_test_tracing();
    let mut tree: Tree<u32> = Tree::new(tiny_tree_config(), NaturalOrder).unwrap();

    let mut heights = vec![tree.height()];
    for key in [10, 20, 5, 15, 25, 1] {
        tree.insert(key, &key.to_le_bytes()).unwrap();
        assert_tree_valid(&tree);
        heights.push(tree.height());
    }
    assert_eq!(keys(&tree), vec![1, 5, 10, 15, 20, 25]);

    let growths = heights.windows(2).filter(|w| w[1] > w[0]).count();
    assert_eq!(growths, 1, "height should grow exactly once: {heights:?}");
    assert_eq!(tree.stats().root_splits, 1);

    tree.delete(&10).unwrap();
    assert_tree_valid(&tree);
    tree.delete(&20).unwrap();
    assert_tree_valid(&tree);

    assert_eq!(keys(&tree), vec![1, 5, 15, 25]);
    assert_eq!(tree.get(&15).unwrap(), Some(&15u32.to_le_bytes()[..]));
    assert_eq!(tree.get(&10).unwrap(), None);
}

#[test]
fn test_search_empty_tree_does_not_allocate() {
    let tree: Tree<u32> = Tree::new(tiny_tree_config(), NaturalOrder).unwrap();
    let free = tree.free_count();

    assert_eq!(tree.search(&42).unwrap(), None);
    assert_eq!(tree.get(&42).unwrap(), None);
    assert!(tree.first().unwrap().is_none());
    assert!(tree.last().unwrap().is_none());
    assert_eq!(tree.free_count(), free);
    assert_tree_valid(&tree);
}

// ============================================
// Configuration
// ============================================

#[test]
fn test_invalid_configuration_rejected() {
    let odd = TreeConfig { pool_capacity: 64, fanout: 5, payload_size: 8 };
    let err = Tree::<u32>::new(odd, NaturalOrder).unwrap_err();
    assert!(matches!(err, Error::InvalidConfiguration { .. }));

    let small = TreeConfig { pool_capacity: 2, fanout: 8, payload_size: 8 };
    assert!(matches!(
        Tree::<u32>::new(small, NaturalOrder),
        Err(Error::InvalidConfiguration { .. })
    ));
}

#[test]
fn test_config_from_json_uses_defaults() {
    let config: TreeConfig = serde_json::from_str(r#"{"fanout": 4}"#).unwrap();
    config.validate().unwrap();
    assert_eq!(config.fanout, 4);
    assert_eq!(config.pool_capacity, TreeConfig::default().pool_capacity);

    let tree: Tree<u32> = Tree::new(config, NaturalOrder).unwrap();
    assert_eq!(tree.min_fanout(), 2);
}

// ============================================
// Pool exhaustion
// ============================================

#[test]
fn test_pool_exhaustion_leaves_tree_unchanged() {
    let mut tree: Tree<u32> = Tree::new(tiny_tree_config(), NaturalOrder).unwrap();

    let mut exhausted = false;
    for key in 0..64u32 {
        let before_keys = keys(&tree);
        let before_free = tree.free_count();
        let before_height = tree.height();

        match tree.insert(key, b"v") {
            Ok(_) => assert_tree_valid(&tree),
            Err(Error::PoolExhausted { capacity }) => {
                assert_eq!(capacity, 16);
                assert_eq!(keys(&tree), before_keys);
                assert_eq!(tree.free_count(), before_free);
                assert_eq!(tree.height(), before_height);
                assert_tree_valid(&tree);
                exhausted = true;
                break;
            },
            Err(other) => panic!("unexpected error: {other}"),
        }
    }
    assert!(exhausted, "a 16-slot pool must run out");

    // Deletes never allocate, so the tree stays usable after exhaustion.
    let first = *tree.first().unwrap().unwrap().key;
    tree.delete(&first).unwrap();
    assert_tree_valid(&tree);
}

#[test]
fn test_duplicates_fill_pool_one_slot_each() {
    let mut tree: Tree<u32> = Tree::new(tiny_tree_config(), NaturalOrder).unwrap();

    let mut stored = 0;
    while tree.insert(0, &[stored as u8]).is_ok() {
        stored += 1;
    }

    assert_eq!(stored, 15, "root leaf takes one of 16 slots");
    assert_eq!(tree.free_count(), 0);
    assert_eq!(tree.duplicate_count(&0).unwrap(), 15);
    assert_eq!(tree.len(), 1);
    assert_tree_valid(&tree);
}

#[test]
fn test_payload_too_large_rejected() {
    let mut tree: Tree<u32> = Tree::new(test_tree_config(), NaturalOrder).unwrap();
    let big = vec![0u8; tree.payload_size() + 1];

    let err = tree.insert(1, &big).unwrap_err();
    assert!(matches!(err, Error::PayloadTooLarge { .. }));
    assert!(tree.is_empty());
}

// ============================================
// Duplicates and deletion
// ============================================

#[test]
fn test_duplicate_chain_pops_newest_first() {
    let mut tree: Tree<u32> = Tree::new(test_tree_config(), NaturalOrder).unwrap();
    for key in 0..20 {
        tree.insert(key, b"base").unwrap();
    }
    tree.insert(7, b"second").unwrap();
    tree.insert(7, b"third").unwrap();
    assert_tree_valid(&tree);

    assert_eq!(tree.get_all(&7).unwrap(), vec![&b"third"[..], &b"second"[..], &b"base"[..]]);
    assert_eq!(tree.value_count(), 22);

    tree.delete(&7).unwrap();
    assert_eq!(tree.get(&7).unwrap(), Some(&b"second"[..]));
    tree.delete(&7).unwrap();
    tree.delete(&7).unwrap();
    assert!(!tree.contains_key(&7).unwrap());
    assert!(matches!(tree.delete(&7), Err(Error::KeyNotFound)));
    assert_tree_valid(&tree);
}

#[test]
fn test_delete_missing_key_is_noop() {
    let mut tree: Tree<u32> = Tree::new(test_tree_config(), NaturalOrder).unwrap();
    for key in (0..60).step_by(2) {
        tree.insert(key, b"v").unwrap();
    }
    let free = tree.free_count();
    let stats = tree.stats();

    assert!(matches!(tree.delete(&31), Err(Error::KeyNotFound)));
    assert_eq!(tree.free_count(), free);
    assert_eq!(tree.stats(), stats);
    assert_tree_valid(&tree);
}

#[test]
fn test_interleaved_deletes_keep_structure() {
    let mut tree: Tree<u32> = Tree::new(test_tree_config(), NaturalOrder).unwrap();
    let initial_free = tree.free_count();
    for key in 0..200u32 {
        tree.insert((key * 37) % 200, b"v").unwrap();
    }
    assert!(tree.height() >= 4);

    for key in (0..200u32).rev().filter(|k| k % 3 != 0) {
        tree.delete(&key).unwrap();
        assert_tree_valid(&tree);
    }
    let expected: Vec<u32> = (0..200).filter(|k| k % 3 == 0).collect();
    assert_eq!(keys(&tree), expected);

    for key in expected {
        tree.delete(&key).unwrap();
    }
    assert!(tree.is_empty());
    assert_eq!(tree.height(), 1);
    assert_eq!(tree.free_count(), initial_free);
    assert!(tree.stats().merges > 0);
    assert!(tree.stats().collapses > 0);
    assert_tree_valid(&tree);
}

// ============================================
// Scans
// ============================================

#[test]
fn test_list_from_and_resume() {
    let mut tree: Tree<u32> = Tree::new(test_tree_config(), NaturalOrder).unwrap();
    for key in (0..100).map(|k| k * 10) {
        tree.insert(key, b"v").unwrap();
    }

    let mut scan = tree.list_from(Some(&55), 3).unwrap();
    let page: Vec<u32> = scan.by_ref().map(|r| *r.unwrap().key).collect();
    assert_eq!(page, vec![60, 70, 80]);

    let cursor = scan.cursor().unwrap();
    let next: Vec<u32> = tree.resume(cursor, 2).unwrap().map(|r| *r.unwrap().key).collect();
    assert_eq!(next, vec![90, 100]);

    assert_eq!(tree.list_from(Some(&10_000), 5).unwrap().count(), 0);
}

#[test]
fn test_range_bounds() {
    let mut tree: Tree<u32> = Tree::new(test_tree_config(), NaturalOrder).unwrap();
    for key in 0..50 {
        tree.insert(key, b"v").unwrap();
    }
    let (lo, hi) = (10u32, 15u32);

    let half_open: Vec<u32> =
        tree.range(Range::new(&lo, &hi)).unwrap().map(|r| *r.unwrap().key).collect();
    assert_eq!(half_open, vec![10, 11, 12, 13, 14]);

    let open = Range { start: Bound::Excluded(&lo), end: Bound::Included(&hi) };
    let open: Vec<u32> = tree.range(open).unwrap().map(|r| *r.unwrap().key).collect();
    assert_eq!(open, vec![11, 12, 13, 14, 15]);

    assert_eq!(tree.range(Range::all()).unwrap().count(), 50);
}

#[test]
fn test_custom_comparator_orders_scan() {
    let descending = |a: &u32, b: &u32| b.cmp(a);
    let mut tree = Tree::new(test_tree_config(), descending).unwrap();
    for key in [3u32, 9, 1, 7, 5, 2, 8] {
        tree.insert(key, b"v").unwrap();
    }

    assert_eq!(keys(&tree), vec![9, 8, 7, 5, 3, 2, 1]);
    assert_sorted_scan(&tree);
    assert_tree_valid(&tree);
    assert_eq!(*tree.first().unwrap().unwrap().key, 9);
    assert_eq!(*tree.last().unwrap().unwrap().key, 1);
}

#[test]
fn test_string_keys() {
    let mut tree: Tree<String> = Tree::new(test_tree_config(), NaturalOrder).unwrap();
    for word in ["pear", "apple", "fig", "kiwi", "banana", "cherry"] {
        tree.insert(word.to_string(), word.as_bytes()).unwrap();
    }

    assert_eq!(keys(&tree), vec!["apple", "banana", "cherry", "fig", "kiwi", "pear"]);
    assert_eq!(tree.get(&"fig".to_string()).unwrap(), Some(&b"fig"[..]));
    assert_tree_valid(&tree);
}
