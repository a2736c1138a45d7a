//! Test assertion helpers.
//!
//! Panicking wrappers around the integrity scrubber and the reference
//! model, with messages that list every violation found.

use std::{cmp::Ordering, fmt::Debug};

use bptree::{IntegrityScrubber, KeyComparator, NaturalOrder, Tree};

use crate::model::TreeModel;

/// Asserts that the integrity scrubber finds no structural error.
///
/// # Panics
///
/// Panics with every scrubber error if the tree is damaged.
#[track_caller]
pub fn assert_tree_valid<K, C>(tree: &Tree<K, C>)
where
    K: Clone,
    C: KeyComparator<K>,
{
    let result = IntegrityScrubber::new(tree).verify();
    if !result.is_clean() {
        let details: Vec<String> = result
            .errors
            .iter()
            .map(|err| format!("  {}: {}", err.handle, err.description))
            .collect();
        panic!(
            "tree failed integrity scrub with {} error(s):\n{}",
            result.structural_errors,
            details.join("\n")
        );
    }
}

/// Asserts that a full scan yields keys in strictly ascending order.
///
/// # Panics
///
/// Panics on a scan error or on the first out-of-order pair.
#[track_caller]
pub fn assert_sorted_scan<K, C>(tree: &Tree<K, C>)
where
    K: Clone + Debug,
    C: KeyComparator<K>,
{
    let mut previous: Option<&K> = None;
    for record in tree.iter() {
        let record = match record {
            Ok(record) => record,
            Err(err) => panic!("scan failed: {err}"),
        };
        if let Some(prev) = previous {
            assert_eq!(
                tree.comparator().compare(prev, record.key),
                Ordering::Less,
                "scan out of order: {prev:?} before {:?}",
                record.key
            );
        }
        previous = Some(record.key);
    }
}

/// Asserts that the tree holds exactly the model's contents.
///
/// Compares every key, its value count and its full value chain.
///
/// # Panics
///
/// Panics on the first difference.
#[track_caller]
pub fn assert_matches_model<K>(tree: &Tree<K, NaturalOrder>, model: &TreeModel<K>)
where
    K: Ord + Clone + Debug,
{
    assert_eq!(tree.len(), model.len(), "distinct key count");
    assert_eq!(tree.value_count(), model.value_count(), "value count");

    let expected = model.list_from(None, usize::MAX);
    let mut seen = 0;
    for (record, (key, copies, newest)) in tree.iter().zip(&expected) {
        let record = match record {
            Ok(record) => record,
            Err(err) => panic!("scan failed at {key:?}: {err}"),
        };
        assert_eq!(record.key, key, "scan key");
        assert_eq!(record.copies, *copies, "copies of {key:?}");
        assert_eq!(record.value, newest.as_slice(), "newest value of {key:?}");

        let chain = match tree.get_all(key) {
            Ok(chain) => chain,
            Err(err) => panic!("get_all {key:?} failed: {err}"),
        };
        assert_eq!(chain, model.get_all(key), "value chain of {key:?}");
        seen += 1;
    }
    assert_eq!(seen, expected.len(), "scan length");
}
