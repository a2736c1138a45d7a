//! Proptest strategies for B+ tree workloads.
//!
//! Generators draw keys from a deliberately narrow range so that random
//! sequences hit duplicates, deletes of present keys, and repeated splits
//! and merges of the same region.
//!
//! # Usage
//!
//! ```no_run
//! use bptree_test_utils::strategies;
//! use proptest::prelude::*;
//!
//! proptest! {
//!     #[test]
//!     fn my_property(ops in strategies::arb_op_sequence(200)) {
//!         // apply ops and check invariants
//!     }
//! }
//! ```

use proptest::prelude::*;

use crate::{config::TEST_PAYLOAD_SIZE, model::TreeOp};

/// Upper bound (exclusive) of keys produced by [`arb_key`].
pub const KEY_SPACE: u16 = 512;

/// Generates a key in `0..KEY_SPACE`.
pub fn arb_key() -> impl Strategy<Value = u16> {
    0..KEY_SPACE
}

/// Generates a value of 0 to `TEST_PAYLOAD_SIZE` random bytes.
pub fn arb_value() -> impl Strategy<Value = Vec<u8>> {
    proptest::collection::vec(any::<u8>(), 0..=TEST_PAYLOAD_SIZE)
}

/// Generates a small value of 1-4 random bytes for compact tests.
pub fn arb_small_value() -> impl Strategy<Value = Vec<u8>> {
    proptest::collection::vec(any::<u8>(), 1..=4)
}

/// Generates a valid fanout: even, between 4 and 32.
pub fn arb_fanout() -> impl Strategy<Value = usize> {
    (2usize..=16).prop_map(|half| half * 2)
}

/// Generates a single tree operation.
///
/// Weighted towards inserts so trees grow deep enough to exercise splits,
/// with enough deletes to drive rebalancing.
pub fn arb_op() -> impl Strategy<Value = TreeOp<u16>> {
    prop_oneof![
        5 => (arb_key(), arb_small_value()).prop_map(|(key, value)| TreeOp::Insert { key, value }),
        3 => arb_key().prop_map(|key| TreeOp::Delete { key }),
        1 => arb_key().prop_map(|key| TreeOp::Get { key }),
        1 => (proptest::option::of(arb_key()), 0usize..32)
            .prop_map(|(start, count)| TreeOp::ListFrom { start, count }),
    ]
}

/// Generates a sequence of up to `max_len` operations.
pub fn arb_op_sequence(max_len: usize) -> impl Strategy<Value = Vec<TreeOp<u16>>> {
    proptest::collection::vec(arb_op(), 1..=max_len)
}

/// Generates a set of distinct keys, shuffled.
pub fn arb_unique_keys(max_len: usize) -> impl Strategy<Value = Vec<u16>> {
    proptest::collection::btree_set(arb_key(), 1..=max_len)
        .prop_map(|keys| keys.into_iter().collect::<Vec<_>>())
        .prop_shuffle()
}
