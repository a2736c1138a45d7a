//! Fuzz target for B+ tree operation sequences.
//!
//! Decodes the input into a stream of insert, delete, lookup and scan
//! operations over a small key space, applies them to a tree with the
//! smallest fanout and a tight pool, and checks every result against a
//! `BTreeMap` of value stacks. The integrity scrubber runs after every
//! mutation.

#![no_main]

use std::collections::BTreeMap;

use bptree::{Error, IntegrityScrubber, NaturalOrder, Tree, TreeConfig};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Some((&header, ops)) = data.split_first() else {
        return;
    };

    // Pool capacity between 8 and 263 slots so exhaustion is reachable.
    let config = TreeConfig { pool_capacity: 8 + usize::from(header), fanout: 4, payload_size: 4 };
    let Ok(mut tree) = Tree::<u8>::new(config, NaturalOrder) else {
        return;
    };
    let mut model: BTreeMap<u8, Vec<Vec<u8>>> = BTreeMap::new();

    for chunk in ops.chunks_exact(3) {
        let (selector, key, arg) = (chunk[0] % 4, chunk[1] % 64, chunk[2]);
        match selector {
            0 => fuzz_insert(&mut tree, &mut model, key, arg),
            1 => fuzz_delete(&mut tree, &mut model, key),
            2 => fuzz_get(&tree, &model, key),
            _ => fuzz_list_from(&tree, &model, key, usize::from(arg % 16)),
        }
    }

    let total: usize = model.values().map(Vec::len).sum();
    assert_eq!(tree.len(), model.len(), "key count mismatch");
    assert_eq!(tree.value_count(), total, "value count mismatch");
});

fn assert_clean(tree: &Tree<u8>) {
    let result = IntegrityScrubber::new(tree).verify();
    assert!(result.is_clean(), "scrub failed: {:?}", result.errors);
}

fn fuzz_insert(tree: &mut Tree<u8>, model: &mut BTreeMap<u8, Vec<Vec<u8>>>, key: u8, arg: u8) {
    let value = vec![arg; usize::from(arg % 5)];
    let free = tree.free_count();
    match tree.insert(key, &value) {
        Ok(_) => model.entry(key).or_default().push(value),
        Err(Error::PoolExhausted { .. }) => {
            assert_eq!(tree.free_count(), free, "failed insert consumed slots");
        },
        Err(err) => panic!("unexpected insert error: {err}"),
    }
    assert_clean(tree);
}

fn fuzz_delete(tree: &mut Tree<u8>, model: &mut BTreeMap<u8, Vec<Vec<u8>>>, key: u8) {
    let present = match model.get_mut(&key) {
        Some(stack) => {
            stack.pop();
            if stack.is_empty() {
                model.remove(&key);
            }
            true
        },
        None => false,
    };
    match tree.delete(&key) {
        Ok(()) => assert!(present, "deleted absent key {key}"),
        Err(Error::KeyNotFound) => assert!(!present, "lost key {key}"),
        Err(err) => panic!("unexpected delete error: {err}"),
    }
    assert_clean(tree);
}

fn fuzz_get(tree: &Tree<u8>, model: &BTreeMap<u8, Vec<Vec<u8>>>, key: u8) {
    let expected = model.get(&key).and_then(|stack| stack.last()).map(Vec::as_slice);
    assert_eq!(tree.get(&key).ok().flatten(), expected, "lookup mismatch for {key}");
}

fn fuzz_list_from(tree: &Tree<u8>, model: &BTreeMap<u8, Vec<Vec<u8>>>, start: u8, count: usize) {
    let Ok(scan) = tree.list_from(Some(&start), count) else {
        panic!("list_from failed");
    };
    let actual: Vec<(u8, usize)> =
        match scan.map(|record| record.map(|r| (*r.key, r.copies))).collect::<Result<Vec<_>, _>>() {
            Ok(records) => records,
            Err(err) => panic!("scan failed: {err}"),
        };
    let expected: Vec<(u8, usize)> =
        model.range(start..).take(count).map(|(key, stack)| (*key, stack.len())).collect();
    assert_eq!(actual, expected, "scan mismatch from {start}");
}
