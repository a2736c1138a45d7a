//! Shared test utilities for the bptree crate.
//!
//! This crate provides common test helpers to reduce boilerplate across test modules:
//!
//! - [`TreeModel`] and [`apply_op`] - Reference model for differential testing
//! - [`assert_tree_valid`] - Panic with every integrity scrubber error
//! - [`assert_matches_model`] - Compare a tree against the reference model
//! - [`test_tree_config`] - Small-fanout configuration for deep test trees
//! - [`strategies`] - Proptest generators for keys, values and workloads

#![deny(unsafe_code)]
// Test utilities are allowed to use unwrap for simplicity
#![cfg_attr(test, allow(clippy::disallowed_methods))]

mod assertions;
pub use assertions::{assert_matches_model, assert_sorted_scan, assert_tree_valid};

mod config;
pub use config::{
    TEST_PAYLOAD_SIZE, TEST_POOL_CAPACITY, init_test_tracing, test_tree_config, tiny_tree_config,
};

mod model;
pub use model::{TreeModel, TreeOp, apply_op};

pub mod strategies;
