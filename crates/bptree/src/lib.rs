//! bptree: an embeddable B+ tree index over a fixed-capacity node pool.
//!
//! The index keeps keys in sorted order with logarithmic search, insertion
//! and deletion, and chains its leaves for sequential range scans. It is a
//! storage-engine building block: durability, transactions and query
//! languages belong to the caller.
//!
//! - **Fixed pool**: every node and payload lives in one pre-sized slot
//!   arena; running out is an error, never a reallocation
//! - **Single pass**: inserts split and deletes rebalance on the way down,
//!   with no ancestor stack and no backtracking
//! - **Duplicate keys**: repeated inserts chain values behind one entry
//! - **Pluggable order**: keys are compared by a caller-supplied
//!   [`KeyComparator`]
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │                 Tree API                     │
//! │  (search, insert, delete, list_from, range)  │
//! └────────────────┬────────────────────────────┘
//!                  │
//! ┌────────────────▼────────────────────────────┐
//! │           Insert / Delete engines            │
//! │   (preemptive split, shift/merge/collapse)   │
//! └────────────────┬────────────────────────────┘
//!                  │
//! ┌────────────────▼────────────────────────────┐
//! │              Node model                      │
//! │   (internal, leaf, data, duplicate chain)    │
//! └────────────────┬────────────────────────────┘
//!                  │
//! ┌────────────────▼────────────────────────────┐
//! │              Node pool                       │
//! │     (slot arena with intrusive free list)    │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```no_run
//! use bptree::{NaturalOrder, Tree, TreeConfig};
//!
//! let config = TreeConfig::builder().pool_capacity(4096).fanout(16).build()?;
//! let mut tree: Tree<u64> = Tree::new(config, NaturalOrder)?;
//!
//! tree.insert(42, b"answer")?;
//! tree.insert(7, b"lucky")?;
//!
//! for record in tree.list_from(Some(&10), 5)? {
//!     let record = record?;
//!     println!("{} -> {:?}", record.key, record.value);
//! }
//!
//! tree.delete(&42)?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod btree;
pub mod config;
pub mod error;
pub mod integrity;
pub mod pool;
pub mod sync;
pub mod types;

// Re-export commonly used types
pub use btree::{
    Tree, TreeStats,
    cursor::{Bound, ListFrom, Range, RangeIter, Record, ScanCursor},
    node::NodeStatus,
};
pub use config::{ConfigError, TreeConfig};
pub use error::{Error, NodeKind, Result};
pub use integrity::{IntegrityScrubber, ScrubError, ScrubResult};
pub use pool::NodePool;
pub use sync::SharedTree;
pub use types::{Handle, KeyComparator, NaturalOrder};
