//! Test configuration helpers.
//!
//! Provides small tree configurations for tests, centralizing magic values
//! that would otherwise be scattered across test modules.

use bptree::TreeConfig;
use tracing_subscriber::EnvFilter;

/// Pool capacity used by [`test_tree_config`].
pub const TEST_POOL_CAPACITY: usize = 1024;

/// Payload size used by [`test_tree_config`] and [`tiny_tree_config`].
pub const TEST_PAYLOAD_SIZE: usize = 16;

/// Returns a tree configuration suitable for tests.
///
/// Uses the smallest fanout so a few dozen keys already produce a tree of
/// height three or more:
/// - `pool_capacity`: 1024
/// - `fanout`: 4 (nodes hold 1 to 3 entries)
/// - `payload_size`: 16 bytes
#[must_use]
pub fn test_tree_config() -> TreeConfig {
    TreeConfig { pool_capacity: TEST_POOL_CAPACITY, fanout: 4, payload_size: TEST_PAYLOAD_SIZE }
}

/// Returns a configuration with a pool small enough to exhaust on purpose.
///
/// Sixteen slots: one leaf root plus room for a handful of keys and splits.
#[must_use]
pub fn tiny_tree_config() -> TreeConfig {
    TreeConfig { pool_capacity: 16, fanout: 4, payload_size: TEST_PAYLOAD_SIZE }
}

/// Installs a `tracing` subscriber that writes through the test harness.
///
/// Filtering follows `RUST_LOG` and defaults to `warn`. Safe to call from
/// every test; only the first call installs anything.
pub fn init_test_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).with_test_writer().try_init();
}
