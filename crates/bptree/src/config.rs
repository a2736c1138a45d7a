//! Tree configuration.
//!
//! Configuration can be built programmatically through a validating
//! builder or deserialized from any serde format. Deserialized values are
//! checked with [`TreeConfig::validate`], which [`Tree::new`] also calls.
//!
//! [`Tree::new`]: crate::Tree::new

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use snafu::Snafu;

/// Configuration validation error.
#[derive(Debug, Snafu)]
pub enum ConfigError {
    /// A configuration value is invalid.
    #[snafu(display("invalid config: {message}"))]
    Validation {
        /// Description of the validation failure.
        message: String,
    },
}

/// Node byte size of the classic parametrisation.
pub const DEFAULT_NODE_SIZE: usize = 72;

/// Bytes per node entry (4-byte key + 4-byte handle).
pub const DEFAULT_ENTRY_SIZE: usize = 8;

/// Bytes stored per data payload.
pub const DEFAULT_PAYLOAD_SIZE: usize = 16;

/// Number of node slots in the pool.
pub const DEFAULT_POOL_CAPACITY: usize = 24576;

/// Smallest fanout for which splits and merges keep both halves legal.
pub const MIN_FANOUT: usize = 4;

/// Derives a fanout from a node byte size.
///
/// The raw quotient is rounded down to an even number: a full internal
/// node of an odd fanout cannot be split into two halves that both meet
/// the minimum occupancy.
pub const fn fanout_for_node_size(node_size: usize, entry_size: usize) -> usize {
    if entry_size == 0 {
        return 0;
    }
    (node_size / entry_size) & !1
}

/// Minimum fanout, `ceil(fanout / 2)`.
pub const fn min_fanout(fanout: usize) -> usize {
    fanout.div_ceil(2)
}

/// Tree construction parameters.
///
/// # Validation Rules
///
/// - `fanout` must be even and >= 4
/// - `pool_capacity` must be >= `2 * min_fanout` and below `u32::MAX`
/// - `payload_size` must be >= 1
///
/// # Example
///
/// ```no_run
/// # use bptree::TreeConfig;
/// let config = TreeConfig::builder()
///     .pool_capacity(1024)
///     .fanout(16)
///     .build()
///     .expect("valid tree config");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct TreeConfig {
    /// Number of node slots in the pool. Every node and payload record
    /// occupies one slot; the pool never grows.
    #[serde(default = "default_pool_capacity")]
    pub pool_capacity: usize,
    /// Maximum child pointers per internal node. Nodes hold at most
    /// `fanout - 1` entries.
    #[serde(default = "default_fanout")]
    pub fanout: usize,
    /// Maximum payload length in bytes.
    #[serde(default = "default_payload_size")]
    pub payload_size: usize,
}

fn default_pool_capacity() -> usize {
    DEFAULT_POOL_CAPACITY
}

fn default_fanout() -> usize {
    fanout_for_node_size(DEFAULT_NODE_SIZE, DEFAULT_ENTRY_SIZE)
}

fn default_payload_size() -> usize {
    DEFAULT_PAYLOAD_SIZE
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            pool_capacity: default_pool_capacity(),
            fanout: default_fanout(),
            payload_size: default_payload_size(),
        }
    }
}

#[bon::bon]
impl TreeConfig {
    /// Creates a new tree configuration with validation.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] if any rule listed on
    /// [`TreeConfig`] is violated.
    #[builder]
    pub fn new(
        #[builder(default = default_pool_capacity())] pool_capacity: usize,
        #[builder(default = default_fanout())] fanout: usize,
        #[builder(default = default_payload_size())] payload_size: usize,
    ) -> Result<Self, ConfigError> {
        let config = Self { pool_capacity, fanout, payload_size };
        config.validate()?;
        Ok(config)
    }
}

impl TreeConfig {
    /// Minimum fanout for this configuration.
    pub fn min_fanout(&self) -> usize {
        min_fanout(self.fanout)
    }

    /// Validates the configuration values.
    ///
    /// Call after deserialization to ensure values are within valid ranges.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] if any value is out of range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.fanout < MIN_FANOUT {
            return Err(ConfigError::Validation {
                message: format!("fanout must be >= {MIN_FANOUT}, got {}", self.fanout),
            });
        }
        if self.fanout % 2 != 0 {
            return Err(ConfigError::Validation {
                message: format!("fanout must be even, got {}", self.fanout),
            });
        }
        if self.payload_size == 0 {
            return Err(ConfigError::Validation {
                message: "payload_size must be >= 1".to_string(),
            });
        }
        let min_capacity = 2 * self.min_fanout();
        if self.pool_capacity < min_capacity {
            return Err(ConfigError::Validation {
                message: format!(
                    "pool_capacity must be >= {min_capacity} (2 x min fanout), got {}",
                    self.pool_capacity
                ),
            });
        }
        if self.pool_capacity >= u32::MAX as usize {
            return Err(ConfigError::Validation {
                message: format!(
                    "pool_capacity must be < {}, got {}",
                    u32::MAX,
                    self.pool_capacity
                ),
            });
        }
        Ok(())
    }
}
