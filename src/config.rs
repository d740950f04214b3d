//! Module implement engine configuration.
//!
//! All knobs default to production values; hosts typically override the
//! partition placement fields and the temp-table limits. Configuration
//! can be embedded in TOML text.

use serde::Deserialize;

use crate::{arena, Result};

/// Engine configuration. Refer to the field documentation for the
/// semantics of each knob.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Arena chunk size in bytes.
    pub chunk_size: usize,
    /// Normal chunks retained by an arena across reset.
    pub reserved_chunks: usize,
    /// Warn once when a fragment's temp-table bytes cross this line.
    /// Zero disables the warning.
    pub temp_limit_log: usize,
    /// Hard per-fragment temp-table byte limit. Zero disables it.
    pub temp_limit_hard: usize,
    /// This engine's partition.
    pub partition_id: i32,
    /// Total partitions in the cluster.
    pub partition_count: i32,
    /// Whether DML appends change records for replication.
    pub dr_enabled: bool,
    /// Executor-vector cache capacity, in fragments.
    pub plan_cache_size: usize,
    /// Resident block budget for large temp tables before spilling,
    /// in blocks.
    pub large_temp_resident_blocks: usize,
    /// Directory for spilled large-temp blocks. Empty means the
    /// process working directory.
    pub large_temp_dir: String,
}

impl Default for Config {
    fn default() -> Config {
        Config {
            chunk_size: arena::DEFAULT_CHUNK_SIZE,
            reserved_chunks: arena::DEFAULT_RESERVED_CHUNKS,
            temp_limit_log: 0,
            temp_limit_hard: 0,
            partition_id: 0,
            partition_count: 1,
            dr_enabled: false,
            plan_cache_size: 128,
            large_temp_resident_blocks: 8,
            large_temp_dir: String::default(),
        }
    }
}

impl Config {
    pub fn from_toml(text: &str) -> Result<Config> {
        err_at!(InvalidInput, toml::from_str(text))
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod config_test;
