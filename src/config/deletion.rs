//! Deletion engine configuration.
//!
//! # Example
//!
//! ```toml
//! [deletion]
//! enabled = true
//! interval_hours = 24
//! dry_run = false
//! storage_batch_size = 50
//! ```

use serde::{Deserialize, Serialize};

/// Settings for the deletion batch processor and its trigger worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeletionConfig {
    /// Whether the in-process interval worker runs under `serve`.
    /// Deployments driven by an external scheduler (cron invoking
    /// `offboard run`) leave this off.
    /// Default: false (must be explicitly enabled)
    #[serde(default)]
    pub enabled: bool,

    /// How often the interval worker triggers a batch run (in hours).
    /// Default: 24 (once per day)
    #[serde(default = "default_interval_hours")]
    pub interval_hours: u64,

    /// If true, log which accounts would be erased without writing anything:
    /// no data changes and no audit record.
    /// Default: false
    #[serde(default)]
    pub dry_run: bool,

    /// Storage objects deleted concurrently per batch. Batches run
    /// sequentially to bound peak delete load.
    /// Default: 50
    #[serde(default = "default_storage_batch_size")]
    pub storage_batch_size: usize,
}

impl Default for DeletionConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_hours: default_interval_hours(),
            dry_run: false,
            storage_batch_size: default_storage_batch_size(),
        }
    }
}

fn default_interval_hours() -> u64 {
    24
}

fn default_storage_batch_size() -> usize {
    50
}

impl DeletionConfig {
    /// Get the worker interval as a Duration.
    pub fn interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.interval_hours * 3600)
    }
}
