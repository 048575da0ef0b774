//! # Provider Configuration Module
//!
//! The tunable surface of the chunk provider, loadable from JSON. Every field
//! has a sensible default so a partial configuration file is enough.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::lighting::light_merger::WorldExtent;

/// Configuration for a `ChunkProvider` and the pipeline it owns.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Worker thread count for the pipeline's executor.
    pub worker_threads: usize,

    /// The loaded world's bounds in chunk coordinates; the light merge's
    /// neighbor set is reduced at these edges.
    pub extent: WorldExtent,

    /// Bounded wait when stopping the worker pool, in milliseconds.
    pub shutdown_timeout_ms: u64,

    /// Soft deadline for draining the ready queue in one `update()` tick, in
    /// milliseconds. Exceeding it defers the rest to the next tick with a
    /// warning.
    pub update_deadline_ms: u64,

    /// Maximum number of invalidated positions unloaded per `update()` tick.
    pub max_unloads_per_update: usize,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        ProviderConfig {
            worker_threads: 4,
            extent: WorldExtent::default(),
            shutdown_timeout_ms: 5000,
            update_deadline_ms: 24,
            max_unloads_per_update: 64,
        }
    }
}

impl ProviderConfig {
    /// Parses a configuration from JSON text; missing fields keep defaults.
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// The shutdown timeout as a `Duration`.
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }

    /// The per-tick ready-drain deadline as a `Duration`.
    pub fn update_deadline(&self) -> Duration {
        Duration::from_millis(self.update_deadline_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let config = ProviderConfig::from_json(r#"{ "worker_threads": 2 }"#).unwrap();
        assert_eq!(config.worker_threads, 2);
        assert_eq!(config.update_deadline_ms, 24);
        assert_eq!(config.max_unloads_per_update, 64);
    }

    #[test]
    fn extent_is_configurable() {
        let config = ProviderConfig::from_json(
            r#"{ "extent": { "min": [0, 0, 0], "max": [3, 3, 3] } }"#,
        )
        .unwrap();
        assert_eq!(config.extent.max, [3, 3, 3]);
    }
}
