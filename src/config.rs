//! Worker and filter configuration

use serde::{Deserialize, Serialize};

/// Property key the matched geometries are stored under on a kept cell
pub const DEFAULT_ANNOTATION_KEY: &str = "geometries";

/// What to do when a single grid cell fails to evaluate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FailurePolicy {
    /// Stop at the first failing cell and report its error; no partial result
    #[default]
    AbortBatch,
    /// Drop the failing cell, record its error and keep going
    SkipCell,
}

/// Options for one grid filter pass
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FilterOptions {
    pub failure_policy: FailurePolicy,
    /// Look up candidates per cell through an R-tree instead of scanning all
    pub use_spatial_index: bool,
    /// Candidate count at which a cell is evaluated on the rayon pool
    pub parallel_threshold: usize,
    pub annotation_key: String,
}

impl Default for FilterOptions {
    fn default() -> Self {
        Self {
            failure_policy: FailurePolicy::AbortBatch,
            use_spatial_index: true,
            parallel_threshold: 256,
            annotation_key: DEFAULT_ANNOTATION_KEY.to_string(),
        }
    }
}

/// Configuration of a background worker
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    pub filter: FilterOptions,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_options_fill_defaults() {
        let options: FilterOptions =
            serde_json::from_str(r#"{"failurePolicy": "skipCell"}"#).unwrap();
        assert_eq!(options.failure_policy, FailurePolicy::SkipCell);
        assert!(options.use_spatial_index);
        assert_eq!(options.annotation_key, DEFAULT_ANNOTATION_KEY);
    }
}
