use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::PipelineError;

pub const DEFAULT_CONCURRENCY: usize = 5;
pub const DEFAULT_ROOT_LIMIT: usize = 100;

/// How the upsert step decides that a persisted record is still current.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeDetection {
    /// Equal descendant counts mean unchanged.
    #[default]
    DescendantCount,
    /// Equal counts and identical child id shape at every depth mean unchanged.
    Structure,
}

/// Knobs for a single ingestion run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Maximum number of root tasks in flight at once.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// How many roots to request from the source.
    #[serde(default = "default_root_limit")]
    pub root_limit: usize,
    #[serde(default)]
    pub change_detection: ChangeDetection,
}

fn default_concurrency() -> usize {
    DEFAULT_CONCURRENCY
}

fn default_root_limit() -> usize {
    DEFAULT_ROOT_LIMIT
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            root_limit: DEFAULT_ROOT_LIMIT,
            change_detection: ChangeDetection::default(),
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.concurrency == 0 {
            return Err(PipelineError::Config(
                "concurrency must be a positive integer".to_string(),
            ));
        }
        Ok(())
    }

    pub fn trace_loaded(&self) {
        info!(
            concurrency = self.concurrency,
            root_limit = self.root_limit,
            change_detection = ?self.change_detection,
            "Loaded PipelineConfig"
        );
        debug!(?self, "PipelineConfig loaded (full debug)");
    }
}
