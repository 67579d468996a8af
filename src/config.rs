//! Queue configuration

use serde::{Deserialize, Serialize};

use crate::error::QueueError;

/// Operation queue configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Max concurrently executing operations (worker pool size)
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
}

fn default_max_concurrent() -> usize {
    4
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self { max_concurrent: 4 }
    }
}

impl QueueConfig {
    /// Create a configuration with the given concurrency budget
    pub fn with_concurrency(max_concurrent: usize) -> Self {
        Self { max_concurrent }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), QueueError> {
        if self.max_concurrent == 0 {
            return Err(QueueError::InvalidConfig(
                "max_concurrent must be >= 1".to_string(),
            ));
        }
        Ok(())
    }
}
