//! Sampling configuration handed to the acquisition engine at construction.

use serde::{Deserialize, Serialize};

/// Knobs that bound how much remote and storage work one run may do.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SamplingConfig {
    /// Candidate pool is oversampled to this multiple of the target.
    pub pool_multiplier: usize,
    /// Lower bound on the candidate pool size.
    pub pool_floor: usize,
    /// Highest offset the remote catalog serves correctly (exclusive).
    pub max_offset: usize,
    /// Results requested per remote batch call.
    pub page_size: usize,
    /// Remote batch calls the pool builder may spend.
    pub builder_attempts: usize,
    /// Default per-run attempt budget is this multiple of the target.
    pub attempt_multiplier: usize,
    /// Consecutive persistence failures tolerated before the run halts.
    pub max_consecutive_persist_failures: usize,
    /// Photo size segment substituted into asset URLs.
    pub asset_size: String,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            pool_multiplier: 10,
            pool_floor: 200,
            max_offset: 10_000,
            page_size: 200,
            builder_attempts: 20,
            attempt_multiplier: 3,
            max_consecutive_persist_failures: 3,
            asset_size: "medium".into(),
        }
    }
}

impl SamplingConfig {
    /// Size of the candidate pool to assemble for `target` new records.
    pub fn pool_target(&self, target: usize) -> usize {
        target
            .saturating_mul(self.pool_multiplier)
            .max(self.pool_floor)
    }

    /// Attempt budget for a run: the override when given, else a multiple of `target`.
    pub fn attempt_budget(&self, target: usize, budget_override: Option<usize>) -> usize {
        budget_override.unwrap_or_else(|| target.saturating_mul(self.attempt_multiplier))
    }

    /// Largest offset random sampling may request so a full page stays
    /// below both the corpus size and the remote offset ceiling.
    pub fn max_start_offset(&self, total: usize) -> usize {
        total.min(self.max_offset).saturating_sub(self.page_size)
    }
}
