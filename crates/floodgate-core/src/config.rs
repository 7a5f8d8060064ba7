//! Engine tunables.

use crate::error::EngineError;

/// Tunables shared by the statistics runtime and the controllers.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Horizon for future-window occupancy, and the upper bound a
    /// prioritized request may wait. Milliseconds.
    pub occupy_timeout_ms: u64,
    /// Ceiling applied to every recorded response time. Milliseconds.
    pub max_rt_ms: u64,
    /// Ratio of warm-steady to cold-start permitted QPS in warm-up control.
    pub cold_factor: u32,
    /// Buckets per second-level sliding window.
    pub sample_count: usize,
    /// Span of the second-level sliding window. Milliseconds.
    pub interval_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            occupy_timeout_ms: 500,
            max_rt_ms: 4_900,
            cold_factor: 3,
            sample_count: 2,
            interval_ms: 1_000,
        }
    }
}

impl EngineConfig {
    pub(crate) fn validate(&self) -> Result<(), EngineError> {
        if self.sample_count == 0 {
            return Err(EngineError::InvalidConfig(
                "sample_count must be positive".into(),
            ));
        }
        if self.interval_ms == 0 || self.interval_ms % self.sample_count as u64 != 0 {
            return Err(EngineError::InvalidConfig(format!(
                "interval_ms {} must be a positive multiple of sample_count {}",
                self.interval_ms, self.sample_count
            )));
        }
        if self.cold_factor <= 1 {
            return Err(EngineError::InvalidConfig(
                "cold_factor must be greater than 1".into(),
            ));
        }
        Ok(())
    }
}
