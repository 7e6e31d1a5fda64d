use std::time::Duration;

/// Obligation core configuration.
#[derive(Debug, Clone)]
pub struct ClearingEngineConfig {
    /// Upper bound on one clearing call. Expiry counts as `cleared: false`.
    pub clearing_timeout: Duration,
    /// Upper bound on eligibility check plus honoring attempt, independent of clearing.
    pub honoring_timeout: Duration,
    /// Upper bound on a detached mirror write. Does not affect submission latency.
    pub mirror_timeout: Duration,
    /// Default batch size limit for `BatchOrchestrator::submit_batch_default`.
    pub max_batch_size: usize,
}

impl Default for ClearingEngineConfig {
    fn default() -> Self {
        Self {
            clearing_timeout: Duration::from_secs(10),
            honoring_timeout: Duration::from_secs(5),
            mirror_timeout: Duration::from_secs(30),
            max_batch_size: 500,
        }
    }
}
