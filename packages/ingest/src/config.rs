//! Run options for the pagination controller.

use std::time::Duration;

use company_etl_ingest_models::VolumeClass;
use rand::Rng as _;

/// Page size requested from the API.
pub const DEFAULT_BATCH_SIZE: u64 = 222;
/// Base delay between pages, in milliseconds.
pub const DEFAULT_BASE_DELAY_MS: u64 = 1_000;
/// Consecutive failures after which a unit is aborted.
pub const DEFAULT_MAX_CONSECUTIVE_ERRORS: u32 = 5;
/// Largest exponent used for error backoff.
pub const MAX_BACKOFF_EXPONENT: u32 = 10;

/// Tunables for driving one work unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerConfig {
    pub batch_size: u64,
    pub base_delay: Duration,
    pub max_consecutive_errors: u32,
    /// Entities upserted concurrently within one batch.
    pub upsert_concurrency: usize,
    /// Randomize politeness delays by ±25%.
    pub jitter: bool,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            base_delay: Duration::from_millis(DEFAULT_BASE_DELAY_MS),
            max_consecutive_errors: DEFAULT_MAX_CONSECUTIVE_ERRORS,
            upsert_concurrency: 1,
            jitter: true,
        }
    }
}

impl ControllerConfig {
    /// Delay after a failed fetch: `base × 2^errors`, exponent capped at
    /// [`MAX_BACKOFF_EXPONENT`].
    #[must_use]
    pub fn backoff_delay(&self, consecutive_errors: u32) -> Duration {
        let exponent = consecutive_errors.min(MAX_BACKOFF_EXPONENT);
        self.base_delay.saturating_mul(1 << exponent)
    }

    /// Delay between successful pages of a unit with volume `class`.
    #[must_use]
    pub fn politeness_delay(&self, class: VolumeClass) -> Duration {
        let jitter = if self.jitter {
            rand::thread_rng().gen_range(0.75..=1.25)
        } else {
            1.0
        };
        self.base_delay.mul_f64(class.delay_factor() * jitter)
    }
}
