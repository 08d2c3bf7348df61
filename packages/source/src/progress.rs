//! Progress reporting for campaign runs.
//!
//! [`ProgressCallback`] decouples the orchestrator and pagination
//! controller from any rendering backend. The CLI plugs in `indicatif`
//! bars; tests and library callers use [`NullProgress`].

use std::sync::Arc;

/// Receives campaign, unit and batch progress events.
///
/// Implementations must be `Send + Sync` so they can be shared via `Arc`
/// across tasks.
pub trait ProgressCallback: Send + Sync {
    /// The campaign has `total_units` units, `completed_units` of which
    /// finished in earlier runs.
    fn campaign_started(&self, total_units: u64, completed_units: u64);

    /// A unit is about to be driven.
    fn unit_started(&self, key: &str);

    /// A page was processed. `offset` is the cursor after the page.
    fn batch_processed(&self, key: &str, offset: u64, total_known: Option<u64>);

    /// A unit stopped. `completed` is false for aborted or interrupted
    /// units.
    fn unit_finished(&self, key: &str, completed: bool);

    /// The run ended.
    fn campaign_finished(&self, message: String);
}

/// Ignores every event.
pub struct NullProgress;

impl ProgressCallback for NullProgress {
    fn campaign_started(&self, _total_units: u64, _completed_units: u64) {}
    fn unit_started(&self, _key: &str) {}
    fn batch_processed(&self, _key: &str, _offset: u64, _total_known: Option<u64>) {}
    fn unit_finished(&self, _key: &str, _completed: bool) {}
    fn campaign_finished(&self, _message: String) {}
}

/// Returns a shared [`NullProgress`].
#[must_use]
pub fn null_progress() -> Arc<dyn ProgressCallback> {
    Arc::new(NullProgress)
}
