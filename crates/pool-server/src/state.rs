//! Application state

use crate::collector::WatermarkCollector;
use crate::ratelimit::RateGovernor;
use crate::store::DifficultyStore;
use std::sync::Arc;
use std::time::Duration;

/// Settings for the on-demand collection trigger endpoint.
#[derive(Debug, Clone)]
pub struct CollectSettings {
    /// Blocks accepted per trigger request.
    pub max_batch: usize,
    pub max_concurrent: usize,
    /// Deadline for the synchronous, interactive path.
    pub deadline: Duration,
}

impl Default for CollectSettings {
    fn default() -> Self {
        Self {
            max_batch: 5,
            max_concurrent: 5,
            deadline: Duration::from_secs(10),
        }
    }
}

/// Everything a request handler needs. Persistence is reached through the
/// store trait only; the governor and collector are injected so their
/// lifecycles stay owned by the composition root.
pub struct AppState {
    pub store: Arc<dyn DifficultyStore>,
    pub governor: Arc<RateGovernor>,
    pub collector: Arc<WatermarkCollector>,
    pub collect: CollectSettings,
}

impl AppState {
    pub fn new(
        store: Arc<dyn DifficultyStore>,
        governor: Arc<RateGovernor>,
        collector: Arc<WatermarkCollector>,
        collect: CollectSettings,
    ) -> Self {
        Self {
            store,
            governor,
            collector,
            collect,
        }
    }
}
