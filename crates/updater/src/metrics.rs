use metrics::Counter;
use metrics_derive::Metrics;

/// The metrics for the [`super::Updater`].
#[derive(Metrics, Clone)]
#[metrics(scope = "updater")]
pub struct UpdaterMetrics {
    /// A counter on the encrypted commitments stored.
    pub encrypted_commitments_stored: Counter,
    /// A counter on the commitments processed to a settlement.
    pub commitments_processed: Counter,
    /// A counter on reward settlements.
    pub rewards: Counter,
    /// A counter on slash settlements.
    pub slashes: Counter,
    /// A counter on return settlements.
    pub returns: Counter,
    /// A counter on commitments dropped without a settlement.
    pub commitments_dropped: Counter,
}
