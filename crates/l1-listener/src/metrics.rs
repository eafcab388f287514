use metrics::{Counter, Gauge};
use metrics_derive::Metrics;

/// The metrics for the [`super::L1Listener`].
#[derive(Metrics)]
#[metrics(scope = "l1_listener")]
pub struct L1ListenerMetrics {
    /// A counter on the winners registered.
    pub winners_registered: Counter,
    /// A counter on the blocks skipped due to unknown or unregistered
    /// builders.
    pub skipped_blocks: Counter,
    /// The last L1 block with a registered winner.
    pub last_registered_block: Gauge,
}
