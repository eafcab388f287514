use metrics::{Counter, Gauge};
use metrics_derive::Metrics;

/// The metrics for the [`super::Settler`].
#[derive(Metrics)]
#[metrics(scope = "settler")]
pub struct SettlerMetrics {
    /// A counter on the settlement transactions posted.
    pub settlements_posted: Counter,
    /// A counter on the settlements confirmed.
    pub settlements_confirmed: Counter,
    /// The highest nonce used for a submission.
    pub last_used_nonce: Gauge,
    /// The highest confirmed nonce.
    pub last_confirmed_nonce: Gauge,
    /// The L1 block of the last posted settlement.
    pub current_settlement_l1_block: Gauge,
    /// The settlement-chain block of the last confirmation pass.
    pub last_confirmed_block: Gauge,
}
