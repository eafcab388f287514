use crate::{Database, DatabaseOperations};

use preconf_oracle_primitives::{ReturnBatch, Settlement};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// The poll interval for settlement subscriptions.
const SUBSCRIPTION_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// The buffer size of subscription channels, also used as the query batch
/// size.
const SUBSCRIPTION_BUFFER: usize = 16;

impl Database {
    /// Subscribe to pending non-return settlements in insertion order.
    ///
    /// Delivery is at-least-once: rows stay pending until the consumer calls
    /// [`DatabaseOperations::settlement_initiated`], so a re-subscription
    /// resumes from the oldest still-pending row. The stream closes on
    /// shutdown or on a terminal store failure, which the consumer handles by
    /// re-subscribing.
    pub fn subscribe_settlements(&self, shutdown: CancellationToken) -> mpsc::Receiver<Settlement> {
        let (tx, rx) = mpsc::channel(SUBSCRIPTION_BUFFER);
        let db = self.clone();

        tokio::spawn(async move {
            let mut cursor = 0;
            loop {
                let batch = match db
                    .pending_settlements_after(cursor, SUBSCRIPTION_BUFFER as u64, false)
                    .await
                {
                    Ok(batch) => batch,
                    Err(err) => {
                        tracing::error!(target: "oracle::db", ?err, "settlement subscription query failed, closing stream");
                        return;
                    }
                };

                let full = batch.len() == SUBSCRIPTION_BUFFER;
                for (id, settlement) in batch {
                    if tx.send(settlement).await.is_err() {
                        return;
                    }
                    cursor = id;
                }

                if full {
                    continue;
                }

                tokio::select! {
                    _ = shutdown.cancelled() => return,
                    _ = tokio::time::sleep(SUBSCRIPTION_POLL_INTERVAL) => {}
                }
            }
        });

        rx
    }

    /// Subscribe to pending return-type settlements, batched up to
    /// `batch_size` bid identifiers per delivery.
    ///
    /// Same delivery semantics as [`Database::subscribe_settlements`].
    pub fn subscribe_returns(
        &self,
        shutdown: CancellationToken,
        batch_size: usize,
    ) -> mpsc::Receiver<ReturnBatch> {
        let (tx, rx) = mpsc::channel(SUBSCRIPTION_BUFFER);
        let db = self.clone();

        tokio::spawn(async move {
            let mut cursor = 0;
            loop {
                let batch =
                    match db.pending_settlements_after(cursor, batch_size as u64, true).await {
                        Ok(batch) => batch,
                        Err(err) => {
                            tracing::error!(target: "oracle::db", ?err, "return subscription query failed, closing stream");
                            return;
                        }
                    };

                let full = batch.len() == batch_size;
                if let Some((last_id, _)) = batch.last() {
                    let last_id = *last_id;
                    let returns = ReturnBatch {
                        commitment_indices: batch
                            .iter()
                            .map(|(_, settlement)| settlement.commitment_index)
                            .collect(),
                        bid_ids: batch.iter().map(|(_, settlement)| settlement.bid_id).collect(),
                    };
                    if tx.send(returns).await.is_err() {
                        return;
                    }
                    cursor = last_id;
                }

                if full {
                    continue;
                }

                tokio::select! {
                    _ = shutdown.cancelled() => return,
                    _ = tokio::time::sleep(SUBSCRIPTION_POLL_INTERVAL) => {}
                }
            }
        });

        rx
    }
}
