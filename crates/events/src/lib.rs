//! The event manager: a single settlement-chain log subscription multiplexed
//! into typed handler callbacks.

mod client;
pub use client::{EthLogClient, LogClient};

mod error;
pub use error::EventManagerError;

use alloy_primitives::B256;
use alloy_rpc_types_eth::{Filter, Log};
use preconf_oracle_db::{Database, DatabaseOperations};
use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};
use tokio::{sync::mpsc, task::JoinHandle};
use tokio_util::sync::CancellationToken;

/// The poll interval once the manager is caught up with the settlement-chain
/// head.
const POLL_INTERVAL: Duration = Duration::from_secs(2);

/// The initial reconnect backoff after an RPC failure.
const INITIAL_BACKOFF: Duration = Duration::from_secs(1);

/// The maximum reconnect backoff.
const MAX_BACKOFF: Duration = Duration::from_secs(60);

/// The number of blocks re-scanned after a reconnect to bound reorg catch-up
/// work.
const REORG_WINDOW: u64 = 256;

/// The log query block range.
const LOG_QUERY_BLOCK_RANGE: u64 = 500;

/// The buffer size of subscription error channels.
const ERROR_CHANNEL_BUFFER: usize = 4;

/// A typed callback bound to one event signature.
///
/// Handlers are expected to decode the log themselves (the signature hash is
/// known from the `sol!` event type) and to keep the callback cheap; heavy
/// work belongs on the other side of a channel.
#[async_trait::async_trait]
pub trait EventHandler: Send + Sync + 'static {
    /// The Solidity name of the handled event.
    fn event_name(&self) -> &'static str;

    /// The topic0 this handler is bound to.
    fn signature_hash(&self) -> B256;

    /// Handle a single decoded log. Errors are logged and the log is
    /// skipped; one bad event does not kill the stream.
    async fn handle(&self, log: &Log) -> Result<(), EventManagerError>;
}

struct Binding {
    id: usize,
    topic: B256,
    event: &'static str,
    handler: Arc<dyn EventHandler>,
    errors: mpsc::Sender<EventManagerError>,
}

#[derive(Default)]
struct Registry {
    bindings: Mutex<Vec<Binding>>,
    next_id: AtomicUsize,
}

/// A handle to a registered handler. Dropping it removes the binding.
pub struct Subscription {
    id: usize,
    errors: mpsc::Receiver<EventManagerError>,
    registry: Arc<Registry>,
}

impl Subscription {
    /// Receive the next transport fault surfaced by the manager.
    pub async fn recv_error(&mut self) -> Option<EventManagerError> {
        self.errors.recv().await
    }

    /// Remove the binding.
    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.registry.bindings.lock().expect("lock poisoned").retain(|b| b.id != self.id);
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}

/// The event manager. Polls the settlement chain for logs of the registered
/// contracts and dispatches them to handlers in block-number then log-index
/// order.
pub struct EventManager<C> {
    client: C,
    db: Database,
    addresses: Vec<alloy_primitives::Address>,
    registry: Arc<Registry>,
}

impl<C> std::fmt::Debug for EventManager<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventManager").field("addresses", &self.addresses).finish()
    }
}

impl<C> EventManager<C>
where
    C: LogClient + Clone + 'static,
{
    /// Creates a new manager over the provided client, store and contract
    /// addresses.
    pub fn new(client: C, db: Database, addresses: Vec<alloy_primitives::Address>) -> Self {
        Self { client, db, addresses, registry: Arc::new(Registry::default()) }
    }

    /// Register a handler. The returned [`Subscription`] surfaces transport
    /// faults on its error channel and removes the binding on drop.
    pub fn subscribe(&self, handler: Arc<dyn EventHandler>) -> Subscription {
        let id = self.registry.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(ERROR_CHANNEL_BUFFER);
        let binding = Binding {
            id,
            topic: handler.signature_hash(),
            event: handler.event_name(),
            handler,
            errors: tx,
        };
        tracing::debug!(target: "oracle::events", event = binding.event, topic = %binding.topic, "handler subscribed");
        self.registry.bindings.lock().expect("lock poisoned").push(binding);
        Subscription { id, errors: rx, registry: self.registry.clone() }
    }

    /// Spawn the poll loop. The loop resumes from the persisted progress,
    /// bounded to the last [`REORG_WINDOW`] blocks, and re-resolves its start
    /// block after every reconnect.
    pub fn start(&self, shutdown: CancellationToken) -> JoinHandle<()> {
        let manager = Self {
            client: self.client.clone(),
            db: self.db.clone(),
            addresses: self.addresses.clone(),
            registry: self.registry.clone(),
        };
        tokio::spawn(manager.run(shutdown))
    }

    async fn run(self, shutdown: CancellationToken) {
        let mut from_block = None;
        let mut backoff = INITIAL_BACKOFF;
        loop {
            if shutdown.is_cancelled() {
                break;
            }
            let delay = match self.step(&mut from_block).await {
                Ok(()) => {
                    backoff = INITIAL_BACKOFF;
                    POLL_INTERVAL
                }
                Err(err) => {
                    tracing::warn!(target: "oracle::events", ?err, "log poll failed, backing off");
                    self.notify_subscribers(&err);
                    // Re-resolve the start block on reconnect.
                    from_block = None;
                    let delay = backoff;
                    backoff = (backoff * 2).min(MAX_BACKOFF);
                    delay
                }
            };
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }
        tracing::info!(target: "oracle::events", "event manager stopped");
    }

    async fn step(&self, from_block: &mut Option<u64>) -> Result<(), EventManagerError> {
        let topics = self.topics();
        if topics.is_empty() {
            return Ok(());
        }

        let head = self.client.block_number().await?;
        let start = match *from_block {
            Some(block) => block,
            None => {
                let lower = head.saturating_sub(REORG_WINDOW);
                match self.db.settlement_progress().await? {
                    Some(processed) => (processed + 1).max(lower),
                    None => lower,
                }
            }
        };
        if start > head {
            return Ok(());
        }
        let to = head.min(start.saturating_add(LOG_QUERY_BLOCK_RANGE - 1));

        let filter = Filter::new()
            .address(self.addresses.clone())
            .event_signature(topics)
            .from_block(start)
            .to_block(to);
        let logs = self.client.logs(&filter).await?;

        tracing::trace!(target: "oracle::events", start, to, count = logs.len(), "dispatching logs");
        for log in &logs {
            self.dispatch(log).await;
        }

        self.db.set_settlement_progress(to).await?;
        *from_block = Some(to + 1);
        Ok(())
    }

    async fn dispatch(&self, log: &Log) {
        let Some(topic) = log.topics().first().copied() else {
            return;
        };
        let handlers = {
            let bindings = self.registry.bindings.lock().expect("lock poisoned");
            bindings
                .iter()
                .filter(|b| b.topic == topic)
                .map(|b| (b.event, b.handler.clone()))
                .collect::<Vec<_>>()
        };
        for (event, handler) in handlers {
            if let Err(err) = handler.handle(log).await {
                tracing::error!(target: "oracle::events", ?err, event, "event handler failed, skipping log");
            }
        }
    }

    fn topics(&self) -> Vec<B256> {
        let bindings = self.registry.bindings.lock().expect("lock poisoned");
        let mut topics = bindings.iter().map(|b| b.topic).collect::<Vec<_>>();
        topics.sort_unstable();
        topics.dedup();
        topics
    }

    fn notify_subscribers(&self, err: &EventManagerError) {
        let bindings = self.registry.bindings.lock().expect("lock poisoned");
        for binding in bindings.iter() {
            let _ = binding.errors.try_send(EventManagerError::Transport(err.to_string()));
        }
    }
}
