use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::warn;

use pitstop_types::error::ChatError;
use pitstop_types::events::StoreEvent;
use pitstop_types::models::{ChatMessage, Identity, RosterRecord, ThreadId};

use crate::policy;
use crate::store::ThreadStore;

/// Handle to an active push subscription. Cancelling stops delivery and
/// releases the task; it is idempotent, and dropping the handle cancels
/// too, so a disconnected client can never leak its subscription.
#[derive(Debug)]
pub struct Subscription {
    task: JoinHandle<()>,
    cancelled: AtomicBool,
}

impl Subscription {
    fn new(task: JoinHandle<()>) -> Self {
        Self {
            task,
            cancelled: AtomicBool::new(false),
        }
    }

    pub fn cancel(&self) {
        if !self.cancelled.swap(true, Ordering::SeqCst) {
            self.task.abort();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Push-based delivery of thread snapshots to active subscribers.
///
/// Each subscription runs its own task fed by the store's change channel,
/// so a slow subscriber never blocks another. The change receiver is
/// registered before the initial snapshot read: nothing can slip between
/// "load history" and "start listening".
#[derive(Clone)]
pub struct LiveFeed {
    store: ThreadStore,
}

impl LiveFeed {
    pub fn new(store: ThreadStore) -> Self {
        Self { store }
    }

    /// Authorization is checked once, here. A role change mid-subscription
    /// is not re-checked; the subscription lives until cancelled.
    pub fn subscribe<F>(
        &self,
        subscriber: &Identity,
        thread_id: ThreadId,
        on_update: F,
    ) -> Result<Subscription, ChatError>
    where
        F: Fn(Vec<ChatMessage>) + Send + Sync + 'static,
    {
        policy::authorize_read(subscriber, thread_id)?;

        let mut changes = self.store.subscribe_changes();
        let store = self.store.clone();

        let task = tokio::spawn(async move {
            deliver_thread(&store, thread_id, &on_update).await;

            loop {
                match changes.recv().await {
                    Ok(StoreEvent::ThreadChanged { thread_id: changed }) => {
                        if changed == thread_id {
                            deliver_thread(&store, thread_id, &on_update).await;
                        }
                    }
                    Err(RecvError::Lagged(n)) => {
                        // Snapshots coalesce: the next delivery is still
                        // complete and in order.
                        warn!("Thread feed for {} lagged by {} events", thread_id, n);
                        deliver_thread(&store, thread_id, &on_update).await;
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        });

        Ok(Subscription::new(task))
    }
}

async fn deliver_thread<F>(store: &ThreadStore, thread_id: ThreadId, on_update: &F)
where
    F: Fn(Vec<ChatMessage>),
{
    match store.snapshot(thread_id).await {
        Ok(messages) => on_update(messages),
        // Transient; the next change event triggers another read.
        Err(e) => warn!("Snapshot read for thread {} failed: {}", thread_id, e),
    }
}

/// Staff dashboard feed: the full roster, most recent activity first,
/// re-delivered whenever any thread changes.
#[derive(Clone)]
pub struct RosterAggregator {
    store: ThreadStore,
}

impl RosterAggregator {
    pub fn new(store: ThreadStore) -> Self {
        Self { store }
    }

    pub fn subscribe<F>(
        &self,
        subscriber: &Identity,
        on_update: F,
    ) -> Result<Subscription, ChatError>
    where
        F: Fn(Vec<RosterRecord>) + Send + Sync + 'static,
    {
        policy::authorize_roster(subscriber)?;

        let mut changes = self.store.subscribe_changes();
        let store = self.store.clone();

        let task = tokio::spawn(async move {
            deliver_roster(&store, &on_update).await;

            loop {
                match changes.recv().await {
                    // Any append moves some thread in the ordering.
                    Ok(StoreEvent::ThreadChanged { .. }) => {
                        deliver_roster(&store, &on_update).await;
                    }
                    Err(RecvError::Lagged(n)) => {
                        warn!("Roster feed lagged by {} events", n);
                        deliver_roster(&store, &on_update).await;
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        });

        Ok(Subscription::new(task))
    }
}

async fn deliver_roster<F>(store: &ThreadStore, on_update: &F)
where
    F: Fn(Vec<RosterRecord>),
{
    match store.roster_snapshot().await {
        Ok(records) => on_update(records),
        Err(e) => warn!("Roster snapshot read failed: {}", e),
    }
}
