//! Connection Fan-out Manager.
//!
//! Tracks, per job, the set of WebSocket connections subscribed to its
//! progress and at most one relay task bridging the job's broker channel
//! to them. The relay exists only while the set is non-empty.
//!
//! Each job entry sits behind its own async mutex. `connect` creates the
//! relay while holding that mutex, so concurrent connects for the same job
//! cannot start two. An entry that has been torn down is marked `retired`
//! and unlinked from the table before its mutex is released; callers that
//! raced onto a retired entry look it up again.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use axum::body::Bytes;
use axum::extract::ws::Message;
use pinrelay_core::channels::job_channel;
use pinrelay_core::types::JobId;
use pinrelay_events::{BrokerError, ChannelBroker, Subscription};
use tokio::sync::{mpsc, Mutex as AsyncMutex, OwnedMutexGuard};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Channel sender half for pushing messages to a WebSocket connection.
pub type WsSender = mpsc::UnboundedSender<Message>;

type EntryRef = Arc<AsyncMutex<JobEntry>>;
type JobTable = Mutex<HashMap<JobId, EntryRef>>;

#[derive(Default)]
struct JobEntry {
    subscribers: HashMap<String, WsSender>,
    relay: Option<RelayHandle>,
    /// Set once the entry has been unlinked from the table.
    retired: bool,
}

struct RelayHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
    generation: u64,
}

impl RelayHandle {
    fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    /// Cancel the relay and wait until it has dropped its subscription.
    async fn stop(self) {
        self.cancel.cancel();
        if let Err(e) = self.task.await {
            if e.is_panic() {
                tracing::error!(generation = self.generation, "Relay task panicked");
            }
        }
    }
}

pub struct FanoutManager {
    broker: Arc<dyn ChannelBroker>,
    jobs: Arc<JobTable>,
    next_generation: AtomicU64,
}

impl FanoutManager {
    pub fn new(broker: Arc<dyn ChannelBroker>) -> Self {
        Self {
            broker,
            jobs: Arc::new(Mutex::new(HashMap::new())),
            next_generation: AtomicU64::new(1),
        }
    }

    /// Register `conn_id` as a subscriber of `job_id`.
    ///
    /// The connection is deliverable as soon as this returns: if no relay
    /// is running for the job, one is subscribed before returning. A relay
    /// that died with its subscription is replaced here.
    pub async fn connect(
        &self,
        job_id: JobId,
        conn_id: &str,
    ) -> Result<mpsc::UnboundedReceiver<Message>, BrokerError> {
        let (tx, rx) = mpsc::unbounded_channel();
        let (entry, mut state) = self.live_entry(job_id).await;
        state.subscribers.insert(conn_id.to_string(), tx);

        let needs_relay = !state.relay.as_ref().is_some_and(RelayHandle::is_running);
        if needs_relay {
            match self.broker.subscribe(&job_channel(job_id)).await {
                Ok(subscription) => {
                    state.relay = Some(self.spawn_relay(job_id, &entry, subscription));
                }
                Err(e) => {
                    tracing::error!(%job_id, error = %e, "Failed to subscribe relay");
                    state.subscribers.remove(conn_id);
                    if state.subscribers.is_empty() {
                        // A relay slot here can only hold a finished task.
                        drop(retire(&self.jobs, job_id, &entry, &mut state));
                    }
                    return Err(e);
                }
            }
        }

        tracing::debug!(
            %job_id,
            conn_id,
            subscribers = state.subscribers.len(),
            "Connection subscribed",
        );
        Ok(rx)
    }

    /// Remove `conn_id` from the job's subscribers.
    ///
    /// When the last subscriber leaves, the relay is stopped and its broker
    /// subscription released before this returns.
    pub async fn disconnect(&self, job_id: JobId, conn_id: &str) {
        let Some(entry) = self.lookup(job_id) else {
            return;
        };

        let relay = {
            let mut state = entry.lock().await;
            if state.subscribers.remove(conn_id).is_none() || !state.subscribers.is_empty() {
                return;
            }
            retire(&self.jobs, job_id, &entry, &mut state)
        };

        if let Some(relay) = relay {
            relay.stop().await;
        }
        tracing::debug!(%job_id, conn_id, "Last connection left, relay torn down");
    }

    /// Send a Ping frame to every connection.
    pub async fn ping_all(&self) {
        for entry in self.entries() {
            let state = entry.lock().await;
            for sender in state.subscribers.values() {
                let _ = sender.send(Message::Ping(Bytes::new()));
            }
        }
    }

    /// Send a Close frame to every connection and tear down every relay.
    pub async fn shutdown_all(&self) {
        let entries: Vec<EntryRef> = {
            let mut jobs = self.jobs.lock().unwrap_or_else(PoisonError::into_inner);
            jobs.drain().map(|(_, entry)| entry).collect()
        };

        let mut count = 0;
        let mut relays = Vec::new();
        for entry in entries {
            let mut state = entry.lock().await;
            for sender in state.subscribers.values() {
                let _ = sender.send(Message::Close(None));
            }
            count += state.subscribers.len();
            state.subscribers.clear();
            state.retired = true;
            relays.extend(state.relay.take());
        }

        let relay_count = relays.len();
        futures::future::join_all(relays.into_iter().map(RelayHandle::stop)).await;
        tracing::info!(count, relay_count, "Closed all WebSocket connections");
    }

    /// Total number of subscribed connections across all jobs.
    pub async fn connection_count(&self) -> usize {
        let mut count = 0;
        for entry in self.entries() {
            count += entry.lock().await.subscribers.len();
        }
        count
    }

    /// Number of jobs with a running relay.
    pub async fn relay_count(&self) -> usize {
        let mut count = 0;
        for entry in self.entries() {
            if entry.lock().await.relay.as_ref().is_some_and(RelayHandle::is_running) {
                count += 1;
            }
        }
        count
    }

    pub async fn has_relay(&self, job_id: JobId) -> bool {
        match self.lookup(job_id) {
            Some(entry) => entry.lock().await.relay.as_ref().is_some_and(RelayHandle::is_running),
            None => false,
        }
    }

    pub async fn subscriber_count(&self, job_id: JobId) -> usize {
        match self.lookup(job_id) {
            Some(entry) => entry.lock().await.subscribers.len(),
            None => 0,
        }
    }

    fn lookup(&self, job_id: JobId) -> Option<EntryRef> {
        self.jobs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&job_id)
            .cloned()
    }

    fn entries(&self) -> Vec<EntryRef> {
        self.jobs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }

    /// Lock the job's entry, creating it if needed and skipping entries
    /// retired while we waited for the lock.
    async fn live_entry(&self, job_id: JobId) -> (EntryRef, OwnedMutexGuard<JobEntry>) {
        loop {
            let entry = Arc::clone(
                self.jobs
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .entry(job_id)
                    .or_default(),
            );
            let state = Arc::clone(&entry).lock_owned().await;
            if !state.retired {
                return (entry, state);
            }
        }
    }

    fn spawn_relay(&self, job_id: JobId, entry: &EntryRef, subscription: Subscription) -> RelayHandle {
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let cancel = CancellationToken::new();
        let relay = Relay {
            job_id,
            generation,
            entry: Arc::clone(entry),
            jobs: Arc::clone(&self.jobs),
        };
        let task = tokio::spawn(relay.run(subscription, cancel.clone()));
        tracing::debug!(%job_id, generation, "Relay started");
        RelayHandle {
            cancel,
            task,
            generation,
        }
    }
}

/// Mark `state` retired, unlink it from the table and hand back its relay.
///
/// Must be called with the entry's lock held.
fn retire(
    jobs: &JobTable,
    job_id: JobId,
    entry: &EntryRef,
    state: &mut JobEntry,
) -> Option<RelayHandle> {
    state.retired = true;
    let mut jobs = jobs.lock().unwrap_or_else(PoisonError::into_inner);
    if jobs.get(&job_id).is_some_and(|current| Arc::ptr_eq(current, entry)) {
        jobs.remove(&job_id);
    }
    state.relay.take()
}

struct Relay {
    job_id: JobId,
    generation: u64,
    entry: EntryRef,
    jobs: Arc<JobTable>,
}

impl Relay {
    async fn run(self, mut subscription: Subscription, cancel: CancellationToken) {
        let job_id = self.job_id;
        loop {
            let received = tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                received = subscription.recv() => received,
            };

            match received {
                Ok(payload) => {
                    if !self.fan_out(payload).await {
                        break;
                    }
                }
                Err(e) => {
                    tracing::warn!(%job_id, error = %e, "Relay subscription ended");
                    let mut state = self.entry.lock().await;
                    if state
                        .relay
                        .as_ref()
                        .is_some_and(|relay| relay.generation == self.generation)
                    {
                        state.relay = None;
                    }
                    break;
                }
            }
        }
        drop(subscription);
        tracing::debug!(%job_id, generation = self.generation, "Relay stopped");
    }

    /// Deliver one payload to every subscriber. Returns `false` once the
    /// relay has no one left to serve.
    async fn fan_out(&self, payload: String) -> bool {
        let mut state = self.entry.lock().await;
        if state.retired {
            return false;
        }

        let message = Message::Text(payload.into());
        let job_id = self.job_id;
        state.subscribers.retain(|conn_id, sender| {
            let delivered = sender.send(message.clone()).is_ok();
            if !delivered {
                tracing::debug!(%job_id, conn_id = %conn_id, "Dropping closed connection");
            }
            delivered
        });

        if state.subscribers.is_empty() {
            // Our own handle; dropping it detaches without aborting.
            drop(retire(&self.jobs, job_id, &self.entry, &mut state));
            return false;
        }
        true
    }
}
