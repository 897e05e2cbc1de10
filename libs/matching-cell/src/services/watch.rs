use std::collections::HashMap;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::task::{Context, Poll};

use futures::Stream;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, warn};

use crate::models::{Party, RelationshipSnapshot};

/// Snapshots a subscriber may have queued before it is considered stalled.
pub const SUBSCRIBER_BUFFER: usize = 32;

type SnapshotSender = mpsc::Sender<RelationshipSnapshot>;

struct Subscriber {
    party: Party,
    sender: SnapshotSender,
}

/// Live relationship subscriptions, keyed by subscription id.
///
/// Publishing happens while the ledger holds its commit lock, so every subscriber
/// sees snapshots in commit order. Each subscriber gets a bounded buffer; one that
/// falls `capacity` snapshots behind is dropped rather than buffered without limit.
pub(crate) struct SubscriberRegistry {
    next_id: AtomicU64,
    capacity: usize,
    subscribers: Mutex<HashMap<u64, Subscriber>>,
}

impl Default for SubscriberRegistry {
    fn default() -> Self {
        Self::with_capacity(SUBSCRIBER_BUFFER)
    }
}

impl SubscriberRegistry {
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self {
            next_id: AtomicU64::new(0),
            capacity: capacity.max(1),
            subscribers: Mutex::new(HashMap::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<u64, Subscriber>> {
        self.subscribers.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Register a subscriber and queue its first snapshot before any later commit can.
    pub(crate) fn register(self: &Arc<Self>, party: Party, initial: RelationshipSnapshot) -> RelationshipStream {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (sender, receiver) = mpsc::channel(self.capacity);

        // The buffer is empty and the receiver alive, so this cannot fail.
        let _ = sender.try_send(initial);
        self.lock().insert(id, Subscriber { party, sender });

        debug!("Subscription {} opened for {}", id, party);

        RelationshipStream {
            id,
            party,
            receiver,
            cancelled: Arc::new(AtomicBool::new(false)),
            registry: Arc::downgrade(self),
        }
    }

    pub(crate) fn has_subscribers(&self, party: &Party) -> bool {
        self.lock().values().any(|s| &s.party == party)
    }

    pub(crate) fn publish(&self, snapshot: &RelationshipSnapshot) {
        let mut subscribers = self.lock();

        // Receivers dropped without deregistering are pruned here. Dropping the sender of
        // a full buffer lets that consumer drain what it has and then see the end.
        subscribers.retain(|id, subscriber| {
            if subscriber.party != snapshot.party {
                return true;
            }
            match subscriber.sender.try_send(snapshot.clone()) {
                Ok(()) => true,
                Err(TrySendError::Full(_)) => {
                    warn!(
                        "Subscription {} for {} fell {} snapshots behind, closing it",
                        id, subscriber.party, self.capacity
                    );
                    false
                }
                Err(TrySendError::Closed(_)) => {
                    debug!("Pruning closed subscription {}", id);
                    false
                }
            }
        });
    }

    /// End every subscription of a party. Consumers see the end of their stream once
    /// their buffers are drained and are expected to watch again.
    pub(crate) fn close_party(&self, party: &Party) {
        let mut subscribers = self.lock();
        let before = subscribers.len();
        subscribers.retain(|_, subscriber| &subscriber.party != party);
        let closed = before - subscribers.len();
        if closed > 0 {
            warn!("Closed {} subscriptions for {}", closed, party);
        }
    }

    fn remove(&self, id: u64) {
        if self.lock().remove(&id).is_some() {
            debug!("Subscription {} closed", id);
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.lock().len()
    }
}

/// Push stream of [`RelationshipSnapshot`]s for one party.
///
/// Yields the snapshot current at subscription time, then one snapshot per committed
/// transition involving the party, in commit order. After [`cancel`](Self::cancel), a
/// [`WatchCancel::cancel`], or drop, it yields nothing more and its registry slot is
/// released. The ledger ends a stream itself when its consumer falls too far behind or
/// a snapshot cannot be read; watching again starts a fresh stream.
pub struct RelationshipStream {
    id: u64,
    party: Party,
    receiver: mpsc::Receiver<RelationshipSnapshot>,
    cancelled: Arc<AtomicBool>,
    registry: Weak<SubscriberRegistry>,
}

impl RelationshipStream {
    pub fn party(&self) -> Party {
        self.party
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Stop the subscription. Buffered snapshots are discarded.
    pub fn cancel(&mut self) {
        self.cancel_handle().cancel();
        self.receiver.close();
    }

    /// A handle that can cancel this stream from another task.
    pub fn cancel_handle(&self) -> WatchCancel {
        WatchCancel {
            id: self.id,
            cancelled: self.cancelled.clone(),
            registry: self.registry.clone(),
        }
    }
}

impl Stream for RelationshipStream {
    type Item = RelationshipSnapshot;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        if this.is_cancelled() {
            return Poll::Ready(None);
        }

        match this.receiver.poll_recv(cx) {
            Poll::Ready(Some(_)) if this.is_cancelled() => Poll::Ready(None),
            other => other,
        }
    }
}

impl Drop for RelationshipStream {
    fn drop(&mut self) {
        self.cancel_handle().cancel();
    }
}

/// Detached cancellation handle for a [`RelationshipStream`].
#[derive(Clone)]
pub struct WatchCancel {
    id: u64,
    cancelled: Arc<AtomicBool>,
    registry: Weak<SubscriberRegistry>,
}

impl WatchCancel {
    /// Idempotent. Removing the registry entry drops the sender, which wakes a
    /// consumer parked on the stream.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        if let Some(registry) = self.registry.upgrade() {
            registry.remove(self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use futures::StreamExt;
    use uuid::Uuid;

    fn snapshot(party: Party, sequence: u64) -> RelationshipSnapshot {
        RelationshipSnapshot {
            party,
            sequence,
            requests: Vec::new(),
            observed_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_publish_reaches_only_matching_party() {
        let registry = Arc::new(SubscriberRegistry::default());
        let patient = Party::Patient(Uuid::new_v4());
        let other = Party::Patient(Uuid::new_v4());

        let mut stream = registry.register(patient, snapshot(patient, 0));
        let mut other_stream = registry.register(other, snapshot(other, 0));

        registry.publish(&snapshot(patient, 1));

        assert_eq!(stream.next().await.map(|s| s.sequence), Some(0));
        assert_eq!(stream.next().await.map(|s| s.sequence), Some(1));
        assert_eq!(other_stream.next().await.map(|s| s.sequence), Some(0));
        assert!(tokio::time::timeout(std::time::Duration::from_millis(50), other_stream.next())
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_cancel_discards_buffered_snapshots() {
        let registry = Arc::new(SubscriberRegistry::default());
        let party = Party::Doctor(Uuid::new_v4());

        let mut stream = registry.register(party, snapshot(party, 0));
        registry.publish(&snapshot(party, 1));
        stream.cancel();

        assert!(stream.next().await.is_none());
        assert_eq!(registry.len(), 0);
        assert!(!registry.has_subscribers(&party));
    }

    #[tokio::test]
    async fn test_drop_releases_registry_slot() {
        let registry = Arc::new(SubscriberRegistry::default());
        let party = Party::Patient(Uuid::new_v4());

        let stream = registry.register(party, snapshot(party, 0));
        assert_eq!(registry.len(), 1);
        drop(stream);
        assert_eq!(registry.len(), 0);
    }

    #[test]
    fn test_stream_parks_until_publish() {
        let registry = Arc::new(SubscriberRegistry::default());
        let party = Party::Doctor(Uuid::new_v4());
        let mut stream = registry.register(party, snapshot(party, 0));

        let mut next = tokio_test::task::spawn(stream.next());
        assert!(matches!(tokio_test::assert_ready!(next.poll()), Some(s) if s.sequence == 0));
        drop(next);

        let mut next = tokio_test::task::spawn(stream.next());
        tokio_test::assert_pending!(next.poll());

        registry.publish(&snapshot(party, 1));
        assert!(next.is_woken());
        assert!(matches!(tokio_test::assert_ready!(next.poll()), Some(s) if s.sequence == 1));
    }

    #[tokio::test]
    async fn test_lagging_subscriber_is_dropped_after_draining() {
        let registry = Arc::new(SubscriberRegistry::with_capacity(2));
        let slow = Party::Doctor(Uuid::new_v4());

        let mut stream = registry.register(slow, snapshot(slow, 0));
        registry.publish(&snapshot(slow, 1));
        assert_eq!(registry.len(), 1);

        // Buffer holds 0 and 1; the third snapshot overflows it.
        registry.publish(&snapshot(slow, 2));
        assert_eq!(registry.len(), 0);
        assert!(!registry.has_subscribers(&slow));

        assert_eq!(stream.next().await.map(|s| s.sequence), Some(0));
        assert_eq!(stream.next().await.map(|s| s.sequence), Some(1));
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn test_close_party_ends_only_that_party() {
        let registry = Arc::new(SubscriberRegistry::default());
        let closed = Party::Patient(Uuid::new_v4());
        let kept = Party::Doctor(Uuid::new_v4());

        let mut closed_stream = registry.register(closed, snapshot(closed, 0));
        let _kept_stream = registry.register(kept, snapshot(kept, 0));

        registry.close_party(&closed);

        assert_eq!(closed_stream.next().await.map(|s| s.sequence), Some(0));
        assert!(closed_stream.next().await.is_none());
        assert!(registry.has_subscribers(&kept));
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn test_cancel_handle_wakes_parked_consumer() {
        let registry = Arc::new(SubscriberRegistry::default());
        let party = Party::Patient(Uuid::new_v4());

        let mut stream = registry.register(party, snapshot(party, 0));
        let handle = stream.cancel_handle();
        assert!(stream.next().await.is_some());

        let consumer = tokio::spawn(async move { stream.next().await });
        tokio::task::yield_now().await;
        handle.cancel();

        let result = tokio::time::timeout(std::time::Duration::from_secs(1), consumer)
            .await
            .expect("consumer woke up")
            .unwrap();
        assert!(result.is_none());
    }
}
