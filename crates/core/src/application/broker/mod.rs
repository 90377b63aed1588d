// Subscription Broker - realtime fan-out of committed queue states
//
// Every commit is published here with its storage version. The broker keeps a
// version-stamped mirror of the latest known state per queue and forwards full
// snapshots to the watchers of that queue and of the whole collection.
// Publishes older than the mirror are dropped, so per-path delivery follows
// commit order even when writers publish out of order. Ids never seen present
// are not mirrored, and only the most recent deletions are remembered.

mod dispatch;
mod handle;
mod panic_guard;

pub use handle::{SubscriptionHandle, SubscriptionId};
pub use panic_guard::{execute_guarded, PanicGuardResult};

use crate::application::constants::DEFAULT_TOMBSTONE_CAPACITY;
use crate::domain::{Queue, QueueId};
use crate::error::{AppError, Result};
use crate::port::Version;
use handle::SubscriptionControl;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc;
use tracing::{debug, trace};

/// What a subscription watches
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum WatchPath {
    Queue(QueueId),
    AllQueues,
}

/// State of a single queue as seen by a watcher
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueueSnapshot {
    Present(Queue),
    /// Nothing exists at this id (never created, or deleted)
    Absent,
}

impl QueueSnapshot {
    pub fn into_option(self) -> Option<Queue> {
        match self {
            QueueSnapshot::Present(q) => Some(q),
            QueueSnapshot::Absent => None,
        }
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, QueueSnapshot::Absent)
    }
}

impl From<Option<Queue>> for QueueSnapshot {
    fn from(queue: Option<Queue>) -> Self {
        queue.map_or(QueueSnapshot::Absent, QueueSnapshot::Present)
    }
}

/// Payload handed to a subscription callback
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Snapshot {
    Queue(QueueSnapshot),
    /// Every existing queue, ordered by creation time
    Collection(Vec<Queue>),
}

pub(crate) type Callback = Arc<dyn Fn(Snapshot) + Send + Sync>;

struct Observed {
    version: Version,
    queue: Option<Queue>,
}

struct Subscriber {
    path: WatchPath,
    tx: mpsc::UnboundedSender<Snapshot>,
}

#[derive(Default)]
pub(crate) struct BrokerState {
    records: HashMap<QueueId, Observed>,
    /// Deleted ids in deletion order, oldest first
    tombstones: VecDeque<QueueId>,
    subscribers: HashMap<SubscriptionId, Subscriber>,
}

impl BrokerState {
    fn queue_snapshot(&self, id: &QueueId) -> QueueSnapshot {
        self.records
            .get(id)
            .and_then(|o| o.queue.clone())
            .into()
    }

    fn collection(&self) -> Vec<Queue> {
        let mut queues: Vec<Queue> = self
            .records
            .values()
            .filter_map(|o| o.queue.clone())
            .collect();
        queues.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        queues
    }

    fn snapshot_for(&self, path: &WatchPath) -> Snapshot {
        match path {
            WatchPath::Queue(id) => Snapshot::Queue(self.queue_snapshot(id)),
            WatchPath::AllQueues => Snapshot::Collection(self.collection()),
        }
    }

    fn prune_tombstones(&mut self, capacity: usize) {
        while self.tombstones.len() > capacity {
            let Some(oldest) = self.tombstones.pop_front() else { break };
            if self.records.get(&oldest).is_some_and(|o| o.queue.is_none()) {
                self.records.remove(&oldest);
            }
        }
    }

    pub(crate) fn remove_subscriber(&mut self, id: SubscriptionId) -> bool {
        self.subscribers.remove(&id).is_some()
    }
}

/// Fan-out hub. Cheap to share behind an `Arc`.
pub struct SubscriptionBroker {
    state: Arc<Mutex<BrokerState>>,
    next_id: AtomicU64,
    tombstone_capacity: usize,
}

impl Default for SubscriptionBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl SubscriptionBroker {
    pub fn new() -> Self {
        Self::with_tombstone_capacity(DEFAULT_TOMBSTONE_CAPACITY)
    }

    /// Keep at most `capacity` deleted queues in the mirror
    pub fn with_tombstone_capacity(capacity: usize) -> Self {
        Self {
            state: Arc::new(Mutex::new(BrokerState::default())),
            next_id: AtomicU64::new(1),
            tombstone_capacity: capacity,
        }
    }

    /// Record a committed state and notify watchers.
    ///
    /// `queue = None` means the record is absent at `version` (deleted, or
    /// found missing by a read). Returns false when the publish was older than
    /// what the broker already holds and was dropped.
    pub fn publish(&self, id: &QueueId, version: Version, queue: Option<Queue>) -> bool {
        let mut guard = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let state = &mut *guard;

        let was_present = match state.records.get(id) {
            Some(prev) if prev.version >= version => {
                trace!(queue_id = %id, version, held = prev.version, "Dropping stale publish");
                return false;
            }
            Some(prev) => prev.queue.is_some(),
            None => false,
        };

        if !was_present && queue.is_none() {
            // Absent before and after: nothing to mirror or deliver
            if let Some(prev) = state.records.get_mut(id) {
                prev.version = version;
            }
            return true;
        }

        let deleted = queue.is_none();
        let snapshot = QueueSnapshot::from(queue.clone());
        state.records.insert(id.clone(), Observed { version, queue });
        if deleted {
            state.tombstones.push_back(id.clone());
            state.prune_tombstones(self.tombstone_capacity);
        }

        let mut collection: Option<Vec<Queue>> = None;
        let mut delivered = 0usize;
        for sub in state.subscribers.values() {
            let payload = match &sub.path {
                WatchPath::Queue(watched) if watched == id => Snapshot::Queue(snapshot.clone()),
                WatchPath::AllQueues => Snapshot::Collection(
                    collection
                        .get_or_insert_with(|| state.collection())
                        .clone(),
                ),
                WatchPath::Queue(_) => continue,
            };
            // A closed channel means the dispatcher already stopped
            if sub.tx.send(payload).is_ok() {
                delivered += 1;
            }
        }

        debug!(queue_id = %id, version, delivered, "Published snapshot");
        true
    }

    /// Watch `path`. The callback fires once right away with the current
    /// snapshot, then once per accepted publish at or under the path, in
    /// publish order, on a dedicated dispatcher task.
    ///
    /// Must be called from within a tokio runtime.
    pub fn subscribe<F>(&self, path: WatchPath, callback: F) -> Result<SubscriptionHandle>
    where
        F: Fn(Snapshot) + Send + Sync + 'static,
    {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| AppError::Internal(format!("subscribe requires a tokio runtime: {}", e)))?;

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = mpsc::unbounded_channel();
        let control = Arc::new(SubscriptionControl::new(id));

        {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            // Queued under the lock so no publish can overtake the initial snapshot
            let _ = tx.send(state.snapshot_for(&path));
            state.subscribers.insert(
                id,
                Subscriber {
                    path: path.clone(),
                    tx,
                },
            );
        }

        let callback: Callback = Arc::new(callback);
        runtime.spawn(dispatch::run(rx, Arc::clone(&control), callback));

        debug!(subscription_id = id, path = ?path, "Subscribed");
        Ok(SubscriptionHandle::new(
            id,
            path,
            control,
            Arc::downgrade(&self.state),
        ))
    }

    /// Same as [`SubscriptionHandle::unsubscribe`]
    pub fn unsubscribe(&self, handle: &SubscriptionHandle) {
        handle.unsubscribe();
    }

    pub fn subscriber_count(&self) -> usize {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .subscribers
            .len()
    }

    /// Number of ids the mirror holds, deletions included
    pub fn mirrored_count(&self) -> usize {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .records
            .len()
    }

    /// Latest state the broker holds for one queue
    pub fn current(&self, id: &QueueId) -> QueueSnapshot {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .queue_snapshot(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::OnceLock;
    use std::time::Duration;
    use tokio::sync::mpsc::UnboundedReceiver;
    use tokio::time::timeout;

    fn queue(id: &str, created_at: i64) -> Queue {
        Queue::new(id, "Desk", 5, created_at).unwrap()
    }

    fn recorder(
        broker: &SubscriptionBroker,
        path: WatchPath,
    ) -> (SubscriptionHandle, UnboundedReceiver<Snapshot>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = broker
            .subscribe(path, move |snapshot| {
                let _ = tx.send(snapshot);
            })
            .unwrap();
        (handle, rx)
    }

    async fn next(rx: &mut UnboundedReceiver<Snapshot>) -> Snapshot {
        timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("timed out waiting for snapshot")
            .expect("channel closed")
    }

    async fn assert_silent(rx: &mut UnboundedReceiver<Snapshot>) {
        assert!(timeout(Duration::from_millis(100), rx.recv()).await.is_err());
    }

    #[tokio::test]
    async fn test_initial_snapshot_for_unknown_queue_is_absent() {
        let broker = SubscriptionBroker::new();
        let (_h, mut rx) = recorder(&broker, WatchPath::Queue("q-1".into()));
        assert_eq!(next(&mut rx).await, Snapshot::Queue(QueueSnapshot::Absent));
    }

    #[tokio::test]
    async fn test_watcher_receives_commits_in_order() {
        let broker = SubscriptionBroker::new();
        let id = "q-1".to_string();
        let (_h, mut rx) = recorder(&broker, WatchPath::Queue(id.clone()));
        next(&mut rx).await;

        let mut q = queue(&id, 0);
        broker.publish(&id, 1, Some(q.clone()));
        q.admit("m-a", 1).unwrap();
        broker.publish(&id, 2, Some(q.clone()));

        let first = next(&mut rx).await;
        let second = next(&mut rx).await;
        match (first, second) {
            (
                Snapshot::Queue(QueueSnapshot::Present(a)),
                Snapshot::Queue(QueueSnapshot::Present(b)),
            ) => {
                assert_eq!(a.last_token, 0);
                assert_eq!(b.last_token, 1);
            }
            other => panic!("unexpected snapshots: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_stale_publish_is_dropped() {
        let broker = SubscriptionBroker::new();
        let id = "q-1".to_string();
        let mut q = queue(&id, 0);
        q.admit("m-a", 1).unwrap();
        let newer = q.clone();

        assert!(broker.publish(&id, 3, Some(newer.clone())));
        let (_h, mut rx) = recorder(&broker, WatchPath::Queue(id.clone()));
        next(&mut rx).await;

        assert!(!broker.publish(&id, 2, Some(queue(&id, 0))));
        assert_silent(&mut rx).await;
        assert_eq!(broker.current(&id), QueueSnapshot::Present(newer));
    }

    #[tokio::test]
    async fn test_deletion_delivers_absent() {
        let broker = SubscriptionBroker::new();
        let id = "q-1".to_string();
        broker.publish(&id, 1, Some(queue(&id, 0)));

        let (_h, mut rx) = recorder(&broker, WatchPath::Queue(id.clone()));
        assert!(matches!(
            next(&mut rx).await,
            Snapshot::Queue(QueueSnapshot::Present(_))
        ));

        broker.publish(&id, 2, None);
        assert_eq!(next(&mut rx).await, Snapshot::Queue(QueueSnapshot::Absent));
    }

    #[tokio::test]
    async fn test_collection_watcher_sees_every_queue() {
        let broker = SubscriptionBroker::new();
        let (_h, mut rx) = recorder(&broker, WatchPath::AllQueues);
        assert_eq!(next(&mut rx).await, Snapshot::Collection(vec![]));

        broker.publish(&"q-b".to_string(), 1, Some(queue("q-b", 20)));
        broker.publish(&"q-a".to_string(), 1, Some(queue("q-a", 10)));
        next(&mut rx).await;

        match next(&mut rx).await {
            Snapshot::Collection(list) => {
                let ids: Vec<_> = list.iter().map(|q| q.id.as_str()).collect();
                assert_eq!(ids, vec!["q-a", "q-b"]);
            }
            other => panic!("unexpected snapshot: {:?}", other),
        }

        broker.publish(&"q-a".to_string(), 2, None);
        match next(&mut rx).await {
            Snapshot::Collection(list) => assert_eq!(list.len(), 1),
            other => panic!("unexpected snapshot: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_other_queue_commits_are_not_delivered() {
        let broker = SubscriptionBroker::new();
        let (_h, mut rx) = recorder(&broker, WatchPath::Queue("q-1".into()));
        next(&mut rx).await;

        broker.publish(&"q-2".to_string(), 1, Some(queue("q-2", 0)));
        assert_silent(&mut rx).await;
    }

    #[tokio::test]
    async fn test_unsubscribe_stops_delivery_and_is_idempotent() {
        let broker = SubscriptionBroker::new();
        let id = "q-1".to_string();
        let (handle, mut rx) = recorder(&broker, WatchPath::Queue(id.clone()));
        next(&mut rx).await;

        handle.unsubscribe();
        handle.unsubscribe();
        broker.unsubscribe(&handle);
        assert!(!handle.is_active());
        assert_eq!(broker.subscriber_count(), 0);

        broker.publish(&id, 1, Some(queue(&id, 0)));
        // Dispatcher drops its sender once it stops, closing the channel
        let closed = timeout(Duration::from_secs(2), rx.recv()).await.unwrap();
        assert!(closed.is_none());
    }

    #[tokio::test]
    async fn test_unsubscribe_from_inside_callback() {
        let broker = SubscriptionBroker::new();
        let id = "q-1".to_string();
        let slot: Arc<OnceLock<SubscriptionHandle>> = Arc::new(OnceLock::new());
        let (tx, mut rx) = mpsc::unbounded_channel();

        let inner_slot = Arc::clone(&slot);
        let handle = broker
            .subscribe(WatchPath::Queue(id.clone()), move |snapshot| {
                let _ = tx.send(snapshot.clone());
                if let Snapshot::Queue(QueueSnapshot::Present(_)) = snapshot {
                    if let Some(h) = inner_slot.get() {
                        h.unsubscribe();
                    }
                }
            })
            .unwrap();
        let _ = slot.set(handle);

        next(&mut rx).await;
        broker.publish(&id, 1, Some(queue(&id, 0)));
        assert!(matches!(
            next(&mut rx).await,
            Snapshot::Queue(QueueSnapshot::Present(_))
        ));

        broker.publish(&id, 2, None);
        let closed = timeout(Duration::from_secs(2), rx.recv()).await.unwrap();
        assert!(closed.is_none());
    }

    #[tokio::test]
    async fn test_panicking_callback_keeps_dispatcher_alive() {
        let broker = SubscriptionBroker::new();
        let id = "q-1".to_string();
        let (tx, mut rx) = mpsc::unbounded_channel();

        let _handle = broker
            .subscribe(WatchPath::Queue(id.clone()), move |snapshot| {
                if let Snapshot::Queue(QueueSnapshot::Present(ref q)) = snapshot {
                    if q.last_token == 0 {
                        panic!("boom");
                    }
                }
                let _ = tx.send(snapshot);
            })
            .unwrap();

        next(&mut rx).await;
        let mut q = queue(&id, 0);
        broker.publish(&id, 1, Some(q.clone()));
        q.admit("m-a", 1).unwrap();
        broker.publish(&id, 2, Some(q));

        match next(&mut rx).await {
            Snapshot::Queue(QueueSnapshot::Present(q)) => assert_eq!(q.last_token, 1),
            other => panic!("unexpected snapshot: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_absent_publish_for_unseen_id_is_not_mirrored() {
        let broker = SubscriptionBroker::new();
        let (_h, mut rx) = recorder(&broker, WatchPath::AllQueues);
        next(&mut rx).await;

        for i in 0..100 {
            assert!(broker.publish(&format!("q-{}", i), 0, None));
        }
        assert_eq!(broker.mirrored_count(), 0);
        assert_silent(&mut rx).await;
    }

    #[tokio::test]
    async fn test_tombstones_are_bounded() {
        let broker = SubscriptionBroker::with_tombstone_capacity(2);
        for i in 0..5 {
            let id = format!("q-{}", i);
            broker.publish(&id, 1, Some(queue(&id, i)));
            broker.publish(&id, 2, None);
        }
        assert_eq!(broker.mirrored_count(), 2);

        // The latest deletions still shut out late publishes
        assert!(!broker.publish(&"q-4".to_string(), 1, Some(queue("q-4", 4))));
        assert!(broker.current(&"q-4".to_string()).is_absent());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_unsubscribe_waits_for_running_callback() {
        use std::sync::atomic::{AtomicBool, AtomicUsize};
        use std::sync::mpsc as std_mpsc;

        let broker = SubscriptionBroker::new();
        let id = "q-1".to_string();
        let calls = Arc::new(AtomicUsize::new(0));
        let running = Arc::new(AtomicBool::new(false));
        let (entered_tx, entered_rx) = std_mpsc::channel::<()>();
        let (release_tx, release_rx) = std_mpsc::channel::<()>();
        let entered_tx = Mutex::new(entered_tx);
        let release_rx = Mutex::new(release_rx);

        let (cb_calls, cb_running) = (Arc::clone(&calls), Arc::clone(&running));
        let handle = broker
            .subscribe(WatchPath::Queue(id.clone()), move |snapshot| {
                cb_calls.fetch_add(1, Ordering::SeqCst);
                if let Snapshot::Queue(QueueSnapshot::Present(_)) = snapshot {
                    cb_running.store(true, Ordering::SeqCst);
                    let _ = entered_tx.lock().unwrap().send(());
                    let _ = release_rx.lock().unwrap().recv();
                    cb_running.store(false, Ordering::SeqCst);
                }
            })
            .unwrap();

        broker.publish(&id, 1, Some(queue(&id, 0)));
        tokio::task::spawn_blocking(move || entered_rx.recv_timeout(Duration::from_secs(2)))
            .await
            .unwrap()
            .expect("callback never started");

        let unsubscriber = {
            let handle = handle.clone();
            let running = Arc::clone(&running);
            tokio::task::spawn_blocking(move || {
                handle.unsubscribe();
                running.load(Ordering::SeqCst)
            })
        };

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!unsubscriber.is_finished(), "unsubscribe returned mid-callback");

        release_tx.send(()).unwrap();
        let still_running = timeout(Duration::from_secs(2), unsubscriber)
            .await
            .unwrap()
            .unwrap();
        assert!(!still_running);

        let seen = calls.load(Ordering::SeqCst);
        broker.publish(&id, 2, None);
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(calls.load(Ordering::SeqCst), seen);
        assert!(!handle.is_active());
    }

    #[test]
    fn test_subscribe_outside_runtime_is_an_error() {
        let broker = SubscriptionBroker::new();
        let result = broker.subscribe(WatchPath::AllQueues, |_| {});
        assert!(matches!(result, Err(AppError::Internal(_))));
    }
}
