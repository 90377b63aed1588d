// Queue Store - CRUD and ticketing on top of TicketCounter
//
// Every mutation is a TicketCounter transition; every commit is published to
// the broker with its storage version. Commit and publish run together on a
// spawned task, so a caller that goes away mid-call cannot leave watchers
// behind storage.

use crate::application::broker::{QueueSnapshot, Snapshot, SubscriptionBroker, SubscriptionHandle, WatchPath};
use crate::application::ticket_counter::{Committed, RetryBudget, TicketCounter};
use crate::domain::{MemberId, Queue, QueueId, QueueStatus, ServeOutcome, Token};
use crate::error::{AppError, Result};
use crate::port::{IdProvider, QueueRepository, TimeProvider};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error, info};

/// What a successful join hands back to the new member
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinReceipt {
    pub queue_id: QueueId,
    pub member_id: MemberId,
    pub token: Token,
    /// Member count right after this member was admitted
    pub members_at_join: u64,
}

pub struct QueueStore {
    counter: Arc<TicketCounter>,
    repo: Arc<dyn QueueRepository>,
    broker: Arc<SubscriptionBroker>,
    ids: Arc<dyn IdProvider>,
    clock: Arc<dyn TimeProvider>,
}

fn not_found(id: &QueueId) -> AppError {
    AppError::NotFound(format!("queue {}", id))
}

impl QueueStore {
    pub fn new(
        repo: Arc<dyn QueueRepository>,
        broker: Arc<SubscriptionBroker>,
        ids: Arc<dyn IdProvider>,
        clock: Arc<dyn TimeProvider>,
        budget: RetryBudget,
    ) -> Self {
        Self {
            counter: Arc::new(TicketCounter::new(Arc::clone(&repo), budget)),
            repo,
            broker,
            ids,
            clock,
        }
    }

    pub fn broker(&self) -> &Arc<SubscriptionBroker> {
        &self.broker
    }

    /// Run `transition` through the counter and publish the result.
    ///
    /// Both steps happen on a detached task. Dropping the returned future
    /// stops the wait, not the work: a commit that lands is always published.
    async fn commit<T, F>(&self, id: &QueueId, transition: F) -> Result<Committed<T>>
    where
        F: Fn(Option<&Queue>) -> Result<(Option<Queue>, T)> + Send + Sync + 'static,
        T: Send + 'static,
    {
        let counter = Arc::clone(&self.counter);
        let broker = Arc::clone(&self.broker);
        let id = id.clone();

        let task = tokio::spawn(async move {
            let committed = counter.transact(&id, transition).await?;
            broker.publish(&id, committed.version, committed.record.clone());
            Ok::<_, AppError>(committed)
        });

        task.await.map_err(|e| {
            error!(error = %e, "Commit task failed");
            AppError::Internal(format!("commit task failed: {}", e))
        })?
    }

    /// Create an active queue with zeroed counters and return its id
    pub async fn create(&self, name: &str, avg_service_time: i64) -> Result<QueueId> {
        let id = self.ids.generate_id();
        let draft = Queue::new(id.clone(), name, avg_service_time, self.clock.now_millis())?;
        let (name, avg_service_time) = (draft.name.clone(), draft.avg_service_time);

        let taken = id.clone();
        self.commit(&id, move |current| match current {
            Some(_) => Err(AppError::Conflict(format!("queue id {} already taken", taken))),
            None => Ok((Some(draft.clone()), ())),
        })
        .await?;

        info!(queue_id = %id, name = %name, avg_service_time, "Queue created");
        Ok(id)
    }

    /// Admit a new member under a fresh member id.
    ///
    /// The member id and join time are fixed for the call; the token is
    /// recomputed from whichever record the winning attempt read.
    pub async fn join(&self, id: &QueueId) -> Result<JoinReceipt> {
        let member_id = self.ids.generate_id();
        let now = self.clock.now_millis();

        let queue_id = id.clone();
        let admitted = member_id.clone();
        let committed = self
            .commit(id, move |current| {
                let mut queue = current.cloned().ok_or_else(|| not_found(&queue_id))?;
                let token = queue.admit(admitted.clone(), now)?;
                let members_at_join = queue.members.len() as u64;
                Ok((Some(queue), (token, members_at_join)))
            })
            .await?;

        let (token, members_at_join) = committed.output;
        debug!(queue_id = %id, member_id = %member_id, token, attempts = committed.attempts, "Member joined");
        Ok(JoinReceipt {
            queue_id: id.clone(),
            member_id,
            token,
            members_at_join,
        })
    }

    /// Move the serving pointer forward by one, dropping the member who holds
    /// that token. A queue with nobody left to serve reports `advanced = false`.
    pub async fn serve_next(&self, id: &QueueId) -> Result<ServeOutcome> {
        let queue_id = id.clone();
        let committed = self
            .commit(id, move |current| {
                let mut queue = current.cloned().ok_or_else(|| not_found(&queue_id))?;
                let outcome = queue.advance();
                Ok((Some(queue), outcome))
            })
            .await?;

        let outcome = committed.output;
        info!(
            queue_id = %id,
            serving_number = outcome.serving_number,
            advanced = outcome.advanced,
            "Serve next"
        );
        Ok(outcome)
    }

    /// active <-> paused
    pub async fn toggle_pause(&self, id: &QueueId) -> Result<QueueStatus> {
        self.set_status(id, "toggle_pause", |queue| Ok(queue.toggle_pause()?))
            .await
    }

    pub async fn close(&self, id: &QueueId) -> Result<QueueStatus> {
        self.set_status(id, "close", |queue| Ok(queue.close()?)).await
    }

    async fn set_status<F>(&self, id: &QueueId, operation: &str, change: F) -> Result<QueueStatus>
    where
        F: Fn(&mut Queue) -> Result<QueueStatus> + Send + Sync + 'static,
    {
        let queue_id = id.clone();
        let committed = self
            .commit(id, move |current| {
                let mut queue = current.cloned().ok_or_else(|| not_found(&queue_id))?;
                let status = change(&mut queue)?;
                Ok((Some(queue), status))
            })
            .await?;

        info!(queue_id = %id, operation, status = %committed.output, "Queue status changed");
        Ok(committed.output)
    }

    /// Remove the record. Watchers of the queue receive an absent snapshot.
    pub async fn delete(&self, id: &QueueId) -> Result<()> {
        let queue_id = id.clone();
        let committed = self
            .commit(id, move |current| match current {
                Some(_) => Ok((None, ())),
                None => Err(not_found(&queue_id)),
            })
            .await?;

        info!(queue_id = %id, version = committed.version, "Queue deleted");
        Ok(())
    }

    /// Read straight from the repository
    pub async fn get(&self, id: &QueueId) -> Result<Queue> {
        self.repo
            .load(id)
            .await?
            .map(|v| v.queue)
            .ok_or_else(|| not_found(id))
    }

    /// All queues, oldest first
    pub async fn list(&self) -> Result<Vec<Queue>> {
        Ok(self
            .repo
            .load_all()
            .await?
            .into_iter()
            .map(|v| v.queue)
            .collect())
    }

    /// Publish every stored record so the broker mirror reflects storage.
    /// Returns how many records were loaded.
    pub async fn prime(&self) -> Result<usize> {
        let records = self.repo.load_all().await?;
        let count = records.len();
        for record in records {
            let id = record.queue.id.clone();
            self.broker.publish(&id, record.version, Some(record.queue));
        }
        debug!(count, "Broker primed from storage");
        Ok(count)
    }

    async fn refresh(&self, id: &QueueId) -> Result<()> {
        // A missing record has nothing to mirror
        if let Some(record) = self.repo.load(id).await? {
            self.broker.publish(id, record.version, Some(record.queue));
        }
        Ok(())
    }

    /// Watch one queue. The first callback carries the stored state.
    pub async fn watch<F>(&self, id: &QueueId, on_snapshot: F) -> Result<SubscriptionHandle>
    where
        F: Fn(QueueSnapshot) + Send + Sync + 'static,
    {
        self.refresh(id).await?;
        self.broker
            .subscribe(WatchPath::Queue(id.clone()), move |snapshot| {
                if let Snapshot::Queue(s) = snapshot {
                    on_snapshot(s);
                }
            })
    }

    /// Watch the whole collection
    pub async fn watch_all<F>(&self, on_snapshot_list: F) -> Result<SubscriptionHandle>
    where
        F: Fn(Vec<Queue>) + Send + Sync + 'static,
    {
        self.prime().await?;
        self.broker.subscribe(WatchPath::AllQueues, move |snapshot| {
            if let Snapshot::Collection(list) = snapshot {
                on_snapshot_list(list);
            }
        })
    }
}
