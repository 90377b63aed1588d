// Queue Service - boundary facade used by adapters
//
// Adds the admin check and the read-side projection on top of QueueStore.

use crate::application::broker::{QueueSnapshot, SubscriptionHandle};
use crate::application::queue_store::{JoinReceipt, QueueStore};
use crate::domain::{
    project, summarize, BoardSummary, Queue, QueueId, QueueProjection, QueueStatus, ServeOutcome,
    ViewerTicket,
};
use crate::error::{AppError, Result};
use crate::port::AdminGate;
use std::sync::Arc;
use tracing::warn;

pub struct QueueService {
    store: Arc<QueueStore>,
}

fn require_admin(gate: &dyn AdminGate, operation: &'static str) -> Result<()> {
    if gate.is_authorized() {
        return Ok(());
    }
    warn!(operation, "Refused admin operation");
    Err(AppError::Unauthorized(format!(
        "{} requires admin rights",
        operation
    )))
}

impl QueueService {
    pub fn new(store: Arc<QueueStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<QueueStore> {
        &self.store
    }

    pub async fn create_queue(
        &self,
        gate: &dyn AdminGate,
        name: &str,
        avg_service_time: i64,
    ) -> Result<QueueId> {
        require_admin(gate, "create_queue")?;
        self.store.create(name, avg_service_time).await
    }

    pub async fn join_queue(&self, id: &QueueId) -> Result<JoinReceipt> {
        self.store.join(id).await
    }

    pub async fn serve_next(&self, gate: &dyn AdminGate, id: &QueueId) -> Result<ServeOutcome> {
        require_admin(gate, "serve_next")?;
        self.store.serve_next(id).await
    }

    pub async fn toggle_pause(&self, gate: &dyn AdminGate, id: &QueueId) -> Result<QueueStatus> {
        require_admin(gate, "toggle_pause")?;
        self.store.toggle_pause(id).await
    }

    pub async fn close_queue(&self, gate: &dyn AdminGate, id: &QueueId) -> Result<QueueStatus> {
        require_admin(gate, "close_queue")?;
        self.store.close(id).await
    }

    pub async fn delete_queue(&self, gate: &dyn AdminGate, id: &QueueId) -> Result<()> {
        require_admin(gate, "delete_queue")?;
        self.store.delete(id).await
    }

    pub async fn get_queue(&self, id: &QueueId) -> Result<Queue> {
        self.store.get(id).await
    }

    pub async fn list_queues(&self) -> Result<Vec<Queue>> {
        self.store.list().await
    }

    /// Wait-time view of a queue, personalised when `viewer` is given
    pub async fn view_queue(
        &self,
        id: &QueueId,
        viewer: Option<&ViewerTicket>,
    ) -> Result<QueueProjection> {
        let queue = self.store.get(id).await?;
        Ok(project(&queue, viewer))
    }

    pub async fn watch_queue<F>(&self, id: &QueueId, on_snapshot: F) -> Result<SubscriptionHandle>
    where
        F: Fn(QueueSnapshot) + Send + Sync + 'static,
    {
        self.store.watch(id, on_snapshot).await
    }

    pub async fn watch_all_queues<F>(&self, on_snapshot_list: F) -> Result<SubscriptionHandle>
    where
        F: Fn(Vec<Queue>) + Send + Sync + 'static,
    {
        self.store.watch_all(on_snapshot_list).await
    }

    pub fn unwatch(&self, handle: &SubscriptionHandle) {
        handle.unsubscribe();
    }

    pub async fn board_summary(&self, gate: &dyn AdminGate) -> Result<BoardSummary> {
        require_admin(gate, "board_summary")?;
        let queues = self.store.list().await?;
        Ok(summarize(&queues))
    }
}
