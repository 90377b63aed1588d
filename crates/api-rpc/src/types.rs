//! RPC Request/Response Types
//!
//! Method parameters and results. Queue records are returned in their stored
//! shape (camelCase); everything else on the wire is snake_case.

use serde::{Deserialize, Serialize};
use ticketline_core::application::{JoinReceipt, QueueSnapshot};
use ticketline_core::domain::{Queue, QueueStatus, ServeOutcome};

/// queue.create.v1
#[derive(Debug, Deserialize)]
pub struct CreateQueueRequest {
    pub name: String,
    pub avg_service_time: i64,
    #[serde(default)]
    pub admin_token: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateQueueResponse {
    pub queue_id: String,
}

/// queue.join.v1, queue.get.v1, queue.watch.v1
#[derive(Debug, Deserialize)]
pub struct QueueRequest {
    pub queue_id: String,
}

/// queue.serve_next.v1, queue.toggle_pause.v1, queue.close.v1, queue.delete.v1
#[derive(Debug, Deserialize)]
pub struct AdminQueueRequest {
    pub queue_id: String,
    #[serde(default)]
    pub admin_token: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoinResponse {
    pub queue_id: String,
    pub member_id: String,
    pub token: u64,
    pub members_at_join: u64,
}

impl From<JoinReceipt> for JoinResponse {
    fn from(r: JoinReceipt) -> Self {
        Self {
            queue_id: r.queue_id,
            member_id: r.member_id,
            token: r.token,
            members_at_join: r.members_at_join,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServeNextResponse {
    pub queue_id: String,
    pub advanced: bool,
    pub serving_number: u64,
    pub dequeued_member_id: Option<String>,
}

impl ServeNextResponse {
    pub fn new(queue_id: String, outcome: ServeOutcome) -> Self {
        Self {
            queue_id,
            advanced: outcome.advanced,
            serving_number: outcome.serving_number,
            dequeued_member_id: outcome.dequeued,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub queue_id: String,
    pub status: QueueStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteResponse {
    pub queue_id: String,
    pub deleted: bool,
}

/// queue.view.v1 - both viewer fields come from the join receipt
#[derive(Debug, Deserialize)]
pub struct ViewQueueRequest {
    pub queue_id: String,
    #[serde(default)]
    pub member_id: Option<String>,
    #[serde(default)]
    pub members_at_join: Option<u64>,
}

/// admin.stats.v1
#[derive(Debug, Deserialize)]
pub struct StatsRequest {
    #[serde(default)]
    pub admin_token: Option<String>,
}

/// Payload of a `queue.snapshot` notification; `queue` is null once the
/// queue no longer exists
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotNotification {
    pub queue_id: String,
    pub exists: bool,
    pub queue: Option<Queue>,
}

impl SnapshotNotification {
    pub fn new(queue_id: &str, snapshot: QueueSnapshot) -> Self {
        let queue = snapshot.into_option();
        Self {
            queue_id: queue_id.to_string(),
            exists: queue.is_some(),
            queue,
        }
    }
}
