// Queue State Projector
//
// Pure functions turning a queue record into the numbers a viewer sees.
// No I/O, no clock, no side effects.

use crate::domain::queue::{MemberId, Queue};
use crate::domain::status::QueueStatus;
use serde::{Deserialize, Serialize};

/// What a viewer remembers from their join receipt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewerTicket {
    pub member_id: MemberId,
    /// Line length (viewer included) right after the viewer joined
    pub members_at_join: u64,
}

/// Where the viewer stands in the line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Standing {
    /// No viewer identity given
    Anonymous,
    /// Viewer is still in `members`
    Waiting { position: u64, progress_percent: f64 },
    /// Viewer's member id is gone: served, removed, or never joined
    NoLongerWaiting,
}

/// Viewer-facing numbers for one queue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueProjection {
    pub people_ahead: u64,
    pub estimated_wait_minutes: u64,
    pub standing: Standing,
}

impl QueueProjection {
    pub fn position(&self) -> Option<u64> {
        match self.standing {
            Standing::Waiting { position, .. } => Some(position),
            _ => None,
        }
    }

    pub fn progress_percent(&self) -> Option<f64> {
        match self.standing {
            Standing::Waiting {
                progress_percent, ..
            } => Some(progress_percent),
            _ => None,
        }
    }
}

/// Project a queue record for an optional viewer.
pub fn project(queue: &Queue, viewer: Option<&ViewerTicket>) -> QueueProjection {
    let avg = u64::from(queue.avg_service_time);

    let Some(viewer) = viewer else {
        let people_ahead = queue.waiting_count() as u64;
        return QueueProjection {
            people_ahead,
            estimated_wait_minutes: people_ahead.saturating_mul(avg),
            standing: Standing::Anonymous,
        };
    };

    let Some(viewer_token) = queue.members.get(&viewer.member_id).map(|m| m.token) else {
        return QueueProjection {
            people_ahead: 0,
            estimated_wait_minutes: 0,
            standing: Standing::NoLongerWaiting,
        };
    };

    // Rank among remaining members ordered by token; tokens are unique
    let people_ahead = queue
        .members
        .values()
        .filter(|m| m.token < viewer_token)
        .count() as u64;
    let position = people_ahead + 1;

    QueueProjection {
        people_ahead,
        estimated_wait_minutes: people_ahead.saturating_mul(avg),
        standing: Standing::Waiting {
            position,
            progress_percent: progress_percent(viewer.members_at_join, people_ahead),
        },
    }
}

fn progress_percent(members_at_join: u64, people_ahead: u64) -> f64 {
    if members_at_join == 0 {
        return 0.0;
    }
    let total = members_at_join as f64;
    let done = total - people_ahead as f64;
    (done / total * 100.0).clamp(0.0, 100.0)
}

/// Admin dashboard figures across all queues
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoardSummary {
    pub total_queues: u64,
    pub total_waiting: u64,
    pub active_queues: u64,
    pub paused_queues: u64,
    pub closed_queues: u64,
}

pub fn summarize(queues: &[Queue]) -> BoardSummary {
    queues.iter().fold(BoardSummary::default(), |mut acc, q| {
        acc.total_queues += 1;
        acc.total_waiting += q.waiting_count() as u64;
        match q.status {
            QueueStatus::Active => acc.active_queues += 1,
            QueueStatus::Paused => acc.paused_queues += 1,
            QueueStatus::Closed => acc.closed_queues += 1,
        }
        acc
    })
}
