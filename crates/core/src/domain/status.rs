// Queue Status

use crate::domain::error::{DomainError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Lifecycle status of a queue.
///
/// Every status change goes through [`QueueStatus::transition_to`], which is the
/// single place that decides which moves are legal:
/// `active <-> paused`, and any status to `closed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueStatus {
    Active,
    Paused,
    Closed,
}

impl QueueStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueueStatus::Active => "active",
            QueueStatus::Paused => "paused",
            QueueStatus::Closed => "closed",
        }
    }

    /// Whether new members may join.
    pub fn accepts_members(&self) -> bool {
        matches!(self, QueueStatus::Active)
    }

    /// Validate and perform a move to `target`.
    pub fn transition_to(self, target: QueueStatus) -> Result<QueueStatus> {
        match (self, target) {
            (QueueStatus::Active, QueueStatus::Paused)
            | (QueueStatus::Paused, QueueStatus::Active)
            | (_, QueueStatus::Closed) => Ok(target),
            (from, to) if from == to => Ok(to),
            (from, to) => Err(DomainError::InvalidStatusTransition {
                from: from.to_string(),
                to: to.to_string(),
            }),
        }
    }

    /// Flip between `active` and `paused`. A closed queue cannot be toggled.
    pub fn toggled(self) -> Result<QueueStatus> {
        match self {
            QueueStatus::Active => self.transition_to(QueueStatus::Paused),
            QueueStatus::Paused => self.transition_to(QueueStatus::Active),
            QueueStatus::Closed => Err(DomainError::InvalidStatusTransition {
                from: self.to_string(),
                to: "active|paused".to_string(),
            }),
        }
    }
}

impl fmt::Display for QueueStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QueueStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "active" => Ok(QueueStatus::Active),
            "paused" => Ok(QueueStatus::Paused),
            "closed" => Ok(QueueStatus::Closed),
            other => Err(DomainError::UnknownStatus(other.to_string())),
        }
    }
}
