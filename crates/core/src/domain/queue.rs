// Queue Domain Model

use crate::domain::error::{DomainError, Result};
use crate::domain::status::QueueStatus;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

/// Queue identifier (UUID v4)
pub type QueueId = String;

/// Member identifier, unique within one queue
pub type MemberId = String;

/// Sequential ticket number handed out at join time
pub type Token = u64;

/// Longest accepted display name (characters, after trimming)
pub const MAX_NAME_LEN: usize = 120;

/// Upper bound for the average service time (one day, in minutes)
pub const MAX_AVG_SERVICE_TIME: u32 = 24 * 60;

/// A member waiting in a queue
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Member {
    pub joined_at: i64, // epoch ms
    pub token: Token,
}

/// Result of advancing the serving pointer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServeOutcome {
    /// False when nobody was left behind the pointer (no-op)
    pub advanced: bool,
    pub serving_number: Token,
    /// Member removed from the line, if one held the new serving token
    pub dequeued: Option<MemberId>,
}

/// Queue Entity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Queue {
    pub id: QueueId,
    pub name: String,
    /// Minutes per member, used only for wait estimation
    pub avg_service_time: u32,
    pub status: QueueStatus,
    pub last_token: Token,
    pub serving_number: Token,
    #[serde(default)]
    pub members: BTreeMap<MemberId, Member>,
    pub created_at: i64, // epoch ms
}

impl Queue {
    /// Create a new active queue with zeroed counters.
    ///
    /// # Arguments
    ///
    /// * `id` - Unique queue ID (injected, not generated)
    /// * `name` - Display label, trimmed; must not be empty
    /// * `avg_service_time` - Minutes per member, `1..=MAX_AVG_SERVICE_TIME`
    /// * `created_at` - Creation timestamp in epoch ms (injected, not system time)
    pub fn new(
        id: impl Into<String>,
        name: &str,
        avg_service_time: i64,
        created_at: i64,
    ) -> Result<Self> {
        let name = validate_name(name)?;
        let avg_service_time = validate_avg_service_time(avg_service_time)?;

        Ok(Self {
            id: id.into(),
            name,
            avg_service_time,
            status: QueueStatus::Active,
            last_token: 0,
            serving_number: 0,
            members: BTreeMap::new(),
            created_at,
        })
    }

    /// Admit a new member and hand out the next token.
    ///
    /// The token is always derived from the current `last_token`, so calling
    /// this on a freshly read record after a lost race yields a fresh token.
    pub fn admit(&mut self, member_id: impl Into<String>, joined_at: i64) -> Result<Token> {
        if !self.status.accepts_members() {
            return Err(DomainError::QueueNotAccepting {
                status: self.status.to_string(),
            });
        }

        let member_id = member_id.into();
        if self.members.contains_key(&member_id) {
            return Err(DomainError::InvariantViolated(format!(
                "member {} already in queue {}",
                member_id, self.id
            )));
        }

        let token = self.last_token + 1;
        self.members.insert(member_id, Member { joined_at, token });
        self.last_token = token;
        Ok(token)
    }

    /// Advance the serving pointer by one and dequeue the member holding the
    /// new serving token. No-op when the pointer already reached `last_token`.
    pub fn advance(&mut self) -> ServeOutcome {
        if self.serving_number >= self.last_token {
            return ServeOutcome {
                advanced: false,
                serving_number: self.serving_number,
                dequeued: None,
            };
        }

        self.serving_number += 1;
        let serving = self.serving_number;
        let dequeued = self
            .members
            .iter()
            .find(|(_, m)| m.token == serving)
            .map(|(id, _)| id.clone());

        if let Some(id) = &dequeued {
            self.members.remove(id);
        }

        ServeOutcome {
            advanced: true,
            serving_number: serving,
            dequeued,
        }
    }

    /// Flip between active and paused.
    pub fn toggle_pause(&mut self) -> Result<QueueStatus> {
        self.status = self.status.toggled()?;
        Ok(self.status)
    }

    /// Close the queue for good.
    pub fn close(&mut self) -> Result<QueueStatus> {
        self.status = self.status.transition_to(QueueStatus::Closed)?;
        Ok(self.status)
    }

    /// Members sorted by token ascending (front of the line first)
    pub fn members_in_line(&self) -> Vec<(&MemberId, &Member)> {
        let mut line: Vec<_> = self.members.iter().collect();
        line.sort_by_key(|(_, m)| m.token);
        line
    }

    pub fn waiting_count(&self) -> usize {
        self.members.len()
    }

    /// Check the record-level invariants (tokens distinct, positive and
    /// bounded by `last_token`; serving pointer bounded by `last_token`).
    pub fn check_invariants(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(DomainError::InvariantViolated("empty name".to_string()));
        }
        if self.avg_service_time == 0 {
            return Err(DomainError::InvariantViolated(
                "avgServiceTime must be positive".to_string(),
            ));
        }
        if self.serving_number > self.last_token {
            return Err(DomainError::InvariantViolated(format!(
                "servingNumber {} exceeds lastToken {}",
                self.serving_number, self.last_token
            )));
        }

        let mut seen = HashSet::with_capacity(self.members.len());
        for (member_id, member) in &self.members {
            if member.token == 0 || member.token > self.last_token {
                return Err(DomainError::InvariantViolated(format!(
                    "member {} holds token {} outside 1..={}",
                    member_id, member.token, self.last_token
                )));
            }
            if !seen.insert(member.token) {
                return Err(DomainError::InvariantViolated(format!(
                    "token {} issued twice",
                    member.token
                )));
            }
        }

        Ok(())
    }

    /// Check that `next` is a legal successor of `self`: same identity,
    /// counters never move backwards.
    pub fn check_successor(&self, next: &Queue) -> Result<()> {
        if next.id != self.id || next.created_at != self.created_at {
            return Err(DomainError::InvariantViolated(
                "queue identity changed".to_string(),
            ));
        }
        if next.last_token < self.last_token {
            return Err(DomainError::InvariantViolated(format!(
                "lastToken moved backwards: {} -> {}",
                self.last_token, next.last_token
            )));
        }
        if next.serving_number < self.serving_number {
            return Err(DomainError::InvariantViolated(format!(
                "servingNumber moved backwards: {} -> {}",
                self.serving_number, next.serving_number
            )));
        }
        Ok(())
    }
}

fn validate_name(name: &str) -> Result<String> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(DomainError::InvalidInput(
            "Queue name cannot be empty".to_string(),
        ));
    }
    if trimmed.chars().count() > MAX_NAME_LEN {
        return Err(DomainError::InvalidInput(format!(
            "Queue name too long (max {} characters)",
            MAX_NAME_LEN
        )));
    }
    Ok(trimmed.to_string())
}

fn validate_avg_service_time(minutes: i64) -> Result<u32> {
    if minutes <= 0 {
        return Err(DomainError::InvalidInput(format!(
            "avgServiceTime must be positive, got {}",
            minutes
        )));
    }
    if minutes > i64::from(MAX_AVG_SERVICE_TIME) {
        return Err(DomainError::InvalidInput(format!(
            "avgServiceTime out of range (1-{}), got {}",
            MAX_AVG_SERVICE_TIME, minutes
        )));
    }
    // Bounded above, cannot truncate
    Ok(minutes as u32)
}
