// Ticket Counter - atomic read-transform-CAS over a single queue record

use crate::application::constants::{
    BACKOFF_JITTER_RATIO, DEFAULT_BASE_BACKOFF, DEFAULT_MAX_ATTEMPTS, DEFAULT_MAX_BACKOFF,
};
use crate::domain::{Queue, QueueId};
use crate::error::{AppError, Result};
use crate::port::{QueueRepository, Version};
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Bounded retry policy for lost compare-and-swap races
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryBudget {
    pub max_attempts: u32,
    pub base_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryBudget {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_backoff: DEFAULT_BASE_BACKOFF,
            max_backoff: DEFAULT_MAX_BACKOFF,
        }
    }
}

impl RetryBudget {
    /// Default backoff with a custom attempt count.
    ///
    /// # Errors
    /// `InvalidInput` when `max_attempts` is 0: a budget must allow at least
    /// one attempt.
    pub fn with_max_attempts(max_attempts: u32) -> Result<Self> {
        if max_attempts == 0 {
            return Err(AppError::InvalidInput(
                "retry budget needs at least one attempt".to_string(),
            ));
        }
        Ok(Self {
            max_attempts,
            ..Self::default()
        })
    }

    /// Backoff after the given failed attempt (1-based), without jitter:
    /// base * 2^(attempt - 1), capped at `max_backoff`.
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(16);
        self.base_backoff
            .saturating_mul(1u32 << exp)
            .min(self.max_backoff)
    }

    fn jittered_backoff_for(&self, attempt: u32) -> Duration {
        let delay = self.backoff_for(attempt);
        // Spread racing writers apart so they do not collide again in lockstep
        let jitter = rand::thread_rng().gen_range(0.0..=BACKOFF_JITTER_RATIO);
        delay.mul_f64(1.0 + jitter)
    }
}

/// The single durable write made by a successful `transact` call
#[derive(Debug, Clone)]
pub struct Committed<T> {
    /// Record after the commit (`None` when the transition deleted it)
    pub record: Option<Queue>,
    /// Version of the committed state (0 when nothing existed before or after)
    pub version: Version,
    /// Value computed by the transition on the winning attempt
    pub output: T,
    /// Attempts used, including the winning one
    pub attempts: u32,
}

/// Applies pure transition functions to queue records with retry-on-conflict.
///
/// This is the only way a queue record is mutated. Every attempt reads the
/// latest committed record, runs the transition on it, and writes the result
/// only if nobody committed in between. A lost race discards the attempt and
/// starts over from a fresh read.
pub struct TicketCounter {
    repo: Arc<dyn QueueRepository>,
    budget: RetryBudget,
}

impl TicketCounter {
    pub fn new(repo: Arc<dyn QueueRepository>, budget: RetryBudget) -> Self {
        Self { repo, budget }
    }

    pub fn budget(&self) -> RetryBudget {
        self.budget
    }

    /// Run `transition` against the record stored under `id`.
    ///
    /// `transition` receives the current record (or `None`) and returns the
    /// next record (or `None` to delete) plus an output value. It may be called
    /// several times and must be deterministic for a given input. Returning an
    /// `Err` aborts immediately: no retry, no write.
    ///
    /// # Errors
    /// - whatever `transition` returns
    /// - `InvalidState` if the proposed record breaks queue invariants
    /// - `Conflict` once the retry budget is exhausted
    pub async fn transact<T, F>(&self, id: &QueueId, transition: F) -> Result<Committed<T>>
    where
        F: Fn(Option<&Queue>) -> Result<(Option<Queue>, T)> + Send + Sync,
        T: Send,
    {
        for attempt in 1..=self.budget.max_attempts {
            let current = self.repo.load(id).await?;
            let expected = current.as_ref().map(|v| v.version);
            let current_queue = current.as_ref().map(|v| &v.queue);

            let (next, output) = transition(current_queue)?;
            verify_transition(id, current_queue, next.as_ref())?;

            if expected.is_none() && next.is_none() {
                // Absent stays absent: nothing to write
                return Ok(Committed {
                    record: None,
                    version: 0,
                    output,
                    attempts: attempt,
                });
            }

            match self
                .repo
                .compare_and_swap(id, expected, next.as_ref())
                .await?
            {
                Some(version) => {
                    debug!(queue_id = %id, version, attempt, "Transition committed");
                    return Ok(Committed {
                        record: next,
                        version,
                        output,
                        attempts: attempt,
                    });
                }
                None => {
                    debug!(
                        queue_id = %id,
                        attempt,
                        expected_version = ?expected,
                        "Lost write race, retrying with fresh read"
                    );
                    if attempt < self.budget.max_attempts {
                        tokio::time::sleep(self.budget.jittered_backoff_for(attempt)).await;
                    }
                }
            }
        }

        warn!(
            queue_id = %id,
            max_attempts = self.budget.max_attempts,
            "Retry budget exhausted"
        );
        Err(AppError::Conflict(format!(
            "Queue {} was modified concurrently {} times in a row",
            id, self.budget.max_attempts
        )))
    }
}

fn verify_transition(id: &QueueId, current: Option<&Queue>, next: Option<&Queue>) -> Result<()> {
    let Some(next) = next else {
        return Ok(());
    };

    if &next.id != id {
        return Err(AppError::InvalidState(format!(
            "transition for {} produced record {}",
            id, next.id
        )));
    }
    next.check_invariants()?;
    if let Some(current) = current {
        current.check_successor(next)?;
    }
    Ok(())
}
