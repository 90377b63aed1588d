// Application constants (No magic values)
use std::time::Duration;

/// Default number of attempts TicketCounter makes before reporting Conflict
pub const DEFAULT_MAX_ATTEMPTS: u32 = 10;

/// Backoff before the second attempt (5ms), doubled on every further attempt
pub const DEFAULT_BASE_BACKOFF: Duration = Duration::from_millis(5);

/// Ceiling for a single backoff sleep (250ms)
pub const DEFAULT_MAX_BACKOFF: Duration = Duration::from_millis(250);

/// Upper bound of the random jitter, as a fraction of the computed delay
pub const BACKOFF_JITTER_RATIO: f64 = 0.5;

/// Deleted queues the broker remembers, so late publishes cannot resurrect them
pub const DEFAULT_TOMBSTONE_CAPACITY: usize = 1024;
