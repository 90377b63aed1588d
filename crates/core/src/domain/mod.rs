// Domain Layer - Pure business logic and entities

pub mod error;
pub mod projection;
pub mod queue;
pub mod status;

// Re-exports
pub use error::DomainError;
pub use projection::{project, summarize, BoardSummary, QueueProjection, Standing, ViewerTicket};
pub use queue::{Member, MemberId, Queue, QueueId, ServeOutcome, Token};
pub use status::QueueStatus;
