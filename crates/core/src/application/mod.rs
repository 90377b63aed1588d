// Application Layer - Use Cases and Business Logic

pub mod broker;
pub mod constants;
pub mod queue_service;
pub mod queue_store;
pub mod ticket_counter;

// Re-exports
pub use broker::{QueueSnapshot, Snapshot, SubscriptionBroker, SubscriptionHandle, WatchPath};
pub use queue_service::QueueService;
pub use queue_store::{JoinReceipt, QueueStore};
pub use ticket_counter::{Committed, RetryBudget, TicketCounter};
