// Port Layer - Interfaces for external dependencies

pub mod admin_gate;
pub mod id_provider; // For deterministic testing
pub mod queue_repository;
pub mod time_provider;

// Re-exports
pub use admin_gate::AdminGate;
pub use id_provider::IdProvider;
pub use queue_repository::{QueueRepository, Version, VersionedQueue};
pub use time_provider::TimeProvider;
