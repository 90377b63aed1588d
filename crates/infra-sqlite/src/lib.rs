// Ticketline Infrastructure - SQLite Adapter
// Implements: QueueRepository (versioned compare-and-swap)

mod connection;
mod error;
mod migration;
mod queue_repository;

pub use connection::create_pool;
pub use migration::run_migrations;
pub use queue_repository::SqliteQueueRepository;

// sqlx::Error conversion lives in `error::map_sqlx_error` because of the
// orphan rule (no From<sqlx::Error> for AppError outside core)
