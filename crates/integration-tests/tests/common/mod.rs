//! Shared wiring for the end-to-end tests: real SQLite, real broker.
#![allow(dead_code)]

use sqlx::SqlitePool;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use ticketline_core::application::{QueueService, QueueStore, RetryBudget, SubscriptionBroker};
use ticketline_core::port::admin_gate::mocks::StaticGate;
use ticketline_core::port::id_provider::UuidProvider;
use ticketline_core::port::time_provider::SystemTimeProvider;
use ticketline_infra_sqlite::{create_pool, run_migrations, SqliteQueueRepository};
use tokio::sync::mpsc::UnboundedReceiver;

pub const ADMIN: StaticGate = StaticGate(true);

pub struct Harness {
    pub pool: SqlitePool,
    pub repo: Arc<SqliteQueueRepository>,
    pub store: Arc<QueueStore>,
    pub service: Arc<QueueService>,
}

async fn harness(url: &str) -> Harness {
    let pool = create_pool(url).await.unwrap();
    run_migrations(&pool).await.unwrap();

    let repo = Arc::new(SqliteQueueRepository::new(pool.clone()));
    let store = Arc::new(QueueStore::new(
        repo.clone(),
        Arc::new(SubscriptionBroker::new()),
        Arc::new(UuidProvider),
        Arc::new(SystemTimeProvider),
        // Generous budget: file-backed runs see real contention
        RetryBudget::with_max_attempts(200).unwrap(),
    ));
    store.prime().await.unwrap();
    let service = Arc::new(QueueService::new(store.clone()));

    Harness {
        pool,
        repo,
        store,
        service,
    }
}

pub async fn memory_harness() -> Harness {
    harness("sqlite::memory:").await
}

pub async fn file_harness(path: &Path) -> Harness {
    harness(&path.to_string_lossy()).await
}

/// Database file removed (with its WAL side files) on drop
pub struct TempDb {
    pub path: PathBuf,
}

impl TempDb {
    pub fn new() -> Self {
        let path = std::env::temp_dir().join(format!("ticketline-it-{}.db", uuid::Uuid::new_v4()));
        Self { path }
    }
}

impl Drop for TempDb {
    fn drop(&mut self) {
        for suffix in ["", "-wal", "-shm"] {
            let mut file = self.path.clone().into_os_string();
            file.push(suffix);
            let _ = std::fs::remove_file(file);
        }
    }
}

pub async fn recv<T>(rx: &mut UnboundedReceiver<T>) -> T {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for notification")
        .expect("notification channel closed")
}

pub async fn assert_quiet<T: std::fmt::Debug>(rx: &mut UnboundedReceiver<T>) {
    let next = tokio::time::timeout(Duration::from_millis(150), rx.recv()).await;
    assert!(next.is_err(), "unexpected notification: {:?}", next);
}
