// SQLite QueueRepository Implementation
//
// One row per queue. The `version` column carries the optimistic lock: every
// write is a single statement guarded by the version the caller read, so
// SQLite's per-statement atomicity gives us compare-and-swap.

use crate::error::map_sqlx_error;
use async_trait::async_trait;
use sqlx::SqlitePool;
use std::collections::BTreeMap;
use ticketline_core::domain::{Member, MemberId, Queue, QueueId, QueueStatus};
use ticketline_core::error::{AppError, Result};
use ticketline_core::port::{QueueRepository, Version, VersionedQueue};
use tracing::trace;

pub struct SqliteQueueRepository {
    pool: SqlitePool,
}

impl SqliteQueueRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn insert(&self, queue: &Queue) -> Result<Option<Version>> {
        let members = encode_members(queue)?;
        let result = sqlx::query(
            r#"
            INSERT INTO queues (
                id, name, avg_service_time, status,
                last_token, serving_number, members, created_at, version
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, 1)
            ON CONFLICT(id) DO NOTHING
            "#,
        )
        .bind(&queue.id)
        .bind(&queue.name)
        .bind(i64::from(queue.avg_service_time))
        .bind(queue.status.as_str())
        .bind(to_sql_counter(queue.last_token)?)
        .bind(to_sql_counter(queue.serving_number)?)
        .bind(members)
        .bind(queue.created_at)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok((result.rows_affected() == 1).then_some(1))
    }

    async fn update(&self, queue: &Queue, expected: Version) -> Result<Option<Version>> {
        let members = encode_members(queue)?;
        let result = sqlx::query(
            r#"
            UPDATE queues
            SET name = ?, avg_service_time = ?, status = ?,
                last_token = ?, serving_number = ?, members = ?,
                version = version + 1
            WHERE id = ? AND version = ?
            "#,
        )
        .bind(&queue.name)
        .bind(i64::from(queue.avg_service_time))
        .bind(queue.status.as_str())
        .bind(to_sql_counter(queue.last_token)?)
        .bind(to_sql_counter(queue.serving_number)?)
        .bind(members)
        .bind(&queue.id)
        .bind(to_sql_counter(expected)?)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok((result.rows_affected() == 1).then_some(expected + 1))
    }

    async fn remove(&self, id: &QueueId, expected: Version) -> Result<Option<Version>> {
        let result = sqlx::query("DELETE FROM queues WHERE id = ? AND version = ?")
            .bind(id)
            .bind(to_sql_counter(expected)?)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        Ok((result.rows_affected() == 1).then_some(expected + 1))
    }

    async fn exists(&self, id: &QueueId) -> Result<bool> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM queues WHERE id = ?")
            .bind(id)
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(count > 0)
    }
}

#[async_trait]
impl QueueRepository for SqliteQueueRepository {
    async fn load(&self, id: &QueueId) -> Result<Option<VersionedQueue>> {
        let row = sqlx::query_as::<_, QueueRow>("SELECT * FROM queues WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        row.map(VersionedQueue::try_from).transpose()
    }

    async fn load_all(&self) -> Result<Vec<VersionedQueue>> {
        let rows = sqlx::query_as::<_, QueueRow>("SELECT * FROM queues ORDER BY created_at, id")
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        rows.into_iter().map(VersionedQueue::try_from).collect()
    }

    async fn compare_and_swap(
        &self,
        id: &QueueId,
        expected: Option<Version>,
        next: Option<&Queue>,
    ) -> Result<Option<Version>> {
        let committed = match (expected, next) {
            (None, Some(queue)) => self.insert(queue).await?,
            (Some(version), Some(queue)) => self.update(queue, version).await?,
            (Some(version), None) => self.remove(id, version).await?,
            (None, None) => (!self.exists(id).await?).then_some(0),
        };

        if committed.is_none() {
            trace!(queue_id = %id, ?expected, "Version check failed");
        }
        Ok(committed)
    }
}

fn to_sql_counter(value: u64) -> Result<i64> {
    i64::try_from(value).map_err(|_| AppError::InvalidState(format!("counter {} out of range", value)))
}

fn encode_members(queue: &Queue) -> Result<String> {
    Ok(serde_json::to_string(&queue.members)?)
}

/// SQLite row representation
#[derive(Debug, sqlx::FromRow)]
struct QueueRow {
    id: String,
    name: String,
    avg_service_time: i64,
    status: String,
    last_token: i64,
    serving_number: i64,
    members: String,
    created_at: i64,
    version: i64,
}

fn malformed(id: &str, detail: impl std::fmt::Display) -> AppError {
    AppError::MalformedRecord(format!("queue {}: {}", id, detail))
}

impl TryFrom<QueueRow> for VersionedQueue {
    type Error = AppError;

    /// Schema-validated decoding: anything a well-behaved writer could not
    /// have produced is rejected as `MalformedRecord`
    fn try_from(row: QueueRow) -> Result<Self> {
        let id = row.id;
        let status: QueueStatus = row
            .status
            .parse()
            .map_err(|e| malformed(&id, e))?;
        let members: BTreeMap<MemberId, Member> =
            serde_json::from_str(&row.members).map_err(|e| malformed(&id, format!("members: {}", e)))?;
        let avg_service_time = u32::try_from(row.avg_service_time)
            .map_err(|_| malformed(&id, format!("avg_service_time {}", row.avg_service_time)))?;
        let last_token = u64::try_from(row.last_token)
            .map_err(|_| malformed(&id, format!("last_token {}", row.last_token)))?;
        let serving_number = u64::try_from(row.serving_number)
            .map_err(|_| malformed(&id, format!("serving_number {}", row.serving_number)))?;
        let version = u64::try_from(row.version)
            .ok()
            .filter(|v| *v > 0)
            .ok_or_else(|| malformed(&id, format!("version {}", row.version)))?;

        let queue = Queue {
            id: id.clone(),
            name: row.name,
            avg_service_time,
            status,
            last_token,
            serving_number,
            members,
            created_at: row.created_at,
        };
        queue.check_invariants().map_err(|e| malformed(&id, e))?;

        Ok(VersionedQueue { queue, version })
    }
}
