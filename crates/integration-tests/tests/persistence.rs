//! State survives a restart; bad rows are reported, not guessed at

mod common;

use common::{file_harness, memory_harness, TempDb, ADMIN};
use ticketline_core::domain::QueueStatus;
use ticketline_core::error::AppError;
use ticketline_core::port::QueueRepository;

#[tokio::test]
async fn test_queue_state_survives_restart() {
    let db = TempDb::new();

    let (id, kept_member) = {
        let h = file_harness(&db.path).await;
        let id = h.service.create_queue(&ADMIN, "Pharmacy", 7).await.unwrap();
        h.service.join_queue(&id).await.unwrap();
        let second = h.service.join_queue(&id).await.unwrap();
        h.service.serve_next(&ADMIN, &id).await.unwrap();
        h.service.toggle_pause(&ADMIN, &id).await.unwrap();
        h.pool.close().await;
        (id, second.member_id)
    };

    let h = file_harness(&db.path).await;
    let queue = h.service.get_queue(&id).await.unwrap();
    assert_eq!(queue.name, "Pharmacy");
    assert_eq!(queue.avg_service_time, 7);
    assert_eq!(queue.status, QueueStatus::Paused);
    assert_eq!(queue.last_token, 2);
    assert_eq!(queue.serving_number, 1);
    assert_eq!(queue.members.len(), 1);
    assert_eq!(queue.members[&kept_member].token, 2);

    // Counters continue where they stopped
    h.service.toggle_pause(&ADMIN, &id).await.unwrap();
    assert_eq!(h.service.join_queue(&id).await.unwrap().token, 3);

    // Five commits before the restart, two after
    let stored = h.repo.load(&id).await.unwrap().unwrap();
    assert_eq!(stored.version, 7);
}

#[tokio::test]
async fn test_list_after_restart_keeps_creation_order() {
    let db = TempDb::new();

    let created = {
        let h = file_harness(&db.path).await;
        let mut ids = Vec::new();
        for name in ["first", "second", "third"] {
            ids.push(h.service.create_queue(&ADMIN, name, 5).await.unwrap());
            tokio::time::sleep(std::time::Duration::from_millis(3)).await;
        }
        h.pool.close().await;
        ids
    };

    let h = file_harness(&db.path).await;
    let listed: Vec<_> = h
        .service
        .list_queues()
        .await
        .unwrap()
        .into_iter()
        .map(|q| q.id)
        .collect();
    assert_eq!(listed, created);
}

#[tokio::test]
async fn test_malformed_row_surfaces_as_error() {
    let h = memory_harness().await;
    sqlx::query(
        "INSERT INTO queues (id, name, avg_service_time, status, last_token, serving_number, members, created_at, version)
         VALUES ('q-bad', 'Bad', 5, 'active', 1, 3, '{}', 0, 1)",
    )
    .execute(&h.pool)
    .await
    .unwrap();

    let err = h.service.get_queue(&"q-bad".to_string()).await.unwrap_err();
    assert!(matches!(err, AppError::MalformedRecord(_)));

    // A bad record aborts writes too, without touching the row
    let err = h.service.join_queue(&"q-bad".to_string()).await.unwrap_err();
    assert!(matches!(err, AppError::MalformedRecord(_)));
}
