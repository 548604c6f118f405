//! In-tree integration tests for the workers module

use pgtemp::PgTempDB;
use serde_json::json;

use crate::{
    DEFAULT_POOL_SIZE, MetadataDb,
    workers::{self, WorkerRegistration},
};

#[tokio::test]
async fn register_stores_identity_and_starts_active() {
    //* Given
    let temp_db = PgTempDB::new();
    let db = MetadataDb::connect_with_retry(&temp_db.connection_uri(), DEFAULT_POOL_SIZE)
        .await
        .expect("Failed to connect to metadata db");

    let job = json!({ "once": ["Index"], "per_genome": ["Annotate:pfam"] });
    let registration = WorkerRegistration {
        host: "node-7",
        pid: 4242,
        address: Some("10.0.0.7:8080"),
        job: &job,
    };

    //* When
    let worker_id = workers::register(&db, &registration)
        .await
        .expect("Failed to register worker");

    //* Then
    let worker = workers::get_by_id(&db, worker_id)
        .await
        .expect("Failed to get worker")
        .expect("Worker should exist");
    assert_eq!(worker.host, "node-7");
    assert_eq!(worker.pid, 4242);
    assert_eq!(worker.address.as_deref(), Some("10.0.0.7:8080"));
    assert_eq!(worker.job, job);
    assert!(worker.active);
    assert!(!worker.normal_exit);
    assert!(worker.finished_at.is_none());
}

#[tokio::test]
async fn finish_records_final_state_exactly_once() {
    //* Given
    let temp_db = PgTempDB::new();
    let db = MetadataDb::connect_with_retry(&temp_db.connection_uri(), DEFAULT_POOL_SIZE)
        .await
        .expect("Failed to connect to metadata db");

    let job = json!({});
    let worker_id = workers::register(
        &db,
        &WorkerRegistration {
            host: "node-1",
            pid: 1,
            address: None,
            job: &job,
        },
    )
    .await
    .expect("Failed to register worker");

    //* When
    let first = workers::finish(&db, worker_id, false, Some("module Annotate failed"))
        .await
        .expect("Failed to finish worker");
    let second = workers::finish(&db, worker_id, true, None)
        .await
        .expect("Failed to finish worker twice");

    //* Then
    assert!(first, "first finish should update the row");
    assert!(!second, "second finish should be a no-op");

    let worker = workers::get_by_id(&db, worker_id)
        .await
        .expect("Failed to get worker")
        .expect("Worker should exist");
    assert!(!worker.active);
    assert!(!worker.normal_exit);
    assert_eq!(
        worker.error_message.as_deref(),
        Some("module Annotate failed")
    );
    assert!(worker.finished_at.is_some());

    let failed = workers::list_failed(&db)
        .await
        .expect("Failed to list failed workers");
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].id, worker_id);
}
