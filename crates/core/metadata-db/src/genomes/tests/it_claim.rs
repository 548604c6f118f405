//! In-tree integration tests for the claim protocol

use std::collections::HashSet;

use pgtemp::PgTempDB;
use serde_json::json;

use crate::{
    DEFAULT_POOL_SIZE, MetadataDb, ProgressState,
    genomes::{self, ClaimFilter},
    progress,
    workers::{self, WorkerId, WorkerRegistration},
};

async fn register_worker(db: &MetadataDb, pid: u32) -> WorkerId {
    let job = json!({ "per_genome": ["Annotate"] });
    workers::register(
        db,
        &WorkerRegistration {
            host: "test-host",
            pid,
            address: None,
            job: &job,
        },
    )
    .await
    .expect("Failed to register worker")
}

fn filter_for(modules: &[&str]) -> ClaimFilter {
    ClaimFilter {
        expected_modules: modules.iter().map(|m| m.to_string()).collect(),
        ..Default::default()
    }
}

#[tokio::test]
async fn concurrent_claims_never_share_a_genome() {
    //* Given
    let temp_db = PgTempDB::new();
    let db = MetadataDb::connect_with_retry(&temp_db.connection_uri(), DEFAULT_POOL_SIZE)
        .await
        .expect("Failed to connect to metadata db");

    for name in ["g1", "g2", "g3"] {
        genomes::register(&db, name)
            .await
            .expect("Failed to register genome");
    }

    let mut owners = Vec::new();
    for pid in 1..=5 {
        owners.push(register_worker(&db, pid).await);
    }

    //* When
    let handles = owners
        .iter()
        .map(|&owner| {
            let db = db.clone();
            tokio::spawn(async move {
                genomes::claim_next(&db, owner, &filter_for(&["Annotate"])).await
            })
        })
        .collect::<Vec<_>>();

    let mut claimed = Vec::new();
    for handle in handles {
        let result = handle
            .await
            .expect("Claim task panicked")
            .expect("Failed to claim genome");
        claimed.push(result);
    }

    //* Then
    let won: Vec<_> = claimed.iter().flatten().copied().collect();
    let distinct: HashSet<_> = won.iter().copied().collect();
    assert_eq!(won.len(), 3, "exactly three claims should succeed");
    assert_eq!(distinct.len(), 3, "every claimed genome should be distinct");
    assert_eq!(
        claimed.iter().filter(|c| c.is_none()).count(),
        2,
        "two claims should find no work"
    );

    for owner in owners {
        let owned = genomes::list_owned_by(&db, owner)
            .await
            .expect("Failed to list owned genomes");
        assert!(owned.len() <= 1, "a worker should own at most one genome");
    }
}

#[tokio::test]
async fn claim_release_round_trip() {
    //* Given
    let temp_db = PgTempDB::new();
    let db = MetadataDb::connect_with_retry(&temp_db.connection_uri(), DEFAULT_POOL_SIZE)
        .await
        .expect("Failed to connect to metadata db");

    let genome_id = genomes::register(&db, "g1")
        .await
        .expect("Failed to register genome");
    let worker_a = register_worker(&db, 1).await;
    let worker_b = register_worker(&db, 2).await;

    //* When
    let first = genomes::claim_next(&db, worker_a, &filter_for(&["Annotate"]))
        .await
        .expect("Failed to claim genome");
    let while_owned = genomes::claim_next(&db, worker_b, &filter_for(&["Annotate"]))
        .await
        .expect("Failed to claim genome");
    let released = genomes::release(&db, genome_id, worker_a)
        .await
        .expect("Failed to release genome");
    let after_release = genomes::claim_next(&db, worker_b, &filter_for(&["Annotate"]))
        .await
        .expect("Failed to claim genome");

    //* Then
    assert_eq!(first, Some(genome_id));
    assert_eq!(while_owned, None, "an owned genome must not be claimed");
    assert!(released, "owner should be able to release");
    assert_eq!(after_release, Some(genome_id));

    let genome = genomes::get_by_id(&db, genome_id)
        .await
        .expect("Failed to get genome")
        .expect("Genome should exist");
    assert_eq!(genome.owner_worker_id, Some(worker_b));
}

#[tokio::test]
async fn release_by_non_owner_is_a_no_op() {
    //* Given
    let temp_db = PgTempDB::new();
    let db = MetadataDb::connect_with_retry(&temp_db.connection_uri(), DEFAULT_POOL_SIZE)
        .await
        .expect("Failed to connect to metadata db");

    let genome_id = genomes::register(&db, "g1")
        .await
        .expect("Failed to register genome");
    let owner = register_worker(&db, 1).await;
    let stranger = register_worker(&db, 2).await;
    genomes::claim_next(&db, owner, &filter_for(&["Annotate"]))
        .await
        .expect("Failed to claim genome");

    //* When
    let released = genomes::release(&db, genome_id, stranger)
        .await
        .expect("Failed to release genome");

    //* Then
    assert!(!released);
    let genome = genomes::get_by_id(&db, genome_id)
        .await
        .expect("Failed to get genome")
        .expect("Genome should exist");
    assert_eq!(genome.owner_worker_id, Some(owner));
}

#[tokio::test]
async fn claim_skips_finished_genomes_unless_requested() {
    //* Given
    let temp_db = PgTempDB::new();
    let db = MetadataDb::connect_with_retry(&temp_db.connection_uri(), DEFAULT_POOL_SIZE)
        .await
        .expect("Failed to connect to metadata db");

    let done_genome = genomes::register(&db, "g1")
        .await
        .expect("Failed to register genome");
    let open_genome = genomes::register(&db, "g2")
        .await
        .expect("Failed to register genome");
    let worker = register_worker(&db, 1).await;

    let modules = vec!["Annotate:pfam".to_string(), "Annotate:tigrfam".to_string()];
    let attempt = progress::begin_attempt(&db, worker, Some(done_genome), &modules)
        .await
        .expect("Failed to begin attempt");
    progress::finish_attempt(&db, &attempt.ids(), ProgressState::Done, None)
        .await
        .expect("Failed to finish attempt");

    let filter = filter_for(&["Annotate:pfam", "Annotate:tigrfam"]);

    //* When
    let first = genomes::claim_next(&db, worker, &filter)
        .await
        .expect("Failed to claim genome");
    let second = genomes::claim_next(&db, worker, &filter)
        .await
        .expect("Failed to claim genome");
    let explicit = genomes::claim_next(
        &db,
        worker,
        &ClaimFilter {
            genome_ids: vec![done_genome],
            ..filter.clone()
        },
    )
    .await
    .expect("Failed to claim genome");

    //* Then
    assert_eq!(first, Some(open_genome), "finished genome should be skipped");
    assert_eq!(second, None, "no unfinished genome should remain");
    assert_eq!(
        explicit,
        Some(done_genome),
        "explicitly requested genome is a candidate regardless of progress"
    );
}

#[tokio::test]
async fn claim_skips_genomes_visited_by_the_worker() {
    //* Given
    let temp_db = PgTempDB::new();
    let db = MetadataDb::connect_with_retry(&temp_db.connection_uri(), DEFAULT_POOL_SIZE)
        .await
        .expect("Failed to connect to metadata db");

    let g1 = genomes::register(&db, "g1")
        .await
        .expect("Failed to register genome");
    let g2 = genomes::register(&db, "g2")
        .await
        .expect("Failed to register genome");
    let worker = register_worker(&db, 1).await;
    let other = register_worker(&db, 2).await;

    // g1 was processed by this worker, g2 only by another one
    let mine = progress::begin_attempt(&db, worker, Some(g1), &["Annotate".to_string()])
        .await
        .expect("Failed to begin attempt");
    progress::finish_attempt(&db, &mine.ids(), ProgressState::Done, None)
        .await
        .expect("Failed to finish attempt");
    let theirs = progress::begin_attempt(&db, other, Some(g2), &["Annotate".to_string()])
        .await
        .expect("Failed to begin attempt");
    progress::finish_attempt(&db, &theirs.ids(), ProgressState::Done, None)
        .await
        .expect("Failed to finish attempt");

    let filter = ClaimFilter {
        redo: true,
        skip_visited_by: Some(worker),
        ..filter_for(&["Annotate"])
    };

    //* When
    let first = genomes::claim_next(&db, worker, &filter)
        .await
        .expect("Failed to claim genome");
    let redo_without_skip = genomes::claim_next(
        &db,
        other,
        &ClaimFilter {
            skip_visited_by: None,
            ..filter.clone()
        },
    )
    .await
    .expect("Failed to claim genome");

    //* Then
    assert_eq!(first, Some(g2), "genome visited by the worker is skipped");
    assert_eq!(
        redo_without_skip,
        Some(g1),
        "redo makes finished genomes candidates again"
    );
}
