//! Live Postgres/AGE round trip.
//!
//! Ignored by default; needs a database with the AGE extension available:
//!
//! ```text
//! TEST_DB_NAME=bimatlas_test GRAPH_NAME=bimatlas_test \
//!     cargo test --test postgres_live -- --ignored
//! ```

mod common;

use bimatlas_engine::{Config, Deadline, Engine, ProductFilter};
use common::*;
use std::env;

const NONE: Deadline = Deadline::NONE;

fn test_config() -> Config {
    let defaults = Config::default();
    Config {
        db_host: env::var("TEST_DB_HOST").unwrap_or(defaults.db_host),
        db_port: env::var("TEST_DB_PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(defaults.db_port),
        db_name: env::var("TEST_DB_NAME").unwrap_or_else(|_| "bimatlas_test".to_string()),
        db_user: env::var("TEST_DB_USER").unwrap_or(defaults.db_user),
        db_password: env::var("TEST_DB_PASSWORD").unwrap_or(defaults.db_password),
        graph_name: env::var("GRAPH_NAME").unwrap_or_else(|_| "bimatlas_test".to_string()),
        port: defaults.port,
    }
}

#[tokio::test]
#[ignore] // requires PostgreSQL with Apache AGE
async fn full_round_trip() {
    let engine = Engine::connect(&test_config())
        .await
        .expect("connect to test database");

    let (project, main) = engine
        .create_project("Live Round Trip", None, NONE)
        .await
        .unwrap();

    let first = ingest(&engine, &full_model("Wall A"), main.id, Some("v1"))
        .await
        .unwrap();
    assert_eq!(first.counts.added, 3);
    assert_eq!(first.edges_created, 2);

    let wall = engine.product(main.id, WALL_GID, None, NONE).await.unwrap();
    assert_eq!(wall.name.as_deref(), Some("Wall A"));
    assert!(wall.mesh.is_some());
    assert_eq!(wall.relations.len(), 1);

    let tree = engine.spatial_tree(main.id, None, NONE).await.unwrap();
    assert_eq!(tree.len(), 1);
    assert_eq!(tree[0].global_id, PROJECT_GID);

    let second = ingest(&engine, &full_model("Wall A'"), main.id, Some("v2"))
        .await
        .unwrap();
    assert_eq!(second.counts.modified, 1);
    assert_eq!(second.counts.unchanged, 2);

    let diff = engine
        .revision_diff(main.id, first.revision_id, second.revision_id, NONE)
        .await
        .unwrap();
    assert_eq!(diff.modified.len(), 1);
    assert_eq!(diff.modified[0].global_id, WALL_GID);

    let walls = engine
        .products(
            main.id,
            None,
            ProductFilter {
                ifc_classes: vec!["IfcWall".to_string()],
                ..Default::default()
            },
            NONE,
        )
        .await
        .unwrap();
    assert_eq!(walls.len(), 1);
    assert_eq!(walls[0].name.as_deref(), Some("Wall A'"));

    let violations = engine
        .relational()
        .open_window_violations(main.id)
        .await
        .unwrap();
    assert!(violations.is_empty());

    engine.delete_project(project.id, NONE).await.unwrap();
}

#[tokio::test]
#[ignore] // requires PostgreSQL with Apache AGE
async fn ingestion_conflicts_while_branch_lock_is_held() {
    let config = test_config();
    let engine = Engine::connect(&config)
        .await
        .expect("connect to test database");
    let (project, main) = engine
        .create_project("Advisory Lock", None, NONE)
        .await
        .unwrap();

    // Hold the branch advisory lock in a separate transaction; ingestion
    // against the same branch must fail fast with ConflictError.
    let locker = bimatlas_engine::store::PostgresStore::connect(&config)
        .await
        .unwrap();
    let mut tx = locker.pool().begin().await.unwrap();
    sqlx::query("SELECT pg_advisory_xact_lock($1)")
        .bind(main.id)
        .execute(&mut *tx)
        .await
        .unwrap();

    let err = ingest(&engine, &storey_wall("Wall A"), main.id, None)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "ConflictError");

    // Releasing the lock unblocks the branch.
    tx.rollback().await.unwrap();
    let ok = ingest(&engine, &storey_wall("Wall A"), main.id, None)
        .await
        .unwrap();
    assert_eq!(ok.counts.added, 2);

    engine.delete_project(project.id, NONE).await.unwrap();
}
