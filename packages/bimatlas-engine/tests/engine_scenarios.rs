//! End-to-end scenarios over the in-memory adapters and the real
//! extractor: time travel, SCD2 windows, branch isolation, diff symmetry,
//! and the streaming contract.

mod common;

use bimatlas_engine::{Deadline, Engine, ProductFilter};
use common::*;
use futures::StreamExt;

const NONE: Deadline = Deadline::NONE;

async fn engine_with_main_branch() -> (Engine, i64) {
    let (engine, _, _) = Engine::in_memory();
    let (_, main) = engine.create_project("P", None, NONE).await.unwrap();
    (engine, main.id)
}

// ── scenario 1: empty branch time-travel ────────────────────────────────

#[tokio::test]
async fn empty_branch_time_travel() {
    let (engine, main) = engine_with_main_branch().await;
    assert_eq!(main, 1);

    let err = engine.product(main, WALL_GID, None, NONE).await.unwrap_err();
    assert_eq!(err.kind(), "NotFound");

    let revisions = engine.revisions(main, NONE).await.unwrap();
    assert!(revisions.is_empty());
}

// ── scenario 2: single ingestion ────────────────────────────────────────

#[tokio::test]
async fn single_ingestion_counts_and_edges() {
    let (engine, main) = engine_with_main_branch().await;
    let result = ingest(&engine, &storey_wall("Wall A"), main, Some("v1"))
        .await
        .unwrap();

    assert_eq!(result.revision_id, 1);
    assert_eq!(result.counts.added, 2);
    assert_eq!(result.counts.modified, 0);
    assert_eq!(result.counts.deleted, 0);
    assert_eq!(result.counts.unchanged, 0);
    assert_eq!(result.edges_created, 1);

    let wall = engine.product(main, WALL_GID, None, NONE).await.unwrap();
    assert_eq!(wall.name.as_deref(), Some("Wall A"));
    assert!(wall.mesh.is_some());
    let container = wall.contained_in.expect("wall has a container");
    assert_eq!(container.global_id, STOREY_GID);
    assert_eq!(container.ifc_class, "IfcBuildingStorey");
}

#[tokio::test]
async fn spatial_tree_root_storey_wall() {
    let (engine, main) = engine_with_main_branch().await;
    let result = ingest(&engine, &full_model("Wall A"), main, None)
        .await
        .unwrap();
    assert_eq!(result.counts.added, 3);
    assert_eq!(result.edges_created, 2);

    let tree = engine.spatial_tree(main, None, NONE).await.unwrap();
    assert_eq!(tree.len(), 1);
    let root = &tree[0];
    assert_eq!(root.global_id, PROJECT_GID);
    assert_eq!(root.ifc_class, "IfcProject");
    assert_eq!(root.children.len(), 1);

    let storey = &root.children[0];
    assert_eq!(storey.global_id, STOREY_GID);
    assert_eq!(storey.contained_elements.len(), 1);
    assert_eq!(storey.contained_elements[0].global_id, WALL_GID);
}

// ── scenario 3: modify one element ──────────────────────────────────────

#[tokio::test]
async fn modification_opens_a_new_window() {
    let (engine, main) = engine_with_main_branch().await;
    ingest(&engine, &storey_wall("Wall A"), main, None)
        .await
        .unwrap();
    let second = ingest(&engine, &storey_wall("Wall A'"), main, None)
        .await
        .unwrap();

    assert_eq!(second.revision_id, 2);
    assert_eq!(second.counts.added, 0);
    assert_eq!(second.counts.modified, 1);
    assert_eq!(second.counts.deleted, 0);
    assert_eq!(second.counts.unchanged, 1);

    // Time travel: revision 1 still serves the old name.
    let at_rev1 = engine.product(main, WALL_GID, Some(1), NONE).await.unwrap();
    assert_eq!(at_rev1.name.as_deref(), Some("Wall A"));
    let at_rev2 = engine.product(main, WALL_GID, Some(2), NONE).await.unwrap();
    assert_eq!(at_rev2.name.as_deref(), Some("Wall A'"));

    // Two rows for the wall: the superseded one closed at 2, the new one
    // open.
    let store = engine.relational();
    let old_row = store.product_at(main, WALL_GID, 1).await.unwrap().unwrap();
    assert_eq!(old_row.valid_to_rev, Some(2));
    let new_row = store.product_at(main, WALL_GID, 2).await.unwrap().unwrap();
    assert_eq!(new_row.valid_to_rev, None);
    assert_ne!(old_row.id, new_row.id);
    assert!(new_row.valid_from_rev > old_row.valid_from_rev);
}

// ── scenario 4: delete ──────────────────────────────────────────────────

#[tokio::test]
async fn deletion_closes_without_successor() {
    let (engine, main) = engine_with_main_branch().await;
    ingest(&engine, &storey_wall("Wall A"), main, None)
        .await
        .unwrap();
    ingest(&engine, &storey_wall("Wall A'"), main, None)
        .await
        .unwrap();
    let third = ingest(&engine, &storey_only(), main, None).await.unwrap();

    assert_eq!(third.counts.added, 0);
    assert_eq!(third.counts.modified, 0);
    assert_eq!(third.counts.deleted, 1);
    assert_eq!(third.counts.unchanged, 1);

    let err = engine
        .product(main, WALL_GID, Some(3), NONE)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "NotFound");

    // The renamed wall is still visible at revision 2.
    let at_rev2 = engine.product(main, WALL_GID, Some(2), NONE).await.unwrap();
    assert_eq!(at_rev2.name.as_deref(), Some("Wall A'"));
}

// ── scenario 5: branch isolation ────────────────────────────────────────

#[tokio::test]
async fn branches_are_isolated_timelines() {
    let (engine, main) = engine_with_main_branch().await;
    let project_id = engine.projects(NONE).await.unwrap()[0].id;
    let structural = engine
        .create_branch(project_id, "structural", NONE)
        .await
        .unwrap();
    assert_eq!(structural.id, 2);

    ingest(&engine, &storey_only(), main, None).await.unwrap();
    ingest(&engine, &beam_only(), structural.id, None)
        .await
        .unwrap();

    let on_main = engine
        .products(main, None, ProductFilter::default(), NONE)
        .await
        .unwrap();
    assert_eq!(on_main.len(), 1);
    assert_eq!(on_main[0].global_id, STOREY_GID);

    let on_structural = engine
        .products(structural.id, None, ProductFilter::default(), NONE)
        .await
        .unwrap();
    assert_eq!(on_structural.len(), 1);
    assert_eq!(on_structural[0].global_id, BEAM_GID);

    // The structural revision has a higher global id, but main's reads
    // never see structural's rows.
    let structural_rev = engine.resolve_revision(structural.id, None).await.unwrap();
    let leaked = engine
        .products(main, Some(structural_rev), ProductFilter::default(), NONE)
        .await
        .unwrap();
    assert!(leaked.iter().all(|p| p.global_id != BEAM_GID));
}

#[tokio::test]
async fn new_branches_start_empty() {
    let (engine, main) = engine_with_main_branch().await;
    ingest(&engine, &storey_wall("Wall A"), main, None)
        .await
        .unwrap();

    let projects = engine.projects(NONE).await.unwrap();
    let branch = engine
        .create_branch(projects[0].id, "empty", NONE)
        .await
        .unwrap();
    assert!(engine.revisions(branch.id, NONE).await.unwrap().is_empty());
    let err = engine
        .product(branch.id, WALL_GID, None, NONE)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "NotFound");
}

// ── scenario 6: streaming filter ────────────────────────────────────────

#[tokio::test]
async fn stream_filtered_products() {
    let (engine, main) = engine_with_main_branch().await;
    ingest(&engine, &storey_wall("Wall A"), main, None)
        .await
        .unwrap();
    ingest(&engine, &storey_wall("Wall A'"), main, None)
        .await
        .unwrap();

    let filter = ProductFilter {
        ifc_classes: vec!["IfcWall".to_string()],
        ..Default::default()
    };
    let frames: Vec<String> = engine
        .stream_products(main, Some(2), filter, NONE)
        .collect()
        .await;
    assert_eq!(frames.len(), 3);

    let events: Vec<serde_json::Value> = frames
        .iter()
        .map(|frame| {
            let json = frame
                .strip_prefix("data: ")
                .and_then(|f| f.strip_suffix("\n\n"))
                .expect("SSE framing");
            serde_json::from_str(json).unwrap()
        })
        .collect();

    assert_eq!(events[0]["type"], "start");
    assert_eq!(events[0]["total"], 1);

    assert_eq!(events[1]["type"], "product");
    assert_eq!(events[1]["current"], 1);
    assert_eq!(events[1]["product"]["globalId"], WALL_GID);
    assert_eq!(events[1]["product"]["ifcClass"], "IfcWall");
    assert_eq!(events[1]["product"]["name"], "Wall A'");
    assert!(events[1]["product"]["mesh"]["vertices"].is_string());

    assert_eq!(events[2]["type"], "end");
}

#[tokio::test]
async fn stream_on_empty_branch_is_a_terminal_error() {
    let (engine, main) = engine_with_main_branch().await;
    let frames: Vec<String> = engine
        .stream_products(main, None, ProductFilter::default(), NONE)
        .collect()
        .await;
    assert_eq!(frames.len(), 1);
    let event: serde_json::Value = serde_json::from_str(
        frames[0]
            .strip_prefix("data: ")
            .unwrap()
            .trim_end_matches('\n'),
    )
    .unwrap();
    assert_eq!(event["type"], "error");
}

// ── upload surface ──────────────────────────────────────────────────────

#[tokio::test]
async fn ingest_file_reads_from_disk() {
    use std::io::Write;

    let (engine, main) = engine_with_main_branch().await;
    let mut file = tempfile::Builder::new()
        .prefix("upload-")
        .suffix(".ifc")
        .tempfile()
        .unwrap();
    file.write_all(storey_wall("Wall A").as_bytes()).unwrap();

    let result = engine
        .ingest_file(file.path(), main, Some("first upload"), NONE)
        .await
        .unwrap();
    assert_eq!(result.counts.added, 2);

    let revisions = engine.revisions(main, NONE).await.unwrap();
    assert_eq!(revisions.len(), 1);
    assert_eq!(revisions[0].label.as_deref(), Some("first upload"));
    assert!(revisions[0].source_filename.ends_with(".ifc"));
}

#[tokio::test]
async fn ingest_file_unknown_branch() {
    let (engine, _, _) = Engine::in_memory();
    let err = engine
        .ingest_file("/nonexistent/model.ifc", 42, None, NONE)
        .await
        .unwrap_err();
    // The branch check fires before the file is touched.
    assert_eq!(err.kind(), "NotFound");
}

// ── invariants ──────────────────────────────────────────────────────────

#[tokio::test]
async fn reingesting_identical_file_is_idempotent() {
    let (engine, main) = engine_with_main_branch().await;
    let first = ingest(&engine, &storey_wall("Wall A"), main, None)
        .await
        .unwrap();
    let second = ingest(&engine, &storey_wall("Wall A"), main, None)
        .await
        .unwrap();

    assert_eq!(second.counts.added, 0);
    assert_eq!(second.counts.modified, 0);
    assert_eq!(second.counts.deleted, 0);
    assert_eq!(second.counts.unchanged, first.total_products);
    // A new revision row is written even for a no-op delta.
    assert!(second.revision_id > first.revision_id);
    assert_eq!(engine.revisions(main, NONE).await.unwrap().len(), 2);

    let diff = engine
        .revision_diff(main, first.revision_id, second.revision_id, NONE)
        .await
        .unwrap();
    assert!(diff.added.is_empty());
    assert!(diff.modified.is_empty());
    assert!(diff.deleted.is_empty());
}

#[tokio::test]
async fn open_window_stays_unique_across_revisions() {
    let (engine, main) = engine_with_main_branch().await;
    ingest(&engine, &storey_wall("Wall A"), main, None)
        .await
        .unwrap();
    ingest(&engine, &storey_wall("Wall A'"), main, None)
        .await
        .unwrap();
    ingest(&engine, &storey_only(), main, None).await.unwrap();
    ingest(&engine, &storey_wall("Wall A''"), main, None)
        .await
        .unwrap();

    let violations = engine.relational().open_window_violations(main).await.unwrap();
    assert!(violations.is_empty(), "duplicate open rows: {violations:?}");
}

#[tokio::test]
async fn revision_diff_is_symmetric() {
    let (engine, main) = engine_with_main_branch().await;
    let r1 = ingest(&engine, &storey_wall("Wall A"), main, None)
        .await
        .unwrap()
        .revision_id;
    let r2 = ingest(&engine, &storey_only(), main, None)
        .await
        .unwrap()
        .revision_id;

    let forward = engine.revision_diff(main, r1, r2, NONE).await.unwrap();
    let backward = engine.revision_diff(main, r2, r1, NONE).await.unwrap();

    let gids = |entries: &[bimatlas_engine::DiffEntry]| {
        entries.iter().map(|e| e.global_id.clone()).collect::<Vec<_>>()
    };
    assert_eq!(gids(&forward.deleted), vec![WALL_GID]);
    assert_eq!(gids(&forward.added), gids(&backward.deleted));
    assert_eq!(gids(&forward.deleted), gids(&backward.added));
    assert_eq!(gids(&forward.modified), gids(&backward.modified));
}

#[tokio::test]
async fn revision_diff_reports_modified_rows() {
    let (engine, main) = engine_with_main_branch().await;
    let r1 = ingest(&engine, &storey_wall("Wall A"), main, None)
        .await
        .unwrap()
        .revision_id;
    let r2 = ingest(&engine, &storey_wall("Wall A'"), main, None)
        .await
        .unwrap()
        .revision_id;

    let diff = engine.revision_diff(main, r1, r2, NONE).await.unwrap();
    assert!(diff.added.is_empty());
    assert!(diff.deleted.is_empty());
    assert_eq!(diff.modified.len(), 1);
    assert_eq!(diff.modified[0].global_id, WALL_GID);
}

// ── filters ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn class_filter_expands_hierarchy() {
    let (engine, main) = engine_with_main_branch().await;
    ingest(&engine, &storey_wall("Wall A"), main, None)
        .await
        .unwrap();

    // IfcElement covers walls but not storeys.
    let filter = ProductFilter {
        ifc_classes: vec!["IfcElement".to_string()],
        ..Default::default()
    };
    let elements = engine.products(main, None, filter, NONE).await.unwrap();
    assert_eq!(elements.len(), 1);
    assert_eq!(elements[0].global_id, WALL_GID);
}

#[tokio::test]
async fn substring_filters_are_case_insensitive_and_conjunctive() {
    let (engine, main) = engine_with_main_branch().await;
    ingest(&engine, &storey_wall("Wall A"), main, None)
        .await
        .unwrap();

    let hit = ProductFilter {
        name: Some("wall".to_string()),
        tag: Some("w-01".to_string()),
        ..Default::default()
    };
    assert_eq!(engine.products(main, None, hit, NONE).await.unwrap().len(), 1);

    // All predicates must match.
    let miss = ProductFilter {
        name: Some("wall".to_string()),
        tag: Some("no-such-tag".to_string()),
        ..Default::default()
    };
    assert!(engine.products(main, None, miss, NONE).await.unwrap().is_empty());
}

#[tokio::test]
async fn contained_in_filter() {
    let (engine, main) = engine_with_main_branch().await;
    ingest(&engine, &storey_wall("Wall A"), main, None)
        .await
        .unwrap();

    let filter = ProductFilter {
        contained_in: Some(STOREY_GID.to_string()),
        ..Default::default()
    };
    let contained = engine.products(main, None, filter, NONE).await.unwrap();
    assert_eq!(contained.len(), 1);
    assert_eq!(contained[0].global_id, WALL_GID);
}

// ── catalog errors ──────────────────────────────────────────────────────

#[tokio::test]
async fn duplicate_branch_name_is_rejected() {
    let (engine, _) = engine_with_main_branch().await;
    let project_id = engine.projects(NONE).await.unwrap()[0].id;
    let err = engine
        .create_branch(project_id, "main", NONE)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "DuplicateName");
}

#[tokio::test]
async fn invalid_global_id_is_a_validation_error() {
    let (engine, main) = engine_with_main_branch().await;
    ingest(&engine, &storey_only(), main, None).await.unwrap();
    let err = engine
        .product(main, "not a global id", None, NONE)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "ValidationError");
}

#[tokio::test]
async fn deleting_a_project_removes_its_branches() {
    let (engine, main) = engine_with_main_branch().await;
    ingest(&engine, &storey_wall("Wall A"), main, None)
        .await
        .unwrap();
    let project_id = engine.projects(NONE).await.unwrap()[0].id;

    engine.delete_project(project_id, NONE).await.unwrap();
    assert!(engine.projects(NONE).await.unwrap().is_empty());
    let err = engine.revisions(main, NONE).await.unwrap_err();
    assert_eq!(err.kind(), "NotFound");
}

// ── relations through the graph ─────────────────────────────────────────

#[tokio::test]
async fn product_carries_graph_relations() {
    let (engine, main) = engine_with_main_branch().await;
    ingest(&engine, &storey_wall("Wall A"), main, None)
        .await
        .unwrap();

    let wall = engine.product(main, WALL_GID, None, NONE).await.unwrap();
    assert_eq!(wall.relations.len(), 1);
    let relation = &wall.relations[0];
    assert_eq!(relation.global_id, STOREY_GID);
    assert_eq!(relation.relationship, "IfcRelContainedInSpatialStructure");
    assert_eq!(relation.direction, bimatlas_engine::Direction::Outgoing);

    let storey = engine.product(main, STOREY_GID, None, NONE).await.unwrap();
    assert_eq!(storey.relations.len(), 1);
    assert_eq!(
        storey.relations[0].direction,
        bimatlas_engine::Direction::Incoming
    );
}
