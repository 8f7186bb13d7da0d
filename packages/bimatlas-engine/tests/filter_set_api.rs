//! Filter set CRUD, scoped search, applied sets, and compound product
//! filtering.

mod common;

use bimatlas_engine::{Deadline, Engine, FilterAttribute, FilterLogic, FilterRule};
use common::*;

const NONE: Deadline = Deadline::NONE;

fn class_rule(ifc_class: &str) -> FilterRule {
    FilterRule::Class {
        ifc_class: ifc_class.to_string(),
    }
}

fn attribute_rule(attribute: FilterAttribute, value: &str) -> FilterRule {
    FilterRule::Attribute {
        attribute,
        value: value.to_string(),
    }
}

#[tokio::test]
async fn create_fetch_update_delete() {
    let (engine, _, _) = Engine::in_memory();
    let (_, main) = engine.create_project("P", None, NONE).await.unwrap();

    let set = engine
        .create_filter_set(
            main.id,
            "Walls Only",
            FilterLogic::And,
            vec![class_rule("IfcWall")],
            NONE,
        )
        .await
        .unwrap();
    assert_eq!(set.branch_id, main.id);
    assert_eq!(set.logic, FilterLogic::And);
    assert_eq!(set.rules.len(), 1);

    let fetched = engine.filter_set(set.id, NONE).await.unwrap();
    assert_eq!(fetched.name, "Walls Only");

    let updated = engine
        .update_filter_set(set.id, Some("New Name"), Some(FilterLogic::Or), None, NONE)
        .await
        .unwrap();
    assert_eq!(updated.name, "New Name");
    assert_eq!(updated.logic, FilterLogic::Or);
    assert_eq!(updated.rules.len(), 1, "rules untouched by partial update");

    assert!(engine.delete_filter_set(set.id, NONE).await.unwrap());
    assert!(!engine.delete_filter_set(set.id, NONE).await.unwrap());
    let err = engine.filter_set(set.id, NONE).await.unwrap_err();
    assert_eq!(err.kind(), "NotFound");
}

#[tokio::test]
async fn unknown_branch_is_rejected() {
    let (engine, _, _) = Engine::in_memory();
    let err = engine
        .create_filter_set(99, "FS", FilterLogic::And, vec![], NONE)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "NotFound");
}

#[tokio::test]
async fn search_scopes_to_project_and_branch() {
    let (engine, _, _) = Engine::in_memory();
    let (alpha, alpha_main) = engine.create_project("Alpha", None, NONE).await.unwrap();
    let (_beta, beta_main) = engine.create_project("Beta", None, NONE).await.unwrap();

    engine
        .create_filter_set(alpha_main.id, "Walls Alpha", FilterLogic::And, vec![], NONE)
        .await
        .unwrap();
    engine
        .create_filter_set(alpha_main.id, "Doors Alpha", FilterLogic::And, vec![], NONE)
        .await
        .unwrap();
    engine
        .create_filter_set(beta_main.id, "Walls Beta", FilterLogic::And, vec![], NONE)
        .await
        .unwrap();

    let all = engine
        .search_filter_sets("walls", None, None, NONE)
        .await
        .unwrap();
    assert_eq!(all.len(), 2);

    let alpha_only = engine
        .search_filter_sets("Walls", Some(alpha.id), None, NONE)
        .await
        .unwrap();
    assert_eq!(alpha_only.len(), 1);
    assert_eq!(alpha_only[0].name, "Walls Alpha");

    let beta_only = engine
        .search_filter_sets("Walls", None, Some(beta_main.id), NONE)
        .await
        .unwrap();
    assert_eq!(beta_only.len(), 1);
    assert_eq!(beta_only[0].name, "Walls Beta");

    assert!(engine
        .search_filter_sets("nonexistent", None, None, NONE)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn applied_sets_replace_previous_selection() {
    let (engine, _, _) = Engine::in_memory();
    let (_, main) = engine.create_project("P", None, NONE).await.unwrap();
    let a = engine
        .create_filter_set(main.id, "A", FilterLogic::And, vec![], NONE)
        .await
        .unwrap();
    let b = engine
        .create_filter_set(main.id, "B", FilterLogic::Or, vec![], NONE)
        .await
        .unwrap();

    engine
        .apply_filter_sets(main.id, &[a.id, b.id], NONE)
        .await
        .unwrap();
    assert_eq!(
        engine.applied_filter_sets(main.id, NONE).await.unwrap().len(),
        2
    );

    engine.apply_filter_sets(main.id, &[b.id], NONE).await.unwrap();
    let applied = engine.applied_filter_sets(main.id, NONE).await.unwrap();
    assert_eq!(applied.len(), 1);
    assert_eq!(applied[0].name, "B");
}

#[tokio::test]
async fn compound_filtering_over_visible_products() {
    let (engine, _, _) = Engine::in_memory();
    let (_, main) = engine.create_project("P", None, NONE).await.unwrap();
    ingest(&engine, &storey_wall("Wall A"), main.id, None)
        .await
        .unwrap();

    // AND: class + matching attribute.
    let and_set = engine
        .create_filter_set(
            main.id,
            "Tagged walls",
            FilterLogic::And,
            vec![
                class_rule("IfcWall"),
                attribute_rule(FilterAttribute::Tag, "w-01"),
            ],
            NONE,
        )
        .await
        .unwrap();
    let matched = engine
        .products_for_filter_set(main.id, None, and_set.id, NONE)
        .await
        .unwrap();
    assert_eq!(matched.len(), 1);
    assert_eq!(matched[0].global_id, WALL_GID);

    // OR: either rule hits; the storey matches the name rule, the wall the
    // class rule.
    let or_set = engine
        .create_filter_set(
            main.id,
            "Walls or levels",
            FilterLogic::Or,
            vec![
                class_rule("IfcWall"),
                attribute_rule(FilterAttribute::Name, "level"),
            ],
            NONE,
        )
        .await
        .unwrap();
    let matched = engine
        .products_for_filter_set(main.id, None, or_set.id, NONE)
        .await
        .unwrap();
    assert_eq!(matched.len(), 2);

    // AND with a non-matching attribute excludes everything.
    let empty_set = engine
        .create_filter_set(
            main.id,
            "No hits",
            FilterLogic::And,
            vec![
                class_rule("IfcWall"),
                attribute_rule(FilterAttribute::Description, "missing"),
            ],
            NONE,
        )
        .await
        .unwrap();
    assert!(engine
        .products_for_filter_set(main.id, None, empty_set.id, NONE)
        .await
        .unwrap()
        .is_empty());
}
