//! Saved filter sets.
//!
//! Branch-scoped, named filter combinations the front-ends persist and
//! re-apply: each set is a list of rules combined with AND/OR logic. Class
//! rules go through the same hierarchy expansion as ad-hoc class filters.

use crate::deadline::Deadline;
use crate::engine::Engine;
use crate::error::{EngineError, Result};
use crate::hierarchy::expand_classes;
use crate::model::{Product, ProductFilter, ProductRow};
use crate::store::row_to_product;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FilterLogic {
    And,
    Or,
}

impl FilterLogic {
    pub fn as_str(&self) -> &'static str {
        match self {
            FilterLogic::And => "AND",
            FilterLogic::Or => "OR",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "AND" => Some(FilterLogic::And),
            "OR" => Some(FilterLogic::Or),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FilterAttribute {
    Name,
    ObjectType,
    Tag,
    Description,
    GlobalId,
}

/// One predicate of a filter set.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum FilterRule {
    /// Class membership, hierarchy-expanded.
    Class { ifc_class: String },
    /// Case-insensitive substring on one attribute.
    Attribute {
        attribute: FilterAttribute,
        value: String,
    },
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterSet {
    pub id: i64,
    pub branch_id: i64,
    pub name: String,
    pub logic: FilterLogic,
    pub rules: Vec<FilterRule>,
    pub created_at: DateTime<Utc>,
}

fn attribute_of<'a>(row: &'a ProductRow, attribute: FilterAttribute) -> Option<&'a str> {
    match attribute {
        FilterAttribute::Name => row.name.as_deref(),
        FilterAttribute::ObjectType => row.object_type.as_deref(),
        FilterAttribute::Tag => row.tag.as_deref(),
        FilterAttribute::Description => row.description.as_deref(),
        FilterAttribute::GlobalId => Some(row.global_id.as_str()),
    }
}

fn rule_matches(rule: &FilterRule, row: &ProductRow) -> bool {
    match rule {
        FilterRule::Class { ifc_class } => {
            expand_classes(std::slice::from_ref(ifc_class)).contains(&row.ifc_class)
        }
        FilterRule::Attribute { attribute, value } => attribute_of(row, *attribute)
            .is_some_and(|field| field.to_lowercase().contains(&value.to_lowercase())),
    }
}

/// Compound evaluation; a set with no rules matches everything.
pub fn set_matches(set: &FilterSet, row: &ProductRow) -> bool {
    match set.logic {
        FilterLogic::And => set.rules.iter().all(|rule| rule_matches(rule, row)),
        FilterLogic::Or => {
            set.rules.is_empty() || set.rules.iter().any(|rule| rule_matches(rule, row))
        }
    }
}

impl Engine {
    pub async fn create_filter_set(
        &self,
        branch_id: i64,
        name: &str,
        logic: FilterLogic,
        rules: Vec<FilterRule>,
        deadline: Deadline,
    ) -> Result<FilterSet> {
        deadline
            .run("create_filter_set", async {
                if self.relational().fetch_branch(branch_id).await?.is_none() {
                    return Err(EngineError::NotFound(format!("branch {branch_id}")));
                }
                self.relational()
                    .create_filter_set(branch_id, name, logic, &rules)
                    .await
            })
            .await
    }

    pub async fn filter_set(&self, filter_set_id: i64, deadline: Deadline) -> Result<FilterSet> {
        deadline
            .run("filter_set", async {
                self.relational()
                    .fetch_filter_set(filter_set_id)
                    .await?
                    .ok_or_else(|| EngineError::NotFound(format!("filter set {filter_set_id}")))
            })
            .await
    }

    pub async fn update_filter_set(
        &self,
        filter_set_id: i64,
        name: Option<&str>,
        logic: Option<FilterLogic>,
        rules: Option<Vec<FilterRule>>,
        deadline: Deadline,
    ) -> Result<FilterSet> {
        deadline
            .run("update_filter_set", async {
                self.relational()
                    .update_filter_set(filter_set_id, name, logic, rules.as_deref())
                    .await?
                    .ok_or_else(|| EngineError::NotFound(format!("filter set {filter_set_id}")))
            })
            .await
    }

    /// Returns `false` when the set did not exist.
    pub async fn delete_filter_set(&self, filter_set_id: i64, deadline: Deadline) -> Result<bool> {
        deadline
            .run(
                "delete_filter_set",
                self.relational().delete_filter_set(filter_set_id),
            )
            .await
    }

    pub async fn filter_sets(&self, branch_id: i64, deadline: Deadline) -> Result<Vec<FilterSet>> {
        deadline
            .run("filter_sets", async {
                if self.relational().fetch_branch(branch_id).await?.is_none() {
                    return Err(EngineError::NotFound(format!("branch {branch_id}")));
                }
                self.relational().list_filter_sets(branch_id).await
            })
            .await
    }

    pub async fn search_filter_sets(
        &self,
        query: &str,
        project_id: Option<i64>,
        branch_id: Option<i64>,
        deadline: Deadline,
    ) -> Result<Vec<FilterSet>> {
        deadline
            .run(
                "search_filter_sets",
                self.relational()
                    .search_filter_sets(query, project_id, branch_id),
            )
            .await
    }

    /// Replace the set of filter sets active on a branch.
    pub async fn apply_filter_sets(
        &self,
        branch_id: i64,
        filter_set_ids: &[i64],
        deadline: Deadline,
    ) -> Result<()> {
        deadline
            .run("apply_filter_sets", async {
                if self.relational().fetch_branch(branch_id).await?.is_none() {
                    return Err(EngineError::NotFound(format!("branch {branch_id}")));
                }
                self.relational()
                    .set_applied_filter_sets(branch_id, filter_set_ids)
                    .await
            })
            .await
    }

    pub async fn applied_filter_sets(
        &self,
        branch_id: i64,
        deadline: Deadline,
    ) -> Result<Vec<FilterSet>> {
        deadline
            .run(
                "applied_filter_sets",
                self.relational().applied_filter_sets(branch_id),
            )
            .await
    }

    /// Products visible at the revision that satisfy the set's compound
    /// predicate.
    pub async fn products_for_filter_set(
        &self,
        branch_id: i64,
        revision: Option<i64>,
        filter_set_id: i64,
        deadline: Deadline,
    ) -> Result<Vec<Product>> {
        deadline
            .run("products_for_filter_set", async {
                let set = self
                    .relational()
                    .fetch_filter_set(filter_set_id)
                    .await?
                    .ok_or_else(|| EngineError::NotFound(format!("filter set {filter_set_id}")))?;
                let rev = self.resolve_revision(branch_id, revision).await?;
                let rows = self
                    .relational()
                    .products_at(branch_id, rev, &ProductFilter::default())
                    .await?;
                Ok(rows
                    .iter()
                    .filter(|row| set_matches(&set, row))
                    .map(row_to_product)
                    .collect())
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wall_row() -> ProductRow {
        ProductRow {
            id: 1,
            branch_id: 1,
            global_id: "2O2Fr$t4X7Zf8NOew3FL9r".into(),
            ifc_class: "IfcWallStandardCase".into(),
            name: Some("North Wall".into()),
            description: None,
            object_type: Some("Basic Wall".into()),
            tag: Some("W-12".into()),
            contained_in: None,
            vertices: None,
            normals: None,
            faces: None,
            matrix: None,
            content_hash: "h".into(),
            valid_from_rev: 1,
            valid_to_rev: None,
        }
    }

    fn set(logic: FilterLogic, rules: Vec<FilterRule>) -> FilterSet {
        FilterSet {
            id: 1,
            branch_id: 1,
            name: "fs".into(),
            logic,
            rules,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn class_rule_expands_hierarchy() {
        // The row is a standard-case wall; an IfcWall rule still matches.
        let rule = FilterRule::Class {
            ifc_class: "IfcWall".into(),
        };
        assert!(rule_matches(&rule, &wall_row()));
    }

    #[test]
    fn attribute_rule_is_case_insensitive_substring() {
        let rule = FilterRule::Attribute {
            attribute: FilterAttribute::Name,
            value: "north".into(),
        };
        assert!(rule_matches(&rule, &wall_row()));

        let miss = FilterRule::Attribute {
            attribute: FilterAttribute::Description,
            value: "north".into(),
        };
        assert!(!rule_matches(&miss, &wall_row()));
    }

    #[test]
    fn and_requires_all_rules() {
        let s = set(
            FilterLogic::And,
            vec![
                FilterRule::Class {
                    ifc_class: "IfcWall".into(),
                },
                FilterRule::Attribute {
                    attribute: FilterAttribute::Tag,
                    value: "W-99".into(),
                },
            ],
        );
        assert!(!set_matches(&s, &wall_row()));
    }

    #[test]
    fn or_requires_any_rule() {
        let s = set(
            FilterLogic::Or,
            vec![
                FilterRule::Class {
                    ifc_class: "IfcDoor".into(),
                },
                FilterRule::Attribute {
                    attribute: FilterAttribute::Tag,
                    value: "W-12".into(),
                },
            ],
        );
        assert!(set_matches(&s, &wall_row()));
    }

    #[test]
    fn empty_rules_match_everything() {
        assert!(set_matches(&set(FilterLogic::And, vec![]), &wall_row()));
        assert!(set_matches(&set(FilterLogic::Or, vec![]), &wall_row()));
    }

    #[test]
    fn rules_round_trip_through_json() {
        let rules = vec![
            FilterRule::Class {
                ifc_class: "IfcWall".into(),
            },
            FilterRule::Attribute {
                attribute: FilterAttribute::ObjectType,
                value: "Basic".into(),
            },
        ];
        let json = serde_json::to_value(&rules).unwrap();
        assert_eq!(json[0]["mode"], "class");
        assert_eq!(json[0]["ifcClass"], "IfcWall");
        assert_eq!(json[1]["mode"], "attribute");
        let back: Vec<FilterRule> = serde_json::from_value(json).unwrap();
        assert_eq!(back, rules);
    }
}
