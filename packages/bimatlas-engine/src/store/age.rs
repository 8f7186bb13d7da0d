//! Apache AGE graph adapter.
//!
//! Executes openCypher through AGE's SQL interface
//! (`SELECT … FROM cypher('<graph>', $tag$ … $tag$) AS (… agtype)`) over the
//! shared Postgres pool. Nodes are labelled by IFC class, edges by IFC
//! relationship entity; every node and edge carries
//! `{branch_id, valid_from_rev, valid_to_rev}` with `-1` as the open
//! sentinel.
//!
//! `GlobalId`s and labels are embedded into the query text (AGE cannot
//! parametrize labels), hence the strict validation in
//! [`crate::store::validate`]. Unknown labels are created lazily through a
//! process-wide cache.

use crate::error::{EngineError, Result};
use crate::model::{Direction, GraphNodeRef, RelatedProduct};
use crate::store::validate::{escape_cypher_string, rev_filter, validate_global_id, validate_label};
use crate::store::GraphStore;
use async_trait::async_trait;
use dashmap::DashSet;
use serde_json::Value as JsonValue;
use sqlx::{PgPool, Row};
use std::collections::HashSet;

pub struct AgeGraphStore {
    pool: PgPool,
    graph: String,
    vlabels: DashSet<String>,
    elabels: DashSet<String>,
}

/// Graph names may carry underscores (`bimatlas_test`), unlike labels.
fn validate_graph_name(name: &str) -> Result<&str> {
    let mut bytes = name.bytes();
    let valid = matches!(bytes.next(), Some(b) if b.is_ascii_alphabetic() || b == b'_')
        && bytes.all(|b| b.is_ascii_alphanumeric() || b == b'_');
    if valid {
        Ok(name)
    } else {
        Err(EngineError::Validation(format!(
            "invalid graph name: {name:?}"
        )))
    }
}

/// Pick a dollar-quote tag that cannot terminate early inside the cypher
/// body (embedded strings are escaped but may contain `$`).
fn dollar_tag(cypher: &str) -> Result<&'static str> {
    for tag in ["$bim$", "$bimq$", "$bimqq$"] {
        if !cypher.contains(tag) {
            return Ok(tag);
        }
    }
    Err(EngineError::Validation(
        "cypher body collides with every dollar-quote tag".to_string(),
    ))
}

/// agtype scalars follow JSON encoding once cast to text.
fn agtype_scalar(raw: Option<String>) -> JsonValue {
    match raw {
        None => JsonValue::Null,
        Some(text) => serde_json::from_str(&text).unwrap_or(JsonValue::String(text)),
    }
}

fn string_field(value: &JsonValue) -> Option<String> {
    value.as_str().filter(|s| !s.is_empty()).map(str::to_string)
}

impl AgeGraphStore {
    pub fn new(pool: PgPool, graph_name: &str) -> Result<Self> {
        validate_graph_name(graph_name)?;
        Ok(Self {
            pool,
            graph: graph_name.to_string(),
            vlabels: DashSet::new(),
            elabels: DashSet::new(),
        })
    }

    pub fn graph_name(&self) -> &str {
        &self.graph
    }

    async fn cypher_read(
        &self,
        cypher: &str,
        columns: &[&str],
    ) -> Result<Vec<Vec<JsonValue>>> {
        let tag = dollar_tag(cypher)?;
        let select = columns
            .iter()
            .map(|c| format!("{c}::text"))
            .collect::<Vec<_>>()
            .join(", ");
        let spec = columns
            .iter()
            .map(|c| format!("{c} agtype"))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "SELECT {select} FROM cypher('{}', {tag} {cypher} {tag}) AS ({spec})",
            self.graph
        );

        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        let mut parsed = Vec::with_capacity(rows.len());
        for row in rows {
            let mut values = Vec::with_capacity(columns.len());
            for i in 0..columns.len() {
                let raw: Option<String> = row.try_get(i)?;
                values.push(agtype_scalar(raw));
            }
            parsed.push(values);
        }
        Ok(parsed)
    }

    /// Every write carries a RETURN clause so the backend materializes the
    /// effect; the returned row count doubles as the match count.
    async fn cypher_write(&self, cypher: &str) -> Result<usize> {
        let tag = dollar_tag(cypher)?;
        let sql = format!(
            "SELECT v::text FROM cypher('{}', {tag} {cypher} {tag}) AS (v agtype)",
            self.graph
        );
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        Ok(rows.len())
    }

    async fn label_exists(&self, label: &str, kind: &str) -> Result<bool> {
        // `kind` is code-controlled: 'v' or 'e'.
        let sql = format!(
            "SELECT count(*) FROM ag_catalog.ag_label \
             WHERE name = $1 \
               AND graph = (SELECT graphid FROM ag_catalog.ag_graph WHERE name = $2) \
               AND kind = '{kind}'"
        );
        let count: i64 = sqlx::query_scalar(&sql)
            .bind(label)
            .bind(&self.graph)
            .fetch_one(&self.pool)
            .await?;
        Ok(count > 0)
    }

    async fn ensure_label(&self, label: &str, kind: &str) -> Result<()> {
        let cache = if kind == "v" { &self.vlabels } else { &self.elabels };
        if cache.contains(label) {
            return Ok(());
        }
        validate_label(label)?;

        if !self.label_exists(label, kind).await? {
            let create = if kind == "v" {
                "SELECT ag_catalog.create_vlabel($1, $2)"
            } else {
                "SELECT ag_catalog.create_elabel($1, $2)"
            };
            let created = sqlx::query(create)
                .bind(&self.graph)
                .bind(label)
                .execute(&self.pool)
                .await;
            if created.is_err() && !self.label_exists(label, kind).await? {
                created?;
            }
        }
        cache.insert(label.to_string());
        Ok(())
    }

    /// Neighbor query for one direction; `pattern` is the `(n)…(m)` part
    /// with the pre-validated global_id already embedded.
    async fn neighbors(
        &self,
        branch_id: i64,
        rev: i64,
        pattern: &str,
        direction: Direction,
    ) -> Result<Vec<RelatedProduct>> {
        let cypher = format!(
            "MATCH {pattern} WHERE {} AND {} AND {} \
             RETURN m.global_id, label(m), m.name, type(r)",
            rev_filter("n", branch_id, rev),
            rev_filter("r", branch_id, rev),
            rev_filter("m", branch_id, rev),
        );
        let rows = self.cypher_read(&cypher, &["gid", "lbl", "nm", "rel"]).await?;
        Ok(rows
            .into_iter()
            .filter_map(|row| {
                Some(RelatedProduct {
                    global_id: row[0].as_str()?.to_string(),
                    ifc_class: row[1].as_str()?.to_string(),
                    name: string_field(&row[2]),
                    relationship: row[3].as_str()?.to_string(),
                    direction,
                })
            })
            .collect())
    }

    async fn node_refs(&self, cypher: &str) -> Result<Vec<GraphNodeRef>> {
        let rows = self.cypher_read(cypher, &["gid", "lbl", "nm"]).await?;
        Ok(rows
            .into_iter()
            .filter_map(|row| {
                Some(GraphNodeRef {
                    global_id: row[0].as_str()?.to_string(),
                    ifc_class: row[1].as_str()?.to_string(),
                    name: string_field(&row[2]),
                })
            })
            .collect())
    }
}

#[async_trait]
impl GraphStore for AgeGraphStore {
    async fn ensure_graph(&self) -> Result<()> {
        sqlx::raw_sql("CREATE EXTENSION IF NOT EXISTS age")
            .execute(&self.pool)
            .await?;
        let count: i64 =
            sqlx::query_scalar("SELECT count(*) FROM ag_catalog.ag_graph WHERE name = $1")
                .bind(&self.graph)
                .fetch_one(&self.pool)
                .await?;
        if count == 0 {
            sqlx::query("SELECT ag_catalog.create_graph($1)")
                .bind(&self.graph)
                .execute(&self.pool)
                .await?;
        }
        Ok(())
    }

    async fn create_node(
        &self,
        branch_id: i64,
        ifc_class: &str,
        global_id: &str,
        name: Option<&str>,
        rev: i64,
    ) -> Result<()> {
        self.ensure_label(ifc_class, "v").await?;
        let gid = validate_global_id(global_id)?;
        let name = escape_cypher_string(name.unwrap_or(""));
        let cypher = format!(
            "CREATE (n:{ifc_class} {{global_id: '{gid}', name: '{name}', \
             branch_id: {branch_id}, valid_from_rev: {rev}, valid_to_rev: -1}}) \
             RETURN id(n)"
        );
        self.cypher_write(&cypher).await?;
        Ok(())
    }

    async fn close_node(&self, branch_id: i64, global_id: &str, rev: i64) -> Result<()> {
        let gid = validate_global_id(global_id)?;
        let cypher = format!(
            "MATCH (n {{global_id: '{gid}', branch_id: {branch_id}, valid_to_rev: -1}}) \
             SET n.valid_to_rev = {rev} RETURN id(n)"
        );
        self.cypher_write(&cypher).await?;
        Ok(())
    }

    async fn create_edge(
        &self,
        branch_id: i64,
        from_global_id: &str,
        to_global_id: &str,
        label: &str,
        rev: i64,
    ) -> Result<bool> {
        self.ensure_label(label, "e").await?;
        let from = validate_global_id(from_global_id)?;
        let to = validate_global_id(to_global_id)?;
        let cypher = format!(
            "MATCH (a {{global_id: '{from}', branch_id: {branch_id}, valid_to_rev: -1}}), \
                   (b {{global_id: '{to}', branch_id: {branch_id}, valid_to_rev: -1}}) \
             CREATE (a)-[r:{label} {{branch_id: {branch_id}, valid_from_rev: {rev}, \
             valid_to_rev: -1}}]->(b) RETURN id(r)"
        );
        Ok(self.cypher_write(&cypher).await? > 0)
    }

    async fn close_edges_for_node(
        &self,
        branch_id: i64,
        global_id: &str,
        rev: i64,
    ) -> Result<()> {
        let gid = validate_global_id(global_id)?;
        // Outgoing, then incoming; edges are matched through the node's
        // global_id so the node may already be closed.
        let out = format!(
            "MATCH ({{global_id: '{gid}', branch_id: {branch_id}}})\
             -[r {{branch_id: {branch_id}, valid_to_rev: -1}}]->() \
             SET r.valid_to_rev = {rev} RETURN id(r)"
        );
        self.cypher_write(&out).await?;
        let incoming = format!(
            "MATCH ({{global_id: '{gid}', branch_id: {branch_id}}})\
             <-[r {{branch_id: {branch_id}, valid_to_rev: -1}}]-() \
             SET r.valid_to_rev = {rev} RETURN id(r)"
        );
        self.cypher_write(&incoming).await?;
        Ok(())
    }

    async fn purge_branch(&self, branch_id: i64) -> Result<()> {
        let cypher =
            format!("MATCH (n {{branch_id: {branch_id}}}) DETACH DELETE n RETURN count(*)");
        self.cypher_write(&cypher).await?;
        Ok(())
    }

    async fn relations_of(
        &self,
        branch_id: i64,
        global_id: &str,
        rev: i64,
    ) -> Result<Vec<RelatedProduct>> {
        let gid = validate_global_id(global_id)?;

        let out_pattern = format!("(n {{global_id: '{gid}'}})-[r]->(m)");
        let in_pattern = format!("(n {{global_id: '{gid}'}})<-[r]-(m)");
        let mut relations = self
            .neighbors(branch_id, rev, &out_pattern, Direction::Outgoing)
            .await?;
        relations.extend(
            self.neighbors(branch_id, rev, &in_pattern, Direction::Incoming)
                .await?,
        );

        let mut seen: HashSet<(String, String, Direction)> = HashSet::new();
        relations.retain(|rel| {
            seen.insert((
                rel.global_id.clone(),
                rel.relationship.clone(),
                rel.direction,
            ))
        });
        Ok(relations)
    }

    async fn spatial_roots(&self, branch_id: i64, rev: i64) -> Result<Vec<GraphNodeRef>> {
        let cypher = format!(
            "MATCH (p:IfcProject) WHERE {} RETURN p.global_id, label(p), p.name",
            rev_filter("p", branch_id, rev)
        );
        self.node_refs(&cypher).await
    }

    async fn spatial_children(
        &self,
        branch_id: i64,
        global_id: &str,
        rev: i64,
    ) -> Result<Vec<GraphNodeRef>> {
        let gid = validate_global_id(global_id)?;
        let cypher = format!(
            "MATCH (parent {{global_id: '{gid}'}})-[r:IfcRelAggregates]->(child) \
             WHERE {} AND {} AND {} \
             RETURN child.global_id, label(child), child.name",
            rev_filter("parent", branch_id, rev),
            rev_filter("r", branch_id, rev),
            rev_filter("child", branch_id, rev),
        );
        self.node_refs(&cypher).await
    }

    async fn contained_elements(
        &self,
        branch_id: i64,
        global_id: &str,
        rev: i64,
    ) -> Result<Vec<GraphNodeRef>> {
        let gid = validate_global_id(global_id)?;
        let cypher = format!(
            "MATCH (spatial {{global_id: '{gid}'}})\
             <-[r:IfcRelContainedInSpatialStructure]-(elem) \
             WHERE {} AND {} AND {} \
             RETURN elem.global_id, label(elem), elem.name",
            rev_filter("spatial", branch_id, rev),
            rev_filter("r", branch_id, rev),
            rev_filter("elem", branch_id, rev),
        );
        self.node_refs(&cypher).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn graph_name_rules() {
        assert!(validate_graph_name("bimatlas").is_ok());
        assert!(validate_graph_name("bimatlas_test").is_ok());
        assert!(validate_graph_name("1graph").is_err());
        assert!(validate_graph_name("g'; DROP TABLE x").is_err());
    }

    #[test]
    fn dollar_tag_avoids_collisions() {
        assert_eq!(dollar_tag("MATCH (n) RETURN n").unwrap(), "$bim$");
        assert_eq!(dollar_tag("RETURN '$bim$'").unwrap(), "$bimq$");
    }

    #[test]
    fn agtype_scalars_parse_as_json() {
        assert_eq!(
            agtype_scalar(Some("\"IfcWall\"".to_string())),
            JsonValue::String("IfcWall".into())
        );
        assert_eq!(agtype_scalar(Some("42".to_string())), JsonValue::from(42));
        assert_eq!(agtype_scalar(None), JsonValue::Null);
    }

    #[test]
    fn empty_name_reads_as_none() {
        assert_eq!(string_field(&JsonValue::String(String::new())), None);
        assert_eq!(
            string_field(&JsonValue::String("Wall A".into())),
            Some("Wall A".to_string())
        );
    }
}
