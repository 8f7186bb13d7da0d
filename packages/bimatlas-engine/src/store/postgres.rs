//! PostgreSQL adapter: the authoritative relational store.
//!
//! One pooled connection set serves both this adapter and the AGE graph
//! adapter; each connection loads the AGE extension on checkout so graph
//! statements work without per-call setup. All SCD2 mutation happens inside
//! [`RelationalStore::apply_revision`]'s single transaction; after its
//! commit the relational view is consistent regardless of what happens to
//! the graph mirror.

use crate::config::Config;
use crate::diff::diff_products;
use crate::error::{EngineError, Result};
use crate::filter_sets::{FilterLogic, FilterRule, FilterSet};
use crate::model::{
    AppliedRevision, Branch, ChangeType, DiffEntry, ProductFilter, ProductRow, Project, Revision,
    RevisionDiff,
};
use crate::store::RelationalStore;
use async_trait::async_trait;
use bimatlas_ifc::ProductRecord;
use sqlx::postgres::{PgConnection, PgPoolOptions, PgRow};
use sqlx::{Executor, PgPool, Postgres, QueryBuilder, Row};
use std::collections::HashMap;
use std::time::Duration;
use tracing::warn;

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS projects (
    id          BIGSERIAL PRIMARY KEY,
    name        TEXT NOT NULL,
    description TEXT,
    created_at  TIMESTAMPTZ NOT NULL DEFAULT now()
);

CREATE TABLE IF NOT EXISTS branches (
    id          BIGSERIAL PRIMARY KEY,
    project_id  BIGINT NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
    name        TEXT NOT NULL,
    created_at  TIMESTAMPTZ NOT NULL DEFAULT now(),
    UNIQUE (project_id, name)
);

CREATE TABLE IF NOT EXISTS revisions (
    id              BIGSERIAL PRIMARY KEY,
    branch_id       BIGINT NOT NULL REFERENCES branches(id) ON DELETE CASCADE,
    label           TEXT,
    source_filename TEXT NOT NULL,
    created_at      TIMESTAMPTZ NOT NULL DEFAULT now()
);

CREATE TABLE IF NOT EXISTS ifc_products (
    id             BIGSERIAL PRIMARY KEY,
    branch_id      BIGINT NOT NULL REFERENCES branches(id) ON DELETE CASCADE,
    global_id      TEXT NOT NULL,
    ifc_class      TEXT NOT NULL,
    name           TEXT,
    description    TEXT,
    object_type    TEXT,
    tag            TEXT,
    contained_in   TEXT,
    vertices       BYTEA,
    normals        BYTEA,
    faces          BYTEA,
    matrix         BYTEA,
    content_hash   TEXT NOT NULL,
    valid_from_rev BIGINT NOT NULL REFERENCES revisions(id) ON DELETE CASCADE,
    valid_to_rev   BIGINT,
    UNIQUE (branch_id, global_id, valid_from_rev),
    CONSTRAINT ifc_products_window CHECK (valid_to_rev IS NULL OR valid_to_rev > valid_from_rev)
);

CREATE INDEX IF NOT EXISTS idx_ifc_products_open
    ON ifc_products (branch_id, global_id) WHERE valid_to_rev IS NULL;
CREATE INDEX IF NOT EXISTS idx_ifc_products_class
    ON ifc_products (branch_id, ifc_class, valid_to_rev);
CREATE INDEX IF NOT EXISTS idx_ifc_products_container
    ON ifc_products (branch_id, contained_in);
CREATE INDEX IF NOT EXISTS idx_ifc_products_window
    ON ifc_products (branch_id, valid_from_rev, valid_to_rev);

CREATE TABLE IF NOT EXISTS filter_sets (
    id         BIGSERIAL PRIMARY KEY,
    branch_id  BIGINT NOT NULL REFERENCES branches(id) ON DELETE CASCADE,
    name       TEXT NOT NULL,
    logic      TEXT NOT NULL,
    rules      JSONB NOT NULL DEFAULT '[]'::jsonb,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now()
);

CREATE TABLE IF NOT EXISTS applied_filter_sets (
    branch_id     BIGINT NOT NULL REFERENCES branches(id) ON DELETE CASCADE,
    filter_set_id BIGINT NOT NULL REFERENCES filter_sets(id) ON DELETE CASCADE,
    PRIMARY KEY (branch_id, filter_set_id)
);
"#;

pub struct PostgresStore {
    pool: PgPool,
}

const PRODUCT_COLS: &str = "id, branch_id, global_id, ifc_class, name, description, object_type, \
     tag, contained_in, vertices, normals, faces, matrix, content_hash, valid_from_rev, \
     valid_to_rev";

impl PostgresStore {
    /// Connect a pool sized for parallel readers plus the writer. Each
    /// connection loads AGE on checkout; when the extension is absent the
    /// relational side still works and graph calls surface `StoreError`.
    pub async fn connect(config: &Config) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(20)
            .min_connections(2)
            .acquire_timeout(Duration::from_secs(5))
            .after_connect(|conn, _meta| Box::pin(Self::setup_age_session(conn)))
            .connect(&config.database_url())
            .await?;
        Ok(Self { pool })
    }

    async fn setup_age_session(conn: &mut PgConnection) -> std::result::Result<(), sqlx::Error> {
        let setup = conn
            .execute(sqlx::raw_sql(
                "LOAD 'age'; SET search_path = ag_catalog, \"$user\", public;",
            ))
            .await;
        if let Err(err) = setup {
            warn!("AGE session setup failed, graph statements will error: {err}");
        }
        Ok(())
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    fn row_to_product(row: &PgRow) -> Result<ProductRow> {
        Ok(ProductRow {
            id: row.try_get("id")?,
            branch_id: row.try_get("branch_id")?,
            global_id: row.try_get("global_id")?,
            ifc_class: row.try_get("ifc_class")?,
            name: row.try_get("name")?,
            description: row.try_get("description")?,
            object_type: row.try_get("object_type")?,
            tag: row.try_get("tag")?,
            contained_in: row.try_get("contained_in")?,
            vertices: row.try_get("vertices")?,
            normals: row.try_get("normals")?,
            faces: row.try_get("faces")?,
            matrix: row.try_get("matrix")?,
            content_hash: row.try_get("content_hash")?,
            valid_from_rev: row.try_get("valid_from_rev")?,
            valid_to_rev: row.try_get("valid_to_rev")?,
        })
    }

    fn row_to_project(row: &PgRow) -> Result<Project> {
        Ok(Project {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            description: row.try_get("description")?,
            created_at: row.try_get("created_at")?,
        })
    }

    fn row_to_branch(row: &PgRow) -> Result<Branch> {
        Ok(Branch {
            id: row.try_get("id")?,
            project_id: row.try_get("project_id")?,
            name: row.try_get("name")?,
            created_at: row.try_get("created_at")?,
        })
    }

    fn row_to_filter_set(row: &PgRow) -> Result<FilterSet> {
        let logic: String = row.try_get("logic")?;
        let rules: serde_json::Value = row.try_get("rules")?;
        Ok(FilterSet {
            id: row.try_get("id")?,
            branch_id: row.try_get("branch_id")?,
            name: row.try_get("name")?,
            logic: FilterLogic::parse(&logic)
                .ok_or_else(|| EngineError::Store(format!("bad filter logic: {logic}")))?,
            rules: serde_json::from_value(rules)?,
            created_at: row.try_get("created_at")?,
        })
    }

    /// `SELECT {select} FROM ifc_products` with the visibility window and
    /// every supplied predicate.
    fn product_query<'a>(
        select: &str,
        branch_id: i64,
        rev: i64,
        filter: &'a ProductFilter,
    ) -> QueryBuilder<'a, Postgres> {
        let mut qb = QueryBuilder::new(format!("SELECT {select} FROM ifc_products"));
        qb.push(" WHERE branch_id = ").push_bind(branch_id);
        qb.push(" AND valid_from_rev <= ").push_bind(rev);
        qb.push(" AND (valid_to_rev IS NULL OR valid_to_rev > ")
            .push_bind(rev)
            .push(")");

        if !filter.ifc_classes.is_empty() {
            qb.push(" AND ifc_class = ANY(")
                .push_bind(&filter.ifc_classes)
                .push(")");
        }
        if let Some(container) = &filter.contained_in {
            qb.push(" AND contained_in = ").push_bind(container);
        }
        let substrings: [(&str, &Option<String>); 5] = [
            ("global_id", &filter.global_id),
            ("name", &filter.name),
            ("object_type", &filter.object_type),
            ("tag", &filter.tag),
            ("description", &filter.description),
        ];
        for (column, value) in substrings {
            if let Some(value) = value {
                qb.push(format!(" AND {column} ILIKE "))
                    .push_bind(format!("%{value}%"));
            }
        }
        qb
    }
}

#[async_trait]
impl RelationalStore for PostgresStore {
    async fn ensure_schema(&self) -> Result<()> {
        sqlx::raw_sql(SCHEMA_SQL).execute(&self.pool).await?;
        Ok(())
    }

    // ── catalog ─────────────────────────────────────────────────────────

    async fn create_project(
        &self,
        name: &str,
        description: Option<&str>,
    ) -> Result<(Project, Branch)> {
        let mut tx = self.pool.begin().await?;
        let project_row = sqlx::query(
            "INSERT INTO projects (name, description) VALUES ($1, $2) \
             RETURNING id, name, description, created_at",
        )
        .bind(name)
        .bind(description)
        .fetch_one(&mut *tx)
        .await?;
        let project = Self::row_to_project(&project_row)?;

        let branch_row = sqlx::query(
            "INSERT INTO branches (project_id, name) VALUES ($1, 'main') \
             RETURNING id, project_id, name, created_at",
        )
        .bind(project.id)
        .fetch_one(&mut *tx)
        .await?;
        let branch = Self::row_to_branch(&branch_row)?;

        tx.commit().await?;
        Ok((project, branch))
    }

    async fn fetch_project(&self, project_id: i64) -> Result<Option<Project>> {
        let row = sqlx::query(
            "SELECT id, name, description, created_at FROM projects WHERE id = $1",
        )
        .bind(project_id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(Self::row_to_project).transpose()
    }

    async fn list_projects(&self) -> Result<Vec<Project>> {
        let rows =
            sqlx::query("SELECT id, name, description, created_at FROM projects ORDER BY id")
                .fetch_all(&self.pool)
                .await?;
        rows.iter().map(Self::row_to_project).collect()
    }

    async fn delete_project(&self, project_id: i64) -> Result<Vec<i64>> {
        let branch_ids: Vec<i64> =
            sqlx::query_scalar("SELECT id FROM branches WHERE project_id = $1")
                .bind(project_id)
                .fetch_all(&self.pool)
                .await?;
        let deleted = sqlx::query("DELETE FROM projects WHERE id = $1")
            .bind(project_id)
            .execute(&self.pool)
            .await?;
        if deleted.rows_affected() == 0 {
            return Err(EngineError::NotFound(format!("project {project_id}")));
        }
        Ok(branch_ids)
    }

    async fn create_branch(&self, project_id: i64, name: &str) -> Result<Branch> {
        if self.fetch_project(project_id).await?.is_none() {
            return Err(EngineError::NotFound(format!("project {project_id}")));
        }
        // A (project_id, name) conflict surfaces as DuplicateName via the
        // unique constraint.
        let row = sqlx::query(
            "INSERT INTO branches (project_id, name) VALUES ($1, $2) \
             RETURNING id, project_id, name, created_at",
        )
        .bind(project_id)
        .bind(name)
        .fetch_one(&self.pool)
        .await?;
        Self::row_to_branch(&row)
    }

    async fn fetch_branch(&self, branch_id: i64) -> Result<Option<Branch>> {
        let row = sqlx::query(
            "SELECT id, project_id, name, created_at FROM branches WHERE id = $1",
        )
        .bind(branch_id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(Self::row_to_branch).transpose()
    }

    async fn list_branches(&self, project_id: i64) -> Result<Vec<Branch>> {
        let rows = sqlx::query(
            "SELECT id, project_id, name, created_at FROM branches \
             WHERE project_id = $1 ORDER BY id",
        )
        .bind(project_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(Self::row_to_branch).collect()
    }

    // ── revisions ───────────────────────────────────────────────────────

    async fn latest_revision(&self, branch_id: i64) -> Result<Option<i64>> {
        let latest: Option<i64> =
            sqlx::query_scalar("SELECT MAX(id) FROM revisions WHERE branch_id = $1")
                .bind(branch_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(latest)
    }

    async fn list_revisions(&self, branch_id: i64) -> Result<Vec<Revision>> {
        let rows = sqlx::query(
            "SELECT id, branch_id, label, source_filename, created_at \
             FROM revisions WHERE branch_id = $1 ORDER BY id",
        )
        .bind(branch_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter()
            .map(|row| {
                Ok(Revision {
                    id: row.try_get("id")?,
                    branch_id: row.try_get("branch_id")?,
                    label: row.try_get("label")?,
                    source_filename: row.try_get("source_filename")?,
                    created_at: row.try_get("created_at")?,
                })
            })
            .collect()
    }

    // ── SCD2 revision writer ────────────────────────────────────────────

    async fn apply_revision(
        &self,
        branch_id: i64,
        source_filename: &str,
        label: Option<&str>,
        records: &[ProductRecord],
    ) -> Result<AppliedRevision> {
        let mut tx = self.pool.begin().await?;

        // One in-flight ingestion per branch; the lock releases with the
        // transaction.
        let locked: bool = sqlx::query_scalar("SELECT pg_try_advisory_xact_lock($1)")
            .bind(branch_id)
            .fetch_one(&mut *tx)
            .await?;
        if !locked {
            return Err(EngineError::Conflict(format!(
                "branch {branch_id} is under another ingestion"
            )));
        }

        let branch_exists: Option<i64> = sqlx::query_scalar("SELECT id FROM branches WHERE id = $1")
            .bind(branch_id)
            .fetch_optional(&mut *tx)
            .await?;
        if branch_exists.is_none() {
            return Err(EngineError::NotFound(format!("branch {branch_id}")));
        }

        let revision_id: i64 = sqlx::query_scalar(
            "INSERT INTO revisions (branch_id, label, source_filename) \
             VALUES ($1, $2, $3) RETURNING id",
        )
        .bind(branch_id)
        .bind(label)
        .bind(source_filename)
        .fetch_one(&mut *tx)
        .await?;

        let open_rows = sqlx::query(
            "SELECT global_id, content_hash FROM ifc_products \
             WHERE branch_id = $1 AND valid_to_rev IS NULL",
        )
        .bind(branch_id)
        .fetch_all(&mut *tx)
        .await?;
        let mut open = HashMap::with_capacity(open_rows.len());
        for row in &open_rows {
            open.insert(
                row.try_get::<String, _>("global_id")?,
                row.try_get::<String, _>("content_hash")?,
            );
        }

        // The open-window invariant must hold before any update.
        let violations: Vec<String> = sqlx::query_scalar(
            "SELECT global_id FROM ifc_products \
             WHERE branch_id = $1 AND valid_to_rev IS NULL \
             GROUP BY global_id HAVING count(*) > 1",
        )
        .bind(branch_id)
        .fetch_all(&mut *tx)
        .await?;
        if !violations.is_empty() {
            return Err(EngineError::Store(format!(
                "open-window invariant violated on branch {branch_id} for {violations:?}"
            )));
        }

        let new: HashMap<String, String> = records
            .iter()
            .map(|r| (r.global_id.clone(), r.content_hash.clone()))
            .collect();
        let change = diff_products(&new, &open);

        let to_close: Vec<String> = change.closed().cloned().collect();
        if !to_close.is_empty() {
            sqlx::query(
                "UPDATE ifc_products SET valid_to_rev = $1 \
                 WHERE branch_id = $2 AND valid_to_rev IS NULL AND global_id = ANY($3)",
            )
            .bind(revision_id)
            .bind(branch_id)
            .bind(&to_close)
            .execute(&mut *tx)
            .await?;
        }

        let by_gid: HashMap<&str, &ProductRecord> = records
            .iter()
            .map(|r| (r.global_id.as_str(), r))
            .collect();
        for gid in change.inserted() {
            let record = by_gid
                .get(gid.as_str())
                .ok_or_else(|| EngineError::Store(format!("record vanished for {gid}")))?;
            sqlx::query(
                "INSERT INTO ifc_products \
                 (branch_id, global_id, ifc_class, name, description, object_type, tag, \
                  contained_in, vertices, normals, faces, matrix, content_hash, valid_from_rev) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)",
            )
            .bind(branch_id)
            .bind(&record.global_id)
            .bind(record.ifc_class.as_str())
            .bind(record.name.as_deref())
            .bind(record.description.as_deref())
            .bind(record.object_type.as_deref())
            .bind(record.tag.as_deref())
            .bind(record.contained_in.as_deref())
            .bind(record.vertices.as_deref())
            .bind(record.normals.as_deref())
            .bind(record.faces.as_deref())
            .bind(record.matrix.as_deref())
            .bind(&record.content_hash)
            .bind(revision_id)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(AppliedRevision {
            revision_id,
            change,
        })
    }

    // ── product reads ───────────────────────────────────────────────────

    async fn product_at(
        &self,
        branch_id: i64,
        global_id: &str,
        rev: i64,
    ) -> Result<Option<ProductRow>> {
        let row = sqlx::query(&format!(
            "SELECT {PRODUCT_COLS} FROM ifc_products \
             WHERE branch_id = $1 AND global_id = $2 \
               AND valid_from_rev <= $3 AND (valid_to_rev IS NULL OR valid_to_rev > $3) \
             LIMIT 1"
        ))
        .bind(branch_id)
        .bind(global_id)
        .bind(rev)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(Self::row_to_product).transpose()
    }

    async fn products_at(
        &self,
        branch_id: i64,
        rev: i64,
        filter: &ProductFilter,
    ) -> Result<Vec<ProductRow>> {
        let mut qb = Self::product_query(PRODUCT_COLS, branch_id, rev, filter);
        qb.push(" ORDER BY id");
        let rows = qb.build().fetch_all(&self.pool).await?;
        rows.iter().map(Self::row_to_product).collect()
    }

    async fn count_products_at(
        &self,
        branch_id: i64,
        rev: i64,
        filter: &ProductFilter,
    ) -> Result<i64> {
        let mut qb = Self::product_query("count(*)", branch_id, rev, filter);
        let row = qb.build().fetch_one(&self.pool).await?;
        Ok(row.try_get(0)?)
    }

    async fn products_page(
        &self,
        branch_id: i64,
        rev: i64,
        filter: &ProductFilter,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<ProductRow>> {
        let mut qb = Self::product_query(PRODUCT_COLS, branch_id, rev, filter);
        qb.push(" ORDER BY id LIMIT ")
            .push_bind(limit)
            .push(" OFFSET ")
            .push_bind(offset);
        let rows = qb.build().fetch_all(&self.pool).await?;
        rows.iter().map(Self::row_to_product).collect()
    }

    // ── revision diff ───────────────────────────────────────────────────

    async fn revision_diff(
        &self,
        branch_id: i64,
        from_rev: i64,
        to_rev: i64,
    ) -> Result<RevisionDiff> {
        let entries = |rows: Vec<PgRow>, change_type: ChangeType| -> Result<Vec<DiffEntry>> {
            rows.iter()
                .map(|row| {
                    Ok(DiffEntry {
                        global_id: row.try_get("global_id")?,
                        ifc_class: row.try_get("ifc_class")?,
                        name: row.try_get("name")?,
                        change_type,
                    })
                })
                .collect()
        };

        // Visible at `to` with no visible counterpart at `from`.
        let added_rows = sqlx::query(
            "SELECT t.global_id, t.ifc_class, t.name FROM ifc_products t \
             WHERE t.branch_id = $1 \
               AND t.valid_from_rev <= $2 AND (t.valid_to_rev IS NULL OR t.valid_to_rev > $2) \
               AND NOT EXISTS ( \
                   SELECT 1 FROM ifc_products f \
                   WHERE f.branch_id = t.branch_id AND f.global_id = t.global_id \
                     AND f.valid_from_rev <= $3 \
                     AND (f.valid_to_rev IS NULL OR f.valid_to_rev > $3)) \
             ORDER BY t.global_id",
        )
        .bind(branch_id)
        .bind(to_rev)
        .bind(from_rev)
        .fetch_all(&self.pool)
        .await?;

        let deleted_rows = sqlx::query(
            "SELECT f.global_id, f.ifc_class, f.name FROM ifc_products f \
             WHERE f.branch_id = $1 \
               AND f.valid_from_rev <= $2 AND (f.valid_to_rev IS NULL OR f.valid_to_rev > $2) \
               AND NOT EXISTS ( \
                   SELECT 1 FROM ifc_products t \
                   WHERE t.branch_id = f.branch_id AND t.global_id = f.global_id \
                     AND t.valid_from_rev <= $3 \
                     AND (t.valid_to_rev IS NULL OR t.valid_to_rev > $3)) \
             ORDER BY f.global_id",
        )
        .bind(branch_id)
        .bind(from_rev)
        .bind(to_rev)
        .fetch_all(&self.pool)
        .await?;

        // Visible at both, but as different rows.
        let modified_rows = sqlx::query(
            "SELECT t.global_id, t.ifc_class, t.name FROM ifc_products t \
             JOIN ifc_products f \
               ON f.branch_id = t.branch_id AND f.global_id = t.global_id \
             WHERE t.branch_id = $1 \
               AND t.valid_from_rev <= $2 AND (t.valid_to_rev IS NULL OR t.valid_to_rev > $2) \
               AND f.valid_from_rev <= $3 AND (f.valid_to_rev IS NULL OR f.valid_to_rev > $3) \
               AND t.id <> f.id \
             ORDER BY t.global_id",
        )
        .bind(branch_id)
        .bind(to_rev)
        .bind(from_rev)
        .fetch_all(&self.pool)
        .await?;

        Ok(RevisionDiff {
            from_revision: from_rev,
            to_revision: to_rev,
            added: entries(added_rows, ChangeType::Added)?,
            modified: entries(modified_rows, ChangeType::Modified)?,
            deleted: entries(deleted_rows, ChangeType::Deleted)?,
        })
    }

    // ── invariants ──────────────────────────────────────────────────────

    async fn open_window_violations(&self, branch_id: i64) -> Result<Vec<String>> {
        let gids = sqlx::query_scalar(
            "SELECT global_id FROM ifc_products \
             WHERE branch_id = $1 AND valid_to_rev IS NULL \
             GROUP BY global_id HAVING count(*) > 1",
        )
        .bind(branch_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(gids)
    }

    // ── filter sets ─────────────────────────────────────────────────────

    async fn create_filter_set(
        &self,
        branch_id: i64,
        name: &str,
        logic: FilterLogic,
        rules: &[FilterRule],
    ) -> Result<FilterSet> {
        let row = sqlx::query(
            "INSERT INTO filter_sets (branch_id, name, logic, rules) \
             VALUES ($1, $2, $3, $4) \
             RETURNING id, branch_id, name, logic, rules, created_at",
        )
        .bind(branch_id)
        .bind(name)
        .bind(logic.as_str())
        .bind(serde_json::to_value(rules)?)
        .fetch_one(&self.pool)
        .await?;
        Self::row_to_filter_set(&row)
    }

    async fn fetch_filter_set(&self, filter_set_id: i64) -> Result<Option<FilterSet>> {
        let row = sqlx::query(
            "SELECT id, branch_id, name, logic, rules, created_at \
             FROM filter_sets WHERE id = $1",
        )
        .bind(filter_set_id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(Self::row_to_filter_set).transpose()
    }

    async fn update_filter_set(
        &self,
        filter_set_id: i64,
        name: Option<&str>,
        logic: Option<FilterLogic>,
        rules: Option<&[FilterRule]>,
    ) -> Result<Option<FilterSet>> {
        let rules_json = rules.map(serde_json::to_value).transpose()?;
        let row = sqlx::query(
            "UPDATE filter_sets SET \
                 name  = COALESCE($2, name), \
                 logic = COALESCE($3, logic), \
                 rules = COALESCE($4, rules) \
             WHERE id = $1 \
             RETURNING id, branch_id, name, logic, rules, created_at",
        )
        .bind(filter_set_id)
        .bind(name)
        .bind(logic.map(|l| l.as_str()))
        .bind(rules_json)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(Self::row_to_filter_set).transpose()
    }

    async fn delete_filter_set(&self, filter_set_id: i64) -> Result<bool> {
        let deleted = sqlx::query("DELETE FROM filter_sets WHERE id = $1")
            .bind(filter_set_id)
            .execute(&self.pool)
            .await?;
        Ok(deleted.rows_affected() > 0)
    }

    async fn list_filter_sets(&self, branch_id: i64) -> Result<Vec<FilterSet>> {
        let rows = sqlx::query(
            "SELECT id, branch_id, name, logic, rules, created_at \
             FROM filter_sets WHERE branch_id = $1 ORDER BY id",
        )
        .bind(branch_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(Self::row_to_filter_set).collect()
    }

    async fn search_filter_sets(
        &self,
        query: &str,
        project_id: Option<i64>,
        branch_id: Option<i64>,
    ) -> Result<Vec<FilterSet>> {
        let mut qb: QueryBuilder<Postgres> = QueryBuilder::new(
            "SELECT fs.id, fs.branch_id, fs.name, fs.logic, fs.rules, fs.created_at \
             FROM filter_sets fs JOIN branches b ON b.id = fs.branch_id WHERE fs.name ILIKE ",
        );
        qb.push_bind(format!("%{query}%"));
        if let Some(project_id) = project_id {
            qb.push(" AND b.project_id = ").push_bind(project_id);
        }
        if let Some(branch_id) = branch_id {
            qb.push(" AND fs.branch_id = ").push_bind(branch_id);
        }
        qb.push(" ORDER BY fs.id");
        let rows = qb.build().fetch_all(&self.pool).await?;
        rows.iter().map(Self::row_to_filter_set).collect()
    }

    async fn set_applied_filter_sets(
        &self,
        branch_id: i64,
        filter_set_ids: &[i64],
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM applied_filter_sets WHERE branch_id = $1")
            .bind(branch_id)
            .execute(&mut *tx)
            .await?;
        for id in filter_set_ids {
            sqlx::query(
                "INSERT INTO applied_filter_sets (branch_id, filter_set_id) VALUES ($1, $2) \
                 ON CONFLICT DO NOTHING",
            )
            .bind(branch_id)
            .bind(id)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn applied_filter_sets(&self, branch_id: i64) -> Result<Vec<FilterSet>> {
        let rows = sqlx::query(
            "SELECT fs.id, fs.branch_id, fs.name, fs.logic, fs.rules, fs.created_at \
             FROM filter_sets fs \
             JOIN applied_filter_sets a ON a.filter_set_id = fs.id \
             WHERE a.branch_id = $1 ORDER BY fs.id",
        )
        .bind(branch_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(Self::row_to_filter_set).collect()
    }
}
