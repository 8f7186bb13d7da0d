//! Revision-scoped reads.
//!
//! Joins relational rows (attributes, mesh blobs) with graph traversal
//! (relations, spatial tree). `revision` defaults to the latest on the
//! branch; all operations are branch-scoped.

use crate::deadline::Deadline;
use crate::engine::Engine;
use crate::error::{EngineError, Result};
use crate::hierarchy::expand_classes;
use crate::model::{
    ContainerRef, GraphNodeRef, Product, ProductFilter, Revision, RevisionDiff, SpatialNode,
};
use crate::store::{row_to_product, validate::validate_global_id};
use futures::future::BoxFuture;
use tracing::warn;

impl Engine {
    /// Single visible product, enriched with mesh blobs, the spatial
    /// container reference, and graph relations.
    pub async fn product(
        &self,
        branch_id: i64,
        global_id: &str,
        revision: Option<i64>,
        deadline: Deadline,
    ) -> Result<Product> {
        deadline
            .run("product", async {
                validate_global_id(global_id)?;
                let rev = self.resolve_revision(branch_id, revision).await?;
                let row = self
                    .relational()
                    .product_at(branch_id, global_id, rev)
                    .await?
                    .ok_or_else(|| {
                        EngineError::NotFound(format!(
                            "product {global_id} at revision {rev} on branch {branch_id}"
                        ))
                    })?;

                let mut product = row_to_product(&row);

                if let Some(container_gid) = &row.contained_in {
                    product.contained_in = self
                        .relational()
                        .product_at(branch_id, container_gid, rev)
                        .await?
                        .map(|container| ContainerRef {
                            global_id: container.global_id,
                            ifc_class: container.ifc_class,
                            name: container.name,
                        });
                }

                // The graph may trail the relational store within one
                // ingestion; degrade to no relations rather than failing
                // the read.
                product.relations = match self
                    .graph()
                    .relations_of(branch_id, global_id, rev)
                    .await
                {
                    Ok(relations) => relations,
                    Err(err) => {
                        warn!(branch_id, global_id, "graph relations unavailable: {err}");
                        Vec::new()
                    }
                };

                Ok(product)
            })
            .await
    }

    /// Products visible at the revision matching *all* supplied filters.
    /// Class filters are expanded to IFC-hierarchy descendants client-side.
    pub async fn products(
        &self,
        branch_id: i64,
        revision: Option<i64>,
        mut filter: ProductFilter,
        deadline: Deadline,
    ) -> Result<Vec<Product>> {
        deadline
            .run("products", async {
                let rev = self.resolve_revision(branch_id, revision).await?;
                filter.ifc_classes = expand_classes(&filter.ifc_classes);
                let rows = self
                    .relational()
                    .products_at(branch_id, rev, &filter)
                    .await?;
                Ok(rows.iter().map(row_to_product).collect())
            })
            .await
    }

    /// Root-down spatial decomposition tree with directly-contained
    /// elements at every level.
    pub async fn spatial_tree(
        &self,
        branch_id: i64,
        revision: Option<i64>,
        deadline: Deadline,
    ) -> Result<Vec<SpatialNode>> {
        deadline
            .run("spatial_tree", async {
                let rev = self.resolve_revision(branch_id, revision).await?;
                let roots = self.graph().spatial_roots(branch_id, rev).await?;
                let mut tree = Vec::with_capacity(roots.len());
                for root in roots {
                    tree.push(self.build_subtree(branch_id, rev, root).await?);
                }
                Ok(tree)
            })
            .await
    }

    fn build_subtree<'a>(
        &'a self,
        branch_id: i64,
        rev: i64,
        node: GraphNodeRef,
    ) -> BoxFuture<'a, Result<SpatialNode>> {
        Box::pin(async move {
            let child_refs = self
                .graph()
                .spatial_children(branch_id, &node.global_id, rev)
                .await?;
            let contained_elements = self
                .graph()
                .contained_elements(branch_id, &node.global_id, rev)
                .await?;
            let mut children = Vec::with_capacity(child_refs.len());
            for child in child_refs {
                children.push(self.build_subtree(branch_id, rev, child).await?);
            }
            Ok(SpatialNode {
                global_id: node.global_id,
                ifc_class: node.ifc_class,
                name: node.name,
                children,
                contained_elements,
            })
        })
    }

    /// Ordered revision history of a branch.
    pub async fn revisions(&self, branch_id: i64, deadline: Deadline) -> Result<Vec<Revision>> {
        deadline
            .run("revisions", async {
                if self.relational().fetch_branch(branch_id).await?.is_none() {
                    return Err(EngineError::NotFound(format!("branch {branch_id}")));
                }
                self.relational().list_revisions(branch_id).await
            })
            .await
    }

    /// Symmetric SCD2 state comparison between two revisions of a branch.
    pub async fn revision_diff(
        &self,
        branch_id: i64,
        from_rev: i64,
        to_rev: i64,
        deadline: Deadline,
    ) -> Result<RevisionDiff> {
        deadline
            .run("revision_diff", async {
                if self.relational().fetch_branch(branch_id).await?.is_none() {
                    return Err(EngineError::NotFound(format!("branch {branch_id}")));
                }
                self.relational()
                    .revision_diff(branch_id, from_rev, to_rev)
                    .await
            })
            .await
    }
}
