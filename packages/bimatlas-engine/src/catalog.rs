//! Project/branch catalog operations.

use crate::deadline::Deadline;
use crate::engine::Engine;
use crate::error::{EngineError, Result};
use crate::model::{Branch, Project};
use tracing::{info, warn};

impl Engine {
    /// Create a project; a branch named `main` is created with it in the
    /// same transaction.
    pub async fn create_project(
        &self,
        name: &str,
        description: Option<&str>,
        deadline: Deadline,
    ) -> Result<(Project, Branch)> {
        deadline
            .run("create_project", async {
                let (project, branch) = self
                    .relational()
                    .create_project(name, description)
                    .await?;
                info!(project_id = project.id, name, "created project");
                Ok((project, branch))
            })
            .await
    }

    pub async fn project(&self, project_id: i64, deadline: Deadline) -> Result<Project> {
        deadline
            .run("project", async {
                self.relational()
                    .fetch_project(project_id)
                    .await?
                    .ok_or_else(|| EngineError::NotFound(format!("project {project_id}")))
            })
            .await
    }

    pub async fn projects(&self, deadline: Deadline) -> Result<Vec<Project>> {
        deadline.run("projects", self.relational().list_projects()).await
    }

    /// Delete a project and everything below it. The relational side
    /// cascades; the graph side is purged best-effort per branch (a failed
    /// purge leaks space, never correctness, since all reads are
    /// branch-scoped).
    pub async fn delete_project(&self, project_id: i64, deadline: Deadline) -> Result<()> {
        let branch_ids = deadline
            .run("delete_project", self.relational().delete_project(project_id))
            .await?;
        info!(project_id, branches = branch_ids.len(), "deleted project");
        for branch_id in branch_ids {
            if let Err(err) = self.graph().purge_branch(branch_id).await {
                warn!(branch_id, "failed to purge graph for deleted branch: {err}");
            }
        }
        Ok(())
    }

    /// Branches always start empty; state is never copied from another
    /// branch.
    pub async fn create_branch(
        &self,
        project_id: i64,
        name: &str,
        deadline: Deadline,
    ) -> Result<Branch> {
        deadline
            .run("create_branch", async {
                let branch = self.relational().create_branch(project_id, name).await?;
                info!(project_id, branch_id = branch.id, name, "created branch");
                Ok(branch)
            })
            .await
    }

    pub async fn branch(&self, branch_id: i64, deadline: Deadline) -> Result<Branch> {
        deadline
            .run("branch", async {
                self.relational()
                    .fetch_branch(branch_id)
                    .await?
                    .ok_or_else(|| EngineError::NotFound(format!("branch {branch_id}")))
            })
            .await
    }

    pub async fn branches(&self, project_id: i64, deadline: Deadline) -> Result<Vec<Branch>> {
        deadline
            .run("branches", async {
                if self.relational().fetch_project(project_id).await?.is_none() {
                    return Err(EngineError::NotFound(format!("project {project_id}")));
                }
                self.relational().list_branches(project_id).await
            })
            .await
    }
}
