//! BimAtlas core: versioned IFC ingestion and query engine.
//!
//! Ingests IFC 4.3 models into a bitemporal store and serves them to
//! 3D/graph front-ends. Each upload becomes a revision on a branch: the
//! extraction is diffed against the branch's open rows with SCD Type 2
//! semantics, the delta lands in the relational store in one transaction
//! (the point of truth), and the change is mirrored into a property graph
//! for topological queries. Reads are point/range/tree/diff/stream, all
//! scoped by `(branch, revision)` with time travel to any past revision.
//!
//! Storage is behind the [`store::RelationalStore`] and
//! [`store::GraphStore`] ports: Postgres and Apache AGE in production
//! (one shared pool), in-memory adapters for tests.
//!
//! ```no_run
//! use bimatlas_engine::{Config, Deadline, Engine};
//!
//! # async fn demo() -> bimatlas_engine::Result<()> {
//! let engine = Engine::connect(&Config::from_env()).await?;
//! let (_, main) = engine.create_project("HQ", None, Deadline::NONE).await?;
//! let result = engine
//!     .ingest_file("building.ifc", main.id, Some("initial upload"), Deadline::NONE)
//!     .await?;
//! println!("revision {} (+{})", result.revision_id, result.counts.added);
//! # Ok(())
//! # }
//! ```

mod catalog;
mod config;
mod deadline;
mod diff;
mod engine;
mod error;
mod filter_sets;
mod hierarchy;
mod ingest;
mod model;
mod query;
mod stream;
pub mod store;

pub use config::Config;
pub use deadline::Deadline;
pub use diff::{diff_products, ChangeSet};
pub use engine::Engine;
pub use error::{EngineError, Result};
pub use filter_sets::{FilterAttribute, FilterLogic, FilterRule, FilterSet};
pub use hierarchy::expand_classes;
pub use model::{
    AppliedRevision, Branch, ChangeType, ContainerRef, DiffEntry, Direction, GraphNodeRef,
    IngestionCounts, IngestionResult, MeshPayload, Product, ProductFilter, ProductRow, Project,
    RelatedProduct, Revision, RevisionDiff, SpatialNode,
};
pub use stream::{sse_frame, ProductEvent};
