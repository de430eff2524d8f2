//! # Khronicle
//!
//! Interactive log-history reconstruction for Kubernetes clusters.
//!
//! Given a heterogeneous pile of cluster logs (audit events, container
//! runtime events, autoscaler decisions, node serial output), khronicle
//! reconstructs a timeline of every resource's revisions and events and
//! materializes it as one downloadable `.khi` artifact, streaming progress
//! and form metadata to an interactive frontend while it works.
//!
//! The interesting part is the task-graph runtime underneath; the HTTP
//! surface is thin glue over it.
//!
//! ## Modules
//!
//! | Module | Responsibility |
//! |--------|----------------|
//! | [`typedmap`] | Typed-key heterogeneous maps (labels, shared stores) |
//! | [`task`] | Task identity, labels, descriptors, sets |
//! | [`dag`] | Dependency resolution: candidates, cycles, topological order |
//! | [`runtime`] | Contexts, run-context options, the concurrent local runner |
//! | [`metadata`] | The per-run metadata bus (header, progress, forms, logs) |
//! | [`inspection`] | Sessions, interceptors, the process-wide registry |
//! | [`form`] | Form-task builders (text, set, file) |
//! | [`pipeline`] | Log-pipeline task shapes (read, filter, group, map, cache) |
//! | [`history`] | Timeline model, change sets, the artifact serializer |
//! | [`server`] | axum handlers for the HTTP surface |
//! | [`preset`] | Built-in inspection types and the JSONL audit pipeline |
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use khronicle::inspection::InspectionServer;
//! use khronicle::runtime::IoConfig;
//!
//! let server = InspectionServer::new(IoConfig::default(), 1 << 30);
//! khronicle::preset::register(&server)?;
//!
//! let session = server.create_inspection("gke")?;
//! let metadata = session.dry_run(Default::default()).await?;   // form fields
//! session.run(inputs)?;                                        // one-shot
//! session.wait().await;
//! let result = session.result()?;                              // artifact + metadata
//! ```

pub mod config;
pub mod dag;
pub mod error;
pub mod form;
pub mod history;
pub mod inspection;
pub mod logging;
pub mod metadata;
pub mod pipeline;
pub mod preset;
pub mod runtime;
pub mod server;
pub mod task;
pub mod typedmap;
pub mod upload;
pub mod util;

pub use error::{KhronicleError, Result};
pub use inspection::{InspectionRunner, InspectionServer, InspectionType, SessionPhase};
pub use metadata::{MetadataBus, MetadataScope, Phase};
pub use runtime::{ExecutionMode, IoConfig, LocalRunner, TaskContext};
pub use task::{Dependency, LabelSet, Task, TaskId, TaskRef, TaskSet};
