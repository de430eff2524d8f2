//! Timeline history model
//!
//! The reconstruction target: per-resource revision/event timelines plus the
//! ingested logs backing them. Tasks never touch the inner maps directly;
//! they batch mutations into a [`ChangeSet`] per log and apply it atomically
//! against the shared [`HistoryBuilder`].

mod builder;
mod changeset;
pub mod serializer;

pub use builder::{HistoryBuilder, HistoryStats};
pub use changeset::{ChangeSet, ResourceAlias, ResourceEvent, ResourceRevision, RevisionVerb};

use crate::error::{KhronicleError, Result};
use crate::runtime::TaskContext;
use crate::typedmap::TypedKey;
use std::sync::Arc;

/// Session-store key the history builder is published under.
pub fn builder_key() -> TypedKey<HistoryBuilder> {
    TypedKey::new("khronicle.history.builder")
}

impl HistoryBuilder {
    /// The run's shared builder, published by the server's run-context
    /// option before any task starts. Absence is a wiring bug.
    pub fn from_context(ctx: &TaskContext) -> Result<Arc<HistoryBuilder>> {
        ctx.session_store()
            .get(&builder_key())
            .ok_or_else(|| KhronicleError::MetadataMissing {
                key: builder_key().name().to_string(),
            })
    }
}
