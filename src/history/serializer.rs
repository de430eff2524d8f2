//! Artifact serializer task
//!
//! The distinguished terminal task of every inspection: gathers the history
//! builder, serializes it and writes `{inspectionId}.khi` under the data
//! destination folder. Sessions re-declare it with the selected feature
//! references as optional dependencies so it always runs last; the payload
//! layout itself is private to this module.

use std::path::PathBuf;
use std::sync::Arc;

use crate::error::Result;
use crate::task::{Dependency, LabelSet, Task, TaskId, TaskRef};

use super::HistoryBuilder;

/// Reference every inspection's graph terminates at.
pub const SERIALIZE_REFERENCE: &str = "khronicle/serialize";

/// Artifact format version stamped into the payload.
const ARTIFACT_VERSION: u32 = 1;

/// Where the serialized artifact landed.
#[derive(Debug, Clone)]
pub struct ArtifactRef {
    /// `None` in dry-run mode: nothing is written.
    pub path: Option<PathBuf>,
    pub size: u64,
}

pub fn serialize_ref() -> TaskRef<ArtifactRef> {
    TaskRef::new(SERIALIZE_REFERENCE)
}

/// Build the serializer with the given upstream dependencies.
///
/// The server registers a dependency-free instance so the reference always
/// resolves; each session seeds a fresh instance whose dependencies are the
/// selected features.
pub fn serializer_task(dependencies: Vec<Dependency>) -> Arc<Task> {
    Task::typed(
        TaskId::<ArtifactRef>::new(SERIALIZE_REFERENCE),
        dependencies,
        LabelSet::builder().progress_reportable().build(),
        |ctx| async move {
            let builder = HistoryBuilder::from_context(&ctx)?;
            let filename = format!("{}.khi", ctx.inspection_id());
            ctx.metadata().header().set_suggested_filename(&filename);

            if !ctx.mode().is_run() {
                return Ok(ArtifactRef {
                    path: None,
                    size: 0,
                });
            }

            let stats = builder.stats();
            ctx.logger().info(format!(
                "serializing {} resources, {} revisions, {} events, {} logs",
                stats.resources, stats.revisions, stats.events, stats.logs
            ));

            let payload = serde_json::json!({
                "version": ARTIFACT_VERSION,
                "header": ctx.metadata().header().to_value(),
                "history": builder.to_artifact_value(),
            });
            let bytes = serde_json::to_vec(&payload)?;

            let dir = ctx.io().data_dir.clone();
            tokio::fs::create_dir_all(&dir).await?;
            let path = dir.join(&filename);
            tokio::fs::write(&path, &bytes).await?;

            let size = bytes.len() as u64;
            ctx.metadata().header().set_file_size(size);
            ctx.logger()
                .info(format!("artifact written: {} ({size} bytes)", path.display()));

            Ok(ArtifactRef {
                path: Some(path),
                size,
            })
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::builder_key;
    use crate::metadata::MetadataBus;
    use crate::runtime::{ExecutionMode, IoConfig, TaskContext};

    fn context(mode: ExecutionMode, data_dir: PathBuf) -> TaskContext {
        let ctx = TaskContext::builder()
            .mode(mode)
            .inspection_id("insp-test")
            .metadata(MetadataBus::detached())
            .io(IoConfig {
                data_dir,
                ..IoConfig::default()
            })
            .build();
        ctx.session_store()
            .set_arc(&builder_key(), Arc::new(HistoryBuilder::new()));
        ctx
    }

    #[tokio::test]
    async fn dry_run_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(ExecutionMode::DryRun, dir.path().to_path_buf());
        let task = serializer_task(vec![]);

        let value = task.invoke(ctx).await.unwrap();
        let artifact = value.downcast::<ArtifactRef>().unwrap();
        assert!(artifact.path.is_none());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn run_writes_named_artifact_and_header_size() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(ExecutionMode::Run, dir.path().to_path_buf());
        let task = serializer_task(vec![]);

        let value = task.invoke(ctx.clone()).await.unwrap();
        let artifact = value.downcast::<ArtifactRef>().unwrap();
        let path = artifact.path.clone().unwrap();
        assert!(path.ends_with("insp-test.khi"));
        assert_eq!(std::fs::metadata(&path).unwrap().len(), artifact.size);

        let header = ctx.metadata().header().to_value();
        assert_eq!(header["suggestedFilename"], "insp-test.khi");
        assert_eq!(header["fileSize"], artifact.size);
    }

    #[tokio::test]
    async fn missing_builder_is_a_metadata_bug() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = TaskContext::builder()
            .mode(ExecutionMode::Run)
            .io(IoConfig {
                data_dir: dir.path().to_path_buf(),
                ..IoConfig::default()
            })
            .build();
        let task = serializer_task(vec![]);
        let err = task.invoke(ctx).await.unwrap_err();
        assert!(matches!(
            err,
            crate::error::KhronicleError::MetadataMissing { .. }
        ));
    }
}
