//! File form tasks
//!
//! Pairs with the upload store: the task issues an upload token, publishes it
//! in the field descriptor, and surfaces the token's status as the field
//! hint. A run requires the file to be in place; a dry-run just reports.

use std::path::PathBuf;
use std::sync::Arc;

use crate::error::{KhronicleError, Result};
use crate::metadata::{FormField, FormFieldType, HintType};
use crate::task::{Dependency, LabelSet, Task, TaskId};
use crate::upload::{upload_store_key, UploadStatus};

/// Output of a file form task.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub token: String,
    /// Present once the upload completed.
    pub path: Option<PathBuf>,
    pub size: u64,
}

/// Builder for a file-upload form task.
pub struct FileFormBuilder {
    id: TaskId<UploadedFile>,
    label: String,
    description: String,
    dependencies: Vec<Dependency>,
}

impl FileFormBuilder {
    pub fn new(id: TaskId<UploadedFile>, label: impl Into<String>) -> Self {
        Self {
            id,
            label: label.into(),
            description: String::new(),
            dependencies: Vec::new(),
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn dependencies(mut self, dependencies: Vec<Dependency>) -> Self {
        self.dependencies = dependencies;
        self
    }

    pub fn build(self) -> Arc<Task> {
        let reference = self.id.reference().name().to_string();
        let labels = LabelSet::builder()
            .form(self.label.clone(), self.description.clone())
            .build();
        let label = self.label;
        let description = self.description;

        Task::typed(self.id, self.dependencies, labels, move |ctx| {
            let reference = reference.clone();
            let label = label.clone();
            let description = description.clone();
            async move {
                let store = ctx.process_store().get(&upload_store_key()).ok_or_else(|| {
                    KhronicleError::MetadataMissing {
                        key: upload_store_key().name().to_string(),
                    }
                })?;

                // Token is stable per inspection and field, so repeated
                // dry-runs keep pointing the frontend at the same slot.
                let token = format!("{}-{}", ctx.inspection_id(), reference);
                let status = store.register(&token);

                let (hint, hint_type) = match &status {
                    UploadStatus::Waiting => {
                        ("waiting for file upload".to_string(), HintType::Info)
                    }
                    UploadStatus::Uploaded { size, .. } => {
                        (format!("received {size} bytes"), HintType::None)
                    }
                };

                let mut field = FormField::new(&reference, FormFieldType::File);
                field.label = label;
                field.description = description;
                field.hint = hint;
                field.hint_type = hint_type;
                field.upload_token = Some(token.clone());
                ctx.metadata().form_fields().publish(field);

                match status {
                    UploadStatus::Uploaded { path, size } => Ok(UploadedFile {
                        token,
                        path: Some(path),
                        size,
                    }),
                    UploadStatus::Waiting if ctx.mode().is_run() => {
                        Err(KhronicleError::FormValidation {
                            field: reference,
                            message: "no file uploaded for this field".into(),
                        })
                    }
                    UploadStatus::Waiting => Ok(UploadedFile {
                        token,
                        path: None,
                        size: 0,
                    }),
                }
            }
        })
    }
}
