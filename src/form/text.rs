//! Text form tasks

use std::sync::Arc;

use serde_json::Value;

use crate::error::{KhronicleError, Result};
use crate::metadata::{FormField, FormFieldType, HintType};
use crate::runtime::TaskContext;
use crate::task::{Dependency, LabelSet, Task, TaskId};

use super::{previous_value, store_previous_value};

type DefaultFn = Arc<dyn Fn(&TaskContext, Option<String>) -> String + Send + Sync>;
type ValidatorFn = Arc<dyn Fn(&TaskContext, &str) -> Option<String> + Send + Sync>;
type ConverterFn<T> = Arc<dyn Fn(&str) -> std::result::Result<T, String> + Send + Sync>;

/// Builder for a single-string form task producing a typed value.
pub struct TextFormBuilder<T> {
    id: TaskId<T>,
    label: String,
    description: String,
    dependencies: Vec<Dependency>,
    labels: LabelSetSource,
    default_fn: DefaultFn,
    validator: Option<ValidatorFn>,
    converter: ConverterFn<T>,
    suggestions: Vec<String>,
}

enum LabelSetSource {
    Default,
    Explicit(LabelSet),
}

impl<T> TextFormBuilder<T>
where
    T: Send + Sync + 'static,
{
    pub fn new(
        id: TaskId<T>,
        label: impl Into<String>,
        converter: impl Fn(&str) -> std::result::Result<T, String> + Send + Sync + 'static,
    ) -> Self {
        Self {
            id,
            label: label.into(),
            description: String::new(),
            dependencies: Vec::new(),
            labels: LabelSetSource::Default,
            // The stored previous value wins over the static default.
            default_fn: Arc::new(|_, prev| prev.unwrap_or_default()),
            validator: None,
            converter: Arc::new(converter),
            suggestions: Vec::new(),
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

    pub fn labels(mut self, labels: LabelSet) -> Self {
        self.labels = LabelSetSource::Explicit(labels);
        self
    }

    /// Static default; the previously accepted value still wins.
    pub fn default_value(mut self, default: impl Into<String>) -> Self {
        let default = default.into();
        self.default_fn = Arc::new(move |_, prev| prev.unwrap_or_else(|| default.clone()));
        self
    }

    /// Fully custom default generator.
    pub fn default_fn(
        mut self,
        f: impl Fn(&TaskContext, Option<String>) -> String + Send + Sync + 'static,
    ) -> Self {
        self.default_fn = Arc::new(f);
        self
    }

    /// Validator returning an error message for rejected input.
    pub fn validator(
        mut self,
        f: impl Fn(&TaskContext, &str) -> Option<String> + Send + Sync + 'static,
    ) -> Self {
        self.validator = Some(Arc::new(f));
        self
    }

    pub fn suggestions<I, S>(mut self, suggestions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.suggestions = suggestions.into_iter().map(Into::into).collect();
        self
    }

    pub fn build(self) -> Arc<Task> {
        let reference = self.id.reference().name().to_string();
        let labels = match self.labels {
            LabelSetSource::Explicit(labels) => labels,
            LabelSetSource::Default => LabelSet::builder()
                .form(self.label.clone(), self.description.clone())
                .build(),
        };
        let label = self.label;
        let description = self.description;
        let default_fn = self.default_fn;
        let validator = self.validator;
        let converter = self.converter;
        let suggestions = self.suggestions;

        Task::typed(self.id, self.dependencies, labels, move |ctx| {
            let reference = reference.clone();
            let label = label.clone();
            let description = description.clone();
            let default_fn = Arc::clone(&default_fn);
            let validator = validator.clone();
            let converter = Arc::clone(&converter);
            let suggestions = suggestions.clone();
            async move {
                let previous = previous_value(&ctx, &reference).and_then(|v| match v {
                    Value::String(s) => Some(s),
                    _ => None,
                });
                let default = default_fn(&ctx, previous);

                let raw = match ctx.input(&reference) {
                    None => None,
                    Some(Value::String(s)) => Some(s.clone()),
                    Some(_) => {
                        return Err(KhronicleError::InputShape {
                            field: reference,
                            expected: "string".into(),
                        })
                    }
                };
                let mut value = raw.unwrap_or_else(|| default.clone());

                let mut hint = String::new();
                let mut hint_type = HintType::None;
                if let Some(validator) = &validator {
                    if let Some(message) = validator(&ctx, &value) {
                        if ctx.mode().is_run() {
                            publish(&ctx, &reference, &label, &description, &default, &suggestions, &message, HintType::Error);
                            return Err(KhronicleError::FormValidation {
                                field: reference,
                                message,
                            });
                        }
                        // Dry-run: surface the message, proceed with default.
                        hint = message;
                        hint_type = HintType::Error;
                        value = default.clone();
                    }
                }

                let converted = converter(&value).map_err(|message| {
                    KhronicleError::FormConversion {
                        field: reference.clone(),
                        message,
                    }
                })?;

                publish(&ctx, &reference, &label, &description, &default, &suggestions, &hint, hint_type);

                if ctx.mode().is_run() {
                    store_previous_value(&ctx, &reference, Value::String(value));
                }
                Ok(converted)
            }
        })
    }
}

#[allow(clippy::too_many_arguments)]
fn publish(
    ctx: &TaskContext,
    reference: &str,
    label: &str,
    description: &str,
    default: &str,
    suggestions: &[String],
    hint: &str,
    hint_type: HintType,
) {
    let mut field = FormField::new(reference, FormFieldType::Text);
    field.label = label.to_string();
    field.description = description.to_string();
    field.default = Value::String(default.to_string());
    field.suggestions = suggestions.to_vec();
    field.hint = hint.to_string();
    field.hint_type = hint_type;
    ctx.metadata().form_fields().publish(field);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::ExecutionMode;
    use crate::util::parse_duration;
    use std::time::Duration;

    fn duration_form() -> Arc<Task> {
        TextFormBuilder::new(TaskId::<Duration>::new("duration"), "Query duration", |s| {
            parse_duration(s).ok_or_else(|| format!("invalid duration: {s}"))
        })
        .description("How far back to reconstruct")
        .default_value("1h")
        .validator(|_, s| {
            if parse_duration(s).is_none() {
                Some(format!("'{s}' is not a duration"))
            } else {
                None
            }
        })
        .build()
    }

    fn ctx(mode: ExecutionMode, value: Option<&str>) -> TaskContext {
        let mut inputs = serde_json::Map::new();
        if let Some(v) = value {
            inputs.insert("duration".into(), Value::String(v.into()));
        }
        TaskContext::builder().mode(mode).inputs(inputs).build()
    }

    #[tokio::test]
    async fn missing_input_falls_back_to_default() {
        let task = duration_form();
        let value = task.invoke(ctx(ExecutionMode::Run, None)).await.unwrap();
        let duration = value.downcast::<Duration>().unwrap();
        assert_eq!(*duration, Duration::from_secs(3600));
    }

    #[tokio::test]
    async fn provided_input_is_converted() {
        let task = duration_form();
        let value = task
            .invoke(ctx(ExecutionMode::Run, Some("3h30m")))
            .await
            .unwrap();
        let duration = value.downcast::<Duration>().unwrap();
        assert_eq!(*duration, Duration::from_secs(3 * 3600 + 30 * 60));
    }

    #[tokio::test]
    async fn run_mode_rejects_invalid_input() {
        let task = duration_form();
        let err = task
            .invoke(ctx(ExecutionMode::Run, Some("soon")))
            .await
            .unwrap_err();
        assert!(matches!(err, KhronicleError::FormValidation { .. }));
    }

    #[tokio::test]
    async fn dry_run_absorbs_invalid_input_into_hint() {
        let task = duration_form();
        let context = ctx(ExecutionMode::DryRun, Some("soon"));
        let value = task.invoke(context.clone()).await.unwrap();
        // Fell back to the default.
        assert_eq!(*value.downcast::<Duration>().unwrap(), Duration::from_secs(3600));

        let field = context.metadata().form_fields().get("duration").unwrap();
        assert_eq!(field.hint_type, HintType::Error);
        assert!(field.hint.contains("not a duration"));
    }

    #[tokio::test]
    async fn wrong_shape_fails_both_modes() {
        let task = duration_form();
        let mut inputs = serde_json::Map::new();
        inputs.insert("duration".into(), Value::Bool(true));
        let context = TaskContext::builder()
            .mode(ExecutionMode::DryRun)
            .inputs(inputs)
            .build();
        assert!(matches!(
            task.invoke(context).await.unwrap_err(),
            KhronicleError::InputShape { .. }
        ));
    }

    #[tokio::test]
    async fn run_mode_stores_previous_value_as_new_default() {
        let task = duration_form();
        let context = ctx(ExecutionMode::Run, Some("2h"));
        task.invoke(context.clone()).await.unwrap();

        // Same process store, fresh dry-run with no input: default reflects
        // the stored previous value.
        let dry = TaskContext::builder()
            .mode(ExecutionMode::DryRun)
            .process_store(context.process_store().clone())
            .build();
        task.invoke(dry.clone()).await.unwrap();
        let field = dry.metadata().form_fields().get("duration").unwrap();
        assert_eq!(field.default, Value::String("2h".into()));
    }
}
