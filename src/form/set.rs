//! Multi-select (set) form tasks

use std::sync::Arc;

use serde_json::Value;

use crate::error::{KhronicleError, Result};
use crate::metadata::{FormField, FormFieldType, FormOption, HintType};
use crate::runtime::TaskContext;
use crate::task::{Dependency, LabelSet, Task, TaskId};

use super::{previous_value, store_previous_value};

type OptionsFn = Arc<dyn Fn(&TaskContext) -> Vec<FormOption> + Send + Sync>;
type DefaultFn = Arc<dyn Fn(&TaskContext, Option<Vec<String>>) -> Vec<String> + Send + Sync>;
type ConverterFn<T> = Arc<dyn Fn(Vec<String>) -> std::result::Result<T, String> + Send + Sync>;

/// Builder for a multi-string form task.
pub struct SetFormBuilder<T> {
    id: TaskId<T>,
    label: String,
    description: String,
    dependencies: Vec<Dependency>,
    options_fn: OptionsFn,
    default_fn: DefaultFn,
    converter: ConverterFn<T>,
    allow_custom_value: bool,
    allow_add_all: bool,
    allow_remove_all: bool,
}

impl SetFormBuilder<Vec<String>> {
    /// Set form whose value is the selected strings themselves.
    pub fn new(id: TaskId<Vec<String>>, label: impl Into<String>) -> Self {
        Self::with_converter(id, label, Ok)
    }
}

impl<T> SetFormBuilder<T>
where
    T: Send + Sync + 'static,
{
    pub fn with_converter(
        id: TaskId<T>,
        label: impl Into<String>,
        converter: impl Fn(Vec<String>) -> std::result::Result<T, String> + Send + Sync + 'static,
    ) -> Self {
        Self {
            id,
            label: label.into(),
            description: String::new(),
            dependencies: Vec::new(),
            options_fn: Arc::new(|_| Vec::new()),
            default_fn: Arc::new(|_, prev| prev.unwrap_or_default()),
            converter: Arc::new(converter),
            allow_custom_value: false,
            allow_add_all: true,
            allow_remove_all: true,
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

    /// Static option list.
    pub fn options<I, S>(mut self, options: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let options: Vec<FormOption> = options.into_iter().map(|o| FormOption::new(o)).collect();
        self.options_fn = Arc::new(move |_| options.clone());
        self
    }

    /// Options computed per run, typically from an upstream task result.
    pub fn options_fn(
        mut self,
        f: impl Fn(&TaskContext) -> Vec<FormOption> + Send + Sync + 'static,
    ) -> Self {
        self.options_fn = Arc::new(f);
        self
    }

    pub fn default_fn(
        mut self,
        f: impl Fn(&TaskContext, Option<Vec<String>>) -> Vec<String> + Send + Sync + 'static,
    ) -> Self {
        self.default_fn = Arc::new(f);
        self
    }

    pub fn allow_custom_value(mut self, allow: bool) -> Self {
        self.allow_custom_value = allow;
        self
    }

    pub fn allow_add_all(mut self, allow: bool) -> Self {
        self.allow_add_all = allow;
        self
    }

    pub fn allow_remove_all(mut self, allow: bool) -> Self {
        self.allow_remove_all = allow;
        self
    }

    pub fn build(self) -> Arc<Task> {
        let reference = self.id.reference().name().to_string();
        let labels = LabelSet::builder()
            .form(self.label.clone(), self.description.clone())
            .build();
        let label = self.label;
        let description = self.description;
        let options_fn = self.options_fn;
        let default_fn = self.default_fn;
        let converter = self.converter;
        let allow_custom_value = self.allow_custom_value;
        let allow_add_all = self.allow_add_all;
        let allow_remove_all = self.allow_remove_all;

        Task::typed(self.id, self.dependencies, labels, move |ctx| {
            let reference = reference.clone();
            let label = label.clone();
            let description = description.clone();
            let options_fn = Arc::clone(&options_fn);
            let default_fn = Arc::clone(&default_fn);
            let converter = Arc::clone(&converter);
            async move {
                let options = options_fn(&ctx);
                let previous = previous_value(&ctx, &reference).and_then(|v| string_list(&v));
                let default = default_fn(&ctx, previous);

                let raw = match ctx.input(&reference) {
                    None => None,
                    Some(value) => Some(string_list(value).ok_or_else(|| {
                        KhronicleError::InputShape {
                            field: reference.clone(),
                            expected: "array of strings".into(),
                        }
                    })?),
                };
                let mut selected = raw.unwrap_or_else(|| default.clone());

                let mut hint = String::new();
                let mut hint_type = HintType::None;
                if !allow_custom_value {
                    let unknown: Vec<&String> = selected
                        .iter()
                        .filter(|s| !options.iter().any(|o| &o.id == *s))
                        .collect();
                    if !unknown.is_empty() {
                        let message = format!(
                            "unknown values: {}",
                            unknown
                                .iter()
                                .map(|s| s.as_str())
                                .collect::<Vec<_>>()
                                .join(", ")
                        );
                        if ctx.mode().is_run() {
                            return Err(KhronicleError::FormValidation {
                                field: reference,
                                message,
                            });
                        }
                        hint = message;
                        hint_type = HintType::Error;
                        selected = default.clone();
                    }
                }

                let converted = converter(selected.clone()).map_err(|message| {
                    KhronicleError::FormConversion {
                        field: reference.clone(),
                        message,
                    }
                })?;

                let mut field = FormField::new(&reference, FormFieldType::Set);
                field.label = label;
                field.description = description;
                field.default = Value::Array(
                    default.iter().cloned().map(Value::String).collect(),
                );
                field.options = options;
                field.hint = hint;
                field.hint_type = hint_type;
                field.allow_custom_value = allow_custom_value;
                field.allow_add_all = allow_add_all;
                field.allow_remove_all = allow_remove_all;
                ctx.metadata().form_fields().publish(field);

                if ctx.mode().is_run() {
                    store_previous_value(
                        &ctx,
                        &reference,
                        Value::Array(selected.into_iter().map(Value::String).collect()),
                    );
                }
                Ok(converted)
            }
        })
    }
}

fn string_list(value: &Value) -> Option<Vec<String>> {
    value.as_array().map(|items| {
        items
            .iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect()
    })
}
