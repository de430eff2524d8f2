//! Form-task builders
//!
//! The canonical "task that captures a user parameter" shape. A form task
//! reads its value from the request (falling back to a default that may
//! consult the previously accepted value), validates and converts it,
//! publishes a field descriptor to the metadata bus for the frontend, and
//! hands the converted value to its dependents like any other task output.
//!
//! Validation failures behave differently per mode: a run aborts, a dry-run
//! falls back to the default and surfaces the message as an error hint so
//! the user can correct the field.

mod file;
mod set;
mod text;

pub use file::{FileFormBuilder, UploadedFile};
pub use set::SetFormBuilder;
pub use text::TextFormBuilder;

use serde_json::Value;

use crate::runtime::TaskContext;
use crate::typedmap::TypedKey;

fn previous_value_key(reference: &str) -> TypedKey<Value> {
    TypedKey::new(format!("khronicle.form.previous.{reference}"))
}

/// Previously accepted raw value for a form reference, if any.
pub(crate) fn previous_value(ctx: &TaskContext, reference: &str) -> Option<Value> {
    ctx.process_store()
        .get(&previous_value_key(reference))
        .map(|v| (*v).clone())
}

/// Remember the accepted raw value; only run-mode executions call this.
pub(crate) fn store_previous_value(ctx: &TaskContext, reference: &str, value: Value) {
    ctx.process_store().set(&previous_value_key(reference), value);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn previous_value_roundtrip() {
        let ctx = TaskContext::detached();
        assert!(previous_value(&ctx, "duration").is_none());
        store_previous_value(&ctx, "duration", Value::String("3h".into()));
        assert_eq!(
            previous_value(&ctx, "duration"),
            Some(Value::String("3h".into()))
        );
    }

    #[test]
    fn previous_values_are_per_reference() {
        let ctx = TaskContext::detached();
        store_previous_value(&ctx, "a", Value::String("x".into()));
        assert!(previous_value(&ctx, "b").is_none());
    }
}
