//! Run-context options
//!
//! Options prepare the session store before a graph runs: API clients,
//! builders, feature wiring. They compose in registration order: the
//! server's options first, then the per-run ones, and any failure aborts the
//! run before a single task starts.

use std::sync::Arc;

use crate::error::Result;
use crate::runtime::context::{ExecutionMode, TaskContext};
use crate::typedmap::TypedKey;

/// One context preparation step.
pub type RunContextOption = Arc<dyn Fn(&TaskContext, ExecutionMode) -> Result<()> + Send + Sync>;

/// Inject a fixed value into the session store.
pub fn with_value<T>(key: TypedKey<T>, value: T) -> RunContextOption
where
    T: Clone + Send + Sync + 'static,
{
    Arc::new(move |ctx, _mode| {
        ctx.session_store().set(&key, value.clone());
        Ok(())
    })
}

/// Inject a lazily computed value; the factory runs once per execution.
pub fn with_lazy<T, F>(key: TypedKey<T>, factory: F) -> RunContextOption
where
    T: Send + Sync + 'static,
    F: Fn(&TaskContext, ExecutionMode) -> Result<T> + Send + Sync + 'static,
{
    Arc::new(move |ctx, mode| {
        let value = factory(ctx, mode)?;
        ctx.session_store().set(&key, value);
        Ok(())
    })
}

/// Append to a slice stored at a key, creating the slice when absent.
pub fn append_to_slice<T>(key: TypedKey<Vec<T>>, value: T) -> RunContextOption
where
    T: Clone + Send + Sync + 'static,
{
    Arc::new(move |ctx, _mode| {
        let mut slice = ctx
            .session_store()
            .get(&key)
            .map(|existing| (*existing).clone())
            .unwrap_or_default();
        slice.push(value.clone());
        ctx.session_store().set(&key, slice);
        Ok(())
    })
}

/// Apply options in declaration order; the first failure wins.
pub fn apply_all(
    options: &[RunContextOption],
    ctx: &TaskContext,
    mode: ExecutionMode,
) -> Result<()> {
    for option in options {
        option(ctx, mode)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn with_value_injects() {
        let key = TypedKey::<u32>::new("port");
        let ctx = TaskContext::detached();
        apply_all(&[with_value(key.clone(), 8080)], &ctx, ExecutionMode::Run).unwrap();
        assert_eq!(ctx.session_store().get(&key).map(|v| *v), Some(8080));
    }

    #[test]
    fn with_lazy_sees_mode() {
        let key = TypedKey::<String>::new("mode-tag");
        let ctx = TaskContext::detached();
        let option = with_lazy(key.clone(), |_ctx, mode| Ok(mode.as_str().to_string()));
        apply_all(&[option], &ctx, ExecutionMode::DryRun).unwrap();
        assert_eq!(
            ctx.session_store().get(&key).as_deref(),
            Some(&"dryrun".to_string())
        );
    }

    #[test]
    fn append_to_slice_creates_then_extends() {
        let key = TypedKey::<Vec<String>>::new("sources");
        let ctx = TaskContext::detached();
        let options = vec![
            append_to_slice(key.clone(), "audit".to_string()),
            append_to_slice(key.clone(), "events".to_string()),
        ];
        apply_all(&options, &ctx, ExecutionMode::Run).unwrap();
        assert_eq!(
            *ctx.session_store().get(&key).unwrap(),
            vec!["audit".to_string(), "events".to_string()]
        );
    }

    #[test]
    fn first_failure_stops_the_chain() {
        let key = TypedKey::<u32>::new("later");
        let ctx = TaskContext::detached();
        let failing: RunContextOption = Arc::new(|_, _| {
            Err(crate::error::KhronicleError::MetadataMissing {
                key: "probe".into(),
            })
        });
        let result = apply_all(
            &[failing, with_value(key.clone(), 1)],
            &ctx,
            ExecutionMode::Run,
        );
        assert!(result.is_err());
        assert!(ctx.session_store().get(&key).is_none());
    }
}
