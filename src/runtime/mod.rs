//! Task-graph runtime: contexts, options and the local runner

mod context;
mod options;
mod runner;

pub use context::{ContextBuilder, ExecutionMode, IoConfig, ResultStore, TaskContext};
pub use options::{append_to_slice, apply_all, with_lazy, with_value, RunContextOption};
pub use runner::LocalRunner;
