//! Run interceptors
//!
//! Cross-cutting wrappers around a graph execution. Interceptors apply
//! outermost-first: the first registered runs its before-`next` code first
//! and its after-`next` code last.

use std::sync::Arc;

use futures::future::BoxFuture;

use crate::error::Result;
use crate::runtime::TaskContext;

/// Innermost continuation an interceptor forwards to.
pub type Next = Box<dyn FnOnce(TaskContext) -> BoxFuture<'static, Result<()>> + Send>;

/// One interceptor: `(ctx, next) -> result`. Must call `next` exactly once
/// to keep the run going, or skip it to short-circuit.
pub type Interceptor = Arc<dyn Fn(TaskContext, Next) -> BoxFuture<'static, Result<()>> + Send + Sync>;

/// Compose the chain around the innermost execution.
pub fn compose(interceptors: &[Interceptor], innermost: Next) -> Next {
    let mut next = innermost;
    for interceptor in interceptors.iter().rev() {
        let interceptor = Arc::clone(interceptor);
        let inner = next;
        next = Box::new(move |ctx| interceptor(ctx, inner));
    }
    next
}
