//! Dependency resolution
//!
//! `resolve(seed, universe)` turns a requested subset plus a universe of
//! candidate implementations into a runnable graph:
//!
//! - every required dependency reference resolves to exactly one member
//! - optional dependencies resolve when a candidate exists, drop otherwise
//! - competing implementations are ranked by selection priority (larger
//!   wins), ties by lexicographic implementation tag
//! - the result is cycle-checked and topologically ordered
//!
//! Candidate choice happens here, at graph construction time. There is no
//! runtime dispatch: the runner never sees more than one implementation per
//! reference.

mod resolver;

pub use resolver::resolve;
