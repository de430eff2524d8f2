//! Inspection sessions and the process-wide registry

mod interceptor;
mod runner;
mod server;
mod types;

pub use interceptor::{compose, Interceptor, Next};
pub use runner::{FeatureInfo, InspectionRunner, RunResult, SessionPhase};
pub use server::InspectionServer;
pub use types::InspectionType;
