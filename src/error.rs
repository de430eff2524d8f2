//! Khronicle error types with error codes
//!
//! Error code ranges:
//! - KHRON-000-009: Graph configuration errors (resolve time)
//! - KHRON-010-019: Form validation / request input errors
//! - KHRON-020-029: Execution errors (task failure, cancellation, lifecycle)
//! - KHRON-030-039: Metadata errors
//! - KHRON-040-049: Lookup errors
//! - KHRON-050-059: Server / upload / IO errors

use miette::Diagnostic;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, KhronicleError>;

/// All error variants are part of the public API.
///
/// Implements both `thiserror::Error` for std error compatibility
/// and `miette::Diagnostic` for terminal error display.
#[derive(Error, Debug, Diagnostic)]
pub enum KhronicleError {
    // ═══════════════════════════════════════════
    // GRAPH CONFIGURATION (000-009)
    // ═══════════════════════════════════════════
    #[error("[KHRON-001] Task '{task_id}' depends on '{reference}', but no candidate implements it")]
    #[diagnostic(
        code(khronicle::unresolvable_dependency),
        help("Register a task for the missing reference, or remove the dependency")
    )]
    UnresolvableDependency { task_id: String, reference: String },

    #[error("[KHRON-002] Reference '{reference}' has multiple equally ranked implementations")]
    #[diagnostic(
        code(khronicle::ambiguous_dependency),
        help("Give the implementations distinct selection priorities or tags")
    )]
    AmbiguousDependency { reference: String },

    #[error("[KHRON-003] Cycle detected in task graph: {}", cycle.join(" -> "))]
    #[diagnostic(
        code(khronicle::cycle_detected),
        help("Break the dependency cycle between the listed references")
    )]
    CycleDetected { cycle: Vec<String> },

    #[error("[KHRON-004] Duplicate task implementation '{reference}' (tag {tag:?})")]
    #[diagnostic(code(khronicle::duplicate_implementation))]
    DuplicateImplementation {
        reference: String,
        tag: Option<String>,
    },

    #[error("[KHRON-005] Invalid inspection type id '{id}': must not contain '/'")]
    #[diagnostic(code(khronicle::invalid_type_id))]
    InvalidInspectionTypeId { id: String },

    // ═══════════════════════════════════════════
    // FORM VALIDATION / REQUEST INPUT (010-019)
    // ═══════════════════════════════════════════
    #[error("[KHRON-010] Form field '{field}' rejected: {message}")]
    #[diagnostic(code(khronicle::form_validation))]
    FormValidation { field: String, message: String },

    #[error("[KHRON-011] Request value for '{field}' has the wrong shape: expected {expected}")]
    #[diagnostic(code(khronicle::input_shape))]
    InputShape { field: String, expected: String },

    #[error("[KHRON-012] Form field '{field}' conversion failed: {message}")]
    #[diagnostic(code(khronicle::form_conversion))]
    FormConversion { field: String, message: String },

    // ═══════════════════════════════════════════
    // EXECUTION (020-029)
    // ═══════════════════════════════════════════
    #[error("[KHRON-020] Task '{task_id}' failed: {reason}")]
    #[diagnostic(code(khronicle::task_failure))]
    TaskFailure { task_id: String, reason: String },

    #[error("[KHRON-021] Inspection cancelled")]
    #[diagnostic(code(khronicle::cancelled))]
    Cancelled,

    #[error("[KHRON-022] Inspection already started")]
    #[diagnostic(
        code(khronicle::already_started),
        help("Run is one-shot per inspection; create a new inspection instead")
    )]
    AlreadyStarted,

    #[error("[KHRON-023] Inspection is not finished; result is not available yet")]
    #[diagnostic(code(khronicle::not_finished))]
    NotFinished,

    #[error("[KHRON-024] No inspection type selected")]
    #[diagnostic(code(khronicle::no_type_selected))]
    NoTypeSelected,

    // ═══════════════════════════════════════════
    // METADATA (030-039)
    // ═══════════════════════════════════════════
    #[error("[KHRON-030] Metadata key '{key}' was never initialized (bug)")]
    #[diagnostic(code(khronicle::metadata_missing))]
    MetadataMissing { key: String },

    // ═══════════════════════════════════════════
    // LOOKUP (040-049)
    // ═══════════════════════════════════════════
    #[error("[KHRON-040] Unknown inspection type '{id}'")]
    #[diagnostic(code(khronicle::unknown_inspection_type))]
    UnknownInspectionType { id: String },

    #[error("[KHRON-041] Inspection '{id}' not found")]
    #[diagnostic(code(khronicle::inspection_not_found))]
    InspectionNotFound { id: String },

    #[error("[KHRON-042] Task '{id}' not found")]
    #[diagnostic(code(khronicle::task_not_found))]
    TaskNotFound { id: String },

    #[error("[KHRON-043] Task '{id}' is not available as a feature")]
    #[diagnostic(
        code(khronicle::not_a_feature),
        help("Only tasks labeled as features of the selected inspection type can be toggled")
    )]
    NotAFeature { id: String },

    // ═══════════════════════════════════════════
    // SERVER / UPLOAD / IO (050-059)
    // ═══════════════════════════════════════════
    #[error("[KHRON-050] Unknown upload token '{token}'")]
    #[diagnostic(code(khronicle::unknown_upload_token))]
    UnknownUploadToken { token: String },

    #[error("[KHRON-051] Upload exceeds the configured size limit ({limit} bytes)")]
    #[diagnostic(code(khronicle::upload_too_large))]
    UploadTooLarge { limit: u64 },

    #[error("[KHRON-052] Artifact for inspection '{id}' is not available")]
    #[diagnostic(code(khronicle::artifact_unavailable))]
    ArtifactUnavailable { id: String },

    #[error("[KHRON-053] Viewer mode: starting inspections is disabled")]
    #[diagnostic(code(khronicle::viewer_mode))]
    ViewerModeRestricted,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl KhronicleError {
    /// Task failure with a formatted reason
    pub fn task_failure(task_id: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::TaskFailure {
            task_id: task_id.into(),
            reason: reason.to_string(),
        }
    }

    /// True when the error means the run was cancelled rather than broken
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}
