//! Request handlers

use std::collections::HashMap;
use std::io::SeekFrom;

use axum::extract::{Multipart, Path, Query, State};
use axum::http::{header, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use bytes::Bytes;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::io::{AsyncReadExt, AsyncSeekExt};

use crate::error::KhronicleError;
use crate::inspection::InspectionRunner;

use super::AppState;

/// Error envelope: maps crate errors onto status codes.
pub struct ApiError(KhronicleError);

impl From<KhronicleError> for ApiError {
    fn from(err: KhronicleError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        use KhronicleError as E;
        let status = match &self.0 {
            E::UnknownInspectionType { .. }
            | E::InspectionNotFound { .. }
            | E::TaskNotFound { .. }
            | E::UnknownUploadToken { .. }
            | E::ArtifactUnavailable { .. } => StatusCode::NOT_FOUND,
            E::AlreadyStarted | E::NotFinished => StatusCode::CONFLICT,
            E::FormValidation { .. }
            | E::InputShape { .. }
            | E::FormConversion { .. }
            | E::NotAFeature { .. }
            | E::NoTypeSelected
            | E::InvalidInspectionTypeId { .. } => StatusCode::BAD_REQUEST,
            E::UploadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            E::ViewerModeRestricted => StatusCode::FORBIDDEN,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

type ApiResult<T> = std::result::Result<T, ApiError>;

fn session(state: &AppState, id: &str) -> ApiResult<std::sync::Arc<InspectionRunner>> {
    state
        .server
        .get_inspection(id)
        .ok_or_else(|| ApiError(KhronicleError::InspectionNotFound { id: id.to_string() }))
}

fn reject_viewer(state: &AppState) -> ApiResult<()> {
    if state.viewer_mode {
        return Err(ApiError(KhronicleError::ViewerModeRestricted));
    }
    Ok(())
}

// ═══════════════════════════════════════════════════════════════
// REGISTRY
// ═══════════════════════════════════════════════════════════════

pub async fn list_types(State(state): State<AppState>) -> Json<Value> {
    Json(json!({ "types": state.server.all_inspection_types() }))
}

pub async fn create_inspection(
    State(state): State<AppState>,
    Path(type_id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    reject_viewer(&state)?;
    let runner = state.server.create_inspection(&type_id)?;
    Ok((
        StatusCode::ACCEPTED,
        Json(json!({ "inspectionId": runner.id() })),
    ))
}

// ═══════════════════════════════════════════════════════════════
// SESSION CONFIGURATION
// ═══════════════════════════════════════════════════════════════

pub async fn list_features(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    let runner = session(&state, &id)?;
    Ok(Json(json!({ "features": runner.feature_list()? })))
}

pub async fn replace_features(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(features): Json<Vec<String>>,
) -> ApiResult<StatusCode> {
    session(&state, &id)?.set_feature_list(features)?;
    Ok(StatusCode::OK)
}

pub async fn patch_features(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(changes): Json<HashMap<String, bool>>,
) -> ApiResult<StatusCode> {
    session(&state, &id)?.update_feature_map(changes)?;
    Ok(StatusCode::OK)
}

// ═══════════════════════════════════════════════════════════════
// EXECUTION
// ═══════════════════════════════════════════════════════════════

pub async fn dry_run(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(inputs): Json<serde_json::Map<String, Value>>,
) -> ApiResult<Json<Value>> {
    let runner = session(&state, &id)?;
    Ok(Json(runner.dry_run(inputs).await?))
}

pub async fn run(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(inputs): Json<serde_json::Map<String, Value>>,
) -> ApiResult<StatusCode> {
    reject_viewer(&state)?;
    session(&state, &id)?.run(inputs)?;
    Ok(StatusCode::ACCEPTED)
}

pub async fn cancel(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    session(&state, &id)?.cancel();
    Ok(StatusCode::OK)
}

pub async fn metadata(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    let runner = session(&state, &id)?;
    Ok(Json(runner.current_metadata().unwrap_or(Value::Null)))
}

// ═══════════════════════════════════════════════════════════════
// ARTIFACT DATA
// ═══════════════════════════════════════════════════════════════

#[derive(Deserialize)]
pub struct DataRange {
    #[serde(default)]
    pub start: u64,
    #[serde(rename = "maxSize")]
    pub max_size: Option<u64>,
}

/// Windowed artifact read. GET returns the requested slice; HEAD (axum
/// routes it here too) probes the total size through the headers.
pub async fn data(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(range): Query<DataRange>,
    method: Method,
) -> ApiResult<Response> {
    let runner = session(&state, &id)?;
    let artifact = runner
        .artifact()
        .and_then(|a| a.path)
        .ok_or_else(|| ApiError(KhronicleError::ArtifactUnavailable { id: id.clone() }))?;

    let total = tokio::fs::metadata(&artifact)
        .await
        .map_err(KhronicleError::from)?
        .len();

    if method == Method::HEAD {
        return Ok((
            StatusCode::OK,
            [(header::CONTENT_LENGTH, total.to_string())],
        )
            .into_response());
    }

    let start = range.start.min(total);
    let len = range
        .max_size
        .unwrap_or(total - start)
        .min(total - start);

    let mut file = tokio::fs::File::open(&artifact)
        .await
        .map_err(KhronicleError::from)?;
    file.seek(SeekFrom::Start(start))
        .await
        .map_err(KhronicleError::from)?;
    let mut buf = vec![0u8; len as usize];
    file.read_exact(&mut buf)
        .await
        .map_err(KhronicleError::from)?;

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "application/octet-stream".to_string()),
            (header::CONTENT_LENGTH, len.to_string()),
            (
                header::HeaderName::from_static("x-khronicle-total-size"),
                total.to_string(),
            ),
        ],
        Bytes::from(buf),
    )
        .into_response())
}

// ═══════════════════════════════════════════════════════════════
// UPLOADS
// ═══════════════════════════════════════════════════════════════

/// Multipart upload: `upload-token-id` names the slot a file form task
/// registered; `file` carries the bytes.
pub async fn upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> ApiResult<StatusCode> {
    let mut token: Option<String> = None;
    let mut bytes: Option<Vec<u8>> = None;

    while let Some(field) = multipart.next_field().await.map_err(|err| {
        ApiError(KhronicleError::InputShape {
            field: "multipart".into(),
            expected: format!("well-formed multipart body ({err})"),
        })
    })? {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("upload-token-id") => {
                token = Some(field.text().await.map_err(|err| {
                    ApiError(KhronicleError::InputShape {
                        field: "upload-token-id".into(),
                        expected: format!("text field ({err})"),
                    })
                })?);
            }
            Some("file") => {
                bytes = Some(
                    field
                        .bytes()
                        .await
                        .map_err(|err| {
                            ApiError(KhronicleError::InputShape {
                                field: "file".into(),
                                expected: format!("binary field ({err})"),
                            })
                        })?
                        .to_vec(),
                );
            }
            _ => {}
        }
    }

    let token = token.ok_or_else(|| {
        ApiError(KhronicleError::InputShape {
            field: "upload-token-id".into(),
            expected: "present".into(),
        })
    })?;
    let bytes = bytes.ok_or_else(|| {
        ApiError(KhronicleError::InputShape {
            field: "file".into(),
            expected: "present".into(),
        })
    })?;

    state.server.upload_store().store(&token, &bytes).await?;
    Ok(StatusCode::OK)
}
