//! Handlers for the `/jobs` resource: submit, poll, cancel, download.
//!
//! All endpoints are session-scoped via the `x-session-id` header set
//! by the fronting web layer.

use std::path::{Path as FsPath, PathBuf};

use axum::extract::{Multipart, Path, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use picstyle_core::error::CoreError;
use picstyle_core::job::StyleParams;
use picstyle_core::types::{new_job_id, JobId, SessionId};
use picstyle_db::models::job::CancelOutcome;
use serde_json::json;

use crate::error::{AppError, AppResult};
use crate::state::AppState;
use crate::stream::StatusSource;
use crate::ws::session_from_headers;

/// Accepted upload extensions, lowercased.
const ALLOWED_EXTENSIONS: [&str; 3] = ["png", "jpg", "jpeg"];

/// File name of the result artifact inside the job directory.
const RESULT_NAME: &str = "result.jpg";

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn require_session(headers: &HeaderMap) -> AppResult<SessionId> {
    session_from_headers(headers)
        .ok_or_else(|| AppError::BadRequest("Missing or invalid session header".into()))
}

/// Lowercased extension of an uploaded file name, if it is one we accept.
fn accepted_extension(filename: &str) -> Option<String> {
    let ext = FsPath::new(filename).extension()?.to_str()?.to_lowercase();
    ALLOWED_EXTENSIONS.contains(&ext.as_str()).then_some(ext)
}

/// An uploaded image field, held in memory until both are present.
struct Upload {
    extension: String,
    bytes: axum::body::Bytes,
}

async fn read_upload(field: axum::extract::multipart::Field<'_>) -> AppResult<Upload> {
    let filename = field
        .file_name()
        .ok_or_else(|| AppError::BadRequest("Image field has no file name".into()))?;
    let extension = accepted_extension(filename).ok_or_else(|| {
        AppError::BadRequest("Only PNG and JPEG images are accepted".into())
    })?;
    let bytes = field
        .bytes()
        .await
        .map_err(|e| AppError::BadRequest(format!("Upload truncated: {e}")))?;
    if bytes.is_empty() {
        return Err(AppError::BadRequest("Uploaded image is empty".into()));
    }
    Ok(Upload { extension, bytes })
}

/// Headers that keep status responses out of every cache between the
/// service and the client.
fn no_cache_headers() -> [(header::HeaderName, &'static str); 2] {
    [
        (header::CACHE_CONTROL, "no-store"),
        (header::PRAGMA, "no-cache"),
    ]
}

// ---------------------------------------------------------------------------
// Submit
// ---------------------------------------------------------------------------

/// POST /api/jobs
///
/// Multipart form: `content` and `style` image files plus a `strength`
/// percentage. Admission is checked before anything touches disk; on a
/// store failure the upload directory is rolled back so admission
/// rejections and crashes never leak orphan files.
///
/// A caller with no session yet gets one minted here; the id is echoed
/// in the `x-session-id` response header for the fronting web layer to
/// persist client-side.
pub async fn submit_job(
    State(state): State<AppState>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> AppResult<impl IntoResponse> {
    let session_id =
        session_from_headers(&headers).unwrap_or_else(picstyle_core::types::new_session_id);

    if !state.admission.may_admit().await?.is_admitted() {
        return Err(AppError::Core(CoreError::Busy));
    }

    let mut content: Option<Upload> = None;
    let mut style: Option<Upload> = None;
    let mut strength: u8 = 100;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(format!("Malformed multipart body: {e}")))?
    {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("content") => content = Some(read_upload(field).await?),
            Some("style") => style = Some(read_upload(field).await?),
            Some("strength") => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| AppError::BadRequest(format!("Malformed field: {e}")))?;
                strength = text
                    .parse::<u8>()
                    .ok()
                    .filter(|s| *s <= 100)
                    .ok_or_else(|| {
                        AppError::BadRequest("strength must be an integer in 0..=100".into())
                    })?;
            }
            _ => {}
        }
    }

    let content =
        content.ok_or_else(|| AppError::BadRequest("Missing content image".into()))?;
    let style = style.ok_or_else(|| AppError::BadRequest("Missing style image".into()))?;

    // The job id doubles as the upload directory name. Random v4, so
    // job and result URLs are unguessable without a second token.
    let job_id = new_job_id();
    let job_dir = state.config.jobs_dir.join(job_id.to_string());

    let content_name = format!("content.{}", content.extension);
    let style_name = format!("style.{}", style.extension);

    write_uploads(
        &job_dir,
        &[
            (content_name.as_str(), &content.bytes),
            (style_name.as_str(), &style.bytes),
        ],
    )
    .await
    .map_err(|e| AppError::Internal(format!("Failed to store uploads: {e}")))?;

    let params = StyleParams {
        content_path: format!("{job_id}/{content_name}"),
        style_path: format!("{job_id}/{style_name}"),
        output_name: RESULT_NAME.to_string(),
        strength,
    };

    match state.lifecycle.create_style_job(job_id, session_id, &params).await {
        Ok(job) => Ok((
            StatusCode::CREATED,
            [(
                header::HeaderName::from_static(crate::ws::SESSION_HEADER),
                session_id.to_string(),
            )],
            Json(json!({ "id": job.id, "status": job.status })),
        )),
        Err(e) => {
            // Roll back the upload so a failed submission leaves no
            // orphan files behind.
            if let Err(cleanup) = tokio::fs::remove_dir_all(&job_dir).await {
                tracing::warn!(job_id = %job_id, error = %cleanup, "Upload rollback failed");
            }
            Err(e.into())
        }
    }
}

async fn write_uploads(
    dir: &FsPath,
    files: &[(&str, &axum::body::Bytes)],
) -> std::io::Result<()> {
    tokio::fs::create_dir_all(dir).await?;
    for (name, bytes) in files {
        tokio::fs::write(dir.join(name), bytes).await?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Status poll
// ---------------------------------------------------------------------------

/// GET /api/jobs/{id}
///
/// Polling twin of the stream: one consistent status/position pair,
/// with caching disabled so clients always see the live state.
pub async fn job_status(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(job_id): Path<JobId>,
) -> AppResult<impl IntoResponse> {
    let session_id = require_session(&headers)?;
    let snapshot = state.lifecycle.snapshot(job_id, session_id).await?;
    Ok((no_cache_headers(), Json(snapshot)))
}

// ---------------------------------------------------------------------------
// Cancel
// ---------------------------------------------------------------------------

/// POST /api/jobs/{id}/cancel
///
/// Best-effort cooperative cancel: always 202 for an owned job, the
/// body says whether it was canceled outright, flagged for the worker,
/// or already terminal.
pub async fn cancel_job(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(job_id): Path<JobId>,
) -> AppResult<impl IntoResponse> {
    let session_id = require_session(&headers)?;
    let outcome = state.lifecycle.cancel(job_id, session_id).await?;
    let outcome = match outcome {
        CancelOutcome::Canceled => "canceled",
        CancelOutcome::Requested => "cancel_requested",
        CancelOutcome::AlreadyTerminal => "already_finished",
    };
    Ok((StatusCode::ACCEPTED, Json(json!({ "outcome": outcome }))))
}

// ---------------------------------------------------------------------------
// Result download
// ---------------------------------------------------------------------------

/// GET /api/jobs/{id}/result
///
/// Stream the finished job's artifact. Only the owning session can
/// fetch it, and only while retention keeps the job record alive; once
/// the record is purged the artifact is unreachable even if the sweep
/// has not deleted the file yet.
pub async fn download_result(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(job_id): Path<JobId>,
) -> AppResult<impl IntoResponse> {
    let session_id = require_session(&headers)?;
    let artifact = state.lifecycle.result_artifact(job_id, session_id).await?;

    let path: PathBuf = state.config.jobs_dir.join(&artifact.path);
    let bytes = tokio::fs::read(&path).await.map_err(|e| {
        tracing::warn!(job_id = %job_id, error = %e, "Result artifact unreadable");
        AppError::Core(CoreError::NotFound { job_id })
    })?;

    Ok((
        [
            (header::CONTENT_TYPE, "image/jpeg".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{RESULT_NAME}\""),
            ),
        ],
        bytes,
    ))
}
