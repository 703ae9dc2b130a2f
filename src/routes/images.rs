use std::path::Path;

use axum::extract::{Multipart, Path as UrlPath, State};
use axum::Json;
use uuid::Uuid;

use crate::app_state::AppState;
use crate::error::{ApiError, ApiResult};
use crate::models::api::{JobStatusResponse, UploadResponse};
use crate::services::job_store::JobUpdate;
use crate::services::pipeline::StagedArtifact;

const DEFAULT_EXTENSION: &str = ".jpg";

/// Extension for the stored artifact: from the client filename, else sniffed
/// from the image bytes, else `.jpg`.
fn stored_extension(original_name: Option<&str>, data: &[u8]) -> String {
    original_name
        .and_then(|name| Path::new(name).extension())
        .and_then(|ext| ext.to_str())
        .filter(|ext| !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(|ext| format!(".{}", ext.to_ascii_lowercase()))
        .or_else(|| {
            image::guess_format(data)
                .ok()
                .and_then(|format| format.extensions_str().first().copied())
                .map(|ext| format!(".{ext}"))
        })
        .unwrap_or_else(|| DEFAULT_EXTENSION.to_string())
}

fn content_type_for(declared: Option<String>, data: &[u8]) -> String {
    declared
        .filter(|ct| !ct.is_empty())
        .or_else(|| {
            image::guess_format(data)
                .ok()
                .map(|format| format.to_mime_type().to_string())
        })
        .unwrap_or_else(|| "application/octet-stream".to_string())
}

/// POST /api/images/upload: accept an image and queue it for processing.
pub async fn upload_image(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> ApiResult<Json<UploadResponse>> {
    let mut upload = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("Malformed multipart body: {e}")))?
    {
        if field.name() == Some("image") {
            let original_name = field.file_name().map(str::to_string);
            let declared_type = field.content_type().map(str::to_string);
            let data = field
                .bytes()
                .await
                .map_err(|e| ApiError::BadRequest(format!("Failed to read upload: {e}")))?;
            upload = Some((original_name, declared_type, data));
        }
    }

    let (original_name, declared_type, data) = upload
        .filter(|(_, _, data)| !data.is_empty())
        .ok_or_else(|| ApiError::BadRequest("No file uploaded".to_string()))?;

    let id = Uuid::new_v4();
    let stored_name = format!("{id}{}", stored_extension(original_name.as_deref(), &data));
    let path = state.upload_dir.join(&stored_name);

    tokio::fs::create_dir_all(state.upload_dir.as_path()).await?;
    tokio::fs::write(&path, &data).await?;

    state.jobs.create(id, &stored_name).await?;

    let artifact = StagedArtifact {
        job_id: id,
        path,
        stored_name: stored_name.clone(),
        content_type: content_type_for(declared_type, &data),
    };

    if let Err(e) = state.runner.submit(artifact) {
        // Never leave a job queued with nobody to run it.
        state
            .jobs
            .update(
                id,
                JobUpdate::Error {
                    message: e.to_string(),
                    steps: Vec::new(),
                },
            )
            .await?;
        return Err(ApiError::Unavailable(e.to_string()));
    }

    tracing::info!(
        job_id = %id,
        filename = %stored_name,
        original = original_name.as_deref().unwrap_or(""),
        bytes = data.len(),
        "Image accepted"
    );

    Ok(Json(UploadResponse {
        id,
        filename: stored_name,
    }))
}

/// GET /api/images/status/{id}: current state of a job.
pub async fn get_status(
    State(state): State<AppState>,
    UrlPath(id): UrlPath<String>,
) -> ApiResult<Json<JobStatusResponse>> {
    let job_id = Uuid::parse_str(&id).map_err(|_| ApiError::NotFound("Not found".to_string()))?;
    let job = state
        .jobs
        .get(job_id)
        .await
        .ok_or_else(|| ApiError::NotFound("Not found".to_string()))?;

    Ok(Json(job.into()))
}
