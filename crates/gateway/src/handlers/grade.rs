//! Grading handler

use axum::{
    extract::{FromRequest, Multipart, Request, State},
    http::{header::CONTENT_TYPE, StatusCode},
    Form, Json,
};
use serde_json::Value;

use crate::AppState;
use tutorgrade_common::{
    errors::{AppError, Result},
    grading::{RawSubmission, Submission, Upload},
};

/// Grade one submission.
///
/// Accepts `multipart/form-data`, a JSON body with the same keys (no
/// files), or url-encoded form fields.
pub async fn grade(State(state): State<AppState>, request: Request) -> Result<Json<Value>> {
    let body_limit = state.config.server.body_limit_mb * 1024 * 1024;
    let raw = read_submission(request, body_limit).await?;
    let submission = Submission::try_from(raw)?;
    let result = state.pipeline.grade(submission).await?;
    Ok(Json(result))
}

async fn read_submission(request: Request, body_limit: usize) -> Result<RawSubmission> {
    let content_type = request
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_ascii_lowercase();

    if content_type.starts_with("multipart/form-data") {
        let multipart = Multipart::from_request(request, &())
            .await
            .map_err(|e| unreadable_body(e.status(), e.body_text(), body_limit))?;
        return read_multipart(multipart, body_limit).await;
    }

    if content_type.starts_with("application/json") {
        let Json(raw) = Json::<RawSubmission>::from_request(request, &())
            .await
            .map_err(|e| unreadable_body(e.status(), e.body_text(), body_limit))?;
        return Ok(raw);
    }

    if !content_type.starts_with("application/x-www-form-urlencoded") {
        tracing::warn!(content_type = %content_type, "Unhandled Content-Type, reading form fields");
    }

    match Form::<RawSubmission>::from_request(request, &()).await {
        Ok(Form(raw)) => Ok(raw),
        Err(e) if e.status() == StatusCode::PAYLOAD_TOO_LARGE => {
            Err(AppError::BodyTooLarge { limit: body_limit })
        }
        Err(e) => {
            tracing::warn!(error = %e.body_text(), "No form fields in request body");
            Ok(RawSubmission::default())
        }
    }
}

async fn read_multipart(mut multipart: Multipart, body_limit: usize) -> Result<RawSubmission> {
    let mut raw = RawSubmission::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| unreadable_body(e.status(), e.body_text(), body_limit))?
    {
        let Some(name) = field.name().map(str::to_string) else {
            continue;
        };

        if RawSubmission::is_file_field(&name) {
            let file_name = field.file_name().unwrap_or_default().to_string();
            let content_type = field.content_type().map(str::to_string);
            let bytes = field
                .bytes()
                .await
                .map_err(|e| unreadable_body(e.status(), e.body_text(), body_limit))?;

            // browsers send an empty part for an unselected file input
            if file_name.is_empty() && bytes.is_empty() {
                continue;
            }

            tracing::debug!(field = %name, file = %file_name, size = bytes.len(), "Received upload");
            raw.add_upload(&name, Upload::new(file_name, content_type.as_deref(), bytes.to_vec()));
        } else {
            let value = field
                .text()
                .await
                .map_err(|e| unreadable_body(e.status(), e.body_text(), body_limit))?;
            raw.set_field(&name, value);
        }
    }

    Ok(raw)
}

/// Map a body extraction failure; the body limit surfaces as 413
fn unreadable_body(status: StatusCode, message: String, body_limit: usize) -> AppError {
    if status == StatusCode::PAYLOAD_TOO_LARGE {
        return AppError::BodyTooLarge { limit: body_limit };
    }
    AppError::Validation {
        message: format!("Unreadable request body: {}", message),
    }
}
