//! Axum route handlers for the form interface and the JSON API.

use axum::{
    extract::{multipart::MultipartError, Multipart, State},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    Json,
};
use tracing::warn;

use crate::analysis::pages;
use crate::analysis::pipeline::{run_analysis, AnalysisInput, AnalysisReport, MISSING_INPUT_WARNING};
use crate::errors::AppError;
use crate::extraction::Upload;
use crate::state::AppState;

/// GET /
pub async fn handle_form() -> Html<String> {
    Html(pages::render_form())
}

/// POST /analyze
///
/// Form submission. Missing input re-renders the form with a warning and runs nothing.
pub async fn handle_analyze_form(State(state): State<AppState>, multipart: Multipart) -> Response {
    let input = match read_submission(multipart).await {
        Ok(input) => input,
        Err(e) => return error_page(e),
    };

    let Some((upload, job_description)) = input.into_ready() else {
        warn!("Analysis requested without resume or job description");
        return Html(pages::render_warning(MISSING_INPUT_WARNING)).into_response();
    };

    match run_analysis(&state, upload, job_description).await {
        Ok(report) => Html(pages::render_report(&report)).into_response(),
        Err(e) => error_page(e),
    }
}

/// POST /api/v1/analyze
///
/// Same multipart fields as the form; returns the full `AnalysisReport` as JSON.
pub async fn handle_analyze_api(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<AnalysisReport>, AppError> {
    let (upload, job_description) = read_submission(multipart)
        .await?
        .into_ready()
        .ok_or_else(|| AppError::Validation(MISSING_INPUT_WARNING.to_string()))?;

    let report = run_analysis(&state, upload, job_description).await?;
    Ok(Json(report))
}

/// Reads the `resume` file part and the `job_description` text part. Unknown fields are ignored.
async fn read_submission(mut multipart: Multipart) -> Result<AnalysisInput, AppError> {
    let mut input = AnalysisInput::default();

    while let Some(field) = multipart.next_field().await.map_err(form_error)? {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("resume") => {
                let file_name = field.file_name().map(str::to_string);
                let content_type = field.content_type().map(str::to_string);
                let bytes = field.bytes().await.map_err(form_error)?;
                input.upload = Some(Upload {
                    file_name,
                    content_type,
                    bytes,
                });
            }
            Some("job_description") => {
                input.job_description = field.text().await.map_err(form_error)?;
            }
            _ => {}
        }
    }

    Ok(input)
}

fn form_error(e: MultipartError) -> AppError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::PayloadTooLarge("The uploaded resume is too large.".to_string())
    } else {
        AppError::Validation(format!("Malformed form data: {}", e.body_text()))
    }
}

fn error_page(e: AppError) -> Response {
    let (status, _, message) = e.parts();
    (status, Html(pages::render_error(&message))).into_response()
}
