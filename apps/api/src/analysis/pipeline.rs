//! Runs one analysis: extract text → attributes → similarity score → feedback.
//! Each request is independent; nothing is kept once the report is returned.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use crate::analysis::attributes::{extract_attributes, ResumeAttributes};
use crate::analysis::similarity::compute_match_score;
use crate::errors::AppError;
use crate::extraction::{extract_text, Upload};
use crate::state::AppState;

pub const MISSING_INPUT_WARNING: &str = "Please upload your resume and enter a job description.";

#[derive(Debug, Clone, Serialize)]
pub struct MatchResult {
    /// 0–100, two decimals.
    pub score: f64,
    pub feedback: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct AnalysisReport {
    pub analysis_id: Uuid,
    pub analyzed_at: DateTime<Utc>,
    pub document_kind: &'static str,
    pub attributes: ResumeAttributes,
    pub result: MatchResult,
}

/// Raw form input, before the required-field check.
#[derive(Debug, Default)]
pub struct AnalysisInput {
    pub upload: Option<Upload>,
    pub job_description: String,
}

impl AnalysisInput {
    /// Returns the upload and job description only if both are present and non-empty.
    pub fn into_ready(self) -> Option<(Upload, String)> {
        let upload = self.upload.filter(|u| !u.is_empty())?;
        if self.job_description.trim().is_empty() {
            return None;
        }
        Some((upload, self.job_description))
    }
}

pub async fn run_analysis(
    state: &AppState,
    upload: Upload,
    job_description: String,
) -> Result<AnalysisReport, AppError> {
    let analysis_id = Uuid::new_v4();
    let kind = upload.kind()?;
    info!(
        %analysis_id,
        kind = kind.as_str(),
        bytes = upload.bytes.len(),
        "Starting analysis"
    );

    let bytes = upload.bytes;
    let resume_text = blocking(move || Ok(extract_text(kind, &bytes)?)).await?;
    info!(%analysis_id, chars = resume_text.chars().count(), "Resume text extracted");

    let recognizer = state.recognizer.clone();
    let attributes =
        blocking(move || Ok(extract_attributes(&resume_text, recognizer.as_ref())?)).await?;
    let summary = attributes.to_summary();
    info!(
        %analysis_id,
        name_found = attributes.name.is_some(),
        skills = attributes.skills.len(),
        "Resume attributes extracted"
    );

    let embedder = state.embedder.clone();
    let (summary_for_score, job_for_score) = (summary.clone(), job_description.clone());
    let score = blocking(move || {
        Ok(compute_match_score(
            embedder.as_ref(),
            &summary_for_score,
            &job_for_score,
        )?)
    })
    .await?;
    info!(%analysis_id, score, "Match score computed");

    let feedback = state.feedback.generate(&summary, &job_description).await;
    info!(
        %analysis_id,
        backend = state.feedback.backend(),
        feedback_chars = feedback.len(),
        "Analysis complete"
    );

    Ok(AnalysisReport {
        analysis_id,
        analyzed_at: Utc::now(),
        document_kind: kind.as_str(),
        attributes,
        result: MatchResult { score, feedback },
    })
}

/// Runs CPU-bound work (PDF parsing, model inference) on the blocking pool.
async fn blocking<T, F>(work: F) -> Result<T, AppError>
where
    F: FnOnce() -> Result<T, AppError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| AppError::Internal(anyhow::anyhow!("Blocking task failed: {e}")))?
}
