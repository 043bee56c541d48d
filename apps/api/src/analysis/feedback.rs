//! Feedback Generator: asks the remote model for an improvement report.
//!
//! `AppState` holds an `Arc<dyn FeedbackGenerator>`, chosen at startup: `GeminiFeedback`
//! when an API key is configured, otherwise `MissingKeyFeedback`, which never touches
//! the network. Both always produce a string for the feedback area; failures become
//! short user-facing messages while the details go to the log.

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::{error, info, warn};

use crate::analysis::prompts::feedback_prompt;
use crate::config::Config;
use crate::llm_client::{GeminiClient, GeminiSettings, LlmError};

pub const MISSING_KEY_MESSAGE: &str =
    "Gemini API key not found. Please set GEMINI_API_KEY in your .env file.";
pub const NO_RESPONSE_MESSAGE: &str = "No response generated.";
const ERROR_PREFIX: &str = "Error while generating feedback: ";

#[async_trait]
pub trait FeedbackGenerator: Send + Sync {
    async fn generate(&self, resume_summary: &str, job_text: &str) -> String;

    /// Short backend label for logs.
    fn backend(&self) -> &'static str;
}

pub struct GeminiFeedback {
    client: GeminiClient,
}

impl GeminiFeedback {
    pub fn new(client: GeminiClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl FeedbackGenerator for GeminiFeedback {
    async fn generate(&self, resume_summary: &str, job_text: &str) -> String {
        let prompt = feedback_prompt(resume_summary, job_text);
        match self.client.generate_text(&prompt).await {
            Ok(text) => text,
            Err(LlmError::EmptyContent) => {
                warn!("Gemini returned no text for feedback prompt");
                NO_RESPONSE_MESSAGE.to_string()
            }
            Err(e) => {
                error!("Feedback generation failed: {e}");
                user_message(&e)
            }
        }
    }

    fn backend(&self) -> &'static str {
        "gemini"
    }
}

/// Stands in when no API key is configured.
pub struct MissingKeyFeedback;

#[async_trait]
impl FeedbackGenerator for MissingKeyFeedback {
    async fn generate(&self, _resume_summary: &str, _job_text: &str) -> String {
        MISSING_KEY_MESSAGE.to_string()
    }

    fn backend(&self) -> &'static str {
        "missing_key"
    }
}

/// Picks the feedback backend from config.
pub fn build_feedback_generator(config: &Config) -> Result<Arc<dyn FeedbackGenerator>> {
    match GeminiSettings::from_config(config) {
        Some(settings) => {
            let client = GeminiClient::new(settings).context("Failed to build Gemini client")?;
            info!("Feedback backend: Gemini (model: {})", client.model());
            Ok(Arc::new(GeminiFeedback::new(client)))
        }
        None => {
            warn!("GEMINI_API_KEY is not set; feedback will report a missing key");
            Ok(Arc::new(MissingKeyFeedback))
        }
    }
}

/// What the user sees for each failure category. Never includes the raw upstream body.
fn user_message(err: &LlmError) -> String {
    let reason = match err {
        LlmError::Http(_) => "could not reach the Gemini service.".to_string(),
        LlmError::Timeout => "the Gemini service did not respond in time.".to_string(),
        LlmError::Auth { .. } => {
            "the Gemini API key was rejected. Check GEMINI_API_KEY.".to_string()
        }
        LlmError::RateLimited { .. } => {
            "the Gemini service is rate limiting requests. Try again shortly.".to_string()
        }
        LlmError::Api { status, .. } => {
            format!("the Gemini service returned an error (status {status}).")
        }
        LlmError::Parse(_) => "the Gemini response could not be read.".to_string(),
        LlmError::Blocked(reason) => {
            format!("the request was blocked by the model's safety filters ({reason}).")
        }
        LlmError::EmptyContent => return NO_RESPONSE_MESSAGE.to_string(),
    };
    format!("{ERROR_PREFIX}{reason}")
}
