use std::sync::Arc;

use crate::analysis::feedback::FeedbackGenerator;
use crate::config::Config;
use crate::nlp::{Embedder, EntityRecognizer};

/// Shared application state injected into all route handlers via Axum extractors.
/// Everything here is read-only after startup.
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    /// Sentence-embedding model, loaded once at startup.
    pub embedder: Arc<dyn Embedder>,
    /// NER model used for name extraction.
    pub recognizer: Arc<dyn EntityRecognizer>,
    /// Gemini-backed, or the missing-key stand-in when no credential is configured.
    pub feedback: Arc<dyn FeedbackGenerator>,
}
