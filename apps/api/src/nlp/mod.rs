//! Local model runtime. The single initialization point for the sentence-embedding and
//! named-entity models. Both run through ONNX Runtime (`ort`) with HuggingFace tokenizers.
//!
//! Models are loaded once at startup and shared read-only via `AppState` as trait objects,
//! so handlers and tests never depend on a concrete backend.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Serialize;
use thiserror::Error;
use tracing::info;

use crate::config::Config;

pub mod embedding;
pub mod ner;

pub use embedding::OnnxSentenceEmbedder;
pub use ner::OnnxEntityRecognizer;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("Model file not found: {0}")]
    MissingFile(PathBuf),

    #[error("Failed to build ONNX session: {0}")]
    Session(String),

    #[error("ONNX runtime error: {0}")]
    Runtime(#[from] ort::Error),

    #[error("Tokenizer error: {0}")]
    Tokenizer(String),

    #[error("Invalid model config: {0}")]
    Config(String),

    #[error("Unexpected model output: {0}")]
    Output(String),

    #[error("Model session lock poisoned")]
    Poisoned,
}

/// Encodes text into a fixed-size dense vector.
pub trait Embedder: Send + Sync {
    fn embed(&self, text: &str) -> Result<Vec<f32>, ModelError>;
}

/// Labels spans of text with entity categories, in document order.
pub trait EntityRecognizer: Send + Sync {
    fn recognize(&self, text: &str) -> Result<Vec<EntitySpan>, ModelError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityLabel {
    Person,
    Organization,
    Location,
    Misc,
}

impl EntityLabel {
    /// Maps a CoNLL / OntoNotes entity suffix (`PER`, `ORG`, `GPE`, ...) to a label.
    pub fn from_tag(tag: &str) -> Self {
        match tag.to_ascii_uppercase().as_str() {
            "PER" | "PERSON" => EntityLabel::Person,
            "ORG" => EntityLabel::Organization,
            "LOC" | "GPE" => EntityLabel::Location,
            _ => EntityLabel::Misc,
        }
    }
}

/// A recognized entity. `start`/`end` are byte offsets into the source text.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntitySpan {
    pub label: EntityLabel,
    pub text: String,
    pub start: usize,
    pub end: usize,
}

/// Loaded model handles.
pub struct Models {
    pub embedder: Arc<dyn Embedder>,
    pub recognizer: Arc<dyn EntityRecognizer>,
}

/// Loads both models from the directories named in config. Fails startup if either is missing.
pub fn load_models(config: &Config) -> Result<Models> {
    let embedder = OnnxSentenceEmbedder::load(&config.embedding_model_dir).with_context(|| {
        format!(
            "Failed to load embedding model from '{}'",
            config.embedding_model_dir.display()
        )
    })?;
    info!(
        "Embedding model loaded from {}",
        config.embedding_model_dir.display()
    );

    let recognizer = OnnxEntityRecognizer::load(&config.ner_model_dir).with_context(|| {
        format!(
            "Failed to load NER model from '{}'",
            config.ner_model_dir.display()
        )
    })?;
    info!(
        "NER model loaded from {} ({} labels)",
        config.ner_model_dir.display(),
        recognizer.label_count()
    );

    Ok(Models {
        embedder: Arc::new(embedder),
        recognizer: Arc::new(recognizer),
    })
}

/// Returns `dir/name`, or `MissingFile` if it does not exist.
pub(crate) fn require_file(dir: &Path, name: &str) -> Result<PathBuf, ModelError> {
    let path = dir.join(name);
    if path.is_file() {
        Ok(path)
    } else {
        Err(ModelError::MissingFile(path))
    }
}

pub(crate) fn load_tokenizer(
    dir: &Path,
    max_length: usize,
) -> Result<tokenizers::Tokenizer, ModelError> {
    let path = require_file(dir, "tokenizer.json")?;
    let mut tokenizer = tokenizers::Tokenizer::from_file(&path)
        .map_err(|e| ModelError::Tokenizer(e.to_string()))?;
    tokenizer.with_padding(None);
    tokenizer
        .with_truncation(Some(tokenizers::TruncationParams {
            max_length,
            ..Default::default()
        }))
        .map_err(|e| ModelError::Tokenizer(e.to_string()))?;
    Ok(tokenizer)
}

pub(crate) fn load_session(path: &Path) -> Result<ort::session::Session, ModelError> {
    use ort::session::{builder::GraphOptimizationLevel, Session};

    Session::builder()
        .map_err(|e| ModelError::Session(e.to_string()))?
        .with_optimization_level(GraphOptimizationLevel::Level3)
        .map_err(|e| ModelError::Session(e.to_string()))?
        .with_intra_threads(4)
        .map_err(|e| ModelError::Session(e.to_string()))?
        .commit_from_file(path)
        .map_err(|e| ModelError::Session(e.to_string()))
}
