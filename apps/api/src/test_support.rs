//! In-process doubles for the model and feedback seams, so handler and pipeline tests
//! need neither model files nor network access.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;

use crate::analysis::feedback::FeedbackGenerator;
use crate::config::Config;
use crate::extraction::Upload;
use crate::nlp::{Embedder, EntityLabel, EntityRecognizer, EntitySpan, ModelError};
use crate::state::AppState;

const FAKE_DIMENSIONS: usize = 256;

/// Bag-of-words hashing embedder: texts sharing words get high cosine similarity.
#[derive(Default)]
pub struct FakeEmbedder {
    calls: AtomicUsize,
}

impl FakeEmbedder {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Embedder for FakeEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>, ModelError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut vector = vec![0.0_f32; FAKE_DIMENSIONS];
        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            let mut hasher = DefaultHasher::new();
            word.to_lowercase().hash(&mut hasher);
            vector[(hasher.finish() as usize) % FAKE_DIMENSIONS] += 1.0;
        }
        Ok(vector)
    }
}

/// Tags every occurrence of the configured names as a person.
pub struct FakeRecognizer {
    people: Vec<String>,
}

impl FakeRecognizer {
    pub fn people(names: &[&str]) -> Self {
        Self {
            people: names.iter().map(|n| n.to_string()).collect(),
        }
    }
}

impl EntityRecognizer for FakeRecognizer {
    fn recognize(&self, text: &str) -> Result<Vec<EntitySpan>, ModelError> {
        let mut spans: Vec<EntitySpan> = self
            .people
            .iter()
            .flat_map(|name| {
                text.match_indices(name.as_str()).map(|(start, m)| EntitySpan {
                    label: EntityLabel::Person,
                    text: m.to_string(),
                    start,
                    end: start + m.len(),
                })
            })
            .collect();
        spans.sort_by_key(|s| s.start);
        Ok(spans)
    }
}

/// Records every `(resume_summary, job_text)` pair it is asked about.
#[derive(Default)]
pub struct RecordingFeedback {
    calls: Mutex<Vec<(String, String)>>,
}

impl RecordingFeedback {
    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl FeedbackGenerator for RecordingFeedback {
    async fn generate(&self, resume_summary: &str, job_text: &str) -> String {
        self.calls
            .lock()
            .unwrap()
            .push((resume_summary.to_string(), job_text.to_string()));
        "fake feedback".to_string()
    }

    fn backend(&self) -> &'static str {
        "recording"
    }
}

pub struct TestDoubles {
    pub embedder: Arc<FakeEmbedder>,
    pub recognizer: Arc<FakeRecognizer>,
    pub feedback: Arc<RecordingFeedback>,
}

impl TestDoubles {
    pub fn new(people: &[&str]) -> Self {
        Self {
            embedder: Arc::new(FakeEmbedder::default()),
            recognizer: Arc::new(FakeRecognizer::people(people)),
            feedback: Arc::new(RecordingFeedback::default()),
        }
    }
}

pub fn test_state(doubles: &TestDoubles) -> AppState {
    AppState {
        config: Config::from_lookup(|_| None).unwrap(),
        embedder: doubles.embedder.clone(),
        recognizer: doubles.recognizer.clone(),
        feedback: doubles.feedback.clone(),
    }
}

pub fn text_upload(text: &str) -> Upload {
    Upload {
        file_name: Some("resume.txt".to_string()),
        content_type: Some("text/plain".to_string()),
        bytes: Bytes::copy_from_slice(text.as_bytes()),
    }
}

pub const BOUNDARY: &str = "X-JOBMATCH-TEST-BOUNDARY";

/// A `(file_name, content_type, bytes)` file part.
pub type FilePart<'a> = (&'a str, &'a str, &'a [u8]);

/// Encodes a `multipart/form-data` body with the form's two fields.
pub fn multipart_body(file: Option<FilePart<'_>>, job_description: Option<&str>) -> Vec<u8> {
    let mut body = Vec::new();
    if let Some((file_name, content_type, bytes)) = file {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"resume\"; filename=\"{file_name}\"\r\nContent-Type: {content_type}\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(bytes);
        body.extend_from_slice(b"\r\n");
    }
    if let Some(job) = job_description {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"job_description\"\r\n\r\n{job}\r\n"
            )
            .as_bytes(),
        );
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}
