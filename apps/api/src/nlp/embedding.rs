//! Sentence embeddings via an ONNX export of all-MiniLM-L6-v2.
//!
//! Expects `model.onnx` and `tokenizer.json` in the model directory. The model's first
//! output is the token-level `last_hidden_state`; sentence vectors are produced by mean
//! pooling over the attention mask followed by L2 normalization, matching
//! sentence-transformers.

use std::path::Path;
use std::sync::Mutex;

use ort::{inputs, session::Session, value::Tensor};
use tokenizers::Tokenizer;
use tracing::debug;

use super::{load_session, load_tokenizer, require_file, Embedder, ModelError};

/// MiniLM was trained with 256-token inputs; longer text is truncated.
const MAX_SEQUENCE_LENGTH: usize = 256;

pub struct OnnxSentenceEmbedder {
    tokenizer: Tokenizer,
    // `Session::run` needs exclusive access.
    session: Mutex<Session>,
    uses_token_type_ids: bool,
}

impl OnnxSentenceEmbedder {
    pub fn load(dir: &Path) -> Result<Self, ModelError> {
        let tokenizer = load_tokenizer(dir, MAX_SEQUENCE_LENGTH)?;
        let session = load_session(&require_file(dir, "model.onnx")?)?;
        let uses_token_type_ids = session.inputs().iter().any(|i| i.name() == "token_type_ids");

        Ok(Self {
            tokenizer,
            session: Mutex::new(session),
            uses_token_type_ids,
        })
    }
}

impl Embedder for OnnxSentenceEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>, ModelError> {
        let encoding = self
            .tokenizer
            .encode(text, true)
            .map_err(|e| ModelError::Tokenizer(e.to_string()))?;

        let seq_len = encoding.get_ids().len();
        let ids: Vec<i64> = encoding.get_ids().iter().map(|&id| id as i64).collect();
        let mask: Vec<i64> = encoding
            .get_attention_mask()
            .iter()
            .map(|&m| m as i64)
            .collect();
        let type_ids: Vec<i64> = encoding.get_type_ids().iter().map(|&t| t as i64).collect();

        let input_ids = Tensor::from_array(([1_usize, seq_len], ids))?;
        let attention_mask = Tensor::from_array(([1_usize, seq_len], mask.clone()))?;

        let (dims, hidden) = {
            let mut session = self.session.lock().map_err(|_| ModelError::Poisoned)?;
            let outputs = if self.uses_token_type_ids {
                let token_type_ids = Tensor::from_array(([1_usize, seq_len], type_ids))?;
                session.run(inputs![
                    "input_ids" => input_ids,
                    "attention_mask" => attention_mask,
                    "token_type_ids" => token_type_ids
                ])?
            } else {
                session.run(inputs![
                    "input_ids" => input_ids,
                    "attention_mask" => attention_mask
                ])?
            };
            let (shape, data) = outputs[0].try_extract_tensor::<f32>()?;
            (shape.iter().copied().collect::<Vec<i64>>(), data.to_vec())
        };

        if dims.len() != 3 || dims[0] != 1 || dims[1] as usize != seq_len {
            return Err(ModelError::Output(format!(
                "expected hidden state of shape [1, {seq_len}, H], got {dims:?}"
            )));
        }
        let hidden_size = dims[2] as usize;
        debug!("Embedded {} tokens into {} dims", seq_len, hidden_size);

        let mut pooled = mean_pool(&hidden, &mask, hidden_size)?;
        l2_normalize(&mut pooled);
        Ok(pooled)
    }
}

/// Averages the token vectors whose attention mask is set.
/// `hidden` is row-major `[seq_len, hidden_size]`.
fn mean_pool(hidden: &[f32], mask: &[i64], hidden_size: usize) -> Result<Vec<f32>, ModelError> {
    if hidden_size == 0 || hidden.len() != mask.len() * hidden_size {
        return Err(ModelError::Output(format!(
            "hidden state has {} values, expected {} x {}",
            hidden.len(),
            mask.len(),
            hidden_size
        )));
    }

    let mut pooled = vec![0.0_f32; hidden_size];
    let mut counted = 0.0_f32;
    for (row, &m) in hidden.chunks_exact(hidden_size).zip(mask) {
        if m == 0 {
            continue;
        }
        counted += 1.0;
        for (acc, v) in pooled.iter_mut().zip(row) {
            *acc += v;
        }
    }

    // sentence-transformers clamps the divisor to 1e-9
    let divisor = counted.max(1e-9);
    pooled.iter_mut().for_each(|v| *v /= divisor);
    Ok(pooled)
}

fn l2_normalize(vector: &mut [f32]) {
    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        vector.iter_mut().for_each(|v| *v /= norm);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mean_pool_ignores_masked_tokens() {
        // 3 tokens x 2 dims, last token is padding
        let hidden = [1.0, 2.0, 3.0, 4.0, 100.0, 100.0];
        let mask = [1, 1, 0];
        let pooled = mean_pool(&hidden, &mask, 2).unwrap();
        assert_eq!(pooled, vec![2.0, 3.0]);
    }

    #[test]
    fn test_mean_pool_rejects_shape_mismatch() {
        let hidden = [1.0, 2.0, 3.0];
        let mask = [1, 1];
        assert!(matches!(
            mean_pool(&hidden, &mask, 2),
            Err(ModelError::Output(_))
        ));
    }

    #[test]
    fn test_mean_pool_all_masked_is_zero_vector() {
        let hidden = [5.0, 5.0];
        let pooled = mean_pool(&hidden, &[0], 2).unwrap();
        assert_eq!(pooled, vec![0.0, 0.0]);
    }

    #[test]
    fn test_l2_normalize_produces_unit_vector() {
        let mut v = vec![3.0, 4.0];
        l2_normalize(&mut v);
        assert!((v[0] - 0.6).abs() < 1e-6);
        assert!((v[1] - 0.8).abs() < 1e-6);
    }

    #[test]
    fn test_l2_normalize_leaves_zero_vector_alone() {
        let mut v = vec![0.0, 0.0, 0.0];
        l2_normalize(&mut v);
        assert_eq!(v, vec![0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_load_requires_model_files() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            OnnxSentenceEmbedder::load(dir.path()),
            Err(ModelError::MissingFile(_))
        ));
    }
}
