//! Named-entity recognition via an ONNX export of a BERT token-classification model
//! (e.g. `dslim/bert-base-NER`, CoNLL-03 BIO labels).
//!
//! Expects `model.onnx`, `tokenizer.json` and the HuggingFace `config.json` (for `id2label`).

use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

use ort::{inputs, session::Session, value::Tensor};
use serde::Deserialize;
use tokenizers::Tokenizer;

use super::{
    load_session, load_tokenizer, require_file, EntityLabel, EntityRecognizer, EntitySpan,
    ModelError,
};

const MAX_SEQUENCE_LENGTH: usize = 512;

#[derive(Debug, Deserialize)]
struct ModelConfig {
    id2label: HashMap<String, String>,
}

pub struct OnnxEntityRecognizer {
    tokenizer: Tokenizer,
    session: Mutex<Session>,
    labels: Vec<String>,
    uses_token_type_ids: bool,
}

impl OnnxEntityRecognizer {
    pub fn load(dir: &Path) -> Result<Self, ModelError> {
        let tokenizer = load_tokenizer(dir, MAX_SEQUENCE_LENGTH)?;
        let config_path = require_file(dir, "config.json")?;
        let raw = std::fs::read_to_string(&config_path)
            .map_err(|e| ModelError::Config(format!("{}: {e}", config_path.display())))?;
        let labels = parse_labels(&raw)?;

        let session = load_session(&require_file(dir, "model.onnx")?)?;
        let uses_token_type_ids = session.inputs().iter().any(|i| i.name() == "token_type_ids");

        Ok(Self {
            tokenizer,
            session: Mutex::new(session),
            labels,
            uses_token_type_ids,
        })
    }

    pub fn label_count(&self) -> usize {
        self.labels.len()
    }
}

impl EntityRecognizer for OnnxEntityRecognizer {
    fn recognize(&self, text: &str) -> Result<Vec<EntitySpan>, ModelError> {
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
        let attention_mask = Tensor::from_array(([1_usize, seq_len], mask))?;

        let (dims, logits) = {
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

        let num_labels = self.labels.len();
        if dims.len() != 3 || dims[1] as usize != seq_len || dims[2] as usize != num_labels {
            return Err(ModelError::Output(format!(
                "expected logits of shape [1, {seq_len}, {num_labels}], got {dims:?}"
            )));
        }

        let tags: Vec<&str> = logits
            .chunks_exact(num_labels)
            .map(|row| self.labels[argmax(row)].as_str())
            .collect();

        let tokens: Vec<TokenTag<'_>> = tags
            .iter()
            .zip(encoding.get_offsets())
            .zip(encoding.get_word_ids())
            .zip(encoding.get_special_tokens_mask())
            .map(|(((tag, &offsets), &word_id), &special)| TokenTag {
                tag,
                offsets,
                word_id,
                special: special == 1,
            })
            .collect();

        Ok(decode_bio_spans(text, &tokens))
    }
}

/// Turns `{"id2label": {"0": "O", "1": "B-PER", ...}}` into an index-ordered label list.
fn parse_labels(raw_config: &str) -> Result<Vec<String>, ModelError> {
    let config: ModelConfig =
        serde_json::from_str(raw_config).map_err(|e| ModelError::Config(e.to_string()))?;

    let mut indexed: Vec<(usize, String)> = config
        .id2label
        .into_iter()
        .map(|(id, label)| {
            id.parse::<usize>()
                .map(|id| (id, label))
                .map_err(|_| ModelError::Config(format!("non-numeric label id '{id}'")))
        })
        .collect::<Result<_, _>>()?;
    indexed.sort_by_key(|(id, _)| *id);

    if indexed.is_empty() || indexed.iter().enumerate().any(|(i, (id, _))| i != *id) {
        return Err(ModelError::Config(
            "id2label must map every index from 0 to N-1".to_string(),
        ));
    }

    Ok(indexed.into_iter().map(|(_, label)| label).collect())
}

fn argmax(row: &[f32]) -> usize {
    row.iter()
        .enumerate()
        .fold((0, f32::NEG_INFINITY), |best, (i, &v)| {
            if v > best.1 {
                (i, v)
            } else {
                best
            }
        })
        .0
}

/// One sub-word token with its predicted tag.
#[derive(Debug, Clone, Copy)]
struct TokenTag<'a> {
    tag: &'a str,
    offsets: (usize, usize),
    word_id: Option<u32>,
    special: bool,
}

struct OpenSpan {
    label: EntityLabel,
    start: usize,
    end: usize,
    word_id: Option<u32>,
}

/// Merges BIO-tagged sub-word tokens into entity spans, in document order.
///
/// A continuation piece of the same word always extends the open span regardless of its
/// own tag. `I-X` following a span of a different type starts a new span.
fn decode_bio_spans(text: &str, tokens: &[TokenTag<'_>]) -> Vec<EntitySpan> {
    let mut spans = Vec::new();
    let mut open: Option<OpenSpan> = None;

    for token in tokens.iter().filter(|t| !t.special) {
        let (start, end) = token.offsets;

        if let Some(current) = open.as_mut() {
            if token.word_id.is_some() && token.word_id == current.word_id {
                current.end = end;
                continue;
            }
        }

        let (prefix, entity) = match token.tag.split_once('-') {
            Some((prefix, entity)) => (prefix, Some(EntityLabel::from_tag(entity))),
            None => (token.tag, None),
        };

        match (prefix, entity) {
            ("I", Some(label)) if open.as_ref().is_some_and(|c| c.label == label) => {
                if let Some(current) = open.as_mut() {
                    current.end = end;
                    current.word_id = token.word_id;
                }
            }
            ("B" | "I", Some(label)) => {
                close_span(text, open.take(), &mut spans);
                open = Some(OpenSpan {
                    label,
                    start,
                    end,
                    word_id: token.word_id,
                });
            }
            _ => close_span(text, open.take(), &mut spans),
        }
    }
    close_span(text, open, &mut spans);

    spans
}

fn close_span(text: &str, span: Option<OpenSpan>, spans: &mut Vec<EntitySpan>) {
    let Some(span) = span else { return };
    let Some(slice) = text.get(span.start..span.end) else {
        return;
    };
    let trimmed = slice.trim();
    if trimmed.is_empty() {
        return;
    }
    spans.push(EntitySpan {
        label: span.label,
        text: trimmed.to_string(),
        start: span.start,
        end: span.end,
    });
}
