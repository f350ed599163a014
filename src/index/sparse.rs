//! BM25 sparse index over tokenized code chunks.
//!
//! The artifact is self-contained JSON: per-document term frequencies,
//! document frequencies, document lengths, the average document length, and
//! the `k1`/`b` parameters. Reload rebuilds the in-memory posting lists
//! without re-tokenizing any corpus text.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

pub const DEFAULT_K1: f32 = 1.5;
pub const DEFAULT_B: f32 = 0.75;

/// Shared code tokenizer used for both documents and queries.
///
/// Splits on any non-alphanumeric character (which covers snake_case), then
/// sub-splits camelCase runs at lowercase-to-uppercase boundaries, and
/// lowercases. Empty tokens are discarded; digits stay attached to their
/// run, so `float32` is a single token.
pub fn tokenize(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    for word in text.split(|c: char| !c.is_alphanumeric()) {
        if word.is_empty() {
            continue;
        }
        let chars: Vec<char> = word.chars().collect();
        let mut start = 0;
        for i in 1..chars.len() {
            if chars[i].is_uppercase() && chars[i - 1].is_lowercase() {
                tokens.push(chars[start..i].iter().collect::<String>().to_lowercase());
                start = i;
            }
        }
        tokens.push(chars[start..].iter().collect::<String>().to_lowercase());
    }
    tokens
}

/// Okapi BM25 index keyed by document position (= chunk_id).
#[derive(Debug, Serialize, Deserialize)]
pub struct SparseIndex {
    k1: f32,
    b: f32,
    doc_term_freqs: Vec<HashMap<String, u32>>,
    doc_freqs: HashMap<String, u32>,
    doc_lens: Vec<u32>,
    avg_doc_len: f64,
    /// Transient inverted index: token -> (doc_id, tf), rebuilt on load
    #[serde(skip)]
    postings: HashMap<String, Vec<(i64, u32)>>,
}

impl SparseIndex {
    /// Build from chunk texts; document i becomes doc_id i.
    pub fn build(texts: &[String], k1: f32, b: f32) -> Self {
        let mut doc_term_freqs = Vec::with_capacity(texts.len());
        let mut doc_lens = Vec::with_capacity(texts.len());

        for text in texts {
            let tokens = tokenize(text);
            doc_lens.push(tokens.len() as u32);
            let mut tf: HashMap<String, u32> = HashMap::new();
            for token in tokens {
                *tf.entry(token).or_insert(0) += 1;
            }
            doc_term_freqs.push(tf);
        }

        let total_len: u64 = doc_lens.iter().map(|&l| l as u64).sum();
        let avg_doc_len = if doc_lens.is_empty() {
            0.0
        } else {
            total_len as f64 / doc_lens.len() as f64
        };

        let mut index = Self {
            k1,
            b,
            doc_term_freqs,
            doc_freqs: HashMap::new(),
            doc_lens,
            avg_doc_len,
            postings: HashMap::new(),
        };
        index.rebuild_derived();
        tracing::info!(n_docs = index.len(), "sparse index built");
        index
    }

    /// Number of indexed documents.
    pub fn len(&self) -> usize {
        self.doc_lens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.doc_lens.is_empty()
    }

    /// Score documents against `query_tokens`, descending score with ties
    /// broken by ascending doc id. Only documents sharing at least one query
    /// token are returned, so the result may be shorter than `k`.
    pub fn search(&self, query_tokens: &[String], k: usize) -> Vec<(i64, f32)> {
        if query_tokens.is_empty() || self.is_empty() {
            return Vec::new();
        }

        let n = self.len() as f64;
        let mut scores: HashMap<i64, f32> = HashMap::new();

        for token in query_tokens {
            let Some(posting) = self.postings.get(token) else {
                continue;
            };
            let df = self.doc_freqs.get(token).copied().unwrap_or(0) as f64;
            let idf = (1.0 + (n - df + 0.5) / (df + 0.5)).ln() as f32;

            for &(doc_id, tf) in posting {
                let tf = tf as f32;
                let dl = self.doc_lens[doc_id as usize] as f32;
                let norm = self.k1 * (1.0 - self.b + self.b * dl / self.avg_doc_len as f32);
                let term = idf * tf * (self.k1 + 1.0) / (tf + norm);
                *scores.entry(doc_id).or_insert(0.0) += term;
            }
        }

        let mut hits: Vec<(i64, f32)> = scores.into_iter().collect();
        hits.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.0.cmp(&b.0))
        });
        hits.truncate(k);
        hits
    }

    pub fn save(&self, path: &Path) -> Result<u64> {
        let data = serde_json::to_string(self).context("failed to serialize sparse index")?;
        std::fs::write(path, &data)
            .with_context(|| format!("failed to write {}", path.display()))?;
        Ok(data.len() as u64)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let mut index: Self =
            serde_json::from_str(&data).context("failed to parse sparse index")?;
        index.rebuild_derived();
        tracing::info!(n_docs = index.len(), "sparse index loaded");
        Ok(index)
    }

    fn rebuild_derived(&mut self) {
        self.doc_freqs.clear();
        self.postings.clear();
        for (doc_id, tf_map) in self.doc_term_freqs.iter().enumerate() {
            for (token, &tf) in tf_map {
                *self.doc_freqs.entry(token.clone()).or_insert(0) += 1;
                self.postings
                    .entry(token.clone())
                    .or_default()
                    .push((doc_id as i64, tf));
            }
        }
        for posting in self.postings.values_mut() {
            posting.sort_by_key(|&(doc_id, _)| doc_id);
        }
    }
}
