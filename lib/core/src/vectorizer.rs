//! TF-IDF vectorizer fit once over the catalog descriptions.

use crate::stopwords::is_stop_word;
use crate::{Error, Result};
use ahash::AHashMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::info;

pub const DEFAULT_MAX_FEATURES: usize = 5000;

/// Settings the model is fit with. Part of the model's identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VectorizerConfig {
    /// Upper bound on vocabulary size.
    pub max_features: usize,
    /// Drop English stop words.
    pub stop_words: bool,
}

impl Default for VectorizerConfig {
    fn default() -> Self {
        Self {
            max_features: DEFAULT_MAX_FEATURES,
            stop_words: true,
        }
    }
}

/// Sparse vector in the model's feature space. Indices are strictly increasing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SparseVector {
    pub indices: Vec<u32>,
    pub values: Vec<f64>,
}

impl SparseVector {
    #[inline]
    #[must_use]
    pub fn nnz(&self) -> usize {
        self.indices.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, f64)> + '_ {
        self.indices.iter().copied().zip(self.values.iter().copied())
    }

    pub fn norm(&self) -> f64 {
        self.values.iter().map(|v| v * v).sum::<f64>().sqrt()
    }

    /// Dot product by merging the two sorted index lists.
    pub fn dot(&self, other: &SparseVector) -> f64 {
        let (mut i, mut j) = (0, 0);
        let mut sum = 0.0;
        while i < self.indices.len() && j < other.indices.len() {
            match self.indices[i].cmp(&other.indices[j]) {
                std::cmp::Ordering::Less => i += 1,
                std::cmp::Ordering::Greater => j += 1,
                std::cmp::Ordering::Equal => {
                    sum += self.values[i] * other.values[j];
                    i += 1;
                    j += 1;
                }
            }
        }
        sum
    }
}

/// Split text into lowercase word tokens of at least two characters.
///
/// Word characters are Unicode alphanumerics and `_`; everything else,
/// punctuation included, separates tokens.
#[inline]
pub fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .filter(|s| s.chars().count() >= 2)
        .map(str::to_string)
        .collect()
}

/// Fitted vocabulary and inverse document frequencies.
///
/// Immutable once built; shared behind an `Arc`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorModel {
    config: VectorizerConfig,
    // feature index -> term, alphabetical
    terms: Vec<String>,
    vocabulary: HashMap<String, u32>,
    idf: Vec<f64>,
    n_docs: usize,
}

impl VectorModel {
    /// Fit the model over `corpus`.
    ///
    /// Keeps the `max_features` most frequent terms (by total count, ties
    /// alphabetical) and weights them with smoothed idf
    /// `ln((1 + n) / (1 + df)) + 1`.
    pub fn fit<I, S>(corpus: I, config: &VectorizerConfig) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        if config.max_features == 0 {
            return Err(Error::InvalidConfig(
                "max_features must be at least 1".to_string(),
            ));
        }

        let mut n_docs = 0usize;
        let mut doc_freq: AHashMap<String, u32> = AHashMap::new();
        let mut total_count: AHashMap<String, u64> = AHashMap::new();

        for doc in corpus {
            n_docs += 1;
            let counts = count_terms(doc.as_ref(), config.stop_words);
            for (term, count) in counts {
                *total_count.entry(term.clone()).or_insert(0) += u64::from(count);
                *doc_freq.entry(term).or_insert(0) += 1;
            }
        }

        if n_docs == 0 {
            return Err(Error::EmptyCorpus);
        }
        if doc_freq.is_empty() {
            return Err(Error::EmptyVocabulary);
        }

        let mut terms: Vec<String> = doc_freq.keys().cloned().collect();
        if terms.len() > config.max_features {
            let count = |t: &String| total_count.get(t).copied().unwrap_or(0);
            terms.sort_by(|a, b| count(b).cmp(&count(a)).then_with(|| a.cmp(b)));
            terms.truncate(config.max_features);
        }
        terms.sort();

        let n = n_docs as f64;
        let idf: Vec<f64> = terms
            .iter()
            .map(|t| {
                let df = doc_freq.get(t).copied().unwrap_or(0);
                ((1.0 + n) / (1.0 + f64::from(df))).ln() + 1.0
            })
            .collect();

        let vocabulary = terms
            .iter()
            .enumerate()
            .map(|(i, t)| (t.clone(), i as u32))
            .collect();

        info!(
            documents = n_docs,
            vocabulary = terms.len(),
            "Fitted TF-IDF model"
        );

        Ok(Self {
            config: config.clone(),
            terms,
            vocabulary,
            idf,
            n_docs,
        })
    }

    /// Project `text` into the feature space as an L2-normalized TF-IDF vector.
    ///
    /// Out-of-vocabulary terms contribute nothing. A text with no known terms
    /// yields an empty vector.
    pub fn transform(&self, text: &str) -> SparseVector {
        let mut weights: Vec<(u32, f64)> = count_terms(text, self.config.stop_words)
            .into_iter()
            .filter_map(|(term, count)| {
                self.vocabulary
                    .get(&term)
                    .map(|&idx| (idx, f64::from(count) * self.idf[idx as usize]))
            })
            .collect();
        weights.sort_by_key(|&(idx, _)| idx);

        let norm = weights.iter().map(|(_, w)| w * w).sum::<f64>().sqrt();
        if norm == 0.0 {
            return SparseVector::default();
        }

        let (indices, values) = weights.into_iter().map(|(i, w)| (i, w / norm)).unzip();
        SparseVector { indices, values }
    }

    #[inline]
    #[must_use]
    pub fn config(&self) -> &VectorizerConfig {
        &self.config
    }

    #[inline]
    #[must_use]
    pub fn vocabulary_size(&self) -> usize {
        self.terms.len()
    }

    #[inline]
    #[must_use]
    pub fn n_docs(&self) -> usize {
        self.n_docs
    }

    #[inline]
    pub fn term(&self, index: u32) -> Option<&str> {
        self.terms.get(index as usize).map(String::as_str)
    }

    #[inline]
    pub fn index_of(&self, term: &str) -> Option<u32> {
        self.vocabulary.get(term).copied()
    }

    #[inline]
    pub fn idf(&self, term: &str) -> Option<f64> {
        self.index_of(term).map(|i| self.idf[i as usize])
    }
}

fn count_terms(text: &str, drop_stop_words: bool) -> AHashMap<String, u32> {
    let mut counts: AHashMap<String, u32> = AHashMap::new();
    for token in tokenize(text) {
        if drop_stop_words && is_stop_word(&token) {
            continue;
        }
        *counts.entry(token).or_insert(0) += 1;
    }
    counts
}
