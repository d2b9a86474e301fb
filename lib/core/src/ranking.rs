use crate::cache::{CacheStats, RetrievalCache, DEFAULT_CACHE_CAPACITY};
use crate::{Catalog, CatalogEntry, Error, Result, VectorModel, VectorizerConfig};
use ordered_float::OrderedFloat;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::sync::Arc;
use tracing::debug;

pub const DEFAULT_IMPACT_FACTOR: f64 = 0.1;
pub const DEFAULT_K: usize = 10;

/// Configuration for the ranking engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankingConfig {
    /// Weight of `average_score` in the blended score.
    pub impact_factor: f64,
    /// k used when the caller does not pass one.
    pub default_k: usize,
    /// Retrieval memo size; 0 disables memoization.
    pub cache_capacity: usize,
}

impl Default for RankingConfig {
    fn default() -> Self {
        Self {
            impact_factor: DEFAULT_IMPACT_FACTOR,
            default_k: DEFAULT_K,
            cache_capacity: DEFAULT_CACHE_CAPACITY,
        }
    }
}

impl RankingConfig {
    fn validate(&self) -> Result<()> {
        if !self.impact_factor.is_finite() {
            return Err(Error::InvalidConfig(format!(
                "impact_factor must be finite, got {}",
                self.impact_factor
            )));
        }
        if self.default_k == 0 {
            return Err(Error::InvalidConfig("default_k must be at least 1".to_string()));
        }
        Ok(())
    }
}

/// One scored catalog row.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScoredEntry {
    /// Row position in the catalog.
    pub index: usize,
    /// Cosine similarity between query and description.
    pub similarity: f64,
    /// `similarity + average_score * impact_factor`
    pub score: f64,
}

/// Top-k rows for a query, best first.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrievalResult {
    query: String,
    entries: Vec<ScoredEntry>,
}

impl RetrievalResult {
    #[must_use]
    pub fn new(query: String, entries: Vec<ScoredEntry>) -> Self {
        Self { query, entries }
    }

    #[inline]
    pub fn query(&self) -> &str {
        &self.query
    }

    #[inline]
    pub fn entries(&self) -> &[ScoredEntry] {
        &self.entries
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ScoredEntry> {
        self.entries.iter()
    }

    /// Whether any returned row shares at least one term with the query.
    pub fn has_lexical_match(&self) -> bool {
        self.entries.iter().any(|e| e.similarity > 0.0)
    }
}

impl<'a> IntoIterator for &'a RetrievalResult {
    type Item = &'a ScoredEntry;
    type IntoIter = std::slice::Iter<'a, ScoredEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

/// Read-only search context over one catalog snapshot.
///
/// Owns the catalog, the fitted model and each row's precomputed TF-IDF
/// vector (stored as per-term postings). Safe to share across threads;
/// the only mutable part is the retrieval memo.
pub struct RankingEngine {
    catalog: Arc<Catalog>,
    model: Arc<VectorModel>,
    // feature index -> (row, weight), rows ascending
    postings: Vec<Vec<(u32, f64)>>,
    config: RankingConfig,
    cache: RetrievalCache,
}

impl RankingEngine {
    /// Fit a fresh model over the catalog descriptions and index every row.
    pub fn new(
        catalog: Arc<Catalog>,
        vectorizer: &VectorizerConfig,
        config: RankingConfig,
    ) -> Result<Self> {
        let model = VectorModel::fit(catalog.descriptions(), vectorizer)?;
        Self::with_model(catalog, Arc::new(model), config)
    }

    /// Build the engine from an already fitted model (e.g. a loaded snapshot).
    ///
    /// Only the row count is checked here. The caller must make sure the
    /// model was fit on this exact catalog and vectorizer config; a model
    /// from another catalog of the same size would rank silently wrong.
    /// `homefind_storage::ModelStore` keys snapshots by a fingerprint of
    /// both, so models loaded through it always match.
    pub fn with_model(
        catalog: Arc<Catalog>,
        model: Arc<VectorModel>,
        config: RankingConfig,
    ) -> Result<Self> {
        config.validate()?;
        if model.n_docs() != catalog.len() {
            return Err(Error::InvalidConfig(format!(
                "model was fit on {} documents but the catalog has {} rows",
                model.n_docs(),
                catalog.len()
            )));
        }

        let vectors: Vec<_> = catalog
            .entries()
            .par_iter()
            .map(|entry| model.transform(&entry.description))
            .collect();

        let mut postings: Vec<Vec<(u32, f64)>> = vec![Vec::new(); model.vocabulary_size()];
        for (row, vector) in vectors.iter().enumerate() {
            for (feature, weight) in vector.iter() {
                postings[feature as usize].push((row as u32, weight));
            }
        }

        debug!(
            rows = catalog.len(),
            features = model.vocabulary_size(),
            "Indexed catalog"
        );

        Ok(Self {
            catalog,
            model,
            postings,
            cache: RetrievalCache::new(config.cache_capacity),
            config,
        })
    }

    /// Rank the catalog against `query` and return the best `k` rows.
    ///
    /// The query is vectorized as given; callers that want it normalized
    /// must do so themselves. `k` larger than the catalog returns every row.
    pub fn retrieve(&self, query: &str, k: usize) -> Result<Arc<RetrievalResult>> {
        if query.trim().is_empty() {
            return Err(Error::EmptyQuery);
        }
        if k == 0 {
            return Err(Error::InvalidLimit(k));
        }

        if let Some(hit) = self.cache.get(query, k) {
            debug!(query, k, "Retrieval cache hit");
            return Ok(hit);
        }

        let result = Arc::new(self.score(query, k));
        self.cache.put(query, k, result.clone());
        Ok(result)
    }

    /// [`retrieve`](Self::retrieve) with the configured default k.
    pub fn retrieve_default(&self, query: &str) -> Result<Arc<RetrievalResult>> {
        self.retrieve(query, self.config.default_k)
    }

    fn score(&self, query: &str, k: usize) -> RetrievalResult {
        let query_vector = self.model.transform(query);

        let mut similarity = vec![0.0f64; self.catalog.len()];
        for (feature, q_weight) in query_vector.iter() {
            for &(row, d_weight) in &self.postings[feature as usize] {
                similarity[row as usize] += q_weight * d_weight;
            }
        }

        let mut scored: Vec<ScoredEntry> = self
            .catalog
            .entries()
            .iter()
            .zip(similarity)
            .enumerate()
            .map(|(index, (entry, similarity))| ScoredEntry {
                index,
                similarity,
                score: similarity + entry.average_score * self.config.impact_factor,
            })
            .collect();

        // stable: equal scores keep catalog order
        scored.sort_by_key(|s| Reverse(OrderedFloat(s.score)));
        scored.truncate(k);

        debug!(
            query,
            k,
            terms = query_vector.nnz(),
            returned = scored.len(),
            "Scored catalog"
        );

        RetrievalResult::new(query.to_string(), scored)
    }

    /// Catalog row behind a scored entry.
    #[inline]
    pub fn entry(&self, scored: &ScoredEntry) -> Option<&CatalogEntry> {
        self.catalog.get(scored.index)
    }

    #[inline]
    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    #[inline]
    pub fn model(&self) -> &Arc<VectorModel> {
        &self.model
    }

    #[inline]
    pub fn config(&self) -> &RankingConfig {
        &self.config
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
    }
}

impl std::fmt::Debug for RankingEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RankingEngine")
            .field("rows", &self.catalog.len())
            .field("features", &self.model.vocabulary_size())
            .field("config", &self.config)
            .finish()
    }
}
