//! # homefind Core
//!
//! Core library for the homefind provider search.
//!
//! This crate provides the retrieval half of the system:
//!
//! - [`Catalog`] - Validated, read-only view over the provider rows
//! - [`normalize`] - Lowercase + punctuation stripping for descriptions
//! - [`VectorModel`] - TF-IDF vocabulary and idf weights, fit once per catalog
//! - [`RankingEngine`] - Cosine similarity blended with the provider's average score
//! - [`RetrievalCache`] - Bounded LRU memo keyed by `(query, k)`
//!
//! ## Example
//!
//! ```rust
//! use homefind_core::{Catalog, CatalogEntry, RankingConfig, RankingEngine, VectorizerConfig};
//! use std::sync::Arc;
//!
//! let catalog = Catalog::new(vec![
//!     CatalogEntry::new("Acme Cleaning", "we clean homes and offices", 4.5),
//!     CatalogEntry::new("Bright Plumbing", "pipe repair and installation", 4.0),
//! ])
//! .unwrap();
//!
//! let engine = RankingEngine::new(
//!     Arc::new(catalog),
//!     &VectorizerConfig::default(),
//!     RankingConfig::default(),
//! )
//! .unwrap();
//!
//! let result = engine.retrieve("clean my office", 2).unwrap();
//! let top = engine.entry(&result.entries()[0]).unwrap();
//! assert_eq!(top.name, "Acme Cleaning");
//! ```

pub mod cache;
pub mod catalog;
pub mod error;
pub mod normalize;
pub mod ranking;
pub mod stopwords;
pub mod vectorizer;

pub use cache::{CacheStats, RetrievalCache};
pub use catalog::{Catalog, CatalogEntry};
pub use error::{Error, ErrorKind, Result};
pub use normalize::normalize;
pub use ranking::{RankingConfig, RankingEngine, RetrievalResult, ScoredEntry};
pub use vectorizer::{tokenize, SparseVector, VectorModel, VectorizerConfig};
