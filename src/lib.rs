//! # homefind
//!
//! Find service providers in a fixed catalog by free-text query, then ask
//! follow-up questions answered from the retrieved providers.
//!
//! Retrieval ranks every catalog row by TF-IDF cosine similarity blended
//! with the provider's average review score. The first question of a
//! conversation builds a plain-text context from the top results; later
//! questions are answered against that same context.
//!
//! ## Quick Start
//!
//! ### As a Server
//!
//! ```bash
//! homefind --catalog providers.json serve --http-port 8080
//! ```
//!
//! ### As a Library
//!
//! ```rust,no_run
//! use homefind::prelude::*;
//! use std::sync::Arc;
//!
//! # async fn run() -> anyhow::Result<()> {
//! let catalog = Arc::new(load_catalog("providers.json")?);
//! let ranking = Arc::new(RankingEngine::new(
//!     catalog,
//!     &VectorizerConfig::default(),
//!     RankingConfig::default(),
//! )?);
//!
//! // Ranked search
//! let result = ranking.retrieve("emergency plumber", 10)?;
//! for scored in result.entries() {
//!     println!("{:?} {:.4}", ranking.entry(scored).map(|e| &e.name), scored.score);
//! }
//!
//! // Conversation
//! let engine = ConversationEngine::new(
//!     ranking,
//!     Arc::new(OverlapExtractor),
//!     ConversationConfig::default(),
//! )?;
//! let mut conversation = Conversation::new(Arc::new(engine));
//! let reply = conversation.ask("Who can fix a leaking pipe?").await?;
//! println!("{}", reply.answer);
//! # Ok(())
//! # }
//! ```
//!
//! ## Crate Structure
//!
//! - [`homefind-core`](homefind_core) - Catalog, normalizer, TF-IDF vectorizer, ranking engine
//! - [`homefind-context`](homefind_context) - Context builder, answer extractors, conversation state machine
//! - [`homefind-storage`](homefind_storage) - Catalog loading and fitted model snapshots
//! - [`homefind-api`](homefind_api) - REST API

// Re-export core types
pub use homefind_core::{
    normalize, tokenize, CacheStats, Catalog, CatalogEntry, Error, ErrorKind, RankingConfig,
    RankingEngine, Result, RetrievalResult, ScoredEntry, VectorModel, VectorizerConfig,
};

// Re-export conversation types
pub use homefind_context::{
    Answer, AnswerExtractor, ContextBuilder, ContextState, Conversation, ConversationConfig,
    ConversationEngine, ConversationError, ConversationSnapshot, ConversationState,
    ExtractionError, HttpAnswerExtractor, OverlapExtractor, Reply, Role, SessionId,
    SessionManager, Turn,
};

// Re-export storage
pub use homefind_storage::{load_catalog, ModelStore};

// Re-export API
pub use homefind_api::RestApi;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::{
        load_catalog, normalize, AnswerExtractor, Catalog, CatalogEntry, ContextBuilder,
        ContextState, Conversation, ConversationConfig, ConversationEngine, ConversationError,
        HttpAnswerExtractor, ModelStore, OverlapExtractor, RankingConfig, RankingEngine, Reply,
        RestApi, RetrievalResult, SessionManager, VectorizerConfig,
    };
}
