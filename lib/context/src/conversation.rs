//! Conversation context state machine
//!
//! A session starts in [`ContextState::NoContext`]. The first question runs
//! a retrieval, builds the answer context and moves to
//! [`ContextState::HasContext`]; later questions are answered against that
//! same context until it is explicitly reset.
//!
//! A turn is committed only once the answer comes back. If retrieval or
//! extraction fails the state and transcript are left exactly as they were,
//! so retrying the same question takes the same branch again.

use crate::answer::AnswerExtractor;
use crate::builder::ContextBuilder;
use crate::error::{ConversationError, Result};
use chrono::{DateTime, Utc};
use homefind_core::{normalize, RankingEngine};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

pub const DEFAULT_EXTRACTION_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationConfig {
    /// k used for the retrieval that seeds a context.
    pub context_k: usize,
    /// Deadline for a single answer-extraction call.
    pub extraction_timeout: Duration,
    /// Normalize the question before it is used as a retrieval query.
    pub normalize_questions: bool,
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            context_k: homefind_core::ranking::DEFAULT_K,
            extraction_timeout: DEFAULT_EXTRACTION_TIMEOUT,
            normalize_questions: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub text: String,
    pub at: DateTime<Utc>,
}

impl Turn {
    fn new(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            text: text.into(),
            at: Utc::now(),
        }
    }
}

/// Whether a session has an answer context yet.
///
/// `HasContext("")` is representable but not reached in practice: the
/// catalog is non-empty and k is at least 1, so a built context always has
/// one or more lines.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ContextState {
    #[default]
    NoContext,
    HasContext(Arc<str>),
}

impl ContextState {
    #[inline]
    pub fn is_built(&self) -> bool {
        matches!(self, ContextState::HasContext(_))
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ContextState::NoContext => None,
            ContextState::HasContext(context) => Some(context),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ContextState::NoContext => "no_context",
            ContextState::HasContext(_) => "has_context",
        }
    }
}

/// Mutable per-session state.
#[derive(Debug, Clone)]
pub struct ConversationState {
    context: ContextState,
    transcript: Vec<Turn>,
    created_at: DateTime<Utc>,
}

impl Default for ConversationState {
    fn default() -> Self {
        Self::new()
    }
}

impl ConversationState {
    pub fn new() -> Self {
        Self {
            context: ContextState::NoContext,
            transcript: Vec::new(),
            created_at: Utc::now(),
        }
    }

    #[inline]
    pub fn context(&self) -> &ContextState {
        &self.context
    }

    #[inline]
    pub fn transcript(&self) -> &[Turn] {
        &self.transcript
    }

    #[inline]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Drop the active context. The transcript is kept; the next question
    /// builds a fresh context.
    pub fn reset_context(&mut self) {
        self.context = ContextState::NoContext;
    }
}

/// Outcome of one committed turn.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reply {
    pub answer: String,
    pub confidence: f32,
    /// This turn built the context (took the `NoContext` branch).
    pub context_built: bool,
}

/// Shared, read-only machinery that drives conversations.
///
/// One instance serves any number of sessions; the extractor is built once
/// and treated as stateless.
#[derive(Clone)]
pub struct ConversationEngine {
    ranking: Arc<RankingEngine>,
    builder: ContextBuilder,
    extractor: Arc<dyn AnswerExtractor>,
    config: ConversationConfig,
}

impl ConversationEngine {
    pub fn new(
        ranking: Arc<RankingEngine>,
        extractor: Arc<dyn AnswerExtractor>,
        config: ConversationConfig,
    ) -> Result<Self> {
        if config.context_k == 0 {
            return Err(homefind_core::Error::InvalidConfig(
                "context_k must be at least 1".to_string(),
            )
            .into());
        }
        if config.extraction_timeout.is_zero() {
            return Err(homefind_core::Error::InvalidConfig(
                "extraction_timeout must be positive".to_string(),
            )
            .into());
        }

        let builder = ContextBuilder::new(Arc::clone(ranking.catalog()));
        Ok(Self {
            ranking,
            builder,
            extractor,
            config,
        })
    }

    #[inline]
    pub fn ranking(&self) -> &Arc<RankingEngine> {
        &self.ranking
    }

    #[inline]
    pub fn builder(&self) -> &ContextBuilder {
        &self.builder
    }

    #[inline]
    pub fn config(&self) -> &ConversationConfig {
        &self.config
    }

    /// Retrieve for `query` and render the context string.
    pub fn build_context(&self, query: &str) -> Result<String> {
        let result = self.ranking.retrieve(query, self.config.context_k)?;
        Ok(self.builder.build(&result)?)
    }

    /// Answer `question` and commit the turn to `state`.
    pub async fn submit(&self, state: &mut ConversationState, question: &str) -> Result<Reply> {
        if question.trim().is_empty() {
            return Err(ConversationError::EmptyQuestion);
        }

        let (context, context_built) = match &state.context {
            ContextState::HasContext(context) => (Arc::clone(context), false),
            ContextState::NoContext => {
                let query = if self.config.normalize_questions {
                    normalize(question)
                } else {
                    question.to_string()
                };
                let context: Arc<str> = self.build_context(&query)?.into();
                debug!(bytes = context.len(), "Built conversation context");
                (context, true)
            }
        };

        let answer = self.extract(&context, question).await?;

        // commit
        if context_built {
            info!(bytes = context.len(), "Conversation context established");
            state.context = ContextState::HasContext(context);
        }
        state.transcript.push(Turn::new(Role::User, question));
        state.transcript.push(Turn::new(Role::Assistant, answer.text.clone()));

        Ok(Reply {
            answer: answer.text,
            confidence: answer.confidence,
            context_built,
        })
    }

    async fn extract(&self, context: &str, question: &str) -> Result<crate::Answer> {
        let deadline = self.config.extraction_timeout;
        match tokio::time::timeout(deadline, self.extractor.answer(context, question)).await {
            Ok(Ok(answer)) => Ok(answer),
            Ok(Err(e)) => {
                warn!(error = %e, "Answer extraction failed");
                Err(e.into())
            }
            Err(_) => {
                warn!(?deadline, "Answer extraction timed out");
                Err(ConversationError::ExtractionTimeout(deadline))
            }
        }
    }
}

impl std::fmt::Debug for ConversationEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConversationEngine")
            .field("ranking", &self.ranking)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// A single conversation driven directly, without a session registry.
#[derive(Debug, Clone)]
pub struct Conversation {
    engine: Arc<ConversationEngine>,
    state: ConversationState,
}

impl Conversation {
    pub fn new(engine: Arc<ConversationEngine>) -> Self {
        Self {
            engine,
            state: ConversationState::new(),
        }
    }

    pub async fn ask(&mut self, question: &str) -> Result<Reply> {
        self.engine.submit(&mut self.state, question).await
    }

    pub fn reset_context(&mut self) {
        self.state.reset_context();
    }

    #[inline]
    pub fn state(&self) -> &ConversationState {
        &self.state
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::answer::{Answer, ExtractionError, OverlapExtractor};
    use async_trait::async_trait;
    use homefind_core::{
        Catalog, CatalogEntry, ErrorKind, RankingConfig, VectorizerConfig,
    };
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    pub(crate) fn ranking() -> Arc<RankingEngine> {
        let catalog = Catalog::new(vec![
            CatalogEntry::new("Acme Cleaning", "we clean homes and offices", 4.5)
                .with_phone_number("555-1111"),
            CatalogEntry::new("Acme Cleaning", "duplicate row", 3.5)
                .with_phone_number("555-1111"),
            CatalogEntry::new("Bright Plumbing", "pipe repair and installation", 4.0)
                .with_phone_number("555-2222"),
        ])
        .unwrap();
        Arc::new(
            RankingEngine::new(
                Arc::new(catalog),
                &VectorizerConfig::default(),
                RankingConfig::default(),
            )
            .unwrap(),
        )
    }

    /// Records every context it is asked about; fails the first `failures` calls.
    #[derive(Default)]
    pub(crate) struct RecordingExtractor {
        pub contexts: Mutex<Vec<String>>,
        failures: AtomicUsize,
    }

    impl RecordingExtractor {
        pub(crate) fn failing(failures: usize) -> Self {
            Self {
                contexts: Mutex::new(Vec::new()),
                failures: AtomicUsize::new(failures),
            }
        }
    }

    #[async_trait]
    impl AnswerExtractor for RecordingExtractor {
        async fn answer(&self, context: &str, question: &str) -> std::result::Result<Answer, ExtractionError> {
            self.contexts.lock().push(context.to_string());
            if self
                .failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(ExtractionError::Status(503));
            }
            Ok(Answer {
                text: format!("answer to {}", question),
                confidence: 0.5,
            })
        }
    }

    struct SlowExtractor;

    #[async_trait]
    impl AnswerExtractor for SlowExtractor {
        async fn answer(&self, _context: &str, _question: &str) -> std::result::Result<Answer, ExtractionError> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(Answer {
                text: "too late".to_string(),
                confidence: 1.0,
            })
        }
    }

    fn engine(extractor: Arc<dyn AnswerExtractor>) -> ConversationEngine {
        ConversationEngine::new(ranking(), extractor, ConversationConfig::default()).unwrap()
    }

    #[tokio::test]
    async fn test_first_question_builds_context() {
        let extractor = Arc::new(RecordingExtractor::default());
        let engine = engine(extractor.clone());
        let mut state = ConversationState::new();
        assert_eq!(state.context(), &ContextState::NoContext);

        let reply = engine.submit(&mut state, "clean my office").await.unwrap();
        assert!(reply.context_built);
        assert_eq!(reply.answer, "answer to clean my office");

        let context = state.context().as_str().unwrap();
        assert!(context.starts_with("The Name of the company is: Acme Cleaning,"));
        assert!(context.contains("Acme Cleaning's Average Score is: 4.0 and"));
        assert_eq!(state.transcript().len(), 2);
        assert_eq!(state.transcript()[0].role, Role::User);
        assert_eq!(state.transcript()[1].role, Role::Assistant);
        assert_eq!(state.transcript()[1].text, "answer to clean my office");
    }

    #[tokio::test]
    async fn test_follow_up_reuses_context_byte_for_byte() {
        let extractor = Arc::new(RecordingExtractor::default());
        let engine = engine(extractor.clone());
        let mut state = ConversationState::new();

        let first = engine.submit(&mut state, "What are your hours?").await.unwrap();
        let built = state.context().clone();
        let cache_before = engine.ranking().cache_stats();

        let second = engine
            .submit(&mut state, "Do you serve Acme's area?")
            .await
            .unwrap();

        assert!(first.context_built);
        assert!(!second.context_built);
        assert_eq!(state.context(), &built);
        // no retrieval at all on the second turn
        assert_eq!(engine.ranking().cache_stats(), cache_before);

        let contexts = extractor.contexts.lock();
        assert_eq!(contexts.len(), 2);
        assert_eq!(contexts[0], contexts[1]);
        assert_eq!(state.transcript().len(), 4);
    }

    #[tokio::test]
    async fn test_context_never_empty_without_lexical_match() {
        let engine = engine(Arc::new(RecordingExtractor::default()));
        let mut state = ConversationState::new();

        // no catalog term overlaps, yet quality alone still ranks providers
        engine.submit(&mut state, "zzz qqq").await.unwrap();
        let context = state.context().as_str().unwrap();
        assert!(!context.is_empty());
        assert!(context.lines().count() >= 1);
    }

    #[tokio::test]
    async fn test_failed_first_extraction_leaves_state_untouched() {
        let extractor = Arc::new(RecordingExtractor::failing(1));
        let engine = engine(extractor.clone());
        let mut state = ConversationState::new();

        let err = engine.submit(&mut state, "pipe repair").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ExternalCapability);
        assert_eq!(state.context(), &ContextState::NoContext);
        assert!(state.transcript().is_empty());

        // retry re-enters the NoContext branch
        let reply = engine.submit(&mut state, "pipe repair").await.unwrap();
        assert!(reply.context_built);
        assert!(state.context().is_built());
        assert_eq!(state.transcript().len(), 2);
    }

    #[tokio::test]
    async fn test_failed_follow_up_keeps_context_and_transcript() {
        let extractor = Arc::new(RecordingExtractor::default());
        let engine = engine(extractor.clone());
        let mut state = ConversationState::new();
        engine.submit(&mut state, "pipe repair").await.unwrap();
        let built = state.context().clone();

        let failing = ConversationEngine::new(
            Arc::clone(engine.ranking()),
            Arc::new(RecordingExtractor::failing(1)),
            ConversationConfig::default(),
        )
        .unwrap();
        assert!(failing.submit(&mut state, "and boilers?").await.is_err());
        assert_eq!(state.context(), &built);
        assert_eq!(state.transcript().len(), 2);
    }

    #[tokio::test]
    async fn test_extraction_timeout() {
        let config = ConversationConfig {
            extraction_timeout: Duration::from_millis(50),
            ..ConversationConfig::default()
        };
        let engine = ConversationEngine::new(ranking(), Arc::new(SlowExtractor), config).unwrap();
        let mut state = ConversationState::new();

        let err = engine.submit(&mut state, "clean").await.unwrap_err();
        assert!(matches!(err, ConversationError::ExtractionTimeout(_)));
        assert_eq!(state.context(), &ContextState::NoContext);
        assert!(state.transcript().is_empty());
    }

    #[tokio::test]
    async fn test_empty_question_rejected() {
        let extractor = Arc::new(RecordingExtractor::default());
        let engine = engine(extractor.clone());
        let mut state = ConversationState::new();

        let err = engine.submit(&mut state, "   ").await.unwrap_err();
        assert!(matches!(err, ConversationError::EmptyQuestion));
        assert!(extractor.contexts.lock().is_empty());
        assert!(state.transcript().is_empty());
    }

    #[tokio::test]
    async fn test_reset_context_rebuilds_on_next_question() {
        let engine = Arc::new(engine(Arc::new(OverlapExtractor)));
        let mut conversation = Conversation::new(engine);

        conversation.ask("pipe repair").await.unwrap();
        conversation.reset_context();
        assert_eq!(conversation.state().context(), &ContextState::NoContext);
        assert_eq!(conversation.state().transcript().len(), 2);

        let reply = conversation.ask("clean my office").await.unwrap();
        assert!(reply.context_built);
        assert_eq!(conversation.state().transcript().len(), 4);
    }

    #[tokio::test]
    async fn test_normalized_questions_hit_same_context() {
        let config = ConversationConfig {
            normalize_questions: true,
            ..ConversationConfig::default()
        };
        let engine = ConversationEngine::new(ranking(), Arc::new(OverlapExtractor), config).unwrap();
        let mut state = ConversationState::new();
        engine.submit(&mut state, "CLEAN, my OFFICE!").await.unwrap();

        // "clean my office" is the normalized form, so the memo now holds it
        let before = engine.ranking().cache_stats();
        engine.ranking().retrieve("clean my office", 10).unwrap();
        assert_eq!(engine.ranking().cache_stats().hits, before.hits + 1);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = ConversationConfig {
            context_k: 0,
            ..ConversationConfig::default()
        };
        let err = ConversationEngine::new(ranking(), Arc::new(OverlapExtractor), config).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }
}
