// Integration tests for homefind
use async_trait::async_trait;
use homefind::{
    load_catalog, Answer, AnswerExtractor, Catalog, CatalogEntry, ContextBuilder, ContextState,
    Conversation, ConversationConfig, ConversationEngine, ErrorKind, ExtractionError, ModelStore,
    RankingConfig, RankingEngine, SessionManager, VectorModel, VectorizerConfig,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

fn acme_catalog() -> Arc<Catalog> {
    Arc::new(
        Catalog::new(vec![
            CatalogEntry::new("Acme Cleaning", "we clean homes and offices", 4.5)
                .with_phone_number("555-1111"),
            CatalogEntry::new("Acme Cleaning", "duplicate row", 3.5)
                .with_phone_number("555-1111"),
            CatalogEntry::new("Bright Plumbing", "pipe repair and installation", 4.0)
                .with_phone_number("555-2222"),
        ])
        .unwrap(),
    )
}

fn engine(catalog: Arc<Catalog>) -> Arc<RankingEngine> {
    Arc::new(
        RankingEngine::new(catalog, &VectorizerConfig::default(), RankingConfig::default())
            .unwrap(),
    )
}

/// Echoes the question and counts calls.
#[derive(Default)]
struct CountingExtractor {
    calls: AtomicUsize,
}

#[async_trait]
impl AnswerExtractor for CountingExtractor {
    async fn answer(&self, _context: &str, question: &str) -> Result<Answer, ExtractionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(Answer {
            text: format!("re: {}", question),
            confidence: 0.9,
        })
    }
}

#[test]
fn test_clean_my_office_scenario() {
    let engine = engine(acme_catalog());
    let result = engine.retrieve("clean my office", 2).unwrap();

    assert_eq!(result.len(), 2);
    assert_eq!(engine.entry(&result.entries()[0]).unwrap().name, "Acme Cleaning");

    let context = ContextBuilder::new(Arc::clone(engine.catalog()))
        .build(&result)
        .unwrap();
    assert_eq!(
        context
            .matches("The Name of the company is: Acme Cleaning,")
            .count(),
        1
    );
    assert!(context.contains("Acme Cleaning's Average Score is: 4.0 and"));
    assert!(!context.contains("Average Score is: 4.5"));
}

#[test]
fn test_empty_query_is_validation_error() {
    let engine = engine(acme_catalog());
    let err = engine.retrieve("", 10).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert_eq!(engine.cache_stats().misses, 0);
}

#[test]
fn test_retrieve_bounds_and_order() {
    let engine = engine(acme_catalog());
    for k in 1..=5 {
        let result = engine.retrieve("repair offices and homes", k).unwrap();
        assert!(result.len() <= k);
        assert!(result.len() <= 3);
        for pair in result.entries().windows(2) {
            assert!(pair[0].score >= pair[1].score);
        }
    }
}

#[test]
fn test_retrieve_is_deterministic_across_engines() {
    let a = engine(acme_catalog());
    let b = engine(acme_catalog());
    let ra = a.retrieve("pipe installation", 3).unwrap();
    let rb = b.retrieve("pipe installation", 3).unwrap();
    assert_eq!(*ra, *rb);
}

#[tokio::test]
async fn test_hours_then_area_reuses_context() {
    let extractor = Arc::new(CountingExtractor::default());
    let conversation_engine = ConversationEngine::new(
        engine(acme_catalog()),
        extractor.clone(),
        ConversationConfig::default(),
    )
    .unwrap();
    let conversation_engine = Arc::new(conversation_engine);
    let mut conversation = Conversation::new(Arc::clone(&conversation_engine));

    let first = conversation.ask("What are your hours?").await.unwrap();
    let built = conversation.state().context().clone();
    let stats = conversation_engine.ranking().cache_stats();

    let second = conversation.ask("Do you serve Acme's area?").await.unwrap();

    assert!(first.context_built);
    assert!(!second.context_built);
    assert!(matches!(built, ContextState::HasContext(_)));
    assert_eq!(conversation.state().context(), &built);
    assert_eq!(conversation_engine.ranking().cache_stats(), stats);
    assert_eq!(extractor.calls.load(Ordering::SeqCst), 2);
    assert_eq!(second.answer, "re: Do you serve Acme's area?");
}

#[tokio::test]
async fn test_session_manager_end_to_end() {
    let conversation_engine = ConversationEngine::new(
        engine(acme_catalog()),
        Arc::new(CountingExtractor::default()),
        ConversationConfig::default(),
    )
    .unwrap();
    let sessions = SessionManager::new(Arc::new(conversation_engine));

    let id = sessions.create_session();
    sessions.submit_question(id, "pipe repair").await.unwrap();
    let snapshot = sessions.snapshot(id).await.unwrap();
    assert_eq!(snapshot.state, "has_context");
    assert!(snapshot
        .context
        .unwrap()
        .starts_with("The Name of the company is: Bright Plumbing,"));

    assert!(sessions.end_session(id));
    let err = sessions.submit_question(id, "still there?").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[test]
fn test_catalog_file_and_model_snapshot() {
    let dir = TempDir::new().unwrap();
    let catalog_path = dir.path().join("providers.jsonl");
    std::fs::write(
        &catalog_path,
        "{\"name\": \"Acme Cleaning\", \"description_trad_clean\": \"we clean homes and offices\", \"average_score\": 4.5, \"phone_number\": \"555-1111\"}\n\
         {\"name\": \"Bright Plumbing\", \"description_trad_clean\": \"pipe repair and installation\", \"average_score\": 4.0, \"phone_number\": null}\n",
    )
    .unwrap();

    let catalog = Arc::new(load_catalog(&catalog_path).unwrap());
    let config = VectorizerConfig::default();
    let store = ModelStore::new(dir.path().join("models")).unwrap();

    let (fitted, from_disk) = store.load_or_fit(&catalog, &config).unwrap();
    assert!(!from_disk);
    let (loaded, from_disk) = store.load_or_fit(&catalog, &config).unwrap();
    assert!(from_disk);
    assert_eq!(fitted, loaded);
    assert_eq!(fitted, VectorModel::fit(catalog.descriptions(), &config).unwrap());

    // a loaded model ranks exactly like a freshly fit one
    let from_snapshot =
        RankingEngine::with_model(Arc::clone(&catalog), Arc::new(loaded), RankingConfig::default())
            .unwrap();
    let fresh = engine(catalog);
    assert_eq!(
        *from_snapshot.retrieve("pipe repair", 2).unwrap(),
        *fresh.retrieve("pipe repair", 2).unwrap()
    );
}

#[test]
fn test_model_from_other_catalog_rejected() {
    let model = VectorModel::fit(["roof repair", "gutter cleaning"], &VectorizerConfig::default())
        .unwrap();
    let err = RankingEngine::with_model(acme_catalog(), Arc::new(model), RankingConfig::default())
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Configuration);
}
