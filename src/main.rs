use anyhow::Context;
use clap::{Parser, Subcommand};
use homefind_api::RestApi;
use homefind_context::{
    AnswerExtractor, Conversation, ConversationConfig, ConversationEngine, HttpAnswerExtractor,
    OverlapExtractor, SessionManager, DEFAULT_SESSION_IDLE_TIMEOUT,
};
use homefind_core::cache::DEFAULT_CACHE_CAPACITY;
use homefind_core::ranking::{DEFAULT_IMPACT_FACTOR, DEFAULT_K};
use homefind_core::vectorizer::DEFAULT_MAX_FEATURES;
use homefind_core::{RankingConfig, RankingEngine, VectorModel, VectorizerConfig};
use homefind_storage::{load_catalog, ModelStore};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

/// Find service providers and ask about them
#[derive(Parser, Debug)]
#[command(name = "homefind")]
#[command(about = "Service-provider search with conversational follow-up", long_about = None)]
struct Args {
    /// Catalog file (.json array or .jsonl/.ndjson rows)
    #[arg(short, long, default_value = "./data/providers.json")]
    catalog: PathBuf,

    /// Directory for fitted model snapshots; refit on every start when unset
    #[arg(long)]
    model_dir: Option<PathBuf>,

    /// Maximum vocabulary size
    #[arg(long, default_value_t = DEFAULT_MAX_FEATURES)]
    max_features: usize,

    /// Weight of the provider's average score in the ranking
    #[arg(long, default_value_t = DEFAULT_IMPACT_FACTOR)]
    impact_factor: f64,

    /// Retrieval memo size (0 disables it)
    #[arg(long, default_value_t = DEFAULT_CACHE_CAPACITY)]
    cache_capacity: usize,

    /// Question-answering endpoint; the local overlap extractor is used when unset
    #[arg(long)]
    qa_url: Option<String>,

    /// Deadline for one answer-extraction call
    #[arg(long, default_value_t = 30)]
    qa_timeout_secs: u64,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the REST API
    Serve {
        /// HTTP API port
        #[arg(long, default_value_t = 8080)]
        http_port: u16,

        /// Drop sessions idle for this many seconds (0 keeps them until deleted)
        #[arg(long, default_value_t = DEFAULT_SESSION_IDLE_TIMEOUT.as_secs())]
        session_idle_secs: u64,
    },
    /// Print the ranked providers for a query
    Search {
        query: String,

        /// Number of providers to show
        #[arg(short, default_value_t = DEFAULT_K)]
        k: usize,
    },
    /// Ask questions interactively (/reset starts a new topic, /quit exits)
    Chat {
        /// Delay between revealed words, in milliseconds
        #[arg(long, default_value_t = 50)]
        typing_delay_ms: u64,

        /// Normalize questions before they are used as search queries
        #[arg(long)]
        normalize_questions: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let log_level = match args.log_level.as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("Starting homefind v{}", env!("CARGO_PKG_VERSION"));
    info!("Catalog: {:?}", args.catalog);

    let ranking = Arc::new(build_ranking(&args)?);

    match &args.command {
        Command::Serve {
            http_port,
            session_idle_secs,
        } => {
            let engine = build_conversation(&args, ranking, false)?;
            let idle_timeout =
                (*session_idle_secs > 0).then(|| Duration::from_secs(*session_idle_secs));
            let sessions = SessionManager::new(Arc::new(engine)).with_idle_timeout(idle_timeout);
            serve(Arc::new(sessions), *http_port).await
        }
        Command::Search { query, k } => search(&ranking, query, *k),
        Command::Chat {
            typing_delay_ms,
            normalize_questions,
        } => {
            let engine = build_conversation(&args, ranking, *normalize_questions)?;
            chat(Arc::new(engine), Duration::from_millis(*typing_delay_ms)).await
        }
    }
}

fn build_ranking(args: &Args) -> anyhow::Result<RankingEngine> {
    let catalog = Arc::new(load_catalog(&args.catalog)?);
    let vectorizer = VectorizerConfig {
        max_features: args.max_features,
        ..VectorizerConfig::default()
    };
    let config = RankingConfig {
        impact_factor: args.impact_factor,
        cache_capacity: args.cache_capacity,
        ..RankingConfig::default()
    };

    let model = match &args.model_dir {
        Some(dir) => {
            let store = ModelStore::new(dir)
                .with_context(|| format!("Failed to open model directory {}", dir.display()))?;
            store.load_or_fit(&catalog, &vectorizer)?.0
        }
        None => VectorModel::fit(catalog.descriptions(), &vectorizer)?,
    };
    info!(
        rows = catalog.len(),
        features = model.vocabulary_size(),
        "Ranking engine ready"
    );

    Ok(RankingEngine::with_model(catalog, Arc::new(model), config)?)
}

fn build_conversation(
    args: &Args,
    ranking: Arc<RankingEngine>,
    normalize_questions: bool,
) -> anyhow::Result<ConversationEngine> {
    let timeout = Duration::from_secs(args.qa_timeout_secs);
    let extractor: Arc<dyn AnswerExtractor> = match &args.qa_url {
        Some(url) => {
            let extractor = HttpAnswerExtractor::with_timeout(url.clone(), timeout)?;
            info!("Answer extraction endpoint: {}", extractor.url());
            Arc::new(extractor)
        }
        None => {
            info!("No answer extraction endpoint configured, using local overlap extractor");
            Arc::new(OverlapExtractor)
        }
    };

    let config = ConversationConfig {
        extraction_timeout: timeout,
        normalize_questions,
        ..ConversationConfig::default()
    };
    Ok(ConversationEngine::new(ranking, extractor, config)?)
}

async fn serve(sessions: Arc<SessionManager>, http_port: u16) -> anyhow::Result<()> {
    let http_handle = std::thread::spawn(move || {
        info!("Starting HTTP server on port {}", http_port);
        let sys = actix_web::rt::System::new();
        sys.block_on(async {
            if let Err(e) = RestApi::start(sessions, http_port).await {
                eprintln!("HTTP server error: {}", e);
            }
        })
    });

    info!("homefind started successfully");
    info!("HTTP API: http://localhost:{}/", http_port);

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received");
        }
        _ = tokio::task::spawn_blocking(move || {
            http_handle.join().ok();
        }) => {
            info!("HTTP server stopped");
        }
    }

    info!("Shutting down...");
    Ok(())
}

fn search(ranking: &RankingEngine, query: &str, k: usize) -> anyhow::Result<()> {
    let result = ranking.retrieve(query, k)?;
    if !result.has_lexical_match() {
        println!("No provider description mentions your query; showing best rated.");
    }

    for (rank, scored) in result.iter().enumerate() {
        let Some(entry) = ranking.entry(scored) else {
            continue;
        };
        println!(
            "{}. {} | Average Score: {:.2} | Similarity with impact: {:.4}",
            rank + 1,
            entry.name,
            entry.average_score,
            scored.score
        );
        println!("   Description: {}", entry.description);
        println!("   Link: {}", entry.link);
        println!("   Location: {}", entry.location);
        println!("   Email: {}", entry.email);
        println!("   Phone Number: {}", entry.phone_number);
    }
    Ok(())
}

async fn chat(engine: Arc<ConversationEngine>, typing_delay: Duration) -> anyhow::Result<()> {
    let mut conversation = Conversation::new(engine);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    println!("Ask about the providers. /reset starts a new topic, /quit exits.");
    loop {
        print!("> ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        match line.trim() {
            "" => continue,
            "/quit" => break,
            "/reset" => {
                conversation.reset_context();
                println!("Context cleared.");
                continue;
            }
            question => match conversation.ask(question).await {
                Ok(reply) => reveal(&reply.answer, typing_delay).await?,
                Err(e) => eprintln!("error: {}", e),
            },
        }
    }
    Ok(())
}

/// Print `text` word by word. Presentation only.
async fn reveal(text: &str, delay: Duration) -> std::io::Result<()> {
    let mut stdout = std::io::stdout();
    for word in text.split_whitespace() {
        write!(stdout, "{} ", word)?;
        stdout.flush()?;
        tokio::time::sleep(delay).await;
    }
    writeln!(stdout)?;
    Ok(())
}
