use actix_cors::Cors;
use actix_web::error::InternalError;
use actix_web::{web, App, HttpResponse, HttpServer, Result as ActixResult};
use homefind_context::{ConversationError, SessionManager};
use homefind_core::{ErrorKind, RankingEngine};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::error;
use uuid::Uuid;

#[derive(Deserialize)]
struct RetrieveRequest {
    query: String,
    k: Option<usize>,
}

#[derive(Deserialize)]
struct QuestionRequest {
    question: String,
}

#[derive(Serialize)]
struct RetrievedProvider<'a> {
    rank: usize,
    index: usize,
    name: &'a str,
    average_score: f64,
    similarity: f64,
    score: f64,
    description: &'a str,
    link: &'a str,
    location: &'a str,
    email: &'a str,
    phone_number: &'a str,
}

pub struct RestApi;

impl RestApi {
    pub async fn start(sessions: Arc<SessionManager>, port: u16) -> std::io::Result<()> {
        HttpServer::new(move || {
            let cors = Cors::default()
                .allow_any_origin()
                .allow_any_method()
                .allow_any_header()
                .max_age(3600);

            App::new()
                .wrap(cors)
                .app_data(web::Data::new(sessions.clone()))
                .configure(routes)
        })
        .bind(("0.0.0.0", port))?
        .run()
        .await
    }
}

/// Register every endpoint. Expects `web::Data<Arc<SessionManager>>`.
///
/// Bodies and paths that fail to deserialize are answered with the same
/// `{"error","kind":"validation"}` shape as every other rejected request.
pub fn routes(cfg: &mut web::ServiceConfig) {
    cfg.app_data(web::JsonConfig::default().error_handler(|err, _req| {
        let message = err.to_string();
        InternalError::from_response(err, error_response(ErrorKind::Validation, message)).into()
    }))
    .app_data(web::PathConfig::default().error_handler(|err, _req| {
        let message = err.to_string();
        InternalError::from_response(err, error_response(ErrorKind::Validation, message)).into()
    }))
    .route("/health", web::get().to(health))
        .route("/retrieve", web::post().to(retrieve))
        .route("/context", web::post().to(build_context))
        .route("/sessions", web::post().to(create_session))
        .route("/sessions/{id}", web::get().to(get_session))
        .route("/sessions/{id}", web::delete().to(end_session))
        .route("/sessions/{id}/questions", web::post().to(submit_question))
        .route("/sessions/{id}/context", web::delete().to(reset_context));
}

fn ranking(sessions: &SessionManager) -> &Arc<RankingEngine> {
    sessions.engine().ranking()
}

fn error_response(kind: ErrorKind, message: String) -> HttpResponse {
    let body = serde_json::json!({
        "error": message,
        "kind": kind,
    });
    match kind {
        ErrorKind::Validation => HttpResponse::BadRequest().json(body),
        ErrorKind::NotFound => HttpResponse::NotFound().json(body),
        ErrorKind::ExternalCapability => HttpResponse::BadGateway().json(body),
        ErrorKind::DataIntegrity | ErrorKind::Configuration => {
            error!(error = %message, "Internal error while serving request");
            HttpResponse::InternalServerError().json(body)
        }
    }
}

fn conversation_error(e: ConversationError) -> HttpResponse {
    if let ConversationError::ExtractionTimeout(_) = e {
        return HttpResponse::GatewayTimeout().json(serde_json::json!({
            "error": e.to_string(),
            "kind": e.kind(),
        }));
    }
    error_response(e.kind(), e.to_string())
}

fn core_error(e: homefind_core::Error) -> HttpResponse {
    error_response(e.kind(), e.to_string())
}

async fn health(sessions: web::Data<Arc<SessionManager>>) -> ActixResult<HttpResponse> {
    let ranking = ranking(&sessions);
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "rows": ranking.catalog().len(),
        "features": ranking.model().vocabulary_size(),
        "sessions": sessions.session_count(),
        "cache": ranking.cache_stats(),
    })))
}

async fn retrieve(
    sessions: web::Data<Arc<SessionManager>>,
    req: web::Json<RetrieveRequest>,
) -> ActixResult<HttpResponse> {
    let ranking = ranking(&sessions);
    let retrieved = match req.k {
        Some(k) => ranking.retrieve(&req.query, k),
        None => ranking.retrieve_default(&req.query),
    };

    let result = match retrieved {
        Ok(result) => result,
        Err(e) => return Ok(core_error(e)),
    };

    let providers: Vec<RetrievedProvider> = result
        .iter()
        .enumerate()
        .filter_map(|(rank, scored)| {
            ranking.entry(scored).map(|entry| RetrievedProvider {
                rank: rank + 1,
                index: scored.index,
                name: &entry.name,
                average_score: entry.average_score,
                similarity: scored.similarity,
                score: scored.score,
                description: &entry.description,
                link: &entry.link,
                location: &entry.location,
                email: &entry.email,
                phone_number: &entry.phone_number,
            })
        })
        .collect();

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "result": providers
    })))
}

async fn build_context(
    sessions: web::Data<Arc<SessionManager>>,
    req: web::Json<RetrieveRequest>,
) -> ActixResult<HttpResponse> {
    let engine = sessions.engine();
    let k = req.k.unwrap_or(engine.config().context_k);

    let context = engine
        .ranking()
        .retrieve(&req.query, k)
        .and_then(|result| engine.builder().build(&result));

    match context {
        Ok(context) => Ok(HttpResponse::Ok().json(serde_json::json!({
            "context": context
        }))),
        Err(e) => Ok(core_error(e)),
    }
}

async fn create_session(sessions: web::Data<Arc<SessionManager>>) -> ActixResult<HttpResponse> {
    let id = sessions.create_session();
    Ok(HttpResponse::Created().json(serde_json::json!({
        "session_id": id
    })))
}

async fn get_session(
    sessions: web::Data<Arc<SessionManager>>,
    path: web::Path<Uuid>,
) -> ActixResult<HttpResponse> {
    match sessions.snapshot(path.into_inner()).await {
        Ok(snapshot) => Ok(HttpResponse::Ok().json(snapshot)),
        Err(e) => Ok(conversation_error(e)),
    }
}

async fn submit_question(
    sessions: web::Data<Arc<SessionManager>>,
    path: web::Path<Uuid>,
    req: web::Json<QuestionRequest>,
) -> ActixResult<HttpResponse> {
    match sessions.submit_question(path.into_inner(), &req.question).await {
        Ok(reply) => Ok(HttpResponse::Ok().json(reply)),
        Err(e) => Ok(conversation_error(e)),
    }
}

async fn reset_context(
    sessions: web::Data<Arc<SessionManager>>,
    path: web::Path<Uuid>,
) -> ActixResult<HttpResponse> {
    match sessions.reset_context(path.into_inner()).await {
        Ok(()) => Ok(HttpResponse::Ok().json(serde_json::json!({
            "result": true
        }))),
        Err(e) => Ok(conversation_error(e)),
    }
}

async fn end_session(
    sessions: web::Data<Arc<SessionManager>>,
    path: web::Path<Uuid>,
) -> ActixResult<HttpResponse> {
    let id = path.into_inner();
    if sessions.end_session(id) {
        Ok(HttpResponse::Ok().json(serde_json::json!({
            "result": true
        })))
    } else {
        Ok(conversation_error(ConversationError::SessionNotFound(id)))
    }
}
