//! Answer-extraction capability
//!
//! The extractive question-answering model is an external collaborator.
//! The conversation layer only sees the [`AnswerExtractor`] trait; this
//! module ships an HTTP adapter and a small local fallback.

use async_trait::async_trait;
use homefind_core::stopwords::is_stop_word;
use homefind_core::tokenize;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;

/// Extracted answer. `confidence` is passed through but not interpreted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Answer {
    pub text: String,
    pub confidence: f32,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum ExtractionError {
    #[error("request to answer service failed: {0}")]
    Request(String),

    #[error("answer service returned HTTP {0}")]
    Status(u16),

    #[error("invalid answer service response: {0}")]
    InvalidResponse(String),

    #[error("no answer could be extracted: {0}")]
    NoAnswer(String),
}

/// Answers a question from a context string.
///
/// Implementations are stateless from the caller's point of view: one
/// instance is built at startup and shared by every session.
#[async_trait]
pub trait AnswerExtractor: Send + Sync {
    async fn answer(&self, context: &str, question: &str) -> Result<Answer, ExtractionError>;
}

#[derive(Serialize)]
struct ExtractRequest<'a> {
    context: &'a str,
    question: &'a str,
}

#[derive(Deserialize)]
struct ExtractResponse {
    answer: String,
    #[serde(default)]
    score: f32,
}

/// Calls a question-answering service over HTTP.
///
/// Sends `{"context", "question"}` and expects `{"answer", "score"}` back.
#[derive(Debug, Clone)]
pub struct HttpAnswerExtractor {
    client: reqwest::Client,
    url: String,
}

impl HttpAnswerExtractor {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
        }
    }

    /// Same as [`new`](Self::new) with a transport-level timeout on top of
    /// the conversation deadline.
    pub fn with_timeout(url: impl Into<String>, timeout: Duration) -> Result<Self, ExtractionError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ExtractionError::Request(e.to_string()))?;
        Ok(Self { client, url: url.into() })
    }

    #[inline]
    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl AnswerExtractor for HttpAnswerExtractor {
    async fn answer(&self, context: &str, question: &str) -> Result<Answer, ExtractionError> {
        let response = self
            .client
            .post(&self.url)
            .json(&ExtractRequest { context, question })
            .send()
            .await
            .map_err(|e| ExtractionError::Request(e.to_string()))?;

        if !response.status().is_success() {
            return Err(ExtractionError::Status(response.status().as_u16()));
        }

        let body: ExtractResponse = response
            .json()
            .await
            .map_err(|e| ExtractionError::InvalidResponse(e.to_string()))?;

        Ok(Answer {
            text: body.answer,
            confidence: body.score,
        })
    }
}

/// Local extractive fallback.
///
/// Picks the context line sharing the most content words with the question
/// (first line wins ties). Confidence is the fraction of question words found.
#[derive(Debug, Clone, Copy, Default)]
pub struct OverlapExtractor;

impl OverlapExtractor {
    fn content_words(text: &str) -> HashSet<String> {
        tokenize(text)
            .into_iter()
            .filter(|t| !is_stop_word(t))
            .collect()
    }

    pub fn extract(&self, context: &str, question: &str) -> Result<Answer, ExtractionError> {
        let question_words = Self::content_words(question);
        let mut best: Option<(&str, usize)> = None;

        for line in context.lines().filter(|l| !l.trim().is_empty()) {
            let shared = Self::content_words(line)
                .intersection(&question_words)
                .count();
            if best.map_or(true, |(_, s)| shared > s) {
                best = Some((line, shared));
            }
        }

        let (line, shared) =
            best.ok_or_else(|| ExtractionError::NoAnswer("context is empty".to_string()))?;
        let confidence = if question_words.is_empty() {
            0.0
        } else {
            shared as f32 / question_words.len() as f32
        };

        Ok(Answer {
            text: line.trim().to_string(),
            confidence,
        })
    }
}

#[async_trait]
impl AnswerExtractor for OverlapExtractor {
    async fn answer(&self, context: &str, question: &str) -> Result<Answer, ExtractionError> {
        self.extract(context, question)
    }
}
