//! # homefind Context
//!
//! Conversation half of homefind: builds answer contexts from retrieval
//! results and drives per-session question answering.
//!
//! - [`ContextBuilder`] - One sentence per distinct provider, scores re-joined against the catalog
//! - [`AnswerExtractor`] - The external question-answering capability
//! - [`ConversationEngine`] - The `NoContext` / `HasContext` state machine
//! - [`SessionManager`] - Registry of live sessions keyed by uuid

pub mod answer;
pub mod builder;
pub mod conversation;
pub mod error;
pub mod session;

pub use answer::{Answer, AnswerExtractor, ExtractionError, HttpAnswerExtractor, OverlapExtractor};
pub use builder::{ContextBuilder, Subject};
pub use conversation::{
    ContextState, Conversation, ConversationConfig, ConversationEngine, ConversationState, Reply,
    Role, Turn,
};
pub use error::{ConversationError, Result, SessionId};
pub use session::{ConversationSnapshot, SessionManager, DEFAULT_SESSION_IDLE_TIMEOUT};
