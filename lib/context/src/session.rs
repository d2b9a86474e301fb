use crate::conversation::{ConversationEngine, ConversationState, Reply, Turn};
use crate::error::{ConversationError, Result, SessionId};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

/// Sessions untouched for this long are dropped on the next prune.
pub const DEFAULT_SESSION_IDLE_TIMEOUT: Duration = Duration::from_secs(30 * 60);

struct Session {
    state: Mutex<ConversationState>,
    last_active: parking_lot::Mutex<Instant>,
}

impl Session {
    fn new() -> Self {
        Self {
            state: Mutex::new(ConversationState::new()),
            last_active: parking_lot::Mutex::new(Instant::now()),
        }
    }

    fn touch(&self) {
        *self.last_active.lock() = Instant::now();
    }

    fn idle_for(&self) -> Duration {
        self.last_active.lock().elapsed()
    }
}

type SessionSlot = Arc<Session>;

/// Point-in-time view of one session.
#[derive(Debug, Clone, Serialize)]
pub struct ConversationSnapshot {
    pub session_id: SessionId,
    pub state: &'static str,
    pub context: Option<String>,
    pub transcript: Vec<Turn>,
    pub created_at: DateTime<Utc>,
}

/// Registry of live conversations sharing one [`ConversationEngine`].
///
/// Turns within a session are serialized by a per-session lock; different
/// sessions proceed independently. Sessions idle longer than the idle
/// timeout are dropped whenever a new session is created, or on an explicit
/// [`prune_idle`](Self::prune_idle).
pub struct SessionManager {
    engine: Arc<ConversationEngine>,
    sessions: RwLock<HashMap<SessionId, SessionSlot>>,
    idle_timeout: Option<Duration>,
}

impl SessionManager {
    pub fn new(engine: Arc<ConversationEngine>) -> Self {
        Self {
            engine,
            sessions: RwLock::new(HashMap::new()),
            idle_timeout: Some(DEFAULT_SESSION_IDLE_TIMEOUT),
        }
    }

    /// `None` keeps sessions until they are ended explicitly.
    pub fn with_idle_timeout(mut self, idle_timeout: Option<Duration>) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    #[inline]
    pub fn idle_timeout(&self) -> Option<Duration> {
        self.idle_timeout
    }

    #[inline]
    pub fn engine(&self) -> &Arc<ConversationEngine> {
        &self.engine
    }

    pub fn create_session(&self) -> SessionId {
        self.prune_idle();

        let id = Uuid::new_v4();
        self.sessions.write().insert(id, Arc::new(Session::new()));
        info!(session = %id, "Session created");
        id
    }

    /// Drop sessions idle for longer than the idle timeout. Sessions with a
    /// request in flight are kept. Returns how many were dropped.
    pub fn prune_idle(&self) -> usize {
        let Some(timeout) = self.idle_timeout else {
            return 0;
        };

        let mut sessions = self.sessions.write();
        let before = sessions.len();
        sessions.retain(|id, session| {
            let keep = Arc::strong_count(session) > 1 || session.idle_for() <= timeout;
            if !keep {
                debug!(session = %id, "Dropping idle session");
            }
            keep
        });

        let pruned = before - sessions.len();
        if pruned > 0 {
            info!(pruned, remaining = sessions.len(), "Pruned idle sessions");
        }
        pruned
    }

    fn slot(&self, id: SessionId) -> Result<SessionSlot> {
        let slot = self
            .sessions
            .read()
            .get(&id)
            .cloned()
            .ok_or(ConversationError::SessionNotFound(id))?;
        slot.touch();
        Ok(slot)
    }

    /// Submit a question to a session; see [`ConversationEngine::submit`].
    pub async fn submit_question(&self, id: SessionId, question: &str) -> Result<Reply> {
        let slot = self.slot(id)?;
        let mut state = slot.state.lock().await;
        let reply = self.engine.submit(&mut state, question).await;
        slot.touch();
        let reply = reply?;
        debug!(session = %id, context_built = reply.context_built, "Question answered");
        Ok(reply)
    }

    pub async fn reset_context(&self, id: SessionId) -> Result<()> {
        let slot = self.slot(id)?;
        slot.state.lock().await.reset_context();
        debug!(session = %id, "Session context reset");
        Ok(())
    }

    /// Returns `false` if the session did not exist.
    pub fn end_session(&self, id: SessionId) -> bool {
        let removed = self.sessions.write().remove(&id).is_some();
        if removed {
            info!(session = %id, "Session ended");
        }
        removed
    }

    pub async fn snapshot(&self, id: SessionId) -> Result<ConversationSnapshot> {
        let slot = self.slot(id)?;
        let state = slot.state.lock().await;
        Ok(ConversationSnapshot {
            session_id: id,
            state: state.context().label(),
            context: state.context().as_str().map(str::to_string),
            transcript: state.transcript().to_vec(),
            created_at: state.created_at(),
        })
    }

    pub fn session_count(&self) -> usize {
        self.sessions.read().len()
    }
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("engine", &self.engine)
            .field("sessions", &self.session_count())
            .field("idle_timeout", &self.idle_timeout)
            .finish()
    }
}
