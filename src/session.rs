//! In-memory chat sessions
//!
//! Each session owns its history and serializes its own requests: a second
//! message on the same session waits until the first reply is appended.
//! Reads never wait on a send. Idle sessions expire and the number of live
//! sessions is capped. Nothing is persisted.

use crate::chat::{ChatResponder, ConversationTurn, GREETING};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::RwLock;

const DEFAULT_IDLE_TTL: Duration = Duration::from_secs(30 * 60);
const DEFAULT_MAX_SESSIONS: usize = 10_000;
const MAX_SWEEP_PERIOD: Duration = Duration::from_secs(60);

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Session not found: {0}")]
    NotFound(String),
}

/// Bounds on how many sessions are kept and for how long
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionLimits {
    /// A session untouched for this long is dropped
    pub idle_ttl: Duration,
    /// Creating a session beyond this evicts the least recently active one
    pub max_sessions: usize,
}

impl Default for SessionLimits {
    fn default() -> Self {
        Self {
            idle_ttl: DEFAULT_IDLE_TTL,
            max_sessions: DEFAULT_MAX_SESSIONS,
        }
    }
}

impl SessionLimits {
    /// Read `ECOLOBRICK_SESSION_TTL_SECS` and `ECOLOBRICK_MAX_SESSIONS`.
    /// Unset, unparseable or zero values keep the defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let positive = |key: &str| {
            lookup(key)
                .and_then(|v| v.trim().parse::<u64>().ok())
                .filter(|n| *n > 0)
        };

        Self {
            idle_ttl: positive("ECOLOBRICK_SESSION_TTL_SECS")
                .map_or(defaults.idle_ttl, Duration::from_secs),
            max_sessions: positive("ECOLOBRICK_MAX_SESSIONS")
                .and_then(|n| usize::try_from(n).ok())
                .unwrap_or(defaults.max_sessions),
        }
    }
}

struct ChatSession {
    id: String,
    created_at: DateTime<Utc>,
    /// Held for a whole send so turns are appended in order
    turn: tokio::sync::Mutex<()>,
    /// Never held across an await
    history: Mutex<Vec<ConversationTurn>>,
    last_active: Mutex<Instant>,
}

impl ChatSession {
    fn new() -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            created_at: Utc::now(),
            turn: tokio::sync::Mutex::new(()),
            history: Mutex::new(vec![ConversationTurn::assistant(GREETING)]),
            last_active: Mutex::new(Instant::now()),
        }
    }

    fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            id: self.id.clone(),
            created_at: self.created_at,
            history: self.history.lock().unwrap().clone(),
        }
    }

    fn touch(&self) {
        *self.last_active.lock().unwrap() = Instant::now();
    }

    fn idle_for(&self) -> Duration {
        self.last_active.lock().unwrap().elapsed()
    }

    /// A session with a send in flight is never idle
    fn is_expired(&self, ttl: Duration) -> bool {
        self.idle_for() >= ttl && self.turn.try_lock().is_ok()
    }
}

/// Point-in-time copy of a session
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub history: Vec<ConversationTurn>,
}

/// Result of sending a message on a session
#[derive(Debug, Clone)]
pub struct SessionReply {
    pub reply: String,
    pub session: SessionSnapshot,
}

/// Registry of live sessions
pub struct SessionStore {
    responder: ChatResponder,
    limits: SessionLimits,
    sessions: RwLock<HashMap<String, Arc<ChatSession>>>,
}

impl SessionStore {
    #[cfg(test)]
    pub fn new(responder: ChatResponder) -> Self {
        Self::with_limits(responder, SessionLimits::default())
    }

    pub fn with_limits(responder: ChatResponder, limits: SessionLimits) -> Self {
        Self {
            responder,
            limits: SessionLimits {
                max_sessions: limits.max_sessions.max(1),
                ..limits
            },
            sessions: RwLock::new(HashMap::new()),
        }
    }

    pub fn responder(&self) -> &ChatResponder {
        &self.responder
    }

    /// Start a session whose history holds only the greeting. Idle sessions
    /// are dropped first; at the cap the least recently active one goes.
    pub async fn create(&self) -> SessionSnapshot {
        let session = Arc::new(ChatSession::new());
        let snapshot = session.snapshot();

        let (active, expired, evicted) = {
            let mut sessions = self.sessions.write().await;
            let expired = drop_expired(&mut sessions, self.limits.idle_ttl);
            let evicted = if sessions.len() >= self.limits.max_sessions {
                evict_least_active(&mut sessions)
            } else {
                None
            };
            sessions.insert(session.id.clone(), session);
            (sessions.len(), expired, evicted)
        };

        if let Some(evicted) = evicted {
            tracing::warn!(
                session_id = %evicted,
                max_sessions = self.limits.max_sessions,
                "Session limit reached, evicted least recently active session"
            );
        }
        tracing::info!(session_id = %snapshot.id, active, expired, "Chat session created");
        snapshot
    }

    /// Current history. Does not wait for a send in flight.
    pub async fn get(&self, id: &str) -> Result<SessionSnapshot, SessionError> {
        let session = self.lookup(id).await?;
        Ok(session.snapshot())
    }

    /// Answer `message` against the session's history, then append the user
    /// turn and the reply. Sends on one session run one at a time.
    pub async fn send(&self, id: &str, message: &str) -> Result<SessionReply, SessionError> {
        let session = self.lookup(id).await?;
        let _turn = session.turn.lock().await;

        let prior = session.history.lock().unwrap().clone();
        let reply = self.responder.respond(&prior, message).await;

        let turns = {
            let mut history = session.history.lock().unwrap();
            history.push(ConversationTurn::user(message));
            history.push(ConversationTurn::assistant(reply.clone()));
            history.len()
        };
        session.touch();

        tracing::debug!(session_id = %id, turns, "Chat turn appended");

        Ok(SessionReply {
            reply,
            session: session.snapshot(),
        })
    }

    /// End a session and discard its history
    pub async fn remove(&self, id: &str) -> Result<(), SessionError> {
        if self.sessions.write().await.remove(id).is_none() {
            return Err(SessionError::NotFound(id.to_string()));
        }
        tracing::info!(session_id = %id, "Chat session ended");
        Ok(())
    }

    /// Drop every idle session, returning how many went
    pub async fn sweep(&self) -> usize {
        let (expired, active) = {
            let mut sessions = self.sessions.write().await;
            (drop_expired(&mut sessions, self.limits.idle_ttl), sessions.len())
        };
        if expired > 0 {
            tracing::info!(expired, active, "Expired idle chat sessions");
        }
        expired
    }

    /// Sweep on a timer for as long as the store is alive
    pub fn spawn_sweeper(store: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let period = store.limits.idle_ttl.min(MAX_SWEEP_PERIOD);
        let store = Arc::downgrade(store);

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // First tick completes immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(store) = store.upgrade() else {
                    break;
                };
                store.sweep().await;
            }
        })
    }

    #[cfg(test)]
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    async fn lookup(&self, id: &str) -> Result<Arc<ChatSession>, SessionError> {
        let found = self.sessions.read().await.get(id).cloned();
        match found {
            Some(session) if !session.is_expired(self.limits.idle_ttl) => {
                session.touch();
                Ok(session)
            }
            Some(_) => {
                self.sweep().await;
                Err(SessionError::NotFound(id.to_string()))
            }
            None => Err(SessionError::NotFound(id.to_string())),
        }
    }
}

fn drop_expired(sessions: &mut HashMap<String, Arc<ChatSession>>, ttl: Duration) -> usize {
    let before = sessions.len();
    sessions.retain(|_, session| !session.is_expired(ttl));
    before - sessions.len()
}

fn evict_least_active(sessions: &mut HashMap<String, Arc<ChatSession>>) -> Option<String> {
    let id = sessions
        .values()
        .filter(|session| session.turn.try_lock().is_ok())
        .max_by_key(|session| session.idle_for())
        .map(|session| session.id.clone())?;
    sessions.remove(&id);
    Some(id)
}
