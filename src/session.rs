//! In-memory cookie sessions.
//!
//! A session is identified by a random UUID carried in the `session_id`
//! cookie. The only state a session holds is whether its owner has logged in.
//! Sessions that sit idle longer than the configured timeout are dropped.

use std::collections::HashMap;
use std::sync::Arc;

use axum::http::{HeaderMap, HeaderValue, header};
use chrono::{DateTime, Duration, Utc};
use tokio::sync::RwLock;
use tracing::{debug, warn};
use uuid::Uuid;

/// Name of the cookie carrying the session id.
pub const SESSION_COOKIE: &str = "session_id";

/// Default idle timeout in minutes.
pub const DEFAULT_SESSION_TIMEOUT_MINUTES: i64 = 60;

#[derive(Debug, Clone)]
struct Session {
    authenticated: bool,
    last_seen: DateTime<Utc>,
}

impl Session {
    fn fresh(now: DateTime<Utc>) -> Self {
        Self {
            authenticated: false,
            last_seen: now,
        }
    }
}

/// The session attached to the current request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionHandle {
    pub id: Uuid,
    pub authenticated: bool,
    /// True when the id was issued during this request and must be sent back.
    pub issued: bool,
}

impl SessionHandle {
    /// `Set-Cookie` value for this session, if the client does not have it yet.
    pub fn set_cookie(&self) -> Option<HeaderValue> {
        if !self.issued {
            return None;
        }
        HeaderValue::from_str(&format!(
            "{SESSION_COOKIE}={}; HttpOnly; Path=/",
            self.id.simple()
        ))
        .ok()
    }
}

/// Shared session table.
#[derive(Clone)]
pub struct SessionStore {
    sessions: Arc<RwLock<HashMap<Uuid, Session>>>,
    timeout: Duration,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new(DEFAULT_SESSION_TIMEOUT_MINUTES)
    }
}

impl SessionStore {
    /// Store with an idle timeout of `timeout_minutes`.
    ///
    /// Values that are not positive or do not fit a `Duration` fall back to
    /// [`DEFAULT_SESSION_TIMEOUT_MINUTES`].
    pub fn new(timeout_minutes: i64) -> Self {
        let timeout = Duration::try_minutes(timeout_minutes)
            .filter(|timeout| *timeout > Duration::zero())
            .unwrap_or_else(|| {
                warn!(
                    timeout_minutes,
                    default = DEFAULT_SESSION_TIMEOUT_MINUTES,
                    "Invalid session timeout, using default"
                );
                Duration::minutes(DEFAULT_SESSION_TIMEOUT_MINUTES)
            });
        Self::with_timeout(timeout)
    }

    fn with_timeout(timeout: Duration) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            timeout,
        }
    }

    /// Find the live session named by the request cookie, or start a new one.
    pub async fn resolve(&self, headers: &HeaderMap) -> SessionHandle {
        let now = Utc::now();
        let mut sessions = self.sessions.write().await;

        if let Some(id) = session_id_from_headers(headers) {
            if let Some(session) = sessions.get_mut(&id) {
                if now - session.last_seen <= self.timeout {
                    session.last_seen = now;
                    return SessionHandle {
                        id,
                        authenticated: session.authenticated,
                        issued: false,
                    };
                }
                debug!("Session expired");
                sessions.remove(&id);
            }
        }

        let id = Uuid::new_v4();
        sessions.insert(id, Session::fresh(now));
        SessionHandle {
            id,
            authenticated: false,
            issued: true,
        }
    }

    /// Discard `old` and issue a fresh unauthenticated session.
    pub async fn regenerate(&self, old: Uuid) -> SessionHandle {
        let now = Utc::now();
        let mut sessions = self.sessions.write().await;
        sessions.remove(&old);

        let id = Uuid::new_v4();
        sessions.insert(id, Session::fresh(now));
        SessionHandle {
            id,
            authenticated: false,
            issued: true,
        }
    }

    /// Mark a session as belonging to a logged-in member.
    pub async fn authenticate(&self, handle: &mut SessionHandle) {
        if let Some(session) = self.sessions.write().await.get_mut(&handle.id) {
            session.authenticated = true;
            handle.authenticated = true;
        }
    }

    /// Drop every session that has been idle past the timeout.
    pub async fn purge_expired(&self) -> usize {
        let now = Utc::now();
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, session| now - session.last_seen <= self.timeout);
        before - sessions.len()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}

/// Extract the session id from the request's `Cookie` headers.
fn session_id_from_headers(headers: &HeaderMap) -> Option<Uuid> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .and_then(|(_, value)| Uuid::parse_str(value.trim()).ok())
}
