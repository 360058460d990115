use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::session::{CallSession, DialAttempt, SessionEvent, SessionState, SessionView, TransitionError};

/// Result of applying an event through the registry.
#[derive(Debug, Clone)]
pub struct Applied {
    pub view: SessionView,
    pub dial_attempt: Option<DialAttempt>,
}

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("No session with id {0}")]
    UnknownSession(Uuid),
    #[error("No session bound to call {0}")]
    UnknownCall(String),
    #[error(transparent)]
    Transition(#[from] TransitionError),
}

struct Entry {
    session: CallSession,
    /// Last accepted event other than a timer tick.
    touched: Instant,
}

#[derive(Default)]
struct Inner {
    sessions: HashMap<Uuid, Entry>,
    /// Call SID of each session's current call -> owning session.
    by_call_sid: HashMap<String, Uuid>,
}

/// Registry of live calling sessions.
///
/// Events arrive from two directions: the browser client reporting its
/// transport events, and Twilio's call status callback keyed by call SID.
/// Both land on the same state machine, which deduplicates them. Only the
/// call a session is currently running is reachable by SID.
#[derive(Clone, Default)]
pub struct SessionRegistry {
    inner: Arc<Mutex<Inner>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new session.
    pub async fn insert(&self, session: CallSession) -> SessionView {
        let view = session.view();
        tracing::info!(
            session_id = %view.id,
            user_id = %view.user_id,
            state = view.state,
            "Session registered"
        );
        self.inner.lock().await.sessions.insert(
            session.id(),
            Entry {
                session,
                touched: Instant::now(),
            },
        );
        view
    }

    pub async fn get(&self, id: Uuid) -> Option<SessionView> {
        self.inner
            .lock()
            .await
            .sessions
            .get(&id)
            .map(|e| e.session.view())
    }

    pub async fn state(&self, id: Uuid) -> Option<SessionState> {
        self.inner
            .lock()
            .await
            .sessions
            .get(&id)
            .map(|e| e.session.state())
    }

    pub async fn apply(&self, id: Uuid, event: SessionEvent) -> Result<Applied, RegistryError> {
        let mut inner = self.inner.lock().await;
        Self::apply_locked(&mut inner, id, event)
    }

    /// Apply an event to the session whose current call is `call_sid`.
    pub async fn apply_by_call_sid(
        &self,
        call_sid: &str,
        event: SessionEvent,
    ) -> Result<Applied, RegistryError> {
        let mut inner = self.inner.lock().await;
        let unknown = || RegistryError::UnknownCall(call_sid.to_string());
        let id = *inner.by_call_sid.get(call_sid).ok_or_else(unknown)?;

        let current = inner
            .sessions
            .get(&id)
            .is_some_and(|e| e.session.call_sid() == Some(call_sid));
        if !current {
            inner.by_call_sid.remove(call_sid);
            return Err(unknown());
        }
        Self::apply_locked(&mut inner, id, event)
    }

    fn apply_locked(
        inner: &mut Inner,
        id: Uuid,
        event: SessionEvent,
    ) -> Result<Applied, RegistryError> {
        let entry = inner
            .sessions
            .get_mut(&id)
            .ok_or(RegistryError::UnknownSession(id))?;
        let session = &mut entry.session;

        let event_name = event.name();
        let from = session.state();
        let previous_sid = session.call_sid().map(str::to_string);

        let dial_attempt = session.apply(event)?;
        entry.touched = Instant::now();
        let view = session.view();

        if previous_sid.as_deref() != session.call_sid() {
            if let Some(old) = previous_sid {
                inner.by_call_sid.remove(&old);
            }
            if let Some(sid) = session.call_sid() {
                inner.by_call_sid.insert(sid.to_string(), id);
            }
        }

        if from != session.state() {
            tracing::info!(
                session_id = %id,
                event = event_name,
                from = from.as_str(),
                to = view.state,
                "Session transition"
            );
        }

        Ok(Applied { view, dial_attempt })
    }

    /// Advance the timer of every connected session by one second.
    /// Returns how many sessions were ticked.
    pub async fn tick_connected(&self) -> usize {
        let mut inner = self.inner.lock().await;
        let mut ticked = 0;
        for entry in inner.sessions.values_mut() {
            if entry.session.state() == SessionState::Connected
                && entry.session.apply(SessionEvent::Tick).is_ok()
            {
                ticked += 1;
            }
        }
        ticked
    }

    /// Drop sessions without a call in flight that have seen no event for
    /// `idle`. Returns how many were dropped.
    pub async fn evict_idle(&self, idle: Duration) -> usize {
        let mut inner = self.inner.lock().await;
        let now = Instant::now();
        let stale: Vec<Uuid> = inner
            .sessions
            .iter()
            .filter(|(_, e)| {
                !matches!(
                    e.session.state(),
                    SessionState::Dialing | SessionState::Connected
                ) && now.duration_since(e.touched) >= idle
            })
            .map(|(id, _)| *id)
            .collect();

        for id in &stale {
            inner.sessions.remove(id);
            tracing::info!(session_id = %id, "Idle session evicted");
        }
        let Inner {
            sessions,
            by_call_sid,
        } = &mut *inner;
        by_call_sid.retain(|_, owner| sessions.contains_key(owner));
        stale.len()
    }

    /// Deregister a session and every call SID bound to it.
    pub async fn remove(&self, id: Uuid) -> bool {
        let mut inner = self.inner.lock().await;
        inner.by_call_sid.retain(|_, owner| *owner != id);
        let removed = inner.sessions.remove(&id).is_some();
        if removed {
            tracing::info!(session_id = %id, "Session deregistered");
        }
        removed
    }

    #[cfg(test)]
    pub async fn len(&self) -> usize {
        self.inner.lock().await.sessions.len()
    }

    #[cfg(test)]
    async fn bound_calls(&self) -> usize {
        self.inner.lock().await.by_call_sid.len()
    }

    /// Tick connected sessions once per second and evict sessions idle for
    /// `idle`, until `cancel` fires.
    pub fn spawn_ticker(&self, idle: Duration, cancel: CancellationToken) -> JoinHandle<()> {
        let registry = self.clone();
        tokio::spawn(async move {
            let mut interval = time::interval(Duration::from_secs(1));
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = interval.tick() => {
                        registry.tick_connected().await;
                        registry.evict_idle(idle).await;
                    }
                }
            }
            tracing::debug!("Session ticker stopped");
        })
    }
}
