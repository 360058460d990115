//! Call-session lifecycle.
//!
//! A [`CallSession`] follows one calling client from token request through
//! device registration and then through any number of dial attempts. Each
//! `Dial` starts a fresh session: the destination, caller-id line, recording
//! flag and lead/campaign context are fixed until the call reaches a terminal
//! state, and every session-scoped field is cleared on the way out so the next
//! dial starts clean.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Why a session ended up in [`SessionState::Failed`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Token or device registration failed. Terminal until the client is
    /// recreated; no dial is accepted afterwards.
    Registration,
    /// The transport reported an error for a call. A new dial may follow.
    Call,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    RequestingToken,
    Ready,
    Dialing,
    Connected,
    Disconnected,
    Rejected,
    Cancelled,
    Failed(FailureKind),
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::RequestingToken => "requesting-token",
            SessionState::Ready => "ready",
            SessionState::Dialing => "dialing",
            SessionState::Connected => "connected",
            SessionState::Disconnected => "disconnected",
            SessionState::Rejected => "rejected",
            SessionState::Cancelled => "cancelled",
            SessionState::Failed(_) => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionState::Disconnected
                | SessionState::Rejected
                | SessionState::Cancelled
                | SessionState::Failed(_)
        )
    }

    /// States in which a remote call may be created and bound.
    pub fn accepts_call(&self) -> bool {
        matches!(self, SessionState::Dialing | SessionState::Connected)
    }

    /// States from which a new dial may start.
    fn accepts_dial(&self) -> bool {
        matches!(
            self,
            SessionState::Ready
                | SessionState::Disconnected
                | SessionState::Rejected
                | SessionState::Cancelled
                | SessionState::Failed(FailureKind::Call)
        )
    }
}

/// Parameters of a user-initiated connect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DialParams {
    /// Destination number.
    pub to: String,
    /// Outbound line chosen as caller id.
    #[serde(default)]
    pub caller_id: Option<String>,
    #[serde(default)]
    pub record: bool,
    #[serde(default)]
    pub lead_id: Option<String>,
    #[serde(default)]
    pub campaign_id: Option<String>,
    /// Display name used for the recording, if one is made.
    #[serde(default)]
    pub lead_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    RequestToken,
    TokenIssued { token: String },
    Registered,
    RegistrationFailed { message: String },
    Dial(DialParams),
    /// The remote call object exists (transport handle or Twilio call SID).
    CallCreated { call_sid: String },
    Accepted,
    /// One second of connected time.
    Tick,
    Disconnected,
    Rejected,
    Cancelled,
    Failed { message: String },
}

impl SessionEvent {
    pub fn name(&self) -> &'static str {
        match self {
            SessionEvent::RequestToken => "request_token",
            SessionEvent::TokenIssued { .. } => "token_issued",
            SessionEvent::Registered => "registered",
            SessionEvent::RegistrationFailed { .. } => "registration_failed",
            SessionEvent::Dial(_) => "dial",
            SessionEvent::CallCreated { .. } => "call_created",
            SessionEvent::Accepted => "accepted",
            SessionEvent::Tick => "tick",
            SessionEvent::Disconnected => "disconnected",
            SessionEvent::Rejected => "rejected",
            SessionEvent::Cancelled => "cancelled",
            SessionEvent::Failed { .. } => "failed",
        }
    }

    /// Map a Twilio `CallStatus` value to the event it implies.
    pub fn from_call_status(call_sid: &str, status: &str) -> Option<Self> {
        match status {
            "queued" | "initiated" | "ringing" => Some(SessionEvent::CallCreated {
                call_sid: call_sid.to_string(),
            }),
            "in-progress" | "answered" => Some(SessionEvent::Accepted),
            "completed" => Some(SessionEvent::Disconnected),
            "busy" => Some(SessionEvent::Rejected),
            "no-answer" | "canceled" => Some(SessionEvent::Cancelled),
            "failed" => Some(SessionEvent::Failed {
                message: "Call failed".to_string(),
            }),
            _ => None,
        }
    }
}

/// A counted outbound attempt, produced once per session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DialAttempt {
    pub session_id: Uuid,
    pub user_id: String,
    pub attempt: u32,
    pub call_sid: String,
    pub to: String,
    pub lead_id: Option<String>,
    pub campaign_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransitionError {
    #[error("cannot apply '{event}' while session is {state}")]
    Invalid {
        state: &'static str,
        event: &'static str,
    },
    #[error("no capability token has been issued for this session")]
    MissingToken,
    #[error("device registration failed; start a new session")]
    RegistrationFailed,
}

#[derive(Debug, Clone)]
pub struct CallSession {
    id: Uuid,
    user_id: String,
    identity: String,
    state: SessionState,
    token: Option<String>,
    /// Number of sessions started with `Dial`.
    attempt: u32,
    dial: Option<DialParams>,
    call_sid: Option<String>,
    record: bool,
    dial_accounted: bool,
    elapsed_secs: u64,
    last_error: Option<String>,
    created_at: DateTime<Utc>,
}

impl CallSession {
    pub fn new(user_id: impl Into<String>, identity: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: user_id.into(),
            identity: identity.into(),
            state: SessionState::Idle,
            token: None,
            attempt: 0,
            dial: None,
            call_sid: None,
            record: false,
            dial_accounted: false,
            elapsed_secs: 0,
            last_error: None,
            created_at: Utc::now(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Handle of the call this session is running, once one exists.
    pub fn call_sid(&self) -> Option<&str> {
        self.call_sid.as_deref()
    }

    /// Apply one event. Returns the dial attempt to account, if this event is
    /// the first creation of a remote call in the current session.
    pub fn apply(&mut self, event: SessionEvent) -> Result<Option<DialAttempt>, TransitionError> {
        use SessionState as S;

        let invalid = TransitionError::Invalid {
            state: self.state.as_str(),
            event: event.name(),
        };

        match (self.state, event) {
            (S::Idle, SessionEvent::RequestToken) => self.state = S::RequestingToken,
            (S::RequestingToken, SessionEvent::TokenIssued { token }) => self.token = Some(token),
            (S::RequestingToken, SessionEvent::Registered) => {
                if self.token.is_none() {
                    return Err(TransitionError::MissingToken);
                }
                self.state = S::Ready;
            }
            (S::RequestingToken, SessionEvent::RegistrationFailed { message }) => {
                self.token = None;
                self.finish(S::Failed(FailureKind::Registration), Some(message));
            }
            (S::Failed(FailureKind::Registration), SessionEvent::Dial(_)) => {
                return Err(TransitionError::RegistrationFailed);
            }
            (state, SessionEvent::Dial(params)) if state.accepts_dial() => self.begin(params),
            (state, SessionEvent::CallCreated { call_sid }) if state.accepts_call() => {
                if self.call_sid.is_none() {
                    self.call_sid = Some(call_sid);
                }
                if !self.dial_accounted {
                    self.dial_accounted = true;
                    return Ok(Some(self.dial_attempt()));
                }
            }
            (S::Dialing, SessionEvent::Accepted) => {
                self.state = S::Connected;
                self.elapsed_secs = 0;
            }
            (S::Connected, SessionEvent::Accepted) => {}
            (S::Connected, SessionEvent::Tick) => self.elapsed_secs += 1,
            (_, SessionEvent::Tick) => {}
            (S::Dialing | S::Connected, SessionEvent::Disconnected) => {
                self.finish(S::Disconnected, None)
            }
            // Transports repeat themselves; a second terminal event changes nothing.
            (
                state,
                SessionEvent::Disconnected
                | SessionEvent::Rejected
                | SessionEvent::Cancelled
                | SessionEvent::Failed { .. },
            ) if state.is_terminal() => {}
            (
                S::Idle | S::RequestingToken,
                SessionEvent::Rejected | SessionEvent::Cancelled | SessionEvent::Failed { .. },
            ) => return Err(invalid),
            (_, SessionEvent::Rejected) => {
                self.finish(S::Rejected, Some("Call was rejected".to_string()))
            }
            (_, SessionEvent::Cancelled) => self.finish(S::Cancelled, None),
            (_, SessionEvent::Failed { message }) => {
                self.finish(S::Failed(FailureKind::Call), Some(message))
            }
            _ => return Err(invalid),
        }

        Ok(None)
    }

    fn begin(&mut self, params: DialParams) {
        self.attempt += 1;
        self.state = SessionState::Dialing;
        self.record = params.record;
        self.dial = Some(params);
        self.call_sid = None;
        self.dial_accounted = false;
        self.elapsed_secs = 0;
        self.last_error = None;
    }

    fn finish(&mut self, state: SessionState, error: Option<String>) {
        self.state = state;
        self.call_sid = None;
        self.record = false;
        self.dial_accounted = false;
        self.elapsed_secs = 0;
        self.last_error = error;
    }

    fn dial_attempt(&self) -> DialAttempt {
        let dial = self.dial.as_ref();
        DialAttempt {
            session_id: self.id,
            user_id: self.user_id.clone(),
            attempt: self.attempt,
            call_sid: self.call_sid.clone().unwrap_or_default(),
            to: dial.map(|d| d.to.clone()).unwrap_or_default(),
            lead_id: dial.and_then(|d| d.lead_id.clone()),
            campaign_id: dial.and_then(|d| d.campaign_id.clone()),
        }
    }

    pub fn view(&self) -> SessionView {
        let dial = self.dial.as_ref();
        SessionView {
            id: self.id,
            user_id: self.user_id.clone(),
            identity: self.identity.clone(),
            state: self.state.as_str(),
            failure: match self.state {
                SessionState::Failed(kind) => Some(kind),
                _ => None,
            },
            attempt: self.attempt,
            to: dial.map(|d| d.to.clone()),
            caller_id: dial.and_then(|d| d.caller_id.clone()),
            lead_id: dial.and_then(|d| d.lead_id.clone()),
            campaign_id: dial.and_then(|d| d.campaign_id.clone()),
            record: self.record,
            call_sid: self.call_sid.clone(),
            elapsed_secs: self.elapsed_secs,
            elapsed: format_call_time(self.elapsed_secs),
            error: self.last_error.clone(),
            created_at: self.created_at,
        }
    }
}

/// Snapshot of a session for API responses.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionView {
    pub id: Uuid,
    pub user_id: String,
    pub identity: String,
    pub state: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureKind>,
    pub attempt: u32,
    pub to: Option<String>,
    pub caller_id: Option<String>,
    pub lead_id: Option<String>,
    pub campaign_id: Option<String>,
    pub record: bool,
    pub call_sid: Option<String>,
    pub elapsed_secs: u64,
    pub elapsed: String,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Format a call timer as zero-padded `MM:SS`.
pub fn format_call_time(secs: u64) -> String {
    format!("{:02}:{:02}", secs / 60, secs % 60)
}

#[cfg(test)]
mod tests {
    use super::*;

    impl CallSession {
        fn token(&self) -> Option<&str> {
            self.token.as_deref()
        }

        fn record(&self) -> bool {
            self.record
        }

        fn dial_accounted(&self) -> bool {
            self.dial_accounted
        }

        fn elapsed_secs(&self) -> u64 {
            self.elapsed_secs
        }
    }

    fn params(record: bool) -> DialParams {
        DialParams {
            to: "+15551230000".to_string(),
            caller_id: Some("+15559990000".to_string()),
            record,
            lead_id: Some("lead-7".to_string()),
            campaign_id: Some("camp-1".to_string()),
            lead_name: Some("Dana Scully".to_string()),
        }
    }

    fn ready_session() -> CallSession {
        let mut s = CallSession::new("user-1", "user_1700000000");
        s.apply(SessionEvent::RequestToken).unwrap();
        s.apply(SessionEvent::TokenIssued {
            token: "jwt".to_string(),
        })
        .unwrap();
        s.apply(SessionEvent::Registered).unwrap();
        assert_eq!(s.state(), SessionState::Ready);
        s
    }

    fn created(sid: &str) -> SessionEvent {
        SessionEvent::CallCreated {
            call_sid: sid.to_string(),
        }
    }

    #[test]
    fn happy_path_reaches_connected_and_back() {
        let mut s = ready_session();
        s.apply(SessionEvent::Dial(params(true))).unwrap();
        assert_eq!(s.state(), SessionState::Dialing);
        assert!(s.record());

        let attempt = s.apply(created("CA1")).unwrap().unwrap();
        assert_eq!(attempt.lead_id.as_deref(), Some("lead-7"));
        assert_eq!(attempt.call_sid, "CA1");
        assert_eq!(attempt.attempt, 1);

        s.apply(SessionEvent::Accepted).unwrap();
        assert_eq!(s.state(), SessionState::Connected);
        for _ in 0..3 {
            s.apply(SessionEvent::Tick).unwrap();
        }
        assert_eq!(s.elapsed_secs(), 3);

        s.apply(SessionEvent::Disconnected).unwrap();
        assert_eq!(s.state(), SessionState::Disconnected);
        assert_eq!(s.elapsed_secs(), 0);
        assert!(s.call_sid().is_none());
        assert!(!s.record());
    }

    #[test]
    fn dial_is_accounted_once_under_duplicate_events() {
        let mut s = ready_session();
        s.apply(SessionEvent::Dial(params(false))).unwrap();

        let mut counted = 0;
        for event in [
            created("CA1"),
            created("CA1"),
            SessionEvent::Accepted,
            created("CA1"),
            SessionEvent::Accepted,
        ] {
            if s.apply(event).unwrap().is_some() {
                counted += 1;
            }
        }
        assert_eq!(counted, 1);
        assert!(s.dial_accounted());
    }

    #[test]
    fn dial_is_accounted_without_pickup() {
        let mut s = ready_session();
        s.apply(SessionEvent::Dial(params(false))).unwrap();
        assert!(s.apply(created("CA1")).unwrap().is_some());
        s.apply(SessionEvent::Cancelled).unwrap();
        assert_eq!(s.state(), SessionState::Cancelled);
    }

    #[test]
    fn next_session_accounts_again() {
        let mut s = ready_session();
        s.apply(SessionEvent::Dial(params(false))).unwrap();
        assert!(s.apply(created("CA1")).unwrap().is_some());
        s.apply(SessionEvent::Rejected).unwrap();

        s.apply(SessionEvent::Dial(params(false))).unwrap();
        let attempt = s.apply(created("CA2")).unwrap().unwrap();
        assert_eq!(attempt.attempt, 2);
        assert_eq!(attempt.call_sid, "CA2");
    }

    #[test]
    fn terminal_transitions_clear_session_fields() {
        let terminals = [
            SessionEvent::Disconnected,
            SessionEvent::Rejected,
            SessionEvent::Cancelled,
            SessionEvent::Failed {
                message: "ICE failure".to_string(),
            },
        ];
        for terminal in terminals {
            let mut s = ready_session();
            s.apply(SessionEvent::Dial(params(true))).unwrap();
            s.apply(created("CA1")).unwrap();
            s.apply(SessionEvent::Accepted).unwrap();
            s.apply(SessionEvent::Tick).unwrap();

            s.apply(terminal.clone()).unwrap();
            assert!(s.state().is_terminal(), "{terminal:?}");
            assert!(s.call_sid().is_none(), "{terminal:?}");
            assert!(!s.record(), "{terminal:?}");
            assert!(!s.dial_accounted(), "{terminal:?}");
            assert_eq!(s.elapsed_secs(), 0, "{terminal:?}");

            // A new dial is possible right away and starts clean.
            s.apply(SessionEvent::Dial(params(false))).unwrap();
            assert_eq!(s.state(), SessionState::Dialing);
            assert!(s.call_sid().is_none());
        }
    }

    #[test]
    fn repeated_terminal_events_are_ignored() {
        let mut s = ready_session();
        s.apply(SessionEvent::Dial(params(false))).unwrap();
        s.apply(SessionEvent::Rejected).unwrap();
        s.apply(SessionEvent::Disconnected).unwrap();
        s.apply(SessionEvent::Cancelled).unwrap();
        assert_eq!(s.state(), SessionState::Rejected);
        assert_eq!(s.view().error.as_deref(), Some("Call was rejected"));
    }

    #[test]
    fn transport_events_rejected_before_ready() {
        let mut s = CallSession::new("user-1", "id");
        assert!(s.apply(SessionEvent::Rejected).is_err());
        s.apply(SessionEvent::RequestToken).unwrap();
        assert!(s.apply(SessionEvent::Cancelled).is_err());
        assert!(s
            .apply(SessionEvent::Failed {
                message: "x".to_string()
            })
            .is_err());
        assert_eq!(s.state(), SessionState::RequestingToken);
    }

    #[test]
    fn registration_requires_a_token() {
        let mut s = CallSession::new("user-1", "id");
        s.apply(SessionEvent::RequestToken).unwrap();
        assert_eq!(
            s.apply(SessionEvent::Registered),
            Err(TransitionError::MissingToken)
        );
    }

    #[test]
    fn registration_failure_is_terminal() {
        let mut s = CallSession::new("user-1", "id");
        s.apply(SessionEvent::RequestToken).unwrap();
        s.apply(SessionEvent::TokenIssued {
            token: "jwt".to_string(),
        })
        .unwrap();
        s.apply(SessionEvent::RegistrationFailed {
            message: "31204".to_string(),
        })
        .unwrap();

        assert_eq!(s.state(), SessionState::Failed(FailureKind::Registration));
        assert!(s.token().is_none());
        assert_eq!(
            s.apply(SessionEvent::Dial(params(false))),
            Err(TransitionError::RegistrationFailed)
        );
    }

    #[test]
    fn call_failure_allows_redial() {
        let mut s = ready_session();
        s.apply(SessionEvent::Dial(params(false))).unwrap();
        s.apply(SessionEvent::Failed {
            message: "31005".to_string(),
        })
        .unwrap();
        assert_eq!(s.state(), SessionState::Failed(FailureKind::Call));
        s.apply(SessionEvent::Dial(params(false))).unwrap();
        assert_eq!(s.state(), SessionState::Dialing);
    }

    #[test]
    fn dial_params_are_fixed_while_dialing() {
        let mut s = ready_session();
        s.apply(SessionEvent::Dial(params(true))).unwrap();
        let err = s.apply(SessionEvent::Dial(params(false))).unwrap_err();
        assert!(matches!(err, TransitionError::Invalid { .. }));
        assert!(s.record());
    }

    #[test]
    fn ticks_only_count_while_connected() {
        let mut s = ready_session();
        s.apply(SessionEvent::Tick).unwrap();
        s.apply(SessionEvent::Dial(params(false))).unwrap();
        s.apply(SessionEvent::Tick).unwrap();
        assert_eq!(s.elapsed_secs(), 0);
        s.apply(SessionEvent::Accepted).unwrap();
        s.apply(SessionEvent::Tick).unwrap();
        assert_eq!(s.elapsed_secs(), 1);
    }

    #[test]
    fn first_call_handle_wins() {
        let mut s = ready_session();
        s.apply(SessionEvent::Dial(params(false))).unwrap();
        s.apply(created("CA1")).unwrap();
        s.apply(created("CA2")).unwrap();
        assert_eq!(s.call_sid(), Some("CA1"));
    }

    #[test]
    fn call_status_mapping() {
        assert_eq!(
            SessionEvent::from_call_status("CA1", "ringing"),
            Some(created("CA1"))
        );
        assert_eq!(
            SessionEvent::from_call_status("CA1", "in-progress"),
            Some(SessionEvent::Accepted)
        );
        assert_eq!(
            SessionEvent::from_call_status("CA1", "completed"),
            Some(SessionEvent::Disconnected)
        );
        assert_eq!(
            SessionEvent::from_call_status("CA1", "busy"),
            Some(SessionEvent::Rejected)
        );
        assert_eq!(
            SessionEvent::from_call_status("CA1", "no-answer"),
            Some(SessionEvent::Cancelled)
        );
        assert!(matches!(
            SessionEvent::from_call_status("CA1", "failed"),
            Some(SessionEvent::Failed { .. })
        ));
        assert_eq!(SessionEvent::from_call_status("CA1", "bogus"), None);
    }

    #[test]
    fn view_reports_failure_kind() {
        let mut s = ready_session();
        s.apply(SessionEvent::Dial(params(false))).unwrap();
        s.apply(SessionEvent::Failed {
            message: "boom".to_string(),
        })
        .unwrap();
        let view = s.view();
        assert_eq!(view.state, "failed");
        assert_eq!(view.failure, Some(FailureKind::Call));
        assert_eq!(view.error.as_deref(), Some("boom"));
    }

    #[test]
    fn call_time_is_zero_padded() {
        assert_eq!(format_call_time(0), "00:00");
        assert_eq!(format_call_time(65), "01:05");
        assert_eq!(format_call_time(3600), "60:00");
    }
}
