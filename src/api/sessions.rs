use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::token::issue_token;
use super::ApiError;
use crate::registry::RegistryError;
use crate::session::{CallSession, DialParams, SessionEvent, SessionView};
use crate::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSession {
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub identity: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CreatedSession {
    pub session: SessionView,
    pub token: String,
}

/// Transport events the calling client reports for its session.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientEvent {
    Registered,
    RegistrationFailed {
        #[serde(default)]
        message: String,
    },
    Dial(DialParams),
    CallCreated {
        #[serde(rename = "callSid")]
        call_sid: String,
    },
    Accepted,
    Disconnected,
    Rejected,
    Cancelled,
    Failed {
        #[serde(default)]
        message: String,
    },
}

impl From<ClientEvent> for SessionEvent {
    fn from(event: ClientEvent) -> Self {
        match event {
            ClientEvent::Registered => SessionEvent::Registered,
            ClientEvent::RegistrationFailed { message } => {
                SessionEvent::RegistrationFailed { message }
            }
            ClientEvent::Dial(params) => SessionEvent::Dial(params),
            ClientEvent::CallCreated { call_sid } => SessionEvent::CallCreated { call_sid },
            ClientEvent::Accepted => SessionEvent::Accepted,
            ClientEvent::Disconnected => SessionEvent::Disconnected,
            ClientEvent::Rejected => SessionEvent::Rejected,
            ClientEvent::Cancelled => SessionEvent::Cancelled,
            ClientEvent::Failed { message } => SessionEvent::Failed { message },
        }
    }
}

/// POST /api/sessions: start a calling session.
///
/// The token is minted before the session exists; if that fails nothing is
/// registered and the client gets the reason.
pub async fn handle_create(
    State(state): State<AppState>,
    Json(req): Json<CreateSession>,
) -> Result<(StatusCode, Json<CreatedSession>), ApiError> {
    let identity = req
        .identity
        .filter(|i| !i.is_empty())
        .unwrap_or_else(|| format!("user_{}", Utc::now().timestamp_millis()));

    let minted = issue_token(&state, &req.user_id, &identity).await?;

    let mut session = CallSession::new(req.user_id, identity);
    session
        .apply(SessionEvent::RequestToken)
        .map_err(RegistryError::from)?;
    session
        .apply(SessionEvent::TokenIssued {
            token: minted.token.clone(),
        })
        .map_err(RegistryError::from)?;

    let view = state.sessions.insert(session).await;
    Ok((
        StatusCode::CREATED,
        Json(CreatedSession {
            session: view,
            token: minted.token,
        }),
    ))
}

pub async fn handle_get(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionView>, ApiError> {
    state
        .sessions
        .get(id)
        .await
        .map(Json)
        .ok_or(RegistryError::UnknownSession(id).into())
}

/// POST /api/sessions/{id}/events: feed a client transport event.
pub async fn handle_event(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(event): Json<ClientEvent>,
) -> Result<Json<SessionView>, ApiError> {
    let applied = state.sessions.apply(id, event.into()).await?;
    state.account_dial(applied.dial_attempt).await;
    Ok(Json(applied.view))
}

pub async fn handle_delete(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    if state.sessions.remove(id).await {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(RegistryError::UnknownSession(id).into())
    }
}
