use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{account_client, ApiError};
use crate::crm;
use crate::registry::RegistryError;
use crate::session::{SessionEvent, TransitionError};
use crate::twilio::rest::{CallInfo, NewCall};
use crate::twilio::webhook::select_caller_id;
use crate::AppState;

/// TwiML Twilio plays when a REST call is placed without its own document.
const DEFAULT_CALL_URL: &str = "http://demo.twilio.com/docs/voice.xml";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaceCall {
    #[serde(default)]
    pub to: String,
    #[serde(default)]
    pub from: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub session_id: Option<Uuid>,
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CallResponse {
    pub success: bool,
    pub call_sid: String,
    pub status: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserQuery {
    #[serde(default)]
    pub user_id: Option<String>,
}

/// POST /api/calls: place a call through the REST API.
///
/// Progress is reported to /twilio/status. With `sessionId`, the new call is
/// bound to that session so the status callback drives its state.
pub async fn handle_place(
    State(state): State<AppState>,
    Json(req): Json<PlaceCall>,
) -> Result<Json<CallResponse>, ApiError> {
    let to = req.to.trim();
    if to.is_empty() {
        return Err(ApiError::BadRequest("Phone number is required".to_string()));
    }
    if !crm::is_e164(to) {
        return Err(ApiError::BadRequest(format!("Invalid phone number: {to}")));
    }
    if let Some(id) = req.session_id {
        match state.sessions.state(id).await {
            None => return Err(RegistryError::UnknownSession(id).into()),
            Some(current) if !current.accepts_call() => {
                return Err(RegistryError::Transition(TransitionError::Invalid {
                    state: current.as_str(),
                    event: "call_created",
                })
                .into());
            }
            Some(_) => {}
        }
    }

    let user_id = req.user_id.as_deref().unwrap_or("");
    let requested = req.from.as_deref().unwrap_or("");
    let from = if user_id.is_empty() {
        Some(requested)
            .filter(|f| !f.is_empty())
            .or(Some(state.config.twilio.phone_number.as_str()).filter(|f| !f.is_empty()))
            .unwrap_or(state.config.dialer.fallback_caller_id.as_str())
            .to_string()
    } else {
        select_caller_id(
            state.store.as_ref(),
            &state.config.dialer.fallback_caller_id,
            user_id,
            requested,
        )
        .await?
    };

    let client = account_client(&state, req.user_id.as_deref()).await?;
    let status_callback = format!(
        "{}/twilio/status",
        state.config.server.external_url.trim_end_matches('/')
    );
    let info = client
        .create_call(&NewCall {
            to,
            from: &from,
            url: req.url.as_deref().unwrap_or(DEFAULT_CALL_URL),
            status_callback: &status_callback,
        })
        .await?;

    if let Some(id) = req.session_id {
        let event = SessionEvent::CallCreated {
            call_sid: info.sid.clone(),
        };
        match state.sessions.apply(id, event).await {
            Ok(applied) => state.account_dial(applied.dial_attempt).await,
            Err(e) => tracing::warn!(session_id = %id, call_sid = %info.sid, "Call not bound to session: {e}"),
        }
    }

    Ok(Json(CallResponse {
        success: true,
        call_sid: info.sid,
        status: info.status,
    }))
}

/// GET /api/calls/{sid}
pub async fn handle_fetch(
    State(state): State<AppState>,
    Path(sid): Path<String>,
    Query(query): Query<UserQuery>,
) -> Result<Json<CallInfo>, ApiError> {
    let client = account_client(&state, query.user_id.as_deref()).await?;
    Ok(Json(client.fetch_call(&sid).await?))
}

/// POST /api/calls/{sid}/hangup
pub async fn handle_hangup(
    State(state): State<AppState>,
    Path(sid): Path<String>,
    Query(query): Query<UserQuery>,
) -> Result<Json<CallResponse>, ApiError> {
    if sid.trim().is_empty() {
        return Err(ApiError::BadRequest("Call SID is required".to_string()));
    }
    let client = account_client(&state, query.user_id.as_deref()).await?;
    let info = client.hangup(&sid).await?;
    Ok(Json(CallResponse {
        success: true,
        call_sid: info.sid,
        status: info.status,
    }))
}

#[cfg(test)]
mod tests {
    use crate::api::test_support::{api_request, body_json, test_state};
    use crate::session::{CallSession, SessionEvent};
    use axum::http::StatusCode;
    use serde_json::json;
    use tower::ServiceExt;

    #[tokio::test]
    async fn destination_is_required() {
        let (state, _) = test_state();
        let resp = crate::router(state)
            .oneshot(api_request("POST", "/api/calls", Some(json!({ "userId": "u1" }))))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(resp).await["error"], "Phone number is required");
    }

    #[tokio::test]
    async fn destination_must_be_e164() {
        let (state, _) = test_state();
        let resp = crate::router(state)
            .oneshot(api_request("POST", "/api/calls", Some(json!({ "to": "555-0100" }))))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn unknown_session_is_rejected_before_dialing() {
        let (state, _) = test_state();
        let resp = crate::router(state)
            .oneshot(api_request(
                "POST",
                "/api/calls",
                Some(json!({
                    "to": "+15550100200",
                    "sessionId": "6f9619ff-8b86-d011-b42d-00cf4fc964ff"
                })),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn no_account_means_no_call() {
        let (state, _) = test_state();
        let resp = crate::router(state)
            .oneshot(api_request("POST", "/api/calls", Some(json!({ "to": "+15550100200" }))))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            body_json(resp).await["error"],
            "Twilio credentials not found. Please configure them in Automations."
        );
    }

    #[tokio::test]
    async fn hangup_without_account_is_rejected() {
        let (state, _) = test_state();
        let resp = crate::router(state)
            .oneshot(api_request("POST", "/api/calls/CA1/hangup?userId=ghost", None))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn session_without_a_dial_cannot_place_a_call() {
        let (state, _) = test_state();
        let mut session = CallSession::new("user-1", "agent");
        session.apply(SessionEvent::RequestToken).unwrap();
        session
            .apply(SessionEvent::TokenIssued {
                token: "jwt".to_string(),
            })
            .unwrap();
        session.apply(SessionEvent::Registered).unwrap();
        let id = state.sessions.insert(session).await.id;

        let resp = crate::router(state)
            .oneshot(api_request(
                "POST",
                "/api/calls",
                Some(json!({ "to": "+15550100200", "sessionId": id })),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::CONFLICT);
        assert_eq!(
            body_json(resp).await["error"],
            "cannot apply 'call_created' while session is ready"
        );
    }
}
