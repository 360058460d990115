use axum::extract::rejection::{FormRejection, QueryRejection};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Form;
use chrono::Utc;
use serde::Deserialize;

use super::twiml::{self, RecordingContext};
use crate::registry::RegistryError;
use crate::session::SessionEvent;
use crate::store::{CrmStore, NewRecording, StoreError};
use crate::AppState;

/// Parameters Twilio forwards from the calling client's `connect()` call.
#[derive(Debug, Default, Deserialize)]
pub struct VoiceParams {
    #[serde(rename = "To", default)]
    pub to: String,
    #[serde(rename = "UserId", default)]
    pub user_id: String,
    #[serde(rename = "Record", default)]
    pub record: String,
    #[serde(rename = "LeadId", default)]
    pub lead_id: String,
    #[serde(rename = "CampaignId", default)]
    pub campaign_id: String,
    #[serde(rename = "LeadName", default)]
    pub lead_name: String,
    #[serde(rename = "callerId", default)]
    pub caller_id: String,
}

#[derive(Debug, thiserror::Error)]
pub enum WebhookError {
    #[error("Missing To parameter")]
    MissingTo,
    #[error("No forwarding number configured")]
    NoForwardNumber,
    #[error("Invalid request: {0}")]
    BadRequest(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Handle POST /twilio/voice: TwiML app webhook for calls placed by the
/// browser client.
///
/// Answers with a plain bridge or, when `Record=true`, a bridge that records
/// from answer and reports to /twilio/recording-status. Errors are spoken to
/// the caller instead of failing the request.
pub async fn handle_voice(
    State(state): State<AppState>,
    form: Result<Form<VoiceParams>, FormRejection>,
) -> Response {
    let result = match form {
        Ok(Form(params)) => {
            tracing::info!(
                to = %params.to,
                user_id = %params.user_id,
                record = %params.record,
                lead_id = %params.lead_id,
                "Voice webhook received"
            );
            bridge(&state, &params).await
        }
        Err(e) => Err(WebhookError::BadRequest(e.body_text())),
    };

    match result {
        Ok(doc) => xml(doc),
        Err(e) => {
            tracing::error!("Voice webhook failed: {e}");
            xml(twiml::say(&format!("An error occurred. {e}")))
        }
    }
}

async fn bridge(state: &AppState, params: &VoiceParams) -> Result<String, WebhookError> {
    if params.to.is_empty() {
        return Err(WebhookError::MissingTo);
    }

    let caller_id = select_caller_id(
        state.store.as_ref(),
        &state.config.dialer.fallback_caller_id,
        &params.user_id,
        &params.caller_id,
    )
    .await?;

    if params.record != "true" {
        return Ok(twiml::plain_bridge(&caller_id, &params.to));
    }

    let lead_name = if params.lead_name.is_empty() {
        "Unknown"
    } else {
        &params.lead_name
    };
    let callback = twiml::recording_callback_url(
        &format!(
            "{}/twilio/recording-status",
            state.config.server.external_url.trim_end_matches('/')
        ),
        &RecordingContext {
            user_id: &params.user_id,
            lead_id: &params.lead_id,
            campaign_id: &params.campaign_id,
            lead_name,
            phone: &params.to,
        },
    );
    tracing::info!(callback = %callback, "Recording enabled");

    Ok(twiml::recorded_bridge(&caller_id, &params.to, &callback))
}

/// Pick the caller-id line for a user's outbound call.
///
/// The requested line wins if the user owns it; otherwise the user's default
/// line, then the number on the credential record, then `fallback`.
pub async fn select_caller_id(
    store: &dyn CrmStore,
    fallback: &str,
    user_id: &str,
    requested: &str,
) -> Result<String, StoreError> {
    if user_id.is_empty() {
        return Ok(fallback.to_string());
    }

    let mut lines: Vec<String> = store
        .phone_numbers(user_id)
        .await?
        .into_iter()
        .map(|n| n.phone_number)
        .collect();
    if let Some(credentials) = store.credentials(user_id).await? {
        if !credentials.phone_number.is_empty() {
            lines.push(credentials.phone_number);
        }
    }

    if !requested.is_empty() && lines.iter().any(|l| l == requested) {
        return Ok(requested.to_string());
    }

    Ok(lines
        .into_iter()
        .next()
        .unwrap_or_else(|| fallback.to_string()))
}

#[derive(Debug, Default, Deserialize)]
pub struct IncomingParams {
    #[serde(rename = "To", default)]
    pub to: String,
    #[serde(rename = "From", default)]
    pub from: String,
}

/// Handle POST /twilio/incoming: forward inbound calls on a user's line to
/// their forwarding number.
pub async fn handle_incoming(
    State(state): State<AppState>,
    form: Result<Form<IncomingParams>, FormRejection>,
) -> Response {
    let result = match form {
        Ok(Form(params)) => {
            tracing::info!(to = %params.to, from = %params.from, "Incoming call, forwarding");
            forward(&state, &params).await
        }
        Err(e) => Err(WebhookError::BadRequest(e.body_text())),
    };

    match result {
        Ok(doc) => xml(doc),
        Err(e) => {
            tracing::error!("Incoming call forwarding failed: {e}");
            xml(twiml::say("Sorry, unable to forward your call."))
        }
    }
}

async fn forward(state: &AppState, params: &IncomingParams) -> Result<String, WebhookError> {
    let credentials = if params.to.is_empty() {
        None
    } else {
        state.store.credentials_by_phone(&params.to).await?
    };

    let caller_id = credentials
        .as_ref()
        .map(|c| c.phone_number.clone())
        .filter(|n| !n.is_empty())
        .or_else(|| Some(state.config.twilio.phone_number.clone()).filter(|n| !n.is_empty()))
        .unwrap_or_else(|| state.config.dialer.fallback_caller_id.clone());

    let forward_to = credentials
        .and_then(|c| c.forward_to_number)
        .filter(|n| !n.is_empty())
        .or_else(|| state.config.dialer.fallback_forward_to.clone())
        .ok_or(WebhookError::NoForwardNumber)?;

    Ok(twiml::plain_bridge(&caller_id, &forward_to))
}

/// Query string we attach to the recording-status callback URL.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordingQuery {
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub lead_id: String,
    #[serde(default)]
    pub campaign_id: String,
    #[serde(default)]
    pub lead_name: String,
    #[serde(default)]
    pub phone: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct RecordingStatusForm {
    #[serde(rename = "RecordingUrl", default)]
    pub recording_url: String,
    #[serde(rename = "RecordingSid", default)]
    pub recording_sid: String,
    #[serde(rename = "RecordingDuration", default)]
    pub recording_duration: String,
    #[serde(rename = "RecordingStatus", default)]
    pub recording_status: String,
}

/// Handle GET /twilio/recording-status: liveness probe for the callback.
pub async fn handle_recording_probe() -> &'static str {
    "Recording status webhook is active"
}

/// Handle POST /twilio/recording-status: persist a completed recording.
///
/// Always answers 200 so Twilio does not retry; storage failures are logged.
pub async fn handle_recording_status(
    State(state): State<AppState>,
    query: Result<Query<RecordingQuery>, QueryRejection>,
    form: Result<Form<RecordingStatusForm>, FormRejection>,
) -> impl IntoResponse {
    let (Query(query), Form(form)) = match (query, form) {
        (Ok(query), Ok(form)) => (query, form),
        (Err(e), _) => {
            tracing::warn!("Malformed recording callback query: {}", e.body_text());
            return (StatusCode::OK, "OK");
        }
        (_, Err(e)) => {
            tracing::warn!("Malformed recording callback: {}", e.body_text());
            return (StatusCode::OK, "OK");
        }
    };

    tracing::info!(
        status = %form.recording_status,
        recording_sid = %form.recording_sid,
        user_id = %query.user_id,
        "Recording status"
    );

    if form.recording_status == "completed" && !query.user_id.is_empty() {
        let recording = NewRecording {
            user_id: query.user_id,
            lead_id: non_empty(query.lead_id),
            campaign_id: non_empty(query.campaign_id),
            lead_name: non_empty(query.lead_name).unwrap_or_else(|| "Unknown".to_string()),
            phone_number: non_empty(query.phone).unwrap_or_else(|| "Unknown".to_string()),
            recording_url: form.recording_url,
            recording_sid: form.recording_sid,
            duration: form.recording_duration.trim().parse().unwrap_or(0),
            call_date: Utc::now(),
        };

        match state.store.insert_recording(recording).await {
            Ok(row) => tracing::info!(recording_id = %row.id, "Recording saved"),
            Err(e) => tracing::error!("Failed to save recording: {e}"),
        }
    }

    (StatusCode::OK, "OK")
}

#[derive(Debug, Default, Deserialize)]
pub struct CallStatusForm {
    #[serde(rename = "CallSid", default)]
    pub call_sid: String,
    #[serde(rename = "CallStatus", default)]
    pub call_status: String,
    #[serde(rename = "CallDuration", default)]
    pub call_duration: Option<String>,
}

/// Handle POST /twilio/status: call progress for calls we placed or that
/// a session has bound. Feeds the owning session's state machine.
pub async fn handle_call_status(
    State(state): State<AppState>,
    form: Result<Form<CallStatusForm>, FormRejection>,
) -> StatusCode {
    let form = match form {
        Ok(Form(form)) => form,
        Err(e) => {
            tracing::warn!("Malformed call status callback: {}", e.body_text());
            return StatusCode::OK;
        }
    };

    tracing::info!(
        call_sid = %form.call_sid,
        status = %form.call_status,
        duration = form.call_duration.as_deref().unwrap_or(""),
        "Call status update"
    );

    let Some(event) = SessionEvent::from_call_status(&form.call_sid, &form.call_status) else {
        return StatusCode::OK;
    };

    match state.sessions.apply_by_call_sid(&form.call_sid, event).await {
        Ok(applied) => state.account_dial(applied.dial_attempt).await,
        Err(RegistryError::UnknownCall(_)) => {
            tracing::debug!(call_sid = %form.call_sid, "No session bound to call");
        }
        Err(e) => tracing::warn!(call_sid = %form.call_sid, "Ignoring call status: {e}"),
    }

    StatusCode::OK
}

fn non_empty(s: String) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s)
    }
}

fn xml(body: String) -> Response {
    ([("Content-Type", "text/xml")], body).into_response()
}
