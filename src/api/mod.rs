pub mod calls;
pub mod credentials;
pub mod leads;
pub mod recordings;
pub mod sessions;
pub mod token;

use axum::extract::{Request, State};
use axum::http::{HeaderMap, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::registry::RegistryError;
use crate::store::StoreError;
use crate::twilio::rest::{AccountAuth, TwilioClient, TwilioError};
use crate::twilio::token::TokenError;
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Errors returned by the dashboard API, rendered as `{"error": "..."}`.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    NotFound(String),
    #[error(transparent)]
    Token(#[from] TokenError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Twilio(#[from] TwilioError),
    #[error(transparent)]
    Session(#[from] RegistryError),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Token(TokenError::Signing(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Token(_) => StatusCode::BAD_REQUEST,
            ApiError::Store(StoreError::NotFound(_)) => StatusCode::NOT_FOUND,
            ApiError::Store(_) | ApiError::Twilio(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Session(RegistryError::Transition(_)) => StatusCode::CONFLICT,
            ApiError::Session(_) => StatusCode::NOT_FOUND,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("API request failed: {self}");
        } else {
            tracing::warn!("API request rejected: {self}");
        }
        (
            status,
            Json(ErrorResponse {
                error: self.to_string(),
            }),
        )
            .into_response()
    }
}

/// Reject `/api/*` requests that do not carry `Authorization: Bearer <token>`
/// matching the configured `api.token`.
pub async fn require_token(
    State(state): State<AppState>,
    headers: HeaderMap,
    request: Request,
    next: Next,
) -> Response {
    match check_auth(&headers, &state.config.api.token) {
        Ok(()) => next.run(request).await,
        Err(resp) => resp,
    }
}

#[allow(clippy::result_large_err)]
fn check_auth(headers: &HeaderMap, expected_token: &str) -> Result<(), Response> {
    if expected_token.is_empty() {
        tracing::warn!("API token not configured, rejecting request");
        return Err((
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ErrorResponse {
                error: "API token not configured".to_string(),
            }),
        )
            .into_response());
    }

    let provided = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    match provided {
        Some(token) if token == expected_token => Ok(()),
        _ => {
            tracing::warn!("Unauthorized API request");
            Err((
                StatusCode::UNAUTHORIZED,
                Json(ErrorResponse {
                    error: "Invalid or missing bearer token".to_string(),
                }),
            )
                .into_response())
        }
    }
}

/// REST client for the account that owns a request: the user's stored
/// credentials when present, else the configured `[twilio]` account.
pub async fn account_client(
    state: &AppState,
    user_id: Option<&str>,
) -> Result<TwilioClient, ApiError> {
    if let Some(user_id) = user_id.filter(|u| !u.is_empty()) {
        if let Some(credentials) = state.store.credentials(user_id).await? {
            return Ok(TwilioClient::new(
                state.http.clone(),
                AccountAuth {
                    account_sid: credentials.account_sid,
                    auth_token: credentials.auth_token,
                },
            ));
        }
    }

    let twilio = &state.config.twilio;
    if !twilio.is_configured() {
        return Err(TokenError::CredentialsNotFound.into());
    }
    Ok(TwilioClient::new(
        state.http.clone(),
        AccountAuth {
            account_sid: twilio.account_sid.clone(),
            auth_token: twilio.auth_token.clone(),
        },
    ))
}
