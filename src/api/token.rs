use axum::extract::State;
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};

use super::ApiError;
use crate::twilio::token::{self, CapabilityToken, SigningKey, TokenError};
use crate::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenRequest {
    #[serde(default)]
    pub identity: String,
    #[serde(default)]
    pub user_id: String,
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub token: String,
    pub identity: String,
}

/// POST /api/token: mint a Voice capability token for the calling client.
pub async fn handle_token(
    State(state): State<AppState>,
    Json(req): Json<TokenRequest>,
) -> Result<Json<TokenResponse>, ApiError> {
    let minted = issue_token(&state, &req.user_id, &req.identity).await?;
    Ok(Json(TokenResponse {
        token: minted.token,
        identity: minted.identity,
    }))
}

/// Mint a token for `identity` with the key material stored for `user_id`.
pub async fn issue_token(
    state: &AppState,
    user_id: &str,
    identity: &str,
) -> Result<CapabilityToken, ApiError> {
    if user_id.is_empty() || identity.is_empty() {
        return Err(TokenError::MissingIdentity.into());
    }

    let credentials = state
        .store
        .credentials(user_id)
        .await?
        .ok_or(TokenError::CredentialsNotFound)?;
    let key = SigningKey::from_credentials(&credentials)?;

    let minted = token::mint(
        &key,
        identity,
        Utc::now().timestamp(),
        state.config.dialer.token_ttl_secs,
    )?;
    tracing::info!(user_id, identity, expires_at = minted.expires_at, "Token issued");
    Ok(minted)
}

#[cfg(test)]
mod tests {
    use crate::api::test_support::{api_request, body_json, test_state};
    use crate::store::{CrmStore, Credentials};
    use axum::http::StatusCode;
    use serde_json::json;
    use tower::ServiceExt;

    fn credentials(complete: bool) -> Credentials {
        Credentials {
            user_id: "user-1".to_string(),
            account_sid: "AC1".to_string(),
            auth_token: "auth".to_string(),
            phone_number: "+15559990000".to_string(),
            api_key: Some("SK1".to_string()),
            api_secret: Some("shh".to_string()),
            twiml_app_sid: complete.then(|| "AP1".to_string()),
            forward_to_number: None,
            updated_at: None,
        }
    }

    #[tokio::test]
    async fn issues_token_for_configured_user() {
        let (state, store) = test_state();
        store.upsert_credentials(credentials(true)).await.unwrap();

        let resp = crate::router(state)
            .oneshot(api_request(
                "POST",
                "/api/token",
                Some(json!({ "identity": "user_1", "userId": "user-1" })),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = body_json(resp).await;
        assert_eq!(body["identity"], "user_1");
        assert_eq!(body["token"].as_str().unwrap().split('.').count(), 3);
    }

    #[tokio::test]
    async fn missing_fields_are_rejected() {
        let (state, _) = test_state();
        let resp = crate::router(state)
            .oneshot(api_request("POST", "/api/token", Some(json!({ "identity": "x" }))))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(resp).await["error"], "Identity and userId are required");
    }

    #[tokio::test]
    async fn unknown_user_has_no_credentials() {
        let (state, _) = test_state();
        let resp = crate::router(state)
            .oneshot(api_request(
                "POST",
                "/api/token",
                Some(json!({ "identity": "x", "userId": "ghost" })),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            body_json(resp).await["error"],
            "Twilio credentials not found. Please configure them in Automations."
        );
    }

    #[tokio::test]
    async fn incomplete_credentials_are_explained() {
        let (state, store) = test_state();
        store.upsert_credentials(credentials(false)).await.unwrap();
        let resp = crate::router(state)
            .oneshot(api_request(
                "POST",
                "/api/token",
                Some(json!({ "identity": "x", "userId": "user-1" })),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            body_json(resp).await["error"],
            "Missing API credentials. Please add API Key and TwiML App SID in Automations."
        );
    }
}
