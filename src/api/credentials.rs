use axum::extract::{Path, State};
use axum::Json;

use super::ApiError;
use crate::crm::{self, CredentialsForm};
use crate::store::{Credentials, PhoneNumber};
use crate::AppState;

/// GET /api/credentials/{user_id}: stored settings with secrets masked.
pub async fn handle_get(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<Credentials>, ApiError> {
    let credentials = state
        .store
        .credentials(&user_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("No credentials for user {user_id}")))?;
    Ok(Json(crm::masked(&credentials)))
}

/// PUT /api/credentials/{user_id}
pub async fn handle_put(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Json(form): Json<CredentialsForm>,
) -> Result<Json<Credentials>, ApiError> {
    let submitted = form
        .into_credentials(&user_id)
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;
    let stored = state.store.credentials(&user_id).await?;
    let credentials = crm::unmask(submitted, stored.as_ref());

    state.store.upsert_credentials(credentials.clone()).await?;
    tracing::info!(user_id = %user_id, phone = %credentials.phone_number, "Credentials saved");

    Ok(Json(crm::masked(&credentials)))
}

/// GET /api/phone-numbers/{user_id}: outbound lines, default first.
pub async fn handle_phone_numbers(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<Vec<PhoneNumber>>, ApiError> {
    Ok(Json(state.store.phone_numbers(&user_id).await?))
}
