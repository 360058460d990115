use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use serde::Deserialize;

use super::leads::UserQuery;
use super::{account_client, ApiError};
use crate::crm::{self, RecordingFolder, RecordingView};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct RenameRecording {
    #[serde(default)]
    pub name: String,
}

/// GET /api/recordings?userId=: newest first, with display labels.
pub async fn handle_list(
    State(state): State<AppState>,
    Query(query): Query<UserQuery>,
) -> Result<Json<Vec<RecordingView>>, ApiError> {
    if query.user_id.is_empty() {
        return Err(ApiError::BadRequest("userId is required".to_string()));
    }
    let now = Utc::now();
    let rows = state.store.recordings(&query.user_id).await?;
    Ok(Json(
        rows.into_iter()
            .map(|r| RecordingView::new(r, now))
            .collect(),
    ))
}

/// GET /api/recordings/folders?userId=: recordings grouped by campaign.
pub async fn handle_folders(
    State(state): State<AppState>,
    Query(query): Query<UserQuery>,
) -> Result<Json<Vec<RecordingFolder>>, ApiError> {
    if query.user_id.is_empty() {
        return Err(ApiError::BadRequest("userId is required".to_string()));
    }
    let recordings = state.store.recordings(&query.user_id).await?;
    let campaigns = state.store.campaigns(&query.user_id).await?;
    Ok(Json(crm::recording_folders(
        recordings,
        &campaigns,
        Utc::now(),
    )))
}

/// PATCH /api/recordings/{id}: rename; only the display name is editable.
pub async fn handle_rename(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<RenameRecording>,
) -> Result<Json<RecordingView>, ApiError> {
    let name = req.name.trim();
    if name.is_empty() {
        return Err(ApiError::BadRequest("Name cannot be empty".to_string()));
    }
    let row = state.store.rename_recording(&id, name).await?;
    tracing::info!(recording_id = %id, "Recording renamed");
    Ok(Json(RecordingView::new(row, Utc::now())))
}

pub async fn handle_delete(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.store.delete_recording(&id).await?;
    tracing::info!(recording_id = %id, "Recording deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/recordings/{id}/audio: stream the MP3 with the owner's account.
pub async fn handle_audio(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let row = state
        .store
        .recording(&id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Recording {id} not found")))?;
    if row.recording_sid.is_empty() {
        return Err(ApiError::BadRequest("Missing recording SID".to_string()));
    }

    let client = account_client(&state, Some(&row.user_id)).await?;
    let audio = client.fetch_recording_mp3(&row.recording_sid).await?;
    tracing::debug!(
        recording_id = %id,
        account_sid = client.account_sid(),
        bytes = audio.len(),
        "Recording fetched"
    );

    Ok(([(header::CONTENT_TYPE, "audio/mpeg")], audio).into_response())
}
