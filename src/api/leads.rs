use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use super::ApiError;
use crate::crm;
use crate::store::{Campaign, Lead, LeadPatch};
use crate::AppState;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserQuery {
    #[serde(default)]
    pub user_id: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateLead {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Disposition {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub summary: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DispositionResponse {
    pub lead: Lead,
    /// Lead to load next in the dialer, absent at the end of the campaign.
    pub next_lead_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Script {
    #[serde(default)]
    pub content: String,
}

/// GET /api/campaigns?userId=
pub async fn handle_campaigns(
    State(state): State<AppState>,
    Query(query): Query<UserQuery>,
) -> Result<Json<Vec<Campaign>>, ApiError> {
    if query.user_id.is_empty() {
        return Err(ApiError::BadRequest("userId is required".to_string()));
    }
    Ok(Json(state.store.campaigns(&query.user_id).await?))
}

/// GET /api/campaigns/{id}/leads: leads in dialing order.
pub async fn handle_leads(
    State(state): State<AppState>,
    Path(campaign_id): Path<String>,
) -> Result<Json<Vec<Lead>>, ApiError> {
    let mut leads = state.store.leads(&campaign_id).await?;
    crm::sort_leads(&mut leads);
    Ok(Json(leads))
}

/// PATCH /api/leads/{id}: inline edit of name and email.
pub async fn handle_update(
    State(state): State<AppState>,
    Path(lead_id): Path<String>,
    Json(req): Json<UpdateLead>,
) -> Result<Json<Lead>, ApiError> {
    let name = match req.name {
        Some(name) if name.trim().is_empty() => {
            return Err(ApiError::BadRequest("Name cannot be empty".to_string()));
        }
        Some(name) => Some(name.trim().to_string()),
        None => None,
    };

    let patch = LeadPatch {
        name,
        email: req.email.map(|e| e.trim().to_string()),
        ..Default::default()
    };
    Ok(Json(state.store.update_lead(&lead_id, patch).await?))
}

/// POST /api/leads/{id}/disposition: save the outcome and point at the
/// next lead of the campaign.
pub async fn handle_disposition(
    State(state): State<AppState>,
    Path(lead_id): Path<String>,
    Json(req): Json<Disposition>,
) -> Result<Json<DispositionResponse>, ApiError> {
    if !crm::is_valid_disposition(&req.status) {
        return Err(ApiError::BadRequest(
            "Please select a disposition".to_string(),
        ));
    }

    let lead = state
        .store
        .update_lead(
            &lead_id,
            LeadPatch {
                status: Some(req.status.trim().to_string()),
                summary: Some(req.summary),
                ..Default::default()
            },
        )
        .await?;

    let mut leads = state.store.leads(&lead.campaign_id).await?;
    crm::sort_leads(&mut leads);
    let next_lead_id = crm::next_lead(&leads, &lead.id).map(|l| l.id.clone());

    tracing::info!(
        lead_id = %lead.id,
        status = %lead.status,
        next = next_lead_id.as_deref().unwrap_or("none"),
        "Disposition saved"
    );

    Ok(Json(DispositionResponse { lead, next_lead_id }))
}

/// GET /api/scripts/{user_id}: empty content when none was saved.
pub async fn handle_get_script(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<Script>, ApiError> {
    let content = state.store.script(&user_id).await?.unwrap_or_default();
    Ok(Json(Script { content }))
}

pub async fn handle_put_script(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Json(script): Json<Script>,
) -> Result<Json<Script>, ApiError> {
    state.store.save_script(&user_id, &script.content).await?;
    Ok(Json(script))
}
