pub mod memory;
pub mod supabase;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use memory::MemoryStore;
pub use supabase::SupabaseStore;

/// Per-user Twilio account settings (`twilio_credentials`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Credentials {
    pub user_id: String,
    pub account_sid: String,
    pub auth_token: String,
    /// Default outbound line.
    pub phone_number: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub api_secret: Option<String>,
    #[serde(default)]
    pub twiml_app_sid: Option<String>,
    /// Where inbound calls to `phone_number` are forwarded.
    #[serde(default)]
    pub forward_to_number: Option<String>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

/// An outbound line a user may present as caller id (`twilio_phone_numbers`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhoneNumber {
    pub id: String,
    pub user_id: String,
    pub phone_number: String,
    #[serde(default)]
    pub friendly_name: Option<String>,
    #[serde(default)]
    pub is_default: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Campaign {
    pub id: String,
    pub user_id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lead {
    pub id: String,
    pub campaign_id: String,
    pub name: String,
    pub phone: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub summary: Option<String>,
}

/// Partial lead update; `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LeadPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

/// One counted outbound attempt (`dial_attempts`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DialRecord {
    pub user_id: String,
    pub lead_id: Option<String>,
    pub campaign_id: Option<String>,
    pub phone_number: String,
    pub call_sid: String,
    pub dialed_at: DateTime<Utc>,
}

/// A stored call recording (`call_recordings`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recording {
    pub id: String,
    pub user_id: String,
    pub lead_id: Option<String>,
    pub campaign_id: Option<String>,
    /// Display name; the only field editable after creation.
    pub lead_name: String,
    pub phone_number: String,
    pub recording_url: String,
    pub recording_sid: String,
    pub duration: i64,
    pub call_date: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewRecording {
    pub user_id: String,
    pub lead_id: Option<String>,
    pub campaign_id: Option<String>,
    pub lead_name: String,
    pub phone_number: String,
    pub recording_url: String,
    pub recording_sid: String,
    pub duration: i64,
    pub call_date: DateTime<Utc>,
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Datastore request failed: {0}")]
    Request(String),
    #[error("Datastore error: {0}")]
    Api(String),
    #[error("Failed to decode datastore response: {0}")]
    Decode(String),
    #[error("{0} not found")]
    NotFound(String),
}

/// CRM persistence.
#[async_trait]
pub trait CrmStore: Send + Sync {
    async fn credentials(&self, user_id: &str) -> Result<Option<Credentials>, StoreError>;

    /// Credentials whose default line is `phone_number`.
    async fn credentials_by_phone(
        &self,
        phone_number: &str,
    ) -> Result<Option<Credentials>, StoreError>;

    async fn upsert_credentials(&self, credentials: Credentials) -> Result<(), StoreError>;

    /// Outbound lines, default first, then oldest first.
    async fn phone_numbers(&self, user_id: &str) -> Result<Vec<PhoneNumber>, StoreError>;

    async fn campaigns(&self, user_id: &str) -> Result<Vec<Campaign>, StoreError>;

    /// Leads of a campaign, in storage order.
    async fn leads(&self, campaign_id: &str) -> Result<Vec<Lead>, StoreError>;

    async fn update_lead(&self, lead_id: &str, patch: LeadPatch) -> Result<Lead, StoreError>;

    async fn record_dial(&self, dial: DialRecord) -> Result<(), StoreError>;

    async fn insert_recording(&self, recording: NewRecording) -> Result<Recording, StoreError>;

    /// Recordings of a user, newest call first.
    async fn recordings(&self, user_id: &str) -> Result<Vec<Recording>, StoreError>;

    async fn recording(&self, id: &str) -> Result<Option<Recording>, StoreError>;

    async fn rename_recording(&self, id: &str, lead_name: &str) -> Result<Recording, StoreError>;

    async fn delete_recording(&self, id: &str) -> Result<(), StoreError>;

    async fn script(&self, user_id: &str) -> Result<Option<String>, StoreError>;

    async fn save_script(&self, user_id: &str, content: &str) -> Result<(), StoreError>;
}
