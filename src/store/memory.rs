use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{
    Campaign, CrmStore, Credentials, DialRecord, Lead, LeadPatch, NewRecording, PhoneNumber,
    Recording, StoreError,
};

#[derive(Default)]
struct Tables {
    credentials: HashMap<String, Credentials>,
    phone_numbers: Vec<PhoneNumber>,
    campaigns: Vec<Campaign>,
    leads: Vec<Lead>,
    dials: Vec<DialRecord>,
    recordings: Vec<Recording>,
    scripts: HashMap<String, String>,
}

/// Process-local store. Used when no Supabase project is configured and in tests.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub async fn add_phone_number(&self, number: PhoneNumber) {
        self.tables.lock().await.phone_numbers.push(number);
    }

    #[cfg(test)]
    pub async fn add_campaign(&self, campaign: Campaign) {
        self.tables.lock().await.campaigns.push(campaign);
    }

    #[cfg(test)]
    pub async fn add_lead(&self, lead: Lead) {
        self.tables.lock().await.leads.push(lead);
    }

    #[cfg(test)]
    pub async fn dials(&self) -> Vec<DialRecord> {
        self.tables.lock().await.dials.clone()
    }
}

#[async_trait]
impl CrmStore for MemoryStore {
    async fn credentials(&self, user_id: &str) -> Result<Option<Credentials>, StoreError> {
        Ok(self.tables.lock().await.credentials.get(user_id).cloned())
    }

    async fn credentials_by_phone(
        &self,
        phone_number: &str,
    ) -> Result<Option<Credentials>, StoreError> {
        Ok(self
            .tables
            .lock()
            .await
            .credentials
            .values()
            .find(|c| c.phone_number == phone_number)
            .cloned())
    }

    async fn upsert_credentials(&self, mut credentials: Credentials) -> Result<(), StoreError> {
        credentials.updated_at = Some(Utc::now());
        self.tables
            .lock()
            .await
            .credentials
            .insert(credentials.user_id.clone(), credentials);
        Ok(())
    }

    async fn phone_numbers(&self, user_id: &str) -> Result<Vec<PhoneNumber>, StoreError> {
        let mut numbers: Vec<PhoneNumber> = self
            .tables
            .lock()
            .await
            .phone_numbers
            .iter()
            .filter(|n| n.user_id == user_id)
            .cloned()
            .collect();
        numbers.sort_by(|a, b| {
            b.is_default
                .cmp(&a.is_default)
                .then(a.created_at.cmp(&b.created_at))
        });
        Ok(numbers)
    }

    async fn campaigns(&self, user_id: &str) -> Result<Vec<Campaign>, StoreError> {
        Ok(self
            .tables
            .lock()
            .await
            .campaigns
            .iter()
            .filter(|c| c.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn leads(&self, campaign_id: &str) -> Result<Vec<Lead>, StoreError> {
        Ok(self
            .tables
            .lock()
            .await
            .leads
            .iter()
            .filter(|l| l.campaign_id == campaign_id)
            .cloned()
            .collect())
    }

    async fn update_lead(&self, lead_id: &str, patch: LeadPatch) -> Result<Lead, StoreError> {
        let mut tables = self.tables.lock().await;
        let lead = tables
            .leads
            .iter_mut()
            .find(|l| l.id == lead_id)
            .ok_or_else(|| StoreError::NotFound(format!("Lead {lead_id}")))?;

        if let Some(name) = patch.name {
            lead.name = name;
        }
        if let Some(email) = patch.email {
            lead.email = Some(email);
        }
        if let Some(status) = patch.status {
            lead.status = status;
        }
        if let Some(summary) = patch.summary {
            lead.summary = Some(summary);
        }
        Ok(lead.clone())
    }

    async fn record_dial(&self, dial: DialRecord) -> Result<(), StoreError> {
        self.tables.lock().await.dials.push(dial);
        Ok(())
    }

    async fn insert_recording(&self, recording: NewRecording) -> Result<Recording, StoreError> {
        let row = Recording {
            id: Uuid::new_v4().to_string(),
            user_id: recording.user_id,
            lead_id: recording.lead_id,
            campaign_id: recording.campaign_id,
            lead_name: recording.lead_name,
            phone_number: recording.phone_number,
            recording_url: recording.recording_url,
            recording_sid: recording.recording_sid,
            duration: recording.duration,
            call_date: recording.call_date,
        };
        self.tables.lock().await.recordings.push(row.clone());
        Ok(row)
    }

    async fn recordings(&self, user_id: &str) -> Result<Vec<Recording>, StoreError> {
        let mut rows: Vec<Recording> = self
            .tables
            .lock()
            .await
            .recordings
            .iter()
            .filter(|r| r.user_id == user_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.call_date.cmp(&a.call_date));
        Ok(rows)
    }

    async fn recording(&self, id: &str) -> Result<Option<Recording>, StoreError> {
        Ok(self
            .tables
            .lock()
            .await
            .recordings
            .iter()
            .find(|r| r.id == id)
            .cloned())
    }

    async fn rename_recording(&self, id: &str, lead_name: &str) -> Result<Recording, StoreError> {
        let mut tables = self.tables.lock().await;
        let row = tables
            .recordings
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| StoreError::NotFound(format!("Recording {id}")))?;
        row.lead_name = lead_name.to_string();
        Ok(row.clone())
    }

    async fn delete_recording(&self, id: &str) -> Result<(), StoreError> {
        let mut tables = self.tables.lock().await;
        let before = tables.recordings.len();
        tables.recordings.retain(|r| r.id != id);
        if tables.recordings.len() == before {
            return Err(StoreError::NotFound(format!("Recording {id}")));
        }
        Ok(())
    }

    async fn script(&self, user_id: &str) -> Result<Option<String>, StoreError> {
        Ok(self.tables.lock().await.scripts.get(user_id).cloned())
    }

    async fn save_script(&self, user_id: &str, content: &str) -> Result<(), StoreError> {
        self.tables
            .lock()
            .await
            .scripts
            .insert(user_id.to_string(), content.to_string());
        Ok(())
    }
}
