use async_trait::async_trait;
use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::json;

use super::{
    Campaign, CrmStore, Credentials, DialRecord, Lead, LeadPatch, NewRecording, PhoneNumber,
    Recording, StoreError,
};
use crate::config::SupabaseConfig;

/// Supabase datastore, spoken to through its PostgREST endpoint with the
/// service-role key.
pub struct SupabaseStore {
    client: reqwest::Client,
    rest_url: String,
    service_key: String,
}

impl SupabaseStore {
    pub fn new(config: &SupabaseConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            rest_url: format!("{}/rest/v1", config.url.trim_end_matches('/')),
            service_key: config.service_key.clone(),
        }
    }

    fn request(&self, method: reqwest::Method, table: &str) -> reqwest::RequestBuilder {
        self.client
            .request(method, format!("{}/{table}", self.rest_url))
            .header("apikey", &self.service_key)
            .bearer_auth(&self.service_key)
    }

    async fn rows<T: DeserializeOwned>(
        &self,
        builder: reqwest::RequestBuilder,
    ) -> Result<Vec<T>, StoreError> {
        let resp = builder
            .send()
            .await
            .map_err(|e| StoreError::Request(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(StoreError::Api(format!("{status}: {body}")));
        }

        resp.json()
            .await
            .map_err(|e| StoreError::Decode(e.to_string()))
    }

    async fn select<T: DeserializeOwned>(
        &self,
        table: &str,
        query: &[(&str, String)],
    ) -> Result<Vec<T>, StoreError> {
        let builder = self
            .request(reqwest::Method::GET, table)
            .query(&[("select", "*")])
            .query(query);
        self.rows(builder).await
    }

    async fn first<T: DeserializeOwned>(
        &self,
        table: &str,
        query: &[(&str, String)],
    ) -> Result<Option<T>, StoreError> {
        let mut query = query.to_vec();
        query.push(("limit", "1".to_string()));
        Ok(self.select(table, &query).await?.into_iter().next())
    }

    async fn insert<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        table: &str,
        body: &B,
        on_conflict: Option<&str>,
    ) -> Result<Vec<T>, StoreError> {
        let mut builder = self
            .request(reqwest::Method::POST, table)
            .json(body);
        builder = match on_conflict {
            Some(column) => builder
                .query(&[("on_conflict", column)])
                .header("Prefer", "return=representation,resolution=merge-duplicates"),
            None => builder.header("Prefer", "return=representation"),
        };
        self.rows(builder).await
    }

    async fn update<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        table: &str,
        id: &str,
        body: &B,
    ) -> Result<T, StoreError> {
        let builder = self
            .request(reqwest::Method::PATCH, table)
            .query(&[("id", format!("eq.{id}"))])
            .header("Prefer", "return=representation")
            .json(body);
        self.rows(builder)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| StoreError::NotFound(format!("{table} row {id}")))
    }
}

fn eq(value: &str) -> String {
    format!("eq.{value}")
}

#[async_trait]
impl CrmStore for SupabaseStore {
    async fn credentials(&self, user_id: &str) -> Result<Option<Credentials>, StoreError> {
        self.first("twilio_credentials", &[("user_id", eq(user_id))])
            .await
    }

    async fn credentials_by_phone(
        &self,
        phone_number: &str,
    ) -> Result<Option<Credentials>, StoreError> {
        self.first("twilio_credentials", &[("phone_number", eq(phone_number))])
            .await
    }

    async fn upsert_credentials(&self, mut credentials: Credentials) -> Result<(), StoreError> {
        credentials.updated_at = Some(Utc::now());
        let _: Vec<serde_json::Value> = self
            .insert("twilio_credentials", &credentials, Some("user_id"))
            .await?;
        Ok(())
    }

    async fn phone_numbers(&self, user_id: &str) -> Result<Vec<PhoneNumber>, StoreError> {
        self.select(
            "twilio_phone_numbers",
            &[
                ("user_id", eq(user_id)),
                ("order", "is_default.desc,created_at.asc".to_string()),
            ],
        )
        .await
    }

    async fn campaigns(&self, user_id: &str) -> Result<Vec<Campaign>, StoreError> {
        self.select("campaigns", &[("user_id", eq(user_id))]).await
    }

    async fn leads(&self, campaign_id: &str) -> Result<Vec<Lead>, StoreError> {
        self.select("leads", &[("campaign_id", eq(campaign_id))])
            .await
    }

    async fn update_lead(&self, lead_id: &str, patch: LeadPatch) -> Result<Lead, StoreError> {
        self.update("leads", lead_id, &patch).await
    }

    async fn record_dial(&self, dial: DialRecord) -> Result<(), StoreError> {
        let _: Vec<serde_json::Value> = self.insert("dial_attempts", &dial, None).await?;
        Ok(())
    }

    async fn insert_recording(&self, recording: NewRecording) -> Result<Recording, StoreError> {
        self.insert("call_recordings", &recording, None)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| StoreError::Decode("insert returned no row".to_string()))
    }

    async fn recordings(&self, user_id: &str) -> Result<Vec<Recording>, StoreError> {
        self.select(
            "call_recordings",
            &[
                ("user_id", eq(user_id)),
                ("order", "call_date.desc".to_string()),
            ],
        )
        .await
    }

    async fn recording(&self, id: &str) -> Result<Option<Recording>, StoreError> {
        self.first("call_recordings", &[("id", eq(id))]).await
    }

    async fn rename_recording(&self, id: &str, lead_name: &str) -> Result<Recording, StoreError> {
        self.update("call_recordings", id, &json!({ "lead_name": lead_name }))
            .await
    }

    async fn delete_recording(&self, id: &str) -> Result<(), StoreError> {
        let builder = self
            .request(reqwest::Method::DELETE, "call_recordings")
            .query(&[("id", eq(id))])
            .header("Prefer", "return=representation");
        let deleted: Vec<serde_json::Value> = self.rows(builder).await?;
        if deleted.is_empty() {
            return Err(StoreError::NotFound(format!("Recording {id}")));
        }
        Ok(())
    }

    async fn script(&self, user_id: &str) -> Result<Option<String>, StoreError> {
        let row: Option<serde_json::Value> = self
            .first("user_scripts", &[("user_id", eq(user_id))])
            .await?;
        Ok(row.and_then(|r| r["script_content"].as_str().map(String::from)))
    }

    async fn save_script(&self, user_id: &str, content: &str) -> Result<(), StoreError> {
        let body = json!({
            "user_id": user_id,
            "script_content": content,
            "updated_at": Utc::now(),
        });
        let _: Vec<serde_json::Value> = self
            .insert("user_scripts", &body, Some("user_id"))
            .await?;
        Ok(())
    }
}
