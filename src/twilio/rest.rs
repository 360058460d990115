use bytes::Bytes;
use serde::{Deserialize, Serialize};

const API_BASE: &str = "https://api.twilio.com/2010-04-01";

/// Account credentials for Twilio's REST API.
#[derive(Debug, Clone)]
pub struct AccountAuth {
    pub account_sid: String,
    pub auth_token: String,
}

/// Twilio REST API client bound to one account.
pub struct TwilioClient {
    client: reqwest::Client,
    auth: AccountAuth,
    base_url: String,
}

/// Parameters for placing a call through the REST API.
#[derive(Debug, Clone)]
pub struct NewCall<'a> {
    pub to: &'a str,
    pub from: &'a str,
    /// TwiML document URL Twilio fetches once the call connects.
    pub url: &'a str,
    pub status_callback: &'a str,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallInfo {
    pub sid: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub duration: Option<String>,
    #[serde(default)]
    pub from: Option<String>,
    #[serde(default)]
    pub to: Option<String>,
    #[serde(default)]
    pub start_time: Option<String>,
    #[serde(default)]
    pub end_time: Option<String>,
}

impl TwilioClient {
    pub fn new(client: reqwest::Client, auth: AccountAuth) -> Self {
        Self {
            client,
            auth,
            base_url: API_BASE.to_string(),
        }
    }

    pub fn account_sid(&self) -> &str {
        &self.auth.account_sid
    }

    fn account_url(&self, path: &str) -> String {
        format!(
            "{}/Accounts/{}/{path}",
            self.base_url, self.auth.account_sid
        )
    }

    /// Initiate an outbound call. Twilio reports progress to
    /// `status_callback` for every lifecycle event.
    pub async fn create_call(&self, call: &NewCall<'_>) -> Result<CallInfo, TwilioError> {
        let params = [
            ("To", call.to),
            ("From", call.from),
            ("Url", call.url),
            ("StatusCallback", call.status_callback),
            ("StatusCallbackMethod", "POST"),
            ("StatusCallbackEvent", "initiated"),
            ("StatusCallbackEvent", "ringing"),
            ("StatusCallbackEvent", "answered"),
            ("StatusCallbackEvent", "completed"),
        ];

        let resp = self
            .client
            .post(self.account_url("Calls.json"))
            .basic_auth(&self.auth.account_sid, Some(&self.auth.auth_token))
            .form(&params)
            .send()
            .await
            .map_err(|e| TwilioError::Request(e.to_string()))?;

        let info: CallInfo = parse_json(resp).await?;
        tracing::info!(to = call.to, call_sid = %info.sid, status = %info.status, "Outbound call initiated");
        Ok(info)
    }

    /// End a call by moving it to `completed`.
    pub async fn hangup(&self, call_sid: &str) -> Result<CallInfo, TwilioError> {
        let resp = self
            .client
            .post(self.account_url(&format!("Calls/{call_sid}.json")))
            .basic_auth(&self.auth.account_sid, Some(&self.auth.auth_token))
            .form(&[("Status", "completed")])
            .send()
            .await
            .map_err(|e| TwilioError::Request(e.to_string()))?;

        let info: CallInfo = parse_json(resp).await?;
        tracing::info!(call_sid = %info.sid, status = %info.status, "Call ended");
        Ok(info)
    }

    pub async fn fetch_call(&self, call_sid: &str) -> Result<CallInfo, TwilioError> {
        let resp = self
            .client
            .get(self.account_url(&format!("Calls/{call_sid}.json")))
            .basic_auth(&self.auth.account_sid, Some(&self.auth.auth_token))
            .send()
            .await
            .map_err(|e| TwilioError::Request(e.to_string()))?;

        parse_json(resp).await
    }

    /// Download a recording as MP3.
    pub async fn fetch_recording_mp3(&self, recording_sid: &str) -> Result<Bytes, TwilioError> {
        let resp = self
            .client
            .get(self.account_url(&format!("Recordings/{recording_sid}.mp3")))
            .basic_auth(&self.auth.account_sid, Some(&self.auth.auth_token))
            .send()
            .await
            .map_err(|e| TwilioError::Request(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(TwilioError::Api(format!(
                "Failed to fetch recording: {}",
                resp.status()
            )));
        }

        resp.bytes()
            .await
            .map_err(|e| TwilioError::Request(e.to_string()))
    }
}

async fn parse_json<T: serde::de::DeserializeOwned>(
    resp: reqwest::Response,
) -> Result<T, TwilioError> {
    let status = resp.status();
    let body = resp
        .text()
        .await
        .map_err(|e| TwilioError::Request(e.to_string()))?;

    if !status.is_success() {
        return Err(TwilioError::Api(api_message(status, &body)));
    }

    serde_json::from_str(&body).map_err(|e| TwilioError::Parse(e.to_string()))
}

/// Prefer Twilio's own `message` field over the raw body.
fn api_message(status: reqwest::StatusCode, body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v["message"].as_str().map(String::from))
        .unwrap_or_else(|| format!("{status}: {body}"))
}

#[derive(Debug, thiserror::Error)]
pub enum TwilioError {
    #[error("HTTP request failed: {0}")]
    Request(String),
    #[error("Twilio API error: {0}")]
    Api(String),
    #[error("Failed to parse Twilio response: {0}")]
    Parse(String),
}
