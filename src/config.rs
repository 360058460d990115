use serde::Deserialize;
use std::path::PathBuf;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    #[serde(default)]
    pub supabase: SupabaseConfig,
    #[serde(default)]
    pub twilio: TwilioConfig,
    #[serde(default)]
    pub dialer: DialerConfig,
    #[serde(default)]
    pub api: ApiConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub external_url: String,
}

/// Supabase project used as the CRM datastore. An empty `url` selects the
/// in-memory store.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct SupabaseConfig {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub service_key: String,
}

/// Account used for REST operations when the request carries no user whose
/// stored credentials can be resolved.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct TwilioConfig {
    #[serde(default)]
    pub account_sid: String,
    #[serde(default)]
    pub auth_token: String,
    #[serde(default)]
    pub phone_number: String,
}

impl TwilioConfig {
    pub fn is_configured(&self) -> bool {
        !self.account_sid.is_empty() && !self.auth_token.is_empty()
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct DialerConfig {
    #[serde(default = "default_fallback_caller_id")]
    pub fallback_caller_id: String,
    #[serde(default)]
    pub fallback_forward_to: Option<String>,
    #[serde(default = "default_token_ttl")]
    pub token_ttl_secs: u64,
    /// Sessions with no call in flight are dropped after this long without
    /// an event.
    #[serde(default = "default_session_idle")]
    pub session_idle_secs: u64,
}

impl Default for DialerConfig {
    fn default() -> Self {
        Self {
            fallback_caller_id: default_fallback_caller_id(),
            fallback_forward_to: None,
            token_ttl_secs: default_token_ttl(),
            session_idle_secs: default_session_idle(),
        }
    }
}

fn default_fallback_caller_id() -> String {
    "+18881234567".to_string()
}

fn default_token_ttl() -> u64 {
    3600
}

fn default_session_idle() -> u64 {
    3600
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct ApiConfig {
    /// Bearer token required for /api/* endpoints. If empty, all requests are rejected.
    #[serde(default)]
    pub token: String,
}

impl Config {
    pub fn load() -> Result<Self, Box<dyn std::error::Error>> {
        // Load .env file from same directory as config.toml
        let env_path = config_dir().join(".env");
        match dotenvy::from_path(&env_path) {
            Ok(()) => tracing::info!("Loaded .env from {}", env_path.display()),
            Err(dotenvy::Error::Io(_)) => {
                tracing::debug!(
                    "No .env file at {}, using environment only",
                    env_path.display()
                );
            }
            Err(e) => tracing::warn!("Failed to parse .env: {e}"),
        }

        let path = config_path();
        tracing::info!("Loading config from {}", path.display());

        let contents = std::fs::read_to_string(&path).map_err(|e| {
            format!(
                "Failed to read config at {}: {}. Run `horizon-dialer --setup` to create it",
                path.display(),
                e,
            )
        })?;

        let mut config = Self::parse(&contents)?;
        config.apply_env_overrides();
        Ok(config)
    }

    pub fn parse(contents: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(contents)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("TWILIO_ACCOUNT_SID") {
            self.twilio.account_sid = v;
        }
        if let Ok(v) = std::env::var("TWILIO_AUTH_TOKEN") {
            self.twilio.auth_token = v;
        }
        if let Ok(v) = std::env::var("TWILIO_PHONE_NUMBER") {
            self.twilio.phone_number = v;
        }
        if let Ok(v) = std::env::var("SUPABASE_URL") {
            self.supabase.url = v;
        }
        if let Ok(v) = std::env::var("SUPABASE_SERVICE_ROLE_KEY") {
            self.supabase.service_key = v;
        }
        if let Ok(v) = std::env::var("HORIZON_API_TOKEN") {
            self.api.token = v;
        }
        if let Ok(v) = std::env::var("SERVER_EXTERNAL_URL") {
            self.server.external_url = v;
        }
    }
}

pub fn config_dir() -> PathBuf {
    if let Ok(p) = std::env::var("HORIZON_DIALER_CONFIG") {
        // If pointing to a file, use its parent directory
        let path = PathBuf::from(p);
        return path.parent().map(|p| p.to_path_buf()).unwrap_or(path);
    }

    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    PathBuf::from(home).join(".horizon-dialer")
}

fn config_path() -> PathBuf {
    if let Ok(p) = std::env::var("HORIZON_DIALER_CONFIG") {
        return PathBuf::from(p);
    }

    config_dir().join("config.toml")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_config_uses_defaults() {
        let config = Config::parse(
            r#"
[server]
host = "0.0.0.0"
port = 8443
external_url = "https://dialer.example.com"
"#,
        )
        .unwrap();

        assert_eq!(config.dialer.fallback_caller_id, "+18881234567");
        assert_eq!(config.dialer.token_ttl_secs, 3600);
        assert_eq!(config.dialer.session_idle_secs, 3600);
        assert!(config.dialer.fallback_forward_to.is_none());
        assert!(config.supabase.url.is_empty());
        assert!(!config.twilio.is_configured());
        assert!(config.api.token.is_empty());
    }

    #[test]
    fn full_config_parses() {
        let config = Config::parse(
            r#"
[server]
host = "127.0.0.1"
port = 9000
external_url = "https://dialer.example.com"

[supabase]
url = "https://abc.supabase.co"
service_key = "service"

[twilio]
account_sid = "AC123"
auth_token = "secret"
phone_number = "+15550001111"

[dialer]
fallback_caller_id = "+15550002222"
fallback_forward_to = "+15550003333"
token_ttl_secs = 600
session_idle_secs = 900

[api]
token = "t0ken"
"#,
        )
        .unwrap();

        assert_eq!(config.server.port, 9000);
        assert_eq!(config.supabase.url, "https://abc.supabase.co");
        assert!(config.twilio.is_configured());
        assert_eq!(config.dialer.session_idle_secs, 900);
        assert_eq!(config.dialer.token_ttl_secs, 600);
        assert_eq!(
            config.dialer.fallback_forward_to.as_deref(),
            Some("+15550003333")
        );
        assert_eq!(config.api.token, "t0ken");
    }

    #[test]
    fn missing_server_section_is_an_error() {
        assert!(Config::parse("[api]\ntoken = \"x\"\n").is_err());
    }
}
