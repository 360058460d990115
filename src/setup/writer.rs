use std::fs;
use std::io;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

use super::ansi;
use super::prompts::confirm;

/// All values collected from the wizard prompts.
#[derive(Debug, Clone, Default)]
pub struct SetupValues {
    pub supabase_url: String,
    pub supabase_service_key: String,
    pub twilio_account_sid: String,
    pub twilio_auth_token: String,
    pub twilio_phone_number: String,
    pub fallback_forward_to: Option<String>,
    pub external_url: String,
    pub api_token: String,
}

/// Write config.toml and .env into `config_dir`, asking before overwriting
/// either file.
pub fn write_config(config_dir: &Path, values: &SetupValues) -> io::Result<()> {
    println!("\n  {} Writing configuration", ansi::bold(">>"));

    fs::create_dir_all(config_dir)?;

    let config_path = config_dir.join("config.toml");
    if should_write(&config_path) {
        fs::write(&config_path, render_config_toml(values))?;
        println!("  {} {}", ansi::green("\u{2713}"), config_path.display());
    }

    let env_path = config_dir.join(".env");
    if should_write(&env_path) {
        write_env_file(&env_path, values)?;
        println!(
            "  {} {} {}",
            ansi::green("\u{2713}"),
            env_path.display(),
            ansi::dim("(mode 0600)")
        );
    }

    Ok(())
}

fn should_write(path: &Path) -> bool {
    if !path.exists() {
        return true;
    }
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    println!("  {} {name} already exists", ansi::yellow("!"));
    let overwrite = confirm("Overwrite?");
    if !overwrite {
        println!("  Skipping {name}");
    }
    overwrite
}

/// Non-secret settings. Secrets stay empty here and come from `.env`.
pub fn render_config_toml(values: &SetupValues) -> String {
    let forward_to = match &values.fallback_forward_to {
        Some(n) => format!("fallback_forward_to = \"{n}\""),
        None => "# fallback_forward_to = \"+15550000000\"".to_string(),
    };

    format!(
        r#"[server]
host = "0.0.0.0"
port = 8443
# Loaded from .env (SERVER_EXTERNAL_URL)
external_url = ""

[supabase]
# Loaded from .env (SUPABASE_URL, SUPABASE_SERVICE_ROLE_KEY).
# Leave empty to run with the in-memory store.
url = ""
service_key = ""

[twilio]
# Fallback account for REST calls made without a user's stored credentials.
# Secrets loaded from .env (TWILIO_ACCOUNT_SID, TWILIO_AUTH_TOKEN)
account_sid = ""
auth_token = ""
phone_number = "{phone}"

[dialer]
fallback_caller_id = "+18881234567"
{forward_to}
token_ttl_secs = 3600
session_idle_secs = 3600

[api]
# Loaded from .env (HORIZON_API_TOKEN)
token = ""
"#,
        phone = values.twilio_phone_number,
    )
}

pub fn render_env(values: &SetupValues) -> String {
    format!(
        r#"# Supabase
SUPABASE_URL={supabase_url}
SUPABASE_SERVICE_ROLE_KEY={supabase_key}

# Fallback Twilio account
TWILIO_ACCOUNT_SID={twilio_sid}
TWILIO_AUTH_TOKEN={twilio_token}

# API bearer token for /api/* endpoints
HORIZON_API_TOKEN={api_token}

# Public URL where Twilio can reach this server
SERVER_EXTERNAL_URL={external_url}
"#,
        supabase_url = values.supabase_url,
        supabase_key = values.supabase_service_key,
        twilio_sid = values.twilio_account_sid,
        twilio_token = values.twilio_auth_token,
        api_token = values.api_token,
        external_url = values.external_url,
    )
}

/// Write `.env` readable by the owner only.
pub fn write_env_file(path: &Path, values: &SetupValues) -> io::Result<()> {
    fs::write(path, render_env(values))?;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600))
}

/// Copy the current binary to /usr/local/bin/horizon-dialer.
pub fn install_binary() {
    let target = Path::new("/usr/local/bin/horizon-dialer");
    let result = std::env::current_exe().and_then(|exe| fs::copy(exe, target));

    match result {
        Ok(_) => {
            fs::set_permissions(target, fs::Permissions::from_mode(0o755)).ok();
            println!(
                "  {} Copied to {}",
                ansi::green("\u{2713}"),
                target.display()
            );
        }
        Err(e) => println!(
            "  {} Failed to copy binary: {e} (try running with sudo)",
            ansi::red("\u{2717}"),
        ),
    }
}

/// Write a systemd service unit to /etc/systemd/system/.
pub fn install_systemd() {
    let unit = r#"[Unit]
Description=horizon-dialer - Twilio dialer backend
After=network.target

[Service]
Type=simple
ExecStart=/usr/local/bin/horizon-dialer
Environment=RUST_LOG=horizon_dialer=info,tower_http=info
Restart=on-failure
RestartSec=5

[Install]
WantedBy=multi-user.target
"#;

    let path = Path::new("/etc/systemd/system/horizon-dialer.service");
    match fs::write(path, unit) {
        Ok(_) => {
            println!("  {} {}", ansi::green("\u{2713}"), path.display());
            println!(
                "  {}",
                ansi::dim("Run: systemctl daemon-reload && systemctl enable --now horizon-dialer")
            );
        }
        Err(e) => println!(
            "  {} Failed to write service: {e} (try running with sudo)",
            ansi::red("\u{2717}"),
        ),
    }
}
