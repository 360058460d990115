mod ansi;
mod prompts;
mod writer;

use std::io::IsTerminal;

use rand::Rng;

use crate::config;
use crate::crm::is_e164;
use writer::SetupValues;

/// Entry point for `horizon-dialer --setup`.
pub fn run() {
    if !std::io::stdin().is_terminal() {
        eprintln!("Error: --setup requires an interactive terminal");
        std::process::exit(1);
    }

    println!();
    println!("  {}", ansi::bold("horizon-dialer setup"));
    println!("  {}", ansi::dim("Interactive configuration wizard"));

    let mut values = SetupValues::default();

    // Supabase
    println!("\n  {} Supabase (CRM datastore)", ansi::bold(">>"));
    match prompts::ask_optional("Project URL") {
        Some(url) => {
            values.supabase_url = url;
            values.supabase_service_key = prompts::ask_secret("Service role key");
        }
        None => println!(
            "  {} No project, the in-memory store will be used",
            ansi::yellow("!")
        ),
    }

    // Twilio
    println!("\n  {} Fallback Twilio account", ansi::bold(">>"));
    println!(
        "  {}",
        ansi::dim("Used for REST calls when a user has no stored credentials")
    );
    if prompts::confirm("Configure a fallback account?") {
        values.twilio_account_sid = prompts::ask_secret("Account SID");
        values.twilio_auth_token = prompts::ask_secret("Auth Token");
        values.twilio_phone_number = ask_e164("Phone Number (E.164)");
    }

    // Dialer
    println!("\n  {} Inbound forwarding", ansi::bold(">>"));
    values.fallback_forward_to = loop {
        match prompts::ask_optional("Fallback forward-to number (E.164)") {
            Some(n) if !is_e164(&n) => {
                println!("  {} Invalid E.164 format (expected: +<digits>)", ansi::red("!"));
            }
            other => break other,
        }
    };

    // Server
    println!("\n  {} Server", ansi::bold(">>"));
    values.external_url = prompts::ask("External URL", None);

    values.api_token = generate_hex_token(32);
    println!("\n  {} Generated HORIZON_API_TOKEN", ansi::green("\u{2713}"));

    let config_dir = config::config_dir();
    if let Err(e) = writer::write_config(&config_dir, &values) {
        eprintln!("  {} Failed to write configuration: {e}", ansi::red("\u{2717}"));
        std::process::exit(1);
    }

    // Optional system installation
    println!("\n  {} System installation (optional)", ansi::bold(">>"));
    if prompts::confirm("Copy binary to /usr/local/bin/?") {
        writer::install_binary();
    }
    if prompts::confirm("Install systemd service?") {
        writer::install_systemd();
    }

    let external_url = values.external_url.trim_end_matches('/');
    println!("\n  {} Setup complete!", ansi::green("\u{2713}"));
    println!();
    println!("  Next steps:");
    println!("    1. Review {}", config_dir.join("config.toml").display());
    println!("    2. Run: horizon-dialer");
    println!("    3. Point the TwiML app voice URL at {external_url}/twilio/voice");
    println!("    4. Point inbound numbers at {external_url}/twilio/incoming");
    println!();
}

fn ask_e164(label: &str) -> String {
    loop {
        let num = prompts::ask(label, None);
        if is_e164(&num) {
            return num;
        }
        println!("  {} Invalid E.164 format (expected: +<digits>)", ansi::red("!"));
    }
}

/// Generate a hex token of `byte_len` random bytes (output is 2x byte_len chars).
fn generate_hex_token(byte_len: usize) -> String {
    let mut rng = rand::thread_rng();
    let bytes: Vec<u8> = (0..byte_len).map(|_| rng.gen()).collect();
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}
