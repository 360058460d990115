mod api;
mod config;
mod crm;
mod format;
pub mod registry;
mod session;
mod setup;
mod store;
mod twilio;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::middleware;
use axum::routing::{get, patch, post};
use axum::Router;
use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use config::Config;
use registry::SessionRegistry;
use session::DialAttempt;
use store::{CrmStore, DialRecord, MemoryStore, SupabaseStore};

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Shared application state accessible from all handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub store: Arc<dyn CrmStore>,
    /// Live calling sessions, keyed by session id and by Twilio call SID.
    pub sessions: SessionRegistry,
    /// Shared HTTP client for Twilio REST calls.
    pub http: reqwest::Client,
}

impl AppState {
    pub fn new(config: Config, store: Arc<dyn CrmStore>) -> Self {
        Self {
            config,
            store,
            sessions: SessionRegistry::new(),
            http: reqwest::Client::new(),
        }
    }

    /// Persist a dial attempt produced by a session transition.
    ///
    /// Failures are logged and swallowed.
    pub async fn account_dial(&self, attempt: Option<DialAttempt>) {
        let Some(attempt) = attempt else {
            return;
        };

        tracing::info!(
            session_id = %attempt.session_id,
            call_sid = %attempt.call_sid,
            attempt = attempt.attempt,
            lead_id = attempt.lead_id.as_deref().unwrap_or("manual"),
            "Dial attempt recorded"
        );

        let record = DialRecord {
            user_id: attempt.user_id,
            lead_id: attempt.lead_id,
            campaign_id: attempt.campaign_id,
            phone_number: attempt.to,
            call_sid: attempt.call_sid,
            dialed_at: Utc::now(),
        };
        if let Err(e) = self.store.record_dial(record).await {
            tracing::error!(session_id = %attempt.session_id, "Failed to record dial: {e}");
        }
    }
}

fn main() {
    let args: Vec<String> = std::env::args().collect();

    match args.get(1).map(|s| s.as_str()) {
        Some("--setup") => setup::run(),
        Some("--version") => println!("horizon-dialer {VERSION}"),
        Some("--help") | Some("-h") => print_usage(),
        Some(other) => {
            eprintln!("Unknown option: {other}");
            print_usage();
            std::process::exit(1);
        }
        None => {
            let rt = tokio::runtime::Runtime::new().expect("Failed to create tokio runtime");
            rt.block_on(server());
        }
    }
}

fn print_usage() {
    println!("horizon-dialer {VERSION}");
    println!("Outbound sales dialer backend for Twilio Voice");
    println!();
    println!("Usage: horizon-dialer [OPTIONS]");
    println!();
    println!("Options:");
    println!("  --setup     Run interactive configuration wizard");
    println!("  --version   Print version");
    println!("  --help, -h  Print this help message");
    println!();
    println!("Without options, starts the dialer server.");
}

/// Build the HTTP router: Twilio webhooks, the dashboard API and health.
pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .route("/token", post(api::token::handle_token))
        .route("/sessions", post(api::sessions::handle_create))
        .route(
            "/sessions/{id}",
            get(api::sessions::handle_get).delete(api::sessions::handle_delete),
        )
        .route("/sessions/{id}/events", post(api::sessions::handle_event))
        .route("/calls", post(api::calls::handle_place))
        .route("/calls/{sid}", get(api::calls::handle_fetch))
        .route("/calls/{sid}/hangup", post(api::calls::handle_hangup))
        .route(
            "/credentials/{user_id}",
            get(api::credentials::handle_get).put(api::credentials::handle_put),
        )
        .route(
            "/phone-numbers/{user_id}",
            get(api::credentials::handle_phone_numbers),
        )
        .route("/campaigns", get(api::leads::handle_campaigns))
        .route("/campaigns/{id}/leads", get(api::leads::handle_leads))
        .route("/leads/{id}", patch(api::leads::handle_update))
        .route("/leads/{id}/disposition", post(api::leads::handle_disposition))
        .route("/recordings", get(api::recordings::handle_list))
        .route("/recordings/folders", get(api::recordings::handle_folders))
        .route(
            "/recordings/{id}",
            patch(api::recordings::handle_rename).delete(api::recordings::handle_delete),
        )
        .route("/recordings/{id}/audio", get(api::recordings::handle_audio))
        .route(
            "/scripts/{user_id}",
            get(api::leads::handle_get_script).put(api::leads::handle_put_script),
        )
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            api::require_token,
        ));

    Router::new()
        // Twilio webhooks
        .route("/twilio/voice", post(twilio::webhook::handle_voice))
        .route("/twilio/incoming", post(twilio::webhook::handle_incoming))
        .route(
            "/twilio/recording-status",
            get(twilio::webhook::handle_recording_probe)
                .post(twilio::webhook::handle_recording_status),
        )
        .route("/twilio/status", post(twilio::webhook::handle_call_status))
        // Dashboard API
        .nest("/api", api)
        // Health check
        .route("/health", get(health))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn server() {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "horizon_dialer=info,tower_http=info".into()),
        )
        .init();

    // Load config
    let config = match Config::load() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config: {e}");
            std::process::exit(1);
        }
    };

    tracing::info!(
        host = %config.server.host,
        port = config.server.port,
        "Starting horizon-dialer"
    );

    let store: Arc<dyn CrmStore> = if config.supabase.url.is_empty() {
        tracing::warn!("No Supabase project configured, using in-memory store");
        Arc::new(MemoryStore::new())
    } else {
        tracing::info!(url = %config.supabase.url, "Using Supabase store");
        Arc::new(SupabaseStore::new(&config.supabase))
    };

    if config.api.token.is_empty() {
        tracing::warn!("API token not configured, /api/* will reject every request");
    }

    let state = AppState::new(config.clone(), store);

    let shutdown = CancellationToken::new();
    let ticker = state.sessions.spawn_ticker(
        Duration::from_secs(config.dialer.session_idle_secs),
        shutdown.clone(),
    );

    let app = router(state);

    // Start server
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .expect("Invalid server address");

    tracing::info!(%addr, "Listening");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind");

    let signal = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for shutdown signal: {e}");
            }
            tracing::info!("Shutting down");
            signal.cancel();
        })
        .await
        .expect("Server error");

    shutdown.cancel();
    let _ = ticker.await;
}

async fn health() -> &'static str {
    "ok"
}
