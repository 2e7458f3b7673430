//! `gavel serve` -- the governance gateway as an HTTP JSON API.
//!
//! Single point of entry for agent proposals: every inbound intent is
//! appended to the ledger before policy evaluation, so the record of what
//! was attempted is complete regardless of outcome. The timeout sweeper
//! runs alongside the server and shares nothing with it but the ledger.
//!
//! Endpoints:
//! - GET  /health       - Service status
//! - POST /propose      - Submit a proposal for policy evaluation
//! - POST /approve      - Human approval for an escalated proposal (Bearer)
//! - POST /deny         - Human denial for an escalated proposal (Bearer)
//! - POST /execute      - Run an approved proposal in the blast box
//! - GET  /escalations  - Escalation summary by derived state
//!
//! All responses use Content-Type: application/json.

mod handlers;
mod middleware;
mod state;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::DefaultBodyLimit;
use axum::http::{Method, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{middleware as axum_middleware, Json, Router};
use tower_http::cors::{Any, CorsLayer};

use gavel_core::config::GovernanceConfig;
use gavel_core::identity::IdentityRegistry;
use gavel_eval::liveness::auto_deny_expired;
use gavel_ledger::{FileLedger, LedgerStore, MemoryLedger};
use gavel_sandbox::BlastBoxConfig;

use self::handlers::{
    handle_approve, handle_deny, handle_escalations, handle_execute, handle_health,
    handle_not_found, handle_propose,
};
use self::middleware::rate_limit_middleware;
use self::state::{AppState, RateLimiter};

/// Maximum request body size: 1 MB.
const MAX_BODY_SIZE: usize = 1024 * 1024;

/// Default rate limit: 60 requests per minute per IP.
const DEFAULT_RATE_LIMIT: u64 = 60;

/// Rate limit window duration in seconds (1 minute).
const RATE_LIMIT_WINDOW_SECS: u64 = 60;

/// Construct a JSON error response with the given status code and message.
fn json_error(status: StatusCode, message: &str) -> impl IntoResponse {
    (status, Json(serde_json::json!({"error": message})))
}

/// Start the gateway on the given port.
///
/// `ledger_path = None` serves from an in-memory ledger; otherwise the
/// append-only JSONL file at that path is opened (and created on first
/// use). When TLS cert/key paths are provided and the `tls` feature is
/// enabled, the server listens over HTTPS via `axum-server` + rustls.
pub async fn start_server(
    port: u16,
    identities_path: PathBuf,
    ledger_path: Option<PathBuf>,
    _tls_cert: Option<PathBuf>,
    _tls_key: Option<PathBuf>,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = GovernanceConfig::from_env();
    let blastbox = BlastBoxConfig::from_env();

    let identities = IdentityRegistry::load(&identities_path)?;
    eprintln!(
        "Loaded {} identities from {}",
        identities.len(),
        identities_path.display()
    );

    let ledger: Arc<dyn LedgerStore> = match &ledger_path {
        Some(path) => {
            let ledger = FileLedger::open(path, config.policy_version.clone())?;
            eprintln!("Ledger file: {}", path.display());
            Arc::new(ledger)
        }
        None => {
            eprintln!("Ledger: in-memory (events are lost on shutdown)");
            Arc::new(MemoryLedger::new(config.policy_version.clone()))
        }
    };

    let rate_limit = std::env::var("GAVEL_RATE_LIMIT")
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(DEFAULT_RATE_LIMIT);
    eprintln!("Rate limit: {} requests per minute per IP", rate_limit);

    let state = Arc::new(AppState {
        ledger: Arc::clone(&ledger),
        identities,
        config: config.clone(),
        blastbox,
        rate_limiter: RateLimiter::new(rate_limit),
    });

    // The sweeper owns nothing but a ledger handle and the timeouts.
    let sweeper_ledger = Arc::clone(&ledger);
    let sweeper_config = config.clone();
    tokio::spawn(async move {
        let mut interval =
            tokio::time::interval(Duration::from_secs(sweeper_config.sweep_interval_seconds.max(1)));
        loop {
            interval.tick().await;
            match auto_deny_expired(sweeper_ledger.as_ref(), &sweeper_config).await {
                Ok(denied) if !denied.is_empty() => {
                    eprintln!("sweeper: auto-denied {} expired escalation(s)", denied.len());
                }
                Ok(_) => {}
                Err(e) => eprintln!("sweeper: sweep failed: {}", e),
            }
        }
    });

    // CORS: permissive for local use; front with a proxy in production.
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any);

    let app = Router::new()
        .route("/health", get(handle_health))
        .route("/propose", post(handle_propose))
        .route("/approve", post(handle_approve))
        .route("/deny", post(handle_deny))
        .route("/execute", post(handle_execute))
        .route("/escalations", get(handle_escalations))
        .fallback(handle_not_found)
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            rate_limit_middleware,
        ))
        .layer(cors)
        .layer(DefaultBodyLimit::max(MAX_BODY_SIZE))
        .with_state(state);

    let addr = format!("0.0.0.0:{}", port);

    #[cfg(feature = "tls")]
    if let (Some(cert_path), Some(key_path)) = (&_tls_cert, &_tls_key) {
        let tls_config =
            axum_server::tls_rustls::RustlsConfig::from_pem_file(cert_path, key_path).await?;
        let socket_addr: std::net::SocketAddr = addr.parse()?;
        eprintln!("Governance gateway listening on https://0.0.0.0:{}", port);
        axum_server::bind_rustls(socket_addr, tls_config)
            .serve(app.into_make_service_with_connect_info::<std::net::SocketAddr>())
            .await?;
        return Ok(());
    }

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    eprintln!("Governance gateway listening on http://0.0.0.0:{}", port);
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    eprintln!("\nServer shut down.");
    Ok(())
}

/// Wait for a shutdown signal (Ctrl+C).
async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("failed to install Ctrl+C handler");
    eprintln!("\nReceived shutdown signal...");
}
