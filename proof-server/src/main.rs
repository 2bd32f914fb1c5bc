//! # Organization Report Proof Server
//!
//! Compiles signed identity credentials into inputs for the email-domain
//! circuit, proves them with Groth16 and submits reports bound to the
//! proof to the on-chain registry.
//!
//! ## Usage
//!
//! ```bash
//! # Development mode (mock proofs)
//! DEV_MODE=true cargo run
//!
//! # Local snarkjs proving against a node
//! ORG_PROOF_CHAIN__RPC_URL=http://localhost:8545 \
//! ORG_PROOF_CHAIN__REGISTRY_ADDRESS=0x... cargo run
//!
//! # Remote prover
//! ORG_PROOF_PROVER__BACKEND=remote ORG_PROOF_PROVER__REMOTE_URL=http://prover/prove cargo run
//! ```
//!
//! ## API Endpoints
//!
//! - `GET /health` - Health check
//! - `GET /status` - Detailed server status
//! - `POST /api/v1/inputs` - Compile circuit inputs from a credential
//! - `POST /api/v1/proof/generate` - Generate a proof
//! - `POST /api/v1/proof/format` - Format a proof as verifier call arguments
//! - `POST /api/v1/proof/verify` - Check a proof against the verifier contract
//! - `POST /api/v1/reports` - Prove and submit a report
//! - `GET /api/v1/reports` - List reports
//! - `GET /api/v1/reports/:id` - Get a single report

use axum::http::{header, HeaderValue, Method};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use org_proof_server::config::Config;
use org_proof_server::routes::create_routes;
use org_proof_server::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = Config::load()?;

    // Initialize logging
    init_logging(&config);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        dev_mode = config.prover.dev_mode,
        backend = ?config.prover.effective_backend(),
        chain_configured = config.chain.is_configured(),
        "Starting organization report proof server"
    );

    if config.prover.dev_mode {
        info!("Running in DEVELOPMENT mode - proofs are MOCKED");
    }

    // Create application state
    let state = AppState::from_config(&config)?;

    // Build CORS layer
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .allow_origin(allowed_origins(&config.server.cors_origins));

    // Build router
    let app = create_routes(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    // Start server
    let addr = config.socket_addr()?;
    info!(%addr, "Server listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn allowed_origins(origins: &[String]) -> AllowOrigin {
    if origins.iter().any(|o| o == "*") {
        return Any.into();
    }
    let parsed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %o, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    AllowOrigin::list(parsed)
}

/// Initialize logging based on configuration
fn init_logging(config: &Config) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.server.log_level));

    if config.server.json_logs {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_level(true)
                    .with_ansi(true),
            )
            .init();
    }
}
