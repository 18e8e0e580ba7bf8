//! Circuit Tutor · exercise backend
//!
//! - Axum HTTP + WebSocket API over per-learner exercise sessions
//! - External circuit generator + SVG rasterizer, both run with a timeout
//! - Static frontend fallback (./static/index.html)
//!
//! Important env variables:
//!   PORT                   : u16 (default 3000)
//!   CIRCUIT_TUTOR_CONFIG   : path to TOML config
//!   GENERATOR_PATH         : generator executable (default "./circuit_generator")
//!   RASTERIZER_PATH        : SVG → PNG converter (default "rsvg-convert", empty disables)
//!   EXTERNAL_TIMEOUT_MS    : budget per external call (default 5000)
//!   ARTIFACT_ROOT          : root of per-session working directories
//!   LOG_LEVEL              : tracing filter, e.g. "debug" or full directives
//!   LOG_FORMAT             : "pretty" (default) or "json"

use std::{net::SocketAddr, sync::Arc};
use tokio::net::TcpListener;
use tracing::info;

use circuit_tutor::config::AppConfig;
use circuit_tutor::routes::build_router;
use circuit_tutor::state::AppState;
use circuit_tutor::telemetry;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
  telemetry::init_tracing();

  let config = AppConfig::from_env();
  let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));

  // Shared state: config, generator client, session registry.
  let state = Arc::new(AppState::new(config));

  let app = build_router(state.clone());

  let listener = TcpListener::bind(addr).await?;
  info!(target: "circuit_tutor", %addr, "HTTP server listening");
  axum::serve(listener, app)
    .with_graceful_shutdown(async {
      let _ = tokio::signal::ctrl_c().await;
      info!(target: "circuit_tutor", "Shutdown requested");
    })
    .await?;
  Ok(())
}
