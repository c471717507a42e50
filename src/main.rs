//! SPIN discovery-question trainer backend
//!
//! - Axum HTTP + WebSocket API around the timed training session engine
//! - Optional OpenAI integration for scenarios and grading (via environment variables)
//! - Static SPA fallback (./static/index.html)
//!
//! Important env variables:
//!   PORT                : u16 (default 3000)
//!   OPENAI_API_KEY      : enables OpenAI integration if present
//!   OPENAI_BASE_URL     : default "https://api.openai.com/v1"
//!   OPENAI_FAST_MODEL   : default "gpt-4o-mini" (grading)
//!   OPENAI_STRONG_MODEL : default "gpt-4o" (scenario generation)
//!   TRAINER_CONFIG_PATH : path to TOML config (prompts, progression, session bounds, scenario bank)
//!   LOG_LEVEL           : tracing filter, e.g. "debug" or full directives
//!   LOG_FORMAT          : "pretty" (default) or "json"

mod telemetry;
mod util;
mod error;
mod domain;
mod config;
mod seeds;
mod engine;
mod oracle;
mod openai;
mod store;
mod state;
mod protocol;
mod logic;
mod routes;

use std::{net::SocketAddr, sync::Arc};
use tokio::net::TcpListener;
use tracing::{info, instrument};

use crate::routes::build_router;
use crate::state::AppState;

#[instrument(level = "info", skip_all)]
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
  telemetry::init_tracing();

  // Shared state: config, in-memory store, oracle, live runs.
  let state = Arc::new(AppState::new());

  let app = build_router(state.clone());

  let addr: SocketAddr = std::env::var("PORT")
    .ok()
    .and_then(|p| p.parse::<u16>().ok())
    .map(|port| SocketAddr::from(([0, 0, 0, 0], port)))
    .unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], 3000)));

  let listener = TcpListener::bind(addr).await?;
  info!(target: "spin_trainer_backend", %addr, oracle = state.oracle.name(), "HTTP server listening");
  axum::serve(listener, app)
    .with_graceful_shutdown(shutdown_signal(state))
    .await?;
  Ok(())
}

/// Wait for Ctrl-C, then stop every running session so no timer outlives the server.
async fn shutdown_signal(state: Arc<AppState>) {
  if let Err(e) = tokio::signal::ctrl_c().await {
    tracing::error!(target: "spin_trainer_backend", error = %e, "Failed to listen for shutdown signal");
    std::future::pending::<()>().await;
  }
  let runs = state.runs.read().await;
  info!(target: "spin_trainer_backend", live_runs = runs.len(), "Shutting down");
  for handle in runs.values() {
    handle.shutdown();
  }
}
