//! Qalam · Assessment Gateway
//!
//! - Axum HTTP API scoring Quranic-verse translations with an LLM backend
//! - Interchangeable backends: Together.ai (hosted), vLLM, Ollama, LM Studio
//! - Optional feedback cache keyed on verse + normalized translation
//!
//! Important env variables:
//!   PORT                 : u16 (default 3000)
//!   ASSESSMENT_BACKEND   : together (default) | vllm | ollama | lms
//!   TOGETHER_API_KEY     : required when Together.ai is selected
//!   VLLM_BASE_URL / OLLAMA_BASE_URL / LMS_BASE_URL and matching *_MODEL
//!   ASSESSMENT_CACHE_DIR : directory for the durable feedback cache
//!   ASSESSMENT_CACHE     : "memory" for an in-process cache, "off" to disable
//!   VERSE_DATA_DIR       : local static data dir; else VERSE_DATA_URL over HTTP
//!   GATEWAY_CONFIG_PATH  : optional TOML base config (env overrides it)
//!   LOG_LEVEL            : tracing filter, e.g. "debug" or full directives
//!   LOG_FORMAT           : "pretty" (default) or "json"

mod assessment;
mod backends;
mod cache;
mod config;
mod domain;
mod error;
mod parser;
mod prompt;
mod protocol;
mod routes;
mod state;
mod telemetry;
mod util;
mod verses;

use std::{net::SocketAddr, sync::Arc};
use tokio::net::TcpListener;
use tracing::info;

use crate::config::GatewayConfig;
use crate::routes::build_router;
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
  telemetry::init_tracing();

  let cfg = GatewayConfig::load();

  // Data source, cache store and inference backend, resolved once.
  let state = Arc::new(AppState::from_config(&cfg)?);

  let app = build_router(state);

  let addr = SocketAddr::from(([0, 0, 0, 0], cfg.port));
  let listener = TcpListener::bind(addr).await?;
  info!(target: "qalam_gateway", %addr, "HTTP server listening");
  axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;
  info!(target: "qalam_gateway", "Server stopped");
  Ok(())
}

async fn shutdown_signal() {
  let ctrl_c = async {
    if let Err(e) = tokio::signal::ctrl_c().await {
      tracing::error!(target: "qalam_gateway", error = %e, "Failed to listen for Ctrl-C");
      std::future::pending::<()>().await;
    }
  };

  #[cfg(unix)]
  let terminate = async {
    match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
      Ok(mut sig) => {
        sig.recv().await;
      }
      Err(e) => {
        tracing::error!(target: "qalam_gateway", error = %e, "Failed to listen for SIGTERM");
        std::future::pending::<()>().await;
      }
    }
  };
  #[cfg(not(unix))]
  let terminate = std::future::pending::<()>();

  tokio::select! {
    _ = ctrl_c => {},
    _ = terminate => {},
  }
  info!(target: "qalam_gateway", "Shutdown signal received");
}
