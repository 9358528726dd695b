//! LLM backend adapters behind one contract.
//!
//! Each adapter owns the HTTP shape and response envelope of one provider and
//! hands the extracted model text to the shared parser, so every backend yields
//! the same `AssessmentResult` shape.
//!
//! Self-hosted backends (vLLM, Ollama, LM Studio) are cancelled after
//! `LOCAL_TIMEOUT` and report refused connections as "not running".

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::{BackendKind, BackendsConfig};
use crate::domain::AssessmentResult;
use crate::error::{AssessError, BackendError};

pub mod ollama;
pub mod openai_compat;

pub use ollama::OllamaBackend;
pub use openai_compat::ChatBackend;

/// Client-side cancellation for self-hosted inference.
pub const LOCAL_TIMEOUT: Duration = Duration::from_secs(2 * 60);

/// Upper bound for the hosted API.
pub const CLOUD_TIMEOUT: Duration = Duration::from_secs(60);

/// What a backend is, for logs and the health endpoint. Never carries secrets.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct BackendDescription {
  pub label: &'static str,
  pub endpoint: String,
  pub model: String,
}

#[async_trait]
pub trait AssessmentBackend: Send + Sync {
  fn describe(&self) -> BackendDescription;

  /// Run one inference call and parse its output. Fails with `Backend` or `Parse`.
  async fn assess(&self, prompt: &str) -> Result<AssessmentResult, AssessError>;
}

/// Resolve the configured backend. Total: every kind maps to an adapter.
pub fn select(kind: BackendKind, cfg: &BackendsConfig, client: reqwest::Client) -> Arc<dyn AssessmentBackend> {
  match kind {
    BackendKind::Together => Arc::new(ChatBackend::together(&cfg.together, client)),
    BackendKind::Vllm => Arc::new(ChatBackend::vllm(&cfg.vllm, client)),
    BackendKind::LmStudio => Arc::new(ChatBackend::lmstudio(&cfg.lmstudio, client)),
    BackendKind::Ollama => Arc::new(OllamaBackend::new(&cfg.ollama, client)),
  }
}

/// Map a transport failure. Connection refusals only get the "is it running"
/// wording for self-hosted backends.
pub(crate) fn transport_error(backend: &'static str, base_url: &str, local: bool, e: reqwest::Error) -> BackendError {
  if local && e.is_connect() {
    BackendError::Unreachable { backend, base_url: base_url.to_string() }
  } else if e.is_timeout() {
    BackendError::Timeout { backend, after: if local { LOCAL_TIMEOUT } else { CLOUD_TIMEOUT } }
  } else {
    BackendError::Transport { backend, message: e.to_string() }
  }
}

/// Pass 2xx responses through; turn anything else into an `Http` error carrying the body.
pub(crate) async fn check_status(
  backend: &'static str,
  res: reqwest::Response,
) -> Result<reqwest::Response, BackendError> {
  if res.status().is_success() {
    return Ok(res);
  }
  let status = res.status().as_u16();
  let body = match res.text().await {
    Ok(body) => extract_api_error(&body).unwrap_or(body),
    Err(_) => "Could not read error body".to_string(),
  };
  Err(BackendError::Http { backend, status, body })
}

/// Try to extract a clean message from an OpenAI-style `{"error":{"message":..}}` body.
fn extract_api_error(body: &str) -> Option<String> {
  #[derive(Deserialize)]
  struct EWrap { error: EObj }
  #[derive(Deserialize)]
  struct EObj { message: String }
  serde_json::from_str::<EWrap>(body).ok().map(|w| w.error.message)
}

/// Run `call` under the local cancellation budget when one is set.
pub(crate) async fn with_deadline<F, T>(backend: &'static str, deadline: Option<Duration>, call: F) -> Result<T, BackendError>
where
  F: std::future::Future<Output = Result<T, BackendError>>,
{
  match deadline {
    Some(after) => tokio::time::timeout(after, call)
      .await
      .map_err(|_| BackendError::Timeout { backend, after })?,
    None => call.await,
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::config::BackendsConfig;

  #[test]
  fn selector_maps_every_kind() {
    let cfg = BackendsConfig::default();
    let client = reqwest::Client::new();
    let label = |k| select(k, &cfg, client.clone()).describe().label;
    assert_eq!(label(BackendKind::Together), "Together.ai");
    assert_eq!(label(BackendKind::Vllm), "vLLM");
    assert_eq!(label(BackendKind::Ollama), "Ollama");
    assert_eq!(label(BackendKind::LmStudio), "LM Studio");
    assert_eq!(label(BackendKind::from_name("mystery")), "Together.ai");
  }

  #[test]
  fn descriptions_carry_endpoint_and_model_only() {
    let mut cfg = BackendsConfig::default();
    cfg.together.api_key = Some("sk-secret".into());
    let d = select(BackendKind::Together, &cfg, reqwest::Client::new()).describe();
    assert_eq!(d.endpoint, "https://api.together.xyz");
    assert_eq!(d.model, "meta-llama/Llama-3.3-70B-Instruct-Turbo");
    assert!(!serde_json::to_string(&d).expect("ser").contains("sk-secret"));
  }

  #[test]
  fn api_error_bodies_are_unwrapped() {
    assert_eq!(extract_api_error(r#"{"error":{"message":"bad key"}}"#), Some("bad key".into()));
    assert_eq!(extract_api_error("plain text"), None);
  }

  #[tokio::test]
  async fn deadline_cancels_slow_calls() {
    let slow = async {
      tokio::time::sleep(Duration::from_secs(5)).await;
      Ok::<_, BackendError>(())
    };
    let err = with_deadline("vLLM", Some(Duration::from_millis(20)), slow).await.expect_err("timeout");
    assert!(matches!(err, BackendError::Timeout { backend: "vLLM", .. }));
    let fast = async { Ok::<_, BackendError>(7) };
    assert_eq!(with_deadline("vLLM", None, fast).await.expect("ok"), 7);
  }
}
