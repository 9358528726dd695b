//! Ollama single-prompt completion adapter (`POST /api/generate`, non-streaming).

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::header::{CONTENT_TYPE, USER_AGENT};
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument};

use super::{check_status, transport_error, with_deadline, AssessmentBackend, BackendDescription, LOCAL_TIMEOUT};
use crate::config::LocalBackendConfig;
use crate::domain::AssessmentResult;
use crate::error::{AssessError, BackendError};
use crate::parser::parse_assessment;
use crate::util::join_url;

const LABEL: &str = "Ollama";

#[derive(Clone)]
pub struct OllamaBackend {
  client: reqwest::Client,
  base_url: String,
  model: String,
  deadline: Duration,
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
  model: &'a str,
  prompt: &'a str,
  stream: bool,
}

#[derive(Deserialize)]
struct GenerateResponse {
  #[serde(default)] response: Option<String>,
  #[serde(default)] eval_count: Option<u32>,
}

impl OllamaBackend {
  pub fn new(cfg: &LocalBackendConfig, client: reqwest::Client) -> Self {
    Self { client, base_url: cfg.base_url.clone(), model: cfg.model.clone(), deadline: LOCAL_TIMEOUT }
  }

  #[cfg(test)]
  pub fn with_deadline(mut self, deadline: Duration) -> Self {
    self.deadline = deadline;
    self
  }

  async fn generate(&self, prompt: &str) -> Result<String, BackendError> {
    let url = join_url(&self.base_url, "api/generate");
    let res = self
      .client
      .post(&url)
      .header(USER_AGENT, "qalam-gateway/0.1")
      .header(CONTENT_TYPE, "application/json")
      .json(&GenerateRequest { model: &self.model, prompt, stream: false })
      .send()
      .await
      .map_err(|e| transport_error(LABEL, &self.base_url, true, e))?;
    let res = check_status(LABEL, res).await?;

    let body: GenerateResponse = res.json().await.map_err(|e| transport_error(LABEL, &self.base_url, true, e))?;
    if let Some(n) = body.eval_count {
      info!(target: "backend", eval_count = n, "Model usage");
    }
    body
      .response
      .map(|t| t.trim().to_string())
      .filter(|t| !t.is_empty())
      .ok_or(BackendError::EmptyResponse { backend: LABEL })
  }
}

#[async_trait]
impl AssessmentBackend for OllamaBackend {
  fn describe(&self) -> BackendDescription {
    BackendDescription { label: LABEL, endpoint: self.base_url.clone(), model: self.model.clone() }
  }

  #[instrument(level = "info", skip(self, prompt), fields(backend = LABEL, model = %self.model, prompt_len = prompt.len()))]
  async fn assess(&self, prompt: &str) -> Result<AssessmentResult, AssessError> {
    let start = Instant::now();
    let result = with_deadline(LABEL, Some(self.deadline), self.generate(prompt)).await;
    let elapsed = start.elapsed();

    let text = match result {
      Ok(text) => {
        info!(target: "backend", ?elapsed, response_len = text.len(), "Model response received");
        text
      }
      Err(e) => {
        error!(target: "backend", ?elapsed, error = %e, "Model call failed");
        return Err(e.into());
      }
    };
    Ok(parse_assessment(&text)?)
  }
}
