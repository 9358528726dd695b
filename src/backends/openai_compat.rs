//! OpenAI-compatible chat completion adapter (Together.ai, vLLM, LM Studio).
//!
//! We send one user message (plus a JSON-only system message for self-hosted
//! models) and read `choices[0].message.content`. Calls log model names,
//! latencies and response sizes, never prompt contents or keys.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument};

use super::{check_status, transport_error, with_deadline, AssessmentBackend, BackendDescription};
use super::{CLOUD_TIMEOUT, LOCAL_TIMEOUT};
use crate::config::{LocalBackendConfig, TogetherConfig};
use crate::domain::AssessmentResult;
use crate::error::{AssessError, BackendError};
use crate::parser::parse_assessment;
use crate::util::join_url;

const JSON_ONLY_SYSTEM: &str =
  "You are an expert in translation assessment. Return only valid JSON, no additional text or markdown.";
const TEMPERATURE: f32 = 0.3;
const MAX_TOKENS: u32 = 500;

/// How the adapter authenticates. Hosted APIs require a key from configuration.
#[derive(Clone)]
enum Auth {
  None,
  Bearer { key: Option<String>, var: &'static str },
}

#[derive(Clone)]
pub struct ChatBackend {
  client: reqwest::Client,
  label: &'static str,
  base_url: String,
  model: String,
  auth: Auth,
  system: Option<&'static str>,
  /// Self-hosted backends get the "is it running?" treatment and a hard deadline.
  local: bool,
  deadline: Option<Duration>,
}

impl ChatBackend {
  pub fn together(cfg: &TogetherConfig, client: reqwest::Client) -> Self {
    Self {
      client,
      label: "Together.ai",
      base_url: cfg.base_url.clone(),
      model: cfg.model.clone(),
      auth: Auth::Bearer { key: cfg.api_key.clone(), var: "TOGETHER_API_KEY" },
      system: None,
      local: false,
      deadline: None,
    }
  }

  pub fn vllm(cfg: &LocalBackendConfig, client: reqwest::Client) -> Self {
    Self::local("vLLM", cfg, client)
  }

  pub fn lmstudio(cfg: &LocalBackendConfig, client: reqwest::Client) -> Self {
    Self::local("LM Studio", cfg, client)
  }

  fn local(label: &'static str, cfg: &LocalBackendConfig, client: reqwest::Client) -> Self {
    Self {
      client,
      label,
      base_url: cfg.base_url.clone(),
      model: cfg.model.clone(),
      auth: Auth::None,
      system: Some(JSON_ONLY_SYSTEM),
      local: true,
      deadline: Some(LOCAL_TIMEOUT),
    }
  }

  /// Override the cancellation deadline (self-hosted backends only).
  #[cfg(test)]
  pub fn with_deadline(mut self, deadline: Duration) -> Self {
    if self.local {
      self.deadline = Some(deadline);
    }
    self
  }

  fn request_body(&self, prompt: &str) -> ChatCompletionRequest {
    let mut messages = Vec::with_capacity(2);
    if let Some(system) = self.system {
      messages.push(ChatMessageReq { role: "system".into(), content: system.into() });
    }
    messages.push(ChatMessageReq { role: "user".into(), content: prompt.into() });
    ChatCompletionRequest { model: self.model.clone(), messages, temperature: TEMPERATURE, max_tokens: MAX_TOKENS }
  }

  /// Single chat completion; returns the trimmed model text.
  async fn complete(&self, api_key: Option<&str>, prompt: &str) -> Result<String, BackendError> {
    let url = join_url(&self.base_url, "v1/chat/completions");
    let mut req = self
      .client
      .post(&url)
      .header(USER_AGENT, "qalam-gateway/0.1")
      .header(CONTENT_TYPE, "application/json")
      .json(&self.request_body(prompt));
    if let Some(key) = api_key {
      req = req.header(AUTHORIZATION, format!("Bearer {}", key));
    }
    if !self.local {
      req = req.timeout(CLOUD_TIMEOUT);
    }

    let res = req
      .send()
      .await
      .map_err(|e| transport_error(self.label, &self.base_url, self.local, e))?;
    let res = check_status(self.label, res).await?;

    let body: ChatCompletionResponse = res
      .json()
      .await
      .map_err(|e| transport_error(self.label, &self.base_url, self.local, e))?;
    if let Some(usage) = &body.usage {
      info!(target: "backend", prompt_tokens = ?usage.prompt_tokens, completion_tokens = ?usage.completion_tokens, total_tokens = ?usage.total_tokens, "Model usage");
    }

    body
      .choices
      .into_iter()
      .next()
      .and_then(|c| c.message.content)
      .map(|t| t.trim().to_string())
      .filter(|t| !t.is_empty())
      .ok_or(BackendError::EmptyResponse { backend: self.label })
  }
}

#[async_trait]
impl AssessmentBackend for ChatBackend {
  fn describe(&self) -> BackendDescription {
    BackendDescription { label: self.label, endpoint: self.base_url.clone(), model: self.model.clone() }
  }

  #[instrument(level = "info", skip(self, prompt), fields(backend = self.label, model = %self.model, prompt_len = prompt.len()))]
  async fn assess(&self, prompt: &str) -> Result<AssessmentResult, AssessError> {
    let api_key = match &self.auth {
      Auth::None => None,
      Auth::Bearer { key: Some(key), .. } => Some(key.as_str()),
      Auth::Bearer { key: None, var } => {
        return Err(BackendError::Config(format!("{} is not configured", var)).into());
      }
    };

    let start = Instant::now();
    let result = with_deadline(self.label, self.deadline, self.complete(api_key, prompt)).await;
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

// --- Chat DTOs ---

#[derive(Serialize)]
struct ChatCompletionRequest {
  model: String,
  messages: Vec<ChatMessageReq>,
  temperature: f32,
  max_tokens: u32,
}
#[derive(Serialize)]
struct ChatMessageReq { role: String, content: String }

#[derive(Deserialize)]
struct ChatCompletionResponse {
  #[serde(default)] choices: Vec<ChatChoice>,
  #[serde(default)] usage: Option<Usage>,
}
#[derive(Deserialize)]
struct ChatChoice { message: ChatMessageResp }
#[derive(Deserialize)]
struct ChatMessageResp { #[serde(default)] content: Option<String> }
#[derive(Deserialize)]
struct Usage {
  #[serde(default)] prompt_tokens: Option<u32>,
  #[serde(default)] completion_tokens: Option<u32>,
  #[serde(default)] total_tokens: Option<u32>,
}
