//! Gateway configuration, built once at startup.
//!
//! Layering: an optional TOML file at GATEWAY_CONFIG_PATH gives the base, then
//! environment variables override individual settings. Example file:
//!
//! ```toml
//! backend = "vllm"
//! port = 8080
//!
//! [vllm]
//! base_url = "http://gpu-box:8000"
//! model = "Qwen/Qwen3-4B-Instruct"
//!
//! [cache]
//! dir = "/var/lib/qalam/cache"
//!
//! [data]
//! dir = "./public/data"
//! ```

use std::path::PathBuf;

use serde::Deserialize;
use tracing::{error, info};

/// Closed set of inference backends. Unknown names resolve to Together.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Deserialize)]
#[serde(from = "String")]
pub enum BackendKind {
  #[default]
  Together,
  Vllm,
  Ollama,
  LmStudio,
}

impl BackendKind {
  pub fn from_name(name: &str) -> Self {
    match name.trim().to_ascii_lowercase().as_str() {
      "vllm" => Self::Vllm,
      "ollama" => Self::Ollama,
      "lms" | "lmstudio" => Self::LmStudio,
      _ => Self::Together,
    }
  }
}

impl From<String> for BackendKind {
  fn from(name: String) -> Self {
    Self::from_name(&name)
  }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct TogetherConfig {
  pub api_key: Option<String>,
  pub base_url: String,
  pub model: String,
}

impl Default for TogetherConfig {
  fn default() -> Self {
    Self {
      api_key: None,
      base_url: "https://api.together.xyz".into(),
      model: "meta-llama/Llama-3.3-70B-Instruct-Turbo".into(),
    }
  }
}

/// Endpoint of a self-hosted inference server.
#[derive(Clone, Debug)]
pub struct LocalBackendConfig {
  pub base_url: String,
  pub model: String,
}

impl LocalBackendConfig {
  fn new(base_url: &str, model: &str) -> Self {
    Self { base_url: base_url.into(), model: model.into() }
  }
}

/// Per-backend settings. Self-hosted tables may be partial in TOML; omitted
/// keys keep that backend's own defaults.
#[derive(Clone, Debug, Deserialize)]
#[serde(from = "BackendsFile")]
pub struct BackendsConfig {
  pub together: TogetherConfig,
  pub vllm: LocalBackendConfig,
  pub ollama: LocalBackendConfig,
  pub lmstudio: LocalBackendConfig,
}

/// A self-hosted backend table as written in the config file.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct LocalBackendFile {
  base_url: Option<String>,
  model: Option<String>,
}

impl LocalBackendFile {
  fn over(self, base: LocalBackendConfig) -> LocalBackendConfig {
    LocalBackendConfig {
      base_url: self.base_url.unwrap_or(base.base_url),
      model: self.model.unwrap_or(base.model),
    }
  }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct BackendsFile {
  together: TogetherConfig,
  vllm: LocalBackendFile,
  ollama: LocalBackendFile,
  lmstudio: LocalBackendFile,
}

impl From<BackendsFile> for BackendsConfig {
  fn from(file: BackendsFile) -> Self {
    let defaults = BackendsConfig::default();
    Self {
      together: file.together,
      vllm: file.vllm.over(defaults.vllm),
      ollama: file.ollama.over(defaults.ollama),
      lmstudio: file.lmstudio.over(defaults.lmstudio),
    }
  }
}

impl Default for BackendsConfig {
  fn default() -> Self {
    Self {
      together: TogetherConfig::default(),
      vllm: LocalBackendConfig::new("http://localhost:8000", "Qwen/Qwen3-4B-Instruct"),
      ollama: LocalBackendConfig::new("http://localhost:11434", "qwen3:4b"),
      lmstudio: LocalBackendConfig::new("http://localhost:1234", "local-model"),
    }
  }
}

/// Where cached feedback lives. `dir` wins over `memory`.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
  pub dir: Option<PathBuf>,
  pub memory: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CacheBinding {
  Disabled,
  Memory,
  Directory(PathBuf),
}

impl CacheConfig {
  pub fn binding(&self) -> CacheBinding {
    match (&self.dir, self.memory) {
      (Some(dir), _) => CacheBinding::Directory(dir.clone()),
      (None, true) => CacheBinding::Memory,
      (None, false) => CacheBinding::Disabled,
    }
  }
}

/// Verse data location. A local `dir` wins over `url`.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct DataConfig {
  pub dir: Option<PathBuf>,
  pub url: String,
}

impl Default for DataConfig {
  fn default() -> Self {
    Self { dir: None, url: "https://qalam.pages.dev/data".into() }
  }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
  pub port: u16,
  pub backend: BackendKind,
  #[serde(flatten)]
  pub backends: BackendsConfig,
  pub cache: CacheConfig,
  pub data: DataConfig,
}

impl Default for GatewayConfig {
  fn default() -> Self {
    Self {
      port: 3000,
      backend: BackendKind::default(),
      backends: BackendsConfig::default(),
      cache: CacheConfig::default(),
      data: DataConfig::default(),
    }
  }
}

impl GatewayConfig {
  /// TOML base (if GATEWAY_CONFIG_PATH is set and readable) plus env overrides.
  pub fn load() -> Self {
    let mut cfg = load_file_config_from_env().unwrap_or_default();
    cfg.apply_overrides(|k| std::env::var(k).ok());
    cfg
  }

  /// Apply environment-style overrides from `lookup`. Empty values are ignored.
  pub fn apply_overrides<F>(&mut self, lookup: F)
  where
    F: Fn(&str) -> Option<String>,
  {
    let get = |k: &str| lookup(k).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

    if let Some(port) = get("PORT").and_then(|p| p.parse::<u16>().ok()) {
      self.port = port;
    }
    if let Some(name) = get("ASSESSMENT_BACKEND") {
      self.backend = BackendKind::from_name(&name);
    }

    let b = &mut self.backends;
    if let Some(v) = get("TOGETHER_API_KEY") { b.together.api_key = Some(v); }
    if let Some(v) = get("TOGETHER_BASE_URL") { b.together.base_url = v; }
    if let Some(v) = get("TOGETHER_MODEL") { b.together.model = v; }
    if let Some(v) = get("VLLM_BASE_URL") { b.vllm.base_url = v; }
    if let Some(v) = get("VLLM_MODEL") { b.vllm.model = v; }
    if let Some(v) = get("OLLAMA_BASE_URL") { b.ollama.base_url = v; }
    if let Some(v) = get("OLLAMA_MODEL") { b.ollama.model = v; }
    if let Some(v) = get("LMS_BASE_URL") { b.lmstudio.base_url = v; }
    if let Some(v) = get("LMS_MODEL") { b.lmstudio.model = v; }

    if let Some(dir) = get("ASSESSMENT_CACHE_DIR") {
      self.cache.dir = Some(PathBuf::from(dir));
    }
    match get("ASSESSMENT_CACHE").map(|v| v.to_ascii_lowercase()).as_deref() {
      Some("memory") => self.cache.memory = true,
      Some("off") | Some("none") | Some("disabled") => {
        self.cache.dir = None;
        self.cache.memory = false;
      }
      _ => {}
    }

    if let Some(dir) = get("VERSE_DATA_DIR") { self.data.dir = Some(PathBuf::from(dir)); }
    if let Some(url) = get("VERSE_DATA_URL") { self.data.url = url; }
  }
}

/// Attempt to load `GatewayConfig` from GATEWAY_CONFIG_PATH. On any parsing/IO error, returns None.
pub fn load_file_config_from_env() -> Option<GatewayConfig> {
  let path = std::env::var("GATEWAY_CONFIG_PATH").ok()?;
  match std::fs::read_to_string(&path) {
    Ok(s) => match toml::from_str::<GatewayConfig>(&s) {
      Ok(cfg) => {
        info!(target: "qalam_gateway", %path, "Loaded gateway config (TOML)");
        Some(cfg)
      }
      Err(e) => {
        error!(target: "qalam_gateway", %path, error = %e, "Failed to parse TOML config");
        None
      }
    },
    Err(e) => {
      error!(target: "qalam_gateway", %path, error = %e, "Failed to read TOML config file");
      None
    }
  }
}
