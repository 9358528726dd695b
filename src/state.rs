//! Application state: the assessment orchestrator wired from configuration.
//!
//! This module owns the startup decisions:
//!   - which verse data source to read (local directory or HTTP)
//!   - which cache store to bind (file, memory, or none)
//!   - which inference backend serves assessments

use std::sync::Arc;

use tracing::{info, instrument};

use crate::assessment::Assessor;
use crate::backends::select;
use crate::cache::{AssessmentCache, FileStore, MemoryStore};
use crate::config::{CacheBinding, GatewayConfig};
use crate::verses::{HttpVerseData, StaticDirData, VerseData};

#[derive(Clone)]
pub struct AppState {
  pub assessor: Assessor,
}

impl AppState {
  #[cfg(test)]
  pub fn with_assessor(assessor: Assessor) -> Self {
    Self { assessor }
  }

  /// Build state from configuration. Fails only if an HTTP client cannot be constructed.
  #[instrument(level = "info", skip_all)]
  pub fn from_config(cfg: &GatewayConfig) -> Result<Self, reqwest::Error> {
    let data: Arc<dyn VerseData> = match &cfg.data.dir {
      Some(dir) => {
        info!(target: "qalam_gateway", dir = %dir.display(), "Verse data from local directory");
        Arc::new(StaticDirData::new(dir))
      }
      None => {
        info!(target: "qalam_gateway", url = %cfg.data.url, "Verse data over HTTP");
        Arc::new(HttpVerseData::new(cfg.data.url.clone())?)
      }
    };

    let cache = match cfg.cache.binding() {
      CacheBinding::Directory(dir) => {
        let store = FileStore::new(dir);
        info!(target: "qalam_gateway", dir = %store.dir().display(), "Assessment cache: file store");
        AssessmentCache::new(Arc::new(store))
      }
      CacheBinding::Memory => {
        info!(target: "qalam_gateway", "Assessment cache: in-memory store");
        AssessmentCache::new(Arc::new(MemoryStore::new()))
      }
      CacheBinding::Disabled => {
        info!(target: "qalam_gateway", "Assessment cache disabled (no store bound)");
        AssessmentCache::disabled()
      }
    };

    let client = reqwest::Client::builder().build()?;
    let backend = select(cfg.backend, &cfg.backends, client);
    let d = backend.describe();
    info!(target: "qalam_gateway", backend = d.label, endpoint = %d.endpoint, model = %d.model, "Assessment backend selected");

    Ok(Self { assessor: Assessor::new(data, cache, backend) })
  }
}
