//! Read-only verse reference data: word analyses and reference translations.
//!
//! Both sources share one static layout:
//!   analysis/<surah>-<verse>.json   per-verse analysis
//!   quran.json                      surahs with per-verse translations
//!
//! Source failures (missing file, HTTP error, bad JSON) are logged and reported
//! as absent; an unanalyzed verse is a normal state.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::USER_AGENT;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, instrument, warn};

use crate::domain::{VerseAnalysis, VerseId};
use crate::util::join_url;

#[async_trait]
pub trait VerseData: Send + Sync {
  async fn verse_analysis(&self, id: &VerseId) -> Option<VerseAnalysis>;
  async fn reference_translation(&self, id: &VerseId) -> Option<String>;
}

#[derive(Deserialize)]
struct QuranFile {
  #[serde(default)] surahs: Vec<SurahEntry>,
}
#[derive(Deserialize)]
struct SurahEntry {
  id: u32,
  #[serde(default)] verses: Vec<VerseEntry>,
}
#[derive(Deserialize)]
struct VerseEntry {
  number: u32,
  #[serde(default)] translations: Translations,
}
#[derive(Deserialize, Default)]
struct Translations {
  #[serde(rename = "en.sahih", default)] en_sahih: Option<String>,
}

fn find_translation(quran: QuranFile, id: &VerseId) -> Option<String> {
  quran
    .surahs
    .into_iter()
    .find(|s| s.id == id.surah)?
    .verses
    .into_iter()
    .find(|v| v.number == id.verse)?
    .translations
    .en_sahih
    .filter(|t| !t.trim().is_empty())
}

fn analysis_path(id: &VerseId) -> String {
  format!("analysis/{}.json", id.file_stem())
}

const QURAN_FILE: &str = "quran.json";

/// Static data directory on local disk.
#[derive(Debug, Clone)]
pub struct StaticDirData {
  root: PathBuf,
}

impl StaticDirData {
  pub fn new(root: impl Into<PathBuf>) -> Self {
    Self { root: root.into() }
  }

  async fn read_json<T: DeserializeOwned>(&self, rel: &str) -> Option<T> {
    let path = self.root.join(rel);
    let raw = match tokio::fs::read(&path).await {
      Ok(raw) => raw,
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
        debug!(target: "assessment", path = %path.display(), "Data file not present");
        return None;
      }
      Err(e) => {
        warn!(target: "assessment", path = %path.display(), error = %e, "Failed to read data file");
        return None;
      }
    };
    match serde_json::from_slice::<T>(&raw) {
      Ok(v) => Some(v),
      Err(e) => {
        warn!(target: "assessment", path = %path.display(), error = %e, "Data file is not valid JSON");
        None
      }
    }
  }
}

#[async_trait]
impl VerseData for StaticDirData {
  #[instrument(level = "debug", skip(self), fields(%id))]
  async fn verse_analysis(&self, id: &VerseId) -> Option<VerseAnalysis> {
    self.read_json(&analysis_path(id)).await
  }

  #[instrument(level = "debug", skip(self), fields(%id))]
  async fn reference_translation(&self, id: &VerseId) -> Option<String> {
    let quran: QuranFile = self.read_json(QURAN_FILE).await?;
    find_translation(quran, id)
  }
}

/// Static data published over HTTP.
#[derive(Clone)]
pub struct HttpVerseData {
  client: reqwest::Client,
  base_url: String,
}

impl HttpVerseData {
  pub fn new(base_url: impl Into<String>) -> Result<Self, reqwest::Error> {
    let client = reqwest::Client::builder().timeout(Duration::from_secs(20)).build()?;
    Ok(Self { client, base_url: base_url.into() })
  }

  async fn get_json<T: DeserializeOwned>(&self, rel: &str) -> Option<T> {
    let url = join_url(&self.base_url, rel);
    let res = match self
      .client
      .get(&url)
      .header(USER_AGENT, "qalam-gateway/0.1")
      .send()
      .await
    {
      Ok(res) => res,
      Err(e) => {
        warn!(target: "assessment", %url, error = %e, "Data fetch failed");
        return None;
      }
    };
    if !res.status().is_success() {
      debug!(target: "assessment", %url, status = %res.status(), "Data not available");
      return None;
    }
    match res.json::<T>().await {
      Ok(v) => Some(v),
      Err(e) => {
        warn!(target: "assessment", %url, error = %e, "Data response is not valid JSON");
        None
      }
    }
  }
}

#[async_trait]
impl VerseData for HttpVerseData {
  #[instrument(level = "debug", skip(self), fields(%id))]
  async fn verse_analysis(&self, id: &VerseId) -> Option<VerseAnalysis> {
    self.get_json(&analysis_path(id)).await
  }

  #[instrument(level = "debug", skip(self), fields(%id))]
  async fn reference_translation(&self, id: &VerseId) -> Option<String> {
    let quran: QuranFile = self.get_json(QURAN_FILE).await?;
    find_translation(quran, id)
  }
}
