//! Assessment cache: deterministic keys over normalized input plus a small
//! key-value store abstraction with store-enforced TTL.
//!
//! Keys look like `assessment:<surah>:<verse>:<hash>`. The hash is a 32-bit
//! multiply-add over the normalized translation, so translations that differ
//! only in case or whitespace share an entry. Distinct texts can collide; a
//! collision serves the other text's feedback.
//!
//! Store failures are logged and absorbed here: a miss is always a safe answer.

use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tokio::sync::RwLock;
use tracing::{debug, instrument, warn};

use crate::domain::{AttemptFeedback, VerseId};
use crate::error::StoreError;

/// Entries expire 30 days after they are written.
pub const CACHE_TTL: Duration = Duration::from_secs(30 * 24 * 60 * 60);

/// Lowercase, trim, collapse internal whitespace runs to one space.
///
/// Whitespace is the ECMAScript `\s` set so keys match entries written by the
/// web worker: U+FEFF counts, U+0085 does not.
pub fn normalize_translation(text: &str) -> String {
  text
    .to_lowercase()
    .split(is_ecma_whitespace)
    .filter(|part| !part.is_empty())
    .collect::<Vec<_>>()
    .join(" ")
}

fn is_ecma_whitespace(c: char) -> bool {
  c == '\u{FEFF}' || (c != '\u{0085}' && c.is_whitespace())
}

/// `hash = hash * 31 + unit` over UTF-16 code units, wrapping at 32 bits.
pub fn rolling_hash(normalized: &str) -> u32 {
  let hash = normalized
    .encode_utf16()
    .fold(0i32, |h, unit| h.wrapping_mul(31).wrapping_add(i32::from(unit)));
  hash as u32
}

pub fn cache_key(verse_id: &VerseId, user_translation: &str) -> String {
  let hash = rolling_hash(&normalize_translation(user_translation));
  format!("assessment:{}:{:x}", verse_id, hash)
}

/// Flat key -> string store with expiry.
#[async_trait]
pub trait KvStore: Send + Sync {
  async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
  async fn put(&self, key: &str, value: String, ttl: Duration) -> Result<(), StoreError>;
}

fn expiry_from_now(ttl: Duration) -> DateTime<Utc> {
  chrono::Duration::from_std(ttl)
    .ok()
    .and_then(|ttl| Utc::now().checked_add_signed(ttl))
    .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// In-process store. Entries live as long as the process.
#[derive(Default)]
pub struct MemoryStore {
  entries: RwLock<HashMap<String, (String, DateTime<Utc>)>>,
}

impl MemoryStore {
  pub fn new() -> Self {
    Self::default()
  }
}

#[async_trait]
impl KvStore for MemoryStore {
  async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
    let entries = self.entries.read().await;
    Ok(entries
      .get(key)
      .filter(|(_, expires_at)| *expires_at > Utc::now())
      .map(|(value, _)| value.clone()))
  }

  async fn put(&self, key: &str, value: String, ttl: Duration) -> Result<(), StoreError> {
    self.entries.write().await.insert(key.to_string(), (value, expiry_from_now(ttl)));
    Ok(())
  }
}

/// On-disk envelope written by `FileStore`.
#[derive(Debug, Serialize, Deserialize)]
struct StoredEntry {
  value: String,
  expires_at: DateTime<Utc>,
}

/// Durable store: one JSON envelope per key under a directory.
#[derive(Debug, Clone)]
pub struct FileStore {
  dir: PathBuf,
}

impl FileStore {
  pub fn new(dir: impl Into<PathBuf>) -> Self {
    Self { dir: dir.into() }
  }

  pub fn dir(&self) -> &Path {
    &self.dir
  }

  fn entry_path(&self, key: &str) -> PathBuf {
    let name: String = key
      .chars()
      .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '.' { c } else { '_' })
      .collect();
    self.dir.join(format!("{name}.json"))
  }
}

#[async_trait]
impl KvStore for FileStore {
  async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
    let raw = match tokio::fs::read(self.entry_path(key)).await {
      Ok(raw) => raw,
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
      Err(e) => return Err(e.into()),
    };
    let entry: StoredEntry = serde_json::from_slice(&raw)?;
    if entry.expires_at <= Utc::now() {
      return Ok(None);
    }
    Ok(Some(entry.value))
  }

  async fn put(&self, key: &str, value: String, ttl: Duration) -> Result<(), StoreError> {
    tokio::fs::create_dir_all(&self.dir).await?;
    let path = self.entry_path(key);
    let body = serde_json::to_vec(&StoredEntry { value, expires_at: expiry_from_now(ttl) })?;
    let dir = self.dir.clone();
    // Each write gets its own temp file; the rename is the commit point.
    tokio::task::spawn_blocking(move || -> std::io::Result<()> {
      let mut tmp = NamedTempFile::new_in(&dir)?;
      tmp.write_all(&body)?;
      tmp.persist(&path).map_err(|e| e.error)?;
      Ok(())
    })
    .await
    .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))??;
    Ok(())
  }
}

/// Best-effort feedback cache. Disabled when no store is bound.
#[derive(Clone)]
pub struct AssessmentCache {
  store: Option<Arc<dyn KvStore>>,
  ttl: Duration,
}

impl AssessmentCache {
  pub fn new(store: Arc<dyn KvStore>) -> Self {
    Self { store: Some(store), ttl: CACHE_TTL }
  }

  pub fn disabled() -> Self {
    Self { store: None, ttl: CACHE_TTL }
  }

  pub fn is_enabled(&self) -> bool {
    self.store.is_some()
  }

  #[instrument(level = "debug", skip(self, user_translation), fields(%verse_id, text_len = user_translation.len()))]
  pub async fn get(&self, verse_id: &VerseId, user_translation: &str) -> Option<AttemptFeedback> {
    let store = self.store.as_ref()?;
    let key = cache_key(verse_id, user_translation);
    match store.get(&key).await {
      Ok(Some(raw)) => match serde_json::from_str::<AttemptFeedback>(&raw) {
        Ok(feedback) => {
          debug!(target: "cache", %key, "Cache hit");
          Some(feedback)
        }
        Err(e) => {
          warn!(target: "cache", %key, error = %e, "Cached value is not valid feedback; treating as miss");
          None
        }
      },
      Ok(None) => {
        debug!(target: "cache", %key, "Cache miss");
        None
      }
      Err(e) => {
        warn!(target: "cache", %key, error = %e, "Cache read error");
        None
      }
    }
  }

  #[instrument(level = "debug", skip(self, user_translation, feedback), fields(%verse_id))]
  pub async fn put(&self, verse_id: &VerseId, user_translation: &str, feedback: &AttemptFeedback) {
    let Some(store) = self.store.as_ref() else { return };
    let key = cache_key(verse_id, user_translation);
    let value = match serde_json::to_string(feedback) {
      Ok(v) => v,
      Err(e) => {
        warn!(target: "cache", %key, error = %e, "Failed to encode feedback for cache");
        return;
      }
    };
    match store.put(&key, value, self.ttl).await {
      Ok(()) => debug!(target: "cache", %key, "Cached assessment"),
      Err(e) => warn!(target: "cache", %key, error = %e, "Cache write error"),
    }
  }

  /// Detached write. The request path never awaits it.
  pub fn spawn_put(&self, verse_id: VerseId, user_translation: String, feedback: AttemptFeedback) {
    if !self.is_enabled() {
      return;
    }
    let cache = self.clone();
    tokio::spawn(async move {
      cache.put(&verse_id, &user_translation, &feedback).await;
    });
  }
}
