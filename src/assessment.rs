//! Assessment orchestration: validate, consult the cache, gather reference
//! data, prompt the configured backend, and shape the client feedback.
//!
//! Each call makes at most one upstream inference request. Nothing is retried
//! here; backend and parse failures propagate unchanged.

use std::sync::Arc;

use tracing::{info, instrument, warn};

use crate::backends::{AssessmentBackend, BackendDescription};
use crate::cache::AssessmentCache;
use crate::domain::{AttemptFeedback, VerseId};
use crate::error::{AssessError, Missing};
use crate::prompt::{build_assessment_prompt, word_meanings_summary};
use crate::verses::VerseData;

/// Result of one assessment request.
#[derive(Clone, Debug, PartialEq)]
pub struct AssessmentOutcome {
  pub feedback: AttemptFeedback,
  /// Present on fresh assessments; cache hits skip the data fetch.
  pub reference_translation: Option<String>,
  pub cached: bool,
}

#[derive(Clone)]
pub struct Assessor {
  data: Arc<dyn VerseData>,
  cache: AssessmentCache,
  backend: Arc<dyn AssessmentBackend>,
}

impl Assessor {
  pub fn new(data: Arc<dyn VerseData>, cache: AssessmentCache, backend: Arc<dyn AssessmentBackend>) -> Self {
    Self { data, cache, backend }
  }

  pub fn backend(&self) -> BackendDescription {
    self.backend.describe()
  }

  #[instrument(level = "info", skip(self, user_translation), fields(%verse_id, text_len = user_translation.len()))]
  pub async fn assess(&self, verse_id: &str, user_translation: &str) -> Result<AssessmentOutcome, AssessError> {
    let text = user_translation.trim();
    if verse_id.trim().is_empty() || text.is_empty() {
      return Err(AssessError::Validation("Missing verseId or userTranslation".into()));
    }
    let id: VerseId = verse_id.parse().map_err(AssessError::Validation)?;

    if let Some(feedback) = self.cache.get(&id, text).await {
      info!(target: "assessment", %id, score = feedback.overall_score, "Serving cached assessment");
      return Ok(AssessmentOutcome { feedback, reference_translation: None, cached: true });
    }

    let (analysis, reference) = tokio::join!(self.data.verse_analysis(&id), self.data.reference_translation(&id));
    let Some(analysis) = analysis else {
      warn!(target: "assessment", %id, "No analysis for verse");
      return Err(AssessError::NotFound(Missing::Analysis));
    };
    if !analysis.verse_id.is_empty() && analysis.verse_id != id.to_string() {
      warn!(target: "assessment", %id, analysis_verse = %analysis.verse_id, "Analysis file labels a different verse");
    }
    let Some(reference) = reference else {
      warn!(target: "assessment", %id, "No reference translation for verse");
      return Err(AssessError::NotFound(Missing::Reference));
    };

    let word_meanings = word_meanings_summary(&analysis);
    let prompt = build_assessment_prompt(&analysis.verse.arabic, &reference, &word_meanings, text);

    let result = self.backend.assess(&prompt).await?;
    let feedback = AttemptFeedback::from(result);
    info!(target: "assessment", %id, score = feedback.overall_score, "Assessment complete");

    self.cache.spawn_put(id, text.to_string(), feedback.clone());

    Ok(AssessmentOutcome { feedback, reference_translation: Some(reference), cached: false })
  }
}

#[cfg(test)]
pub(crate) mod tests {
  use super::*;
  use std::sync::atomic::{AtomicUsize, Ordering};
  use std::time::Duration;

  use async_trait::async_trait;

  use crate::cache::{cache_key, KvStore, MemoryStore};
  use crate::domain::{AssessmentResult, VerseAnalysis, VerseText, WordAnalysis, ENCOURAGE_GREAT};
  use crate::error::{BackendError, StoreError};
  use crate::parser::parse_assessment;

  pub(crate) const GOOD_REPLY: &str =
    r#"{"score":85,"feedback":"Good","correctElements":["core meaning"],"missedElements":[]}"#;

  #[derive(Default)]
  pub(crate) struct FakeData {
    pub analysis: Option<VerseAnalysis>,
    pub reference: Option<String>,
    pub analysis_calls: AtomicUsize,
    pub reference_calls: AtomicUsize,
  }

  impl FakeData {
    pub fn fatiha() -> Self {
      Self {
        analysis: Some(VerseAnalysis {
          verse_id: "1:1".into(),
          verse: VerseText { arabic: "بِسْمِ ٱللَّهِ ٱلرَّحْمَٰنِ ٱلرَّحِيمِ".into() },
          words: vec![WordAnalysis { arabic: "بِسْمِ".into(), meaning: "In the name of".into() }],
        }),
        reference: Some("In the name of Allah...".into()),
        ..Default::default()
      }
    }

    fn fetches(&self) -> usize {
      self.analysis_calls.load(Ordering::SeqCst) + self.reference_calls.load(Ordering::SeqCst)
    }
  }

  #[async_trait]
  impl VerseData for FakeData {
    async fn verse_analysis(&self, _id: &VerseId) -> Option<VerseAnalysis> {
      self.analysis_calls.fetch_add(1, Ordering::SeqCst);
      self.analysis.clone()
    }
    async fn reference_translation(&self, _id: &VerseId) -> Option<String> {
      self.reference_calls.fetch_add(1, Ordering::SeqCst);
      self.reference.clone()
    }
  }

  /// Replies with canned model text, run through the real parser.
  pub(crate) struct ScriptedBackend {
    pub reply: Result<String, &'static str>,
    pub calls: AtomicUsize,
    pub last_prompt: std::sync::Mutex<Option<String>>,
  }

  impl ScriptedBackend {
    pub fn replying(text: &str) -> Self {
      Self { reply: Ok(text.to_string()), calls: AtomicUsize::new(0), last_prompt: Default::default() }
    }
    pub fn failing(message: &'static str) -> Self {
      Self { reply: Err(message), calls: AtomicUsize::new(0), last_prompt: Default::default() }
    }
    fn calls(&self) -> usize {
      self.calls.load(Ordering::SeqCst)
    }
  }

  #[async_trait]
  impl AssessmentBackend for ScriptedBackend {
    fn describe(&self) -> BackendDescription {
      BackendDescription { label: "Scripted", endpoint: "memory://".into(), model: "canned".into() }
    }
    async fn assess(&self, prompt: &str) -> Result<AssessmentResult, AssessError> {
      self.calls.fetch_add(1, Ordering::SeqCst);
      if let Ok(mut last) = self.last_prompt.lock() {
        *last = Some(prompt.to_string());
      }
      match &self.reply {
        Ok(text) => Ok(parse_assessment(text)?),
        Err(message) => Err(BackendError::Transport { backend: "Scripted", message: message.to_string() }.into()),
      }
    }
  }

  struct Harness {
    assessor: Assessor,
    data: Arc<FakeData>,
    backend: Arc<ScriptedBackend>,
    store: Arc<MemoryStore>,
  }

  fn harness(data: FakeData, backend: ScriptedBackend) -> Harness {
    let data = Arc::new(data);
    let backend = Arc::new(backend);
    let store = Arc::new(MemoryStore::new());
    let cache = AssessmentCache::new(store.clone() as Arc<dyn KvStore>);
    let assessor = Assessor::new(data.clone(), cache, backend.clone());
    Harness { assessor, data, backend, store }
  }

  /// The cache write is detached; give it a chance to land.
  async fn wait_for_key(store: &MemoryStore, key: &str) -> Option<String> {
    for _ in 0..100 {
      if let Ok(Some(v)) = store.get(key).await {
        return Some(v);
      }
      tokio::time::sleep(Duration::from_millis(5)).await;
    }
    None
  }

  #[tokio::test]
  async fn fresh_assessment_then_cache_hit() {
    let h = harness(FakeData::fatiha(), ScriptedBackend::replying(GOOD_REPLY));

    let first = h.assessor.assess("1:1", "In the name of Allah").await.expect("assess");
    assert!(!first.cached);
    assert!((first.feedback.overall_score - 0.85).abs() < 1e-9);
    assert_eq!(first.feedback.suggestions, vec!["Good".to_string()]);
    assert_eq!(first.feedback.encouragement, ENCOURAGE_GREAT);
    assert_eq!(first.reference_translation.as_deref(), Some("In the name of Allah..."));

    let prompt = h.backend.last_prompt.lock().expect("lock").clone().expect("prompt");
    assert!(prompt.contains("بِسْمِ = \"In the name of\""));
    assert!(prompt.contains("\"In the name of Allah\""));

    let key = cache_key(&VerseId { surah: 1, verse: 1 }, "In the name of Allah");
    assert!(wait_for_key(&h.store, &key).await.is_some(), "feedback should be cached");

    let second = h.assessor.assess("1:1", "  in the name of  ALLAH ").await.expect("assess");
    assert!(second.cached);
    assert_eq!(second.feedback, first.feedback);
    assert_eq!(second.reference_translation, None);
    assert_eq!(h.backend.calls(), 1);
    assert_eq!(h.data.fetches(), 2);
  }

  #[tokio::test]
  async fn cache_hit_skips_data_and_backend() {
    let h = harness(FakeData::fatiha(), ScriptedBackend::replying(GOOD_REPLY));
    let id = VerseId { surah: 1, verse: 1 };
    let cached = AttemptFeedback::from(parse_assessment(GOOD_REPLY).expect("parse"));
    h.store
      .put(&cache_key(&id, "hello"), serde_json::to_string(&cached).expect("ser"), Duration::from_secs(60))
      .await
      .expect("seed cache");

    let out = h.assessor.assess("1:1", "Hello").await.expect("assess");
    assert!(out.cached);
    assert_eq!(out.feedback, cached);
    assert_eq!(h.backend.calls(), 0);
    assert_eq!(h.data.fetches(), 0);
  }

  #[tokio::test]
  async fn blank_input_is_rejected_before_io() {
    let h = harness(FakeData::fatiha(), ScriptedBackend::replying(GOOD_REPLY));
    for (verse, text) in [("1:1", "   "), ("", "text"), ("  ", "text"), ("1:1", "")] {
      let err = h.assessor.assess(verse, text).await.expect_err("validation");
      assert!(matches!(err, AssessError::Validation(_)), "{verse:?}/{text:?}");
    }
    let err = h.assessor.assess("fatiha", "text").await.expect_err("validation");
    assert!(matches!(err, AssessError::Validation(ref m) if m.contains("Invalid verseId")));
    assert_eq!(h.backend.calls(), 0);
    assert_eq!(h.data.fetches(), 0);
  }

  #[tokio::test]
  async fn missing_analysis_is_reported_as_analysis() {
    let data = FakeData { analysis: None, ..FakeData::fatiha() };
    let h = harness(data, ScriptedBackend::replying(GOOD_REPLY));
    let err = h.assessor.assess("2:300", "text").await.expect_err("not found");
    assert!(matches!(err, AssessError::NotFound(Missing::Analysis)));
    assert_eq!(err.to_string(), "Verse analysis not available");
    // Both fetches still complete.
    assert_eq!(h.data.fetches(), 2);
    assert_eq!(h.backend.calls(), 0);
  }

  #[tokio::test]
  async fn missing_reference_is_reported_as_reference() {
    let data = FakeData { reference: None, ..FakeData::fatiha() };
    let h = harness(data, ScriptedBackend::replying(GOOD_REPLY));
    let err = h.assessor.assess("1:1", "text").await.expect_err("not found");
    assert!(matches!(err, AssessError::NotFound(Missing::Reference)));
  }

  #[tokio::test]
  async fn backend_and_parse_failures_propagate_uncached() {
    let h = harness(FakeData::fatiha(), ScriptedBackend::failing("connection reset"));
    let err = h.assessor.assess("1:1", "text").await.expect_err("backend");
    assert!(matches!(err, AssessError::Backend(_)));
    assert_eq!(h.backend.calls(), 1, "no retry");

    let h = harness(FakeData::fatiha(), ScriptedBackend::replying("no json here"));
    let err = h.assessor.assess("1:1", "text").await.expect_err("parse");
    assert!(matches!(err, AssessError::Parse(_)));
    let key = cache_key(&VerseId { surah: 1, verse: 1 }, "text");
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(h.store.get(&key).await.expect("get"), None);
  }

  #[tokio::test]
  async fn works_without_a_cache() {
    let backend = Arc::new(ScriptedBackend::replying(GOOD_REPLY));
    let assessor = Assessor::new(Arc::new(FakeData::fatiha()), AssessmentCache::disabled(), backend.clone());
    assert!(!assessor.assess("1:1", "text").await.expect("assess").cached);
    assert!(!assessor.assess("1:1", "text").await.expect("assess").cached);
    assert_eq!(backend.calls(), 2);
  }

  /// Reads miss; writes never complete.
  struct HangingStore;

  #[async_trait]
  impl KvStore for HangingStore {
    async fn get(&self, _key: &str) -> Result<Option<String>, StoreError> {
      Ok(None)
    }
    async fn put(&self, _key: &str, _value: String, _ttl: Duration) -> Result<(), StoreError> {
      std::future::pending().await
    }
  }

  /// Every operation fails.
  struct FailingStore;

  #[async_trait]
  impl KvStore for FailingStore {
    async fn get(&self, _key: &str) -> Result<Option<String>, StoreError> {
      Err(std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "store offline").into())
    }
    async fn put(&self, _key: &str, _value: String, _ttl: Duration) -> Result<(), StoreError> {
      Err(std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "store offline").into())
    }
  }

  #[tokio::test]
  async fn hanging_cache_write_does_not_delay_response() {
    let backend = Arc::new(ScriptedBackend::replying(GOOD_REPLY));
    let cache = AssessmentCache::new(Arc::new(HangingStore));
    let assessor = Assessor::new(Arc::new(FakeData::fatiha()), cache, backend.clone());

    let out = tokio::time::timeout(Duration::from_secs(1), assessor.assess("1:1", "In the name of Allah"))
      .await
      .expect("response must not wait on the cache write")
      .expect("assess");
    assert!(!out.cached);
    assert_eq!(out.reference_translation.as_deref(), Some("In the name of Allah..."));
  }

  #[tokio::test]
  async fn failing_store_degrades_to_uncached_assessment() {
    let backend = Arc::new(ScriptedBackend::replying(GOOD_REPLY));
    let cache = AssessmentCache::new(Arc::new(FailingStore));
    let assessor = Assessor::new(Arc::new(FakeData::fatiha()), cache, backend.clone());

    let first = assessor.assess("1:1", "text").await.expect("assess");
    assert!(!first.cached);
    assert!((first.feedback.overall_score - 0.85).abs() < 1e-9);
    let second = assessor.assess("1:1", "text").await.expect("assess");
    assert!(!second.cached);
    assert_eq!(backend.calls(), 2);
  }
}
