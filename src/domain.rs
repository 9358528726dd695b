//! Domain models: verse identity, reference analysis, and assessment results.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Composite `surah:verse` key. Canonically rendered as `"<surah>:<verse>"`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct VerseId {
  pub surah: u32,
  pub verse: u32,
}

impl VerseId {
  /// File stem used by the static data layout (`1-1.json` for `1:1`).
  pub fn file_stem(&self) -> String {
    format!("{}-{}", self.surah, self.verse)
  }
}

impl fmt::Display for VerseId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}:{}", self.surah, self.verse)
  }
}

impl FromStr for VerseId {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let (surah, verse) = s
      .trim()
      .split_once(':')
      .ok_or_else(|| format!("Invalid verseId '{}': expected <surah>:<verse>", s))?;
    let parse = |part: &str| -> Option<u32> { part.trim().parse::<u32>().ok().filter(|n| *n > 0) };
    match (parse(surah), parse(verse)) {
      (Some(surah), Some(verse)) => Ok(Self { surah, verse }),
      _ => Err(format!("Invalid verseId '{}': expected <surah>:<verse>", s)),
    }
  }
}

/// One analyzed word of a verse. Only the fields the gateway reads are modeled.
#[derive(Clone, Debug, Deserialize, Serialize, Default)]
pub struct WordAnalysis {
  #[serde(default)] pub arabic: String,
  #[serde(default)] pub meaning: String,
}

#[derive(Clone, Debug, Deserialize, Serialize, Default)]
pub struct VerseText {
  #[serde(default)] pub arabic: String,
}

/// Pre-computed linguistic breakdown of a verse.
#[derive(Clone, Debug, Deserialize, Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct VerseAnalysis {
  #[serde(default)] pub verse_id: String,
  #[serde(default)] pub verse: VerseText,
  #[serde(default)] pub words: Vec<WordAnalysis>,
}

/// Normalized backend output. `score` is always within 0..=100.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssessmentResult {
  pub score: u8,
  pub feedback: String,
  pub correct_elements: Vec<String>,
  pub missed_elements: Vec<String>,
}

/// Client-facing feedback for one attempt. Also the cached value.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttemptFeedback {
  pub overall_score: f64,
  pub correct_elements: Vec<String>,
  pub missed_elements: Vec<String>,
  pub suggestions: Vec<String>,
  pub encouragement: String,
}

pub const ENCOURAGE_EXCELLENT: &str =
  "Excellent work! Your translation beautifully captures the meaning of this verse.";
pub const ENCOURAGE_GREAT: &str =
  "Great effort! You understood the verse well. Keep practicing to refine your skills.";
pub const ENCOURAGE_GOOD: &str =
  "Good start! Review the word meanings and try again to improve your understanding.";
pub const ENCOURAGE_KEEP_LEARNING: &str =
  "Keep learning! Use the word analysis to understand each part of the verse.";

/// Score band ladder on the 0..=1 scale.
pub fn encouragement_for(overall_score: f64) -> &'static str {
  if overall_score >= 0.9 {
    ENCOURAGE_EXCELLENT
  } else if overall_score >= 0.7 {
    ENCOURAGE_GREAT
  } else if overall_score >= 0.5 {
    ENCOURAGE_GOOD
  } else {
    ENCOURAGE_KEEP_LEARNING
  }
}

impl From<AssessmentResult> for AttemptFeedback {
  fn from(r: AssessmentResult) -> Self {
    let overall_score = f64::from(r.score) / 100.0;
    Self {
      overall_score,
      correct_elements: r.correct_elements,
      missed_elements: r.missed_elements,
      suggestions: vec![r.feedback],
      encouragement: encouragement_for(overall_score).to_string(),
    }
  }
}
