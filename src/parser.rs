//! Recovery of an `AssessmentResult` from free-form model text.
//!
//! Attempts, first success wins:
//!   1. strip Markdown code fences, parse the trimmed text
//!   2. parse the greedy `{ ... }` span (first `{` to last `}`)
//!   3. parse each balanced `{ ... }` span in order
//!
//! Whatever object is recovered, fields are normalized unconditionally.

use std::sync::OnceLock;

use regex::Regex;
use serde_json::{Map, Value};
use tracing::warn;

use crate::domain::AssessmentResult;
use crate::error::ParseError;
use crate::util::trunc_for_log;

pub const FALLBACK_FEEDBACK: &str = "Unable to generate feedback.";

fn fence_re() -> &'static Regex {
  static RE: OnceLock<Regex> = OnceLock::new();
  RE.get_or_init(|| Regex::new(r"```(?:json)?\n?").expect("static regex"))
}

fn greedy_object_re() -> &'static Regex {
  static RE: OnceLock<Regex> = OnceLock::new();
  RE.get_or_init(|| Regex::new(r"(?s)\{.*\}").expect("static regex"))
}

pub fn parse_assessment(raw: &str) -> Result<AssessmentResult, ParseError> {
  let cleaned = fence_re().replace_all(raw, "");
  let cleaned = cleaned.trim();

  let recovered = parse_object(cleaned)
    .or_else(|| greedy_object_re().find(cleaned).and_then(|m| parse_object(m.as_str())))
    .or_else(|| balanced_spans(cleaned).find_map(parse_object));

  match recovered {
    Some(obj) => Ok(normalize(&obj)),
    None => {
      warn!(target: "backend", raw = %trunc_for_log(raw, 200), "No JSON object recoverable from model output");
      Err(ParseError { reason: format!("no JSON object in {} bytes of model output", raw.len()) })
    }
  }
}

fn parse_object(s: &str) -> Option<Map<String, Value>> {
  match serde_json::from_str::<Value>(s) {
    Ok(Value::Object(map)) => Some(map),
    _ => None,
  }
}

/// Opening braces tried by the balanced scan before giving up.
const MAX_SPAN_STARTS: usize = 32;

/// Candidate `{...}` spans with balanced braces, skipping braces inside JSON strings.
/// Yields lazily, from at most `MAX_SPAN_STARTS` opening braces.
fn balanced_spans(s: &str) -> impl Iterator<Item = &str> {
  s.match_indices('{')
    .take(MAX_SPAN_STARTS)
    .filter_map(move |(start, _)| closing_brace(s.as_bytes(), start).map(|end| &s[start..=end]))
}

/// Index of the `}` that closes the `{` at `start`, if any.
fn closing_brace(bytes: &[u8], start: usize) -> Option<usize> {
  let mut depth = 0usize;
  let mut in_str = false;
  let mut escaped = false;
  for (i, &b) in bytes.iter().enumerate().skip(start) {
    if in_str {
      match b {
        _ if escaped => escaped = false,
        b'\\' => escaped = true,
        b'"' => in_str = false,
        _ => {}
      }
      continue;
    }
    match b {
      b'"' => in_str = true,
      b'{' => depth += 1,
      b'}' => {
        depth -= 1;
        if depth == 0 {
          return Some(i);
        }
      }
      _ => {}
    }
  }
  None
}

fn normalize(obj: &Map<String, Value>) -> AssessmentResult {
  AssessmentResult {
    score: score_of(obj.get("score")),
    feedback: match obj.get("feedback") {
      Some(Value::String(s)) if !s.trim().is_empty() => s.clone(),
      _ => FALLBACK_FEEDBACK.to_string(),
    },
    correct_elements: string_list(obj.get("correctElements")),
    missed_elements: string_list(obj.get("missedElements")),
  }
}

fn score_of(v: Option<&Value>) -> u8 {
  let raw = match v {
    Some(Value::Number(n)) => n.as_f64(),
    Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
    _ => None,
  };
  match raw {
    Some(x) if x.is_finite() => x.round().clamp(0.0, 100.0) as u8,
    _ => 0,
  }
}

fn string_list(v: Option<&Value>) -> Vec<String> {
  let Some(Value::Array(items)) = v else { return Vec::new() };
  items
    .iter()
    .filter_map(|item| match item {
      Value::String(s) => Some(s.clone()),
      Value::Number(n) => Some(n.to_string()),
      Value::Bool(b) => Some(b.to_string()),
      _ => None,
    })
    .collect()
}
