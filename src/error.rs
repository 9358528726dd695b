//! Error taxonomy for the assessment pipeline.
//!
//! Cache store failures (`StoreError`) never leave the cache module; every other
//! error surfaces at the HTTP boundary as `{ success: false, error }`.

use std::time::Duration;

use axum::http::StatusCode;

/// Upstream inference could not produce usable text.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
  /// Raised before any network call is attempted.
  #[error("{0}")]
  Config(String),

  #[error("Cannot connect to {backend} at {base_url}. Is it running?")]
  Unreachable { backend: &'static str, base_url: String },

  #[error("{backend} request timed out after {}", human_duration(.after))]
  Timeout { backend: &'static str, after: Duration },

  #[error("{backend} API error: {status} - {body}")]
  Http { backend: &'static str, status: u16, body: String },

  #[error("Empty response from {backend}")]
  EmptyResponse { backend: &'static str },

  #[error("{backend} request failed: {message}")]
  Transport { backend: &'static str, message: String },
}

/// Model text could not be coerced into an assessment after all recovery attempts.
#[derive(Debug, thiserror::Error)]
#[error("Failed to parse assessment response")]
pub struct ParseError {
  pub reason: String,
}

/// Which reference data was missing for a verse.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Missing {
  Analysis,
  Reference,
}

impl std::fmt::Display for Missing {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(match self {
      Missing::Analysis => "Verse analysis not available",
      Missing::Reference => "Reference translation not available",
    })
  }
}

#[derive(Debug, thiserror::Error)]
pub enum AssessError {
  #[error("{0}")]
  Validation(String),

  #[error("{0}")]
  NotFound(Missing),

  #[error(transparent)]
  Backend(#[from] BackendError),

  #[error(transparent)]
  Parse(#[from] ParseError),
}

impl AssessError {
  pub fn status_code(&self) -> StatusCode {
    match self {
      Self::Validation(_) => StatusCode::BAD_REQUEST,
      Self::NotFound(_) => StatusCode::NOT_FOUND,
      Self::Backend(_) | Self::Parse(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
  }
}

/// Cache store failure. Absorbed and logged by `AssessmentCache`.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
  #[error("store io error: {0}")]
  Io(#[from] std::io::Error),

  #[error("store encoding error: {0}")]
  Encoding(#[from] serde_json::Error),
}

fn human_duration(d: &Duration) -> String {
  let secs = d.as_secs();
  if secs >= 60 && secs % 60 == 0 {
    let mins = secs / 60;
    format!("{} minute{}", mins, if mins == 1 { "" } else { "s" })
  } else if secs > 0 {
    format!("{} second{}", secs, if secs == 1 { "" } else { "s" })
  } else {
    format!("{}ms", d.as_millis())
  }
}
