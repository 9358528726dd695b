//! Public protocol structs for the HTTP endpoints (serde ready).
//! Keep this small and stable to evolve backend and frontend independently.

use serde::{Deserialize, Serialize};

use crate::assessment::AssessmentOutcome;
use crate::domain::AttemptFeedback;

/// Both fields default so that missing values surface as a validation error
/// instead of a body rejection.
#[derive(Debug, Deserialize)]
pub struct AssessIn {
  #[serde(rename = "verseId", default)]
  pub verse_id: String,
  #[serde(rename = "userTranslation", default)]
  pub user_translation: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssessData {
  pub feedback: AttemptFeedback,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub reference_translation: Option<String>,
}

/// `{ success, data?, error?, cached? }` envelope shared by every response.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
  pub success: bool,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub data: Option<T>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub error: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub cached: Option<bool>,
}

impl ApiResponse<AssessData> {
  pub fn assessed(outcome: AssessmentOutcome) -> Self {
    Self {
      success: true,
      data: Some(AssessData {
        feedback: outcome.feedback,
        reference_translation: outcome.reference_translation,
      }),
      error: None,
      cached: Some(outcome.cached),
    }
  }
}

impl<T> ApiResponse<T> {
  pub fn failure(message: impl Into<String>) -> Self {
    Self { success: false, data: None, error: Some(message.into()), cached: None }
  }
}

#[derive(Serialize)]
pub struct HealthOut {
  pub ok: bool,
  pub backend: &'static str,
  pub model: String,
}
