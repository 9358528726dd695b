//! HTTP endpoint handlers. These are thin wrappers that forward to the assessor.
//! Each handler is instrumented and logs basic request and result info.

use std::sync::Arc;

use axum::{extract::rejection::JsonRejection, extract::State, http::StatusCode, response::IntoResponse, Json};
use tracing::{error, info, instrument, warn};

use crate::error::AssessError;
use crate::protocol::*;
use crate::state::AppState;

#[instrument(level = "info", skip(state))]
pub async fn http_health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
  let d = state.assessor.backend();
  Json(HealthOut { ok: true, backend: d.label, model: d.model })
}

#[instrument(level = "info", skip(state, body))]
pub async fn http_post_assess(
  State(state): State<Arc<AppState>>,
  body: Result<Json<AssessIn>, JsonRejection>,
) -> impl IntoResponse {
  let Json(body) = match body {
    Ok(body) => body,
    Err(rejection) => {
      warn!(target: "assessment", error = %rejection.body_text(), "Rejected assessment body");
      return (StatusCode::BAD_REQUEST, Json(ApiResponse::<AssessData>::failure("Invalid JSON body")));
    }
  };

  match state.assessor.assess(&body.verse_id, &body.user_translation).await {
    Ok(outcome) => {
      info!(target: "assessment", verse_id = %body.verse_id, cached = outcome.cached, score = outcome.feedback.overall_score, "HTTP assessment served");
      (StatusCode::OK, Json(ApiResponse::assessed(outcome)))
    }
    Err(e) => {
      let status = e.status_code();
      match &e {
        AssessError::Parse(p) => {
          error!(target: "assessment", verse_id = %body.verse_id, reason = %p.reason, "Model output unusable")
        }
        AssessError::Backend(_) => {
          error!(target: "assessment", verse_id = %body.verse_id, error = %e, "Assessment failed upstream")
        }
        _ => info!(target: "assessment", verse_id = %body.verse_id, %status, error = %e, "Assessment rejected"),
      }
      (status, Json(ApiResponse::failure(e.to_string())))
    }
  }
}
