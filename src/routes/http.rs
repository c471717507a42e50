//! HTTP endpoint handlers. These are thin wrappers that forward to core logic.
//! Each handler is instrumented; errors map to a status code plus `{message, retryable}`.

use std::sync::Arc;
use axum::{
  extract::{Path, State},
  http::StatusCode,
  response::{IntoResponse, Response},
  Json,
};
use tracing::{info, instrument, warn};

use crate::engine::Command;
use crate::error::{TrainerError, TrainerResult};
use crate::logic::*;
use crate::protocol::*;
use crate::state::AppState;

impl TrainerError {
  pub fn status_code(&self) -> StatusCode {
    match self {
      TrainerError::TransientIo { .. } => StatusCode::SERVICE_UNAVAILABLE,
      TrainerError::InvalidConfig(_) => StatusCode::BAD_REQUEST,
      TrainerError::TimerInvariant(_) => StatusCode::INTERNAL_SERVER_ERROR,
      TrainerError::InvalidAction { .. } => StatusCode::CONFLICT,
      TrainerError::SessionEnded => StatusCode::GONE,
      TrainerError::NotFound(_) => StatusCode::NOT_FOUND,
    }
  }
}

impl IntoResponse for TrainerError {
  fn into_response(self) -> Response {
    let status = self.status_code();
    if status.is_server_error() {
      warn!(target: "spin_trainer_backend", %status, error = %self, "Request failed");
    }
    (status, Json(ErrorOut { message: self.to_string(), retryable: self.is_retryable() })).into_response()
  }
}

#[instrument(level = "info")]
pub async fn http_health() -> impl IntoResponse { Json(HealthOut { ok: true }) }

#[instrument(level = "info", skip(state))]
pub async fn http_get_progress(
  State(state): State<Arc<AppState>>,
  Path(trainee_id): Path<String>,
) -> TrainerResult<Json<ProgressOut>> {
  let out = progress_with_levels(&state, &trainee_id).await?;
  Ok(Json(out))
}

#[instrument(level = "info", skip(state, body), fields(trainee_id = %body.trainee_id, level = body.level))]
pub async fn http_post_session(
  State(state): State<Arc<AppState>>,
  Json(body): Json<StartSessionIn>,
) -> TrainerResult<impl IntoResponse> {
  let handle = start_session(&state, body).await?;
  let view = handle.send(Command::Snapshot).await?;
  info!(target: "spin_trainer_backend", run_id = %view.run_id, "HTTP session started");
  Ok((StatusCode::CREATED, Json(view)))
}

#[instrument(level = "info", skip(state))]
pub async fn http_get_session(
  State(state): State<Arc<AppState>>,
  Path(run_id): Path<String>,
) -> TrainerResult<impl IntoResponse> {
  Ok(Json(session_view(&state, &run_id).await?))
}

#[instrument(level = "info", skip(state, body))]
pub async fn http_post_action(
  State(state): State<Arc<AppState>>,
  Path(run_id): Path<String>,
  Json(body): Json<ActionIn>,
) -> TrainerResult<impl IntoResponse> {
  let view = apply_action(&state, &run_id, body).await?;
  info!(target: "spin_trainer_backend", %run_id, phase = %view.phase, "HTTP action applied");
  Ok(Json(view))
}

#[instrument(level = "info", skip(state))]
pub async fn http_get_responses(
  State(state): State<Arc<AppState>>,
  Path(session_id): Path<String>,
) -> TrainerResult<Json<ResponsesOut>> {
  Ok(Json(session_responses(&state, &session_id).await?))
}
