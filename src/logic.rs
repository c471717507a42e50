//! Core behaviors shared by both HTTP and WebSocket handlers.
//!
//! This includes:
//!   - Starting a training run (config validation, lock check, spawning the driver)
//!   - Forwarding actions to a running session
//!   - Trainee progress with the per-level lock table
//!   - Listing persisted responses

use std::sync::Arc;

use tracing::{info, instrument};
use uuid::Uuid;

use crate::domain::{Level, SessionConfig, TrainingMode, Vertical};
use crate::engine::clock::TokioClock;
use crate::engine::selector::{QuestionSelector, RandomSampler};
use crate::engine::{Command, SessionDriver, SessionHandle, SessionMachine, SessionView};
use crate::error::{TrainerError, TrainerResult};
use crate::protocol::{ActionIn, LevelLockOut, ProgressOut, ResponsesOut, StartSessionIn};
use crate::state::AppState;

/// Validate the requested configuration and spawn the session task.
/// Locked levels are rejected here, before the store is asked to create anything.
#[instrument(level = "info", skip(state, req), fields(trainee_id = %req.trainee_id, mode = %req.mode, level = req.level, vertical = %req.vertical))]
pub async fn start_session(state: &AppState, req: StartSessionIn) -> TrainerResult<SessionHandle> {
  let mode: TrainingMode = req.mode.parse()?;
  let vertical: Vertical = req.vertical.parse()?;
  let level = Level::new(req.level)?;
  let timer = state
    .config
    .session
    .resolve(req.timer_duration_seconds)
    .map_err(TrainerError::InvalidConfig)?;

  let progress = state.store.trainee_progress(&req.trainee_id).await?;
  let config = SessionConfig::new(mode, level, vertical, timer, progress.highest_level_completed)?;

  let run_id = Uuid::new_v4().to_string();
  let machine = SessionMachine::new(
    run_id.clone(),
    config,
    progress,
    state.config.progression.levels.clone(),
    QuestionSelector::new(Box::new(RandomSampler::from_entropy())),
    Arc::new(TokioClock::new()),
  );
  let handle = SessionDriver::spawn(
    run_id.clone(),
    machine,
    state.oracle.clone(),
    state.store.clone(),
    state.config.session.idle_timeout(),
  );
  state.register_run(handle.clone()).await;

  info!(target: "spin_trainer_backend", %run_id, timer_seconds = timer, oracle = state.oracle.name(), "Training run started");
  Ok(handle)
}

#[instrument(level = "info", skip(state, action), fields(%run_id))]
pub async fn apply_action(state: &AppState, run_id: &str, action: ActionIn) -> TrainerResult<SessionView> {
  let handle = state.get_run(run_id).await?;
  handle.send(Command::from(action)).await
}

pub async fn session_view(state: &AppState, run_id: &str) -> TrainerResult<SessionView> {
  let handle = state.get_run(run_id).await?;
  handle.send(Command::Snapshot).await
}

/// Progress plus which levels are selectable and what it takes to leave each one.
#[instrument(level = "info", skip(state), fields(%trainee_id))]
pub async fn progress_with_levels(state: &AppState, trainee_id: &str) -> TrainerResult<ProgressOut> {
  let progress = state.store.trainee_progress(trainee_id).await?;
  let policy = &state.config.progression.levels;
  let levels = Level::all()
    .map(|level| LevelLockOut {
      level,
      prompt_type: level.prompt_type(),
      locked: level.is_locked(progress.highest_level_completed),
      xp_to_advance: policy.threshold_for(level),
    })
    .collect();
  Ok(ProgressOut { progress, levels })
}

#[instrument(level = "info", skip(state), fields(%session_id))]
pub async fn session_responses(state: &AppState, session_id: &str) -> TrainerResult<ResponsesOut> {
  let responses = state.store.responses(session_id).await?;
  Ok(ResponsesOut { session_id: session_id.to_string(), responses })
}
