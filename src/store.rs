//! Persistence seam and the in-memory store.
//!
//! The store is authoritative for XP per response and for leveling/streak on
//! session completion. Both writes are idempotent so the engine can retry them.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::domain::{
  CompletionOutcome, Grade, GradingResult, Level, PromptType, SpinType, TraineeProgress, TrainingMode, Vertical,
};
use crate::engine::grade::{grade, LevelPolicy, XpPolicy};
use crate::error::{TrainerError, TrainerResult};

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewSession {
  pub trainee_id: String,
  pub mode: TrainingMode,
  pub level: Level,
  pub timer_duration_seconds: u32,
  pub vertical: Vertical,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseRecord {
  pub session_id: String,
  pub question_number: u32,
  pub prompt_type: PromptType,
  pub context: String,
  pub expected_type: SpinType,
  pub response: String,
  pub response_time_ms: u64,
  pub result: GradingResult,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredResponse {
  #[serde(flatten)]
  pub record: ResponseRecord,
  pub xp_awarded: u32,
}

#[async_trait]
pub trait SessionStore: Send + Sync {
  async fn trainee_progress(&self, trainee_id: &str) -> TrainerResult<TraineeProgress>;

  async fn create_session(&self, req: &NewSession) -> TrainerResult<String>;

  /// Returns the XP awarded for this response.
  async fn persist_response(&self, record: &ResponseRecord) -> TrainerResult<u32>;

  /// Close the session, aggregating only the `counted` question numbers.
  /// Stored responses outside that list were abandoned and are discarded.
  async fn complete_session(&self, session_id: &str, counted: &[u32]) -> TrainerResult<CompletionOutcome>;

  /// Persisted responses ordered by question number.
  async fn responses(&self, session_id: &str) -> TrainerResult<Vec<StoredResponse>>;
}

#[derive(Clone, Debug)]
struct SessionRow {
  trainee_id: String,
  request: NewSession,
  outcome: Option<CompletionOutcome>,
}

#[derive(Clone)]
pub struct InMemoryStore {
  trainees: Arc<RwLock<HashMap<String, TraineeProgress>>>,
  sessions: Arc<RwLock<HashMap<String, SessionRow>>>,
  responses: Arc<RwLock<HashMap<(String, u32), StoredResponse>>>,
  xp: XpPolicy,
  levels: LevelPolicy,
}

impl InMemoryStore {
  pub fn new(xp: XpPolicy, levels: LevelPolicy) -> Self {
    Self {
      trainees: Arc::new(RwLock::new(HashMap::new())),
      sessions: Arc::new(RwLock::new(HashMap::new())),
      responses: Arc::new(RwLock::new(HashMap::new())),
      xp,
      levels,
    }
  }

  /// Overwrite a trainee's progress (seeding and tests).
  #[allow(dead_code)]
  pub async fn put_progress(&self, progress: TraineeProgress) {
    self.trainees.write().await.insert(progress.trainee_id.clone(), progress);
  }

  async fn progress_or_default(&self, trainee_id: &str) -> TraineeProgress {
    self.trainees
      .read()
      .await
      .get(trainee_id)
      .cloned()
      .unwrap_or_else(|| TraineeProgress::new(trainee_id))
  }
}

impl Default for InMemoryStore {
  fn default() -> Self { Self::new(XpPolicy::default(), LevelPolicy::default()) }
}

#[async_trait]
impl SessionStore for InMemoryStore {
  async fn trainee_progress(&self, trainee_id: &str) -> TrainerResult<TraineeProgress> {
    Ok(self.progress_or_default(trainee_id).await)
  }

  #[instrument(level = "info", skip(self, req), fields(trainee_id = %req.trainee_id, level = %req.level, mode = %req.mode))]
  async fn create_session(&self, req: &NewSession) -> TrainerResult<String> {
    let progress = self.progress_or_default(&req.trainee_id).await;
    if req.level.is_locked(progress.highest_level_completed) {
      warn!(target: "trainer", trainee_id = %req.trainee_id, level = %req.level, "Rejected locked level");
      return Err(TrainerError::InvalidConfig(format!("level {} is locked", req.level)));
    }
    let id = Uuid::new_v4().to_string();
    self.sessions.write().await.insert(
      id.clone(),
      SessionRow { trainee_id: req.trainee_id.clone(), request: req.clone(), outcome: None },
    );
    self.trainees.write().await.entry(req.trainee_id.clone()).or_insert(progress);
    info!(target: "trainer", session_id = %id, "Session created");
    Ok(id)
  }

  #[instrument(level = "info", skip(self, record), fields(session_id = %record.session_id, question = record.question_number))]
  async fn persist_response(&self, record: &ResponseRecord) -> TrainerResult<u32> {
    let trainee_id = {
      let sessions = self.sessions.read().await;
      let row = sessions
        .get(&record.session_id)
        .ok_or_else(|| TrainerError::NotFound(format!("session {}", record.session_id)))?;
      if row.outcome.is_some() {
        return Err(TrainerError::SessionEnded);
      }
      row.trainee_id.clone()
    };
    let key = (record.session_id.clone(), record.question_number);
    let mut responses = self.responses.write().await;
    if let Some(existing) = responses.get(&key) {
      return Ok(existing.xp_awarded);
    }
    let streak = self.progress_or_default(&trainee_id).await.streak;
    let xp_awarded = self.xp.award(record.result.overall_score, streak);
    responses.insert(key, StoredResponse { record: record.clone(), xp_awarded });
    Ok(xp_awarded)
  }

  #[instrument(level = "info", skip(self, counted), fields(counted = counted.len()))]
  async fn complete_session(&self, session_id: &str, counted: &[u32]) -> TrainerResult<CompletionOutcome> {
    let mut sessions = self.sessions.write().await;
    let row = sessions
      .get_mut(session_id)
      .ok_or_else(|| TrainerError::NotFound(format!("session {session_id}")))?;
    if let Some(done) = &row.outcome {
      return Ok(done.clone());
    }

    let (answered, score_sum, xp_sum) = {
      let mut responses = self.responses.write().await;
      let before = responses.len();
      responses.retain(|(sid, n), _| sid != session_id || counted.contains(n));
      if responses.len() != before {
        debug!(target: "trainer", %session_id, discarded = before - responses.len(), "Dropped abandoned responses");
      }
      responses
        .values()
        .filter(|r| r.record.session_id == session_id)
        .fold((0u32, 0f32, 0u32), |(n, s, x), r| (n + 1, s + r.record.result.overall_score, x + r.xp_awarded))
    };
    let overall_grade = if answered == 0 { Grade::D } else { grade(score_sum / answered as f32) };

    let mut trainees = self.trainees.write().await;
    let progress = trainees
      .entry(row.trainee_id.clone())
      .or_insert_with(|| TraineeProgress::new(row.trainee_id.clone()));
    progress.total_xp = progress.total_xp.saturating_add(xp_sum);
    progress.streak = if answered > 0 && overall_grade != Grade::D { progress.streak + 1 } else { 0 };

    let new_level = self.levels.level_up(progress.current_level, progress.total_xp);
    if let Some(next) = new_level {
      progress.highest_level_completed = progress.highest_level_completed.max(progress.current_level.get());
      progress.current_level = next;
    }

    let outcome = CompletionOutcome {
      leveled_up: new_level.is_some(),
      new_level,
      streak: progress.streak,
      overall_grade,
    };
    info!(target: "trainer", %session_id, mode = %row.request.mode, answered, xp = xp_sum, leveled_up = outcome.leveled_up, streak = outcome.streak, "Session completed");
    row.outcome = Some(outcome.clone());
    Ok(outcome)
  }

  async fn responses(&self, session_id: &str) -> TrainerResult<Vec<StoredResponse>> {
    if !self.sessions.read().await.contains_key(session_id) {
      return Err(TrainerError::NotFound(format!("session {session_id}")));
    }
    let mut out: Vec<StoredResponse> = self
      .responses
      .read()
      .await
      .values()
      .filter(|r| r.record.session_id == session_id)
      .cloned()
      .collect();
    out.sort_by_key(|r| r.record.question_number);
    Ok(out)
  }
}
