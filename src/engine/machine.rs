//! Session state machine.
//!
//! `loading → question → grading → feedback → loading … → break → complete`
//!
//! The machine never awaits. Every input (user action, tick, I/O outcome)
//! goes through one `&mut self` method and returns the `Effect`s the driver
//! must perform. I/O effects carry the generation token current when they were
//! issued; outcomes whose token no longer matches, or that arrive in a phase
//! that does not expect them, are dropped.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::domain::{
  CompletionOutcome, GradingResult, PromptType, Scenario, SessionConfig, SessionStats, SpinType, TraineeProgress,
  TrainingMode,
};
use crate::engine::clock::Clock;
use crate::engine::grade::LevelPolicy;
use crate::engine::selector::{QuestionPlan, QuestionSelector};
use crate::engine::summary::SessionSummary;
use crate::engine::timer::{ResponseTick, ResponseTimer, SessionTick, SessionTimer};
use crate::error::{TrainerError, TrainerResult};
use crate::oracle::{prompt_context, GradeRequest, ScenarioRequest, TIMEOUT_SENTINEL};
use crate::store::{NewSession, ResponseRecord};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
  Loading,
  Question,
  Grading,
  Feedback,
  Break,
  Complete,
}

impl std::fmt::Display for SessionPhase {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    let s = match self {
      SessionPhase::Loading => "loading",
      SessionPhase::Question => "question",
      SessionPhase::Grading => "grading",
      SessionPhase::Feedback => "feedback",
      SessionPhase::Break => "break",
      SessionPhase::Complete => "complete",
    };
    write!(f, "{s}")
  }
}

/// What `loading` is waiting for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum LoadStep {
  CreatingSession,
  FetchingScenario,
}

/// Work the driver performs on behalf of the machine.
#[derive(Clone, Debug, PartialEq)]
pub enum Effect {
  CreateSession { generation: u64, request: NewSession },
  GenerateScenario { generation: u64, request: ScenarioRequest },
  GradeResponse { generation: u64, request: GradeRequest },
  PersistResponse { generation: u64, record: ResponseRecord },
  /// `counted` lists the question numbers that made it into the session stats.
  CompleteSession { generation: u64, session_id: String, counted: Vec<u32> },
  Notify(SessionEvent),
}

/// Pushed to whoever is watching the session.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
  View { view: Box<SessionView> },
  ResponseTick { remaining: u32 },
  SessionTick { remaining: u32 },
  TimedOut { auto_answer: String },
  Summary { summary: SessionSummary },
  Error { message: String, retryable: bool },
}

/// The answer currently being graded. Kept until it is counted so a retry never
/// needs the trainee to retype it.
#[derive(Clone, Debug, PartialEq)]
struct PendingAnswer {
  answer: String,
  response_time_ms: u64,
  timed_out: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScenarioView {
  pub scenario_context: String,
  pub prospect_statement: String,
  pub prospect_persona: Option<String>,
  pub sample_question: Option<String>,
  pub hints: Vec<String>,
  /// Revealed in feedback only.
  pub expected_type: Option<SpinType>,
  pub correct_answer: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorView {
  pub message: String,
  pub retryable: bool,
}

/// Read-only snapshot for UIs.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionView {
  pub run_id: String,
  pub session_id: Option<String>,
  pub phase: SessionPhase,
  pub paused: bool,
  pub config: SessionConfig,
  pub question_number: u32,
  pub prompt_type: Option<PromptType>,
  pub scenario: Option<ScenarioView>,
  pub response_remaining: Option<u32>,
  pub session_remaining: Option<u32>,
  pub stats: SessionStats,
  pub result: Option<GradingResult>,
  pub xp_awarded: Option<u32>,
  pub pending_answer: Option<String>,
  pub error: Option<ErrorView>,
  pub summary: Option<SessionSummary>,
}

pub struct SessionMachine {
  run_id: String,
  config: SessionConfig,
  progress: TraineeProgress,
  levels: LevelPolicy,
  selector: QuestionSelector,
  clock: Arc<dyn Clock>,

  phase: SessionPhase,
  load_step: LoadStep,
  paused: bool,
  generation: u64,
  in_flight: bool,
  last_error: Option<TrainerError>,

  session_id: Option<String>,
  question_number: u32,
  plan: Option<QuestionPlan>,
  scenario: Option<Scenario>,
  question_started_ms: u64,
  paused_at_ms: Option<u64>,
  paused_ms: u64,
  draft: String,
  pending: Option<PendingAnswer>,
  graded: Option<GradingResult>,
  result: Option<GradingResult>,
  xp_awarded: Option<u32>,

  stats: SessionStats,
  counted: Vec<u32>,
  response_timer: ResponseTimer,
  session_timer: SessionTimer,
  summary: Option<SessionSummary>,
}

impl SessionMachine {
  pub fn new(
    run_id: impl Into<String>,
    config: SessionConfig,
    progress: TraineeProgress,
    levels: LevelPolicy,
    selector: QuestionSelector,
    clock: Arc<dyn Clock>,
  ) -> Self {
    Self {
      run_id: run_id.into(),
      config,
      progress,
      levels,
      selector,
      clock,
      phase: SessionPhase::Loading,
      load_step: LoadStep::CreatingSession,
      paused: false,
      generation: 0,
      in_flight: false,
      last_error: None,
      session_id: None,
      question_number: 0,
      plan: None,
      scenario: None,
      question_started_ms: 0,
      paused_at_ms: None,
      paused_ms: 0,
      draft: String::new(),
      pending: None,
      graded: None,
      result: None,
      xp_awarded: None,
      stats: SessionStats::default(),
      counted: Vec::new(),
      response_timer: ResponseTimer::new(),
      session_timer: SessionTimer::new(),
      summary: None,
    }
  }

  pub fn phase(&self) -> SessionPhase { self.phase }

  pub fn generation(&self) -> u64 { self.generation }

  pub fn stats(&self) -> &SessionStats { &self.stats }

  pub fn is_terminal(&self) -> bool { self.phase == SessionPhase::Complete }

  /// Nothing will move the session forward without the trainee: it is on a
  /// break or paused.
  pub fn is_parked(&self) -> bool {
    !self.is_terminal() && (self.phase == SessionPhase::Break || self.paused)
  }

  /// Kick off the first session: ask the store for a session id.
  pub fn start(&mut self) -> Vec<Effect> {
    self.generation += 1;
    self.begin_session_creation()
  }

  // ---- user actions ----

  pub fn update_draft(&mut self, text: String) -> TrainerResult<Vec<Effect>> {
    self.guard("update_draft")?;
    self.require(SessionPhase::Question, "update_draft")?;
    self.draft = text;
    Ok(Vec::new())
  }

  pub fn submit(&mut self, answer: String) -> TrainerResult<Vec<Effect>> {
    self.guard("submit")?;
    self.require(SessionPhase::Question, "submit")?;
    Ok(self.submit_answer(answer, false))
  }

  pub fn next_question(&mut self) -> TrainerResult<Vec<Effect>> {
    self.guard("next_question")?;
    self.require(SessionPhase::Feedback, "next_question")?;
    Ok(self.begin_question_load())
  }

  /// Re-issue the failed request for the current phase with the same payload.
  pub fn retry(&mut self) -> TrainerResult<Vec<Effect>> {
    self.guard("retry")?;
    if self.in_flight || self.last_error.is_none() {
      return Err(self.invalid("retry"));
    }
    let effect = match self.phase {
      SessionPhase::Loading => match self.load_step {
        LoadStep::CreatingSession => self.create_session_effect(),
        LoadStep::FetchingScenario => self.generate_effect(),
      },
      SessionPhase::Grading => match &self.graded {
        Some(result) => self.persist_effect(result.clone()),
        None => self.grade_effect(),
      },
      SessionPhase::Break => self.complete_effect(),
      _ => None,
    };
    let Some(effect) = effect else {
      return Err(self.invalid("retry"));
    };
    self.last_error = None;
    info!(target: "trainer", run_id = %self.run_id, phase = %self.phase, question = self.question_number, "Retrying request");
    self.in_flight = true;
    let mut out = vec![effect];
    self.push_view(&mut out);
    Ok(out)
  }

  pub fn pause(&mut self) -> TrainerResult<Vec<Effect>> {
    self.guard("pause")?;
    if self.phase == SessionPhase::Break {
      return Err(self.invalid("pause"));
    }
    self.paused = true;
    self.paused_at_ms = Some(self.clock.now_ms());
    self.session_timer.pause();
    info!(target: "trainer", run_id = %self.run_id, phase = %self.phase, "Session paused");
    let mut out = Vec::new();
    self.push_view(&mut out);
    Ok(out)
  }

  pub fn resume(&mut self) -> TrainerResult<Vec<Effect>> {
    if self.is_terminal() {
      return Err(TrainerError::SessionEnded);
    }
    if !self.paused {
      return Err(self.invalid("resume"));
    }
    self.paused = false;
    if let Some(at) = self.paused_at_ms.take() {
      self.paused_ms += self.clock.now_ms().saturating_sub(at);
    }
    self.session_timer.resume();
    info!(target: "trainer", run_id = %self.run_id, phase = %self.phase, "Session resumed");
    let mut out = Vec::new();
    self.push_view(&mut out);
    Ok(out)
  }

  /// `break → loading` with a brand-new session and zeroed stats. Only once
  /// the finished session has been completed by the store.
  pub fn continue_training(&mut self) -> TrainerResult<Vec<Effect>> {
    self.guard("continue_training")?;
    self.require(SessionPhase::Break, "continue_training")?;
    self.require_completion_settled("continue_training")?;
    self.generation += 1;
    self.stats = SessionStats::default();
    self.counted.clear();
    self.question_number = 0;
    self.summary = None;
    self.session_id = None;
    self.last_error = None;
    info!(target: "trainer", run_id = %self.run_id, "Continuing training with a new session");
    Ok(self.begin_session_creation())
  }

  /// `break → complete`. Terminal. Same completion requirement as
  /// `continue_training`.
  pub fn end_session(&mut self) -> TrainerResult<Vec<Effect>> {
    self.guard("end_session")?;
    self.require(SessionPhase::Break, "end_session")?;
    self.require_completion_settled("end_session")?;
    self.finish();
    info!(target: "trainer", run_id = %self.run_id, "Session ended");
    let mut out = Vec::new();
    self.push_view(&mut out);
    Ok(out)
  }

  /// The trainee backed out. Cancels both timers; nothing in flight will be applied.
  pub fn abandon(&mut self) -> TrainerResult<Vec<Effect>> {
    if self.is_terminal() {
      return Err(TrainerError::SessionEnded);
    }
    info!(target: "trainer", run_id = %self.run_id, phase = %self.phase, question = self.question_number, "Session abandoned");
    self.finish();
    let mut out = Vec::new();
    self.push_view(&mut out);
    Ok(out)
  }

  /// Nobody has touched a parked session for the idle timeout.
  ///
  /// On a break the session ends once its completion is settled; a failed
  /// completion is retried first and an outstanding one is waited for. A
  /// paused session is abandoned.
  pub fn expire_idle(&mut self) -> Vec<Effect> {
    if !self.is_parked() {
      return Vec::new();
    }
    if self.phase != SessionPhase::Break {
      info!(target: "trainer", run_id = %self.run_id, phase = %self.phase, "Paused session idle; abandoning");
      return self.abandon().unwrap_or_default();
    }
    if self.completion_settled() {
      info!(target: "trainer", run_id = %self.run_id, "Break idle; ending session");
      return self.end_session().unwrap_or_default();
    }
    if self.in_flight {
      return Vec::new();
    }
    self.retry().unwrap_or_default()
  }

  // ---- time ----

  /// One second elapsed. The session timer is consulted first so its
  /// completion preempts whatever the question was doing.
  pub fn on_tick(&mut self) -> Vec<Effect> {
    let mut out = Vec::new();
    if self.is_terminal() || self.paused {
      return out;
    }
    match self.session_timer.tick() {
      Some(SessionTick::Completed) => return self.enter_break(),
      Some(SessionTick::Remaining(remaining)) => out.push(Effect::Notify(SessionEvent::SessionTick { remaining })),
      None => {}
    }
    if self.phase != SessionPhase::Question {
      return out;
    }
    match self.response_timer.tick() {
      Some(ResponseTick::Remaining(remaining)) => out.push(Effect::Notify(SessionEvent::ResponseTick { remaining })),
      Some(ResponseTick::TimedOut) => {
        let auto_answer = self.auto_answer();
        info!(target: "trainer", run_id = %self.run_id, question = self.question_number, "Response timer expired; auto-submitting");
        out.push(Effect::Notify(SessionEvent::TimedOut { auto_answer: auto_answer.clone() }));
        out.extend(self.submit_answer(auto_answer, true));
      }
      None => {}
    }
    out
  }

  // ---- I/O outcomes ----

  pub fn on_session_created(&mut self, generation: u64, outcome: TrainerResult<String>) -> Vec<Effect> {
    if !self.accepts(generation, SessionPhase::Loading, "createSession") || self.load_step != LoadStep::CreatingSession {
      return Vec::new();
    }
    self.in_flight = false;
    match outcome {
      Err(e) => self.fail(e),
      Ok(session_id) => {
        info!(target: "trainer", run_id = %self.run_id, %session_id, "Session started");
        self.session_id = Some(session_id);
        self.session_timer.start(self.config.timer_duration_seconds);
        if self.paused {
          self.session_timer.pause();
        }
        self.begin_question_load()
      }
    }
  }

  pub fn on_scenario(&mut self, generation: u64, outcome: TrainerResult<Scenario>) -> Vec<Effect> {
    if !self.accepts(generation, SessionPhase::Loading, "generateScenario") || self.load_step != LoadStep::FetchingScenario {
      return Vec::new();
    }
    self.in_flight = false;
    match outcome {
      Err(e) => self.fail(e),
      Ok(scenario) => {
        self.scenario = Some(scenario);
        self.phase = SessionPhase::Question;
        self.question_started_ms = self.clock.now_ms();
        self.paused_ms = 0;
        self.paused_at_ms = self.paused.then_some(self.question_started_ms);
        // The countdown starts only once the scenario is in hand.
        self.response_timer.start(self.config.mode);
        debug!(target: "trainer", run_id = %self.run_id, question = self.question_number, "Question presented");
        let mut out = Vec::new();
        self.push_view(&mut out);
        out
      }
    }
  }

  pub fn on_graded(&mut self, generation: u64, outcome: TrainerResult<GradingResult>) -> Vec<Effect> {
    if !self.accepts(generation, SessionPhase::Grading, "gradeResponse") || self.graded.is_some() {
      return Vec::new();
    }
    match outcome {
      Err(e) => {
        self.in_flight = false;
        self.fail(e)
      }
      Ok(result) => {
        self.in_flight = true;
        self.graded = Some(result.clone());
        self.persist_effect(result).into_iter().collect()
      }
    }
  }

  /// `grading → feedback`: the grade and the stats increment land together.
  pub fn on_persisted(&mut self, generation: u64, outcome: TrainerResult<u32>) -> Vec<Effect> {
    if !self.accepts(generation, SessionPhase::Grading, "persistResponse") || self.graded.is_none() {
      return Vec::new();
    }
    self.in_flight = false;
    match outcome {
      Err(e) => self.fail(e),
      Ok(xp) => {
        let Some(result) = self.graded.take() else {
          return Vec::new();
        };
        self.stats.questions_answered += 1;
        if result.type_correct {
          self.stats.correct_answers += 1;
        }
        self.stats.total_xp = self.stats.total_xp.saturating_add(xp);
        self.stats.total_score += result.overall_score;
        self.counted.push(self.question_number);
        let timed_out = self.pending.as_ref().is_some_and(|p| p.timed_out);
        info!(
          target: "trainer",
          run_id = %self.run_id,
          question = self.question_number,
          timed_out,
          grade = %result.grade,
          score = %format!("{:.1}", result.overall_score),
          xp,
          "Response graded"
        );
        self.result = Some(result);
        self.xp_awarded = Some(xp);
        self.pending = None;
        self.phase = SessionPhase::Feedback;
        let mut out = Vec::new();
        self.push_view(&mut out);
        out
      }
    }
  }

  /// The server's completion outcome overrides the local leveling guess.
  pub fn on_session_completed(&mut self, generation: u64, outcome: TrainerResult<CompletionOutcome>) -> Vec<Effect> {
    if !self.accepts(generation, SessionPhase::Break, "completeSession") {
      return Vec::new();
    }
    self.in_flight = false;
    match outcome {
      Err(e) => self.fail(e),
      Ok(outcome) => {
        self.progress.total_xp = self.progress.total_xp.saturating_add(self.stats.total_xp);
        self.progress.streak = outcome.streak;
        if let (true, Some(level)) = (outcome.leveled_up, outcome.new_level) {
          self.progress.highest_level_completed =
            self.progress.highest_level_completed.max(self.progress.current_level.get());
          self.progress.current_level = level;
        }
        let mut out = Vec::new();
        if let Some(summary) = self.summary.as_mut() {
          summary.reconcile(&outcome);
          out.push(Effect::Notify(SessionEvent::Summary { summary: summary.clone() }));
        }
        self.push_view(&mut out);
        out
      }
    }
  }

  // ---- view ----

  pub fn view(&self) -> SessionView {
    let reveal = self.phase == SessionPhase::Feedback;
    SessionView {
      run_id: self.run_id.clone(),
      session_id: self.session_id.clone(),
      phase: self.phase,
      paused: self.paused,
      config: self.config.clone(),
      question_number: self.question_number,
      prompt_type: self.plan.map(|p| p.prompt_type),
      scenario: self.scenario.as_ref().map(|s| ScenarioView {
        scenario_context: s.scenario_context.clone(),
        prospect_statement: s.prospect_statement.clone(),
        prospect_persona: s.prospect_persona.clone(),
        sample_question: s.sample_question.clone(),
        hints: s.hints.clone(),
        expected_type: reveal.then_some(s.expected_type),
        correct_answer: if reveal { s.correct_answer.clone() } else { None },
      }),
      response_remaining: if self.phase == SessionPhase::Question { self.response_timer.remaining() } else { None },
      session_remaining: self.session_timer.remaining(),
      stats: self.stats,
      result: self.result.clone(),
      xp_awarded: self.xp_awarded,
      pending_answer: self.pending.as_ref().map(|p| p.answer.clone()),
      error: self.last_error.as_ref().map(|e| ErrorView { message: e.to_string(), retryable: e.is_retryable() }),
      summary: self.summary.clone(),
    }
  }

  // ---- internals ----

  fn guard(&self, action: &'static str) -> TrainerResult<()> {
    if self.is_terminal() {
      return Err(TrainerError::SessionEnded);
    }
    if self.paused {
      return Err(TrainerError::InvalidAction { phase: "paused".into(), action });
    }
    Ok(())
  }

  fn require(&self, phase: SessionPhase, action: &'static str) -> TrainerResult<()> {
    if self.phase == phase { Ok(()) } else { Err(self.invalid(action)) }
  }

  /// The store has answered `completeSession`, or failed in a way a retry
  /// cannot fix.
  fn completion_settled(&self) -> bool {
    if self.summary.as_ref().is_some_and(|s| s.reconciled) {
      return true;
    }
    !self.in_flight && self.last_error.as_ref().is_some_and(|e| !e.is_retryable())
  }

  fn require_completion_settled(&self, action: &'static str) -> TrainerResult<()> {
    if self.completion_settled() {
      return Ok(());
    }
    Err(TrainerError::InvalidAction { phase: "completing session".into(), action })
  }

  fn invalid(&self, action: &'static str) -> TrainerError {
    TrainerError::InvalidAction { phase: self.phase.to_string(), action }
  }

  fn accepts(&self, generation: u64, phase: SessionPhase, what: &str) -> bool {
    if generation != self.generation || self.phase != phase {
      debug!(
        target: "trainer",
        run_id = %self.run_id,
        what,
        generation,
        current = self.generation,
        phase = %self.phase,
        "Discarding stale result"
      );
      return false;
    }
    true
  }

  fn fail(&mut self, e: TrainerError) -> Vec<Effect> {
    warn!(target: "trainer", run_id = %self.run_id, phase = %self.phase, error = %e, "Request failed");
    let mut out = vec![Effect::Notify(SessionEvent::Error { message: e.to_string(), retryable: e.is_retryable() })];
    self.last_error = Some(e);
    self.push_view(&mut out);
    out
  }

  fn push_view(&self, out: &mut Vec<Effect>) {
    out.push(Effect::Notify(SessionEvent::View { view: Box::new(self.view()) }));
  }

  fn begin_session_creation(&mut self) -> Vec<Effect> {
    self.phase = SessionPhase::Loading;
    self.load_step = LoadStep::CreatingSession;
    self.in_flight = true;
    let mut out: Vec<Effect> = self.create_session_effect().into_iter().collect();
    self.push_view(&mut out);
    out
  }

  /// Enter `loading` for the next question number. Discards the previous
  /// scenario and grade.
  fn begin_question_load(&mut self) -> Vec<Effect> {
    self.generation += 1;
    self.question_number += 1;
    self.plan = Some(self.selector.select(self.config.level, self.config.mode));
    self.scenario = None;
    self.result = None;
    self.xp_awarded = None;
    self.pending = None;
    self.graded = None;
    self.draft.clear();
    self.last_error = None;
    self.response_timer.stop();
    self.phase = SessionPhase::Loading;
    self.load_step = LoadStep::FetchingScenario;
    self.in_flight = true;
    let mut out: Vec<Effect> = self.generate_effect().into_iter().collect();
    self.push_view(&mut out);
    out
  }

  fn submit_answer(&mut self, answer: String, timed_out: bool) -> Vec<Effect> {
    self.response_timer.stop();
    let response_time_ms =
      self.clock.now_ms().saturating_sub(self.question_started_ms).saturating_sub(self.paused_ms);
    debug!(target: "trainer", run_id = %self.run_id, question = self.question_number, answer_len = answer.len(), timed_out, response_time_ms, "Answer submitted");
    self.pending = Some(PendingAnswer { answer, response_time_ms, timed_out });
    self.phase = SessionPhase::Grading;
    self.in_flight = true;
    let mut out: Vec<Effect> = self.grade_effect().into_iter().collect();
    self.push_view(&mut out);
    out
  }

  /// Timeout value: practice keeps a typed draft; otherwise an empty answer for
  /// identify prompts and the sentinel for craft prompts.
  fn auto_answer(&self) -> String {
    if self.config.mode == TrainingMode::Practice && !self.draft.trim().is_empty() {
      return self.draft.clone();
    }
    match self.plan.map(|p| p.prompt_type) {
      Some(t) if t.is_craft() => TIMEOUT_SENTINEL.to_string(),
      _ => String::new(),
    }
  }

  /// Session timer expired: abandon the in-flight question and summarize.
  fn enter_break(&mut self) -> Vec<Effect> {
    self.generation += 1;
    self.response_timer.stop();
    self.session_timer.stop();
    if self.phase != SessionPhase::Feedback {
      debug!(target: "trainer", run_id = %self.run_id, question = self.question_number, phase = %self.phase, "Abandoning in-flight question at break");
    }
    self.scenario = None;
    self.pending = None;
    self.graded = None;
    self.result = None;
    self.xp_awarded = None;
    self.draft.clear();
    self.last_error = None;
    self.phase = SessionPhase::Break;

    let session_id = self.session_id.clone().unwrap_or_default();
    let summary = SessionSummary::project(&session_id, &self.stats, &self.progress, &self.levels);
    info!(
      target: "trainer",
      run_id = %self.run_id,
      %session_id,
      answered = summary.questions_answered,
      xp = summary.xp_earned,
      grade = %summary.grade,
      "Session timer complete; break"
    );
    self.summary = Some(summary.clone());
    self.in_flight = true;
    let mut out: Vec<Effect> = self.complete_effect().into_iter().collect();
    out.push(Effect::Notify(SessionEvent::Summary { summary }));
    self.push_view(&mut out);
    out
  }

  fn finish(&mut self) {
    self.generation += 1;
    self.response_timer.stop();
    self.session_timer.stop();
    self.in_flight = false;
    self.paused = false;
    self.paused_at_ms = None;
    self.phase = SessionPhase::Complete;
  }

  fn create_session_effect(&self) -> Option<Effect> {
    Some(Effect::CreateSession {
      generation: self.generation,
      request: NewSession {
        trainee_id: self.progress.trainee_id.clone(),
        mode: self.config.mode,
        level: self.config.level,
        timer_duration_seconds: self.config.timer_duration_seconds,
        vertical: self.config.vertical,
      },
    })
  }

  fn generate_effect(&self) -> Option<Effect> {
    let plan = self.plan?;
    Some(Effect::GenerateScenario {
      generation: self.generation,
      request: ScenarioRequest {
        vertical: self.config.vertical,
        level: self.config.level,
        prompt_type: plan.prompt_type,
        question_type: plan.question_type,
      },
    })
  }

  fn grade_effect(&self) -> Option<Effect> {
    let plan = self.plan?;
    let scenario = self.scenario.as_ref()?;
    let pending = self.pending.as_ref()?;
    Some(Effect::GradeResponse {
      generation: self.generation,
      request: GradeRequest {
        prompt_type: plan.prompt_type,
        prompt_context: prompt_context(plan.prompt_type, scenario),
        expected_type: scenario.expected_type,
        trainee_response: pending.answer.clone(),
      },
    })
  }

  fn persist_effect(&self, result: GradingResult) -> Option<Effect> {
    let plan = self.plan?;
    let scenario = self.scenario.as_ref()?;
    let pending = self.pending.as_ref()?;
    Some(Effect::PersistResponse {
      generation: self.generation,
      record: ResponseRecord {
        session_id: self.session_id.clone()?,
        question_number: self.question_number,
        prompt_type: plan.prompt_type,
        context: prompt_context(plan.prompt_type, scenario),
        expected_type: scenario.expected_type,
        response: pending.answer.clone(),
        response_time_ms: pending.response_time_ms,
        result,
      },
    })
  }

  fn complete_effect(&self) -> Option<Effect> {
    Some(Effect::CompleteSession {
      generation: self.generation,
      session_id: self.session_id.clone()?,
      counted: self.counted.clone(),
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::domain::{Grade, Level, Vertical};
  use crate::engine::clock::ManualClock;
  use crate::engine::grade::{score_response, Judgement};
  use crate::engine::selector::FixedSequence;

  // ── harness ──────────────────────────────────────────────────────────────

  fn config(mode: TrainingMode, level: u8, timer: u32) -> SessionConfig {
    SessionConfig {
      mode,
      level: Level::new(level).unwrap(),
      vertical: Vertical::Ecommerce,
      timer_duration_seconds: timer,
    }
  }

  fn machine(mode: TrainingMode, level: u8, timer: u32) -> (SessionMachine, ManualClock) {
    let clock = ManualClock::new();
    let m = SessionMachine::new(
      "run-1",
      config(mode, level, timer),
      TraineeProgress::new("trainee-1"),
      LevelPolicy::default(),
      QuestionSelector::new(Box::new(FixedSequence::new([SpinType::P, SpinType::S]))),
      Arc::new(clock.clone()),
    );
    (m, clock)
  }

  fn scenario(t: SpinType) -> Scenario {
    Scenario {
      scenario_context: "Outdoor gear store.".into(),
      prospect_statement: "Ad costs keep climbing.".into(),
      expected_type: t,
      prospect_persona: None,
      sample_question: Some("How many orders do you ship a week?".into()),
      correct_answer: Some("P".into()),
      hints: vec![],
    }
  }

  fn result(score: f32, t: SpinType) -> GradingResult {
    score_response(
      Judgement {
        identified_type: Some(t),
        type_accuracy: score,
        quality_score: score,
        naturalness_score: score,
        feedback: "fine".into(),
        improved_version: None,
      },
      SpinType::P,
    )
  }

  fn io(effects: &[Effect]) -> Vec<&Effect> {
    effects.iter().filter(|e| !matches!(e, Effect::Notify(_))).collect()
  }

  fn create_gen(effects: &[Effect]) -> u64 {
    match io(effects).as_slice() {
      [Effect::CreateSession { generation, .. }] => *generation,
      other => panic!("expected CreateSession, got {other:?}"),
    }
  }

  fn scenario_req(effects: &[Effect]) -> (u64, ScenarioRequest) {
    match io(effects).as_slice() {
      [Effect::GenerateScenario { generation, request }] => (*generation, request.clone()),
      other => panic!("expected GenerateScenario, got {other:?}"),
    }
  }

  fn grade_req(effects: &[Effect]) -> (u64, GradeRequest) {
    match io(effects).as_slice() {
      [Effect::GradeResponse { generation, request }] => (*generation, request.clone()),
      other => panic!("expected GradeResponse, got {other:?}"),
    }
  }

  fn persist_rec(effects: &[Effect]) -> (u64, ResponseRecord) {
    match io(effects).as_slice() {
      [Effect::PersistResponse { generation, record }] => (*generation, record.clone()),
      other => panic!("expected PersistResponse, got {other:?}"),
    }
  }

  fn complete_gen(effects: &[Effect]) -> u64 {
    complete_req(effects).0
  }

  fn complete_req(effects: &[Effect]) -> (u64, Vec<u32>) {
    match io(effects).as_slice() {
      [Effect::CompleteSession { generation, counted, .. }] => (*generation, counted.clone()),
      other => panic!("expected CompleteSession, got {other:?}"),
    }
  }

  fn completed(streak: u32) -> CompletionOutcome {
    CompletionOutcome { leveled_up: false, new_level: None, streak, overall_grade: Grade::B }
  }

  /// Run the session timer out and return the completion generation.
  fn run_to_break(m: &mut SessionMachine, seconds: u32) -> u64 {
    let fx: Vec<Effect> = (0..seconds).flat_map(|_| m.on_tick()).collect();
    assert_eq!(m.phase(), SessionPhase::Break);
    complete_gen(&fx)
  }

  fn timeouts(effects: &[Effect]) -> usize {
    effects.iter().filter(|e| matches!(e, Effect::Notify(SessionEvent::TimedOut { .. }))).count()
  }

  /// Start the machine and bring question 1 on screen.
  fn to_question(m: &mut SessionMachine, session_id: &str) {
    let fx = m.start();
    let fx = m.on_session_created(create_gen(&fx), Ok(session_id.into()));
    let (gen, req) = scenario_req(&fx);
    m.on_scenario(gen, Ok(scenario(req.question_type)));
    assert_eq!(m.phase(), SessionPhase::Question);
  }

  /// Submit, grade and persist one answer; ends in feedback.
  fn answer(m: &mut SessionMachine, text: &str, score: f32, xp: u32) {
    let fx = m.submit(text.into()).unwrap();
    let (gen, req) = grade_req(&fx);
    let fx = m.on_graded(gen, Ok(result(score, req.expected_type)));
    let (gen, _) = persist_rec(&fx);
    m.on_persisted(gen, Ok(xp));
    assert_eq!(m.phase(), SessionPhase::Feedback);
  }

  // ── happy path ───────────────────────────────────────────────────────────

  #[test]
  fn full_question_cycle_counts_once() {
    let (mut m, clock) = machine(TrainingMode::Practice, 2, 1500);
    to_question(&mut m, "s-1");
    clock.advance_ms(4200);

    let fx = m.submit("What frustrates you most about ad costs?".into()).unwrap();
    assert_eq!(m.phase(), SessionPhase::Grading);
    let (gen, req) = grade_req(&fx);
    assert_eq!(req.trainee_response, "What frustrates you most about ad costs?");
    assert_eq!(req.prompt_type, PromptType::CraftSingle);
    assert_eq!(req.expected_type, SpinType::P);

    let fx = m.on_graded(gen, Ok(result(90.0, SpinType::P)));
    let (gen, rec) = persist_rec(&fx);
    assert_eq!(rec.session_id, "s-1");
    assert_eq!(rec.question_number, 1);
    assert_eq!(rec.response_time_ms, 4200);
    assert_eq!(m.stats().questions_answered, 0);

    m.on_persisted(gen, Ok(23));
    assert_eq!(m.phase(), SessionPhase::Feedback);
    assert_eq!(*m.stats(), SessionStats { questions_answered: 1, correct_answers: 1, total_xp: 23, total_score: 90.0 });

    let view = m.view();
    assert_eq!(view.scenario.as_ref().unwrap().expected_type, Some(SpinType::P));
    assert_eq!(view.result.as_ref().unwrap().grade, Grade::A);
  }

  #[test]
  fn expected_type_is_hidden_until_feedback() {
    let (mut m, _) = machine(TrainingMode::Practice, 2, 1500);
    to_question(&mut m, "s-1");
    let view = m.view();
    let s = view.scenario.unwrap();
    assert_eq!(s.expected_type, None);
    assert_eq!(s.correct_answer, None);
  }

  #[test]
  fn next_question_discards_previous_scenario_and_result() {
    let (mut m, _) = machine(TrainingMode::Practice, 2, 1500);
    to_question(&mut m, "s-1");
    answer(&mut m, "What's hard about that?", 80.0, 20);
    let fx = m.next_question().unwrap();
    let (_, req) = scenario_req(&fx);
    assert_eq!(req.question_type, SpinType::S);
    let view = m.view();
    assert_eq!(view.phase, SessionPhase::Loading);
    assert_eq!(view.question_number, 2);
    assert!(view.scenario.is_none() && view.result.is_none());
  }

  // ── response timer ───────────────────────────────────────────────────────

  #[test]
  fn practice_timeout_auto_submits_sentinel_once() {
    let (mut m, _) = machine(TrainingMode::Practice, 2, 1500);
    to_question(&mut m, "s-1");
    assert_eq!(m.view().response_remaining, Some(30));

    let mut grade_requests = Vec::new();
    let mut timed_out = 0;
    for tick in 1..=120 {
      let fx = m.on_tick();
      timed_out += timeouts(&fx);
      for e in fx {
        if let Effect::GradeResponse { request, .. } = e {
          grade_requests.push((tick, request));
        }
      }
    }
    assert_eq!(timed_out, 1);
    assert_eq!(grade_requests.len(), 1);
    let (tick, req) = &grade_requests[0];
    assert_eq!(*tick, 30);
    assert_eq!(req.trainee_response, TIMEOUT_SENTINEL);
    assert_eq!(m.phase(), SessionPhase::Grading);
  }

  #[test]
  fn identify_timeout_submits_empty_answer() {
    let (mut m, _) = machine(TrainingMode::LiveSim, 1, 1500);
    to_question(&mut m, "s-1");
    let mut answers = Vec::new();
    for _ in 0..15 {
      for e in m.on_tick() {
        if let Effect::GradeResponse { request, .. } = e {
          answers.push(request.trainee_response);
        }
      }
    }
    assert_eq!(answers, vec![String::new()]);
  }

  #[test]
  fn practice_timeout_keeps_typed_draft_but_live_sim_does_not() {
    let (mut m, _) = machine(TrainingMode::Practice, 2, 1500);
    to_question(&mut m, "s-1");
    m.update_draft("What's the hardest part of".into()).unwrap();
    let fx: Vec<Effect> = (0..30).flat_map(|_| m.on_tick()).collect();
    assert_eq!(grade_req(&fx).1.trainee_response, "What's the hardest part of");

    let (mut m, _) = machine(TrainingMode::LiveSim, 2, 1500);
    to_question(&mut m, "s-1");
    m.update_draft("What's the hardest part of".into()).unwrap();
    let fx: Vec<Effect> = (0..15).flat_map(|_| m.on_tick()).collect();
    assert_eq!(grade_req(&fx).1.trainee_response, TIMEOUT_SENTINEL);
  }

  #[test]
  fn learn_mode_never_times_out() {
    let (mut m, _) = machine(TrainingMode::Learn, 2, 100_000);
    to_question(&mut m, "s-1");
    assert_eq!(m.view().response_remaining, None);
    for _ in 0..10_000 {
      let fx = m.on_tick();
      assert_eq!(timeouts(&fx), 0);
      assert!(io(&fx).is_empty());
    }
    assert_eq!(m.phase(), SessionPhase::Question);
  }

  #[test]
  fn response_timer_only_runs_during_question() {
    let (mut m, _) = machine(TrainingMode::LiveSim, 2, 1500);
    let fx = m.start();
    let fx = m.on_session_created(create_gen(&fx), Ok("s-1".into()));
    // Scenario still outstanding: ticks must not start a response countdown.
    for _ in 0..60 {
      let fx = m.on_tick();
      assert!(!fx.iter().any(|e| matches!(e, Effect::Notify(SessionEvent::ResponseTick { .. }))));
    }
    let (gen, _) = scenario_req(&fx);
    m.on_scenario(gen, Ok(scenario(SpinType::P)));
    assert_eq!(m.view().response_remaining, Some(15));

    m.submit("How?".into()).unwrap();
    for _ in 0..60 {
      let fx = m.on_tick();
      assert!(!fx.iter().any(|e| matches!(e, Effect::Notify(SessionEvent::ResponseTick { .. }))));
      assert_eq!(timeouts(&fx), 0);
    }
    assert_eq!(m.view().response_remaining, None);
  }

  // ── failures and retries ─────────────────────────────────────────────────

  #[test]
  fn scenario_failure_stays_in_loading_and_retry_keeps_numbering() {
    let (mut m, _) = machine(TrainingMode::Practice, 2, 1500);
    let fx = m.start();
    let fx = m.on_session_created(create_gen(&fx), Ok("s-1".into()));
    let (gen, first) = scenario_req(&fx);

    m.on_scenario(gen, Err(TrainerError::transient("generateScenario", "HTTP 503")));
    let view = m.view();
    assert_eq!(view.phase, SessionPhase::Loading);
    assert_eq!(view.question_number, 1);
    assert!(view.error.as_ref().unwrap().retryable);

    let fx = m.retry().unwrap();
    let (gen2, again) = scenario_req(&fx);
    assert_eq!(gen, gen2);
    assert_eq!(first, again);
    assert!(m.retry().is_err(), "retry while a request is in flight");

    m.on_scenario(gen2, Ok(scenario(SpinType::P)));
    assert_eq!(m.view().question_number, 1);
    assert!(m.view().error.is_none());
  }

  #[test]
  fn grading_failure_preserves_answer_for_retry() {
    let (mut m, _) = machine(TrainingMode::Practice, 2, 1500);
    to_question(&mut m, "s-1");
    let fx = m.submit("What's the biggest challenge with ads?".into()).unwrap();
    let (gen, original) = grade_req(&fx);

    m.on_graded(gen, Err(TrainerError::transient("gradeResponse", "timeout")));
    assert_eq!(m.phase(), SessionPhase::Grading);
    assert_eq!(m.view().pending_answer.as_deref(), Some("What's the biggest challenge with ads?"));

    let fx = m.retry().unwrap();
    let (gen2, resubmitted) = grade_req(&fx);
    assert_eq!(resubmitted, original);

    let fx = m.on_graded(gen2, Ok(result(70.0, SpinType::P)));
    let (gen3, _) = persist_rec(&fx);
    m.on_persisted(gen3, Ok(19));
    assert_eq!(m.stats().questions_answered, 1);
  }

  #[test]
  fn duplicate_results_never_double_count() {
    let (mut m, _) = machine(TrainingMode::Practice, 2, 1500);
    to_question(&mut m, "s-1");
    let fx = m.submit("What's hard?".into()).unwrap();
    let (gen, _) = grade_req(&fx);

    let fx = m.on_graded(gen, Ok(result(70.0, SpinType::P)));
    let (pgen, _) = persist_rec(&fx);
    // A retried grade call answering late is ignored while persisting.
    assert!(io(&m.on_graded(gen, Ok(result(10.0, SpinType::S)))).is_empty());
    m.on_persisted(pgen, Ok(19));
    // And a duplicate persist acknowledgement after feedback is ignored too.
    assert!(m.on_persisted(pgen, Ok(19)).is_empty());
    assert!(m.on_graded(gen, Ok(result(70.0, SpinType::P))).is_empty());

    assert_eq!(m.stats().questions_answered, 1);
    assert_eq!(m.stats().total_xp, 19);
  }

  #[test]
  fn persist_failure_retries_without_regrading() {
    let (mut m, _) = machine(TrainingMode::Practice, 2, 1500);
    to_question(&mut m, "s-1");
    let fx = m.submit("What's hard?".into()).unwrap();
    let (gen, _) = grade_req(&fx);
    let fx = m.on_graded(gen, Ok(result(70.0, SpinType::P)));
    let (pgen, rec) = persist_rec(&fx);
    m.on_persisted(pgen, Err(TrainerError::transient("persistResponse", "db down")));
    assert_eq!(m.phase(), SessionPhase::Grading);
    assert_eq!(m.stats().questions_answered, 0);

    let fx = m.retry().unwrap();
    let (pgen2, rec2) = persist_rec(&fx);
    assert_eq!(rec, rec2);
    m.on_persisted(pgen2, Ok(19));
    assert_eq!(m.stats().questions_answered, 1);
  }

  // ── session timer / break ────────────────────────────────────────────────

  #[test]
  fn session_timer_preempts_in_flight_question() {
    let (mut m, _) = machine(TrainingMode::Learn, 2, 300);
    to_question(&mut m, "s-1");
    answer(&mut m, "What's hard about ad costs?", 80.0, 21);
    m.next_question().unwrap();
    let fx = m.on_tick();
    assert!(io(&fx).is_empty());

    // Bring question 2 up and submit, leaving grading in flight.
    let gen_before = m.generation();
    m.on_scenario(gen_before, Ok(scenario(SpinType::S)));
    let fx = m.submit("How many stores?".into()).unwrap();
    let (stale_gen, _) = grade_req(&fx);

    let mut break_at = None;
    let mut complete_effects = Vec::new();
    for tick in 2..=400 {
      let fx = m.on_tick();
      if m.phase() == SessionPhase::Break && break_at.is_none() {
        break_at = Some(tick);
        complete_effects = fx;
      }
    }
    assert_eq!(break_at, Some(300));
    complete_gen(&complete_effects);

    // The late grade for question 2 is stale and must not touch stats.
    assert!(m.on_graded(stale_gen, Ok(result(100.0, SpinType::S))).is_empty());
    let summary = m.view().summary.unwrap();
    assert_eq!(summary.questions_answered, 1);
    assert_eq!(summary.xp_earned, 21);
    assert_eq!(summary.grade, Grade::B);
    assert!(!summary.reconciled);
  }

  #[test]
  fn break_then_continue_starts_fresh_session() {
    let (mut m, _) = machine(TrainingMode::Learn, 2, 5);
    to_question(&mut m, "s-1");
    answer(&mut m, "What's hard?", 80.0, 21);
    let gen = run_to_break(&mut m, 5);
    m.on_session_completed(gen, Ok(completed(1)));

    let fx = m.continue_training().unwrap();
    assert_eq!(m.phase(), SessionPhase::Loading);
    assert_eq!(m.stats().questions_answered, 0);
    let fx = m.on_session_created(create_gen(&fx), Ok("s-2".into()));
    let (gen, _) = scenario_req(&fx);
    m.on_scenario(gen, Ok(scenario(SpinType::P)));
    let view = m.view();
    assert_eq!(view.session_id.as_deref(), Some("s-2"));
    assert_eq!(view.question_number, 1);
    assert_eq!(view.session_remaining, Some(5));
    assert!(view.summary.is_none());
  }

  #[test]
  fn end_session_is_terminal() {
    let (mut m, _) = machine(TrainingMode::Learn, 2, 3);
    to_question(&mut m, "s-1");
    let gen = run_to_break(&mut m, 3);
    m.on_session_completed(gen, Ok(completed(0)));
    m.end_session().unwrap();
    assert_eq!(m.phase(), SessionPhase::Complete);

    assert_eq!(m.submit("x".into()), Err(TrainerError::SessionEnded));
    assert_eq!(m.continue_training(), Err(TrainerError::SessionEnded));
    assert_eq!(m.retry(), Err(TrainerError::SessionEnded));
    assert_eq!(m.abandon(), Err(TrainerError::SessionEnded));
    assert!(m.on_tick().is_empty());
    assert_eq!(m.phase(), SessionPhase::Complete);
  }

  #[test]
  fn completion_outcome_reconciles_summary() {
    let (mut m, _) = machine(TrainingMode::Learn, 2, 2);
    to_question(&mut m, "s-1");
    m.on_tick();
    let fx = m.on_tick();
    let gen = complete_gen(&fx);
    assert!(!m.view().summary.unwrap().leveled_up);

    let outcome = CompletionOutcome {
      leveled_up: true,
      new_level: Some(Level::new(2).unwrap()),
      streak: 3,
      overall_grade: Grade::C,
    };
    let fx = m.on_session_completed(gen, Ok(outcome));
    assert!(fx.iter().any(|e| matches!(e, Effect::Notify(SessionEvent::Summary { .. }))));
    let summary = m.view().summary.unwrap();
    assert!(summary.leveled_up && summary.reconciled);
    assert_eq!(summary.streak, 3);

    // A completion arriving after the trainee already continued is stale.
    m.continue_training().unwrap();
    let outcome = CompletionOutcome { leveled_up: false, new_level: None, streak: 0, overall_grade: Grade::D };
    assert!(m.on_session_completed(gen, Ok(outcome)).is_empty());
  }

  #[test]
  fn completion_failure_is_retryable_from_break() {
    let (mut m, _) = machine(TrainingMode::Learn, 2, 1);
    to_question(&mut m, "s-1");
    let gen = complete_gen(&m.on_tick());
    m.on_session_completed(gen, Err(TrainerError::transient("completeSession", "503")));
    let fx = m.retry().unwrap();
    assert_eq!(complete_gen(&fx), gen);
  }

  #[test]
  fn break_decisions_wait_for_completion() {
    let (mut m, _) = machine(TrainingMode::Learn, 2, 5);
    to_question(&mut m, "s-1");
    answer(&mut m, "What's hard?", 80.0, 21);
    let gen = run_to_break(&mut m, 5);

    // Completion still outstanding.
    assert!(matches!(m.end_session(), Err(TrainerError::InvalidAction { .. })));
    assert!(matches!(m.continue_training(), Err(TrainerError::InvalidAction { .. })));

    // Completion failed: still blocked until a retry lands.
    m.on_session_completed(gen, Err(TrainerError::transient("completeSession", "503")));
    assert!(matches!(m.end_session(), Err(TrainerError::InvalidAction { .. })));
    assert!(matches!(m.continue_training(), Err(TrainerError::InvalidAction { .. })));
    assert_eq!(m.phase(), SessionPhase::Break);

    let (gen2, counted) = complete_req(&m.retry().unwrap());
    assert_eq!(counted, vec![1]);
    m.on_session_completed(gen2, Ok(completed(1)));
    m.end_session().unwrap();
    assert_eq!(m.phase(), SessionPhase::Complete);
  }

  #[test]
  fn continue_after_failed_completion_needs_a_successful_retry() {
    let (mut m, _) = machine(TrainingMode::Learn, 2, 5);
    to_question(&mut m, "s-1");
    answer(&mut m, "What's hard?", 80.0, 21);
    let gen = run_to_break(&mut m, 5);
    m.on_session_completed(gen, Err(TrainerError::transient("completeSession", "503")));
    assert!(m.continue_training().is_err());

    let gen2 = complete_gen(&m.retry().unwrap());
    m.on_session_completed(gen2, Ok(completed(1)));
    let fx = m.continue_training().unwrap();
    create_gen(&fx);
    assert_eq!(m.phase(), SessionPhase::Loading);
  }

  #[test]
  fn unretryable_completion_failure_lets_the_trainee_leave() {
    let (mut m, _) = machine(TrainingMode::Learn, 2, 2);
    to_question(&mut m, "s-1");
    let gen = run_to_break(&mut m, 2);
    m.on_session_completed(gen, Err(TrainerError::NotFound("session s-1".into())));
    m.end_session().unwrap();
    assert_eq!(m.phase(), SessionPhase::Complete);
  }

  #[test]
  fn completion_lists_only_counted_questions() {
    let (mut m, _) = machine(TrainingMode::Learn, 2, 300);
    to_question(&mut m, "s-1");
    answer(&mut m, "What's hard about ad costs?", 80.0, 21);

    // Question 2 is graded and its persist is in flight when the timer runs out.
    let fx = m.next_question().unwrap();
    let (gen, req) = scenario_req(&fx);
    m.on_scenario(gen, Ok(scenario(req.question_type)));
    let fx = m.submit("How many stores?".into()).unwrap();
    let (gen, _) = grade_req(&fx);
    let fx = m.on_graded(gen, Ok(result(100.0, SpinType::S)));
    let (pgen, rec) = persist_rec(&fx);
    assert_eq!(rec.question_number, 2);

    let fx: Vec<Effect> = (0..300).flat_map(|_| m.on_tick()).collect();
    let (_, counted) = complete_req(&fx);
    assert_eq!(counted, vec![1]);
    assert!(m.on_persisted(pgen, Ok(25)).is_empty());
    assert_eq!(m.view().summary.unwrap().xp_earned, 21);
  }

  // ── idle expiry ──────────────────────────────────────────────────────────

  #[test]
  fn idle_break_ends_once_completion_settles() {
    let (mut m, _) = machine(TrainingMode::Learn, 2, 2);
    to_question(&mut m, "s-1");
    assert!(!m.is_parked());
    let gen = run_to_break(&mut m, 2);
    assert!(m.is_parked());

    // In flight: wait.
    assert!(m.expire_idle().is_empty());
    assert_eq!(m.phase(), SessionPhase::Break);

    // Failed: the idle expiry retries instead of dropping the completion.
    m.on_session_completed(gen, Err(TrainerError::transient("completeSession", "503")));
    let gen2 = complete_gen(&m.expire_idle());
    assert_eq!(m.phase(), SessionPhase::Break);

    m.on_session_completed(gen2, Ok(completed(0)));
    m.expire_idle();
    assert_eq!(m.phase(), SessionPhase::Complete);
    assert!(!m.is_parked());
  }

  #[test]
  fn idle_pause_abandons() {
    let (mut m, _) = machine(TrainingMode::Practice, 2, 100);
    to_question(&mut m, "s-1");
    assert!(m.expire_idle().is_empty());
    m.pause().unwrap();
    m.expire_idle();
    assert_eq!(m.phase(), SessionPhase::Complete);
  }

  // ── pause / abandon ──────────────────────────────────────────────────────

  #[test]
  fn response_time_excludes_paused_time() {
    let (mut m, clock) = machine(TrainingMode::Learn, 2, 1000);
    to_question(&mut m, "s-1");
    clock.advance_ms(2_000);
    m.pause().unwrap();
    clock.advance_ms(60_000);
    m.resume().unwrap();
    clock.advance_ms(1_500);

    let fx = m.submit("What's hard?".into()).unwrap();
    let (gen, _) = grade_req(&fx);
    let fx = m.on_graded(gen, Ok(result(70.0, SpinType::P)));
    let (_, rec) = persist_rec(&fx);
    assert_eq!(rec.response_time_ms, 3_500);
  }

  #[test]
  fn pause_during_loading_does_not_count_against_the_answer() {
    let (mut m, clock) = machine(TrainingMode::Learn, 2, 1000);
    let fx = m.start();
    let fx = m.on_session_created(create_gen(&fx), Ok("s-1".into()));
    let (gen, req) = scenario_req(&fx);
    m.pause().unwrap();
    clock.advance_ms(10_000);
    m.on_scenario(gen, Ok(scenario(req.question_type)));
    clock.advance_ms(5_000);
    m.resume().unwrap();
    clock.advance_ms(1_000);

    let fx = m.submit("What's hard?".into()).unwrap();
    let (gen, _) = grade_req(&fx);
    let (_, rec) = persist_rec(&m.on_graded(gen, Ok(result(70.0, SpinType::P))));
    assert_eq!(rec.response_time_ms, 1_000);
  }


  #[test]
  fn pause_freezes_both_timers_and_blocks_actions() {
    let (mut m, _) = machine(TrainingMode::LiveSim, 2, 100);
    to_question(&mut m, "s-1");
    for _ in 0..5 {
      m.on_tick();
    }
    m.pause().unwrap();
    for _ in 0..500 {
      assert!(m.on_tick().is_empty());
    }
    let view = m.view();
    assert_eq!(view.response_remaining, Some(10));
    assert_eq!(view.session_remaining, Some(95));
    assert!(matches!(m.submit("x".into()), Err(TrainerError::InvalidAction { .. })));

    m.resume().unwrap();
    let question_before = m.view().question_number;
    let fx: Vec<Effect> = (0..10).flat_map(|_| m.on_tick()).collect();
    assert_eq!(timeouts(&fx), 1);
    assert_eq!(m.view().question_number, question_before);
  }

  #[test]
  fn question_numbers_strictly_increase_across_pause() {
    let (mut m, _) = machine(TrainingMode::Learn, 2, 1000);
    to_question(&mut m, "s-1");
    let mut seen = vec![m.view().question_number];
    for _ in 0..3 {
      answer(&mut m, "What's hard?", 60.0, 10);
      m.pause().unwrap();
      m.resume().unwrap();
      let fx = m.next_question().unwrap();
      let (gen, req) = scenario_req(&fx);
      m.on_scenario(gen, Ok(scenario(req.question_type)));
      seen.push(m.view().question_number);
    }
    assert_eq!(seen, vec![1, 2, 3, 4]);
  }

  #[test]
  fn abandon_cancels_everything() {
    let (mut m, _) = machine(TrainingMode::LiveSim, 2, 100);
    to_question(&mut m, "s-1");
    let fx = m.submit("What's hard?".into()).unwrap();
    let (gen, _) = grade_req(&fx);
    m.abandon().unwrap();
    assert_eq!(m.phase(), SessionPhase::Complete);
    assert!(m.on_graded(gen, Ok(result(90.0, SpinType::P))).is_empty());
    for _ in 0..200 {
      assert!(m.on_tick().is_empty());
    }
    assert_eq!(m.stats().questions_answered, 0);
  }

  #[test]
  fn actions_in_wrong_phase_are_rejected() {
    let (mut m, _) = machine(TrainingMode::Practice, 2, 100);
    to_question(&mut m, "s-1");
    assert!(matches!(m.next_question(), Err(TrainerError::InvalidAction { .. })));
    assert!(matches!(m.continue_training(), Err(TrainerError::InvalidAction { .. })));
    assert!(matches!(m.end_session(), Err(TrainerError::InvalidAction { .. })));
    assert!(matches!(m.retry(), Err(TrainerError::InvalidAction { .. })));
    assert!(matches!(m.resume(), Err(TrainerError::InvalidAction { .. })));
  }
}
