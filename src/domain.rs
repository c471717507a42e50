//! Domain models used by the trainer: modes, levels, verticals, SPIN types,
//! session configuration, scenarios and grading results.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TrainerError;

/// How strict the practice loop is. Drives the response-time budget and the
/// auto-submit behavior on timeout.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrainingMode {
  /// No response timer at all.
  Learn,
  Practice,
  /// Tight budget, placeholder auto-submit.
  LiveSim,
}

impl FromStr for TrainingMode {
  type Err = TrainerError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim().to_ascii_lowercase().as_str() {
      "learn" => Ok(TrainingMode::Learn),
      "practice" => Ok(TrainingMode::Practice),
      "live_sim" | "livesim" => Ok(TrainingMode::LiveSim),
      other => Err(TrainerError::InvalidConfig(format!("unknown training mode '{other}'"))),
    }
  }
}

impl fmt::Display for TrainingMode {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      TrainingMode::Learn => write!(f, "learn"),
      TrainingMode::Practice => write!(f, "practice"),
      TrainingMode::LiveSim => write!(f, "live_sim"),
    }
  }
}

/// Opaque tag forwarded to scenario generation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Vertical {
  Ecommerce,
  Leadgen,
  LocalServices,
}

impl FromStr for Vertical {
  type Err = TrainerError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim().to_ascii_lowercase().as_str() {
      "ecommerce" => Ok(Vertical::Ecommerce),
      "leadgen" => Ok(Vertical::Leadgen),
      "local_services" => Ok(Vertical::LocalServices),
      other => Err(TrainerError::InvalidConfig(format!("unknown vertical '{other}'"))),
    }
  }
}

impl fmt::Display for Vertical {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Vertical::Ecommerce => write!(f, "ecommerce"),
      Vertical::Leadgen => write!(f, "leadgen"),
      Vertical::LocalServices => write!(f, "local_services"),
    }
  }
}

/// The four discovery-question types (Situation, Problem, Implication, Need-payoff).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SpinType {
  S,
  P,
  I,
  N,
}

impl SpinType {
  pub const ALL: [SpinType; 4] = [SpinType::S, SpinType::P, SpinType::I, SpinType::N];

  pub fn label(self) -> &'static str {
    match self {
      SpinType::S => "Situation",
      SpinType::P => "Problem",
      SpinType::I => "Implication",
      SpinType::N => "Need-payoff",
    }
  }

  /// Lenient parse used for identify answers: accepts the letter or the full name.
  pub fn parse_answer(answer: &str) -> Option<SpinType> {
    let a = answer.trim().to_ascii_lowercase();
    let a = a.trim_matches(|c: char| !c.is_ascii_alphanumeric() && c != '-');
    match a {
      "s" | "situation" => Some(SpinType::S),
      "p" | "problem" => Some(SpinType::P),
      "i" | "implication" => Some(SpinType::I),
      "n" | "need" | "need-payoff" | "need payoff" | "needpayoff" => Some(SpinType::N),
      _ => None,
    }
  }
}

impl fmt::Display for SpinType {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let s = match self {
      SpinType::S => "S",
      SpinType::P => "P",
      SpinType::I => "I",
      SpinType::N => "N",
    };
    write!(f, "{s}")
  }
}

/// What the trainee is asked to do for a question.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromptType {
  /// Classify a given question as S/P/I/N.
  Identify,
  /// Write one question of the requested type.
  CraftSingle,
  /// Write a question for a richer prospect scenario.
  Scenario,
  /// Recover from an unexpected prospect turn.
  Curveball,
}

impl PromptType {
  /// Whether the prompt asks the trainee to write a question (as opposed to classify one).
  pub fn is_craft(self) -> bool {
    !matches!(self, PromptType::Identify)
  }

  /// A curveball is always answered by surfacing consequences, so it dictates the type.
  pub fn fixed_type(self) -> Option<SpinType> {
    match self {
      PromptType::Curveball => Some(SpinType::I),
      _ => None,
    }
  }
}

impl fmt::Display for PromptType {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      PromptType::Identify => write!(f, "identify"),
      PromptType::CraftSingle => write!(f, "craft_single"),
      PromptType::Scenario => write!(f, "scenario"),
      PromptType::Curveball => write!(f, "curveball"),
    }
  }
}

/// Training level 1..=5.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Level(u8);

impl Level {
  pub const MIN: u8 = 1;
  pub const MAX: u8 = 5;

  pub fn new(n: u8) -> Result<Self, TrainerError> {
    if (Self::MIN..=Self::MAX).contains(&n) {
      Ok(Level(n))
    } else {
      Err(TrainerError::InvalidConfig(format!("level {n} is outside {}..={}", Self::MIN, Self::MAX)))
    }
  }

  pub fn get(self) -> u8 { self.0 }

  pub fn prompt_type(self) -> PromptType {
    match self.0 {
      1 => PromptType::Identify,
      2 | 3 => PromptType::CraftSingle,
      4 => PromptType::Scenario,
      _ => PromptType::Curveball,
    }
  }

  /// Next level, capped at the maximum.
  pub fn next(self) -> Level {
    Level((self.0 + 1).min(Self::MAX))
  }

  /// Levels above `highest_completed + 1` are locked.
  pub fn is_locked(self, highest_completed: u8) -> bool {
    self.0 > highest_completed.saturating_add(1)
  }

  pub fn all() -> impl Iterator<Item = Level> {
    (Self::MIN..=Self::MAX).map(Level)
  }
}

impl TryFrom<u8> for Level {
  type Error = TrainerError;
  fn try_from(n: u8) -> Result<Self, Self::Error> { Level::new(n) }
}

impl From<Level> for u8 {
  fn from(l: Level) -> u8 { l.0 }
}

impl fmt::Display for Level {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.0)
  }
}

/// Immutable per-session configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionConfig {
  pub mode: TrainingMode,
  pub level: Level,
  pub vertical: Vertical,
  pub timer_duration_seconds: u32,
}

impl SessionConfig {
  /// Validate a requested configuration against the trainee's progress.
  /// Locked levels and empty Pomodoro durations are rejected here, before any
  /// session is created.
  pub fn new(
    mode: TrainingMode,
    level: Level,
    vertical: Vertical,
    timer_duration_seconds: u32,
    highest_level_completed: u8,
  ) -> Result<Self, TrainerError> {
    if level.is_locked(highest_level_completed) {
      return Err(TrainerError::InvalidConfig(format!(
        "level {level} is locked (highest completed: {highest_level_completed})"
      )));
    }
    if timer_duration_seconds == 0 {
      return Err(TrainerError::InvalidConfig("session timer duration must be positive".into()));
    }
    Ok(Self { mode, level, vertical, timer_duration_seconds })
  }
}

/// Produced by the scenario generator for one question.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scenario {
  pub scenario_context: String,
  pub prospect_statement: String,
  pub expected_type: SpinType,
  #[serde(default)] pub prospect_persona: Option<String>,
  #[serde(default)] pub sample_question: Option<String>,
  #[serde(default)] pub correct_answer: Option<String>,
  #[serde(default)] pub hints: Vec<String>,
}

/// Letter grade for a weighted score.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Grade {
  S,
  A,
  B,
  C,
  D,
}

impl fmt::Display for Grade {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let s = match self {
      Grade::S => "S",
      Grade::A => "A",
      Grade::B => "B",
      Grade::C => "C",
      Grade::D => "D",
    };
    write!(f, "{s}")
  }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreBreakdown {
  /// 0..=40
  pub type_component: f32,
  /// 0..=40
  pub quality_component: f32,
  /// 0..=20
  pub naturalness_component: f32,
}

/// Grade for one submitted response. Never mutated once produced.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GradingResult {
  pub identified_type: Option<SpinType>,
  pub type_correct: bool,
  pub type_accuracy: f32,
  pub quality_score: f32,
  pub naturalness_score: f32,
  pub overall_score: f32,
  pub grade: Grade,
  pub feedback: String,
  #[serde(default)] pub improved_version: Option<String>,
  pub breakdown: ScoreBreakdown,
}

/// Running totals for one session. Only the state machine mutates these.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStats {
  pub questions_answered: u32,
  pub correct_answers: u32,
  pub total_xp: u32,
  /// Sum of overall scores, used for the session-level grade.
  pub total_score: f32,
}

impl SessionStats {
  pub fn average_score(&self) -> f32 {
    if self.questions_answered == 0 { 0.0 } else { self.total_score / self.questions_answered as f32 }
  }
}

/// Persistent per-trainee progression. The store is authoritative.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TraineeProgress {
  pub trainee_id: String,
  pub current_level: Level,
  pub highest_level_completed: u8,
  pub total_xp: u32,
  pub streak: u32,
}

impl TraineeProgress {
  pub fn new(trainee_id: impl Into<String>) -> Self {
    Self {
      trainee_id: trainee_id.into(),
      current_level: Level(Level::MIN),
      highest_level_completed: 0,
      total_xp: 0,
      streak: 0,
    }
  }
}

/// Server answer to `completeSession`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionOutcome {
  pub leveled_up: bool,
  pub new_level: Option<Level>,
  pub streak: u32,
  pub overall_grade: Grade,
}
