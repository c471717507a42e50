//! Session summary shown at the Pomodoro break, and the trainee's decision.

use serde::{Deserialize, Serialize};

use crate::domain::{CompletionOutcome, Grade, Level, SessionStats, TraineeProgress};
use crate::engine::grade::{grade, LevelPolicy};

/// Projection of the in-memory running totals at the moment the break started.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
  pub session_id: String,
  pub questions_answered: u32,
  pub correct_answers: u32,
  pub xp_earned: u32,
  pub average_score: f32,
  pub grade: Grade,
  pub streak: u32,
  pub leveled_up: bool,
  pub new_level: Option<Level>,
  /// True once the server's completion outcome has been applied.
  pub reconciled: bool,
}

impl SessionSummary {
  /// Build the local summary. Leveling here is only a guess until `reconcile`.
  pub fn project(session_id: &str, stats: &SessionStats, progress: &TraineeProgress, levels: &LevelPolicy) -> Self {
    let average_score = stats.average_score();
    let new_level = levels.level_up(progress.current_level, progress.total_xp.saturating_add(stats.total_xp));
    Self {
      session_id: session_id.to_string(),
      questions_answered: stats.questions_answered,
      correct_answers: stats.correct_answers,
      xp_earned: stats.total_xp,
      average_score,
      grade: grade(average_score),
      streak: progress.streak,
      leveled_up: new_level.is_some(),
      new_level,
      reconciled: false,
    }
  }

  /// The server's leveling, streak and grade win over the local guess.
  pub fn reconcile(&mut self, outcome: &CompletionOutcome) {
    self.leveled_up = outcome.leveled_up;
    self.new_level = if outcome.leveled_up { outcome.new_level } else { None };
    self.streak = outcome.streak;
    self.grade = outcome.overall_grade;
    self.reconciled = true;
  }
}

/// What the trainee chose at the break prompt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakDecision {
  ContinueTraining,
  EndSession,
}
