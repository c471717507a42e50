//! Grade calculator: weighted rubric, letter grades, XP awards and level-ups.
//!
//! Everything here is pure. The same inputs always produce the same outputs,
//! which is what lets the store and the client agree on XP.

use serde::Deserialize;

use crate::domain::{Grade, GradingResult, Level, ScoreBreakdown, SpinType};

pub const TYPE_WEIGHT: f32 = 40.0;
pub const QUALITY_WEIGHT: f32 = 40.0;
pub const NATURALNESS_WEIGHT: f32 = 20.0;

/// Map an overall score (0..=100) to a letter grade.
pub fn grade(overall_score: f32) -> Grade {
  if overall_score >= 95.0 {
    Grade::S
  } else if overall_score >= 85.0 {
    Grade::A
  } else if overall_score >= 70.0 {
    Grade::B
  } else if overall_score >= 50.0 {
    Grade::C
  } else {
    Grade::D
  }
}

/// Raw judgement of a response, as returned by an oracle. All scores are 0..=100.
#[derive(Clone, Debug, Deserialize)]
pub struct Judgement {
  #[serde(default)]
  pub identified_type: Option<SpinType>,
  pub type_accuracy: f32,
  pub quality_score: f32,
  pub naturalness_score: f32,
  #[serde(default)]
  pub feedback: String,
  #[serde(default)]
  pub improved_version: Option<String>,
}

fn clamp_pct(v: f32) -> f32 {
  if v.is_nan() { 0.0 } else { v.clamp(0.0, 100.0) }
}

/// Apply the 40/40/20 rubric to a judgement and derive the letter grade.
pub fn score_response(judgement: Judgement, expected: SpinType) -> GradingResult {
  let type_accuracy = clamp_pct(judgement.type_accuracy);
  let quality_score = clamp_pct(judgement.quality_score);
  let naturalness_score = clamp_pct(judgement.naturalness_score);

  let breakdown = ScoreBreakdown {
    type_component: type_accuracy * TYPE_WEIGHT / 100.0,
    quality_component: quality_score * QUALITY_WEIGHT / 100.0,
    naturalness_component: naturalness_score * NATURALNESS_WEIGHT / 100.0,
  };
  let overall_score =
    (breakdown.type_component + breakdown.quality_component + breakdown.naturalness_component).clamp(0.0, 100.0);

  GradingResult {
    identified_type: judgement.identified_type,
    type_correct: judgement.identified_type == Some(expected),
    type_accuracy,
    quality_score,
    naturalness_score,
    overall_score,
    grade: grade(overall_score),
    feedback: judgement.feedback,
    improved_version: judgement.improved_version,
    breakdown,
  }
}

/// XP coefficients. `award` is monotonic non-decreasing in both score and streak.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct XpPolicy {
  pub base: f32,
  pub per_point: f32,
  /// Fractional bonus per streak step.
  pub streak_bonus: f32,
  pub streak_cap: u32,
}

impl Default for XpPolicy {
  fn default() -> Self {
    Self { base: 5.0, per_point: 0.2, streak_bonus: 0.1, streak_cap: 5 }
  }
}

impl XpPolicy {
  pub fn award(&self, overall_score: f32, streak: u32) -> u32 {
    let score = clamp_pct(overall_score);
    let raw = self.base.max(0.0) + score * self.per_point.max(0.0);
    let multiplier = 1.0 + streak.min(self.streak_cap) as f32 * self.streak_bonus.max(0.0);
    (raw * multiplier).round() as u32
  }
}

/// Cumulative XP required to leave each level (index 0 = leave level 1).
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct LevelPolicy {
  pub thresholds: [u32; 4],
}

impl Default for LevelPolicy {
  fn default() -> Self {
    Self { thresholds: [100, 250, 450, 700] }
  }
}

impl LevelPolicy {
  pub fn threshold_for(&self, level: Level) -> Option<u32> {
    if level.get() >= Level::MAX {
      None
    } else {
      self.thresholds.get(level.get() as usize - 1).copied()
    }
  }

  /// At most one level per completion. Overshoot stays in the cumulative total,
  /// so the next completion can level again.
  pub fn level_up(&self, current: Level, total_xp: u32) -> Option<Level> {
    match self.threshold_for(current) {
      Some(t) if total_xp >= t => Some(current.next()),
      _ => None,
    }
  }
}
