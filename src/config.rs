//! Loading trainer configuration (prompts, progression, session bounds, scenario bank) from TOML.
//!
//! Every section is optional; missing keys fall back to the built-in defaults.

use std::time::Duration;

use serde::Deserialize;
use tracing::{error, info};

use crate::engine::grade::{LevelPolicy, XpPolicy};
use crate::seeds::SeedScenario;

#[derive(Clone, Debug, Deserialize, Default)]
pub struct TrainerConfig {
  #[serde(default)]
  pub prompts: Prompts,
  #[serde(default)]
  pub progression: Progression,
  #[serde(default)]
  pub session: SessionBounds,
  #[serde(default)]
  pub scenarios: Vec<SeedScenario>,
}

/// XP coefficients and level thresholds. Both are handed to the store.
#[derive(Clone, Debug, Deserialize, Default, PartialEq)]
pub struct Progression {
  #[serde(default)]
  pub xp: XpPolicy,
  #[serde(default)]
  pub levels: LevelPolicy,
}

/// Allowed Pomodoro durations and the idle timeout for parked runs, in seconds.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct SessionBounds {
  pub default_timer_seconds: u32,
  pub min_timer_seconds: u32,
  pub max_timer_seconds: u32,
  /// A run on a break or paused with no commands for this long is wound down.
  pub idle_timeout_seconds: u32,
}

impl Default for SessionBounds {
  fn default() -> Self {
    Self {
      default_timer_seconds: 25 * 60,
      min_timer_seconds: 60,
      max_timer_seconds: 60 * 60,
      idle_timeout_seconds: 10 * 60,
    }
  }
}

impl SessionBounds {
  /// Fill in the default when the client sent nothing; reject out-of-range values.
  pub fn resolve(&self, requested: Option<u32>) -> Result<u32, String> {
    let secs = requested.unwrap_or(self.default_timer_seconds);
    if secs < self.min_timer_seconds || secs > self.max_timer_seconds {
      return Err(format!(
        "timer duration {secs}s outside allowed range {}..={}s",
        self.min_timer_seconds, self.max_timer_seconds
      ));
    }
    Ok(secs)
  }

  pub fn idle_timeout(&self) -> Duration {
    Duration::from_secs(u64::from(self.idle_timeout_seconds.max(1)))
  }
}

/// Prompts used by the OpenAI oracle. Placeholders in `{braces}` are filled per request.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Prompts {
  pub scenario_system: String,
  pub scenario_user_template: String,
  pub grading_system: String,
  pub grading_user_template: String,
}

impl Default for Prompts {
  fn default() -> Self {
    Self {
      scenario_system: "You write realistic B2B discovery-call practice scenarios for sales reps learning SPIN selling. Respond ONLY with strict JSON.".into(),
      scenario_user_template: "Industry vertical: {vertical}\nTrainee level: {level}\nPrompt type: {prompt_type}\nTarget question type: {question_type} ({question_label})\n\nReturn JSON with fields: scenarioContext (1-2 sentences), prospectStatement (what the prospect just said), prospectPersona (name and role, or null), sampleQuestion (an example {question_label} question, required when prompt type is identify, else null), correctAnswer (a model answer), hints (array of 1-3 short strings). For curveball prompts the prospect statement must be an unexpected objection.".into(),
      grading_system: "You are a strict sales coach grading discovery questions against the SPIN framework (Situation, Problem, Implication, Need-payoff). Output JSON only.".into(),
      grading_user_template: "Prompt type: {prompt_type}\nExpected question type: {expected_type} ({expected_label})\n{context}\n\nTrainee response: {response}\n\nReturn JSON: {\"identified_type\": \"S\"|\"P\"|\"I\"|\"N\"|null, \"type_accuracy\": 0-100, \"quality_score\": 0-100, \"naturalness_score\": 0-100, \"feedback\": string (2-3 sentences), \"improved_version\": string or null}. For identify prompts, identified_type is the type the trainee named. A timed-out or empty response scores 0 everywhere.".into(),
    }
  }
}

/// Attempt to load `TrainerConfig` from TRAINER_CONFIG_PATH. On any parsing/IO error, returns None.
pub fn load_trainer_config_from_env() -> Option<TrainerConfig> {
  let path = std::env::var("TRAINER_CONFIG_PATH").ok()?;
  match std::fs::read_to_string(&path) {
    Ok(s) => match toml::from_str::<TrainerConfig>(&s) {
      Ok(cfg) => {
        info!(target: "spin_trainer_backend", %path, scenarios = cfg.scenarios.len(), "Loaded trainer config (TOML)");
        Some(cfg)
      }
      Err(e) => {
        error!(target: "spin_trainer_backend", %path, error = %e, "Failed to parse TOML config");
        None
      }
    },
    Err(e) => {
      error!(target: "spin_trainer_backend", %path, error = %e, "Failed to read TOML config file");
      None
    }
  }
}
