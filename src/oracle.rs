//! Oracle seam: scenario generation and response grading.
//!
//! The engine only knows the `TrainingOracle` trait. Two implementations exist:
//! the OpenAI client (`crate::openai`) and `LocalOracle`, an offline scenario
//! bank plus a keyword grader.

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, instrument};

use crate::domain::{GradingResult, Level, PromptType, Scenario, SpinType, Vertical};
use crate::engine::grade::{score_response, Judgement};
use crate::error::TrainerResult;
use crate::seeds::{curveball_statement, hard_fallback_scenario, seed_scenarios, type_hint, SeedScenario};

/// Placeholder submitted for craft prompts when the response timer runs out.
pub const TIMEOUT_SENTINEL: &str = "(No response - timed out)";

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScenarioRequest {
  pub vertical: Vertical,
  pub level: Level,
  pub prompt_type: PromptType,
  pub question_type: SpinType,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeRequest {
  pub prompt_type: PromptType,
  pub prompt_context: String,
  pub expected_type: SpinType,
  pub trainee_response: String,
}

#[async_trait]
pub trait TrainingOracle: Send + Sync {
  fn name(&self) -> &'static str;

  async fn generate_scenario(&self, req: &ScenarioRequest) -> TrainerResult<Scenario>;

  async fn grade_response(&self, req: &GradeRequest) -> TrainerResult<GradingResult>;
}

/// Build the prompt context the grader sees for a scenario.
pub fn prompt_context(prompt_type: PromptType, scenario: &Scenario) -> String {
  let mut parts = vec![
    format!("Context: {}", scenario.scenario_context),
    format!("Prospect: {}", scenario.prospect_statement),
  ];
  if let Some(p) = &scenario.prospect_persona {
    parts.push(format!("Persona: {}", p));
  }
  if prompt_type == PromptType::Identify {
    if let Some(q) = &scenario.sample_question {
      parts.push(format!("Question to classify: {}", q));
    }
  }
  parts.join("\n")
}

/// Offline oracle backed by the seed bank.
pub struct LocalOracle {
  bank: Vec<SeedScenario>,
  cursor: AtomicUsize,
}

impl LocalOracle {
  pub fn new(extra: Vec<SeedScenario>) -> Self {
    let mut bank = extra;
    bank.extend(seed_scenarios());
    Self { bank, cursor: AtomicUsize::new(0) }
  }

  fn pick(&self, vertical: Vertical, t: SpinType) -> SeedScenario {
    let exact: Vec<&SeedScenario> = self.bank.iter().filter(|s| s.vertical == vertical && s.spin_type == t).collect();
    let pool = if exact.is_empty() {
      self.bank.iter().filter(|s| s.spin_type == t).collect()
    } else {
      exact
    };
    if pool.is_empty() {
      return hard_fallback_scenario(vertical, t);
    }
    let i = self.cursor.fetch_add(1, Ordering::Relaxed) % pool.len();
    pool[i].clone()
  }
}

impl Default for LocalOracle {
  fn default() -> Self { Self::new(Vec::new()) }
}

#[async_trait]
impl TrainingOracle for LocalOracle {
  fn name(&self) -> &'static str { "local" }

  #[instrument(level = "debug", skip(self), fields(vertical = %req.vertical, prompt_type = %req.prompt_type, question_type = %req.question_type))]
  async fn generate_scenario(&self, req: &ScenarioRequest) -> TrainerResult<Scenario> {
    let s = self.pick(req.vertical, req.question_type);
    let hints = vec![
      format!("Ask a {} question.", req.question_type.label()),
      type_hint(req.question_type).to_string(),
    ];
    let scenario = match req.prompt_type {
      PromptType::Identify => Scenario {
        scenario_context: s.context,
        prospect_statement: s.prospect_statement,
        expected_type: req.question_type,
        prospect_persona: None,
        sample_question: Some(s.sample_question),
        correct_answer: Some(req.question_type.to_string()),
        hints: vec!["Is the question gathering facts, finding pain, exploring consequences, or stating value?".into()],
      },
      PromptType::CraftSingle => Scenario {
        scenario_context: s.context,
        prospect_statement: s.prospect_statement,
        expected_type: req.question_type,
        prospect_persona: None,
        sample_question: None,
        correct_answer: Some(s.sample_question),
        hints,
      },
      PromptType::Scenario => Scenario {
        scenario_context: s.context,
        prospect_statement: s.prospect_statement,
        expected_type: req.question_type,
        prospect_persona: Some(s.persona),
        sample_question: None,
        correct_answer: Some(s.sample_question),
        hints,
      },
      PromptType::Curveball => Scenario {
        scenario_context: s.context,
        prospect_statement: curveball_statement(req.vertical).to_string(),
        expected_type: req.question_type,
        prospect_persona: Some(s.persona),
        sample_question: None,
        correct_answer: None,
        hints,
      },
    };
    debug!(target: "trainer", oracle = "local", "Scenario generated");
    Ok(scenario)
  }

  #[instrument(level = "debug", skip(self, req), fields(prompt_type = %req.prompt_type, answer_len = req.trainee_response.len()))]
  async fn grade_response(&self, req: &GradeRequest) -> TrainerResult<GradingResult> {
    let judgement = if req.prompt_type == PromptType::Identify {
      judge_identify(&req.trainee_response, req.expected_type)
    } else {
      judge_craft(&req.trainee_response, req.expected_type, &req.prompt_context)
    };
    Ok(score_response(judgement, req.expected_type))
  }
}

fn judge_identify(answer: &str, expected: SpinType) -> Judgement {
  let identified = SpinType::parse_answer(answer);
  let correct = identified == Some(expected);
  let feedback = match identified {
    Some(t) if correct => format!("Correct: that is a {} question.", t.label()),
    Some(t) => format!("Not quite: you said {}, but it is a {} question. {}", t.label(), expected.label(), type_hint(expected)),
    None => format!("No type identified. It is a {} question. {}", expected.label(), type_hint(expected)),
  };
  let score = if correct { 100.0 } else { 0.0 };
  Judgement {
    identified_type: identified,
    type_accuracy: score,
    quality_score: score,
    naturalness_score: if identified.is_some() { 100.0 } else { 0.0 },
    feedback,
    improved_version: None,
  }
}

const NEED_KEYS: &[&str] = &["would it help", "how would", "how valuable", "what would it mean", "if you could", "benefit", "would that", "worth"];
const IMPLICATION_KEYS: &[&str] = &["impact", "affect", "cost you", "costing", "lead to", "result in", "consequence", "what happens", "end up"];
const PROBLEM_KEYS: &[&str] = &["problem", "difficult", "hardest", "challenge", "struggle", "frustrat", "concern", "issue", "dissatisf", "worr"];
const SITUATION_KEYS: &[&str] = &["how many", "currently", "what do you use", "how do you", "tell me about", "how long", "what is your", "how are", "roughly"];

/// Keyword classifier. Ties resolve N > I > P > S.
pub fn classify_question(text: &str) -> Option<SpinType> {
  let t = text.to_lowercase();
  let hits = |keys: &[&str]| keys.iter().filter(|k| t.contains(*k)).count();
  let scored = [
    (SpinType::N, hits(NEED_KEYS)),
    (SpinType::I, hits(IMPLICATION_KEYS)),
    (SpinType::P, hits(PROBLEM_KEYS)),
    (SpinType::S, hits(SITUATION_KEYS)),
  ];
  let mut best: Option<(SpinType, usize)> = None;
  for (ty, n) in scored {
    if n > 0 && best.map_or(true, |(_, b)| n > b) {
      best = Some((ty, n));
    }
  }
  best.map(|(ty, _)| ty)
}

fn judge_craft(answer: &str, expected: SpinType, context: &str) -> Judgement {
  let trimmed = answer.trim();
  if trimmed.is_empty() || trimmed == TIMEOUT_SENTINEL {
    return Judgement {
      identified_type: None,
      type_accuracy: 0.0,
      quality_score: 0.0,
      naturalness_score: 0.0,
      feedback: format!("No response recorded. {}", type_hint(expected)),
      improved_version: None,
    };
  }

  let identified = classify_question(trimmed);
  let type_accuracy = match identified {
    Some(t) if t == expected => 100.0,
    Some(_) => 25.0,
    None => 0.0,
  };

  let lower = trimmed.to_lowercase();
  let words = trimmed.split_whitespace().count();
  let mut notes: Vec<String> = vec![];

  let mut quality: f32 = 0.0;
  let open = ["how", "what", "why", "tell", "which", "where", "when", "walk"];
  if open.iter().any(|w| lower.starts_with(w)) { quality += 35.0; } else { notes.push("Open with how/what to keep it open-ended".into()); }
  if trimmed.ends_with('?') { quality += 25.0; } else { notes.push("Phrase it as a question".into()); }
  if (6..=30).contains(&words) { quality += 25.0; } else { notes.push("Aim for 6-30 words".into()); }
  let ctx = context.to_lowercase();
  let grounded = lower
    .split(|c: char| !c.is_alphanumeric())
    .filter(|w| w.len() >= 5)
    .any(|w| ctx.contains(w));
  if grounded { quality += 15.0; } else { notes.push("Tie it to what the prospect said".into()); }

  let mut naturalness: f32 = 100.0;
  if trimmed.matches('?').count() > 1 { naturalness -= 30.0; notes.push("Ask one question at a time".into()); }
  if words > 35 { naturalness -= 30.0; }
  let closed = ["do you", "are you", "is it", "can you", "did you"];
  if closed.iter().any(|w| lower.starts_with(w)) { naturalness -= 20.0; }
  if trimmed.chars().filter(|c| c.is_alphabetic()).all(|c| c.is_uppercase()) { naturalness -= 20.0; }

  let mut feedback = match identified {
    Some(t) if t == expected => format!("Good {} question.", expected.label()),
    Some(t) => format!("This reads as a {} question; a {} question was asked for.", t.label(), expected.label()),
    None => format!("Hard to tell what type this is. {}", type_hint(expected)),
  };
  if !notes.is_empty() {
    feedback.push(' ');
    feedback.push_str(&notes.join("; "));
    feedback.push('.');
  }

  Judgement {
    identified_type: identified,
    type_accuracy,
    quality_score: quality,
    naturalness_score: naturalness.max(0.0),
    feedback,
    improved_version: None,
  }
}
