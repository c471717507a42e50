//! Minimal OpenAI client implementing the training oracle.
//!
//! We only call chat.completions with a strict JSON object response.
//! Calls are instrumented and log model names, latencies, and response sizes (not contents).
//!
//! NOTE: We never log the API key or trainee answers.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument};

use crate::config::Prompts;
use crate::domain::{GradingResult, Scenario};
use crate::engine::grade::{score_response, Judgement};
use crate::error::{TrainerError, TrainerResult};
use crate::oracle::{GradeRequest, ScenarioRequest, TrainingOracle};
use crate::util::{fill_template, trunc_for_log};

#[derive(Clone)]
pub struct OpenAI {
  pub client: reqwest::Client,
  pub api_key: String,
  pub base_url: String,
  pub fast_model: String,
  pub strong_model: String,
  prompts: Prompts,
}

/// Scenario fields as the model returns them. Missing type is filled from the request.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenScenario {
  scenario_context: String,
  prospect_statement: String,
  #[serde(default)]
  prospect_persona: Option<String>,
  #[serde(default)]
  sample_question: Option<String>,
  #[serde(default)]
  correct_answer: Option<String>,
  #[serde(default)]
  hints: Vec<String>,
}

impl OpenAI {
  /// Construct the client if we find OPENAI_API_KEY; otherwise return None.
  pub fn from_env(prompts: Prompts) -> Option<Self> {
    let api_key = std::env::var("OPENAI_API_KEY").ok()?;
    let base_url =
      std::env::var("OPENAI_BASE_URL").unwrap_or_else(|_| "https://api.openai.com/v1".into());
    let fast_model =
      std::env::var("OPENAI_FAST_MODEL").unwrap_or_else(|_| "gpt-4o-mini".into());
    let strong_model =
      std::env::var("OPENAI_STRONG_MODEL").unwrap_or_else(|_| "gpt-4o".into());

    let client = reqwest::Client::builder()
      .timeout(Duration::from_secs(20))
      .build()
      .ok()?;

    Some(Self { client, api_key, base_url, fast_model, strong_model, prompts })
  }

  /// JSON-object chat completion. Generic over the target type T.
  #[instrument(level = "info", skip(self, system, user), fields(model = %model))]
  async fn chat_json<T: for<'a> Deserialize<'a>>(
    &self,
    model: &str,
    system: &str,
    user: &str,
    temperature: f32,
  ) -> Result<T, String> {
    let url = format!("{}/chat/completions", self.base_url);
    let req = ChatCompletionRequest {
      model: model.to_string(),
      messages: vec![
        ChatMessageReq { role: "system".into(), content: system.into() },
        ChatMessageReq { role: "user".into(), content: user.into() },
      ],
      temperature,
      response_format: Some(ResponseFormat { r#type: "json_object".into() }),
      max_tokens: None,
    };

    let res = self.client.post(&url)
      .header(USER_AGENT, "spin-trainer-backend/0.1")
      .header(CONTENT_TYPE, "application/json")
      .header(AUTHORIZATION, format!("Bearer {}", self.api_key))
      .json(&req).send().await.map_err(|e| e.to_string())?;

    if !res.status().is_success() {
      let status = res.status();
      let body = res.text().await.unwrap_or_default();
      let msg = extract_openai_error(&body).unwrap_or_else(|| trunc_for_log(&body, 200));
      return Err(format!("OpenAI HTTP {}: {}", status, msg));
    }

    let body: ChatCompletionResponse = res.json().await.map_err(|e| e.to_string())?;
    if let Some(usage) = &body.usage {
      info!(prompt_tokens = ?usage.prompt_tokens, completion_tokens = ?usage.completion_tokens, total_tokens = ?usage.total_tokens, "OpenAI usage");
    }
    let text = body.choices.first()
      .and_then(|c| c.message.content.clone())
      .unwrap_or_default();

    serde_json::from_str::<T>(&text)
      .map_err(|e| format!("JSON parse error: {} in {}", e, trunc_for_log(&text, 120)))
  }
}

#[async_trait]
impl TrainingOracle for OpenAI {
  fn name(&self) -> &'static str { "openai" }

  #[instrument(
    level = "info",
    skip(self, req),
    fields(vertical = %req.vertical, level = %req.level, prompt_type = %req.prompt_type, question_type = %req.question_type, model = %self.strong_model)
  )]
  async fn generate_scenario(&self, req: &ScenarioRequest) -> TrainerResult<Scenario> {
    let level = req.level.to_string();
    let vertical = req.vertical.to_string();
    let prompt_type = req.prompt_type.to_string();
    let question_type = req.question_type.to_string();
    let vars = [
      ("vertical", vertical.as_str()),
      ("level", level.as_str()),
      ("prompt_type", prompt_type.as_str()),
      ("question_type", question_type.as_str()),
      ("question_label", req.question_type.label()),
    ];
    let system = fill_template(&self.prompts.scenario_system, &vars);
    let user = fill_template(&self.prompts.scenario_user_template, &vars);

    let start = Instant::now();
    let gen = self
      .chat_json::<GenScenario>(&self.strong_model, &system, &user, 0.9)
      .await
      .map_err(|e| {
        error!(target: "trainer", elapsed = ?start.elapsed(), error = %e, "Scenario generation failed");
        TrainerError::transient("generateScenario", e)
      })?;
    info!(target: "trainer", elapsed = ?start.elapsed(), context_len = gen.scenario_context.len(), "Scenario generated");

    Ok(Scenario {
      scenario_context: gen.scenario_context,
      prospect_statement: gen.prospect_statement,
      expected_type: req.question_type,
      prospect_persona: gen.prospect_persona.filter(|p| !p.trim().is_empty()),
      sample_question: gen.sample_question.filter(|q| !q.trim().is_empty()),
      correct_answer: gen.correct_answer,
      hints: gen.hints,
    })
  }

  #[instrument(
    level = "info",
    skip(self, req),
    fields(prompt_type = %req.prompt_type, expected = %req.expected_type, answer_len = req.trainee_response.len(), model = %self.fast_model)
  )]
  async fn grade_response(&self, req: &GradeRequest) -> TrainerResult<GradingResult> {
    let prompt_type = req.prompt_type.to_string();
    let expected = req.expected_type.to_string();
    let user = fill_template(
      &self.prompts.grading_user_template,
      &[
        ("prompt_type", prompt_type.as_str()),
        ("expected_type", expected.as_str()),
        ("expected_label", req.expected_type.label()),
        ("context", req.prompt_context.as_str()),
        ("response", req.trainee_response.as_str()),
      ],
    );

    let start = Instant::now();
    let judgement = self
      .chat_json::<Judgement>(&self.fast_model, &self.prompts.grading_system, &user, 0.2)
      .await
      .map_err(|e| {
        error!(target: "trainer", elapsed = ?start.elapsed(), error = %e, "Grading failed");
        TrainerError::transient("gradeResponse", e)
      })?;
    let result = score_response(judgement, req.expected_type);
    info!(target: "trainer", elapsed = ?start.elapsed(), overall = result.overall_score, grade = ?result.grade, "Response graded");
    Ok(result)
  }
}

// --- Chat DTOs ---

#[derive(Serialize)]
struct ChatCompletionRequest {
  model: String,
  messages: Vec<ChatMessageReq>,
  temperature: f32,
  #[serde(skip_serializing_if = "Option::is_none")]
  response_format: Option<ResponseFormat>,
  #[serde(skip_serializing_if = "Option::is_none")]
  max_tokens: Option<u32>,
}
#[derive(Serialize)]
struct ChatMessageReq { role: String, content: String }
#[derive(Serialize)]
struct ResponseFormat { #[serde(rename = "type")] r#type: String }

#[derive(Deserialize)]
struct ChatCompletionResponse {
  choices: Vec<ChatChoice>,
  #[serde(default)] usage: Option<Usage>,
}
#[derive(Deserialize)]
struct ChatChoice { message: ChatMessageResp }
#[derive(Deserialize)]
struct ChatMessageResp { content: Option<String> }
#[derive(Deserialize)]
struct Usage {
  #[serde(default)] prompt_tokens: Option<u32>,
  #[serde(default)] completion_tokens: Option<u32>,
  #[serde(default)] total_tokens: Option<u32>,
}

/// Try to extract a clean error message from OpenAI error body.
fn extract_openai_error(body: &str) -> Option<String> {
  #[derive(Deserialize)]
  struct EWrap { error: EObj }
  #[derive(Deserialize)]
  struct EObj { message: String }
  serde_json::from_str::<EWrap>(body).ok().map(|w| w.error.message)
}
