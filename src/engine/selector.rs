//! Question selection: prompt type from the level table, SPIN type from an
//! injectable sampler. This is the only source of randomness in the engine.

use std::collections::VecDeque;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use tracing::debug;

use crate::domain::{Level, PromptType, SpinType, TrainingMode};

pub trait SpinSampler: Send {
  fn next(&mut self) -> SpinType;
}

/// Uniform sampler over {S, P, I, N}.
pub struct RandomSampler {
  rng: StdRng,
}

impl RandomSampler {
  pub fn from_entropy() -> Self {
    Self { rng: StdRng::from_entropy() }
  }

  #[allow(dead_code)]
  pub fn seeded(seed: u64) -> Self {
    Self { rng: StdRng::seed_from_u64(seed) }
  }
}

impl SpinSampler for RandomSampler {
  fn next(&mut self) -> SpinType {
    *SpinType::ALL.choose(&mut self.rng).unwrap_or(&SpinType::S)
  }
}

/// Replays a fixed sequence, cycling when exhausted.
#[allow(dead_code)]
pub struct FixedSequence {
  seq: VecDeque<SpinType>,
}

#[allow(dead_code)]
impl FixedSequence {
  pub fn new(seq: impl IntoIterator<Item = SpinType>) -> Self {
    Self { seq: seq.into_iter().collect() }
  }
}

impl SpinSampler for FixedSequence {
  fn next(&mut self) -> SpinType {
    match self.seq.pop_front() {
      Some(t) => {
        self.seq.push_back(t);
        t
      }
      None => SpinType::S,
    }
  }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct QuestionPlan {
  pub prompt_type: PromptType,
  pub question_type: SpinType,
}

pub struct QuestionSelector {
  sampler: Box<dyn SpinSampler>,
}

impl QuestionSelector {
  pub fn new(sampler: Box<dyn SpinSampler>) -> Self {
    Self { sampler }
  }

  pub fn select(&mut self, level: Level, mode: TrainingMode) -> QuestionPlan {
    let prompt_type = level.prompt_type();
    let question_type = match prompt_type.fixed_type() {
      Some(t) => t,
      None => self.sampler.next(),
    };
    debug!(target: "trainer", %level, %mode, %prompt_type, %question_type, "Question selected");
    QuestionPlan { prompt_type, question_type }
  }
}
