//! Error taxonomy for the trainer engine and its collaborators.

use thiserror::Error;
use tracing::error;

pub type TrainerResult<T> = Result<T, TrainerError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TrainerError {
  /// Scenario/grading/persistence call failed. Retryable, no state committed.
  #[error("{operation} failed: {message}")]
  TransientIo { operation: &'static str, message: String },

  /// Rejected before a session starts (locked level, unknown mode/vertical, ...).
  #[error("Invalid configuration: {0}")]
  InvalidConfig(String),

  /// A timer tried to fire twice. Programming defect.
  #[error("Timer invariant violated: {0}")]
  TimerInvariant(String),

  /// Action not allowed in the current phase.
  #[error("Action '{action}' is not allowed while {phase}")]
  InvalidAction { phase: String, action: &'static str },

  #[error("Session has ended")]
  SessionEnded,

  #[error("Not found: {0}")]
  NotFound(String),
}

impl TrainerError {
  pub fn transient(operation: &'static str, message: impl Into<String>) -> Self {
    TrainerError::TransientIo { operation, message: message.into() }
  }

  pub fn is_retryable(&self) -> bool {
    matches!(self, TrainerError::TransientIo { .. })
  }
}

/// Report a timer firing more than once: panics in debug builds, logs and
/// carries on in release builds.
pub fn timer_invariant_violation(timer: &str) -> TrainerError {
  let err = TrainerError::TimerInvariant(format!("{timer} fired more than once"));
  error!(target: "trainer", %timer, "{err}");
  debug_assert!(false, "{err}");
  err
}
