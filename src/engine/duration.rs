//! Response-time budgets per training mode. The response timer reads these and
//! nothing else hard-codes them.

use crate::domain::TrainingMode;

/// Seconds the trainee has to answer one question. `0` means no timer.
pub const fn response_seconds(mode: TrainingMode) -> u32 {
  match mode {
    TrainingMode::Learn => 0,
    TrainingMode::Practice => 30,
    TrainingMode::LiveSim => 15,
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn budgets_per_mode() {
    assert_eq!(response_seconds(TrainingMode::Learn), 0);
    assert_eq!(response_seconds(TrainingMode::Practice), 30);
    assert_eq!(response_seconds(TrainingMode::LiveSim), 15);
  }
}
