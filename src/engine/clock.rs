//! Time sources. Countdowns advance on explicit ticks; the clock is only used
//! to measure how long a trainee took to answer.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

pub trait Clock: Send + Sync {
  /// Monotonic milliseconds since an arbitrary origin.
  fn now_ms(&self) -> u64;
}

/// Production clock backed by Tokio's monotonic instant (pausable in tests).
pub struct TokioClock {
  origin: tokio::time::Instant,
}

impl TokioClock {
  pub fn new() -> Self {
    Self { origin: tokio::time::Instant::now() }
  }
}

impl Default for TokioClock {
  fn default() -> Self { Self::new() }
}

impl Clock for TokioClock {
  fn now_ms(&self) -> u64 {
    self.origin.elapsed().as_millis() as u64
  }
}

/// Hand-advanced clock for deterministic tests.
#[allow(dead_code)]
#[derive(Clone, Default)]
pub struct ManualClock {
  ms: Arc<AtomicU64>,
}

#[allow(dead_code)]
impl ManualClock {
  pub fn new() -> Self { Self::default() }

  pub fn advance_ms(&self, ms: u64) {
    self.ms.fetch_add(ms, Ordering::SeqCst);
  }
}

impl Clock for ManualClock {
  fn now_ms(&self) -> u64 {
    self.ms.load(Ordering::SeqCst)
  }
}
