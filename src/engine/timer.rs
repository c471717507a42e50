//! Countdown timers driven by whole-second ticks.
//!
//! Neither timer owns a thread or a Tokio interval. The session driver feeds
//! ticks in, and each `tick()` returns at most one event. Terminal events
//! (timeout / completion) are produced at most once per countdown: firing
//! deactivates the countdown, so later ticks return `None`. A countdown that is
//! somehow still live after firing is reported as a timer invariant violation
//! and swallowed, so downstream auto-submit and finalization never run twice.

use crate::engine::duration::response_seconds;
use crate::domain::TrainingMode;
use crate::error::timer_invariant_violation;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResponseTick {
  Remaining(u32),
  TimedOut,
}

/// Per-question countdown. In learn mode it is an inert placeholder.
#[derive(Clone, Debug, Default)]
pub struct ResponseTimer {
  budget: u32,
  remaining: u32,
  active: bool,
  fired: bool,
}

impl ResponseTimer {
  pub fn new() -> Self { Self::default() }

  /// Arm the countdown with the budget for `mode`.
  pub fn start(&mut self, mode: TrainingMode) {
    self.budget = response_seconds(mode);
    self.reset();
  }

  /// Cancel any in-flight countdown and restart from the full budget.
  pub fn reset(&mut self) {
    self.remaining = self.budget;
    self.active = self.budget > 0;
    self.fired = false;
  }

  /// Cancel without restarting. No further events until the next start/reset.
  pub fn stop(&mut self) {
    self.active = false;
  }

  #[allow(dead_code)]
  pub fn is_active(&self) -> bool { self.active }

  /// Seconds left, or `None` when no countdown is running.
  pub fn remaining(&self) -> Option<u32> {
    self.active.then_some(self.remaining)
  }

  pub fn tick(&mut self) -> Option<ResponseTick> {
    if !self.active {
      return None;
    }
    self.remaining = self.remaining.saturating_sub(1);
    if self.remaining == 0 {
      return self.fire();
    }
    Some(ResponseTick::Remaining(self.remaining))
  }

  fn fire(&mut self) -> Option<ResponseTick> {
    if self.fired {
      timer_invariant_violation("response timer");
      self.active = false;
      return None;
    }
    self.fired = true;
    self.active = false;
    Some(ResponseTick::TimedOut)
  }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionTick {
  Remaining(u32),
  Completed,
}

/// Whole-session Pomodoro countdown.
#[derive(Clone, Debug, Default)]
pub struct SessionTimer {
  remaining: u32,
  running: bool,
  paused: bool,
  completed: bool,
}

impl SessionTimer {
  pub fn new() -> Self { Self::default() }

  pub fn start(&mut self, duration_seconds: u32) {
    self.remaining = duration_seconds;
    self.running = duration_seconds > 0;
    self.paused = false;
    self.completed = false;
  }

  /// Freeze the countdown without losing elapsed time.
  pub fn pause(&mut self) { self.paused = true; }

  pub fn resume(&mut self) { self.paused = false; }

  pub fn stop(&mut self) { self.running = false; }

  #[allow(dead_code)]
  pub fn is_running(&self) -> bool { self.running }

  pub fn remaining(&self) -> Option<u32> {
    self.running.then_some(self.remaining)
  }

  pub fn tick(&mut self) -> Option<SessionTick> {
    if !self.running || self.paused {
      return None;
    }
    self.remaining = self.remaining.saturating_sub(1);
    if self.remaining > 0 {
      return Some(SessionTick::Remaining(self.remaining));
    }
    if self.completed {
      timer_invariant_violation("session timer");
      self.running = false;
      return None;
    }
    self.completed = true;
    self.running = false;
    Some(SessionTick::Completed)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn count_timeouts(t: &mut ResponseTimer, ticks: u32) -> (u32, Option<u32>) {
    let mut timeouts = 0;
    let mut fired_at = None;
    for i in 1..=ticks {
      if let Some(ResponseTick::TimedOut) = t.tick() {
        timeouts += 1;
        fired_at.get_or_insert(i);
      }
    }
    (timeouts, fired_at)
  }

  #[test]
  fn learn_mode_never_times_out() {
    let mut t = ResponseTimer::new();
    t.start(TrainingMode::Learn);
    assert!(!t.is_active());
    assert_eq!(t.remaining(), None);
    let (timeouts, _) = count_timeouts(&mut t, 100_000);
    assert_eq!(timeouts, 0);
  }

  #[test]
  fn practice_times_out_exactly_once_at_thirty() {
    let mut t = ResponseTimer::new();
    t.start(TrainingMode::Practice);
    assert_eq!(t.remaining(), Some(30));
    assert_eq!(t.tick(), Some(ResponseTick::Remaining(29)));
    let (timeouts, fired_at) = count_timeouts(&mut t, 500);
    assert_eq!(timeouts, 1);
    // One tick was consumed above, so the 30th tick overall is index 29 here.
    assert_eq!(fired_at, Some(29));
    assert_eq!(t.tick(), None);
  }

  #[test]
  fn live_sim_budget_is_fifteen() {
    let mut t = ResponseTimer::new();
    t.start(TrainingMode::LiveSim);
    let (timeouts, fired_at) = count_timeouts(&mut t, 40);
    assert_eq!((timeouts, fired_at), (1, Some(15)));
  }

  #[test]
  fn reset_restarts_from_full_budget() {
    let mut t = ResponseTimer::new();
    t.start(TrainingMode::LiveSim);
    for _ in 0..10 {
      t.tick();
    }
    assert_eq!(t.remaining(), Some(5));
    t.reset();
    assert_eq!(t.remaining(), Some(15));
    let (timeouts, fired_at) = count_timeouts(&mut t, 40);
    assert_eq!((timeouts, fired_at), (1, Some(15)));
  }

  #[test]
  fn stopped_timer_emits_nothing() {
    let mut t = ResponseTimer::new();
    t.start(TrainingMode::LiveSim);
    t.tick();
    t.stop();
    let (timeouts, _) = count_timeouts(&mut t, 100);
    assert_eq!(timeouts, 0);
    assert_eq!(t.tick(), None);
  }

  #[test]
  fn session_timer_completes_once_at_duration() {
    let mut t = SessionTimer::new();
    t.start(300);
    let mut completions = 0;
    let mut at = 0;
    for i in 1..=1000 {
      if t.tick() == Some(SessionTick::Completed) {
        completions += 1;
        at = i;
      }
    }
    assert_eq!(completions, 1);
    assert_eq!(at, 300);
    assert!(!t.is_running());
  }

  #[test]
  fn pause_freezes_without_resetting() {
    let mut t = SessionTimer::new();
    t.start(10);
    for _ in 0..4 {
      t.tick();
    }
    t.pause();
    for _ in 0..100 {
      assert_eq!(t.tick(), None);
    }
    assert_eq!(t.remaining(), Some(6));
    t.resume();
    assert_eq!(t.tick(), Some(SessionTick::Remaining(5)));
  }

  #[test]
  #[cfg(debug_assertions)]
  #[should_panic(expected = "response timer fired more than once")]
  fn live_response_timer_after_firing_is_a_defect() {
    let mut t = ResponseTimer::new();
    t.start(TrainingMode::LiveSim);
    count_timeouts(&mut t, 15);
    // Re-arm without going through start/reset.
    t.active = true;
    t.remaining = 1;
    t.tick();
  }

  #[test]
  #[cfg(debug_assertions)]
  #[should_panic(expected = "session timer fired more than once")]
  fn live_session_timer_after_completion_is_a_defect() {
    let mut t = SessionTimer::new();
    t.start(1);
    assert_eq!(t.tick(), Some(SessionTick::Completed));
    t.running = true;
    t.tick();
  }
}
