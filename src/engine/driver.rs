//! Session driver: one Tokio task per training run.
//!
//! The task owns the `SessionMachine` and is the only place it is touched.
//! Ticks (1 Hz interval), user commands and completed I/O all arrive through
//! `select!`, so callbacks are serialized. I/O effects run as spawned tasks and
//! report back through the outcome mailbox; the machine drops stale ones.
//!
//! A session parked on a break or a pause with no commands for the idle
//! timeout is wound down, so runs whose client went away do not live forever.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, Instrument};

use crate::domain::{CompletionOutcome, GradingResult, Scenario};
use crate::engine::machine::{Effect, SessionEvent, SessionMachine, SessionView};
use crate::error::{TrainerError, TrainerResult};
use crate::oracle::TrainingOracle;
use crate::store::SessionStore;

const TICK: Duration = Duration::from_secs(1);
const COMMAND_BUFFER: usize = 32;
const EVENT_BUFFER: usize = 128;

/// User-facing actions on a running session.
#[derive(Debug)]
pub enum Command {
  Snapshot,
  UpdateDraft(String),
  Submit(String),
  NextQuestion,
  Retry,
  Pause,
  Resume,
  ContinueTraining,
  EndSession,
  Abandon,
}

impl Command {
  pub fn name(&self) -> &'static str {
    match self {
      Command::Snapshot => "snapshot",
      Command::UpdateDraft(_) => "update_draft",
      Command::Submit(_) => "submit",
      Command::NextQuestion => "next_question",
      Command::Retry => "retry",
      Command::Pause => "pause",
      Command::Resume => "resume",
      Command::ContinueTraining => "continue_training",
      Command::EndSession => "end_session",
      Command::Abandon => "abandon",
    }
  }
}

struct Envelope {
  command: Command,
  reply: oneshot::Sender<TrainerResult<SessionView>>,
}

enum Outcome {
  SessionCreated(u64, TrainerResult<String>),
  Scenario(u64, TrainerResult<Scenario>),
  Graded(u64, TrainerResult<GradingResult>),
  Persisted(u64, TrainerResult<u32>),
  Completed(u64, TrainerResult<CompletionOutcome>),
}

/// Cloneable handle to a running session task.
#[derive(Clone)]
pub struct SessionHandle {
  run_id: String,
  commands: mpsc::Sender<Envelope>,
  events: broadcast::Sender<SessionEvent>,
  cancel: CancellationToken,
}

impl SessionHandle {
  pub fn run_id(&self) -> &str { &self.run_id }

  /// Apply a command and return the resulting view. Fails with `SessionEnded`
  /// once the task has stopped.
  pub async fn send(&self, command: Command) -> TrainerResult<SessionView> {
    let (reply, rx) = oneshot::channel();
    self.commands
      .send(Envelope { command, reply })
      .await
      .map_err(|_| TrainerError::SessionEnded)?;
    rx.await.map_err(|_| TrainerError::SessionEnded)?
  }

  pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
    self.events.subscribe()
  }

  /// Stop the task. Both countdowns die with it; late I/O results are dropped.
  pub fn shutdown(&self) {
    self.cancel.cancel();
  }

  pub fn is_closed(&self) -> bool {
    self.commands.is_closed()
  }
}

pub struct SessionDriver {
  machine: SessionMachine,
  oracle: Arc<dyn TrainingOracle>,
  store: Arc<dyn SessionStore>,
  events: broadcast::Sender<SessionEvent>,
  outcomes: mpsc::UnboundedSender<Outcome>,
  cancel: CancellationToken,
  idle_timeout: Duration,
}

impl SessionDriver {
  /// Spawn the task and return its handle. The machine is started immediately.
  pub fn spawn(
    run_id: String,
    machine: SessionMachine,
    oracle: Arc<dyn TrainingOracle>,
    store: Arc<dyn SessionStore>,
    idle_timeout: Duration,
  ) -> SessionHandle {
    let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_BUFFER);
    let (out_tx, out_rx) = mpsc::unbounded_channel();
    let (events, _) = broadcast::channel(EVENT_BUFFER);
    let cancel = CancellationToken::new();

    let driver = SessionDriver {
      machine,
      oracle,
      store,
      events: events.clone(),
      outcomes: out_tx,
      cancel: cancel.clone(),
      idle_timeout,
    };
    let span = tracing::info_span!(target: "trainer", "session", run_id = %run_id);
    tokio::spawn(driver.run(cmd_rx, out_rx).instrument(span));

    SessionHandle { run_id, commands: cmd_tx, events, cancel }
  }

  async fn run(mut self, mut commands: mpsc::Receiver<Envelope>, mut outcomes: mpsc::UnboundedReceiver<Outcome>) {
    let effects = self.machine.start();
    self.apply(effects);

    let mut ticker = interval_at(Instant::now() + TICK, TICK);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut last_command = Instant::now();

    loop {
      tokio::select! {
        biased;
        _ = self.cancel.cancelled() => {
          if !self.machine.is_terminal() {
            let effects = self.machine.abandon().unwrap_or_default();
            self.apply(effects);
          }
          break;
        }
        Some(outcome) = outcomes.recv() => {
          let effects = self.on_outcome(outcome);
          self.apply(effects);
        }
        msg = commands.recv() => match msg {
          Some(Envelope { command, reply }) => {
            last_command = Instant::now();
            let result = self.handle(command);
            let _ = reply.send(result);
          }
          None => {
            debug!(target: "trainer", "All handles dropped; abandoning");
            if !self.machine.is_terminal() {
              let effects = self.machine.abandon().unwrap_or_default();
              self.apply(effects);
            }
            break;
          }
        },
        _ = ticker.tick() => {
          let mut effects = self.machine.on_tick();
          if self.machine.is_parked() && last_command.elapsed() >= self.idle_timeout {
            debug!(target: "trainer", phase = %self.machine.phase(), idle_secs = last_command.elapsed().as_secs(), "Idle timeout");
            effects.extend(self.machine.expire_idle());
            last_command = Instant::now();
          }
          self.apply(effects);
        }
      }
      if self.machine.is_terminal() {
        break;
      }
    }
    self.cancel.cancel();
    let stats = self.machine.stats();
    info!(target: "trainer", answered = stats.questions_answered, xp = stats.total_xp, "Session task stopped");
  }

  #[instrument(level = "debug", skip(self, command), fields(command = command.name(), phase = %self.machine.phase()))]
  fn handle(&mut self, command: Command) -> TrainerResult<SessionView> {
    let effects = match command {
      Command::Snapshot => Vec::new(),
      Command::UpdateDraft(text) => self.machine.update_draft(text)?,
      Command::Submit(answer) => self.machine.submit(answer)?,
      Command::NextQuestion => self.machine.next_question()?,
      Command::Retry => self.machine.retry()?,
      Command::Pause => self.machine.pause()?,
      Command::Resume => self.machine.resume()?,
      Command::ContinueTraining => self.machine.continue_training()?,
      Command::EndSession => self.machine.end_session()?,
      Command::Abandon => self.machine.abandon()?,
    };
    self.apply(effects);
    Ok(self.machine.view())
  }

  fn on_outcome(&mut self, outcome: Outcome) -> Vec<Effect> {
    debug!(target: "trainer", current = self.machine.generation(), "I/O outcome received");
    match outcome {
      Outcome::SessionCreated(generation, r) => self.machine.on_session_created(generation, r),
      Outcome::Scenario(generation, r) => self.machine.on_scenario(generation, r),
      Outcome::Graded(generation, r) => self.machine.on_graded(generation, r),
      Outcome::Persisted(generation, r) => self.machine.on_persisted(generation, r),
      Outcome::Completed(generation, r) => self.machine.on_session_completed(generation, r),
    }
  }

  fn apply(&self, effects: Vec<Effect>) {
    for effect in effects {
      match effect {
        Effect::Notify(event) => {
          // No subscribers is fine.
          let _ = self.events.send(event);
        }
        Effect::CreateSession { generation, request } => {
          let store = self.store.clone();
          self.spawn_io(async move { Outcome::SessionCreated(generation, store.create_session(&request).await) });
        }
        Effect::GenerateScenario { generation, request } => {
          let oracle = self.oracle.clone();
          self.spawn_io(async move { Outcome::Scenario(generation, oracle.generate_scenario(&request).await) });
        }
        Effect::GradeResponse { generation, request } => {
          let oracle = self.oracle.clone();
          self.spawn_io(async move { Outcome::Graded(generation, oracle.grade_response(&request).await) });
        }
        Effect::PersistResponse { generation, record } => {
          let store = self.store.clone();
          self.spawn_io(async move { Outcome::Persisted(generation, store.persist_response(&record).await) });
        }
        Effect::CompleteSession { generation, session_id, counted } => {
          let store = self.store.clone();
          self.spawn_io(async move {
            Outcome::Completed(generation, store.complete_session(&session_id, &counted).await)
          });
        }
      }
    }
  }

  fn spawn_io<F>(&self, fut: F)
  where
    F: std::future::Future<Output = Outcome> + Send + 'static,
  {
    let tx = self.outcomes.clone();
    tokio::spawn(
      async move {
        // The driver may be gone by now; the result is simply dropped.
        let _ = tx.send(fut.await);
      }
      .in_current_span(),
    );
  }
}
