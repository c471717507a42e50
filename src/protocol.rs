//! Public protocol structs for WebSocket and HTTP endpoints (serde ready).
//! Keep this small and stable to evolve backend and frontend independently.

use serde::{Deserialize, Serialize};

use crate::domain::{Level, PromptType, TraineeProgress};
use crate::engine::summary::{BreakDecision, SessionSummary};
use crate::engine::{Command, SessionEvent, SessionView};
use crate::error::TrainerError;
use crate::store::StoredResponse;

/// Configuration for a new training run. Mode and vertical are parsed leniently.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartSessionIn {
    pub trainee_id: String,
    pub mode: String,
    pub level: u8,
    pub vertical: String,
    /// Pomodoro length; the configured default when absent.
    #[serde(default)]
    pub timer_duration_seconds: Option<u32>,
}

/// One engine action, shared by `POST /sessions/{id}/actions` and the WebSocket.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ActionIn {
    UpdateDraft { text: String },
    Submit { answer: String },
    NextQuestion,
    Retry,
    Pause,
    Resume,
    ContinueTraining,
    EndSession,
    BreakDecision { decision: BreakDecision },
    Abandon,
}

impl From<ActionIn> for Command {
    fn from(a: ActionIn) -> Self {
        match a {
            ActionIn::UpdateDraft { text } => Command::UpdateDraft(text),
            ActionIn::Submit { answer } => Command::Submit(answer),
            ActionIn::NextQuestion => Command::NextQuestion,
            ActionIn::Retry => Command::Retry,
            ActionIn::Pause => Command::Pause,
            ActionIn::Resume => Command::Resume,
            ActionIn::ContinueTraining | ActionIn::BreakDecision { decision: BreakDecision::ContinueTraining } => {
                Command::ContinueTraining
            }
            ActionIn::EndSession | ActionIn::BreakDecision { decision: BreakDecision::EndSession } => {
                Command::EndSession
            }
            ActionIn::Abandon => Command::Abandon,
        }
    }
}

/// Messages the client can send over WebSocket.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientWsMessage {
    Ping,
    StartSession(StartSessionIn),
    Action {
        #[serde(flatten)]
        action: ActionIn,
    },
}

/// Messages the server sends back over WebSocket.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerWsMessage {
    Pong,
    Session {
        view: Box<SessionView>,
    },
    ResponseTick {
        remaining: u32,
    },
    SessionTick {
        remaining: u32,
    },
    TimedOut {
        #[serde(rename = "autoAnswer")]
        auto_answer: String,
    },
    Summary {
        summary: SessionSummary,
    },
    Error {
        message: String,
        retryable: bool,
    },
}

impl From<SessionEvent> for ServerWsMessage {
    fn from(e: SessionEvent) -> Self {
        match e {
            SessionEvent::View { view } => ServerWsMessage::Session { view },
            SessionEvent::ResponseTick { remaining } => ServerWsMessage::ResponseTick { remaining },
            SessionEvent::SessionTick { remaining } => ServerWsMessage::SessionTick { remaining },
            SessionEvent::TimedOut { auto_answer } => ServerWsMessage::TimedOut { auto_answer },
            SessionEvent::Summary { summary } => ServerWsMessage::Summary { summary },
            SessionEvent::Error { message, retryable } => ServerWsMessage::Error { message, retryable },
        }
    }
}

impl From<&TrainerError> for ServerWsMessage {
    fn from(e: &TrainerError) -> Self {
        ServerWsMessage::Error { message: e.to_string(), retryable: e.is_retryable() }
    }
}

//
// HTTP request/response DTOs
//

#[derive(Serialize)]
pub struct HealthOut {
    pub ok: bool,
}

#[derive(Debug, Serialize)]
pub struct ErrorOut {
    pub message: String,
    pub retryable: bool,
}

#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LevelLockOut {
    pub level: Level,
    pub prompt_type: PromptType,
    pub locked: bool,
    /// Cumulative XP needed to leave this level; none for the top level.
    pub xp_to_advance: Option<u32>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressOut {
    pub progress: TraineeProgress,
    pub levels: Vec<LevelLockOut>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponsesOut {
    pub session_id: String,
    pub responses: Vec<StoredResponse>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ws_action_messages_map_to_commands() {
        let msg: ClientWsMessage =
            serde_json::from_str(r#"{"type":"action","action":"submit","answer":"How many reps?"}"#).unwrap();
        let ClientWsMessage::Action { action } = msg else { panic!("expected action") };
        assert!(matches!(Command::from(action), Command::Submit(a) if a == "How many reps?"));

        let msg: ClientWsMessage =
            serde_json::from_str(r#"{"type":"action","action":"break_decision","decision":"end_session"}"#).unwrap();
        let ClientWsMessage::Action { action } = msg else { panic!("expected action") };
        assert!(matches!(Command::from(action), Command::EndSession));
    }

    #[test]
    fn start_session_timer_is_optional() {
        let msg: ClientWsMessage = serde_json::from_str(
            r#"{"type":"start_session","traineeId":"t1","mode":"practice","level":2,"vertical":"leadgen"}"#,
        )
        .unwrap();
        let ClientWsMessage::StartSession(config) = msg else { panic!("expected start") };
        assert_eq!(config.level, 2);
        assert_eq!(config.timer_duration_seconds, None);
    }

    #[test]
    fn server_ticks_are_tagged() {
        let json = serde_json::to_value(ServerWsMessage::from(SessionEvent::ResponseTick { remaining: 7 })).unwrap();
        assert_eq!(json, serde_json::json!({"type": "response_tick", "remaining": 7}));
    }
}
