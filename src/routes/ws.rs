//! WebSocket upgrade + message loop. One training run per connection.
//!
//! Client messages start a run or forward actions to it. Session events
//! (views, countdown ticks, timeouts, summaries) are pushed as they happen.
//! Closing the socket abandons the run.

use std::sync::Arc;
use axum::{
  extract::{
    ws::{Message, WebSocket},
    State, WebSocketUpgrade,
  },
  response::IntoResponse,
};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, error, info, instrument, warn};

use crate::engine::{Command, SessionEvent, SessionHandle};
use crate::logic::start_session;
use crate::protocol::{ClientWsMessage, ServerWsMessage};
use crate::state::AppState;

#[instrument(level = "info", skip(state))]
pub async fn ws_upgrade(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
  info!(target: "spin_trainer_backend", "WebSocket upgrade requested");
  ws.on_upgrade(move |socket| handle_ws(socket, state))
}

/// Next event of the current run, or never when there is none.
async fn next_event(events: &mut Option<broadcast::Receiver<SessionEvent>>) -> Result<SessionEvent, RecvError> {
  match events {
    Some(rx) => rx.recv().await,
    None => std::future::pending().await,
  }
}

async fn send_msg(socket: &mut WebSocket, msg: &ServerWsMessage) -> bool {
  let out = serde_json::to_string(msg).unwrap_or_else(|e| {
    serde_json::json!({ "type": "error", "message": format!("Serialization error: {}", e), "retryable": false }).to_string()
  });
  match socket.send(Message::Text(out)).await {
    Ok(()) => true,
    Err(e) => {
      error!(target: "spin_trainer_backend", error = %e, "WS send error");
      false
    }
  }
}

#[instrument(level = "info", skip(socket, state))]
async fn handle_ws(mut socket: WebSocket, state: Arc<AppState>) {
  info!(target: "spin_trainer_backend", "WebSocket connected");
  let mut run: Option<SessionHandle> = None;
  let mut events: Option<broadcast::Receiver<SessionEvent>> = None;

  loop {
    tokio::select! {
      incoming = socket.recv() => {
        let txt = match incoming {
          Some(Ok(Message::Text(txt))) => txt,
          Some(Ok(Message::Ping(payload))) => {
            let _ = socket.send(Message::Pong(payload)).await;
            continue;
          }
          Some(Ok(Message::Close(_))) | None => break,
          Some(Err(e)) => {
            warn!(target: "spin_trainer_backend", error = %e, "WS receive error");
            break;
          }
          Some(Ok(_)) => continue,
        };

        let reply = match serde_json::from_str::<ClientWsMessage>(&txt) {
          Ok(ClientWsMessage::Ping) => Some(ServerWsMessage::Pong),
          Ok(ClientWsMessage::StartSession(req)) => {
            if let Some(old) = run.take() {
              state.drop_run(old.run_id()).await;
            }
            events = None;
            match start_session(&state, req).await {
              Ok(handle) => {
                events = Some(handle.subscribe());
                let reply = match handle.send(Command::Snapshot).await {
                  Ok(view) => ServerWsMessage::Session { view: Box::new(view) },
                  Err(e) => ServerWsMessage::from(&e),
                };
                run = Some(handle);
                Some(reply)
              }
              Err(e) => Some(ServerWsMessage::from(&e)),
            }
          }
          Ok(ClientWsMessage::Action { action }) => match &run {
            Some(handle) => {
              let command = Command::from(action);
              debug!(target: "spin_trainer_backend", command = command.name(), "WS action received");
              // Views arrive through the event stream; only failures are answered directly.
              handle.send(command).await.err().map(|e| ServerWsMessage::from(&e))
            }
            None => Some(ServerWsMessage::Error { message: "No active session; send start_session first.".into(), retryable: false }),
          },
          Err(e) => Some(ServerWsMessage::Error { message: format!("Invalid JSON: {}", e), retryable: false }),
        };

        if let Some(msg) = reply {
          if !send_msg(&mut socket, &msg).await {
            break;
          }
        }
      }

      event = next_event(&mut events) => match event {
        Ok(event) => {
          if !send_msg(&mut socket, &ServerWsMessage::from(event)).await {
            break;
          }
        }
        Err(RecvError::Lagged(skipped)) => {
          warn!(target: "spin_trainer_backend", skipped, "WS client lagging; events dropped");
        }
        Err(RecvError::Closed) => {
          debug!(target: "spin_trainer_backend", "Session event stream closed");
          events = None;
        }
      },
    }
  }

  if let Some(handle) = run {
    state.drop_run(handle.run_id()).await;
  }
  info!(target: "spin_trainer_backend", "WebSocket disconnected");
}
