//! WebSocket upgrade + message loop. One exercise session per connection; messages
//! are handled strictly one at a time and each gets a single JSON reply.

use std::sync::Arc;
use axum::{
  extract::{
    ws::{Message, WebSocket},
    Query, State, WebSocketUpgrade,
  },
  response::IntoResponse,
};
use tracing::{debug, error, info, instrument};

use crate::domain::ExerciseType;
use crate::error::ApiError;
use crate::routes::http::parse_type;
use crate::protocol::{AnswerOut, ClientWsMessage, ExerciseView, GenerateQuery, ServerWsMessage};
use crate::session::{SessionError, SessionManager};
use crate::state::AppState;

#[instrument(level = "info", skip(ws, state))]
pub async fn ws_upgrade(
  ws: WebSocketUpgrade,
  State(state): State<Arc<AppState>>,
  Query(q): Query<GenerateQuery>,
) -> Result<impl IntoResponse, ApiError> {
  info!(target: "circuit_tutor", "WebSocket upgrade requested");
  let kind = parse_type(q.exercise_type.as_deref())?;
  Ok(ws.on_upgrade(move |socket| handle_ws(socket, state, kind)))
}

#[instrument(level = "info", skip(socket, state))]
async fn handle_ws(mut socket: WebSocket, state: Arc<AppState>, kind: Option<ExerciseType>) {
  let (session_id, handle) = state.create_session(kind).await;
  info!(target: "circuit_tutor", session = %session_id, "WebSocket connected");

  let hello = {
    let s = handle.lock().await;
    ServerWsMessage::Session { session_id, exercise_type: s.exercise_type() }
  };
  if send(&mut socket, &hello).await {
    while let Some(received) = socket.recv().await {
      let msg = match received {
        Ok(msg) => msg,
        Err(e) => {
          debug!(target: "circuit_tutor", session = %session_id, error = %e, "WS receive error");
          break;
        }
      };
      match msg {
        Message::Text(txt) => {
          let reply = match serde_json::from_str::<ClientWsMessage>(&txt) {
            Ok(incoming) => {
              debug!(target: "circuit_tutor", "WS received: {:?}", &incoming);
              let mut session = handle.lock().await;
              if session.is_closed() {
                let _ = send(&mut socket, &closed_reply()).await;
                break;
              }
              handle_client_ws(incoming, &mut session).await
            }
            Err(e) => ServerWsMessage::Error { code: "invalid_json".into(), message: format!("Invalid JSON: {}", e) },
          };
          if !send(&mut socket, &reply).await {
            break;
          }
        }
        Message::Ping(payload) => { let _ = socket.send(Message::Pong(payload)).await; }
        Message::Close(_) => {
          debug!(target: "circuit_tutor", session = %session_id, "WS close frame");
          break;
        }
        _ => {}
      }
    }
  }

  state.remove_session(session_id).await;
  info!(target: "circuit_tutor", session = %session_id, "WebSocket disconnected");
}

async fn send(socket: &mut WebSocket, msg: &ServerWsMessage) -> bool {
  let out = serde_json::to_string(msg).unwrap_or_else(|e| {
    serde_json::json!({ "type": "error", "code": "serialization", "message": format!("Serialization error: {}", e) }).to_string()
  });
  match socket.send(Message::Text(out)).await {
    Ok(()) => true,
    Err(e) => {
      error!(target: "circuit_tutor", error = %e, "WS send error");
      false
    }
  }
}

/// Current exercise with its diagram inlined, or the matching error message.
fn exercise_reply(session: &SessionManager) -> ServerWsMessage {
  let view = ExerciseView::current(session).and_then(|v| Ok(v.with_inline_diagram(session.current()?)));
  match view {
    Ok(exercise) => ServerWsMessage::Exercise { exercise },
    Err(e) => error_reply(e),
  }
}

/// Sent when the registry evicted this connection's session.
fn closed_reply() -> ServerWsMessage {
  ServerWsMessage::Error { code: "unknown_session".into(), message: "session was closed".into() }
}

fn error_reply(e: SessionError) -> ServerWsMessage {
  match e {
    SessionError::AtStart => ServerWsMessage::Notice { code: e.code().into(), message: e.to_string() },
    other => ServerWsMessage::Error { code: other.code().into(), message: other.to_string() },
  }
}

#[instrument(level = "info", skip(session), fields(session = %session.id()))]
async fn handle_client_ws(msg: ClientWsMessage, session: &mut SessionManager) -> ServerWsMessage {
  let outcome: Result<(), SessionError> = match msg {
    ClientWsMessage::Ping => return ServerWsMessage::Pong,

    ClientWsMessage::Generate { exercise_type } => {
      match exercise_type.as_deref().map(str::parse::<ExerciseType>).transpose() {
        Ok(kind) => session.generate(kind).await.map(|_| ()),
        Err(e) => Err(e.into()),
      }
    }

    ClientWsMessage::Next => session.go_forward().await.map(|_| ()),

    ClientWsMessage::Back => session.go_back().map(|_| ()),

    ClientWsMessage::SwitchType { exercise_type } => match exercise_type.parse::<ExerciseType>() {
      Ok(kind) => session.switch_type(kind).await.map(|_| ()),
      Err(e) => Err(e.into()),
    },

    ClientWsMessage::SubmitAnswer { field_id, value } => {
      return match session.submit_answer(&field_id, &value) {
        Ok(result) => ServerWsMessage::AnswerResult { result: AnswerOut::from(&result) },
        Err(e) => error_reply(e),
      };
    }

    ClientWsMessage::Current => Ok(()),
  };

  match outcome {
    Ok(()) => exercise_reply(session),
    Err(e) => error_reply(e),
  }
}
