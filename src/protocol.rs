//! Public protocol structs for WebSocket and HTTP endpoints (serde ready).
//! Expected values never leave the server except as feedback on an incorrect answer.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{ExerciseRecord, ExerciseType};
use crate::resolver::{answerable_fields, FieldDescriptor};
use crate::session::{SessionError, SessionManager, SessionStatus};
use crate::util::format_significant;
use crate::verifier::{VerificationResult, Verdict};

/// Significant digits used when disclosing an expected value.
pub const FEEDBACK_DIGITS: usize = 4;

/// Messages the client can send over WebSocket.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientWsMessage {
    Ping,
    Generate {
        #[serde(default, rename = "exerciseType")]
        exercise_type: Option<String>,
    },
    Next,
    Back,
    SwitchType {
        #[serde(rename = "exerciseType")]
        exercise_type: String,
    },
    SubmitAnswer {
        #[serde(rename = "fieldId")]
        field_id: String,
        value: String,
    },
    Current,
}

/// Messages the server sends back over WebSocket.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerWsMessage {
    Pong,
    Session {
        #[serde(rename = "sessionId")]
        session_id: Uuid,
        #[serde(rename = "exerciseType")]
        exercise_type: ExerciseType,
    },
    Exercise {
        exercise: ExerciseView,
    },
    AnswerResult {
        result: AnswerOut,
    },
    /// Navigation signal (e.g. already at the first exercise). State is unchanged.
    Notice {
        code: String,
        message: String,
    },
    Error {
        code: String,
        message: String,
    },
}

/// What the learner sees of the current exercise.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExerciseView {
    pub session_id: Uuid,
    pub exercise_id: Uuid,
    pub exercise_type: ExerciseType,
    pub question_text: String,
    pub answerable_fields: Vec<FieldDescriptor>,
    pub diagram_ref: String,
    pub diagram_mime: &'static str,
    /// Zero-based index into the session history.
    pub position: usize,
    pub total: usize,
    pub has_prev: bool,
    pub has_next: bool,
    /// When the generator produced this exercise; stable across navigation.
    pub created_at: DateTime<Utc>,
    /// Inline `data:` URI, only sent over WebSocket.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diagram_data_uri: Option<String>,
}

pub fn diagram_path(session_id: Uuid, exercise_id: Uuid) -> String {
    format!("/api/v1/sessions/{session_id}/exercises/{exercise_id}/diagram")
}

impl ExerciseView {
    /// View of the session's current exercise.
    pub fn current(session: &SessionManager) -> Result<Self, SessionError> {
        let record = session.current()?;
        let (position, total, has_prev, has_next) = match session.status() {
            SessionStatus::Active { position, len, has_prev, has_next } => (position, len, has_prev, has_next),
            SessionStatus::Empty => return Err(SessionError::NoCurrent),
        };
        Ok(Self::build(session.id(), record, position, total, has_prev, has_next))
    }

    fn build(session_id: Uuid, record: &ExerciseRecord, position: usize, total: usize, has_prev: bool, has_next: bool) -> Self {
        Self {
            session_id,
            exercise_id: record.id(),
            exercise_type: record.exercise_type(),
            question_text: record.question_text().to_string(),
            answerable_fields: answerable_fields(record),
            diagram_ref: diagram_path(session_id, record.id()),
            diagram_mime: record.diagram().best().1,
            position,
            total,
            has_prev,
            has_next,
            created_at: record.created_at(),
            diagram_data_uri: None,
        }
    }

    pub fn with_inline_diagram(mut self, record: &ExerciseRecord) -> Self {
        let (bytes, mime) = record.diagram().best();
        self.diagram_data_uri = Some(format!("data:{mime};base64,{}", STANDARD.encode(bytes)));
        self
    }
}

/// Grading outcome for one field.
#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AnswerOut {
    pub field_id: String,
    pub verdict: Verdict,
    pub correct: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub relative_error: Option<f64>,
    /// Only disclosed for incorrect answers.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected: Option<String>,
    pub feedback: String,
}

impl From<&VerificationResult> for AnswerOut {
    fn from(r: &VerificationResult) -> Self {
        let expected = match (r.verdict, r.expected_value) {
            (Verdict::Incorrect, Some(v)) => Some(format_significant(v, FEEDBACK_DIGITS)),
            _ => None,
        };
        let feedback = match r.verdict {
            Verdict::Correct => "✓ Correct!".to_string(),
            Verdict::Incorrect => format!("✗ Incorrect (expected: {})", expected.as_deref().unwrap_or("?")),
            Verdict::Unparseable => "✖ Invalid number".to_string(),
            Verdict::NoSolution => "✖ Solution not available".to_string(),
        };
        Self {
            field_id: r.field_id.clone(),
            verdict: r.verdict,
            correct: r.is_correct(),
            relative_error: r.relative_error,
            expected,
            feedback,
        }
    }
}

//
// HTTP request/response DTOs
//

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionIn {
    #[serde(default)]
    pub exercise_type: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionOut {
    pub session_id: Uuid,
    pub exercise_type: ExerciseType,
}

#[derive(Debug, Deserialize)]
pub struct GenerateQuery {
    #[serde(default, rename = "type")]
    pub exercise_type: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwitchTypeIn {
    pub exercise_type: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerIn {
    pub field_id: String,
    pub value: String,
}

#[derive(Debug, Deserialize)]
pub struct AnswersIn {
    pub answers: Vec<AnswerIn>,
}

#[derive(Serialize)]
pub struct HealthOut {
    pub ok: bool,
    pub sessions: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(verdict: Verdict, expected: Option<f64>) -> VerificationResult {
        VerificationResult {
            field_id: "power_R1".into(),
            user_value: Some(1.0),
            expected_value: expected,
            relative_error: Some(0.5),
            verdict,
        }
    }

    #[test]
    fn expected_disclosed_only_when_incorrect() {
        let wrong = AnswerOut::from(&result(Verdict::Incorrect, Some(3.2)));
        assert_eq!(wrong.expected.as_deref(), Some("3.200"));
        assert_eq!(wrong.feedback, "✗ Incorrect (expected: 3.200)");
        assert!(!wrong.correct);

        let right = AnswerOut::from(&result(Verdict::Correct, Some(3.2)));
        assert!(right.expected.is_none());
        assert!(right.correct);

        let garbage = AnswerOut::from(&result(Verdict::Unparseable, Some(3.2)));
        assert!(garbage.expected.is_none());
    }

    #[test]
    fn answer_out_serializes_camel_case_without_expected() {
        let json = serde_json::to_value(AnswerOut::from(&result(Verdict::Correct, Some(3.2)))).unwrap();
        assert_eq!(json["fieldId"], "power_R1");
        assert_eq!(json["verdict"], "correct");
        assert!(json.get("expected").is_none());
    }

    #[test]
    fn client_messages_parse() {
        let m: ClientWsMessage =
            serde_json::from_str(r#"{"type":"submit_answer","fieldId":"tau","value":"0.1"}"#).unwrap();
        assert!(matches!(m, ClientWsMessage::SubmitAnswer { ref field_id, .. } if field_id == "tau"));
        let m: ClientWsMessage = serde_json::from_str(r#"{"type":"generate"}"#).unwrap();
        assert!(matches!(m, ClientWsMessage::Generate { exercise_type: None }));
    }
}
