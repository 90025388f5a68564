//! Typed wire protocol for the live game channel.
//!
//! Frames are text, one JSON object per frame, discriminated by a `type`
//! field. Inbound frames are parsed with enough precision to distinguish
//! malformed JSON, unknown message types, and missing payload fields.

use crate::types::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Messages a client may send over the game channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Join { player_name: String },
    BecomeHost {},
    StartGame {},
    PauseGame {},
    ResumeGame {},
    SkipQuestion {},
    EndGame {},
    NextQuestion {},
    Answer {
        question_uuid: QuestionUuid,
        choice_id: ChoiceId,
        time_taken: f64,
    },
    Ping {},
    Reaction { emoji: String },
}

/// Tags accepted on inbound frames, used to tell an unknown `type` apart
/// from a known type with a bad payload.
const CLIENT_MESSAGE_TYPES: &[&str] = &[
    "join",
    "become_host",
    "start_game",
    "pause_game",
    "resume_game",
    "skip_question",
    "end_game",
    "next_question",
    "answer",
    "ping",
    "reaction",
];

/// Events the server emits. Broadcast to the whole session group unless the
/// runtime addresses them to a single sender (join ack, answer ack, pong,
/// errors, state snapshots).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    Joined {
        player: PlayerInfo,
    },
    PlayerJoined {
        player: PlayerInfo,
    },
    HostAssigned {
        player: PlayerInfo,
    },
    GameStarted {},
    Question {
        question: QuestionView,
    },
    AnswerReceived {
        is_correct: bool,
        points_earned: i64,
        reply: String,
    },
    AnswerStats {
        /// "k/n" of answers received over connected players.
        answered: String,
        correct: u32,
    },
    QuestionResult {
        question: QuestionResultView,
        leaderboard: Vec<LeaderboardEntry>,
    },
    Countdown {
        count: u8,
    },
    GamePaused {},
    GameResumed {},
    HostDisconnected {
        message: String,
    },
    PlayerReaction {
        player_id: PlayerId,
        player_name: String,
        emoji: String,
    },
    GameOver {
        leaderboard: Vec<LeaderboardEntry>,
        awards: BTreeMap<String, AwardInfo>,
    },
    SessionState {
        state: SessionState,
        current_question: u32,
        question_count: u32,
        /// Present while a question is in progress, in player-safe form.
        #[serde(skip_serializing_if = "Option::is_none")]
        question: Option<QuestionView>,
        players: Vec<PlayerInfo>,
        leaderboard: Vec<LeaderboardEntry>,
    },
    Pong {},
    Error {
        kind: ErrorKind,
        message: String,
    },
}

/// Machine-readable error kinds surfaced on the live channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    BadFrame,
    UnknownType,
    MissingField,
    NoSuchSession,
    NotJoined,
    Unauthorized,
    AlreadyHasHost,
    StaleQuestion,
    AlreadyAnswered,
    Paused,
    RateLimited,
    InvalidState,
    GenerationFailed,
    StoreUnavailable,
    InternalError,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::BadFrame => "bad_frame",
            ErrorKind::UnknownType => "unknown_type",
            ErrorKind::MissingField => "missing_field",
            ErrorKind::NoSuchSession => "no_such_session",
            ErrorKind::NotJoined => "not_joined",
            ErrorKind::Unauthorized => "unauthorized",
            ErrorKind::AlreadyHasHost => "already_has_host",
            ErrorKind::StaleQuestion => "stale_question",
            ErrorKind::AlreadyAnswered => "already_answered",
            ErrorKind::Paused => "paused",
            ErrorKind::RateLimited => "rate_limited",
            ErrorKind::InvalidState => "invalid_state",
            ErrorKind::GenerationFailed => "generation_failed",
            ErrorKind::StoreUnavailable => "store_unavailable",
            ErrorKind::InternalError => "internal_error",
        }
    }
}

impl ServerEvent {
    pub fn error(kind: ErrorKind, message: impl Into<String>) -> Self {
        ServerEvent::Error {
            kind,
            message: message.into(),
        }
    }
}

/// A frame that could not be decoded into a [`ClientMessage`].
#[derive(Debug, Clone)]
pub struct FrameError {
    pub kind: ErrorKind,
    pub message: String,
}

impl FrameError {
    fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// Decode one inbound text frame.
///
/// Distinguishes the three §7 decode failures: `bad_frame` for JSON that
/// does not parse or carries no string `type`, `unknown_type` for an
/// unrecognized discriminator, and `missing_field` for a known type whose
/// payload does not match its schema.
pub fn parse_client_frame(text: &str) -> Result<ClientMessage, FrameError> {
    let value: serde_json::Value = serde_json::from_str(text)
        .map_err(|e| FrameError::new(ErrorKind::BadFrame, format!("invalid JSON: {}", e)))?;

    let tag = match value.get("type").and_then(|t| t.as_str()) {
        Some(tag) => tag.to_string(),
        None => {
            return Err(FrameError::new(
                ErrorKind::BadFrame,
                "frame has no `type` field",
            ))
        }
    };

    if !CLIENT_MESSAGE_TYPES.contains(&tag.as_str()) {
        return Err(FrameError::new(
            ErrorKind::UnknownType,
            format!("unknown message type `{}`", tag),
        ));
    }

    serde_json::from_value(value).map_err(|e| {
        FrameError::new(
            ErrorKind::MissingField,
            format!("bad payload for `{}`: {}", tag, e),
        )
    })
}

/// Player data as it appears on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerInfo {
    pub id: PlayerId,
    pub name: String,
    pub score: i64,
    pub current_streak: u32,
    pub max_streak: u32,
    pub connected: bool,
    pub is_host: bool,
}

impl From<&Player> for PlayerInfo {
    fn from(p: &Player) -> Self {
        Self {
            id: p.id.clone(),
            name: p.name.clone(),
            score: p.score,
            current_streak: p.current_streak,
            max_streak: p.max_streak,
            connected: p.connected,
            is_host: p.is_host,
        }
    }
}

/// Choice as shown to players: no correctness flag.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChoiceView {
    pub id: ChoiceId,
    pub text: String,
    pub order: u32,
}

impl From<&Choice> for ChoiceView {
    fn from(c: &Choice) -> Self {
        Self {
            id: c.id.clone(),
            text: c.text.clone(),
            order: c.order,
        }
    }
}

/// Question in player-safe form: choices carry no correctness flags and the
/// explanation is withheld until the result reveal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionView {
    pub uuid: QuestionUuid,
    pub order: u32,
    pub text: String,
    pub difficulty: Difficulty,
    pub image_url: String,
    /// Effective limit: per-question override if set, else the quiz default.
    pub time_limit: u32,
    pub choices: Vec<ChoiceView>,
}

impl QuestionView {
    pub fn from_question(q: &Question, quiz_default: u32) -> Self {
        let mut choices: Vec<ChoiceView> = q.choices.iter().map(ChoiceView::from).collect();
        choices.sort_by_key(|c| c.order);
        Self {
            uuid: q.uuid.clone(),
            order: q.order,
            text: q.text.clone(),
            difficulty: q.difficulty,
            image_url: q.image_url.clone(),
            time_limit: q.effective_time_limit(quiz_default),
            choices,
        }
    }
}

/// Question with the answer revealed, for `question_result`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionResultView {
    #[serde(flatten)]
    pub question: QuestionView,
    pub correct_choice: ChoiceView,
    pub explanation: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    pub player_id: PlayerId,
    pub name: String,
    pub score: i64,
    pub streak: u32,
}

impl From<&Player> for LeaderboardEntry {
    fn from(p: &Player) -> Self {
        Self {
            player_id: p.id.clone(),
            name: p.name.clone(),
            score: p.score,
            streak: p.current_streak,
        }
    }
}

/// One end-of-game accolade as it appears in `game_over`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AwardInfo {
    pub player_id: PlayerId,
    pub name: String,
    pub emoji: String,
    pub value: f64,
    pub description: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_valid_frames() {
        let msg = parse_client_frame(r#"{"type":"join","player_name":"Alice"}"#).unwrap();
        assert!(matches!(msg, ClientMessage::Join { player_name } if player_name == "Alice"));

        let msg = parse_client_frame(
            r#"{"type":"answer","question_uuid":"u1","choice_id":"c1","time_taken":2.5}"#,
        )
        .unwrap();
        match msg {
            ClientMessage::Answer {
                question_uuid,
                choice_id,
                time_taken,
            } => {
                assert_eq!(question_uuid, "u1");
                assert_eq!(choice_id, "c1");
                assert!((time_taken - 2.5).abs() < f64::EPSILON);
            }
            other => panic!("unexpected message: {:?}", other),
        }

        assert!(matches!(
            parse_client_frame(r#"{"type":"ping"}"#).unwrap(),
            ClientMessage::Ping {}
        ));
    }

    #[test]
    fn test_parse_bad_frame() {
        let err = parse_client_frame("not json at all").unwrap_err();
        assert_eq!(err.kind, ErrorKind::BadFrame);

        let err = parse_client_frame(r#"{"player_name":"Alice"}"#).unwrap_err();
        assert_eq!(err.kind, ErrorKind::BadFrame);

        let err = parse_client_frame(r#"{"type":42}"#).unwrap_err();
        assert_eq!(err.kind, ErrorKind::BadFrame);
    }

    #[test]
    fn test_parse_unknown_type() {
        let err = parse_client_frame(r#"{"type":"self_destruct"}"#).unwrap_err();
        assert_eq!(err.kind, ErrorKind::UnknownType);
    }

    #[test]
    fn test_parse_missing_field() {
        let err = parse_client_frame(r#"{"type":"join"}"#).unwrap_err();
        assert_eq!(err.kind, ErrorKind::MissingField);

        let err = parse_client_frame(r#"{"type":"answer","question_uuid":"u1"}"#).unwrap_err();
        assert_eq!(err.kind, ErrorKind::MissingField);
    }

    #[test]
    fn test_error_kind_wire_names() {
        let json = serde_json::to_string(&ErrorKind::AlreadyAnswered).unwrap();
        assert_eq!(json, "\"already_answered\"");
        let json = serde_json::to_string(&ErrorKind::StoreUnavailable).unwrap();
        assert_eq!(json, "\"store_unavailable\"");
        assert_eq!(ErrorKind::RateLimited.as_str(), "rate_limited");
    }

    #[test]
    fn test_server_event_tagging() {
        let evt = ServerEvent::AnswerStats {
            answered: "2/3".to_string(),
            correct: 1,
        };
        let json = serde_json::to_value(&evt).unwrap();
        assert_eq!(json["type"], "answer_stats");
        assert_eq!(json["answered"], "2/3");

        let evt = ServerEvent::Countdown { count: 3 };
        let json = serde_json::to_value(&evt).unwrap();
        assert_eq!(json["type"], "countdown");
        assert_eq!(json["count"], 3);
    }

    #[test]
    fn test_question_view_hides_correctness() {
        let q = Question {
            uuid: "u1".into(),
            quiz_id: "q1".into(),
            order: 1,
            text: "Which planet is red?".into(),
            difficulty: Difficulty::Easy,
            explanation: "Iron oxide.".into(),
            image_url: String::new(),
            time_limit: 0,
            generated_by_model: true,
            created_at: chrono::Utc::now(),
            choices: vec![
                Choice {
                    id: "c1".into(),
                    question_uuid: "u1".into(),
                    text: "Mars".into(),
                    is_correct: true,
                    order: 1,
                },
                Choice {
                    id: "c0".into(),
                    question_uuid: "u1".into(),
                    text: "Venus".into(),
                    is_correct: false,
                    order: 0,
                },
            ],
        };

        let view = QuestionView::from_question(&q, 20);
        assert_eq!(view.time_limit, 20);
        // Sorted by display order, correctness absent from the payload.
        assert_eq!(view.choices[0].text, "Venus");
        let json = serde_json::to_string(&view).unwrap();
        assert!(!json.contains("is_correct"));
        assert!(!json.contains("explanation"));
    }
}
