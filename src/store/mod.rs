//! Entity store.
//!
//! Durable CRUD over Quiz/Question/Choice/Session/Player/Answer. Tables
//! live behind a single `RwLock`; every mutating operation holds one write
//! guard for its whole body, which makes each named operation a single
//! transactional unit. Validation happens before the first insert, so an
//! early error leaves no partial writes behind.

mod answer;
mod player;
mod quiz;
mod session;

pub use quiz::{NewChoice, NewQuestion, NewQuiz};

use crate::types::*;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Errors surfaced by store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("quiz not found")]
    QuizNotFound,
    #[error("question not found")]
    QuestionNotFound,
    #[error("choice not found")]
    ChoiceNotFound,
    #[error("session not found")]
    SessionNotFound,
    #[error("player not found")]
    PlayerNotFound,
    #[error("no free session code after {0} attempts")]
    CodeExhausted(u32),
    #[error("session already has a host")]
    AlreadyHasHost,
    #[error("player already answered this question")]
    AlreadyAnswered,
    #[error("quiz has unfinished sessions")]
    QuizLocked,
    #[error("invalid quiz: {0}")]
    InvalidQuiz(String),
    #[error("invalid question: {0}")]
    InvalidQuestion(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Default)]
pub(crate) struct Tables {
    pub(crate) quizzes: HashMap<QuizId, Quiz>,
    /// Keyed by question uuid; choices are owned rows inside each question.
    pub(crate) questions: HashMap<QuestionUuid, Question>,
    pub(crate) sessions: HashMap<SessionId, GameSession>,
    pub(crate) players: HashMap<PlayerId, Player>,
    pub(crate) answers: HashMap<AnswerId, Answer>,
}

impl Tables {
    /// True while any non-finished session references the quiz; structural
    /// edits to the quiz are forbidden in that window.
    pub(crate) fn quiz_locked(&self, quiz_id: &str) -> bool {
        self.sessions
            .values()
            .any(|s| s.quiz_id == quiz_id && s.state != SessionState::Finished)
    }

    pub(crate) fn session_player_ids(&self, session_id: &str) -> Vec<PlayerId> {
        self.players
            .values()
            .filter(|p| p.session_id == session_id)
            .map(|p| p.id.clone())
            .collect()
    }
}

/// Shared application store.
pub struct Store {
    pub(crate) inner: RwLock<Tables>,
}

impl Store {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Tables::default()),
        }
    }

    pub(crate) fn new_id() -> String {
        ulid::Ulid::new().to_string()
    }
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}
