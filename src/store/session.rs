use super::{Store, StoreError, StoreResult};
use crate::types::*;
use chrono::Utc;
use rand::Rng;

/// Attempts at drawing an unused 4-digit code before giving up.
const CODE_ATTEMPTS: u32 = 100;

fn random_code() -> SessionCode {
    // Leading zeros are valid codes.
    format!("{:04}", rand::rng().random_range(0..10_000))
}

impl Store {
    /// Create a session in `waiting` with a code no other non-finished
    /// session currently holds.
    pub async fn create_session(&self, quiz_id: &str) -> StoreResult<GameSession> {
        let mut tables = self.inner.write().await;
        if !tables.quizzes.contains_key(quiz_id) {
            return Err(StoreError::QuizNotFound);
        }

        let mut code = None;
        for _ in 0..CODE_ATTEMPTS {
            let candidate = random_code();
            let taken = tables
                .sessions
                .values()
                .any(|s| s.code == candidate && s.state != SessionState::Finished);
            if !taken {
                code = Some(candidate);
                break;
            }
        }
        let code = code.ok_or(StoreError::CodeExhausted(CODE_ATTEMPTS))?;

        let session = GameSession {
            id: Self::new_id(),
            code,
            quiz_id: quiz_id.to_string(),
            state: SessionState::Waiting,
            current_question: 0,
            host: None,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
        };
        tables.sessions.insert(session.id.clone(), session.clone());
        Ok(session)
    }

    pub async fn session(&self, session_id: &str) -> StoreResult<GameSession> {
        self.inner
            .read()
            .await
            .sessions
            .get(session_id)
            .cloned()
            .ok_or(StoreError::SessionNotFound)
    }

    /// Lookup by 4-digit code. Prefers the live session when a finished
    /// one shares the code.
    pub async fn session_by_code(&self, code: &str) -> StoreResult<GameSession> {
        let tables = self.inner.read().await;
        tables
            .sessions
            .values()
            .filter(|s| s.code == code)
            .max_by_key(|s| (s.state != SessionState::Finished, s.created_at))
            .cloned()
            .ok_or(StoreError::SessionNotFound)
    }

    /// Record a state change and stamp started/finished timestamps on the
    /// first transition into running/finished.
    pub async fn set_state(
        &self,
        session_id: &str,
        state: SessionState,
    ) -> StoreResult<GameSession> {
        let mut tables = self.inner.write().await;
        let session = tables
            .sessions
            .get_mut(session_id)
            .ok_or(StoreError::SessionNotFound)?;

        session.state = state;
        match state {
            SessionState::Running if session.started_at.is_none() => {
                session.started_at = Some(Utc::now());
            }
            SessionState::Finished if session.finished_at.is_none() => {
                session.finished_at = Some(Utc::now());
            }
            _ => {}
        }
        Ok(session.clone())
    }

    /// Move the question cursor forward; it never decreases.
    pub async fn advance_question(&self, session_id: &str) -> StoreResult<u32> {
        let mut tables = self.inner.write().await;
        let session = tables
            .sessions
            .get_mut(session_id)
            .ok_or(StoreError::SessionNotFound)?;
        session.current_question += 1;
        Ok(session.current_question)
    }

    /// The quiz question at a 0-based session index, if any remain.
    pub async fn question_by_index(
        &self,
        session_id: &str,
        index: u32,
    ) -> StoreResult<Option<Question>> {
        let tables = self.inner.read().await;
        let session = tables
            .sessions
            .get(session_id)
            .ok_or(StoreError::SessionNotFound)?;

        let mut questions: Vec<&Question> = tables
            .questions
            .values()
            .filter(|q| q.quiz_id == session.quiz_id)
            .collect();
        questions.sort_by_key(|q| q.order);
        Ok(questions.get(index as usize).map(|q| (*q).clone()))
    }

    /// (answers received, correct among them) for one question of a session.
    pub async fn count_answers_for_question(
        &self,
        session_id: &str,
        question_uuid: &str,
    ) -> StoreResult<(u32, u32)> {
        let tables = self.inner.read().await;
        if !tables.sessions.contains_key(session_id) {
            return Err(StoreError::SessionNotFound);
        }
        let player_ids = tables.session_player_ids(session_id);

        let mut answered = 0;
        let mut correct = 0;
        for a in tables.answers.values() {
            if a.question_uuid == question_uuid && player_ids.contains(&a.player_id) {
                answered += 1;
                if a.is_correct {
                    correct += 1;
                }
            }
        }
        Ok((answered, correct))
    }

    pub async fn count_connected_players(&self, session_id: &str) -> StoreResult<u32> {
        let tables = self.inner.read().await;
        if !tables.sessions.contains_key(session_id) {
            return Err(StoreError::SessionNotFound);
        }
        Ok(tables
            .players
            .values()
            .filter(|p| p.session_id == session_id && p.connected)
            .count() as u32)
    }

    /// The §4.7 completion predicate: every currently-connected player has
    /// answered the question. An empty room never completes a question.
    pub async fn all_connected_answered(
        &self,
        session_id: &str,
        question_uuid: &str,
    ) -> StoreResult<bool> {
        let tables = self.inner.read().await;
        if !tables.sessions.contains_key(session_id) {
            return Err(StoreError::SessionNotFound);
        }
        let connected: Vec<&Player> = tables
            .players
            .values()
            .filter(|p| p.session_id == session_id && p.connected)
            .collect();
        if connected.is_empty() {
            return Ok(false);
        }
        Ok(connected.iter().all(|p| {
            tables
                .answers
                .values()
                .any(|a| a.player_id == p.id && a.question_uuid == question_uuid)
        }))
    }

    /// Players ordered by score descending, then join time ascending.
    pub async fn leaderboard(&self, session_id: &str) -> StoreResult<Vec<Player>> {
        let tables = self.inner.read().await;
        if !tables.sessions.contains_key(session_id) {
            return Err(StoreError::SessionNotFound);
        }
        let mut players: Vec<Player> = tables
            .players
            .values()
            .filter(|p| p.session_id == session_id)
            .cloned()
            .collect();
        players.sort_by(|a, b| b.score.cmp(&a.score).then(a.joined_at.cmp(&b.joined_at)));
        Ok(players)
    }
}
