use super::{Store, StoreError, StoreResult};
use crate::awards::{AnswerFacts, PlayerRecord};
use crate::scoring::score_answer;
use crate::types::*;
use chrono::Utc;

impl Store {
    /// Record one answer: correctness comes from the chosen choice, points
    /// from the scoring function with the player's streak *before* this
    /// answer, and the player's score/streak columns move in the same unit.
    pub async fn record_answer(
        &self,
        player_id: &str,
        question_uuid: &str,
        choice_id: &str,
        time_taken: f64,
    ) -> StoreResult<Answer> {
        let mut tables = self.inner.write().await;

        let player = tables
            .players
            .get(player_id)
            .cloned()
            .ok_or(StoreError::PlayerNotFound)?;
        let question = tables
            .questions
            .get(question_uuid)
            .cloned()
            .ok_or(StoreError::QuestionNotFound)?;
        let choice = question
            .choice(choice_id)
            .ok_or(StoreError::ChoiceNotFound)?;

        let duplicate = tables
            .answers
            .values()
            .any(|a| a.player_id == player_id && a.question_uuid == question_uuid);
        if duplicate {
            return Err(StoreError::AlreadyAnswered);
        }

        let quiz_default = tables
            .quizzes
            .get(&question.quiz_id)
            .map(|q| q.time_per_question)
            .ok_or(StoreError::QuizNotFound)?;

        let time_taken = time_taken.max(0.0);
        let is_correct = choice.is_correct;
        let points = score_answer(
            is_correct,
            time_taken,
            question.effective_time_limit(quiz_default),
            player.current_streak,
            question.difficulty,
        );

        let answer = Answer {
            id: Self::new_id(),
            player_id: player_id.to_string(),
            question_uuid: question_uuid.to_string(),
            choice_id: choice_id.to_string(),
            time_taken,
            is_correct,
            points_earned: points,
            answered_at: Utc::now(),
        };
        tables.answers.insert(answer.id.clone(), answer.clone());

        let player = tables
            .players
            .get_mut(player_id)
            .ok_or(StoreError::PlayerNotFound)?;
        player.score += points;
        if is_correct {
            player.current_streak += 1;
            player.max_streak = player.max_streak.max(player.current_streak);
        } else {
            player.current_streak = 0;
        }

        Ok(answer)
    }

    /// All answers given in a session, oldest first.
    pub async fn answers_by_session(&self, session_id: &str) -> StoreResult<Vec<Answer>> {
        let tables = self.inner.read().await;
        if !tables.sessions.contains_key(session_id) {
            return Err(StoreError::SessionNotFound);
        }
        let player_ids = tables.session_player_ids(session_id);
        let mut answers: Vec<Answer> = tables
            .answers
            .values()
            .filter(|a| player_ids.contains(&a.player_id))
            .cloned()
            .collect();
        answers.sort_by(|a, b| a.answered_at.cmp(&b.answered_at));
        Ok(answers)
    }

    pub async fn answers_by_player(&self, player_id: &str) -> StoreResult<Vec<Answer>> {
        let tables = self.inner.read().await;
        if !tables.players.contains_key(player_id) {
            return Err(StoreError::PlayerNotFound);
        }
        let mut answers: Vec<Answer> = tables
            .answers
            .values()
            .filter(|a| a.player_id == player_id)
            .cloned()
            .collect();
        answers.sort_by(|a, b| a.answered_at.cmp(&b.answered_at));
        Ok(answers)
    }

    /// Join every player's answers to their question facts, shaped for the
    /// award evaluator.
    pub async fn award_inputs(&self, session_id: &str) -> StoreResult<Vec<PlayerRecord>> {
        let tables = self.inner.read().await;
        let session = tables
            .sessions
            .get(session_id)
            .ok_or(StoreError::SessionNotFound)?;
        let quiz_default = tables
            .quizzes
            .get(&session.quiz_id)
            .map(|q| q.time_per_question)
            .ok_or(StoreError::QuizNotFound)?;

        let mut records: Vec<PlayerRecord> = tables
            .players
            .values()
            .filter(|p| p.session_id == session_id)
            .map(|p| PlayerRecord {
                player_id: p.id.clone(),
                name: p.name.clone(),
                max_streak: p.max_streak,
                joined_at: p.joined_at,
                answers: Vec::new(),
            })
            .collect();
        records.sort_by(|a, b| a.joined_at.cmp(&b.joined_at));

        for answer in tables.answers.values() {
            let Some(record) = records.iter_mut().find(|r| r.player_id == answer.player_id)
            else {
                continue;
            };
            let Some(question) = tables.questions.get(&answer.question_uuid) else {
                continue;
            };
            record.answers.push(AnswerFacts {
                is_correct: answer.is_correct,
                time_taken: answer.time_taken,
                difficulty: question.difficulty,
                time_limit: question.effective_time_limit(quiz_default),
            });
        }

        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::super::quiz::tests::{sample_question, sample_quiz};
    use super::*;

    async fn game(store: &Store) -> (GameSession, Vec<Question>, Player) {
        let quiz = store.create_quiz(sample_quiz()).await.unwrap();
        let questions = store
            .attach_questions(
                &quiz.id,
                vec![sample_question("q1", 0), sample_question("q2", 1)],
            )
            .await
            .unwrap();
        let session = store.create_session(&quiz.id).await.unwrap();
        let (player, _) = store.get_or_create_player(&session.id, "Alice").await.unwrap();
        (session, questions, player)
    }

    fn correct_choice(q: &Question) -> &Choice {
        q.correct_choice().expect("question has a correct choice")
    }

    fn wrong_choice(q: &Question) -> &Choice {
        q.choices.iter().find(|c| !c.is_correct).unwrap()
    }

    #[tokio::test]
    async fn test_record_answer_scores_and_streaks() {
        let store = Store::new();
        let (_, questions, player) = game(&store).await;

        let answer = store
            .record_answer(&player.id, &questions[0].uuid, &correct_choice(&questions[0]).id, 2.0)
            .await
            .unwrap();
        assert!(answer.is_correct);
        assert_eq!(answer.points_earned, 1450);

        let player_row = store.player(&player.id).await.unwrap();
        assert_eq!(player_row.score, 1450);
        assert_eq!(player_row.current_streak, 1);
        assert_eq!(player_row.max_streak, 1);

        // Wrong answer scores zero and resets the streak, keeping the max.
        let answer = store
            .record_answer(&player.id, &questions[1].uuid, &wrong_choice(&questions[1]).id, 3.0)
            .await
            .unwrap();
        assert!(!answer.is_correct);
        assert_eq!(answer.points_earned, 0);

        let player_row = store.player(&player.id).await.unwrap();
        assert_eq!(player_row.score, 1450);
        assert_eq!(player_row.current_streak, 0);
        assert_eq!(player_row.max_streak, 1);
    }

    #[tokio::test]
    async fn test_duplicate_answer_rejected_without_side_effects() {
        let store = Store::new();
        let (_, questions, player) = game(&store).await;
        let choice = correct_choice(&questions[0]).id.clone();

        store
            .record_answer(&player.id, &questions[0].uuid, &choice, 2.0)
            .await
            .unwrap();
        let before = store.player(&player.id).await.unwrap();

        let result = store
            .record_answer(&player.id, &questions[0].uuid, &choice, 1.0)
            .await;
        assert!(matches!(result, Err(StoreError::AlreadyAnswered)));

        let after = store.player(&player.id).await.unwrap();
        assert_eq!(after.score, before.score);
        assert_eq!(after.current_streak, before.current_streak);
        assert_eq!(
            store.answers_by_player(&player.id).await.unwrap().len(),
            1
        );
    }

    #[tokio::test]
    async fn test_record_answer_unknown_choice() {
        let store = Store::new();
        let (_, questions, player) = game(&store).await;
        let other_question_choice = questions[1].choices[0].id.clone();

        // A choice belonging to a different question does not resolve.
        let result = store
            .record_answer(&player.id, &questions[0].uuid, &other_question_choice, 2.0)
            .await;
        assert!(matches!(result, Err(StoreError::ChoiceNotFound)));
    }

    #[tokio::test]
    async fn test_negative_time_clamped() {
        let store = Store::new();
        let (_, questions, player) = game(&store).await;
        let answer = store
            .record_answer(&player.id, &questions[0].uuid, &correct_choice(&questions[0]).id, -5.0)
            .await
            .unwrap();
        assert_eq!(answer.time_taken, 0.0);
        // Full speed bonus at t=0.
        assert_eq!(answer.points_earned, 1500);
    }

    #[tokio::test]
    async fn test_award_inputs_join_question_facts() {
        let store = Store::new();
        let (session, questions, player) = game(&store).await;
        store
            .record_answer(&player.id, &questions[0].uuid, &correct_choice(&questions[0]).id, 2.0)
            .await
            .unwrap();

        let records = store.award_inputs(&session.id).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].answers.len(), 1);
        let facts = &records[0].answers[0];
        assert!(facts.is_correct);
        assert_eq!(facts.time_limit, 20);
    }
}
