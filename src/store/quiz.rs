use super::{Store, StoreError, StoreResult};
use crate::types::*;
use chrono::Utc;
use std::collections::HashSet;

/// Input for creating a quiz shell (questions attached separately).
#[derive(Debug, Clone)]
pub struct NewQuiz {
    pub title: String,
    pub topic: String,
    pub description: String,
    pub image_url: String,
    pub time_per_question: u32,
}

/// Input for one question with its four choices.
#[derive(Debug, Clone)]
pub struct NewQuestion {
    pub text: String,
    pub difficulty: Difficulty,
    pub explanation: String,
    pub image_url: String,
    pub time_limit: u32,
    pub generated_by_model: bool,
    pub choices: Vec<NewChoice>,
}

#[derive(Debug, Clone)]
pub struct NewChoice {
    pub text: String,
    pub is_correct: bool,
}

impl Store {
    pub async fn create_quiz(&self, new: NewQuiz) -> StoreResult<Quiz> {
        if new.title.trim().is_empty() {
            return Err(StoreError::InvalidQuiz("title must not be empty".into()));
        }
        if !(10..=60).contains(&new.time_per_question) {
            return Err(StoreError::InvalidQuiz(
                "time_per_question must be within 10..=60 seconds".into(),
            ));
        }

        let quiz = Quiz {
            id: Self::new_id(),
            title: new.title,
            topic: new.topic,
            description: new.description,
            image_url: new.image_url,
            question_count: 0,
            time_per_question: new.time_per_question,
            created_at: Utc::now(),
        };

        let mut tables = self.inner.write().await;
        tables.quizzes.insert(quiz.id.clone(), quiz.clone());
        Ok(quiz)
    }

    /// Attach a full question list to a quiz in one unit: all questions,
    /// all choices, and the derived question_count, or nothing.
    pub async fn attach_questions(
        &self,
        quiz_id: &str,
        new_questions: Vec<NewQuestion>,
    ) -> StoreResult<Vec<Question>> {
        let mut tables = self.inner.write().await;
        if !tables.quizzes.contains_key(quiz_id) {
            return Err(StoreError::QuizNotFound);
        }
        if tables.quiz_locked(quiz_id) {
            return Err(StoreError::QuizLocked);
        }

        // Validate everything before the first insert.
        for (i, q) in new_questions.iter().enumerate() {
            validate_question(i, q)?;
        }

        // The attached list is the quiz's full question set.
        tables.questions.retain(|_, q| q.quiz_id != quiz_id);

        let now = Utc::now();
        let mut attached = Vec::with_capacity(new_questions.len());
        for (i, nq) in new_questions.into_iter().enumerate() {
            let uuid = uuid::Uuid::new_v4().to_string();
            let choices = nq
                .choices
                .into_iter()
                .enumerate()
                .map(|(j, c)| Choice {
                    id: Self::new_id(),
                    question_uuid: uuid.clone(),
                    text: c.text,
                    is_correct: c.is_correct,
                    order: j as u32,
                })
                .collect();

            let question = Question {
                uuid: uuid.clone(),
                quiz_id: quiz_id.to_string(),
                order: i as u32 + 1,
                text: nq.text,
                difficulty: nq.difficulty,
                explanation: nq.explanation,
                image_url: nq.image_url,
                time_limit: nq.time_limit,
                generated_by_model: nq.generated_by_model,
                created_at: now,
                choices,
            };
            tables.questions.insert(uuid, question.clone());
            attached.push(question);
        }

        if let Some(quiz) = tables.quizzes.get_mut(quiz_id) {
            quiz.question_count = attached.len() as u32;
        }
        Ok(attached)
    }

    pub async fn quiz(&self, quiz_id: &str) -> StoreResult<Quiz> {
        self.inner
            .read()
            .await
            .quizzes
            .get(quiz_id)
            .cloned()
            .ok_or(StoreError::QuizNotFound)
    }

    /// All quizzes, newest first.
    pub async fn list_quizzes(&self) -> Vec<Quiz> {
        let tables = self.inner.read().await;
        let mut quizzes: Vec<Quiz> = tables.quizzes.values().cloned().collect();
        quizzes.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        quizzes
    }

    /// Questions of a quiz in play order.
    pub async fn quiz_questions(&self, quiz_id: &str) -> StoreResult<Vec<Question>> {
        let tables = self.inner.read().await;
        if !tables.quizzes.contains_key(quiz_id) {
            return Err(StoreError::QuizNotFound);
        }
        let mut questions: Vec<Question> = tables
            .questions
            .values()
            .filter(|q| q.quiz_id == quiz_id)
            .cloned()
            .collect();
        questions.sort_by_key(|q| q.order);
        Ok(questions)
    }

    /// Remove a quiz and its questions. Used to discard a partially-created
    /// quiz when generation fails.
    pub async fn delete_quiz(&self, quiz_id: &str) -> StoreResult<()> {
        let mut tables = self.inner.write().await;
        if tables.quiz_locked(quiz_id) {
            return Err(StoreError::QuizLocked);
        }
        tables
            .quizzes
            .remove(quiz_id)
            .ok_or(StoreError::QuizNotFound)?;
        tables.questions.retain(|_, q| q.quiz_id != quiz_id);
        Ok(())
    }
}

fn validate_question(index: usize, q: &NewQuestion) -> StoreResult<()> {
    let at = |msg: String| StoreError::InvalidQuestion(format!("question {}: {}", index + 1, msg));

    if q.text.trim().is_empty() || q.text.chars().count() > 200 {
        return Err(at("text must be 1..=200 characters".into()));
    }
    if q.explanation.chars().count() > 300 {
        return Err(at("explanation must be at most 300 characters".into()));
    }
    if q.time_limit > 120 {
        return Err(at("time_limit must be within 0..=120 seconds".into()));
    }
    if q.choices.len() != 4 {
        return Err(at(format!("expected exactly 4 choices, got {}", q.choices.len())));
    }

    let correct = q.choices.iter().filter(|c| c.is_correct).count();
    if correct != 1 {
        return Err(at(format!("expected exactly 1 correct choice, got {}", correct)));
    }

    let mut seen = HashSet::new();
    for c in &q.choices {
        if c.text.trim().is_empty() || c.text.chars().count() > 200 {
            return Err(at("choice text must be 1..=200 characters".into()));
        }
        if !seen.insert(c.text.trim()) {
            return Err(at(format!("duplicate choice text `{}`", c.text.trim())));
        }
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn sample_quiz() -> NewQuiz {
        NewQuiz {
            title: "Space".into(),
            topic: "Astronomy".into(),
            description: String::new(),
            image_url: String::new(),
            time_per_question: 20,
        }
    }

    pub(crate) fn sample_question(text: &str, correct: usize) -> NewQuestion {
        let labels = ["A", "B", "C", "D"];
        NewQuestion {
            text: text.into(),
            difficulty: Difficulty::Medium,
            explanation: "Because.".into(),
            image_url: String::new(),
            time_limit: 0,
            generated_by_model: true,
            choices: labels
                .iter()
                .enumerate()
                .map(|(i, l)| NewChoice {
                    text: format!("{} {}", l, text),
                    is_correct: i == correct,
                })
                .collect(),
        }
    }

    #[tokio::test]
    async fn test_create_quiz_and_attach() {
        let store = Store::new();
        let quiz = store.create_quiz(sample_quiz()).await.unwrap();
        assert_eq!(quiz.question_count, 0);

        let attached = store
            .attach_questions(
                &quiz.id,
                vec![sample_question("one", 0), sample_question("two", 3)],
            )
            .await
            .unwrap();
        assert_eq!(attached.len(), 2);
        assert_eq!(attached[0].order, 1);
        assert_eq!(attached[1].order, 2);
        assert_eq!(attached[0].choices.len(), 4);

        let quiz = store.quiz(&quiz.id).await.unwrap();
        assert_eq!(quiz.question_count, 2);

        let questions = store.quiz_questions(&quiz.id).await.unwrap();
        assert_eq!(questions[0].text, "one");
    }

    #[tokio::test]
    async fn test_quiz_time_bounds() {
        let store = Store::new();
        let mut new = sample_quiz();
        new.time_per_question = 5;
        assert!(matches!(
            store.create_quiz(new).await,
            Err(StoreError::InvalidQuiz(_))
        ));
    }

    #[tokio::test]
    async fn test_attach_rejects_bad_choice_sets() {
        let store = Store::new();
        let quiz = store.create_quiz(sample_quiz()).await.unwrap();

        // Three choices
        let mut q = sample_question("short", 0);
        q.choices.pop();
        assert!(matches!(
            store.attach_questions(&quiz.id, vec![q]).await,
            Err(StoreError::InvalidQuestion(_))
        ));

        // Two correct
        let mut q = sample_question("double", 0);
        q.choices[1].is_correct = true;
        assert!(matches!(
            store.attach_questions(&quiz.id, vec![q]).await,
            Err(StoreError::InvalidQuestion(_))
        ));

        // Duplicate texts
        let mut q = sample_question("dup", 0);
        q.choices[2].text = q.choices[1].text.clone();
        assert!(matches!(
            store.attach_questions(&quiz.id, vec![q]).await,
            Err(StoreError::InvalidQuestion(_))
        ));

        // A bad question in the batch attaches nothing.
        let bad = {
            let mut q = sample_question("bad", 0);
            q.choices.pop();
            q
        };
        let result = store
            .attach_questions(&quiz.id, vec![sample_question("good", 0), bad])
            .await;
        assert!(result.is_err());
        assert!(store.quiz_questions(&quiz.id).await.unwrap().is_empty());
        assert_eq!(store.quiz(&quiz.id).await.unwrap().question_count, 0);
    }

    #[tokio::test]
    async fn test_delete_quiz_cascades() {
        let store = Store::new();
        let quiz = store.create_quiz(sample_quiz()).await.unwrap();
        store
            .attach_questions(&quiz.id, vec![sample_question("one", 0)])
            .await
            .unwrap();

        store.delete_quiz(&quiz.id).await.unwrap();
        assert!(matches!(
            store.quiz(&quiz.id).await,
            Err(StoreError::QuizNotFound)
        ));
        assert!(store.inner.read().await.questions.is_empty());
    }
}
