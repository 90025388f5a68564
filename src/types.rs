use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Opaque ID types for type safety
pub type QuizId = String;
pub type QuestionUuid = String;
pub type ChoiceId = String;
pub type SessionId = String;
pub type PlayerId = String;
pub type AnswerId = String;

/// Session code: exactly four decimal digits, leading zeros allowed.
pub type SessionCode = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
    VeryHard,
    Fun,
}

impl Difficulty {
    /// Lenient parse for externally produced difficulty strings.
    /// Anything unrecognized falls back to `Medium`.
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "easy" => Difficulty::Easy,
            "medium" => Difficulty::Medium,
            "hard" => Difficulty::Hard,
            "very_hard" | "veryhard" | "very hard" => Difficulty::VeryHard,
            "fun" => Difficulty::Fun,
            _ => Difficulty::Medium,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Difficulty::Easy => "easy",
            Difficulty::Medium => "medium",
            Difficulty::Hard => "hard",
            Difficulty::VeryHard => "very_hard",
            Difficulty::Fun => "fun",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Waiting,
    Running,
    Paused,
    Finished,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Quiz {
    pub id: QuizId,
    pub title: String,
    pub topic: String,
    pub description: String,
    pub image_url: String,
    /// Derived from attached questions; 0 until questions are attached.
    pub question_count: u32,
    /// Default seconds per question, 10..=60.
    pub time_per_question: u32,
    pub created_at: DateTime<Utc>,
}

impl Quiz {
    /// Theme image for the TV display. Falls back to a keyword-matched
    /// category image when no explicit image was set.
    pub fn theme_image(&self) -> String {
        if !self.image_url.is_empty() {
            return self.image_url.clone();
        }

        let topic = self.topic.to_lowercase();
        let category = if ["film", "movie", "cinema", "actor", "director"]
            .iter()
            .any(|w| topic.contains(w))
        {
            "films"
        } else if ["animal", "zoo", "fauna", "wildlife"]
            .iter()
            .any(|w| topic.contains(w))
        {
            "animals"
        } else if ["geograph", "countr", "city", "capital"]
            .iter()
            .any(|w| topic.contains(w))
        {
            "geography"
        } else if ["music", "song", "band", "singer"]
            .iter()
            .any(|w| topic.contains(w))
        {
            "music"
        } else if ["histor", "war", "century", "ancient"]
            .iter()
            .any(|w| topic.contains(w))
        {
            "history"
        } else {
            return "/static/images/themes/default.jpg".to_string();
        };

        format!("/static/images/themes/{}/default.jpg", category)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Question {
    /// Stable across reorders; also the key answers reference.
    pub uuid: QuestionUuid,
    pub quiz_id: QuizId,
    /// 1-based position within the quiz, unique per quiz.
    pub order: u32,
    pub text: String,
    pub difficulty: Difficulty,
    /// Shown after the question is resolved.
    pub explanation: String,
    pub image_url: String,
    /// Seconds, 0..=120 where 0 means "inherit the quiz default".
    pub time_limit: u32,
    pub generated_by_model: bool,
    pub created_at: DateTime<Utc>,
    /// Exactly four, orders 0..=3, exactly one correct.
    pub choices: Vec<Choice>,
}

impl Question {
    /// Per-question override if set, else the quiz default.
    pub fn effective_time_limit(&self, quiz_default: u32) -> u32 {
        if self.time_limit > 0 {
            self.time_limit
        } else {
            quiz_default
        }
    }

    pub fn correct_choice(&self) -> Option<&Choice> {
        self.choices.iter().find(|c| c.is_correct)
    }

    pub fn choice(&self, choice_id: &str) -> Option<&Choice> {
        self.choices.iter().find(|c| c.id == choice_id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Choice {
    pub id: ChoiceId,
    pub question_uuid: QuestionUuid,
    pub text: String,
    pub is_correct: bool,
    /// Display position 0..=3.
    pub order: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameSession {
    pub id: SessionId,
    pub code: SessionCode,
    pub quiz_id: QuizId,
    pub state: SessionState,
    /// 0-based index into the quiz's ordered question list.
    /// Never decreases; equals the question count once the game finished.
    pub current_question: u32,
    /// Weak reference resolved by id; the player row carries `is_host`.
    pub host: Option<PlayerId>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Player {
    pub id: PlayerId,
    pub session_id: SessionId,
    pub name: String,
    pub score: i64,
    pub current_streak: u32,
    pub max_streak: u32,
    pub connected: bool,
    /// Refreshed on every ping; drives the stale sweep.
    pub last_seen: DateTime<Utc>,
    pub is_host: bool,
    pub joined_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Answer {
    pub id: AnswerId,
    pub player_id: PlayerId,
    pub question_uuid: QuestionUuid,
    pub choice_id: ChoiceId,
    /// Client-reported seconds; stored as-is, used only for scoring and awards.
    pub time_taken: f64,
    /// Derived from the chosen choice at write time.
    pub is_correct: bool,
    pub points_earned: i64,
    pub answered_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bare_question() -> Question {
        Question {
            uuid: "u".into(),
            quiz_id: "q".into(),
            order: 1,
            text: "t".into(),
            difficulty: Difficulty::Medium,
            explanation: String::new(),
            image_url: String::new(),
            time_limit: 0,
            generated_by_model: false,
            created_at: Utc::now(),
            choices: vec![],
        }
    }

    #[test]
    fn test_difficulty_parse_lenient() {
        assert_eq!(Difficulty::parse("easy"), Difficulty::Easy);
        assert_eq!(Difficulty::parse(" Very_Hard "), Difficulty::VeryHard);
        assert_eq!(Difficulty::parse("fun"), Difficulty::Fun);
        assert_eq!(Difficulty::parse("brutal"), Difficulty::Medium);
        assert_eq!(Difficulty::parse(""), Difficulty::Medium);
    }

    #[test]
    fn test_effective_time_limit() {
        let q = bare_question();
        assert_eq!(q.effective_time_limit(20), 20);

        let q = Question { time_limit: 45, ..q };
        assert_eq!(q.effective_time_limit(20), 45);
    }

    #[test]
    fn test_theme_image_keyword_fallback() {
        let quiz = Quiz {
            id: "q".into(),
            title: "Movie night".into(),
            topic: "Classic cinema".into(),
            description: String::new(),
            image_url: String::new(),
            question_count: 0,
            time_per_question: 20,
            created_at: Utc::now(),
        };
        assert_eq!(quiz.theme_image(), "/static/images/themes/films/default.jpg");

        let quiz = Quiz {
            image_url: "/custom.jpg".into(),
            ..quiz
        };
        assert_eq!(quiz.theme_image(), "/custom.jpg");
    }
}
