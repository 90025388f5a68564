//! LLM-backed quiz question generation.
//!
//! The runtime treats this as an opaque blocking dependency: one call in,
//! a validated list of candidate questions out, or a terminal error after
//! the retry budget is spent.

mod cache;
mod openai;

use crate::types::Difficulty;
use async_trait::async_trait;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub use cache::{cache_key, GenerationCache, CACHE_TTL, PROMPT_VERSION, SCHEMA_VERSION};
pub use openai::OpenAiGenerator;

/// Attempts before surfacing `generation_failed`.
const MAX_ATTEMPTS: u32 = 3;
/// Soft deadline per attempt.
const ATTEMPT_TIMEOUT: Duration = Duration::from_secs(60);

pub type GenerateResult<T> = Result<T, GenerateError>;

#[derive(Debug, thiserror::Error)]
pub enum GenerateError {
    #[error("API request failed: {0}")]
    Api(String),

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("response parsing failed: {0}")]
    Parse(String),

    #[error("invalid candidate questions: {0}")]
    Invalid(String),

    #[error("generation failed after {0} attempts")]
    Exhausted(u32),
}

/// One generation request, as handed to a provider.
#[derive(Debug, Clone)]
pub struct GenerateRequest {
    pub topic: String,
    pub count: u32,
    pub curve: Vec<Difficulty>,
    /// Players expected at the table; lets the prompt tune tone and breadth.
    pub player_count: u32,
}

/// A generated question before it becomes a store row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateQuestion {
    pub text: String,
    pub choices: Vec<String>,
    pub correct_index: usize,
    /// Kept as the raw model string; parsed leniently on use.
    pub difficulty: String,
    #[serde(default)]
    pub explanation: String,
    #[serde(default)]
    pub image_url: Option<String>,
}

impl CandidateQuestion {
    pub fn difficulty(&self) -> Difficulty {
        Difficulty::parse(&self.difficulty)
    }
}

/// A source of candidate questions.
#[async_trait]
pub trait QuestionGenerator: Send + Sync {
    async fn generate(&self, request: &GenerateRequest) -> GenerateResult<Vec<CandidateQuestion>>;

    fn name(&self) -> &str;
}

/// Per-question difficulty sequence for a quiz of `count` questions:
/// a ramp from easy to very hard, with a fun closer on longer quizzes.
pub fn difficulty_curve(count: u32) -> Vec<Difficulty> {
    let fun_tail = count >= 5;
    let ramp_len = if fun_tail { count - 1 } else { count };

    let mut curve = Vec::with_capacity(count as usize);
    for i in 0..ramp_len {
        let progress = i as f64 / ramp_len.max(1) as f64;
        curve.push(if progress < 0.25 {
            Difficulty::Easy
        } else if progress < 0.55 {
            Difficulty::Medium
        } else if progress < 0.85 {
            Difficulty::Hard
        } else {
            Difficulty::VeryHard
        });
    }
    if fun_tail {
        curve.push(Difficulty::Fun);
    }
    curve
}

/// Generation front door: cache lookup, bounded retries with exponential
/// backoff, validation, cache write-back.
pub struct Generation {
    provider: Box<dyn QuestionGenerator>,
    cache: GenerationCache,
}

impl Generation {
    pub fn new(provider: Box<dyn QuestionGenerator>) -> Self {
        Self {
            provider,
            cache: GenerationCache::new(),
        }
    }

    pub async fn questions_for(
        &self,
        topic: &str,
        count: u32,
        player_count: u32,
    ) -> GenerateResult<Vec<CandidateQuestion>> {
        let curve = difficulty_curve(count);
        let key = cache_key(topic, count, &curve);

        if let Some(hit) = self.cache.get(&key).await {
            tracing::info!(topic, count, "generation cache hit");
            return Ok(hit);
        }

        let request = GenerateRequest {
            topic: topic.to_string(),
            count,
            curve,
            player_count,
        };

        for attempt in 0..MAX_ATTEMPTS {
            if attempt > 0 {
                let jitter: f64 = rand::rng().random_range(0.0..1.0);
                let backoff = Duration::from_secs_f64(2f64.powi(attempt as i32) + jitter);
                tracing::warn!(attempt, ?backoff, "retrying question generation");
                tokio::time::sleep(backoff).await;
            }

            let outcome =
                tokio::time::timeout(ATTEMPT_TIMEOUT, self.provider.generate(&request)).await;
            match outcome {
                Err(_) => {
                    tracing::warn!(
                        provider = self.provider.name(),
                        attempt,
                        "generation attempt timed out"
                    );
                }
                Ok(Err(e)) => {
                    tracing::warn!(
                        provider = self.provider.name(),
                        attempt,
                        error = %e,
                        "generation attempt failed"
                    );
                }
                Ok(Ok(candidates)) => match validate_candidates(&candidates, count) {
                    Ok(()) => {
                        self.cache.put(key, candidates.clone()).await;
                        return Ok(candidates);
                    }
                    Err(e) => {
                        tracing::warn!(attempt, error = %e, "generated questions failed validation");
                    }
                },
            }
        }

        Err(GenerateError::Exhausted(MAX_ATTEMPTS))
    }
}

/// Validate a candidate list against the question contract: expected count,
/// four distinct short choices, one correct index, bounded text lengths.
pub fn validate_candidates(candidates: &[CandidateQuestion], expected: u32) -> GenerateResult<()> {
    if candidates.len() != expected as usize {
        return Err(GenerateError::Invalid(format!(
            "expected {} questions, got {}",
            expected,
            candidates.len()
        )));
    }

    for (i, c) in candidates.iter().enumerate() {
        let at = |msg: String| GenerateError::Invalid(format!("question {}: {}", i + 1, msg));

        if c.text.trim().is_empty() || c.text.chars().count() > 200 {
            return Err(at("text must be 1..=200 characters".into()));
        }
        if c.choices.len() != 4 {
            return Err(at(format!("expected 4 choices, got {}", c.choices.len())));
        }
        if c.correct_index > 3 {
            return Err(at(format!("correct_index {} out of range", c.correct_index)));
        }
        if c.explanation.chars().count() > 300 {
            return Err(at("explanation must be at most 300 characters".into()));
        }

        let mut seen = std::collections::HashSet::new();
        for choice in &c.choices {
            let trimmed = choice.trim();
            if trimmed.is_empty() || trimmed.chars().count() > 40 {
                return Err(at(format!("choice `{}` must be 1..=40 characters", choice)));
            }
            if !seen.insert(trimmed.to_lowercase()) {
                return Err(at(format!("duplicate choice `{}`", trimmed)));
            }
        }
    }
    Ok(())
}
