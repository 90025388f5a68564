//! Generation cache keyed by a deterministic fingerprint of the request.

use super::CandidateQuestion;
use crate::types::Difficulty;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

/// Bumping either version invalidates every prior cache entry.
pub const PROMPT_VERSION: &str = "p4";
pub const SCHEMA_VERSION: &str = "s2";

/// Generated question lists stay fresh for a week.
pub const CACHE_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Deterministic fingerprint of (topic, count, difficulty curve) under the
/// current prompt and schema versions.
pub fn cache_key(topic: &str, count: u32, curve: &[Difficulty]) -> String {
    let curve_str = curve
        .iter()
        .map(|d| d.as_str())
        .collect::<Vec<_>>()
        .join("-");
    let digest = md5::compute(format!(
        "{}:{}:{}",
        topic.trim().to_lowercase(),
        count,
        curve_str
    ));
    format!(
        "quiz:{}:{}:{}",
        PROMPT_VERSION,
        SCHEMA_VERSION,
        &hex::encode(digest.0)[..12]
    )
}

struct CacheEntry {
    inserted: Instant,
    questions: Vec<CandidateQuestion>,
}

/// In-process TTL cache for validated generation results.
pub struct GenerationCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
    ttl: Duration,
}

impl GenerationCache {
    pub fn new() -> Self {
        Self::with_ttl(CACHE_TTL)
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    /// Fresh hit or nothing; expired entries are dropped on the way out.
    pub async fn get(&self, key: &str) -> Option<Vec<CandidateQuestion>> {
        {
            let entries = self.entries.read().await;
            match entries.get(key) {
                Some(e) if e.inserted.elapsed() < self.ttl => return Some(e.questions.clone()),
                Some(_) => {}
                None => return None,
            }
        }
        self.entries.write().await.remove(key);
        None
    }

    pub async fn put(&self, key: String, questions: Vec<CandidateQuestion>) {
        self.entries.write().await.insert(
            key,
            CacheEntry {
                inserted: Instant::now(),
                questions,
            },
        );
    }
}

impl Default for GenerationCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(text: &str) -> CandidateQuestion {
        CandidateQuestion {
            text: text.into(),
            choices: vec!["a".into(), "b".into(), "c".into(), "d".into()],
            correct_index: 0,
            difficulty: "medium".into(),
            explanation: String::new(),
            image_url: None,
        }
    }

    #[test]
    fn test_cache_key_shape_and_determinism() {
        let curve = [Difficulty::Easy, Difficulty::Hard];
        let a = cache_key("Space", 2, &curve);
        let b = cache_key("  space  ", 2, &curve);
        assert_eq!(a, b, "topic is trimmed and lowercased");

        let prefix = format!("quiz:{}:{}:", PROMPT_VERSION, SCHEMA_VERSION);
        assert!(a.starts_with(&prefix));
        assert_eq!(a.len(), prefix.len() + 12);
    }

    #[test]
    fn test_cache_key_varies_with_inputs() {
        let curve = [Difficulty::Easy, Difficulty::Hard];
        let base = cache_key("space", 2, &curve);
        assert_ne!(base, cache_key("ocean", 2, &curve));
        assert_ne!(base, cache_key("space", 3, &curve));
        assert_ne!(
            base,
            cache_key("space", 2, &[Difficulty::Hard, Difficulty::Easy])
        );
    }

    #[tokio::test]
    async fn test_cache_roundtrip_and_expiry() {
        let cache = GenerationCache::with_ttl(Duration::from_millis(40));
        assert!(cache.get("k").await.is_none());

        cache.put("k".into(), vec![candidate("q")]).await;
        assert_eq!(cache.get("k").await.unwrap().len(), 1);

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(cache.get("k").await.is_none());
    }
}
