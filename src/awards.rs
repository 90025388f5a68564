//! End-of-game accolades.
//!
//! Runs once when a session finishes, over every answer the session
//! collected joined to its question facts. Pure and deterministic: the
//! same inputs always elect the same winners.

use crate::protocol::AwardInfo;
use crate::types::{Difficulty, PlayerId};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

/// Seconds-to-spare threshold for a clutch answer.
const CLUTCH_WINDOW: f64 = 3.0;
/// Mean correct-answer time required for the fastest award.
const FASTEST_MEAN: f64 = 3.0;
/// Accuracy floor for the accurate award.
const ACCURATE_RATIO: f64 = 0.85;
/// Streak floor for the strategist award.
const STRATEGIST_STREAK: u32 = 5;
/// Slow-but-right threshold for the lucky award.
const LUCKY_TIME: f64 = 15.0;

/// One player's collected facts, as the evaluator sees them.
#[derive(Debug, Clone)]
pub struct PlayerRecord {
    pub player_id: PlayerId,
    pub name: String,
    pub max_streak: u32,
    pub joined_at: DateTime<Utc>,
    pub answers: Vec<AnswerFacts>,
}

/// An answer joined to the question it was given for.
#[derive(Debug, Clone)]
pub struct AnswerFacts {
    pub is_correct: bool,
    pub time_taken: f64,
    pub difficulty: Difficulty,
    /// Effective limit of the question (override or quiz default).
    pub time_limit: u32,
}

struct AwardSpec {
    key: &'static str,
    emoji: &'static str,
    /// Returns (ranking metric, display value) for an eligible player.
    /// Higher metric wins; ties break by earliest joined_at.
    eligible: fn(&PlayerRecord) -> Option<(f64, f64)>,
    describe: fn(f64) -> String,
}

const AWARDS: &[AwardSpec] = &[
    AwardSpec {
        key: "fastest",
        emoji: "⚡",
        eligible: |p| {
            let correct: Vec<f64> = p
                .answers
                .iter()
                .filter(|a| a.is_correct)
                .map(|a| a.time_taken)
                .collect();
            if correct.is_empty() {
                return None;
            }
            let mean = correct.iter().sum::<f64>() / correct.len() as f64;
            (mean < FASTEST_MEAN).then_some((-mean, mean))
        },
        describe: |mean| format!("Average correct answer in {:.1}s", mean),
    },
    AwardSpec {
        key: "accurate",
        emoji: "🎯",
        eligible: |p| {
            if p.answers.is_empty() {
                return None;
            }
            let correct = p.answers.iter().filter(|a| a.is_correct).count();
            let ratio = correct as f64 / p.answers.len() as f64;
            (ratio >= ACCURATE_RATIO).then_some((ratio, ratio))
        },
        describe: |ratio| format!("{:.0}% of answers correct", ratio * 100.0),
    },
    AwardSpec {
        key: "clutch",
        emoji: "🔥",
        eligible: |p| {
            let count = p
                .answers
                .iter()
                .filter(|a| a.is_correct && a.time_taken >= a.time_limit as f64 - CLUTCH_WINDOW)
                .count();
            (count >= 2).then_some((count as f64, count as f64))
        },
        describe: |count| format!("{} answers landed in the final seconds", count),
    },
    AwardSpec {
        key: "strategist",
        emoji: "🧠",
        eligible: |p| {
            (p.max_streak >= STRATEGIST_STREAK).then_some((p.max_streak as f64, p.max_streak as f64))
        },
        describe: |streak| format!("Best streak of {} in a row", streak),
    },
    AwardSpec {
        key: "lucky",
        emoji: "🎲",
        eligible: |p| {
            let count = p
                .answers
                .iter()
                .filter(|a| {
                    a.is_correct
                        && matches!(a.difficulty, Difficulty::Hard | Difficulty::VeryHard)
                        && a.time_taken > LUCKY_TIME
                })
                .count();
            (count >= 2).then_some((count as f64, count as f64))
        },
        describe: |count| format!("{} slow wins on the hardest questions", count),
    },
];

/// Compute the award table for a finished session.
///
/// Keys absent from the result had no eligible player. A player may win
/// any number of awards.
pub fn evaluate(players: &[PlayerRecord]) -> BTreeMap<String, AwardInfo> {
    let mut out = BTreeMap::new();

    for spec in AWARDS {
        let mut candidates: Vec<(&PlayerRecord, f64, f64)> = players
            .iter()
            .filter_map(|p| (spec.eligible)(p).map(|(metric, value)| (p, metric, value)))
            .collect();

        // Best metric first; joined_at breaks remaining ties.
        candidates.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.joined_at.cmp(&b.0.joined_at))
        });

        if let Some((winner, _, value)) = candidates.first() {
            out.insert(
                spec.key.to_string(),
                AwardInfo {
                    player_id: winner.player_id.clone(),
                    name: winner.name.clone(),
                    emoji: spec.emoji.to_string(),
                    value: *value,
                    description: (spec.describe)(*value),
                },
            );
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn joined(offset_secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + offset_secs, 0).unwrap()
    }

    fn correct(time_taken: f64, difficulty: Difficulty, time_limit: u32) -> AnswerFacts {
        AnswerFacts {
            is_correct: true,
            time_taken,
            difficulty,
            time_limit,
        }
    }

    fn wrong(time_taken: f64) -> AnswerFacts {
        AnswerFacts {
            is_correct: false,
            time_taken,
            difficulty: Difficulty::Medium,
            time_limit: 20,
        }
    }

    fn player(id: &str, offset: i64, max_streak: u32, answers: Vec<AnswerFacts>) -> PlayerRecord {
        PlayerRecord {
            player_id: id.to_string(),
            name: id.to_uppercase(),
            max_streak,
            joined_at: joined(offset),
            answers,
        }
    }

    #[test]
    fn test_no_players_no_awards() {
        assert!(evaluate(&[]).is_empty());
    }

    #[test]
    fn test_multi_award_winner() {
        // Streak 6 and 3 slow hard wins in a 10-question game: strategist
        // and lucky go to the same player, and with everyone below 85%
        // accuracy that key is absent entirely.
        let mut answers = vec![
            correct(16.0, Difficulty::Hard, 30),
            correct(17.0, Difficulty::VeryHard, 30),
            correct(18.5, Difficulty::VeryHard, 30),
        ];
        for _ in 0..5 {
            answers.push(correct(6.0, Difficulty::Medium, 20));
        }
        answers.push(wrong(4.0));
        answers.push(wrong(9.0));
        let x = player("x", 0, 6, answers);

        let others: Vec<PlayerRecord> = (1..5)
            .map(|i| {
                player(
                    &format!("p{}", i),
                    i,
                    2,
                    vec![correct(8.0, Difficulty::Medium, 20), wrong(5.0), wrong(5.0)],
                )
            })
            .collect();

        let mut all = vec![x];
        all.extend(others);
        let awards = evaluate(&all);

        assert_eq!(awards["strategist"].player_id, "x");
        assert_eq!(awards["strategist"].value, 6.0);
        assert_eq!(awards["lucky"].player_id, "x");
        assert_eq!(awards["lucky"].value, 3.0);
        // Nobody reaches 85% accuracy, and nobody's correct mean is under 3s.
        assert!(!awards.contains_key("accurate"));
        assert!(!awards.contains_key("fastest"));
    }

    #[test]
    fn test_fastest_requires_mean_under_threshold() {
        let slow = player("slow", 0, 1, vec![correct(3.0, Difficulty::Easy, 20)]);
        assert!(!evaluate(&[slow]).contains_key("fastest"));

        let fast = player("fast", 0, 1, vec![correct(2.9, Difficulty::Easy, 20)]);
        let awards = evaluate(&[fast]);
        assert_eq!(awards["fastest"].player_id, "fast");
    }

    #[test]
    fn test_fastest_prefers_smaller_mean() {
        let a = player("a", 5, 1, vec![correct(2.5, Difficulty::Easy, 20)]);
        let b = player("b", 0, 1, vec![correct(1.5, Difficulty::Easy, 20)]);
        let awards = evaluate(&[a, b]);
        assert_eq!(awards["fastest"].player_id, "b");
        assert!((awards["fastest"].value - 1.5).abs() < 1e-9);
    }

    #[test]
    fn test_accuracy_counts_wrong_answers() {
        // 6/7 ≈ 0.857 passes, 5/6 ≈ 0.833 does not.
        let mut good: Vec<AnswerFacts> =
            (0..6).map(|_| correct(5.0, Difficulty::Medium, 20)).collect();
        good.push(wrong(5.0));
        let pass = player("pass", 0, 1, good);

        let mut meh: Vec<AnswerFacts> =
            (0..5).map(|_| correct(5.0, Difficulty::Medium, 20)).collect();
        meh.push(wrong(5.0));
        let fail = player("fail", 1, 1, meh);

        let awards = evaluate(&[pass, fail]);
        assert_eq!(awards["accurate"].player_id, "pass");
    }

    #[test]
    fn test_clutch_uses_effective_limit() {
        // 17.5 of 20 is inside the window; 16.9 is not.
        let clutch = player(
            "c",
            0,
            1,
            vec![
                correct(17.5, Difficulty::Medium, 20),
                correct(19.0, Difficulty::Medium, 20),
            ],
        );
        let close = player(
            "d",
            1,
            1,
            vec![
                correct(16.9, Difficulty::Medium, 20),
                correct(16.9, Difficulty::Medium, 20),
            ],
        );
        let awards = evaluate(&[clutch, close]);
        assert_eq!(awards["clutch"].player_id, "c");
        assert_eq!(awards["clutch"].value, 2.0);
    }

    #[test]
    fn test_lucky_needs_hard_and_slow() {
        // Slow but easy, and hard but fast: neither counts.
        let not_lucky = player(
            "n",
            0,
            1,
            vec![
                correct(20.0, Difficulty::Easy, 30),
                correct(3.0, Difficulty::Hard, 30),
            ],
        );
        assert!(!evaluate(&[not_lucky]).contains_key("lucky"));

        let lucky = player(
            "l",
            0,
            1,
            vec![
                correct(16.0, Difficulty::Hard, 30),
                correct(18.0, Difficulty::VeryHard, 30),
            ],
        );
        let awards = evaluate(&[lucky]);
        assert_eq!(awards["lucky"].player_id, "l");
    }

    #[test]
    fn test_tie_breaks_by_join_order() {
        let late = player("late", 10, 7, vec![]);
        let early = player("early", 0, 7, vec![]);
        let awards = evaluate(&[late, early]);
        assert_eq!(awards["strategist"].player_id, "early");
    }
}
