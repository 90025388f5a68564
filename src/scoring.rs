//! Answer scoring.
//!
//! Pure function of the answer facts; never touches storage. The runtime
//! feeds it the player's streak *before* the answer being scored.

use crate::types::Difficulty;

const BASE_POINTS: f64 = 1000.0;
const MAX_SPEED_BONUS: f64 = 500.0;
const STREAK_BONUS_PER: f64 = 100.0;

fn multiplier(difficulty: Difficulty) -> f64 {
    match difficulty {
        Difficulty::Easy => 0.8,
        Difficulty::Medium => 1.0,
        Difficulty::Hard => 1.3,
        Difficulty::VeryHard => 1.5,
        Difficulty::Fun => 0.5,
    }
}

/// Points awarded for a single answer.
///
/// Wrong answers score 0. Correct answers score
/// `floor((1000 + speed_bonus + streak_bonus) × multiplier)` where the
/// speed bonus decays linearly from 500 to 0 over the time limit and the
/// streak bonus is 100 per consecutive correct answer already on the books.
/// `time_taken` may exceed `time_limit` (late or capped clients); the floor
/// at zero is the only clamp.
pub fn score_answer(
    is_correct: bool,
    time_taken: f64,
    time_limit: u32,
    streak_before: u32,
    difficulty: Difficulty,
) -> i64 {
    if !is_correct {
        return 0;
    }

    let speed_bonus = if time_limit == 0 {
        0.0
    } else {
        (((1.0 - time_taken / time_limit as f64) * MAX_SPEED_BONUS).floor()).max(0.0)
    };
    let streak_bonus = streak_before as f64 * STREAK_BONUS_PER;

    ((BASE_POINTS + speed_bonus + streak_bonus) * multiplier(difficulty)).floor() as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wrong_answer_scores_zero() {
        assert_eq!(score_answer(false, 0.1, 20, 9, Difficulty::VeryHard), 0);
        assert_eq!(score_answer(false, 50.0, 20, 0, Difficulty::Easy), 0);
    }

    #[test]
    fn test_timed_out_medium_answer_is_base() {
        // At or past the limit the speed bonus is gone.
        assert_eq!(score_answer(true, 20.0, 20, 0, Difficulty::Medium), 1000);
        assert_eq!(score_answer(true, 25.0, 20, 0, Difficulty::Medium), 1000);
    }

    #[test]
    fn test_happy_path_values() {
        // The three first-question scores of a 20s medium question.
        assert_eq!(score_answer(true, 2.0, 20, 0, Difficulty::Medium), 1450);
        assert_eq!(score_answer(true, 5.0, 20, 0, Difficulty::Medium), 1375);
        assert_eq!(score_answer(true, 18.0, 20, 0, Difficulty::Medium), 1050);
        // Second question, hard, streak 1, 10 of 20 seconds.
        assert_eq!(score_answer(true, 10.0, 20, 1, Difficulty::Hard), 1755);
    }

    #[test]
    fn test_difficulty_multipliers() {
        assert_eq!(score_answer(true, 20.0, 20, 0, Difficulty::Easy), 800);
        assert_eq!(score_answer(true, 20.0, 20, 0, Difficulty::Hard), 1300);
        assert_eq!(score_answer(true, 20.0, 20, 0, Difficulty::VeryHard), 1500);
        assert_eq!(score_answer(true, 20.0, 20, 0, Difficulty::Fun), 500);
    }

    #[test]
    fn test_monotone_in_time_taken() {
        let mut prev = i64::MAX;
        for tenths in 0..400 {
            let t = tenths as f64 / 10.0;
            let s = score_answer(true, t, 20, 2, Difficulty::Hard);
            assert!(s <= prev, "score increased at t={}", t);
            prev = s;
        }
    }

    #[test]
    fn test_monotone_in_streak() {
        let mut prev = 0;
        for streak in 0..30 {
            let s = score_answer(true, 7.0, 20, streak, Difficulty::Medium);
            assert!(s >= prev, "score decreased at streak={}", streak);
            prev = s;
        }
    }

    #[test]
    fn test_zero_time_limit_has_no_speed_bonus() {
        assert_eq!(score_answer(true, 3.0, 0, 0, Difficulty::Medium), 1000);
    }
}
