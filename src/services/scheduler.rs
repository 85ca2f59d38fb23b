use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

pub const MIN_DIFFICULTY: i32 = 0;
pub const MAX_DIFFICULTY: i32 = 5;
pub const DEFAULT_DUE_LIMIT: usize = 20;

/// Outcome of a single recall attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewOutcome {
    Correct,
    Incorrect,
}

impl ReviewOutcome {
    pub fn from_correct(is_correct: bool) -> Self {
        if is_correct {
            Self::Correct
        } else {
            Self::Incorrect
        }
    }

    /// Only an explicit JSON `true` counts as a correct answer.
    pub fn from_json(value: Option<&serde_json::Value>) -> Self {
        match value {
            Some(serde_json::Value::Bool(true)) => Self::Correct,
            _ => Self::Incorrect,
        }
    }

    pub fn is_correct(self) -> bool {
        matches!(self, Self::Correct)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewState {
    pub difficulty: i32,
    pub times_reviewed: i32,
    pub times_correct: i32,
    pub last_reviewed: Option<DateTime<Utc>>,
    pub next_review: Option<DateTime<Utc>>,
}

impl Default for ReviewState {
    fn default() -> Self {
        Self {
            difficulty: MIN_DIFFICULTY,
            times_reviewed: 0,
            times_correct: 0,
            last_reviewed: None,
            next_review: None,
        }
    }
}

impl ReviewState {
    /// Percentage of correct reviews rounded to one decimal place.
    pub fn accuracy(&self) -> Option<f64> {
        accuracy(self.times_correct, self.times_reviewed)
    }
}

pub fn clamp_difficulty(difficulty: i32) -> i32 {
    difficulty.clamp(MIN_DIFFICULTY, MAX_DIFFICULTY)
}

pub fn interval_days(new_difficulty: i32, outcome: ReviewOutcome) -> i64 {
    match outcome {
        ReviewOutcome::Correct => 1_i64 << clamp_difficulty(new_difficulty),
        ReviewOutcome::Incorrect => 1,
    }
}

/// Applies one review to `state`.
///
/// Correct answers step the difficulty toward 0 and wait `2^difficulty` days,
/// incorrect answers step toward 5 and come back after a single day.
pub fn record_review(state: &ReviewState, outcome: ReviewOutcome, now: DateTime<Utc>) -> ReviewState {
    let difficulty = clamp_difficulty(state.difficulty);
    let times_reviewed = state.times_reviewed.max(0);
    let times_correct = state.times_correct.clamp(0, times_reviewed);

    let (new_difficulty, new_correct) = match outcome {
        ReviewOutcome::Correct => ((difficulty - 1).max(MIN_DIFFICULTY), times_correct + 1),
        ReviewOutcome::Incorrect => ((difficulty + 1).min(MAX_DIFFICULTY), times_correct),
    };

    let interval = interval_days(new_difficulty, outcome);

    ReviewState {
        difficulty: new_difficulty,
        times_reviewed: times_reviewed + 1,
        times_correct: new_correct,
        last_reviewed: Some(now),
        next_review: Some(now + Duration::days(interval)),
    }
}

pub fn is_due(next_review: Option<DateTime<Utc>>, as_of: DateTime<Utc>) -> bool {
    match next_review {
        None => true,
        Some(at) => at <= as_of,
    }
}

pub fn accuracy(times_correct: i32, times_reviewed: i32) -> Option<f64> {
    if times_reviewed <= 0 {
        return None;
    }
    let pct = times_correct as f64 / times_reviewed as f64 * 100.0;
    Some((pct * 10.0).round() / 10.0)
}

/// Anything that can be put through the due-card selection.
pub trait DueCandidate {
    fn next_review(&self) -> Option<DateTime<Utc>>;
    fn subject_id(&self) -> &str;
}

/// Parses a raw `limit` query value. Missing, non-numeric and non-positive
/// values all mean the default.
pub fn normalize_limit(raw: Option<&str>) -> usize {
    raw.and_then(|value| value.trim().parse::<i64>().ok())
        .filter(|value| *value > 0)
        .map(|value| value as usize)
        .unwrap_or(DEFAULT_DUE_LIMIT)
}

/// Cards due at `as_of`, never-reviewed first, then oldest `next_review`.
pub fn select_due<T, I>(cards: I, as_of: DateTime<Utc>, subject_filter: Option<&str>, limit: usize) -> Vec<T>
where
    T: DueCandidate,
    I: IntoIterator<Item = T>,
{
    let limit = if limit == 0 { DEFAULT_DUE_LIMIT } else { limit };

    let mut due: Vec<T> = cards
        .into_iter()
        .filter(|card| is_due(card.next_review(), as_of))
        .filter(|card| subject_filter.map_or(true, |subject| card.subject_id() == subject))
        .collect();

    // Option orders None before Some, which is exactly nulls-first.
    due.sort_by_key(|card| card.next_review());
    due.truncate(limit);
    due
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 10, 12, 0, 0).unwrap()
    }

    fn with_difficulty(difficulty: i32) -> ReviewState {
        ReviewState {
            difficulty,
            ..Default::default()
        }
    }

    #[derive(Debug, Clone, PartialEq)]
    struct Card {
        name: &'static str,
        subject: &'static str,
        next_review: Option<DateTime<Utc>>,
    }

    impl DueCandidate for Card {
        fn next_review(&self) -> Option<DateTime<Utc>> {
            self.next_review
        }

        fn subject_id(&self) -> &str {
            self.subject
        }
    }

    #[test]
    fn test_correct_from_three_waits_four_days() {
        let result = record_review(&with_difficulty(3), ReviewOutcome::Correct, now());
        assert_eq!(result.difficulty, 2);
        assert_eq!(result.next_review, Some(now() + Duration::days(4)));
        assert_eq!(result.last_reviewed, Some(now()));
    }

    #[test]
    fn test_incorrect_from_zero_waits_one_day() {
        let result = record_review(&with_difficulty(0), ReviewOutcome::Incorrect, now());
        assert_eq!(result.difficulty, 1);
        assert_eq!(result.next_review, Some(now() + Duration::days(1)));
    }

    #[test]
    fn test_correct_from_five_waits_sixteen_days() {
        let result = record_review(&with_difficulty(5), ReviewOutcome::Correct, now());
        assert_eq!(result.difficulty, 4);
        assert_eq!(result.next_review, Some(now() + Duration::days(16)));
    }

    #[test]
    fn test_difficulty_stays_in_bounds() {
        let easiest = record_review(&with_difficulty(0), ReviewOutcome::Correct, now());
        assert_eq!(easiest.difficulty, 0);
        assert_eq!(easiest.next_review, Some(now() + Duration::days(1)));

        let hardest = record_review(&with_difficulty(5), ReviewOutcome::Incorrect, now());
        assert_eq!(hardest.difficulty, 5);
        assert_eq!(hardest.next_review, Some(now() + Duration::days(1)));
    }

    #[test]
    fn test_corrupt_difficulty_is_clamped() {
        let high = record_review(&with_difficulty(42), ReviewOutcome::Correct, now());
        assert_eq!(high.difficulty, 4);

        let low = record_review(&with_difficulty(-7), ReviewOutcome::Incorrect, now());
        assert_eq!(low.difficulty, 1);
    }

    #[test]
    fn test_counters() {
        let mut state = ReviewState::default();
        let outcomes = [true, false, true, true, false];
        for correct in outcomes {
            state = record_review(&state, ReviewOutcome::from_correct(correct), now());
        }
        assert_eq!(state.times_reviewed, 5);
        assert_eq!(state.times_correct, 3);
        assert_eq!(state.accuracy(), Some(60.0));
    }

    #[test]
    fn test_accuracy_rounding() {
        assert_eq!(accuracy(0, 0), None);
        assert_eq!(accuracy(1, 3), Some(33.3));
        assert_eq!(accuracy(2, 3), Some(66.7));
        assert_eq!(accuracy(3, 3), Some(100.0));
    }

    #[test]
    fn test_outcome_from_json() {
        use serde_json::json;
        assert_eq!(ReviewOutcome::from_json(Some(&json!(true))), ReviewOutcome::Correct);
        assert_eq!(ReviewOutcome::from_json(Some(&json!(false))), ReviewOutcome::Incorrect);
        assert_eq!(ReviewOutcome::from_json(Some(&json!("true"))), ReviewOutcome::Incorrect);
        assert_eq!(ReviewOutcome::from_json(Some(&json!(1))), ReviewOutcome::Incorrect);
        assert_eq!(ReviewOutcome::from_json(None), ReviewOutcome::Incorrect);
    }

    #[test]
    fn test_is_due_boundary() {
        let at = now();
        assert!(is_due(None, at));
        assert!(is_due(Some(at), at));
        assert!(!is_due(Some(at + Duration::seconds(1)), at));
    }

    #[test]
    fn test_normalize_limit() {
        assert_eq!(normalize_limit(None), DEFAULT_DUE_LIMIT);
        assert_eq!(normalize_limit(Some("5")), 5);
        assert_eq!(normalize_limit(Some("0")), DEFAULT_DUE_LIMIT);
        assert_eq!(normalize_limit(Some("-3")), DEFAULT_DUE_LIMIT);
        assert_eq!(normalize_limit(Some("ten")), DEFAULT_DUE_LIMIT);
    }

    #[test]
    fn test_select_due_orders_new_cards_first() {
        let cards = vec![
            Card { name: "tomorrow", subject: "s1", next_review: Some(now() + Duration::days(1)) },
            Card { name: "yesterday", subject: "s1", next_review: Some(now() - Duration::days(1)) },
            Card { name: "new", subject: "s1", next_review: None },
        ];

        let due = select_due(cards, now(), None, 10);
        let names: Vec<_> = due.iter().map(|card| card.name).collect();
        assert_eq!(names, vec!["new", "yesterday"]);
    }

    #[test]
    fn test_select_due_filter_and_limit() {
        let cards = vec![
            Card { name: "a", subject: "s1", next_review: Some(now() - Duration::days(3)) },
            Card { name: "b", subject: "s2", next_review: None },
            Card { name: "c", subject: "s1", next_review: Some(now() - Duration::days(5)) },
            Card { name: "d", subject: "s1", next_review: Some(now()) },
        ];

        let due = select_due(cards.clone(), now(), Some("s1"), 2);
        let names: Vec<_> = due.iter().map(|card| card.name).collect();
        assert_eq!(names, vec!["c", "a"]);

        let all = select_due(cards, now(), None, 0);
        assert_eq!(all.len(), 4);
    }
}
