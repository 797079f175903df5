//! The spaced-repetition scheduling seam.
//!
//! Scheduling math lives outside the sync engine. Mutators call an
//! [`SrsScheduler`] and persist whatever it returns; [`FixtureScheduler`]
//! is a deterministic stand-in for tests.

use chrono::{DateTime, Duration, Utc};

const MILLIS_PER_DAY: f64 = 86_400_000.0;

/// How well a review went.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Rating {
    /// Forgotten.
    Again,
    /// Recalled with effort.
    Hard,
    /// Recalled.
    Good,
    /// Recalled instantly.
    Easy,
}

impl Rating {
    /// Every rating, worst first.
    pub const ALL: [Rating; 4] = [Rating::Again, Rating::Hard, Rating::Good, Rating::Easy];

    /// Returns the enum variant name used in records.
    pub fn variant(self) -> &'static str {
        match self {
            Rating::Again => "again",
            Rating::Hard => "hard",
            Rating::Good => "good",
            Rating::Easy => "easy",
        }
    }

    /// Parses a variant name.
    pub fn from_variant(variant: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|r| r.variant() == variant)
    }
}

/// Scheduling state of one skill.
#[derive(Debug, Clone, PartialEq)]
pub struct SrsState {
    /// Days until recall probability drops to the target.
    pub stability: f64,
    /// Intrinsic difficulty, 1 to 10.
    pub difficulty: f64,
    /// Next review.
    pub due: DateTime<Utc>,
    /// Successful reviews in a row.
    pub reps: i64,
}

impl SrsState {
    /// State of a skill that was never reviewed: due right away.
    pub fn new_at(at: DateTime<Utc>) -> Self {
        Self {
            stability: 0.0,
            difficulty: 5.0,
            due: at,
            reps: 0,
        }
    }
}

/// Computes the next scheduling state after a review.
///
/// Must be a pure function of its inputs: clients run it optimistically and
/// again on every rebase, and the server runs it once more.
pub trait SrsScheduler: Send + Sync {
    /// Returns the state after reviewing with `rating` at `reviewed_at`.
    fn next(&self, current: &SrsState, rating: Rating, reviewed_at: DateTime<Utc>) -> SrsState;
}

/// Deterministic scheduler with simple multiplicative intervals.
#[derive(Debug, Clone, Copy, Default)]
pub struct FixtureScheduler;

impl SrsScheduler for FixtureScheduler {
    fn next(&self, current: &SrsState, rating: Rating, reviewed_at: DateTime<Utc>) -> SrsState {
        let base = current.stability.max(1.0);
        let (stability, difficulty_delta, reps) = match rating {
            Rating::Again => (1.0, 1.0, 0),
            Rating::Hard => (base * 1.2, 0.5, current.reps + 1),
            Rating::Good => (base * 2.0, 0.0, current.reps + 1),
            Rating::Easy => (base * 3.0, -0.5, current.reps + 1),
        };
        let interval = Duration::milliseconds((stability * MILLIS_PER_DAY).round() as i64);

        SrsState {
            stability,
            difficulty: (current.difficulty + difficulty_delta).clamp(1.0, 10.0),
            due: reviewed_at + interval,
            reps,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap()
    }

    #[test]
    fn good_reviews_grow_the_interval() {
        let scheduler = FixtureScheduler;
        let first = scheduler.next(&SrsState::new_at(at()), Rating::Good, at());
        let second = scheduler.next(&first, Rating::Good, first.due);

        assert_eq!(first.stability, 2.0);
        assert_eq!(first.due, at() + Duration::days(2));
        assert_eq!(second.stability, 4.0);
        assert_eq!(second.reps, 2);
    }

    #[test]
    fn again_resets() {
        let scheduler = FixtureScheduler;
        let state = SrsState {
            stability: 30.0,
            difficulty: 9.8,
            due: at(),
            reps: 7,
        };
        let next = scheduler.next(&state, Rating::Again, at());
        assert_eq!(next.reps, 0);
        assert_eq!(next.stability, 1.0);
        assert_eq!(next.difficulty, 10.0);
    }

    #[test]
    fn variants_round_trip() {
        for rating in Rating::ALL {
            assert_eq!(Rating::from_variant(rating.variant()), Some(rating));
        }
        assert_eq!(Rating::from_variant("meh"), None);
    }
}
