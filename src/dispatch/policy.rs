use std::collections::BTreeSet;
use std::time::Duration;
use uuid::Uuid;

use super::error_classification::Outcome;

/// Internal decision for how to proceed after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Decision {
    /// Back off for `delay`, then move to the next credential.
    Rotate { delay: Duration },
    /// Nothing to rotate to: surface the original error.
    GiveUp,
    /// Terminal for this call: surface the error unchanged.
    Fail,
}

/// State of one external call across its attempts.
///
/// Cycle detection uses set membership rather than a counter, so a key that
/// comes round again in any position is recognized as already tried.
#[derive(Debug)]
pub(crate) struct CallAttemptContext {
    pub request_id: String,
    pub starting_index: usize,
    tried_indices: BTreeSet<usize>,
    attempts: usize,
}

impl CallAttemptContext {
    pub fn new(starting_index: usize) -> Self {
        Self {
            request_id: Uuid::new_v4().to_string(),
            starting_index,
            tried_indices: BTreeSet::from([starting_index]),
            attempts: 0,
        }
    }

    /// Count a new attempt and return its 1-based number.
    pub fn begin_attempt(&mut self) -> usize {
        self.attempts += 1;
        self.attempts
    }

    pub fn attempts(&self) -> usize {
        self.attempts
    }

    pub fn tried(&self) -> usize {
        self.tried_indices.len()
    }

    /// Record the index a rotation landed on.
    ///
    /// Returns `false` when it was already tried during this call.
    pub fn record_rotation(&mut self, index: usize) -> bool {
        self.tried_indices.insert(index)
    }
}

/// Decide what follows a non-successful outcome.
pub(crate) fn decide(outcome: &Outcome, can_rotate: bool, sleep_on_retry: Duration) -> Decision {
    match outcome {
        Outcome::RateLimited(_) if can_rotate => Decision::Rotate {
            delay: sleep_on_retry,
        },
        Outcome::RateLimited(_) => Decision::GiveUp,
        _ => Decision::Fail,
    }
}
