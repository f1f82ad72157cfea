//! Conflict-tolerant writes keyed by a natural key.
//!
//! Two writers may race to create the same `(application, field)` or
//! `(evaluation, criterion)` row. The store rejects the loser with
//! [`RepositoryError::Conflict`]; the helpers here re-read and retry so that,
//! once a call returns `Ok`, exactly one row holds the latest writer's value.

use std::thread;
use std::time::Duration;

use tracing::{debug, warn};

use super::error::{RepositoryError, ReviewError};

const DEFAULT_ATTEMPTS: u32 = 3;
const DEFAULT_BACKOFF: Duration = Duration::from_millis(25);

/// Bounded retry schedule with linear backoff between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    backoff: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn backoff(&self) -> Duration {
        self.backoff
    }

    fn pause(&self, attempt: u32) {
        let delay = self.backoff.saturating_mul(attempt);
        if !delay.is_zero() {
            thread::sleep(delay);
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_ATTEMPTS, DEFAULT_BACKOFF)
    }
}

/// Insert-or-update a row identified by `key`.
///
/// Each attempt re-reads the row: a miss inserts, a hit updates in place. An
/// insert that loses a race surfaces as `Conflict` and the next attempt sees the
/// winner's row, so the final attempt always degrades to a plain update. Store
/// failures other than conflicts propagate immediately.
pub fn upsert_with_retry<T, L, I, U>(
    policy: &RetryPolicy,
    key: &str,
    mut lookup: L,
    mut insert: I,
    mut update: U,
) -> Result<T, ReviewError>
where
    L: FnMut() -> Result<Option<T>, RepositoryError>,
    I: FnMut() -> Result<T, RepositoryError>,
    U: FnMut(&T) -> Result<T, RepositoryError>,
{
    for attempt in 1..=policy.max_attempts {
        let outcome = match lookup()? {
            Some(existing) => update(&existing),
            None => insert(),
        };

        match outcome {
            Ok(row) => {
                if attempt > 1 {
                    debug!(key, attempt, "upsert settled after conflict");
                }
                return Ok(row);
            }
            Err(RepositoryError::Conflict | RepositoryError::NotFound) => {
                debug!(key, attempt, "upsert lost a race, retrying");
                if attempt < policy.max_attempts {
                    policy.pause(attempt);
                }
            }
            Err(other) => return Err(other.into()),
        }
    }

    warn!(key, attempts = policy.max_attempts, "upsert retries exhausted");
    Err(ReviewError::ConcurrencyExhausted {
        key: key.to_string(),
        attempts: policy.max_attempts,
    })
}

/// Re-run a read-check-write transaction while its save loses to a concurrent writer.
///
/// The closure must re-read every row it validates, so each attempt checks the
/// rules against fresh state. Domain rejections and store outages end the loop
/// at once; only `Conflict` from the store is retried.
pub fn retry_transaction<T, F>(
    policy: &RetryPolicy,
    key: &str,
    mut transaction: F,
) -> Result<T, ReviewError>
where
    F: FnMut() -> Result<T, ReviewError>,
{
    for attempt in 1..=policy.max_attempts {
        match transaction() {
            Err(ReviewError::Repository(RepositoryError::Conflict)) => {
                debug!(key, attempt, "transaction conflicted, retrying");
                if attempt < policy.max_attempts {
                    policy.pause(attempt);
                }
            }
            settled => return settled,
        }
    }

    warn!(key, attempts = policy.max_attempts, "transaction retries exhausted");
    Err(ReviewError::ConcurrencyExhausted {
        key: key.to_string(),
        attempts: policy.max_attempts,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::{Cell, RefCell};

    fn instant() -> RetryPolicy {
        RetryPolicy::new(3, Duration::ZERO)
    }

    #[test]
    fn inserts_when_row_is_missing() {
        let row = upsert_with_retry(
            &instant(),
            "app-1/bio",
            || Ok(None),
            || Ok("inserted".to_string()),
            |_: &String| Ok("updated".to_string()),
        )
        .expect("upsert succeeds");

        assert_eq!(row, "inserted");
    }

    #[test]
    fn converts_lost_insert_into_update() {
        let stored: RefCell<Option<String>> = RefCell::new(None);
        let inserts = Cell::new(0);

        let row = upsert_with_retry(
            &instant(),
            "app-1/bio",
            || Ok(stored.borrow().clone()),
            || {
                inserts.set(inserts.get() + 1);
                // a concurrent writer commits first
                *stored.borrow_mut() = Some("theirs".to_string());
                Err(RepositoryError::Conflict)
            },
            |existing: &String| {
                assert_eq!(existing, "theirs");
                *stored.borrow_mut() = Some("mine".to_string());
                Ok("mine".to_string())
            },
        )
        .expect("second attempt updates");

        assert_eq!(row, "mine");
        assert_eq!(inserts.get(), 1);
        assert_eq!(stored.borrow().as_deref(), Some("mine"));
    }

    #[test]
    fn surfaces_exhaustion_after_max_attempts() {
        let attempts = Cell::new(0);

        let result = upsert_with_retry(
            &instant(),
            "app-1/bio",
            || Ok(None::<String>),
            || {
                attempts.set(attempts.get() + 1);
                Err(RepositoryError::Conflict)
            },
            |_| unreachable!("row never becomes visible"),
        );

        match result {
            Err(ReviewError::ConcurrencyExhausted { key, attempts: 3 }) => {
                assert_eq!(key, "app-1/bio")
            }
            other => panic!("expected exhaustion, got {other:?}"),
        }
        assert_eq!(attempts.get(), 3);
    }

    #[test]
    fn propagates_store_outages_without_retrying() {
        let attempts = Cell::new(0);

        let result = upsert_with_retry(
            &instant(),
            "app-1/bio",
            || Ok(None::<String>),
            || {
                attempts.set(attempts.get() + 1);
                Err(RepositoryError::Unavailable("offline".to_string()))
            },
            |_| unreachable!(),
        );

        assert!(matches!(
            result,
            Err(ReviewError::Repository(RepositoryError::Unavailable(_)))
        ));
        assert_eq!(attempts.get(), 1);
    }

    #[test]
    fn retry_transaction_reruns_the_whole_read_and_write() {
        let version = Cell::new(0);
        let reads = Cell::new(0);
        let value = retry_transaction(&instant(), "batch", || {
            reads.set(reads.get() + 1);
            let seen = version.get();
            if reads.get() == 1 {
                // a concurrent writer saves between our read and our write
                version.set(seen + 1);
            }
            if seen != version.get() {
                return Err(RepositoryError::Conflict.into());
            }
            Ok(seen)
        })
        .expect("second run commits");

        assert_eq!(value, 1);
        assert_eq!(reads.get(), 2);
    }

    #[test]
    fn retry_transaction_stops_at_domain_rejections() {
        let calls = Cell::new(0);
        let result: Result<(), ReviewError> = retry_transaction(&instant(), "batch", || {
            calls.set(calls.get() + 1);
            Err(ReviewError::not_found("application", "app-1"))
        });

        assert!(matches!(result, Err(ReviewError::NotFound { .. })));
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn policy_requires_at_least_one_attempt() {
        assert_eq!(RetryPolicy::new(0, Duration::ZERO).max_attempts(), 1);
        assert_eq!(RetryPolicy::default().max_attempts(), 3);
    }
}
