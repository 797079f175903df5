//! Bounded transaction retry.

use crate::error::{ServerError, ServerResult};
use cvrsync_core::{MemoryStore, Transaction};

/// Runs `body` in a transaction and commits it, retrying on retryable
/// errors.
///
/// `body` may run several times and must not have side effects outside the
/// transaction. An `Err` from `body` discards the transaction. After
/// `max_attempts` retryable failures the result is
/// [`ServerError::RetriesExhausted`]; nothing from any attempt is visible.
pub fn run_in_transaction<T, F>(store: &MemoryStore, max_attempts: u32, mut body: F) -> ServerResult<T>
where
    F: FnMut(&mut Transaction<'_>) -> ServerResult<T>,
{
    let max_attempts = max_attempts.max(1);
    let mut last = String::new();

    for attempt in 1..=max_attempts {
        let mut tx = store.begin();
        let result = body(&mut tx).and_then(|value| {
            tx.commit()?;
            Ok(value)
        });

        match result {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() => {
                tracing::warn!(attempt, max_attempts, error = %e, "retrying transaction");
                last = e.to_string();
            }
            Err(e) => return Err(e),
        }
    }

    Err(ServerError::RetriesExhausted {
        attempts: max_attempts,
        last,
    })
}
