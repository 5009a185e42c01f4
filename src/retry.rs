// Bounded generate/insert/retry-on-conflict loop.

use futures::future::BoxFuture;

#[derive(Debug, PartialEq, Eq)]
pub enum RetryError<E> {
    /// Every attempt collided with an existing key.
    Exhausted { attempts: u32 },
    /// The insert itself failed; not retried.
    Failed(E),
}

/// Generate a candidate and try to insert it, regenerating on conflict.
///
/// `insert_if_absent` returns `Ok(true)` when the candidate was stored and
/// `Ok(false)` when the key already existed. Uniqueness is left to the
/// store's key constraint; this only bounds how often we ask. Errors from the
/// insert abort immediately.
pub async fn retry_insert<S, C, E, G, F>(
    max_attempts: u32,
    state: &mut S,
    mut generate: G,
    mut insert_if_absent: F,
) -> Result<C, RetryError<E>>
where
    S: ?Sized,
    C: Clone,
    G: FnMut() -> C,
    F: for<'a> FnMut(&'a mut S, C) -> BoxFuture<'a, Result<bool, E>>,
{
    for attempt in 1..=max_attempts {
        let candidate = generate();
        match insert_if_absent(&mut *state, candidate.clone()).await {
            Ok(true) => return Ok(candidate),
            Ok(false) => {
                tracing::warn!("Key collision on attempt {attempt}/{max_attempts}, regenerating");
            }
            Err(e) => return Err(RetryError::Failed(e)),
        }
    }
    Err(RetryError::Exhausted {
        attempts: max_attempts,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::convert::Infallible;

    #[tokio::test]
    async fn test_first_attempt_succeeds() {
        let mut taken: HashSet<String> = HashSet::new();
        let result = retry_insert(
            3,
            &mut taken,
            || "a".to_string(),
            |set, c| Box::pin(async move { Ok::<_, Infallible>(set.insert(c)) }),
        )
        .await;
        assert_eq!(result, Ok("a".to_string()));
        assert!(taken.contains("a"));
    }

    #[tokio::test]
    async fn test_regenerates_after_collision() {
        let mut taken: HashSet<String> = ["a".to_string(), "b".to_string()].into();
        let mut candidates = vec!["c", "b", "a"];
        let result = retry_insert(
            5,
            &mut taken,
            || candidates.pop().unwrap().to_string(),
            |set, c| Box::pin(async move { Ok::<_, Infallible>(set.insert(c)) }),
        )
        .await;
        assert_eq!(result, Ok("c".to_string()));
        assert_eq!(taken.len(), 3);
    }

    #[tokio::test]
    async fn test_exhausts_after_max_attempts() {
        let mut taken: HashSet<String> = ["dup".to_string()].into();
        let mut calls = 0;
        let result = retry_insert(
            4,
            &mut taken,
            || {
                calls += 1;
                "dup".to_string()
            },
            |set, c| Box::pin(async move { Ok::<_, Infallible>(set.insert(c)) }),
        )
        .await;
        assert_eq!(result, Err(RetryError::Exhausted { attempts: 4 }));
        assert_eq!(calls, 4);
    }

    #[tokio::test]
    async fn test_insert_error_is_not_retried() {
        let mut attempts = 0u32;
        let result: Result<String, RetryError<&str>> = retry_insert(
            5,
            &mut attempts,
            || "x".to_string(),
            |n, _c| {
                Box::pin(async move {
                    *n += 1;
                    Err("disk full")
                })
            },
        )
        .await;
        assert_eq!(result, Err(RetryError::Failed("disk full")));
        assert_eq!(attempts, 1);
    }
}
