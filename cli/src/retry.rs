use crate::error::Error;
use std::future::Future;
use std::time::Duration;

/// Bounded retry policy shared by every wait loop in the deployment flow
///
/// A single value carries the attempt ceiling and the fixed delay, the
/// call site supplies the predicate deciding which errors are worth
/// another attempt. Exhausting the budget returns the last error.
#[derive(Clone, Copy, Debug)]
pub struct Retry {
    pub max_attempts: u32,
    pub delay: Duration,
}

/// Waiting for a freshly created IAM role to become retrievable
pub const ROLE_PROPAGATION: Retry = Retry {
    max_attempts: 10,
    delay: Duration::from_secs(2),
};

/// Retrying function creation while the role cannot be assumed yet
pub const ROLE_ASSUMPTION: Retry = Retry {
    max_attempts: 5,
    delay: Duration::from_secs(3),
};

/// Polling a function until it leaves the Pending state
pub const ACTIVATION: Retry = Retry {
    max_attempts: 30,
    delay: Duration::from_secs(2),
};

impl Retry {
    /// Total time covered by the policy, used in timeout messages
    pub fn bound(&self) -> Duration {
        self.delay * self.max_attempts
    }

    /// Run `op` until it succeeds, fails with a non-retryable error,
    /// or the attempt budget is exhausted
    ///
    /// The operation receives the 1-based attempt number. The fixed
    /// delay is slept between attempts, not after the last one.
    pub async fn run<T, F, Fut>(
        &self,
        mut op: F,
        retryable: impl Fn(&Error) -> bool,
    ) -> Result<T, Error>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, Error>>,
    {
        let mut attempt = 0;

        loop {
            attempt += 1;

            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    if attempt >= self.max_attempts || !retryable(&err) {
                        return Err(err);
                    }

                    log::debug!(
                        "Attempt {attempt}/{} failed, retrying in {:?}: {err}",
                        self.max_attempts,
                        self.delay,
                    );

                    tokio::time::sleep(self.delay).await;
                }
            }
        }
    }
}
