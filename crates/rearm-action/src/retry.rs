//! Bounded fixed-backoff retry with a convergence check.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use rearm_core::config::RetryConfig;
use tracing::{debug, warn};

/// Errors that say whether another attempt could help.
pub trait Retryable: Display {
    fn is_retryable(&self) -> bool;
}

/// How a retried operation ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryOutcome {
    /// An attempt returned `Ok`.
    Succeeded { attempts: u32 },
    /// An attempt failed but the convergence check saw the goal reached.
    Converged { attempts: u32 },
    /// Every attempt failed and the goal was never observed.
    Exhausted { attempts: u32 },
}

impl RetryOutcome {
    pub fn attempts(&self) -> u32 {
        match self {
            RetryOutcome::Succeeded { attempts }
            | RetryOutcome::Converged { attempts }
            | RetryOutcome::Exhausted { attempts } => *attempts,
        }
    }

    pub fn reached_goal(&self) -> bool {
        !matches!(self, RetryOutcome::Exhausted { .. })
    }
}

/// Up to `max_attempts` tries, sleeping `backoff` before every try after the
/// first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 6,
            backoff: Duration::from_secs(5),
        }
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            backoff: Duration::from_secs(config.backoff_secs),
        }
    }
}

impl RetryPolicy {
    /// Run `attempt` until it succeeds, `converged` reports the goal reached
    /// after a failure, or attempts run out.
    ///
    /// Retryable attempt failures are logged and swallowed; exhaustion is
    /// reported through the outcome. A non-retryable attempt failure or an
    /// `Err` from `converged` aborts the loop.
    pub async fn run<E, A, AF, C, CF>(
        &self,
        mut attempt: A,
        mut converged: C,
    ) -> Result<RetryOutcome, E>
    where
        E: Retryable,
        A: FnMut() -> AF,
        AF: Future<Output = Result<(), E>>,
        C: FnMut() -> CF,
        CF: Future<Output = Result<bool, E>>,
    {
        for n in 1..=self.max_attempts {
            if n > 1 {
                tokio::time::sleep(self.backoff).await;
            }
            match attempt().await {
                Ok(()) => return Ok(RetryOutcome::Succeeded { attempts: n }),
                Err(e) if !e.is_retryable() => return Err(e),
                Err(e) => {
                    warn!(attempt = n, max_attempts = self.max_attempts, error = %e, "Attempt failed");
                }
            }
            if converged().await? {
                debug!(attempt = n, "Converged after failed attempt");
                return Ok(RetryOutcome::Converged { attempts: n });
            }
        }
        Ok(RetryOutcome::Exhausted {
            attempts: self.max_attempts,
        })
    }
}
