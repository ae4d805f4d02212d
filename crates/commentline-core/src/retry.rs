//! Retry with jittered exponential backoff

use std::time::Duration;

use rand::Rng;

/// Errors that know whether another attempt could succeed
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

impl Retryable for crate::stream::StreamError {
    fn is_retryable(&self) -> bool {
        crate::stream::StreamError::is_retryable(self)
    }
}

/// Backoff policy: `base * 2^(attempt-1)`, capped, then "equal jitter"
/// (uniform in the upper half) so parallel workers don't retry in lockstep.
#[derive(Debug, Clone, Copy)]
pub struct Backoff {
    pub base: Duration,
    pub cap: Duration,
    pub max_retries: u32,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(2),
            cap: Duration::from_secs(60),
            max_retries: 3,
        }
    }
}

impl Backoff {
    /// Un-jittered delay before retry number `attempt` (1-based)
    pub fn ceiling(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base.saturating_mul(factor).min(self.cap)
    }

    /// Jittered delay in `[ceiling/2, ceiling]`
    pub fn delay(&self, attempt: u32, rng: &mut impl Rng) -> Duration {
        let ceiling = self.ceiling(attempt);
        let half = ceiling / 2;
        if half.is_zero() {
            return ceiling;
        }
        half + rng.random_range(Duration::ZERO..=half)
    }
}

/// Run `attempt_fn` until it succeeds, fails with a non-retryable error, or
/// `max_retries` retries are used up. Sleeps on the calling thread between attempts.
pub fn retry_with_backoff<T, E>(
    label: &str,
    backoff: &Backoff,
    mut attempt_fn: impl FnMut(u32) -> Result<T, E>,
) -> Result<T, E>
where
    E: Retryable + std::fmt::Display,
{
    let mut rng = rand::rng();
    let mut attempt = 0u32;
    loop {
        match attempt_fn(attempt) {
            Ok(v) => return Ok(v),
            Err(e) if attempt < backoff.max_retries && e.is_retryable() => {
                attempt += 1;
                let delay = backoff.delay(attempt, &mut rng);
                log::debug!(
                    "{label}: attempt {attempt}/{} failed: {e}, retrying in {:.1}s",
                    backoff.max_retries,
                    delay.as_secs_f64()
                );
                std::thread::sleep(delay);
            }
            Err(e) => return Err(e),
        }
    }
}
