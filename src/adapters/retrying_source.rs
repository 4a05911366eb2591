//! Candle source wrapper that retries transient failures with exponential
//! backoff.

use std::time::Duration;

use chrono::NaiveDateTime;
use tracing::warn;

use crate::domain::candle::Candle;
use crate::domain::error::BarsimError;
use crate::ports::data_port::CandleSource;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Total calls made, including the first.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_attempts: 4,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `retry` (0-based): `base × 2^retry`, capped.
    pub fn delay(&self, retry: u32) -> Duration {
        let factor = 2u32.checked_pow(retry).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(factor)
            .map_or(self.max_delay, |d| d.min(self.max_delay))
    }
}

type SleepFn = Box<dyn Fn(Duration) + Send + Sync>;

pub struct RetryingSource<S> {
    inner: S,
    policy: RetryPolicy,
    sleep: SleepFn,
}

impl<S: CandleSource> RetryingSource<S> {
    pub fn new(inner: S, policy: RetryPolicy) -> Self {
        Self {
            inner,
            policy,
            sleep: Box::new(std::thread::sleep),
        }
    }

    /// Replaces the blocking sleep, e.g. to record delays in tests.
    pub fn with_sleep(mut self, sleep: impl Fn(Duration) + Send + Sync + 'static) -> Self {
        self.sleep = Box::new(sleep);
        self
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }
}

impl<S: CandleSource> CandleSource for RetryingSource<S> {
    fn fetch_candles(
        &self,
        symbol: &str,
        start: Option<NaiveDateTime>,
        end: Option<NaiveDateTime>,
    ) -> Result<Vec<Candle>, BarsimError> {
        let attempts = self.policy.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.inner.fetch_candles(symbol, start, end) {
                Err(err) if err.is_transient() => {
                    if attempt >= attempts {
                        return Err(BarsimError::ExchangeUnavailable {
                            attempts,
                            reason: err.to_string(),
                        });
                    }
                    let delay = self.policy.delay(attempt - 1);
                    warn!(
                        symbol,
                        attempt,
                        max_attempts = attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "candle fetch failed, retrying"
                    );
                    (self.sleep)(delay);
                }
                other => return other,
            }
        }
    }
}
