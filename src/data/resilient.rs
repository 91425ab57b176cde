//! Retry and rate-limit circuit around any supplier.
//!
//! Transport failures and 5xx responses are retried with exponential
//! backoff. A rate-limit response is not retried: it opens the circuit, and
//! every call fails fast with `CircuitOpen` until the cooldown elapses.

use async_trait::async_trait;
use chrono::NaiveDate;
use std::future::Future;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use super::{
    FixtureRecord, FixtureSupplier, MatchResultOdds, OddsSupplier, SupplierError, SupplierResult,
};
use crate::config::SupplierConfig;
use crate::types::{BookmakerQuote, LeagueProfile, Match};

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_backoff: Duration,
    pub cooldown: Duration,
}

impl From<&SupplierConfig> for RetryPolicy {
    fn from(c: &SupplierConfig) -> Self {
        Self {
            max_retries: c.max_retries,
            base_backoff: Duration::from_millis(c.base_backoff_ms),
            cooldown: Duration::from_secs(c.rate_limit_cooldown_secs),
        }
    }
}

pub struct Resilient<S> {
    inner: S,
    policy: RetryPolicy,
    /// Set while the circuit is open.
    open_until: Mutex<Option<Instant>>,
}

impl<S> Resilient<S> {
    pub fn new(inner: S, policy: RetryPolicy) -> Self {
        Self {
            inner,
            policy,
            open_until: Mutex::new(None),
        }
    }

    fn check_circuit(&self) -> SupplierResult<()> {
        let mut guard = self
            .open_until
            .lock()
            .map_err(|_| SupplierError::Transport("circuit state poisoned".to_string()))?;
        if let Some(until) = *guard {
            let now = Instant::now();
            if now < until {
                return Err(SupplierError::CircuitOpen {
                    remaining_secs: (until - now).as_secs().max(1),
                });
            }
            *guard = None;
            debug!("Supplier circuit closed");
        }
        Ok(())
    }

    fn open_circuit(&self) {
        if let Ok(mut guard) = self.open_until.lock() {
            *guard = Some(Instant::now() + self.policy.cooldown);
        }
    }

    async fn call<'a, T, F, Fut>(&'a self, op: &str, f: F) -> SupplierResult<T>
    where
        F: Fn(&'a S) -> Fut + Send + Sync,
        Fut: Future<Output = SupplierResult<T>> + Send,
        T: Send,
    {
        self.check_circuit()?;

        let mut attempt = 0;
        loop {
            if attempt > 0 {
                let delay = self.policy.base_backoff * 2u32.pow(attempt - 1);
                debug!(op, attempt, delay_ms = delay.as_millis() as u64, "Retrying supplier call");
                tokio::time::sleep(delay).await;
            }

            match f(&self.inner).await {
                Ok(v) => return Ok(v),
                Err(SupplierError::RateLimited(msg)) => {
                    warn!(
                        op,
                        cooldown_secs = self.policy.cooldown.as_secs(),
                        "Supplier rate limit hit, opening circuit"
                    );
                    self.open_circuit();
                    return Err(SupplierError::RateLimited(msg));
                }
                Err(e) if e.is_retryable() && attempt < self.policy.max_retries => {
                    warn!(op, attempt, error = %e, "Retryable supplier error");
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[async_trait]
impl<S: FixtureSupplier> FixtureSupplier for Resilient<S> {
    async fn fixtures(
        &self,
        league: &LeagueProfile,
        from: NaiveDate,
        to: NaiveDate,
    ) -> SupplierResult<Vec<FixtureRecord>> {
        self.call("fixtures", |s| s.fixtures(league, from, to)).await
    }
}

#[async_trait]
impl<S: OddsSupplier> OddsSupplier for Resilient<S> {
    async fn first_half_quotes(&self, m: &Match) -> SupplierResult<Vec<BookmakerQuote>> {
        self.call("first_half_quotes", |s| s.first_half_quotes(m)).await
    }

    async fn match_result_odds(&self, m: &Match) -> SupplierResult<Option<MatchResultOdds>> {
        self.call("match_result_odds", |s| s.match_result_odds(m)).await
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
