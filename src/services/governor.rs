// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Rate/retry governor for outbound service calls.
//!
//! Every remote call goes through [`Governor::call`], which:
//! - Delays the call when it would exceed the service's published quota
//! - Retries rate-limited and transient failures with capped exponential backoff
//! - Refreshes the access token once on an authentication failure
//! - Surfaces fatal failures immediately
//!
//! Waits block only the calling future; the rest of the process keeps running.

use crate::error::{ErrorKind, Result, SyncError};
use crate::models::ServiceKind;
use crate::services::auth::TokenProvider;
use rand::Rng;
use std::collections::VecDeque;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Backoff configuration shared by all governed calls.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of attempts, including the first one.
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Backoff cap for rate-limited calls without an advertised reset.
    pub rate_limit_max_delay: Duration,
    /// Backoff cap for transient (network/5xx) failures.
    pub transient_max_delay: Duration,
    /// Multiplier applied per attempt (2.0 doubles the delay).
    pub backoff_multiplier: f64,
    /// Jitter factor (0.0-1.0) applied symmetrically around the delay.
    pub jitter_factor: f64,
    /// Upper bound on a reset wait advertised by the service.
    pub max_advertised_wait: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_secs(1),
            rate_limit_max_delay: Duration::from_secs(60),
            transient_max_delay: Duration::from_secs(15),
            backoff_multiplier: 2.0,
            jitter_factor: 0.2,
            max_advertised_wait: Duration::from_secs(15 * 60),
        }
    }
}

impl RetryPolicy {
    /// Backoff delay before retry number `attempt + 1` (0-indexed), capped at `cap`.
    pub fn delay_for_attempt(&self, attempt: u32, cap: Duration) -> Duration {
        let base = self.initial_delay.as_secs_f64() * self.backoff_multiplier.powi(attempt as i32);
        let capped = base.min(cap.as_secs_f64());

        let jitter = if self.jitter_factor > 0.0 {
            let offset: f64 = rand::thread_rng().gen_range(-1.0..=1.0);
            capped * self.jitter_factor * offset
        } else {
            0.0
        };

        Duration::from_secs_f64((capped + jitter).clamp(0.0, cap.as_secs_f64()))
    }

    /// How long to wait before retrying `err`, or `None` if it is not retryable.
    pub fn retry_delay(&self, err: &SyncError, attempt: u32) -> Option<Duration> {
        match err {
            SyncError::RateLimited {
                retry_after: Some(wait),
                ..
            } => Some((*wait).min(self.max_advertised_wait)),
            SyncError::RateLimited { .. } => {
                Some(self.delay_for_attempt(attempt, self.rate_limit_max_delay))
            }
            SyncError::Transient(_) => {
                Some(self.delay_for_attempt(attempt, self.transient_max_delay))
            }
            SyncError::AuthExpired(_) | SyncError::Fatal(_) => None,
        }
    }
}

/// A published request quota: at most `max_requests` per rolling `window`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuotaLimit {
    pub max_requests: u32,
    pub window: Duration,
}

impl QuotaLimit {
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            max_requests,
            window,
        }
    }

    /// Strava: 100 requests per 15 minutes, 1000 per day.
    pub fn strava_defaults() -> Vec<QuotaLimit> {
        vec![
            QuotaLimit::new(100, Duration::from_secs(15 * 60)),
            QuotaLimit::new(1000, Duration::from_secs(24 * 60 * 60)),
        ]
    }

    /// Garmin publishes no quota; stay well clear of its throttling.
    pub fn garmin_defaults() -> Vec<QuotaLimit> {
        vec![QuotaLimit::new(60, Duration::from_secs(60))]
    }
}

/// Rolling record of requests sent to one service.
#[derive(Debug)]
struct QuotaTracker {
    limits: Vec<QuotaLimit>,
    sent: VecDeque<Instant>,
}

impl QuotaTracker {
    fn new(limits: Vec<QuotaLimit>) -> Self {
        Self {
            limits,
            sent: VecDeque::new(),
        }
    }

    /// How long a new request must wait to stay within every quota.
    fn admission_delay(&mut self, now: Instant) -> Duration {
        let longest = self
            .limits
            .iter()
            .map(|l| l.window)
            .max()
            .unwrap_or_default();
        while self
            .sent
            .front()
            .is_some_and(|t| now.duration_since(*t) >= longest)
        {
            self.sent.pop_front();
        }

        let mut wait = Duration::ZERO;
        for limit in &self.limits {
            let max = limit.max_requests as usize;
            if max == 0 {
                continue;
            }
            let in_window: Vec<&Instant> = self
                .sent
                .iter()
                .filter(|t| now.duration_since(**t) < limit.window)
                .collect();
            if in_window.len() >= max {
                // The request that must age out before we are under quota again.
                let blocking = in_window[in_window.len() - max];
                let free_at = *blocking + limit.window;
                wait = wait.max(free_at.saturating_duration_since(now));
            }
        }
        wait
    }

    fn record(&mut self, at: Instant) {
        self.sent.push_back(at);
    }
}

/// Lifecycle of one governed call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallState {
    Pending,
    InFlight,
    Success,
    RetryScheduled,
    Failed,
}

/// Classified result of a single attempt.
#[derive(Debug)]
pub enum CallOutcome<T> {
    Success(T),
    Retry { kind: ErrorKind, delay: Duration },
    Failed(SyncError),
}

/// Per-service governor: quota admission, backoff and token refresh.
pub struct Governor {
    service: ServiceKind,
    policy: RetryPolicy,
    tokens: Arc<dyn TokenProvider>,
    quota: Mutex<QuotaTracker>,
}

impl Governor {
    pub fn new(
        service: ServiceKind,
        policy: RetryPolicy,
        quotas: Vec<QuotaLimit>,
        tokens: Arc<dyn TokenProvider>,
    ) -> Self {
        Self {
            service,
            policy,
            tokens,
            quota: Mutex::new(QuotaTracker::new(quotas)),
        }
    }

    pub fn service(&self) -> ServiceKind {
        self.service
    }

    /// Run `op` with a valid access token until it succeeds or fails for good.
    ///
    /// An `AuthExpired` failure triggers exactly one token refresh and one
    /// immediate retry; a second `AuthExpired` is returned to the caller.
    pub async fn call<T, F, Fut>(&self, operation: &str, mut op: F) -> Result<T>
    where
        F: FnMut(String) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut token = self.tokens.access_token().await?;
        let mut refreshed = false;
        let mut attempt: u32 = 0;
        let mut state = CallState::Pending;

        loop {
            self.admit(operation).await;
            state = self.transition(operation, state, CallState::InFlight);

            let result = op(token.clone()).await;

            match self.classify(result, attempt) {
                CallOutcome::Success(value) => {
                    self.transition(operation, state, CallState::Success);
                    return Ok(value);
                }
                CallOutcome::Retry { kind, delay } => {
                    state = self.transition(operation, state, CallState::RetryScheduled);
                    tracing::warn!(
                        service = %self.service,
                        operation,
                        attempt = attempt + 1,
                        error_kind = %kind,
                        delay_ms = delay.as_millis() as u64,
                        "Retrying after backoff"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                    state = self.transition(operation, state, CallState::Pending);
                }
                CallOutcome::Failed(SyncError::AuthExpired(msg)) if !refreshed => {
                    tracing::info!(
                        service = %self.service,
                        operation,
                        error = %msg,
                        "Access token rejected, refreshing"
                    );
                    refreshed = true;
                    token = self.tokens.refresh().await?;
                    state = self.transition(operation, state, CallState::Pending);
                }
                CallOutcome::Failed(err) => {
                    self.transition(operation, state, CallState::Failed);
                    tracing::warn!(
                        service = %self.service,
                        operation,
                        attempts = attempt + 1,
                        error_kind = %err.kind(),
                        error = %err,
                        "Call failed"
                    );
                    return Err(err);
                }
            }
        }
    }

    /// Classify one attempt's result against the retry budget.
    pub fn classify<T>(&self, result: Result<T>, attempt: u32) -> CallOutcome<T> {
        match result {
            Ok(value) => CallOutcome::Success(value),
            Err(err) if !err.is_retryable() || attempt + 1 >= self.policy.max_attempts => {
                CallOutcome::Failed(err)
            }
            Err(err) => match self.policy.retry_delay(&err, attempt) {
                Some(delay) => CallOutcome::Retry {
                    kind: err.kind(),
                    delay,
                },
                None => CallOutcome::Failed(err),
            },
        }
    }

    /// Wait until the quota admits another request, then record it.
    async fn admit(&self, operation: &str) {
        loop {
            let wait = {
                let mut quota = self.quota.lock().await;
                let now = Instant::now();
                let wait = quota.admission_delay(now);
                if wait.is_zero() {
                    quota.record(now);
                    return;
                }
                wait
            };
            tracing::info!(
                service = %self.service,
                operation,
                delay_ms = wait.as_millis() as u64,
                "Delaying call to stay within quota"
            );
            tokio::time::sleep(wait).await;
        }
    }

    fn transition(&self, operation: &str, from: CallState, to: CallState) -> CallState {
        tracing::trace!(service = %self.service, operation, ?from, ?to, "Call state");
        to
    }
}
