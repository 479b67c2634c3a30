// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Governor retry, refresh and quota behavior, on a paused clock.

mod common;

use common::StaticTokenProvider;
use garmin_strava_sync::error::{ErrorKind, Result, SyncError};
use garmin_strava_sync::models::ServiceKind;
use garmin_strava_sync::services::{Governor, QuotaLimit, RetryPolicy};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

fn no_jitter() -> RetryPolicy {
    RetryPolicy {
        jitter_factor: 0.0,
        ..RetryPolicy::default()
    }
}

fn governor_with(policy: RetryPolicy, quotas: Vec<QuotaLimit>) -> (Governor, Arc<StaticTokenProvider>) {
    let tokens = Arc::new(StaticTokenProvider::default());
    let governor = Governor::new(ServiceKind::Strava, policy, quotas, tokens.clone());
    (governor, tokens)
}

/// Run a call whose attempts return the scripted results in order.
async fn scripted(governor: &Governor, script: Vec<Result<u32>>) -> (Result<u32>, u32) {
    let calls = AtomicU32::new(0);
    let script = Mutex::new(VecDeque::from(script));
    let calls_ref = &calls;
    let script_ref = &script;

    let result = governor
        .call("test_op", move |_token| async move {
            calls_ref.fetch_add(1, Ordering::SeqCst);
            script_ref
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(SyncError::Fatal("script exhausted".to_string())))
        })
        .await;
    (result, calls.load(Ordering::SeqCst))
}

#[tokio::test(start_paused = true)]
async fn test_rate_limited_then_success() {
    let (governor, _) = governor_with(no_jitter(), Vec::new());

    let (result, calls) = scripted(
        &governor,
        vec![Err(SyncError::rate_limited("HTTP 429")), Ok(7)],
    )
    .await;

    assert_eq!(result.unwrap(), 7);
    assert_eq!(calls, 2);
}

#[tokio::test(start_paused = true)]
async fn test_advertised_wait_is_honored() {
    let (governor, _) = governor_with(no_jitter(), Vec::new());
    let started = Instant::now();

    let (result, calls) = scripted(
        &governor,
        vec![
            Err(SyncError::RateLimited {
                message: "HTTP 429".to_string(),
                retry_after: Some(Duration::from_secs(120)),
            }),
            Ok(1),
        ],
    )
    .await;

    assert!(result.is_ok());
    assert_eq!(calls, 2);
    assert!(started.elapsed() >= Duration::from_secs(120));
}

#[tokio::test(start_paused = true)]
async fn test_fatal_is_not_retried() {
    let (governor, _) = governor_with(no_jitter(), Vec::new());

    let (result, calls) = scripted(
        &governor,
        vec![Err(SyncError::Fatal("HTTP 404".to_string())), Ok(1)],
    )
    .await;

    assert_eq!(result.unwrap_err().kind(), ErrorKind::Fatal);
    assert_eq!(calls, 1);
}

#[tokio::test(start_paused = true)]
async fn test_transient_exhausts_attempts() {
    let policy = no_jitter();
    let max_attempts = policy.max_attempts;
    let (governor, _) = governor_with(policy, Vec::new());

    let script = (0..10)
        .map(|_| Err(SyncError::Transient("HTTP 503".to_string())))
        .collect();
    let (result, calls) = scripted(&governor, script).await;

    assert_eq!(result.unwrap_err().kind(), ErrorKind::Transient);
    assert_eq!(calls, max_attempts);
}

#[tokio::test(start_paused = true)]
async fn test_auth_expired_refreshes_once() {
    let (governor, tokens) = governor_with(no_jitter(), Vec::new());
    let seen = Mutex::new(Vec::new());
    let seen_ref = &seen;

    let result = governor
        .call("test_op", move |token| async move {
            seen_ref.lock().unwrap().push(token.clone());
            if token == "token-1" {
                Err(SyncError::AuthExpired("HTTP 401".to_string()))
            } else {
                Ok(())
            }
        })
        .await;

    assert!(result.is_ok());
    assert_eq!(tokens.refreshes(), 1);
    assert_eq!(*seen.lock().unwrap(), vec!["token-1", "token-2"]);
}

#[tokio::test(start_paused = true)]
async fn test_second_auth_failure_surfaces() {
    let (governor, tokens) = governor_with(no_jitter(), Vec::new());

    let script = (0..5)
        .map(|_| Err(SyncError::AuthExpired("HTTP 401".to_string())))
        .collect();
    let (result, calls) = scripted(&governor, script).await;

    assert_eq!(result.unwrap_err().kind(), ErrorKind::AuthExpired);
    assert_eq!(calls, 2);
    assert_eq!(tokens.refreshes(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_quota_delays_excess_calls() {
    let (governor, _) = governor_with(
        no_jitter(),
        vec![QuotaLimit::new(2, Duration::from_secs(60))],
    );
    let started = Instant::now();

    for _ in 0..2 {
        let (result, _) = scripted(&governor, vec![Ok(1)]).await;
        assert!(result.is_ok());
    }
    assert!(started.elapsed() < Duration::from_secs(1));

    let (result, _) = scripted(&governor, vec![Ok(1)]).await;
    assert!(result.is_ok());
    assert!(started.elapsed() >= Duration::from_secs(60));
}
