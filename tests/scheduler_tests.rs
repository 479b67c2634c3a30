// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Scheduler loop over a fake engine, on a paused clock.

mod common;

use common::{activity, hours_ago, Harness};
use garmin_strava_sync::config::RunMode;
use garmin_strava_sync::error::SyncError;
use garmin_strava_sync::scheduler::Scheduler;
use std::time::Duration;

fn one_pair() -> Harness {
    let t = hours_ago(2);
    Harness::new(
        vec![activity("s1", t, 1800, "Track Session")],
        vec![activity("d1", t, 1800, "Untitled")],
    )
}

#[tokio::test(start_paused = true)]
async fn test_loop_resumes_after_aborted_cycles() {
    let harness = one_pair();
    harness
        .destination
        .fail_listing(SyncError::Fatal("HTTP 400: bad request".to_string()));
    let scheduler = Scheduler::new(
        harness.engine(false),
        RunMode::Scheduler,
        Duration::from_secs(60),
        None,
    );

    scheduler
        .run(tokio::time::sleep(Duration::from_secs(60 * 4 + 30)))
        .await;

    // Ticks at 0, 1, 2, 3 and 4 minutes, every cycle aborting at the fetch.
    assert_eq!(harness.destination.list_calls(), 5);
    assert_eq!(harness.source.list_calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_once_mode_runs_single_cycle() {
    let harness = one_pair();
    let scheduler = Scheduler::new(
        harness.engine(false),
        RunMode::Once,
        Duration::from_secs(60),
        None,
    );

    scheduler.run(std::future::pending()).await;

    assert_eq!(harness.destination.list_calls(), 1);
    assert_eq!(harness.destination.get("d1").unwrap().title, "Track Session");
}
