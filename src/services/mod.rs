// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Services module - remote clients and sync logic.

pub mod activity;
pub mod auth;
pub mod fetcher;
pub mod garmin;
pub mod governor;
pub mod matcher;
pub mod reconciler;
pub mod strava;
pub mod sync;

pub use activity::{ActivityDestination, ActivitySource};
pub use auth::{GarminTokenProvider, StravaTokenProvider, TokenProvider};
pub use fetcher::Fetcher;
pub use garmin::GarminClient;
pub use governor::{CallOutcome, CallState, Governor, QuotaLimit, RetryPolicy};
pub use matcher::{MatchConfig, Matcher};
pub use reconciler::{ApplyOutcome, ReconcileConfig, Reconciler};
pub use strava::StravaClient;
pub use sync::{Endpoint, SyncEngine, SyncSettings};
