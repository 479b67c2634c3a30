// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Capability interfaces for the two remote services.
//!
//! The matcher, reconciler and sync engine only see these traits; the
//! Garmin and Strava clients are the two concrete implementations.

use crate::error::Result;
use crate::models::{Activity, ActivityUpdate, ServiceKind};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// A service activities can be read from.
#[async_trait]
pub trait ActivitySource: Send + Sync {
    fn service(&self) -> ServiceKind;

    /// Fetch one page (0-indexed) of activities, preferably most recent first.
    ///
    /// Implementations should restrict the query to activities started at or
    /// after `since` when the service supports it; the fetcher filters and
    /// orders again regardless.
    async fn fetch_page(
        &self,
        access_token: &str,
        since: DateTime<Utc>,
        page: u32,
        per_page: u32,
    ) -> Result<Vec<Activity>>;

    /// Overlay the planned workout linked by `activity.workout_id`.
    ///
    /// Sources without workouts return the activity unchanged.
    async fn attach_workout(&self, _access_token: &str, activity: Activity) -> Result<Activity> {
        Ok(activity)
    }
}

/// A service whose activities can also be read in detail and updated.
#[async_trait]
pub trait ActivityDestination: ActivitySource {
    /// Fetch a single activity with all fields populated.
    async fn fetch_activity(&self, access_token: &str, activity_id: &str) -> Result<Activity>;

    /// Write the fields set in `update` to the activity.
    async fn update_activity(
        &self,
        access_token: &str,
        activity_id: &str,
        update: &ActivityUpdate,
    ) -> Result<()>;
}
