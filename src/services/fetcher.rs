// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Bounded, paginated activity fetching.

use crate::error::Result;
use crate::models::Activity;
use crate::services::activity::ActivitySource;
use crate::services::governor::Governor;
use chrono::{DateTime, Utc};
use std::collections::HashSet;

/// Default page size for list endpoints.
pub const DEFAULT_PAGE_SIZE: u32 = 50;

/// Hard stop on pagination, whatever the services report.
const MAX_PAGES: u32 = 100;

/// Fetches a window of recent activities from any [`ActivitySource`].
#[derive(Debug, Clone)]
pub struct Fetcher {
    per_page: u32,
}

impl Default for Fetcher {
    fn default() -> Self {
        Self::new(DEFAULT_PAGE_SIZE)
    }
}

impl Fetcher {
    pub fn new(per_page: u32) -> Self {
        Self {
            per_page: per_page.max(1),
        }
    }

    /// Fetch up to `limit` activities started at or after `since`, most recent first.
    ///
    /// Each page goes through the governor. Paging stops at a short page. While
    /// every page so far has arrived most recent first, it also stops at a page
    /// with nothing new inside the window or once `limit` activities are in
    /// hand. A source that pages oldest first is read to its end so the newest
    /// activities are never cut off. Fetching the same window twice issues the
    /// same requests.
    ///
    /// Activities linked to a planned workout then have it attached, one
    /// governed call each, after the limit is applied.
    pub async fn fetch<S: ActivitySource + ?Sized>(
        &self,
        source: &S,
        governor: &Governor,
        since: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Activity>> {
        let per_page = self.per_page;
        let mut seen = HashSet::new();
        let mut activities: Vec<Activity> = Vec::new();
        let mut newest_first = true;
        let mut last_start = None;
        let mut page = 0;

        while page < MAX_PAGES {
            let batch = governor
                .call("fetch_activities", move |token| async move {
                    source.fetch_page(&token, since, page, per_page).await
                })
                .await?;

            let received = batch.len();
            let mut kept = 0;
            for activity in batch {
                if let Some(previous) = last_start {
                    newest_first &= activity.start <= previous;
                }
                last_start = Some(activity.start);
                // Pages can shift between requests when new activities arrive.
                if activity.start >= since && seen.insert(activity.id.clone()) {
                    activities.push(activity);
                    kept += 1;
                }
            }

            tracing::debug!(
                service = %source.service(),
                page,
                received,
                kept,
                newest_first,
                "Fetched activity page"
            );

            if received < per_page as usize {
                break;
            }
            // Newest first: everything past this point is older still.
            if newest_first && (kept == 0 || activities.len() >= limit) {
                break;
            }
            page += 1;
        }

        activities.sort_by(|a, b| b.start.cmp(&a.start).then_with(|| a.id.cmp(&b.id)));
        activities.truncate(limit);

        let mut fetched = Vec::with_capacity(activities.len());
        for activity in activities {
            fetched.push(self.attach_workout(source, governor, activity).await);
        }

        tracing::info!(
            service = %source.service(),
            count = fetched.len(),
            since = %crate::time_utils::format_utc_rfc3339(since),
            "Fetched activities"
        );
        Ok(fetched)
    }

    /// Attach the linked workout, keeping the activity as is if the lookup fails.
    async fn attach_workout<S: ActivitySource + ?Sized>(
        &self,
        source: &S,
        governor: &Governor,
        activity: Activity,
    ) -> Activity {
        if activity.workout_id.is_none() {
            return activity;
        }

        let result = governor
            .call("fetch_workout", |token| {
                let activity = activity.clone();
                async move { source.attach_workout(&token, activity).await }
            })
            .await;

        match result {
            Ok(enriched) => enriched,
            Err(e) => {
                tracing::warn!(
                    service = %source.service(),
                    activity_id = %activity.id,
                    workout_id = activity.workout_id.as_deref().unwrap_or_default(),
                    error_kind = %e.kind(),
                    error = %e,
                    "Workout lookup failed, keeping activity's own fields"
                );
                activity
            }
        }
    }
}
