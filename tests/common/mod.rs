// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! In-memory fakes for both services, the token provider and the cursor store.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Duration, Timelike, Utc};
use garmin_strava_sync::db::{CursorError, CursorStore};
use garmin_strava_sync::error::{Result, SyncError};
use garmin_strava_sync::models::{Activity, ActivityUpdate, ServiceKind, SyncCursor};
use garmin_strava_sync::services::{
    ActivityDestination, ActivitySource, Endpoint, Governor, Matcher, Reconciler, RetryPolicy,
    SyncEngine, SyncSettings, TokenProvider,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

/// A recent, whole-second timestamp `hours_ago` hours in the past.
pub fn hours_ago(hours: i64) -> DateTime<Utc> {
    (Utc::now() - Duration::hours(hours))
        .with_nanosecond(0)
        .unwrap()
}

/// Build a run with the given identity and timing.
pub fn activity(id: &str, start: DateTime<Utc>, duration_secs: u64, title: &str) -> Activity {
    Activity {
        id: id.to_string(),
        start,
        duration_secs,
        distance_meters: None,
        title: title.to_string(),
        description: None,
        activity_type: "run".to_string(),
        workout_id: None,
    }
}

pub fn with_description(mut activity: Activity, description: &str) -> Activity {
    activity.description = Some(description.to_string());
    activity
}

/// Fake source service serving a fixed activity list.
#[derive(Default)]
pub struct FakeSource {
    activities: Vec<Activity>,
    oldest_first: bool,
    list_calls: AtomicU32,
    list_failure: Mutex<Option<SyncError>>,
}

impl FakeSource {
    pub fn new(activities: Vec<Activity>) -> Self {
        Self {
            activities,
            ..Self::default()
        }
    }

    /// A source whose pages run oldest to newest.
    pub fn oldest_first(activities: Vec<Activity>) -> Self {
        Self {
            activities,
            oldest_first: true,
            ..Self::default()
        }
    }

    pub fn fail_listing(&self, err: SyncError) {
        *self.list_failure.lock().unwrap() = Some(err);
    }

    pub fn list_calls(&self) -> u32 {
        self.list_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ActivitySource for FakeSource {
    fn service(&self) -> ServiceKind {
        ServiceKind::Garmin
    }

    async fn fetch_page(
        &self,
        _access_token: &str,
        _since: DateTime<Utc>,
        page: u32,
        per_page: u32,
    ) -> Result<Vec<Activity>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.list_failure.lock().unwrap().clone() {
            return Err(err);
        }
        Ok(paginate(
            self.activities.clone(),
            self.oldest_first,
            page,
            per_page,
        ))
    }
}

/// Fake destination service. Updates are applied to its stored activities.
#[derive(Default)]
pub struct FakeDestination {
    activities: Mutex<Vec<Activity>>,
    list_calls: AtomicU32,
    list_failure: Mutex<Option<SyncError>>,
    /// Scripted update failures: the error and how many more times to return it
    update_failures: Mutex<HashMap<String, (SyncError, Option<u32>)>>,
    update_attempts: Mutex<Vec<String>>,
    updates: Mutex<Vec<(String, ActivityUpdate)>>,
}

impl FakeDestination {
    pub fn new(activities: Vec<Activity>) -> Self {
        Self {
            activities: Mutex::new(activities),
            ..Self::default()
        }
    }

    pub fn fail_listing(&self, err: SyncError) {
        *self.list_failure.lock().unwrap() = Some(err);
    }

    /// Every update of `activity_id` fails with `err`.
    pub fn fail_updates_of(&self, activity_id: &str, err: SyncError) {
        self.update_failures
            .lock()
            .unwrap()
            .insert(activity_id.to_string(), (err, None));
    }

    /// The next `times` updates of `activity_id` fail with `err`, later ones succeed.
    pub fn fail_updates_of_times(&self, activity_id: &str, err: SyncError, times: u32) {
        self.update_failures
            .lock()
            .unwrap()
            .insert(activity_id.to_string(), (err, Some(times)));
    }

    pub fn list_calls(&self) -> u32 {
        self.list_calls.load(Ordering::SeqCst)
    }

    /// Activity IDs of every update request, successful or not.
    pub fn update_attempts(&self) -> Vec<String> {
        self.update_attempts.lock().unwrap().clone()
    }

    /// Successful updates, in order.
    pub fn updates(&self) -> Vec<(String, ActivityUpdate)> {
        self.updates.lock().unwrap().clone()
    }

    pub fn get(&self, activity_id: &str) -> Option<Activity> {
        self.activities
            .lock()
            .unwrap()
            .iter()
            .find(|a| a.id == activity_id)
            .cloned()
    }
}

#[async_trait]
impl ActivitySource for FakeDestination {
    fn service(&self) -> ServiceKind {
        ServiceKind::Strava
    }

    async fn fetch_page(
        &self,
        _access_token: &str,
        _since: DateTime<Utc>,
        page: u32,
        per_page: u32,
    ) -> Result<Vec<Activity>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.list_failure.lock().unwrap().clone() {
            return Err(err);
        }
        // Like Strava, summaries carry no description.
        let summaries = self
            .activities
            .lock()
            .unwrap()
            .iter()
            .cloned()
            .map(|mut a| {
                a.description = None;
                a
            })
            .collect();
        Ok(paginate(summaries, false, page, per_page))
    }
}

#[async_trait]
impl ActivityDestination for FakeDestination {
    async fn fetch_activity(&self, _access_token: &str, activity_id: &str) -> Result<Activity> {
        self.get(activity_id)
            .ok_or_else(|| SyncError::Fatal(format!("HTTP 404: activity {}", activity_id)))
    }

    async fn update_activity(
        &self,
        _access_token: &str,
        activity_id: &str,
        update: &ActivityUpdate,
    ) -> Result<()> {
        self.update_attempts
            .lock()
            .unwrap()
            .push(activity_id.to_string());
        if let Some((err, remaining)) = self.update_failures.lock().unwrap().get_mut(activity_id) {
            match remaining {
                None => return Err(err.clone()),
                Some(n) if *n > 0 => {
                    *n -= 1;
                    return Err(err.clone());
                }
                Some(_) => {}
            }
        }

        let mut activities = self.activities.lock().unwrap();
        let activity = activities
            .iter_mut()
            .find(|a| a.id == activity_id)
            .ok_or_else(|| SyncError::Fatal(format!("HTTP 404: activity {}", activity_id)))?;
        if let Some(title) = &update.title {
            activity.title = title.clone();
        }
        if let Some(description) = &update.description {
            activity.description = Some(description.clone());
        }
        self.updates
            .lock()
            .unwrap()
            .push((activity_id.to_string(), update.clone()));
        Ok(())
    }
}

fn paginate(
    mut activities: Vec<Activity>,
    oldest_first: bool,
    page: u32,
    per_page: u32,
) -> Vec<Activity> {
    activities.sort_by(|a, b| b.start.cmp(&a.start));
    if oldest_first {
        activities.reverse();
    }
    activities
        .into_iter()
        .skip((page * per_page) as usize)
        .take(per_page as usize)
        .collect()
}

/// Token provider handing out `token-N`, where N counts refreshes.
#[derive(Default)]
pub struct StaticTokenProvider {
    refreshes: AtomicU32,
}

impl StaticTokenProvider {
    pub fn refreshes(&self) -> u32 {
        self.refreshes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TokenProvider for StaticTokenProvider {
    async fn access_token(&self) -> Result<String> {
        Ok(format!("token-{}", self.refreshes() + 1))
    }

    async fn refresh(&self) -> Result<String> {
        let n = self.refreshes.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(format!("token-{}", n + 1))
    }
}

/// Cursor store kept in memory, shared between clones.
#[derive(Clone, Default)]
pub struct MemoryCursorStore {
    cursor: Arc<Mutex<SyncCursor>>,
    saves: Arc<AtomicU32>,
}

impl MemoryCursorStore {
    pub fn cursor(&self) -> SyncCursor {
        self.cursor.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        *self.cursor.lock().unwrap() = SyncCursor::default();
    }

    pub fn saves(&self) -> u32 {
        self.saves.load(Ordering::SeqCst)
    }
}

impl CursorStore for MemoryCursorStore {
    fn load(&self) -> std::result::Result<SyncCursor, CursorError> {
        Ok(self.cursor())
    }

    fn save(&self, cursor: &SyncCursor) -> std::result::Result<(), CursorError> {
        *self.cursor.lock().unwrap() = cursor.clone();
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Retry policy with millisecond delays and no jitter.
pub fn fast_policy() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 3,
        initial_delay: std::time::Duration::from_millis(1),
        jitter_factor: 0.0,
        ..RetryPolicy::default()
    }
}

pub fn governor(service: ServiceKind, tokens: Arc<StaticTokenProvider>) -> Governor {
    Governor::new(service, fast_policy(), Vec::new(), tokens)
}

/// Wiring for a sync engine over fakes.
pub struct Harness {
    pub source: Arc<FakeSource>,
    pub destination: Arc<FakeDestination>,
    pub store: MemoryCursorStore,
    pub destination_tokens: Arc<StaticTokenProvider>,
}

impl Harness {
    pub fn new(sources: Vec<Activity>, destinations: Vec<Activity>) -> Self {
        Self {
            source: Arc::new(FakeSource::new(sources)),
            destination: Arc::new(FakeDestination::new(destinations)),
            store: MemoryCursorStore::default(),
            destination_tokens: Arc::new(StaticTokenProvider::default()),
        }
    }

    pub fn engine(&self, dry_run: bool) -> SyncEngine {
        let settings = SyncSettings {
            dry_run,
            ..SyncSettings::default()
        };
        let source: Arc<dyn ActivitySource> = self.source.clone();
        let destination: Arc<dyn ActivityDestination> = self.destination.clone();

        SyncEngine::new(
            settings,
            Endpoint::new(
                source,
                governor(ServiceKind::Garmin, Arc::new(StaticTokenProvider::default())),
            ),
            Endpoint::new(
                destination,
                governor(ServiceKind::Strava, self.destination_tokens.clone()),
            ),
            Matcher::default(),
            Reconciler::new(Default::default(), dry_run),
            Box::new(self.store.clone()),
        )
    }
}
