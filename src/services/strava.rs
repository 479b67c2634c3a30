// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Strava API client for fetching and updating activities.
//!
//! Handles:
//! - Listing recent activities (paginated)
//! - Fetching a detailed activity (list endpoints omit descriptions)
//! - Updating an activity's name and description
//! - Classifying failures, including Strava's 15-minute rate limit window

use crate::error::{Result, SyncError};
use crate::models::{Activity, ActivityUpdate, ServiceKind};
use crate::services::activity::{ActivityDestination, ActivitySource};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::HeaderMap;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const STRAVA_API_BASE: &str = "https://www.strava.com/api/v3";

/// Strava API client.
#[derive(Clone)]
pub struct StravaClient {
    http: reqwest::Client,
    base_url: String,
}

impl Default for StravaClient {
    fn default() -> Self {
        Self::new()
    }
}

impl StravaClient {
    pub fn new() -> Self {
        Self::with_base_url(STRAVA_API_BASE)
    }

    /// Create a client against a different API root (tests).
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Get a detailed activity by ID.
    pub async fn get_activity(
        &self,
        access_token: &str,
        activity_id: &str,
    ) -> Result<StravaActivity> {
        let url = format!("{}/activities/{}", self.base_url, activity_id);
        let response = self
            .http
            .get(&url)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| SyncError::from_transport(&e))?;

        check_response_json(response).await
    }

    /// List the athlete's activities (1-indexed pages).
    ///
    /// Without `after` Strava returns the most recent first. With an `after`
    /// Unix timestamp it returns only later activities, oldest first.
    pub async fn list_activities(
        &self,
        access_token: &str,
        after: Option<i64>,
        page: u32,
        per_page: u32,
    ) -> Result<Vec<StravaActivity>> {
        let url = format!("{}/athlete/activities", self.base_url);

        let mut query = vec![
            ("page", page.to_string()),
            ("per_page", per_page.to_string()),
        ];
        if let Some(after) = after {
            query.push(("after", after.to_string()));
        }

        let response = self
            .http
            .get(&url)
            .bearer_auth(access_token)
            .query(&query)
            .send()
            .await
            .map_err(|e| SyncError::from_transport(&e))?;

        check_response_json(response).await
    }

    /// Update an activity's name and/or description.
    pub async fn update_activity(
        &self,
        access_token: &str,
        activity_id: &str,
        update: &ActivityUpdate,
    ) -> Result<()> {
        let url = format!("{}/activities/{}", self.base_url, activity_id);

        let body = UpdatableActivity {
            name: update.title.as_deref(),
            description: update.description.as_deref(),
        };

        let response = self
            .http
            .put(&url)
            .bearer_auth(access_token)
            .json(&body)
            .send()
            .await
            .map_err(|e| SyncError::from_transport(&e))?;

        check_response(response).await?;
        Ok(())
    }
}

#[async_trait]
impl ActivitySource for StravaClient {
    fn service(&self) -> ServiceKind {
        ServiceKind::Strava
    }

    async fn fetch_page(
        &self,
        access_token: &str,
        _since: DateTime<Utc>,
        page: u32,
        per_page: u32,
    ) -> Result<Vec<Activity>> {
        // Newest first; the fetcher stops at the first page older than the window.
        let summaries = self
            .list_activities(access_token, None, page + 1, per_page)
            .await?;
        summaries.into_iter().map(Activity::try_from).collect()
    }
}

#[async_trait]
impl ActivityDestination for StravaClient {
    async fn fetch_activity(&self, access_token: &str, activity_id: &str) -> Result<Activity> {
        self.get_activity(access_token, activity_id)
            .await
            .and_then(Activity::try_from)
    }

    async fn update_activity(
        &self,
        access_token: &str,
        activity_id: &str,
        update: &ActivityUpdate,
    ) -> Result<()> {
        StravaClient::update_activity(self, access_token, activity_id, update).await
    }
}

/// Check response status and return error if not successful.
async fn check_response(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let retry_after = if status.as_u16() == 429 {
        let wait = advertised_wait(response.headers(), Utc::now());
        tracing::warn!(wait_secs = ?wait.map(|w| w.as_secs()), "Strava rate limit hit (429)");
        wait
    } else {
        None
    };

    let body = response.text().await.unwrap_or_default();
    Err(SyncError::from_status(status.as_u16(), body, retry_after))
}

/// Check response and parse JSON body.
async fn check_response_json<T: for<'de> Deserialize<'de>>(
    response: reqwest::Response,
) -> Result<T> {
    check_response(response)
        .await?
        .json()
        .await
        .map_err(|e| SyncError::Fatal(format!("JSON parse error: {}", e)))
}

/// Wait advertised by a 429 response.
///
/// `Retry-After` wins when present. Otherwise, if the usage headers show the
/// 15-minute quota is spent, wait for the next quarter-hour reset. A spent
/// daily quota advertises nothing useful and falls back to backoff.
pub fn advertised_wait(headers: &HeaderMap, now: DateTime<Utc>) -> Option<Duration> {
    if let Some(secs) = header_str(headers, "retry-after").and_then(|v| v.parse::<u64>().ok()) {
        return Some(Duration::from_secs(secs));
    }

    let limits = parse_pair(header_str(headers, "x-ratelimit-limit")?)?;
    let usage = parse_pair(header_str(headers, "x-ratelimit-usage")?)?;
    if usage.0 >= limits.0 {
        return Some(crate::time_utils::until_next_quarter_hour(now));
    }
    None
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// Parse Strava's `"short,daily"` header format.
fn parse_pair(value: &str) -> Option<(u64, u64)> {
    let (short, daily) = value.split_once(',')?;
    Some((short.trim().parse().ok()?, daily.trim().parse().ok()?))
}

/// Request body for `PUT /activities/{id}`.
#[derive(Debug, Serialize)]
struct UpdatableActivity<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<&'a str>,
}

/// Strava activity (summary or detailed representation).
#[derive(Debug, Clone, Deserialize)]
pub struct StravaActivity {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub sport_type: Option<String>,
    #[serde(default, rename = "type")]
    pub activity_type: Option<String>,
    pub start_date: String,
    #[serde(default)]
    pub elapsed_time: u64,
    #[serde(default)]
    pub distance: f64,
    /// Only present on the detailed representation
    #[serde(default)]
    pub description: Option<String>,
}

impl TryFrom<StravaActivity> for Activity {
    type Error = SyncError;

    fn try_from(a: StravaActivity) -> Result<Self> {
        let start = DateTime::parse_from_rfc3339(&a.start_date)
            .map_err(|e| {
                SyncError::Fatal(format!(
                    "Invalid Strava start_date for activity {}: {}",
                    a.id, e
                ))
            })?
            .with_timezone(&Utc);

        let sport = a
            .sport_type
            .as_deref()
            .or(a.activity_type.as_deref())
            .unwrap_or("");

        Ok(Activity {
            id: a.id.to_string(),
            start,
            duration_secs: a.elapsed_time,
            distance_meters: Some(a.distance).filter(|d| *d > 0.0),
            title: a.name,
            description: a.description,
            activity_type: normalize_sport_type(sport),
            workout_id: None,
        })
    }
}

/// Map a Strava sport type onto the shared lowercase vocabulary.
pub fn normalize_sport_type(sport_type: &str) -> String {
    let normalized = match sport_type {
        "Run" | "TrailRun" | "VirtualRun" => "run",
        "Ride" | "MountainBikeRide" | "GravelRide" | "EBikeRide" | "EMountainBikeRide"
        | "VirtualRide" => "ride",
        "Swim" => "swim",
        "Walk" => "walk",
        "Hike" => "hike",
        "Workout" | "WeightTraining" | "Crossfit" | "HighIntensityIntervalTraining" => "workout",
        other => return other.to_ascii_lowercase(),
    };
    normalized.to_string()
}
