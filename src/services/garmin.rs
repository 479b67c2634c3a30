// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Garmin Connect client: the source of truth for titles and descriptions.
//!
//! Activities come from the activity search endpoint, paginated by offset.
//! When an activity was recorded against a planned workout, the workout's
//! name and description take precedence over the activity's own. The
//! workout is looked up separately through [`ActivitySource::attach_workout`]
//! so each lookup is governed like any other call.

use crate::error::{Result, SyncError};
use crate::models::{Activity, ServiceKind};
use crate::services::activity::ActivitySource;
use crate::time_utils::parse_garmin_gmt;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;

const GARMIN_API_BASE: &str = "https://connectapi.garmin.com";

/// User agent of the Garmin Connect mobile app; the API rejects unknown clients.
const GARMIN_USER_AGENT: &str = "GCM-iOS-5.7.2.1";

/// Garmin Connect API client.
#[derive(Clone)]
pub struct GarminClient {
    http: reqwest::Client,
    base_url: String,
}

impl Default for GarminClient {
    fn default() -> Self {
        Self::new()
    }
}

impl GarminClient {
    pub fn new() -> Self {
        Self::with_base_url(GARMIN_API_BASE)
    }

    /// Create a client against a different API root (tests).
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Search activities starting on or after `since`, by offset.
    pub async fn search_activities(
        &self,
        access_token: &str,
        since: DateTime<Utc>,
        start: u32,
        limit: u32,
    ) -> Result<Vec<GarminActivity>> {
        let url = format!(
            "{}/activitylist-service/activities/search/activities",
            self.base_url
        );
        let response = self
            .http
            .get(&url)
            .bearer_auth(access_token)
            .header(reqwest::header::USER_AGENT, GARMIN_USER_AGENT)
            .query(&[
                ("startDate", since.format("%Y-%m-%d").to_string()),
                ("start", start.to_string()),
                ("limit", limit.to_string()),
            ])
            .send()
            .await
            .map_err(|e| SyncError::from_transport(&e))?;

        check_response_json(response).await
    }

    /// Get a planned workout by ID.
    pub async fn get_workout(&self, access_token: &str, workout_id: u64) -> Result<GarminWorkout> {
        let url = format!("{}/workout-service/workout/{}", self.base_url, workout_id);
        let response = self
            .http
            .get(&url)
            .bearer_auth(access_token)
            .header(reqwest::header::USER_AGENT, GARMIN_USER_AGENT)
            .send()
            .await
            .map_err(|e| SyncError::from_transport(&e))?;

        check_response_json(response).await
    }
}

#[async_trait]
impl ActivitySource for GarminClient {
    fn service(&self) -> ServiceKind {
        ServiceKind::Garmin
    }

    async fn fetch_page(
        &self,
        access_token: &str,
        since: DateTime<Utc>,
        page: u32,
        per_page: u32,
    ) -> Result<Vec<Activity>> {
        let raw = self
            .search_activities(access_token, since, page * per_page, per_page)
            .await?;

        let mut activities = Vec::with_capacity(raw.len());
        for garmin in raw {
            match garmin.into_activity() {
                Some(activity) => activities.push(activity),
                None => tracing::warn!("Skipping Garmin activity with unrecognized start time"),
            }
        }
        Ok(activities)
    }

    async fn attach_workout(&self, access_token: &str, activity: Activity) -> Result<Activity> {
        let Some(raw_id) = activity.workout_id.clone() else {
            return Ok(activity);
        };
        let workout_id: u64 = raw_id
            .parse()
            .map_err(|_| SyncError::Fatal(format!("Invalid Garmin workout id '{}'", raw_id)))?;
        let workout = self.get_workout(access_token, workout_id).await?;
        Ok(workout.overlay(activity))
    }
}

async fn check_response_json<T: for<'de> Deserialize<'de>>(response: reqwest::Response) -> Result<T> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        if status.as_u16() == 429 {
            tracing::warn!("Garmin rate limit hit (429)");
        }
        return Err(SyncError::from_status(status.as_u16(), body, None));
    }

    response
        .json()
        .await
        .map_err(|e| SyncError::Fatal(format!("JSON parse error: {}", e)))
}

/// Activity from the Garmin search endpoint.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GarminActivity {
    pub activity_id: u64,
    #[serde(default)]
    pub activity_name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, rename = "startTimeGMT")]
    pub start_time_gmt: Option<String>,
    /// Moving/timer seconds, excluding pauses
    #[serde(default)]
    pub duration: Option<f64>,
    /// Wall-clock seconds from start to stop, pauses included
    #[serde(default)]
    pub elapsed_duration: Option<f64>,
    /// Meters
    #[serde(default)]
    pub distance: Option<f64>,
    #[serde(default)]
    pub activity_type: Option<GarminActivityType>,
    #[serde(default)]
    pub workout_id: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GarminActivityType {
    pub type_key: String,
}

/// Planned workout an activity was recorded against.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GarminWorkout {
    #[serde(default)]
    pub workout_name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

impl GarminActivity {
    /// Normalize into the shared model, or `None` if the start time is unusable.
    pub fn into_activity(self) -> Option<Activity> {
        let start = parse_garmin_gmt(self.start_time_gmt.as_deref().unwrap_or(""))?;

        // Strava reports elapsed time, so match on the same clock.
        let seconds = self.elapsed_duration.or(self.duration).unwrap_or(0.0);

        Some(Activity {
            id: self.activity_id.to_string(),
            start,
            duration_secs: seconds.max(0.0).round() as u64,
            distance_meters: self.distance.filter(|d| *d > 0.0),
            title: non_empty(self.activity_name).unwrap_or_default(),
            description: non_empty(self.description),
            activity_type: self
                .activity_type
                .map(|t| normalize_type_key(&t.type_key))
                .unwrap_or_default(),
            workout_id: self.workout_id.map(|id| id.to_string()),
        })
    }
}

impl GarminWorkout {
    /// Apply the workout's name and description over the activity's own.
    ///
    /// Blank workout fields leave the activity's value in place.
    pub fn overlay(self, mut activity: Activity) -> Activity {
        if let Some(name) = non_empty(self.workout_name) {
            activity.title = name;
        }
        if let Some(description) = non_empty(self.description) {
            activity.description = Some(description);
        }
        activity
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Map a Garmin `typeKey` onto the shared lowercase vocabulary.
pub fn normalize_type_key(type_key: &str) -> String {
    let key = type_key.to_ascii_lowercase();
    let normalized = match key.as_str() {
        "running" | "trail_running" | "treadmill_running" | "track_running" | "virtual_run" => {
            "run"
        }
        "cycling" | "road_biking" | "mountain_biking" | "gravel_cycling" | "indoor_cycling"
        | "virtual_ride" => "ride",
        "swimming" | "lap_swimming" | "open_water_swimming" => "swim",
        "walking" => "walk",
        "hiking" => "hike",
        "multi_sport" | "fitness_equipment" | "strength_training" | "hiit" | "other" => "workout",
        _ => return key,
    };
    normalized.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample() -> GarminActivity {
        serde_json::from_str(
            r#"{
                "activityId": 987,
                "activityName": "Lyon Running",
                "description": "  easy  ",
                "startTimeGMT": "2024-05-01 07:00:00",
                "startTimeLocal": "2024-05-01 09:00:00",
                "duration": 3599.6,
                "distance": 10000.0,
                "activityType": { "typeKey": "trail_running", "typeId": 6 },
                "workoutId": 55
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn test_into_activity_uses_gmt_start() {
        let activity = sample().into_activity().unwrap();
        assert_eq!(activity.id, "987");
        assert_eq!(
            activity.start,
            Utc.with_ymd_and_hms(2024, 5, 1, 7, 0, 0).unwrap()
        );
        assert_eq!(activity.duration_secs, 3600);
        assert_eq!(activity.activity_type, "run");
        assert_eq!(activity.title, "Lyon Running");
        assert_eq!(activity.description.as_deref(), Some("easy"));
    }

    #[test]
    fn test_paused_activity_uses_elapsed_time() {
        let garmin: GarminActivity = serde_json::from_str(
            r#"{
                "activityId": 988,
                "startTimeGMT": "2024-05-01 07:00:00",
                "duration": 3600.0,
                "movingDuration": 3410.0,
                "elapsedDuration": 4200.0,
                "activityType": { "typeKey": "running" }
            }"#,
        )
        .unwrap();
        assert_eq!(garmin.into_activity().unwrap().duration_secs, 4200);
    }

    #[test]
    fn test_workout_overlay_takes_precedence() {
        let activity = sample().into_activity().unwrap();
        assert_eq!(activity.workout_id.as_deref(), Some("55"));

        let workout = GarminWorkout {
            workout_name: Some("5x1k intervals".to_string()),
            description: Some(" ".to_string()),
        };
        let activity = workout.overlay(activity);
        assert_eq!(activity.title, "5x1k intervals");
        // Blank workout description falls back to the activity's own.
        assert_eq!(activity.description.as_deref(), Some("easy"));
    }

    #[test]
    fn test_missing_start_is_skipped() {
        let mut garmin = sample();
        garmin.start_time_gmt = None;
        assert!(garmin.into_activity().is_none());
    }

    #[test]
    fn test_type_key_mapping() {
        assert_eq!(normalize_type_key("cycling"), "ride");
        assert_eq!(normalize_type_key("fitness_equipment"), "workout");
        assert_eq!(normalize_type_key("Yoga"), "yoga");
    }
}
