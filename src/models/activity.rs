// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Normalized activity snapshot shared by both services.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which remote service an activity or call belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceKind {
    Garmin,
    Strava,
}

impl fmt::Display for ServiceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceKind::Garmin => f.write_str("garmin"),
            ServiceKind::Strava => f.write_str("strava"),
        }
    }
}

/// One recorded exercise session, as fetched this cycle.
///
/// Ids are service-local; the two services share no identifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Activity {
    /// Service-local activity ID
    pub id: String,
    /// Start time (UTC)
    pub start: DateTime<Utc>,
    /// Elapsed duration in seconds
    pub duration_secs: u64,
    /// Distance in meters, when the activity has one
    pub distance_meters: Option<f64>,
    /// Activity name/title
    pub title: String,
    /// Free-text description
    pub description: Option<String>,
    /// Sport type in Strava vocabulary, lowercase (run, ride, swim, ...)
    pub activity_type: String,
    /// Planned workout the activity was recorded against, if the service links one
    #[serde(default)]
    pub workout_id: Option<String>,
}

impl Activity {
    /// Description as a plain string, empty when absent.
    pub fn description_or_empty(&self) -> &str {
        self.description.as_deref().unwrap_or("")
    }
}
