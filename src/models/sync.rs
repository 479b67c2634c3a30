// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Matching, decision and cycle report models.

use crate::error::ErrorKind;
use crate::models::{Activity, ServiceKind};
use serde::Serialize;

/// A source activity paired with the destination activity it was recorded as.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchCandidate {
    pub source: Activity,
    pub destination: Activity,
    /// Weighted distance; lower is closer
    pub score: f64,
    /// Absolute start-time difference in seconds
    pub start_delta_secs: i64,
}

/// What the reconciler decided to do with a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncAction {
    SkipUnchanged,
    UpdateTitle,
    UpdateDescription,
    UpdateBoth,
}

/// Minimal update payload: only the fields that differ are set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ActivityUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl ActivityUpdate {
    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.description.is_none()
    }

    /// The action this payload corresponds to.
    pub fn action(&self) -> SyncAction {
        match (self.title.is_some(), self.description.is_some()) {
            (false, false) => SyncAction::SkipUnchanged,
            (true, false) => SyncAction::UpdateTitle,
            (false, true) => SyncAction::UpdateDescription,
            (true, true) => SyncAction::UpdateBoth,
        }
    }
}

/// Decision for one match. Pure data; nothing happens until it is applied.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncDecision {
    pub candidate: MatchCandidate,
    pub action: SyncAction,
    pub update: ActivityUpdate,
}

impl SyncDecision {
    pub fn new(candidate: MatchCandidate, update: ActivityUpdate) -> Self {
        Self {
            action: update.action(),
            candidate,
            update,
        }
    }

    pub fn is_skip(&self) -> bool {
        self.action == SyncAction::SkipUnchanged
    }
}

/// A per-activity failure recorded in the cycle report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActivityFailure {
    /// Destination activity ID
    pub activity_id: String,
    pub error_kind: ErrorKind,
    pub message: String,
}

/// Reason a cycle stopped before processing every match.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum CycleAbort {
    /// Authentication kept failing after a token refresh.
    CredentialsRevoked { service: ServiceKind, message: String },
    /// An activity list could not be fetched.
    FetchFailed {
        service: ServiceKind,
        error_kind: ErrorKind,
        message: String,
    },
}

/// Summary of one cycle, handed to the scheduler.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CycleReport {
    /// Pairs found by the matcher
    pub matched_count: u32,
    /// Destination activities written (or that would be, in dry run)
    pub updated_count: u32,
    /// Matches already in sync
    pub skipped_count: u32,
    /// Source activities with no destination counterpart this cycle
    pub unmatched_count: u32,
    /// Destination activities skipped because an earlier cycle synced them
    pub cached_count: u32,
    pub failures: Vec<ActivityFailure>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aborted: Option<CycleAbort>,
    pub dry_run: bool,
}

impl CycleReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty() && self.aborted.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_update_action_mapping() {
        let both = ActivityUpdate {
            title: Some("a".to_string()),
            description: Some("b".to_string()),
        };
        assert_eq!(both.action(), SyncAction::UpdateBoth);
        assert_eq!(ActivityUpdate::default().action(), SyncAction::SkipUnchanged);
    }

    #[test]
    fn test_update_serializes_only_set_fields() {
        let update = ActivityUpdate {
            title: Some("Morning Run".to_string()),
            description: None,
        };
        let json = serde_json::to_value(&update).unwrap();
        assert_eq!(json, serde_json::json!({ "title": "Morning Run" }));
    }
}
