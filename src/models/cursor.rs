// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Persisted sync cursor.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Marker of what previous cycles already finished.
///
/// Destination activities listed here are skipped before matching. Entries
/// are keyed by destination id and remember the activity start so they can
/// be pruned once they fall out of the look-back window.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SyncCursor {
    /// When the last cycle finished
    #[serde(default)]
    pub last_synced_at: Option<DateTime<Utc>>,
    /// Destination activity ID -> activity start
    #[serde(default)]
    pub synced: BTreeMap<String, DateTime<Utc>>,
}

impl SyncCursor {
    pub fn is_synced(&self, activity_id: &str) -> bool {
        self.synced.contains_key(activity_id)
    }

    pub fn mark_synced(&mut self, activity_id: &str, start: DateTime<Utc>) {
        self.synced.insert(activity_id.to_string(), start);
    }

    /// Drop entries for activities that started before `since`.
    pub fn prune_before(&mut self, since: DateTime<Utc>) {
        self.synced.retain(|_, start| *start >= since);
    }
}
