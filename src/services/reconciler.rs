// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Update reconciliation.
//!
//! Handles:
//! - Rendering the desired title/description from the source activity
//! - Comparing against the destination to produce a minimal update
//! - Applying the update through the governor (or logging it in dry run)

use crate::error::Result;
use crate::models::{Activity, ActivityUpdate, MatchCandidate, SyncDecision};
use crate::services::activity::ActivityDestination;
use crate::services::governor::Governor;

/// Titles a device assigns when the user never named the activity.
///
/// One of these never replaces a title the user chose on the destination.
pub const GENERIC_TITLES: [&str; 5] = ["Running", "Cycling", "Walking", "Swimming", "Workout"];

/// How desired fields are derived from the source activity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileConfig {
    /// Template for the destination title
    pub title_template: String,
    /// Template for the destination description
    pub description_template: String,
    /// Keep a custom destination title when the source title is generic
    pub preserve_custom_titles: bool,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            title_template: "{title}".to_string(),
            description_template: "{description}".to_string(),
            preserve_custom_titles: true,
        }
    }
}

/// Title and description the destination should end up with.
///
/// `None` means the field is not managed this cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DesiredFields {
    pub title: Option<String>,
    pub description: Option<String>,
}

/// What `apply` actually did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    Unchanged,
    Updated,
    DryRun,
}

/// Decides and applies destination updates.
#[derive(Debug, Clone, Default)]
pub struct Reconciler {
    config: ReconcileConfig,
    dry_run: bool,
}

impl Reconciler {
    pub fn new(config: ReconcileConfig, dry_run: bool) -> Self {
        Self { config, dry_run }
    }

    /// Render the desired destination fields for a source activity.
    pub fn desired(&self, source: &Activity) -> DesiredFields {
        let title = render_template(&self.config.title_template, source);
        let description = render_template(&self.config.description_template, source);
        DesiredFields {
            title: Some(title).filter(|t| !t.is_empty()),
            description: Some(description).filter(|d| !d.is_empty()),
        }
    }

    /// Decide what, if anything, to write for a match.
    ///
    /// Fields compare equal after trimming trailing whitespace; only
    /// differing fields end up in the update. Once an update has been
    /// applied, deciding again on the same pair yields a skip.
    pub fn decide(&self, candidate: MatchCandidate) -> SyncDecision {
        let desired = self.desired(&candidate.source);
        let current = &candidate.destination;
        let mut update = ActivityUpdate::default();

        if let Some(title) = desired.title {
            // Judge the source's own title; a template may dress up a generic one.
            let keep_custom = self.config.preserve_custom_titles
                && is_generic_title(&candidate.source.title)
                && !current.title.trim().is_empty()
                && !is_generic_title(&current.title);
            if keep_custom {
                tracing::debug!(
                    activity_id = %current.id,
                    source_title = %title,
                    "Keeping custom title over generic source title"
                );
            } else if title.trim_end() != current.title.trim_end() {
                update.title = Some(title);
            }
        }

        if let Some(description) = desired.description {
            if description.trim_end() != current.description_or_empty().trim_end() {
                update.description = Some(description);
            }
        }

        SyncDecision::new(candidate, update)
    }

    /// Apply a decision to the destination.
    ///
    /// Retries and token refresh happen inside the governor; the error
    /// returned here is final for this activity.
    pub async fn apply(
        &self,
        decision: &SyncDecision,
        destination: &dyn ActivityDestination,
        governor: &Governor,
    ) -> Result<ApplyOutcome> {
        if decision.is_skip() {
            return Ok(ApplyOutcome::Unchanged);
        }

        let activity_id = decision.candidate.destination.id.as_str();
        let update = &decision.update;

        if self.dry_run {
            tracing::info!(
                activity_id,
                action = ?decision.action,
                title = ?update.title,
                description = ?update.description,
                "[DRY RUN] Would update activity"
            );
            return Ok(ApplyOutcome::DryRun);
        }

        governor
            .call("update_activity", move |token| async move {
                destination
                    .update_activity(&token, activity_id, update)
                    .await
            })
            .await?;

        tracing::info!(
            activity_id,
            action = ?decision.action,
            from = %decision.candidate.destination.title,
            to = ?update.title,
            "Activity updated"
        );
        Ok(ApplyOutcome::Updated)
    }
}

/// Whether a title is one of the device defaults.
pub fn is_generic_title(title: &str) -> bool {
    let title = title.trim();
    GENERIC_TITLES.iter().any(|g| g.eq_ignore_ascii_case(title))
}

/// Substitute activity fields into a template.
///
/// Supported placeholders: `{title}`, `{description}`, `{type}`,
/// `{source_id}`, `{date}`, `{distance_km}`, `{duration}`.
pub fn render_template(template: &str, source: &Activity) -> String {
    let distance_km = source
        .distance_meters
        .map(|m| format!("{:.2}", m / 1000.0))
        .unwrap_or_default();

    template
        .replace("{title}", source.title.trim())
        .replace("{description}", source.description_or_empty().trim())
        .replace("{type}", &source.activity_type)
        .replace("{source_id}", &source.id)
        .replace("{date}", &source.start.format("%Y-%m-%d").to_string())
        .replace("{distance_km}", &distance_km)
        .replace("{duration}", &format_duration(source.duration_secs))
        .trim()
        .to_string()
}

/// Format seconds as `H:MM:SS`.
fn format_duration(secs: u64) -> String {
    format!("{}:{:02}:{:02}", secs / 3600, (secs % 3600) / 60, secs % 60)
}
