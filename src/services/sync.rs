// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Sync cycle: fetch → match → reconcile → apply.
//!
//! One cycle runs strictly sequentially. Expected failures never escape
//! [`SyncEngine::run_cycle`]; they end up in the [`CycleReport`]. A failure on
//! one activity does not stop the others, except an authentication failure
//! that survives a token refresh, which aborts the cycle.

use crate::db::CursorStore;
use crate::error::{ErrorKind, SyncError};
use crate::models::{
    Activity, ActivityFailure, CycleAbort, CycleReport, MatchCandidate, ServiceKind, SyncCursor,
};
use crate::services::activity::{ActivityDestination, ActivitySource};
use crate::services::fetcher::Fetcher;
use crate::services::governor::Governor;
use crate::services::matcher::Matcher;
use crate::services::reconciler::{ApplyOutcome, Reconciler};
use chrono::{DateTime, Duration, Utc};
use std::ops::ControlFlow;
use std::sync::Arc;

/// Cycle-level settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncSettings {
    /// How far back to look for activities, in days
    pub lookback_days: u32,
    /// Max activities fetched per service per cycle
    pub fetch_limit: usize,
    /// Log intended writes without issuing them
    pub dry_run: bool,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            lookback_days: 7,
            fetch_limit: 200,
            dry_run: false,
        }
    }
}

/// A remote service together with the governor guarding its calls.
pub struct Endpoint<S: ?Sized> {
    pub service: Arc<S>,
    pub governor: Governor,
}

impl<S: ?Sized> Endpoint<S> {
    pub fn new(service: Arc<S>, governor: Governor) -> Self {
        Self { service, governor }
    }
}

/// Runs sync cycles between a source and a destination service.
pub struct SyncEngine {
    settings: SyncSettings,
    source: Endpoint<dyn ActivitySource>,
    destination: Endpoint<dyn ActivityDestination>,
    fetcher: Fetcher,
    matcher: Matcher,
    reconciler: Reconciler,
    cursor_store: Box<dyn CursorStore>,
}

impl SyncEngine {
    pub fn new(
        settings: SyncSettings,
        source: Endpoint<dyn ActivitySource>,
        destination: Endpoint<dyn ActivityDestination>,
        matcher: Matcher,
        reconciler: Reconciler,
        cursor_store: Box<dyn CursorStore>,
    ) -> Self {
        Self {
            settings,
            source,
            destination,
            fetcher: Fetcher::default(),
            matcher,
            reconciler,
            cursor_store,
        }
    }

    /// Override the page size used when listing activities.
    pub fn with_fetcher(mut self, fetcher: Fetcher) -> Self {
        self.fetcher = fetcher;
        self
    }

    /// Run one complete cycle and summarize it.
    pub async fn run_cycle(&self) -> CycleReport {
        let started = std::time::Instant::now();
        let now = Utc::now();
        let since = now - Duration::days(i64::from(self.settings.lookback_days));
        let mut report = CycleReport {
            dry_run: self.settings.dry_run,
            ..CycleReport::default()
        };

        tracing::info!(
            lookback_days = self.settings.lookback_days,
            dry_run = self.settings.dry_run,
            "Starting sync cycle"
        );

        let mut cursor = match self.cursor_store.load() {
            Ok(cursor) => cursor,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to load sync cursor, starting fresh");
                SyncCursor::default()
            }
        };

        // Destination first: if every recent activity is already synced there
        // is no reason to touch the source at all.
        let destinations = match self
            .fetcher
            .fetch(
                &*self.destination.service,
                &self.destination.governor,
                since,
                self.settings.fetch_limit,
            )
            .await
        {
            Ok(activities) => activities,
            Err(e) => {
                report.aborted = Some(fetch_abort(self.destination.governor.service(), e));
                log_report(&report, started);
                return report;
            }
        };

        let pending = destinations
            .iter()
            .filter(|a| !cursor.is_synced(&a.id))
            .count();
        if pending == 0 {
            report.cached_count = destinations.len() as u32;
            tracing::info!("All recent activities already synced");
            self.finish(&mut cursor, since, now);
            log_report(&report, started);
            return report;
        }

        let sources = match self
            .fetcher
            .fetch(
                &*self.source.service,
                &self.source.governor,
                since,
                self.settings.fetch_limit,
            )
            .await
        {
            Ok(activities) => activities,
            Err(e) => {
                report.aborted = Some(fetch_abort(self.source.governor.service(), e));
                log_report(&report, started);
                return report;
            }
        };

        // Match against every destination, synced or not, so an already synced
        // activity still claims its source and cannot attract a wrong pair.
        let matches = self.matcher.match_activities(&sources, &destinations);
        report.matched_count = matches.len() as u32;
        report.unmatched_count = (sources.len() - matches.len()) as u32;
        log_unmatched(&sources, &matches);

        for candidate in matches {
            let destination_id = candidate.destination.id.clone();
            if cursor.is_synced(&destination_id) {
                report.cached_count += 1;
                continue;
            }

            let flow = self.process_match(candidate, &mut cursor, &mut report).await;
            if flow.is_break() {
                break;
            }
        }

        self.finish(&mut cursor, since, now);
        log_report(&report, started);
        report
    }

    /// Hydrate, decide and apply one match.
    async fn process_match(
        &self,
        candidate: MatchCandidate,
        cursor: &mut SyncCursor,
        report: &mut CycleReport,
    ) -> ControlFlow<()> {
        let activity_id = candidate.destination.id.clone();
        let start = candidate.destination.start;

        let candidate = match self.hydrate(candidate).await {
            Ok(candidate) => candidate,
            Err(e) => return self.record_failure(report, &activity_id, e),
        };

        let decision = self.reconciler.decide(candidate);
        if decision.is_skip() {
            tracing::info!(activity_id = %activity_id, "Already up to date");
            report.skipped_count += 1;
            cursor.mark_synced(&activity_id, start);
            return ControlFlow::Continue(());
        }

        match self
            .reconciler
            .apply(
                &decision,
                &*self.destination.service,
                &self.destination.governor,
            )
            .await
        {
            Ok(ApplyOutcome::Updated) | Ok(ApplyOutcome::DryRun) => {
                report.updated_count += 1;
                cursor.mark_synced(&activity_id, start);
                ControlFlow::Continue(())
            }
            Ok(ApplyOutcome::Unchanged) => {
                report.skipped_count += 1;
                cursor.mark_synced(&activity_id, start);
                ControlFlow::Continue(())
            }
            Err(e) => self.record_failure(report, &activity_id, e),
        }
    }

    /// Replace the listed destination activity with its detailed form.
    async fn hydrate(&self, mut candidate: MatchCandidate) -> Result<MatchCandidate, SyncError> {
        let destination = &*self.destination.service;
        let id = candidate.destination.id.clone();
        let id = id.as_str();
        let detailed: Activity = self
            .destination
            .governor
            .call("fetch_activity", move |token| async move {
                destination.fetch_activity(&token, id).await
            })
            .await?;
        candidate.destination = detailed;
        Ok(candidate)
    }

    /// Record a per-activity failure; abort on authentication that a refresh could not fix.
    fn record_failure(
        &self,
        report: &mut CycleReport,
        activity_id: &str,
        err: SyncError,
    ) -> ControlFlow<()> {
        // The governor already refreshed once; a rejection now is final.
        let revoked = err.kind() == ErrorKind::AuthExpired;
        let error_kind = if revoked { ErrorKind::Fatal } else { err.kind() };

        tracing::error!(
            activity_id,
            %error_kind,
            error = %err,
            "Failed to sync activity"
        );
        report.failures.push(ActivityFailure {
            activity_id: activity_id.to_string(),
            error_kind,
            message: err.to_string(),
        });

        if revoked {
            report.aborted = Some(CycleAbort::CredentialsRevoked {
                service: self.destination.governor.service(),
                message: err.to_string(),
            });
            return ControlFlow::Break(());
        }
        ControlFlow::Continue(())
    }

    /// Prune and persist the cursor. Dry runs leave it untouched.
    fn finish(&self, cursor: &mut SyncCursor, since: DateTime<Utc>, now: DateTime<Utc>) {
        if self.settings.dry_run {
            return;
        }
        cursor.prune_before(since);
        cursor.last_synced_at = Some(now);
        if let Err(e) = self.cursor_store.save(cursor) {
            tracing::warn!(error = %e, "Failed to save sync cursor");
        }
    }
}

fn fetch_abort(service: ServiceKind, err: SyncError) -> CycleAbort {
    tracing::error!(%service, error_kind = %err.kind(), error = %err, "Failed to fetch activities");
    match err {
        SyncError::AuthExpired(message) => CycleAbort::CredentialsRevoked { service, message },
        other => CycleAbort::FetchFailed {
            service,
            error_kind: other.kind(),
            message: other.to_string(),
        },
    }
}

fn log_unmatched(sources: &[Activity], matches: &[MatchCandidate]) {
    for source in sources {
        if !matches.iter().any(|m| m.source.id == source.id) {
            tracing::info!(
                source_id = %source.id,
                title = %source.title,
                start = %crate::time_utils::format_utc_rfc3339(source.start),
                "No matching destination activity"
            );
        }
    }
}

fn log_report(report: &CycleReport, started: std::time::Instant) {
    let elapsed_ms = started.elapsed().as_millis() as u64;
    if let Some(abort) = &report.aborted {
        tracing::error!(?abort, elapsed_ms, "Sync cycle aborted");
    }
    tracing::info!(
        matched = report.matched_count,
        updated = report.updated_count,
        skipped = report.skipped_count,
        unmatched = report.unmatched_count,
        cached = report.cached_count,
        failures = report.failures.len(),
        dry_run = report.dry_run,
        elapsed_ms,
        "Sync cycle finished"
    );
}
