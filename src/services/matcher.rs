// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Activity matcher.
//!
//! The two services share no identifier, so pairs are found by proximity:
//! start time, elapsed duration and distance. Every source/destination pair
//! inside the tolerance window gets a weighted score, and pairs are then
//! claimed greedily in ascending score order so each destination activity is
//! written by at most one source activity per cycle.

use crate::models::{Activity, MatchCandidate};
use std::cmp::Ordering;
use std::collections::HashSet;

/// Matching thresholds and score weights.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchConfig {
    /// Largest accepted start-time difference (inclusive), in seconds.
    pub max_start_delta_secs: i64,
    /// Accepted duration difference, as a fraction of the longer duration.
    pub duration_ratio: f64,
    /// Minimum accepted duration difference, in seconds.
    pub duration_floor_secs: u64,
    pub weight_start: f64,
    pub weight_duration: f64,
    pub weight_distance: f64,
    /// Largest accepted score (inclusive).
    pub max_score: f64,
    /// Reject pairs whose sport types are both known and differ.
    pub require_same_type: bool,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            max_start_delta_secs: 15 * 60,
            duration_ratio: 0.10,
            duration_floor_secs: 120,
            weight_start: 0.5,
            weight_duration: 0.3,
            weight_distance: 0.2,
            max_score: 1.0,
            require_same_type: true,
        }
    }
}

/// Pairs source activities with destination activities.
#[derive(Debug, Clone, Default)]
pub struct Matcher {
    config: MatchConfig,
}

/// A scored pair, by index into the input slices.
#[derive(Debug, Clone, Copy)]
struct ScoredPair {
    source: usize,
    destination: usize,
    score: f64,
    start_delta_secs: i64,
}

impl Matcher {
    pub fn new(config: MatchConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &MatchConfig {
        &self.config
    }

    /// Match source activities to destination activities.
    ///
    /// Returns at most one candidate per source activity and per destination
    /// activity, ordered like `sources`. The result depends only on the input
    /// values and order.
    pub fn match_activities(
        &self,
        sources: &[Activity],
        destinations: &[Activity],
    ) -> Vec<MatchCandidate> {
        let mut pairs: Vec<ScoredPair> = Vec::new();
        for (si, source) in sources.iter().enumerate() {
            for (di, destination) in destinations.iter().enumerate() {
                if let Some((score, start_delta_secs)) = self.score(source, destination) {
                    pairs.push(ScoredPair {
                        source: si,
                        destination: di,
                        score,
                        start_delta_secs,
                    });
                }
            }
        }

        // Best score first; ties go to the closer start, then to input order.
        pairs.sort_by(|a, b| {
            a.score
                .total_cmp(&b.score)
                .then(a.start_delta_secs.cmp(&b.start_delta_secs))
                .then(a.source.cmp(&b.source))
                .then(a.destination.cmp(&b.destination))
        });

        let mut claimed_sources = HashSet::new();
        let mut claimed_destinations = HashSet::new();
        let mut chosen: Vec<ScoredPair> = Vec::new();
        for pair in pairs {
            if claimed_sources.contains(&pair.source)
                || claimed_destinations.contains(&pair.destination)
            {
                continue;
            }
            claimed_sources.insert(pair.source);
            claimed_destinations.insert(pair.destination);
            chosen.push(pair);
        }

        chosen.sort_by_key(|p| p.source);
        chosen
            .into_iter()
            .map(|p| {
                let source = &sources[p.source];
                let destination = &destinations[p.destination];
                tracing::debug!(
                    source_id = %source.id,
                    destination_id = %destination.id,
                    score = p.score,
                    start_delta_secs = p.start_delta_secs,
                    "Matched activity"
                );
                MatchCandidate {
                    source: source.clone(),
                    destination: destination.clone(),
                    score: p.score,
                    start_delta_secs: p.start_delta_secs,
                }
            })
            .collect()
    }

    /// Score a pair, or `None` when it falls outside the tolerance window.
    ///
    /// Each term is normalized to `0.0..=1.0` before weighting.
    fn score(&self, source: &Activity, destination: &Activity) -> Option<(f64, i64)> {
        let cfg = &self.config;

        if cfg.require_same_type && !types_compatible(source, destination) {
            return None;
        }

        let start_delta_secs = (source.start - destination.start).num_seconds().abs();
        if start_delta_secs > cfg.max_start_delta_secs {
            return None;
        }

        let duration_delta = source.duration_secs.abs_diff(destination.duration_secs);
        let duration_tolerance = self.duration_tolerance(source, destination);
        if duration_delta as f64 > duration_tolerance {
            return None;
        }

        let start_term = if cfg.max_start_delta_secs > 0 {
            start_delta_secs as f64 / cfg.max_start_delta_secs as f64
        } else {
            0.0
        };
        let duration_term = if duration_tolerance > 0.0 {
            duration_delta as f64 / duration_tolerance
        } else {
            0.0
        };
        let distance_term = distance_term(source.distance_meters, destination.distance_meters);

        let score = cfg.weight_start * start_term
            + cfg.weight_duration * duration_term
            + cfg.weight_distance * distance_term;

        match score.partial_cmp(&cfg.max_score) {
            Some(Ordering::Less) | Some(Ordering::Equal) => Some((score, start_delta_secs)),
            _ => None,
        }
    }

    fn duration_tolerance(&self, source: &Activity, destination: &Activity) -> f64 {
        let longer = source.duration_secs.max(destination.duration_secs) as f64;
        (longer * self.config.duration_ratio).max(self.config.duration_floor_secs as f64)
    }
}

/// Relative distance difference, or 0 when either side has no distance.
fn distance_term(a: Option<f64>, b: Option<f64>) -> f64 {
    match (a, b) {
        (Some(a), Some(b)) => {
            let larger = a.abs().max(b.abs());
            if larger < 1.0 {
                0.0
            } else {
                ((a - b).abs() / larger).min(1.0)
            }
        }
        _ => 0.0,
    }
}

/// Types agree, or at least one side does not know its type.
fn types_compatible(a: &Activity, b: &Activity) -> bool {
    a.activity_type.is_empty()
        || b.activity_type.is_empty()
        || a.activity_type.eq_ignore_ascii_case(&b.activity_type)
}
