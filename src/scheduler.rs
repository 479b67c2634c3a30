// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Run loop: a single cycle, or one cycle per interval until shutdown.
//!
//! Cycles never overlap: the next tick is only awaited once the previous
//! cycle has returned.

use crate::config::RunMode;
use crate::models::CycleReport;
use crate::services::SyncEngine;
use chrono::{Local, Timelike};
use std::future::Future;
use std::str::FromStr;
use std::time::Duration;
use tokio::time::MissedTickBehavior;

/// Consecutive aborted cycles before the operator is told to intervene.
const ABORT_ALERT_THRESHOLD: u32 = 3;

/// Local hours during which cycles are skipped, as `start-end` (end exclusive).
///
/// The window may wrap midnight: `22-6` covers 22:00 through 05:59.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuietHours {
    start: u32,
    end: u32,
}

impl QuietHours {
    pub fn new(start: u32, end: u32) -> Option<Self> {
        (start < 24 && end <= 24 && start != end).then_some(Self { start, end })
    }

    pub fn contains(&self, hour: u32) -> bool {
        if self.start < self.end {
            (self.start..self.end).contains(&hour)
        } else {
            hour >= self.start || hour < self.end
        }
    }
}

impl FromStr for QuietHours {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (start, end) = s
            .split_once('-')
            .ok_or_else(|| format!("expected 'start-end', got '{}'", s))?;
        let start: u32 = start
            .trim()
            .parse()
            .map_err(|_| format!("invalid start hour '{}'", start))?;
        let end: u32 = end
            .trim()
            .parse()
            .map_err(|_| format!("invalid end hour '{}'", end))?;
        QuietHours::new(start, end).ok_or_else(|| format!("invalid hour range '{}'", s))
    }
}

/// Drives the sync engine.
pub struct Scheduler {
    engine: SyncEngine,
    mode: RunMode,
    interval: Duration,
    quiet_hours: Option<QuietHours>,
}

impl Scheduler {
    pub fn new(
        engine: SyncEngine,
        mode: RunMode,
        interval: Duration,
        quiet_hours: Option<QuietHours>,
    ) -> Self {
        Self {
            engine,
            mode,
            interval,
            quiet_hours,
        }
    }

    /// Run according to the configured mode until done or `shutdown` resolves.
    pub async fn run(&self, shutdown: impl Future<Output = ()>) {
        match self.mode {
            RunMode::Once => {
                tracing::info!("Mode: single run");
                self.run_once().await;
            }
            RunMode::Scheduler => {
                tracing::info!(
                    interval_minutes = self.interval.as_secs() / 60,
                    "Mode: scheduler"
                );
                self.run_loop(shutdown).await;
            }
        }
    }

    /// Run a cycle unless inside quiet hours.
    pub async fn run_once(&self) -> Option<CycleReport> {
        let hour = Local::now().hour();
        if self.quiet_hours.is_some_and(|q| q.contains(hour)) {
            tracing::info!(hour, "Inside quiet hours, skipping sync");
            return None;
        }
        Some(self.engine.run_cycle().await)
    }

    async fn run_loop(&self, shutdown: impl Future<Output = ()>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        let mut consecutive_aborts = 0u32;
        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = &mut shutdown => {
                    tracing::info!("Shutdown requested, stopping scheduler");
                    return;
                }
            }

            let Some(report) = self.run_once().await else {
                continue;
            };

            if report.aborted.is_some() {
                consecutive_aborts += 1;
                if consecutive_aborts >= ABORT_ALERT_THRESHOLD {
                    tracing::error!(
                        consecutive_aborts,
                        "Sync keeps aborting; credentials likely need attention"
                    );
                }
            } else {
                consecutive_aborts = 0;
            }
        }
    }
}
