// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Garmin-Strava sync daemon
//!
//! Copies activity titles and descriptions from Garmin Connect to Strava,
//! once or on a fixed interval.

use anyhow::Context;
use garmin_strava_sync::{
    config::{Config, LogFormat},
    db::FileCursorStore,
    models::ServiceKind,
    scheduler::Scheduler,
    services::{
        ActivityDestination, ActivitySource, Endpoint, GarminClient, GarminTokenProvider,
        Governor, Matcher, Reconciler, StravaClient, StravaTokenProvider, SyncEngine,
    },
};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration from environment
    let config = Config::from_env().context("Failed to load configuration")?;

    init_logging(config.log_format)?;
    tracing::info!(
        run_mode = ?config.run_mode,
        dry_run = config.sync.dry_run,
        "Starting Garmin-Strava sync"
    );
    if config.sync.dry_run {
        tracing::warn!("DRY RUN enabled: no changes will be written to Strava");
    }

    let strava_tokens = StravaTokenProvider::from_config(&config)
        .context("Failed to initialize Strava credentials")?;
    let garmin_tokens = GarminTokenProvider::new(&config.garmin_tokens_dir);
    tracing::info!(
        garmin_tokens = %config.garmin_tokens_dir.display(),
        strava_tokens = %config.strava_token_file.display(),
        "Token providers initialized"
    );

    let garmin: Arc<dyn ActivitySource> = Arc::new(GarminClient::new());
    let strava: Arc<dyn ActivityDestination> = Arc::new(StravaClient::new());

    let source = Endpoint::new(
        garmin,
        Governor::new(
            ServiceKind::Garmin,
            config.retry.clone(),
            config.garmin_quota.clone(),
            Arc::new(garmin_tokens),
        ),
    );
    let destination = Endpoint::new(
        strava,
        Governor::new(
            ServiceKind::Strava,
            config.retry.clone(),
            config.strava_quota.clone(),
            Arc::new(strava_tokens),
        ),
    );

    let cursor_store = FileCursorStore::new(&config.cursor_file);
    tracing::info!(path = %cursor_store.path().display(), "Using sync cursor");

    let engine = SyncEngine::new(
        config.sync.clone(),
        source,
        destination,
        Matcher::new(config.matching.clone()),
        Reconciler::new(config.reconcile.clone(), config.sync.dry_run),
        Box::new(cursor_store),
    );

    let scheduler = Scheduler::new(
        engine,
        config.run_mode,
        config.sync_interval,
        config.quiet_hours,
    );

    scheduler
        .run(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for shutdown signal");
                std::future::pending::<()>().await;
            }
        })
        .await;

    tracing::info!("Stopped");
    Ok(())
}

/// Initialize structured logging, JSON or human-readable.
fn init_logging(format: LogFormat) -> anyhow::Result<()> {
    let filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive("garmin_strava_sync=debug".parse()?)
        .add_directive("info".parse()?);

    match format {
        LogFormat::Json => {
            let layer = tracing_subscriber::fmt::layer()
                .json()
                .with_target(false)
                .with_current_span(true)
                .flatten_event(true);
            tracing_subscriber::registry().with(filter).with(layer).init();
        }
        LogFormat::Text => {
            let layer = tracing_subscriber::fmt::layer().with_target(false);
            tracing_subscriber::registry().with(filter).with(layer).init();
        }
    }
    Ok(())
}
