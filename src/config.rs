//! Application configuration loaded from environment variables.
//!
//! Everything is read once at startup and handed to components as plain
//! structs; nothing below this module looks at the environment.

use crate::scheduler::QuietHours;
use crate::services::governor::{QuotaLimit, RetryPolicy};
use crate::services::matcher::MatchConfig;
use crate::services::reconciler::ReconcileConfig;
use crate::services::sync::SyncSettings;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Whether to loop on a timer or run a single cycle and exit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    Scheduler,
    Once,
}

impl FromStr for RunMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "scheduler" => Ok(RunMode::Scheduler),
            "once" => Ok(RunMode::Once),
            other => Err(format!("expected 'scheduler' or 'once', got '{}'", other)),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("expected 'text' or 'json', got '{}'", other)),
        }
    }
}

/// Application configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    // --- Strava credentials ---
    /// Strava OAuth client ID
    pub strava_client_id: String,
    /// Strava OAuth client secret
    pub strava_client_secret: String,
    /// Initial access token (superseded by the token file when present)
    pub strava_access_token: Option<String>,
    /// Initial refresh token (superseded by the token file when present)
    pub strava_refresh_token: Option<String>,
    /// Unix expiry of the initial access token
    pub strava_token_expires_at: i64,
    /// Where refreshed Strava tokens are persisted
    pub strava_token_file: PathBuf,

    // --- Garmin ---
    /// Directory containing `oauth2_token.json`
    pub garmin_tokens_dir: PathBuf,

    // --- Run loop ---
    pub run_mode: RunMode,
    pub sync_interval: Duration,
    pub quiet_hours: Option<QuietHours>,
    pub log_format: LogFormat,
    /// Persisted cursor location
    pub cursor_file: PathBuf,

    // --- Core components ---
    pub sync: SyncSettings,
    pub matching: MatchConfig,
    pub reconcile: ReconcileConfig,
    pub retry: RetryPolicy,
    pub strava_quota: Vec<QuotaLimit>,
    pub garmin_quota: Vec<QuotaLimit>,
}

impl Default for Config {
    /// Default config for testing only.
    fn default() -> Self {
        Self {
            strava_client_id: "test_client_id".to_string(),
            strava_client_secret: "test_secret".to_string(),
            strava_access_token: Some("test_access".to_string()),
            strava_refresh_token: Some("test_refresh".to_string()),
            strava_token_expires_at: 0,
            strava_token_file: PathBuf::from("data/.strava_token.json"),
            garmin_tokens_dir: PathBuf::from("data/.garminconnect"),
            run_mode: RunMode::Once,
            sync_interval: Duration::from_secs(60 * 60),
            quiet_hours: None,
            log_format: LogFormat::Text,
            cursor_file: PathBuf::from("data/.strava_synced_cache.json"),
            sync: SyncSettings::default(),
            matching: MatchConfig::default(),
            reconcile: ReconcileConfig::default(),
            retry: RetryPolicy::default(),
            strava_quota: QuotaLimit::strava_defaults(),
            garmin_quota: QuotaLimit::garmin_defaults(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok(); // Load .env file if present
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build configuration from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let required = |name: &'static str| get(name).ok_or(ConfigError::Missing(name));

        let defaults = Config::default();
        let matching_defaults = &defaults.matching;

        let matching = MatchConfig {
            max_start_delta_secs: parse_or(
                &get,
                "MATCH_MAX_START_DELTA_SECS",
                matching_defaults.max_start_delta_secs,
            )?,
            duration_ratio: parse_or(&get, "MATCH_DURATION_RATIO", matching_defaults.duration_ratio)?,
            duration_floor_secs: parse_or(
                &get,
                "MATCH_DURATION_FLOOR_SECS",
                matching_defaults.duration_floor_secs,
            )?,
            weight_start: parse_or(&get, "MATCH_WEIGHT_START", matching_defaults.weight_start)?,
            weight_duration: parse_or(
                &get,
                "MATCH_WEIGHT_DURATION",
                matching_defaults.weight_duration,
            )?,
            weight_distance: parse_or(
                &get,
                "MATCH_WEIGHT_DISTANCE",
                matching_defaults.weight_distance,
            )?,
            max_score: parse_or(&get, "MATCH_MAX_SCORE", matching_defaults.max_score)?,
            require_same_type: parse_bool_or(
                &get,
                "MATCH_REQUIRE_SAME_TYPE",
                matching_defaults.require_same_type,
            )?,
        };

        let reconcile = ReconcileConfig {
            title_template: get("TITLE_TEMPLATE").unwrap_or(defaults.reconcile.title_template),
            description_template: get("DESCRIPTION_TEMPLATE")
                .unwrap_or(defaults.reconcile.description_template),
            preserve_custom_titles: parse_bool_or(
                &get,
                "PRESERVE_CUSTOM_TITLES",
                defaults.reconcile.preserve_custom_titles,
            )?,
        };

        let sync = SyncSettings {
            lookback_days: parse_or(&get, "SYNC_DAYS", defaults.sync.lookback_days)?,
            fetch_limit: parse_or(&get, "SYNC_FETCH_LIMIT", defaults.sync.fetch_limit)?,
            dry_run: parse_bool_or(&get, "DRY_RUN", defaults.sync.dry_run)?,
        };

        let interval_minutes: u64 = parse_or(&get, "SYNC_INTERVAL_MINUTES", 60)?;
        if interval_minutes == 0 {
            return Err(ConfigError::Invalid {
                name: "SYNC_INTERVAL_MINUTES",
                reason: "must be at least 1".to_string(),
            });
        }

        Ok(Self {
            strava_client_id: required("STRAVA_CLIENT_ID")?,
            strava_client_secret: required("STRAVA_CLIENT_SECRET")?,
            strava_access_token: get("STRAVA_ACCESS_TOKEN"),
            strava_refresh_token: get("STRAVA_REFRESH_TOKEN"),
            strava_token_expires_at: parse_or(&get, "STRAVA_TOKEN_EXPIRES_AT", 0)?,
            strava_token_file: get("STRAVA_TOKEN_FILE")
                .map(PathBuf::from)
                .unwrap_or(defaults.strava_token_file),
            garmin_tokens_dir: get("GARMIN_TOKENS_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.garmin_tokens_dir),
            run_mode: parse_or(&get, "RUN_MODE", RunMode::Scheduler)?,
            sync_interval: Duration::from_secs(interval_minutes * 60),
            quiet_hours: parse_optional(&get, "QUIET_HOURS")?,
            log_format: parse_or(&get, "LOG_FORMAT", LogFormat::Text)?,
            cursor_file: get("SYNC_CURSOR_FILE")
                .map(PathBuf::from)
                .unwrap_or(defaults.cursor_file),
            sync,
            matching,
            reconcile,
            retry: defaults.retry,
            strava_quota: defaults.strava_quota,
            garmin_quota: defaults.garmin_quota,
        })
    }
}

fn parse_optional<T, G>(get: &G, name: &'static str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    match get(name) {
        Some(raw) => raw.parse().map(Some).map_err(|e: T::Err| ConfigError::Invalid {
            name,
            reason: e.to_string(),
        }),
        None => Ok(None),
    }
}

fn parse_or<T, G>(get: &G, name: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    Ok(parse_optional(get, name)?.unwrap_or(default))
}

fn parse_bool_or<G>(get: &G, name: &'static str, default: bool) -> Result<bool, ConfigError>
where
    G: Fn(&str) -> Option<String>,
{
    match get(name) {
        Some(raw) => match raw.to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::Invalid {
                name,
                reason: format!("expected a boolean, got '{}'", raw),
            }),
        },
        None => Ok(default),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    const REQUIRED: [(&str, &str); 2] = [
        ("STRAVA_CLIENT_ID", "test_id"),
        ("STRAVA_CLIENT_SECRET", " test_secret \n"),
    ];

    #[test]
    fn test_config_defaults() {
        let config = Config::from_lookup(lookup(&REQUIRED)).expect("Config should load");

        assert_eq!(config.strava_client_id, "test_id");
        assert_eq!(config.strava_client_secret, "test_secret");
        assert_eq!(config.run_mode, RunMode::Scheduler);
        assert_eq!(config.sync_interval, Duration::from_secs(3600));
        assert_eq!(config.sync.lookback_days, 7);
        assert!(!config.sync.dry_run);
        assert_eq!(config.matching.max_start_delta_secs, 900);
        assert_eq!(config.reconcile.title_template, "{title}");
        assert!(config.quiet_hours.is_none());
    }

    #[test]
    fn test_config_overrides() {
        let mut vars = REQUIRED.to_vec();
        vars.extend([
            ("RUN_MODE", "once"),
            ("SYNC_INTERVAL_MINUTES", "15"),
            ("DRY_RUN", "yes"),
            ("MATCH_MAX_START_DELTA_SECS", "60"),
            ("QUIET_HOURS", "0-6"),
            ("LOG_FORMAT", "json"),
        ]);
        let config = Config::from_lookup(lookup(&vars)).unwrap();

        assert_eq!(config.run_mode, RunMode::Once);
        assert_eq!(config.sync_interval, Duration::from_secs(900));
        assert!(config.sync.dry_run);
        assert_eq!(config.matching.max_start_delta_secs, 60);
        assert_eq!(config.log_format, LogFormat::Json);
        assert!(config.quiet_hours.is_some());
    }

    #[test]
    fn test_config_missing_client_id() {
        let err = Config::from_lookup(lookup(&[("STRAVA_CLIENT_SECRET", "x")])).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("STRAVA_CLIENT_ID")));
    }

    #[test]
    fn test_config_invalid_number() {
        let mut vars = REQUIRED.to_vec();
        vars.push(("SYNC_DAYS", "a week"));
        let err = Config::from_lookup(lookup(&vars)).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { name: "SYNC_DAYS", .. }));
    }

    #[test]
    fn test_config_invalid_bool() {
        let mut vars = REQUIRED.to_vec();
        vars.push(("DRY_RUN", "maybe"));
        assert!(Config::from_lookup(lookup(&vars)).is_err());
    }
}
