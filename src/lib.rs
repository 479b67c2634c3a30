// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Garmin-Strava sync: mirror Garmin Connect titles and descriptions onto Strava.
//!
//! Each cycle fetches recent activities from both services, pairs them by
//! start time, duration and distance, and updates the Strava side wherever
//! its title or description differs from Garmin's.

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod scheduler;
pub mod services;
pub mod time_utils;
