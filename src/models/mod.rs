// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Data models for the application.

pub mod activity;
pub mod cursor;
pub mod sync;

pub use activity::{Activity, ServiceKind};
pub use cursor::SyncCursor;
pub use sync::{
    ActivityFailure, ActivityUpdate, CycleAbort, CycleReport, MatchCandidate, SyncAction,
    SyncDecision,
};
