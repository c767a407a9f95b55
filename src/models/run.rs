// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Run model shared by the local store, the pending queue and the backend.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Run identifier (locally generated uuid or server-assigned id).
pub type RunId = String;

/// Geographic point in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub lat: f64,
    pub long: f64,
}

/// Location sample with its offset from the start of the run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LocationTimestamp {
    pub location: Location,
    /// Time since the run started
    #[serde(with = "crate::time_utils::duration_millis")]
    pub duration_timestamp: Duration,
}

/// A recorded run.
///
/// `id` is `None` until the run is first written to the local store, which
/// assigns a uuid. The backend either keeps that id or replaces it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Run {
    pub id: Option<RunId>,
    #[serde(with = "crate::time_utils::duration_millis")]
    pub duration: Duration,
    pub date_time_utc: DateTime<Utc>,
    pub distance_meters: i32,
    /// Start location
    pub location: Location,
    pub max_speed_kmh: f64,
    pub total_elevation_meters: i32,
    /// Map snapshot URL, set by the backend after upload
    pub map_picture_url: Option<String>,
    pub avg_heart_rate: Option<u32>,
    pub max_heart_rate: Option<u32>,
    /// Location samples grouped into segments (one per resume)
    #[serde(default)]
    pub path: Vec<Vec<LocationTimestamp>>,
}

impl Run {
    /// Average speed over the whole run.
    pub fn avg_speed_kmh(&self) -> f64 {
        let hours = self.duration.as_secs_f64() / 3600.0;
        if hours == 0.0 {
            return 0.0;
        }
        (self.distance_meters as f64 / 1000.0) / hours
    }

    /// Average time per kilometer, `None` when no distance was covered.
    pub fn avg_pace(&self) -> Option<Duration> {
        if self.distance_meters <= 0 {
            return None;
        }
        let km = self.distance_meters as f64 / 1000.0;
        Some(Duration::from_secs_f64(self.duration.as_secs_f64() / km))
    }

    /// Copy of this run carrying the given id.
    pub fn with_id(&self, id: impl Into<RunId>) -> Self {
        Self {
            id: Some(id.into()),
            ..self.clone()
        }
    }
}
