use serde::Serialize;

use crate::buffer::TrackPath;
use crate::session::{FixStats, SessionState};
use crate::types::SessionId;

/// Immutable projection of the live session handed to subscribers.
///
/// Every emission is a fresh value; the path shares storage with the engine
/// copy-on-write, so nothing reachable from here can mutate engine state.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Snapshot {
    pub session_id: SessionId,
    pub state: SessionState,
    pub elapsed_seconds: f64,
    pub total_distance_meters: f64,
    pub path: TrackPath,
    pub stats: FixStats,
}

impl Snapshot {
    /// `m:ss`, or `h:mm:ss` past the hour
    pub fn format_elapsed(&self) -> String {
        format_duration(self.elapsed_seconds)
    }

    /// Kilometers with two decimals, e.g. `1.25 km`
    pub fn format_distance_km(&self) -> String {
        format!("{:.2} km", self.total_distance_meters / 1000.0)
    }
}

pub fn format_duration(seconds: f64) -> String {
    let total = if seconds.is_finite() && seconds > 0.0 {
        seconds.floor() as u64
    } else {
        0
    };
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let secs = total % 60;

    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, secs)
    } else {
        format!("{}:{:02}", minutes, secs)
    }
}
