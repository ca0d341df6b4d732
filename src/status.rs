use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::session::{FixStats, SessionState};
use crate::snapshot::Snapshot;

/// Flat status record written for dashboards and post-run inspection
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct LiveStatus {
    /// Wall-clock seconds since the Unix epoch when the record was made
    pub timestamp: f64,
    pub session_id: Option<String>,
    pub state: SessionState,
    pub elapsed_seconds: f64,
    pub elapsed_display: String,
    pub total_distance_meters: f64,
    pub distance_display: String,
    pub path_points: usize,
    pub fixes: FixStats,
    pub fixes_rejected: u64,
    // Latest position
    pub last_lat: Option<f64>,
    pub last_lon: Option<f64>,
    // Bounding box of the retained path, degrees
    pub min_lat: Option<f64>,
    pub min_lon: Option<f64>,
    pub max_lat: Option<f64>,
    pub max_lon: Option<f64>,
}

impl LiveStatus {
    /// Status with no session
    pub fn idle() -> Self {
        Self {
            timestamp: current_timestamp(),
            session_id: None,
            state: SessionState::Idle,
            elapsed_seconds: 0.0,
            elapsed_display: "0:00".to_string(),
            total_distance_meters: 0.0,
            distance_display: "0.00 km".to_string(),
            path_points: 0,
            fixes: FixStats::default(),
            fixes_rejected: 0,
            last_lat: None,
            last_lon: None,
            min_lat: None,
            min_lon: None,
            max_lat: None,
            max_lon: None,
        }
    }

    pub fn from_snapshot(snapshot: &Snapshot) -> Self {
        let mut status = Self::idle();
        status.session_id = Some(snapshot.session_id.to_string());
        status.state = snapshot.state;
        status.elapsed_seconds = snapshot.elapsed_seconds;
        status.elapsed_display = snapshot.format_elapsed();
        status.total_distance_meters = snapshot.total_distance_meters;
        status.distance_display = snapshot.format_distance_km();
        status.path_points = snapshot.path.len();
        status.fixes = snapshot.stats;
        status.fixes_rejected = snapshot.stats.rejected();

        if let Some(last) = snapshot.path.last() {
            status.last_lat = Some(last.latitude());
            status.last_lon = Some(last.longitude());
        }
        if let Some(bounds) = snapshot.path.bounds() {
            status.min_lat = Some(bounds.min().y);
            status.min_lon = Some(bounds.min().x);
            status.max_lat = Some(bounds.max().y);
            status.max_lon = Some(bounds.max().x);
        }
        status
    }

    pub fn save(&self, path: impl AsRef<Path>) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }
}

pub fn current_timestamp() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}
