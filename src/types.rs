use serde::{Deserialize, Serialize};
use std::fmt;

/// Raw position report from a location provider.
///
/// `timestamp` is seconds on the provider's monotonic timeline. Nothing about
/// a fix is trusted until the validator has accepted it.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct GeoFix {
    pub latitude: f64,
    pub longitude: f64,
    pub timestamp: f64,
    #[serde(default, alias = "accuracy")]
    pub accuracy_m: Option<f64>,
}

impl GeoFix {
    pub fn new(latitude: f64, longitude: f64, timestamp: f64) -> Self {
        Self {
            latitude,
            longitude,
            timestamp,
            accuracy_m: None,
        }
    }

    pub fn with_accuracy(mut self, accuracy_m: f64) -> Self {
        self.accuracy_m = Some(accuracy_m);
        self
    }
}

/// A fix accepted by the validator. Immutable once stored.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrackPoint {
    latitude: f64,
    longitude: f64,
    timestamp: f64,
}

impl TrackPoint {
    pub(crate) fn from_fix(fix: &GeoFix) -> Self {
        Self {
            latitude: fix.latitude,
            longitude: fix.longitude,
            timestamp: fix.timestamp,
        }
    }

    pub fn latitude(&self) -> f64 {
        self.latitude
    }

    pub fn longitude(&self) -> f64 {
        self.longitude
    }

    pub fn timestamp(&self) -> f64 {
        self.timestamp
    }
}

/// Opaque session identifier
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(String);

impl SessionId {
    /// `session_<unix millis>_<sequence>`; the sequence keeps ids unique
    /// when two sessions start within the same millisecond.
    pub(crate) fn generate(sequence: u64) -> Self {
        SessionId(format!(
            "session_{}_{}",
            chrono::Utc::now().timestamp_millis(),
            sequence
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
