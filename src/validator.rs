//! Raw fix validation.
//!
//! Rules, first match wins:
//! - Non-finite or out-of-range coordinates: InvalidCoordinate
//! - Reported accuracy worse than the threshold: LowAccuracy
//! - Timestamp not after the last accepted point: OutOfOrder
//! - Under the noise floor and too soon after the last point: Duplicate

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::config::ValidatorConfig;
use crate::distance::distance_meters;
use crate::types::{GeoFix, TrackPoint};

/// Why a fix was not accepted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Rejection {
    InvalidCoordinate,
    LowAccuracy,
    OutOfOrder,
    Duplicate,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Rejection::InvalidCoordinate => "invalid coordinate",
            Rejection::LowAccuracy => "low accuracy",
            Rejection::OutOfOrder => "out of order",
            Rejection::Duplicate => "duplicate",
        };
        f.write_str(s)
    }
}

/// Result of validating one fix
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Verdict {
    Accepted(TrackPoint),
    Rejected(Rejection),
}

/// Decide whether `fix` extends the track ending at `last_accepted`.
pub fn accept(
    fix: &GeoFix,
    last_accepted: Option<&TrackPoint>,
    config: &ValidatorConfig,
) -> Verdict {
    if !coordinates_valid(fix) {
        return Verdict::Rejected(Rejection::InvalidCoordinate);
    }

    if let Some(accuracy) = fix.accuracy_m {
        if accuracy > config.max_accuracy_m {
            return Verdict::Rejected(Rejection::LowAccuracy);
        }
    }

    let candidate = TrackPoint::from_fix(fix);

    if let Some(last) = last_accepted {
        if candidate.timestamp() <= last.timestamp() {
            return Verdict::Rejected(Rejection::OutOfOrder);
        }

        let moved = distance_meters(last, &candidate);
        let dt = candidate.timestamp() - last.timestamp();
        if moved < config.noise_floor_m && dt < config.min_interval_s {
            return Verdict::Rejected(Rejection::Duplicate);
        }
    }

    Verdict::Accepted(candidate)
}

fn coordinates_valid(fix: &GeoFix) -> bool {
    let accuracy_ok = fix
        .accuracy_m
        .map(|a| a.is_finite() && a >= 0.0)
        .unwrap_or(true);

    fix.timestamp.is_finite()
        && fix.latitude.is_finite()
        && fix.longitude.is_finite()
        && (-90.0..=90.0).contains(&fix.latitude)
        && (-180.0..=180.0).contains(&fix.longitude)
        && accuracy_ok
}
