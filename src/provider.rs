use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::mpsc::Sender;
use tokio::time::{interval, Duration};

use crate::clock::MonotonicClock;
use crate::error::TResult;
use crate::types::GeoFix;

/// Subscription lifecycle of the platform location service.
///
/// The engine calls `start_watching` when a session enters Running and
/// `stop_watching` when it leaves for Stopped.
pub trait LocationProvider: Send {
    fn start_watching(&mut self) -> TResult<()>;
    fn stop_watching(&mut self);
}

/// Provider that flips a shared flag; fix loops poll the flag.
#[derive(Clone, Debug, Default)]
pub struct WatchFlag {
    watching: Arc<AtomicBool>,
    starts: Arc<AtomicU64>,
}

impl WatchFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_watching(&self) -> bool {
        self.watching.load(Ordering::Acquire)
    }

    /// Number of times watching was started
    pub fn start_count(&self) -> u64 {
        self.starts.load(Ordering::Relaxed)
    }
}

impl LocationProvider for WatchFlag {
    fn start_watching(&mut self) -> TResult<()> {
        self.watching.store(true, Ordering::Release);
        self.starts.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn stop_watching(&mut self) {
        self.watching.store(false, Ordering::Release);
    }
}

/// Synthetic route for demos: a slow walk north-east with the faults a real
/// receiver produces mixed in.
#[derive(Clone, Debug)]
pub struct MockRoute {
    origin_lat: f64,
    origin_lon: f64,
    /// Degrees moved per fix (~2.2 m at the default)
    step_deg: f64,
    seq: u64,
}

impl MockRoute {
    pub fn new(origin_lat: f64, origin_lon: f64) -> Self {
        Self {
            origin_lat,
            origin_lon,
            step_deg: 0.00002,
            seq: 0,
        }
    }

    /// Next fix stamped at `timestamp`.
    ///
    /// Every 7th fix reports poor accuracy, every 11th is stamped half a
    /// second in the past (stale delivery).
    pub fn next_fix(&mut self, timestamp: f64) -> GeoFix {
        let seq = self.seq;
        self.seq += 1;

        let s = seq as f64;
        let latitude = self.origin_lat + s * self.step_deg;
        let longitude = self.origin_lon + s * self.step_deg + (s * 0.3).sin() * 0.000005;

        let accuracy = if seq % 7 == 6 {
            45.0
        } else {
            5.0 + (s * 0.1).sin() * 2.0
        };
        let timestamp = if seq % 11 == 10 {
            timestamp - 0.5
        } else {
            timestamp
        };

        GeoFix::new(latitude, longitude, timestamp).with_accuracy(accuracy)
    }
}

/// Push mock fixes into `tx` at `period` while `flag` is watching.
/// Returns when the receiving side closes.
pub async fn mock_fix_loop(
    tx: Sender<GeoFix>,
    mut route: MockRoute,
    clock: Arc<dyn MonotonicClock>,
    flag: WatchFlag,
    period: Duration,
) {
    let mut ticker = interval(period);
    let mut sent = 0u64;

    loop {
        ticker.tick().await;
        if !flag.is_watching() {
            if tx.is_closed() {
                break;
            }
            continue;
        }

        let fix = route.next_fix(clock.now());
        match tx.try_send(fix) {
            Ok(_) => {
                sent += 1;
                if sent % 10 == 0 {
                    log::debug!("[gps] {} fixes", sent);
                }
            }
            Err(TrySendError::Closed(_)) => {
                log::info!("[gps] Channel closed after {} fixes", sent);
                break;
            }
            Err(TrySendError::Full(_)) => {
                // Channel full, drop this fix
            }
        }
    }
}
