use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::buffer::TrackBuffer;
use crate::clock::SessionClock;
use crate::config::TrackerConfig;
use crate::distance::DistanceAccumulator;
use crate::error::{TResult, TrackerError};
use crate::snapshot::Snapshot;
use crate::types::{GeoFix, SessionId, TrackPoint};
use crate::validator::{self, Rejection, Verdict};

/// Session state machine states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    /// No session has been started
    Idle,
    /// Recording fixes, clock running
    Running,
    /// Still a live session, but clock stopped and fixes dropped
    Paused,
    /// Frozen until a new session starts
    Stopped,
}

impl SessionState {
    /// Running or Paused
    pub fn is_live(&self) -> bool {
        matches!(self, SessionState::Running | SessionState::Paused)
    }
}

/// Outcome of ingesting one fix
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Ack {
    Accepted,
    Rejected(Rejection),
    /// Arrived while paused or after stop; ignored without error
    Dropped,
}

/// Per-session fix counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixStats {
    pub accepted: u64,
    pub dropped: u64,
    pub invalid_coordinate: u64,
    pub low_accuracy: u64,
    pub out_of_order: u64,
    pub duplicate: u64,
}

impl FixStats {
    pub fn rejected(&self) -> u64 {
        self.invalid_coordinate + self.low_accuracy + self.out_of_order + self.duplicate
    }

    fn count_rejection(&mut self, reason: Rejection) {
        match reason {
            Rejection::InvalidCoordinate => self.invalid_coordinate += 1,
            Rejection::LowAccuracy => self.low_accuracy += 1,
            Rejection::OutOfOrder => self.out_of_order += 1,
            Rejection::Duplicate => self.duplicate += 1,
        }
    }
}

/// One recording session. Mutated only by the engine that owns it.
#[derive(Debug, Clone)]
pub struct Session {
    id: SessionId,
    state: SessionState,
    started_at: DateTime<Utc>,
    stopped_at: Option<DateTime<Utc>>,
    clock: SessionClock,
    distance: DistanceAccumulator,
    buffer: TrackBuffer,
    last_accepted: Option<TrackPoint>,
    stats: FixStats,
    /// Elapsed seconds pinned at stop
    final_elapsed: Option<f64>,
}

impl Session {
    /// Create a session that is already Running from `now`
    pub fn start(id: SessionId, config: &TrackerConfig, now: f64) -> Self {
        let mut clock = SessionClock::new();
        clock.resume(now);

        Session {
            id,
            state: SessionState::Running,
            started_at: Utc::now(),
            stopped_at: None,
            clock,
            distance: DistanceAccumulator::new(),
            buffer: TrackBuffer::new(config.buffer_capacity),
            last_accepted: None,
            stats: FixStats::default(),
            final_elapsed: None,
        }
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn stopped_at(&self) -> Option<DateTime<Utc>> {
        self.stopped_at
    }

    pub fn stats(&self) -> FixStats {
        self.stats
    }

    pub fn total_distance_meters(&self) -> f64 {
        self.distance.total_meters()
    }

    pub fn last_accepted(&self) -> Option<&TrackPoint> {
        self.last_accepted.as_ref()
    }

    pub fn buffer(&self) -> &TrackBuffer {
        &self.buffer
    }

    pub fn elapsed_seconds(&self, now: f64) -> f64 {
        self.final_elapsed.unwrap_or_else(|| self.clock.elapsed(now))
    }

    /// Transition Running → Paused
    pub fn pause(&mut self, now: f64) -> TResult<()> {
        match self.state {
            SessionState::Running => {
                self.clock.pause(now);
                self.state = SessionState::Paused;
                Ok(())
            }
            state => Err(TrackerError::InvalidTransition {
                event: "pause",
                state,
            }),
        }
    }

    /// Transition Paused → Running
    pub fn resume(&mut self, now: f64) -> TResult<()> {
        match self.state {
            SessionState::Paused => {
                self.clock.resume(now);
                self.state = SessionState::Running;
                Ok(())
            }
            state => Err(TrackerError::InvalidTransition {
                event: "resume",
                state,
            }),
        }
    }

    /// Transition Running/Paused → Stopped and freeze
    pub fn stop(&mut self, now: f64) -> TResult<()> {
        if !self.state.is_live() {
            return Err(TrackerError::NotRunning);
        }
        self.clock.pause(now);
        self.final_elapsed = Some(self.clock.active_seconds());
        self.stopped_at = Some(Utc::now());
        self.state = SessionState::Stopped;
        Ok(())
    }

    /// Validate and record a fix. Only a Running session records anything.
    pub fn ingest(&mut self, fix: &GeoFix, config: &TrackerConfig) -> Ack {
        if self.state != SessionState::Running {
            if self.state == SessionState::Paused {
                self.stats.dropped += 1;
            }
            return Ack::Dropped;
        }

        match validator::accept(fix, self.last_accepted.as_ref(), &config.validator) {
            Verdict::Accepted(point) => {
                self.distance.push(point);
                self.buffer.append(point);
                self.last_accepted = Some(point);
                self.stats.accepted += 1;
                Ack::Accepted
            }
            Verdict::Rejected(reason) => {
                self.stats.count_rejection(reason);
                Ack::Rejected(reason)
            }
        }
    }

    pub fn snapshot(&self, now: f64) -> Snapshot {
        Snapshot {
            session_id: self.id.clone(),
            state: self.state,
            elapsed_seconds: self.elapsed_seconds(now),
            total_distance_meters: self.distance.total_meters(),
            path: self.buffer.snapshot(),
            stats: self.stats,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn session(now: f64) -> Session {
        Session::start(SessionId::generate(0), &TrackerConfig::default(), now)
    }

    #[test]
    fn test_session_state_transitions() {
        let mut session = session(0.0);
        assert_eq!(session.state(), SessionState::Running);

        // Running → Paused
        session.pause(5.0).unwrap();
        assert_eq!(session.state(), SessionState::Paused);

        // Paused → Running
        session.resume(50.0).unwrap();
        assert_eq!(session.state(), SessionState::Running);

        // Running → Stopped
        session.stop(60.0).unwrap();
        assert_eq!(session.state(), SessionState::Stopped);
        assert!(session.stopped_at().is_some());
        assert_eq!(session.elapsed_seconds(1000.0), 15.0);
    }

    #[test]
    fn test_invalid_state_transitions() {
        let mut session = session(0.0);

        // Can't resume while running
        assert!(matches!(
            session.resume(1.0),
            Err(TrackerError::InvalidTransition { event: "resume", .. })
        ));

        // Can't pause twice
        session.pause(2.0).unwrap();
        assert!(session.pause(3.0).is_err());

        // Stop from Paused is allowed, but only once
        session.stop(4.0).unwrap();
        assert_eq!(session.stop(5.0), Err(TrackerError::NotRunning));
        assert_eq!(session.elapsed_seconds(5.0), 2.0);
    }

    #[test]
    fn test_fix_counting() {
        let mut session = session(0.0);
        let config = TrackerConfig::default();

        assert_eq!(session.ingest(&GeoFix::new(0.0, 0.0, 0.0), &config), Ack::Accepted);
        assert_eq!(
            session.ingest(&GeoFix::new(0.0, 0.0, -1.0), &config),
            Ack::Rejected(Rejection::OutOfOrder)
        );
        assert_eq!(
            session.ingest(&GeoFix::new(0.0, 0.1, 5.0).with_accuracy(99.0), &config),
            Ack::Rejected(Rejection::LowAccuracy)
        );

        session.pause(3.0).unwrap();
        assert_eq!(session.ingest(&GeoFix::new(0.0, 0.2, 6.0), &config), Ack::Dropped);

        let stats = session.stats();
        assert_eq!(stats.accepted, 1);
        assert_eq!(stats.rejected(), 2);
        assert_eq!(stats.dropped, 1);
    }

    #[test]
    fn test_distance_continues_across_pause() {
        let mut session = session(0.0);
        let config = TrackerConfig::default();

        session.ingest(&GeoFix::new(0.0, 0.0, 0.0), &config);
        session.pause(5.0).unwrap();
        session.resume(50.0).unwrap();
        assert_eq!(session.ingest(&GeoFix::new(0.0, 0.01, 60.0), &config), Ack::Accepted);

        // Pairwise over the accepted points, pause or not
        let points = session.buffer().snapshot().to_vec();
        assert_eq!(points.len(), 2);
        let pairwise = crate::distance::distance_meters(&points[0], &points[1]);
        assert_abs_diff_eq!(session.total_distance_meters(), pairwise, epsilon = 1e-9);
        assert_abs_diff_eq!(pairwise, 1_111.95, epsilon = 0.01);
    }

    #[test]
    fn test_stopped_session_is_frozen() {
        let mut session = session(0.0);
        let config = TrackerConfig::default();
        session.ingest(&GeoFix::new(0.0, 0.0, 0.0), &config);
        session.stop(10.0).unwrap();

        let before = session.snapshot(10.0);
        assert_eq!(session.ingest(&GeoFix::new(0.0, 0.5, 20.0), &config), Ack::Dropped);
        let after = session.snapshot(500.0);
        assert_eq!(before, after);
    }
}
