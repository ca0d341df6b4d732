//! The track recording engine: a sequential reducer over control events and
//! fixes that owns the one live session and notifies subscribers.

use crossbeam::channel::{self, Receiver, Sender, TrySendError};
use std::sync::Arc;

use crate::clock::{MonotonicClock, SystemClock};
use crate::config::TrackerConfig;
use crate::error::{TResult, TrackerError};
use crate::provider::LocationProvider;
use crate::session::{Ack, Session, SessionState};
use crate::snapshot::Snapshot;
use crate::types::{GeoFix, SessionId};

/// Everything the engine reduces, in arrival order
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EngineEvent {
    Start,
    Stop,
    Pause,
    Resume,
    Tick,
    Fix(GeoFix),
}

/// What reducing one event produced
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Started(SessionId),
    Stopped(Snapshot),
    Paused(Snapshot),
    Resumed(Snapshot),
    Ticked(Snapshot),
    Ingested(Ack),
}

/// Snapshots a channel subscriber may leave unread before new ones are dropped
pub const SUBSCRIBER_QUEUE_DEPTH: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

enum Subscriber {
    Callback(Box<dyn FnMut(&Snapshot) + Send>),
    Channel(Sender<Snapshot>),
}

pub struct TrackEngine {
    config: TrackerConfig,
    clock: Arc<dyn MonotonicClock>,
    session: Option<Session>,
    provider: Option<Box<dyn LocationProvider>>,
    subscribers: Vec<(SubscriptionId, Subscriber)>,
    next_subscription: u64,
    sessions_started: u64,
    last_reading: Option<f64>,
}

impl TrackEngine {
    pub fn new(config: TrackerConfig, clock: Arc<dyn MonotonicClock>) -> TResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            clock,
            session: None,
            provider: None,
            subscribers: Vec::new(),
            next_subscription: 0,
            sessions_started: 0,
            last_reading: None,
        })
    }

    /// Engine on the process monotonic clock
    pub fn with_system_clock(config: TrackerConfig) -> TResult<Self> {
        Self::new(config, Arc::new(SystemClock::new()))
    }

    pub fn set_location_provider(&mut self, provider: Box<dyn LocationProvider>) {
        self.provider = Some(provider);
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    pub fn state(&self) -> SessionState {
        self.session
            .as_ref()
            .map(|s| s.state())
            .unwrap_or(SessionState::Idle)
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    /// Reduce one event
    pub fn apply(&mut self, event: EngineEvent) -> TResult<Outcome> {
        match event {
            EngineEvent::Start => self.start().map(Outcome::Started),
            EngineEvent::Stop => self.stop().map(Outcome::Stopped),
            EngineEvent::Pause => self.pause().map(Outcome::Paused),
            EngineEvent::Resume => self.resume().map(Outcome::Resumed),
            EngineEvent::Tick => self.tick().map(Outcome::Ticked),
            EngineEvent::Fix(fix) => self.ingest(fix).map(Outcome::Ingested),
        }
    }

    /// Idle/Stopped → Running with a fresh session
    pub fn start(&mut self) -> TResult<SessionId> {
        if self.state().is_live() {
            return Err(TrackerError::AlreadyRunning);
        }
        let now = self.read_clock()?;

        if let Some(provider) = self.provider.as_mut() {
            provider.start_watching()?;
        }

        self.sessions_started += 1;
        let id = SessionId::generate(self.sessions_started);
        let session = Session::start(id.clone(), &self.config, now);
        let snapshot = session.snapshot(now);
        self.session = Some(session);

        log::info!("Session {} started", id);
        self.notify(&snapshot);
        Ok(id)
    }

    /// Running/Paused → Stopped. Returns the final snapshot.
    pub fn stop(&mut self) -> TResult<Snapshot> {
        if !self.state().is_live() {
            return Err(TrackerError::NotRunning);
        }
        let now = self.read_clock()?;
        self.finish(now)
    }

    pub fn pause(&mut self) -> TResult<Snapshot> {
        let now = self.checked_live_reading("pause", SessionState::Running)?;
        let session = self.live_session_mut()?;
        session.pause(now)?;
        let snapshot = session.snapshot(now);

        log::info!(
            "Session {} paused at {:.1}s",
            snapshot.session_id,
            snapshot.elapsed_seconds
        );
        self.notify(&snapshot);
        Ok(snapshot)
    }

    pub fn resume(&mut self) -> TResult<Snapshot> {
        let now = self.checked_live_reading("resume", SessionState::Paused)?;
        let session = self.live_session_mut()?;
        session.resume(now)?;
        let snapshot = session.snapshot(now);

        log::info!("Session {} resumed", snapshot.session_id);
        self.notify(&snapshot);
        Ok(snapshot)
    }

    /// Emit the current elapsed time to subscribers
    pub fn tick(&mut self) -> TResult<Snapshot> {
        let state = self.state();
        if !state.is_live() {
            return Err(TrackerError::InvalidTransition {
                event: "tick",
                state,
            });
        }
        let now = self.read_clock()?;
        let snapshot = self.live_session_mut()?.snapshot(now);
        self.notify(&snapshot);
        Ok(snapshot)
    }

    /// Feed one raw fix. Fixes after stop are dropped, not errors.
    pub fn ingest(&mut self, fix: GeoFix) -> TResult<Ack> {
        let now = match self.state() {
            SessionState::Idle => {
                return Err(TrackerError::InvalidTransition {
                    event: "ingest",
                    state: SessionState::Idle,
                })
            }
            SessionState::Stopped => {
                log::trace!("Dropping fix after stop");
                return Ok(Ack::Dropped);
            }
            // Counted as dropped by the session, no clock reading needed
            SessionState::Paused => None,
            SessionState::Running => Some(self.read_clock()?),
        };

        let config = &self.config;
        let session = self
            .session
            .as_mut()
            .ok_or_else(|| TrackerError::Internal("live state without session".into()))?;

        let ack = session.ingest(&fix, config);
        let now = match now {
            Some(now) => now,
            None => return Ok(ack),
        };
        match ack {
            Ack::Accepted => {
                let snapshot = session.snapshot(now);
                self.notify(&snapshot);
            }
            Ack::Rejected(reason) => {
                log::debug!(
                    "Rejected fix ({:.6}, {:.6}) @ {:.3}: {}",
                    fix.latitude,
                    fix.longitude,
                    fix.timestamp,
                    reason
                );
            }
            Ack::Dropped => {}
        }
        Ok(ack)
    }

    /// Current projection without emitting it
    pub fn snapshot(&self) -> Option<Snapshot> {
        let now = match self.last_reading {
            Some(last) => self.clock.now().max(last),
            None => self.clock.now(),
        };
        self.session.as_ref().map(|s| s.snapshot(now))
    }

    pub fn subscribe<F>(&mut self, callback: F) -> SubscriptionId
    where
        F: FnMut(&Snapshot) + Send + 'static,
    {
        self.add_subscriber(Subscriber::Callback(Box::new(callback)))
    }

    /// Channel subscription holding up to [`SUBSCRIBER_QUEUE_DEPTH`] unread
    /// snapshots. Dropped receivers are pruned on the next emission.
    pub fn subscribe_channel(&mut self) -> (SubscriptionId, Receiver<Snapshot>) {
        let (tx, rx) = channel::bounded(SUBSCRIBER_QUEUE_DEPTH);
        (self.add_subscriber(Subscriber::Channel(tx)), rx)
    }

    /// Returns false if `id` was not subscribed
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|(sid, _)| *sid != id);
        self.subscribers.len() != before
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    fn add_subscriber(&mut self, subscriber: Subscriber) -> SubscriptionId {
        let id = SubscriptionId(self.next_subscription);
        self.next_subscription += 1;
        self.subscribers.push((id, subscriber));
        id
    }

    fn notify(&mut self, snapshot: &Snapshot) {
        self.subscribers.retain_mut(|(id, subscriber)| match subscriber {
            Subscriber::Callback(callback) => {
                callback(snapshot);
                true
            }
            Subscriber::Channel(tx) => match tx.try_send(snapshot.clone()) {
                Ok(()) => true,
                Err(TrySendError::Full(_)) => {
                    // Stalled reader, drop this snapshot
                    log::trace!("Subscriber {:?} queue full", id);
                    true
                }
                Err(TrySendError::Disconnected(_)) => {
                    log::debug!("Subscriber {:?} disconnected", id);
                    false
                }
            },
        });
    }

    fn live_session_mut(&mut self) -> TResult<&mut Session> {
        self.session
            .as_mut()
            .filter(|s| s.state().is_live())
            .ok_or(TrackerError::NotRunning)
    }

    /// Check the state before touching the clock, so misuse has no side effect
    fn checked_live_reading(
        &mut self,
        event: &'static str,
        required: SessionState,
    ) -> TResult<f64> {
        let state = self.state();
        if state != required {
            return Err(TrackerError::InvalidTransition { event, state });
        }
        self.read_clock()
    }

    fn finish(&mut self, now: f64) -> TResult<Snapshot> {
        let session = self.live_session_mut()?;
        session.stop(now)?;
        let snapshot = session.snapshot(now);

        if let Some(provider) = self.provider.as_mut() {
            provider.stop_watching();
        }

        log::info!(
            "Session {} stopped: {} elapsed, {}, {} points",
            snapshot.session_id,
            snapshot.format_elapsed(),
            snapshot.format_distance_km(),
            snapshot.path.len()
        );
        self.notify(&snapshot);
        Ok(snapshot)
    }

    /// Read the clock, enforcing monotonicity.
    ///
    /// A backwards reading force-stops the live session at the last good
    /// reading and surfaces `ClockRegression`.
    fn read_clock(&mut self) -> TResult<f64> {
        let now = self.clock.now();
        let previous = self.last_reading;

        let regressed = match previous {
            Some(prev) => now.is_nan() || now < prev,
            None => !now.is_finite(),
        };
        if !regressed {
            self.last_reading = Some(now);
            return Ok(now);
        }

        let previous = previous.unwrap_or(0.0);
        log::error!(
            "Monotonic clock went backwards ({:.3}s -> {:.3}s)",
            previous,
            now
        );

        if self.state().is_live() {
            if let Err(e) = self.finish(previous) {
                log::error!("Force-stop after clock regression failed: {}", e);
            }
        }
        // Rebase so a new session can start on the regressed clock
        if now.is_finite() {
            self.last_reading = Some(now);
        }
        Err(TrackerError::ClockRegression {
            previous,
            current: now,
        })
    }
}
