//! Track recording engine: turns a stream of raw position fixes and
//! start/pause/resume/stop commands into elapsed time, distance covered and
//! a bounded path, published as immutable snapshots.

pub mod buffer;
pub mod clock;
pub mod config;
pub mod distance;
pub mod engine;
pub mod error;
pub mod provider;
pub mod service;
pub mod session;
pub mod snapshot;
pub mod status;
pub mod types;
pub mod validator;

pub use buffer::{TrackBuffer, TrackPath};
pub use clock::{ManualClock, MonotonicClock, SessionClock, SystemClock};
pub use config::{TrackerConfig, ValidatorConfig};
pub use engine::{EngineEvent, Outcome, SubscriptionId, TrackEngine, SUBSCRIBER_QUEUE_DEPTH};
pub use error::{TResult, TrackerError};
pub use provider::{LocationProvider, MockRoute, WatchFlag};
pub use service::{spawn_engine, EngineHandle};
pub use session::{Ack, FixStats, Session, SessionState};
pub use snapshot::Snapshot;
pub use status::LiveStatus;
pub use types::{GeoFix, SessionId, TrackPoint};
pub use validator::{Rejection, Verdict};
