//! Async front end for [`TrackEngine`].
//!
//! Fix streams and user commands may come from different tasks; all of them
//! go through one mpsc queue drained by a single task, so the engine sees
//! events strictly in arrival order and never needs a lock.

use crossbeam::channel::Receiver;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::engine::{SubscriptionId, TrackEngine};
use crate::error::{TResult, TrackerError};
use crate::session::{Ack, SessionState};
use crate::snapshot::Snapshot;
use crate::types::{GeoFix, SessionId};

type Reply<T> = oneshot::Sender<T>;

enum Command {
    Start(Reply<TResult<SessionId>>),
    Stop(Reply<TResult<Snapshot>>),
    Pause(Reply<TResult<Snapshot>>),
    Resume(Reply<TResult<Snapshot>>),
    Tick(Reply<TResult<Snapshot>>),
    Ingest(GeoFix, Option<Reply<TResult<Ack>>>),
    State(Reply<SessionState>),
    Snapshot(Reply<Option<Snapshot>>),
    Subscribe(Reply<(SubscriptionId, Receiver<Snapshot>)>),
    Unsubscribe(SubscriptionId, Reply<bool>),
}

/// Cloneable handle to an engine running on its own task
#[derive(Clone, Debug)]
pub struct EngineHandle {
    tx: mpsc::Sender<Command>,
}

/// Move `engine` onto a tokio task. The task ends, handing the engine back,
/// once every handle has been dropped.
pub fn spawn_engine(
    engine: TrackEngine,
    queue_depth: usize,
) -> (EngineHandle, JoinHandle<TrackEngine>) {
    let (tx, rx) = mpsc::channel(queue_depth.max(1));
    let task = tokio::spawn(run(engine, rx));
    (EngineHandle { tx }, task)
}

async fn run(mut engine: TrackEngine, mut rx: mpsc::Receiver<Command>) -> TrackEngine {
    while let Some(command) = rx.recv().await {
        // A caller that gave up on its reply is not an engine error
        match command {
            Command::Start(reply) => {
                let _ = reply.send(engine.start());
            }
            Command::Stop(reply) => {
                let _ = reply.send(engine.stop());
            }
            Command::Pause(reply) => {
                let _ = reply.send(engine.pause());
            }
            Command::Resume(reply) => {
                let _ = reply.send(engine.resume());
            }
            Command::Tick(reply) => {
                let _ = reply.send(engine.tick());
            }
            Command::Ingest(fix, reply) => {
                let result = engine.ingest(fix);
                match reply {
                    Some(reply) => {
                        let _ = reply.send(result);
                    }
                    None => {
                        if let Err(e) = result {
                            if e.is_transition_error() {
                                log::debug!("Fix ignored: {}", e);
                            } else {
                                log::warn!("Fix ingestion failed: {}", e);
                            }
                        }
                    }
                }
            }
            Command::State(reply) => {
                let _ = reply.send(engine.state());
            }
            Command::Snapshot(reply) => {
                let _ = reply.send(engine.snapshot());
            }
            Command::Subscribe(reply) => {
                let _ = reply.send(engine.subscribe_channel());
            }
            Command::Unsubscribe(id, reply) => {
                let _ = reply.send(engine.unsubscribe(id));
            }
        }
    }
    log::debug!("Engine queue closed");
    engine
}

impl EngineHandle {
    async fn request<T>(&self, make: impl FnOnce(Reply<T>) -> Command) -> TResult<T> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(make(reply_tx))
            .await
            .map_err(|_| TrackerError::EngineClosed("command queue closed".into()))?;
        reply_rx
            .await
            .map_err(|_| TrackerError::EngineClosed("engine dropped reply".into()))
    }

    pub async fn start(&self) -> TResult<SessionId> {
        self.request(Command::Start).await?
    }

    pub async fn stop(&self) -> TResult<Snapshot> {
        self.request(Command::Stop).await?
    }

    pub async fn pause(&self) -> TResult<Snapshot> {
        self.request(Command::Pause).await?
    }

    pub async fn resume(&self) -> TResult<Snapshot> {
        self.request(Command::Resume).await?
    }

    pub async fn tick(&self) -> TResult<Snapshot> {
        self.request(Command::Tick).await?
    }

    /// Ingest and wait for the verdict
    pub async fn ingest(&self, fix: GeoFix) -> TResult<Ack> {
        self.request(|reply| Command::Ingest(fix, Some(reply))).await?
    }

    /// Queue a fix without waiting for its verdict. Ordering relative to
    /// later commands from the same caller is preserved.
    pub async fn submit(&self, fix: GeoFix) -> TResult<()> {
        self.tx
            .send(Command::Ingest(fix, None))
            .await
            .map_err(|_| TrackerError::EngineClosed("command queue closed".into()))
    }

    pub async fn state(&self) -> TResult<SessionState> {
        self.request(Command::State).await
    }

    pub async fn snapshot(&self) -> TResult<Option<Snapshot>> {
        self.request(Command::Snapshot).await
    }

    pub async fn subscribe(&self) -> TResult<(SubscriptionId, Receiver<Snapshot>)> {
        self.request(Command::Subscribe).await
    }

    pub async fn unsubscribe(&self, id: SubscriptionId) -> TResult<bool> {
        self.request(|reply| Command::Unsubscribe(id, reply)).await
    }

    /// Pipe a fix stream into the engine until either side closes
    pub fn forward_fixes(&self, mut fixes: mpsc::Receiver<GeoFix>) -> JoinHandle<u64> {
        let handle = self.clone();
        tokio::spawn(async move {
            let mut forwarded = 0u64;
            while let Some(fix) = fixes.recv().await {
                if handle.submit(fix).await.is_err() {
                    break;
                }
                forwarded += 1;
            }
            forwarded
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::TrackerConfig;
    use std::sync::Arc;

    fn spawn(clock: &ManualClock) -> (EngineHandle, JoinHandle<TrackEngine>) {
        let engine = TrackEngine::new(TrackerConfig::default(), Arc::new(clock.clone())).unwrap();
        spawn_engine(engine, 64)
    }

    #[tokio::test]
    async fn test_handle_round_trip() {
        let clock = ManualClock::new(0.0);
        let (handle, task) = spawn(&clock);

        handle.start().await.unwrap();
        assert_eq!(handle.start().await, Err(TrackerError::AlreadyRunning));
        assert_eq!(handle.ingest(GeoFix::new(0.0, 0.0, 0.0)).await.unwrap(), Ack::Accepted);
        clock.set(10.0);
        assert_eq!(handle.ingest(GeoFix::new(0.0, 1.0, 10.0)).await.unwrap(), Ack::Accepted);

        let final_snapshot = handle.stop().await.unwrap();
        assert_eq!(final_snapshot.elapsed_seconds, 10.0);
        assert!((final_snapshot.total_distance_meters - 111_195.0).abs() < 1.0);
        assert_eq!(handle.state().await.unwrap(), SessionState::Stopped);

        drop(handle);
        let engine = task.await.unwrap();
        assert_eq!(engine.state(), SessionState::Stopped);
    }

    #[tokio::test]
    async fn test_stop_after_queued_fixes_applies_in_order() {
        let clock = ManualClock::new(0.0);
        let (handle, _task) = spawn(&clock);
        handle.start().await.unwrap();

        let (fix_tx, fix_rx) = mpsc::channel(16);
        let forwarder = handle.forward_fixes(fix_rx);
        for i in 0..5 {
            fix_tx.send(GeoFix::new(0.0, i as f64 * 0.001, i as f64)).await.unwrap();
        }
        drop(fix_tx);
        assert_eq!(forwarder.await.unwrap(), 5);

        // Every fix was queued before the stop, so all of them count
        let final_snapshot = handle.stop().await.unwrap();
        assert_eq!(final_snapshot.path.len(), 5);
        assert_eq!(final_snapshot.stats.accepted, 5);

        // Late fixes are silently dropped
        handle.submit(GeoFix::new(0.0, 1.0, 99.0)).await.unwrap();
        assert_eq!(handle.ingest(GeoFix::new(0.0, 1.0, 100.0)).await.unwrap(), Ack::Dropped);
        assert_eq!(handle.snapshot().await.unwrap().unwrap(), final_snapshot);
    }

    #[tokio::test]
    async fn test_channel_subscription() {
        let clock = ManualClock::new(0.0);
        let (handle, _task) = spawn(&clock);
        let (id, rx) = handle.subscribe().await.unwrap();

        handle.start().await.unwrap();
        handle.ingest(GeoFix::new(1.0, 1.0, 1.0)).await.unwrap();
        clock.set(4.0);
        handle.tick().await.unwrap();

        let received: Vec<Snapshot> = rx.try_iter().collect();
        assert_eq!(received.len(), 3);
        assert_eq!(received[2].elapsed_seconds, 4.0);

        assert!(handle.unsubscribe(id).await.unwrap());
        handle.tick().await.unwrap();
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_closed_engine_reports_error() {
        let clock = ManualClock::new(0.0);
        let (handle, task) = spawn(&clock);
        task.abort();
        let _ = task.await;
        assert!(matches!(handle.start().await, Err(TrackerError::EngineClosed(_))));
    }
}
