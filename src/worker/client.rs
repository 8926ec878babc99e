//! Client side of the background worker
//!
//! Every call gets a fresh [`RequestId`] and its own reply channel. A
//! dispatcher thread reads the worker's single reply stream and forwards each
//! message to the call it belongs to, so calls issued back to back settle
//! independently.

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use super::background::{spawn_worker, WorkerHandle};
use super::protocol::{RequestEnvelope, RequestId, WorkerEvent, WorkerMessage, WorkerRequest};
use crate::config::WorkerConfig;
use crate::error::BridgeError;
use crate::filter::FilterOutcome;
use crate::geometry::{Feature, FeatureCollection};

type PendingMap = Arc<Mutex<HashMap<RequestId, Sender<WorkerEvent>>>>;

/// Conversion from a terminal worker reply into a call result
pub trait FromWorkerEvent: Sized {
    fn from_event(event: WorkerEvent) -> Result<Self, BridgeError>;
}

impl FromWorkerEvent for Feature {
    fn from_event(event: WorkerEvent) -> Result<Self, BridgeError> {
        match event {
            WorkerEvent::FindExtent { extent } => Ok(extent),
            WorkerEvent::Error { error } => Err(BridgeError::Worker(error)),
            other => Err(BridgeError::UnexpectedReply(other.kind())),
        }
    }
}

impl FromWorkerEvent for FilterOutcome {
    fn from_event(event: WorkerEvent) -> Result<Self, BridgeError> {
        match event {
            WorkerEvent::ClipTaskDataAndFilter { task_geometry, skipped } => Ok(FilterOutcome {
                cells: task_geometry,
                skipped,
            }),
            WorkerEvent::Error { error } => Err(BridgeError::Worker(error)),
            other => Err(BridgeError::UnexpectedReply(other.kind())),
        }
    }
}

/// Handle to one in-flight call
pub struct PendingCall<T> {
    id: RequestId,
    events: Receiver<WorkerEvent>,
    _result: PhantomData<fn() -> T>,
}

impl<T: FromWorkerEvent> PendingCall<T> {
    pub fn id(&self) -> RequestId {
        self.id
    }

    /// Block until the call settles
    pub fn wait(self) -> Result<T, BridgeError> {
        self.wait_with_progress(|_| {})
    }

    /// Block until the call settles, passing every progress value to `on_progress`
    pub fn wait_with_progress<P: FnMut(f64)>(self, mut on_progress: P) -> Result<T, BridgeError> {
        loop {
            match self.events.recv() {
                Ok(WorkerEvent::Progress { progress }) => on_progress(progress),
                Ok(event) => return T::from_event(event),
                Err(_) => return Err(BridgeError::Disconnected),
            }
        }
    }

    /// Like [`wait_with_progress`](Self::wait_with_progress), giving up after `timeout`
    pub fn wait_timeout<P: FnMut(f64)>(self, timeout: Duration, mut on_progress: P) -> Result<T, BridgeError> {
        let deadline = Instant::now() + timeout;
        loop {
            match self.events.recv_deadline(deadline) {
                Ok(WorkerEvent::Progress { progress }) => on_progress(progress),
                Ok(event) => return T::from_event(event),
                Err(RecvTimeoutError::Timeout) => return Err(BridgeError::Timeout),
                Err(RecvTimeoutError::Disconnected) => return Err(BridgeError::Disconnected),
            }
        }
    }
}

/// Owner of one background worker
pub struct WorkerClient {
    requests: Option<Sender<RequestEnvelope>>,
    pending: PendingMap,
    next_id: AtomicU64,
    worker: Option<JoinHandle<()>>,
    dispatcher: Option<JoinHandle<()>>,
}

impl WorkerClient {
    /// Start the worker thread and the reply dispatcher
    pub fn spawn(config: WorkerConfig) -> std::io::Result<Self> {
        let WorkerHandle { requests, replies, thread } = spawn_worker(config)?;
        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));

        let dispatcher = {
            let pending = Arc::clone(&pending);
            thread::Builder::new()
                .name("grid-worker-dispatch".to_string())
                .spawn(move || dispatch_replies(replies, pending))?
        };

        Ok(Self {
            requests: Some(requests),
            pending,
            next_id: AtomicU64::new(1),
            worker: Some(thread),
            dispatcher: Some(dispatcher),
        })
    }

    /// Bounding polygon of `geometries`
    pub fn find_extent(&self, geometries: FeatureCollection) -> PendingCall<Feature> {
        self.submit(WorkerRequest::FindExtent { geometries })
    }

    /// Filter `task_grid` against `geometries`, reporting per-cell progress
    pub fn clip_task_data_and_filter(
        &self,
        task_grid: FeatureCollection,
        geometries: FeatureCollection,
    ) -> PendingCall<FilterOutcome> {
        self.submit(WorkerRequest::ClipTaskDataAndFilter { task_grid, geometries })
    }

    /// Calls that have not received their terminal reply yet
    pub fn in_flight(&self) -> usize {
        self.pending.lock().len()
    }

    fn submit<T>(&self, request: WorkerRequest) -> PendingCall<T> {
        let id = RequestId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = crossbeam_channel::unbounded();
        self.pending.lock().insert(id, tx);

        let sent = match &self.requests {
            Some(requests) => requests.send(RequestEnvelope { id, request }).is_ok(),
            None => false,
        };
        if !sent {
            tracing::warn!(request = %id, "background worker is gone, call will fail");
            self.pending.lock().remove(&id);
        }

        PendingCall { id, events: rx, _result: PhantomData }
    }

    /// Stop the worker after it drains queued requests and wait for both threads
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        self.requests.take();
        for handle in [self.worker.take(), self.dispatcher.take()].into_iter().flatten() {
            if handle.join().is_err() {
                tracing::error!("background thread panicked");
            }
        }
    }
}

impl Drop for WorkerClient {
    fn drop(&mut self) {
        self.stop();
    }
}

fn dispatch_replies(replies: Receiver<WorkerMessage>, pending: PendingMap) {
    for WorkerMessage { id, event } in replies.iter() {
        let target = if event.is_terminal() {
            pending.lock().remove(&id)
        } else {
            pending.lock().get(&id).cloned()
        };
        match target {
            // A dropped PendingCall just discards its replies
            Some(tx) => {
                let _ = tx.send(event);
            }
            None => tracing::warn!(request = %id, kind = event.kind(), "reply for unknown request"),
        }
    }
    let orphaned = {
        let mut map = pending.lock();
        let count = map.len();
        map.clear();
        count
    };
    if orphaned > 0 {
        tracing::warn!(orphaned, "worker stopped with calls still pending");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Geometry;

    #[test]
    fn test_find_extent_call() {
        let client = WorkerClient::spawn(WorkerConfig::default()).unwrap();
        let geometries = FeatureCollection::new(vec![
            Feature::new(Geometry::point(0.0, 0.0)),
            Feature::new(Geometry::point(2.0, 3.0)),
        ]);
        let extent = client.find_extent(geometries).wait().unwrap();
        assert_eq!(extent.geometry.unwrap().type_name(), "Polygon");
        assert_eq!(client.in_flight(), 0);
        client.shutdown();
    }

    #[test]
    fn test_ids_are_unique() {
        let client = WorkerClient::spawn(WorkerConfig::default()).unwrap();
        let a = client.find_extent(FeatureCollection::default());
        let b = client.find_extent(FeatureCollection::default());
        assert_ne!(a.id(), b.id());
        assert!(matches!(a.wait(), Err(BridgeError::Worker(_))));
        assert!(matches!(b.wait(), Err(BridgeError::Worker(_))));
    }

    #[test]
    fn test_terminal_reply_type_mismatch() {
        let event = WorkerEvent::Progress { progress: 1.0 };
        assert_eq!(Feature::from_event(event), Err(BridgeError::UnexpectedReply("progress")));
    }
}
