//! Background worker loop
//!
//! One thread serving requests in arrival order. Each request produces zero
//! or more progress replies followed by exactly one terminal reply.

use crossbeam_channel::{Receiver, Sender};
use std::thread::{self, JoinHandle};
use std::time::Instant;

use super::protocol::{RequestEnvelope, RequestId, WorkerEvent, WorkerMessage, WorkerRequest};
use crate::config::WorkerConfig;
use crate::filter::{clip_task_data_and_filter, find_extent};

/// Channel ends of a running worker
pub struct WorkerHandle {
    pub requests: Sender<RequestEnvelope>,
    pub replies: Receiver<WorkerMessage>,
    pub thread: JoinHandle<()>,
}

/// Spawn the worker thread; it exits once every request sender is dropped
pub fn spawn_worker(config: WorkerConfig) -> std::io::Result<WorkerHandle> {
    let (request_tx, request_rx) = crossbeam_channel::unbounded::<RequestEnvelope>();
    let (reply_tx, reply_rx) = crossbeam_channel::unbounded::<WorkerMessage>();

    let thread = thread::Builder::new()
        .name("grid-worker".to_string())
        .spawn(move || run_worker(&config, request_rx, reply_tx))?;

    Ok(WorkerHandle { requests: request_tx, replies: reply_rx, thread })
}

fn run_worker(config: &WorkerConfig, requests: Receiver<RequestEnvelope>, replies: Sender<WorkerMessage>) {
    tracing::debug!("background worker started");
    for envelope in requests.iter() {
        let RequestEnvelope { id, request } = envelope;
        let op = request.operation();
        let start = Instant::now();

        let terminal = handle_request(config, id, request, &replies);
        let failed = matches!(terminal, WorkerEvent::Error { .. });

        tracing::info!(
            request = %id,
            op,
            failed,
            elapsed_ms = start.elapsed().as_secs_f64() * 1000.0,
            "request finished"
        );

        if replies.send(WorkerMessage { id, event: terminal }).is_err() {
            tracing::debug!("reply channel closed, stopping worker");
            break;
        }
    }
    tracing::debug!("background worker stopped");
}

/// Run one request, streaming progress, and return its terminal reply
pub fn handle_request(
    config: &WorkerConfig,
    id: RequestId,
    request: WorkerRequest,
    replies: &Sender<WorkerMessage>,
) -> WorkerEvent {
    match request {
        WorkerRequest::FindExtent { geometries } => match find_extent(&geometries) {
            Ok(extent) => WorkerEvent::FindExtent { extent },
            Err(e) => WorkerEvent::Error { error: e.to_string() },
        },
        WorkerRequest::ClipTaskDataAndFilter { task_grid, geometries } => {
            tracing::debug!(
                request = %id,
                cells = task_grid.len(),
                geometries = geometries.len(),
                "filtering task grid"
            );
            let progress = |progress: f64| {
                let _ = replies.send(WorkerMessage { id, event: WorkerEvent::Progress { progress } });
            };
            match clip_task_data_and_filter(task_grid, &geometries, &config.filter, progress) {
                Ok(outcome) => WorkerEvent::ClipTaskDataAndFilter {
                    task_geometry: outcome.cells,
                    skipped: outcome.skipped,
                },
                Err(e) => WorkerEvent::Error { error: e.to_string() },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{Feature, FeatureCollection, Geometry};

    #[test]
    fn test_worker_replies_in_order() {
        let handle = spawn_worker(WorkerConfig::default()).unwrap();
        let geometries = FeatureCollection::new(vec![Feature::new(Geometry::point(1.0, 2.0))]);
        handle
            .requests
            .send(RequestEnvelope { id: RequestId(1), request: WorkerRequest::FindExtent { geometries } })
            .unwrap();
        handle
            .requests
            .send(RequestEnvelope {
                id: RequestId(2),
                request: WorkerRequest::FindExtent { geometries: FeatureCollection::default() },
            })
            .unwrap();

        let first = handle.replies.recv().unwrap();
        assert_eq!(first.id, RequestId(1));
        assert_eq!(first.event.kind(), "findExtent");

        let second = handle.replies.recv().unwrap();
        assert_eq!(second.id, RequestId(2));
        assert_eq!(second.event.kind(), "error");

        drop(handle.requests);
        handle.thread.join().unwrap();
    }
}
