//! Stdio session: newline-delimited JSON in, worker replies out
//!
//! Lines that are not valid UTF-8 or JSON are logged and skipped. Requests
//! are forwarded to one background worker. A writer thread relays
//! every worker reply as a JSON line, swapping the internal correlation id for
//! the id the caller used.

use crossbeam_channel::Receiver;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::io::{BufRead, Write};
use std::sync::Arc;
use std::thread;

use super::protocol::{error_codes, IncomingLine, Response};
use crate::config::WorkerConfig;
use crate::error::ProtocolError;
use crate::worker::{spawn_worker, RequestEnvelope, RequestId, WorkerHandle, WorkerMessage, WorkerRequest};

type CallerIds = Arc<Mutex<HashMap<RequestId, Option<serde_json::Value>>>>;

/// Serve requests from `input` until EOF, writing replies to `output`
///
/// Returns the output once every accepted request has been answered.
pub fn serve<R, W>(mut input: R, output: W, config: WorkerConfig) -> anyhow::Result<W>
where
    R: BufRead,
    W: Write + Send + 'static,
{
    let WorkerHandle { requests, replies, thread: worker } = spawn_worker(config)?;
    let output = Arc::new(Mutex::new(output));
    let callers: CallerIds = Arc::new(Mutex::new(HashMap::new()));

    let writer = {
        let output = Arc::clone(&output);
        let callers = Arc::clone(&callers);
        thread::Builder::new()
            .name("grid-worker-writer".to_string())
            .spawn(move || relay_replies(replies, callers, output))?
    };

    let mut buf = Vec::new();
    let mut next_id = 1u64;
    loop {
        buf.clear();
        match input.read_until(b'\n', &mut buf) {
            Ok(0) => break,
            Ok(_) => {}
            Err(e) => {
                tracing::error!("error reading input: {}", e);
                break;
            }
        }
        let line = match std::str::from_utf8(&buf) {
            Ok(line) => line,
            Err(e) => {
                tracing::warn!("skipping input line that is not utf-8: {}", e);
                continue;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let incoming: IncomingLine = match serde_json::from_str(line) {
            Ok(incoming) => incoming,
            Err(e) => {
                tracing::warn!("failed to parse request: {}", e);
                continue;
            }
        };

        let (caller_id, request) = match incoming {
            IncomingLine::Rpc(req) => (req.id, WorkerRequest::from_method(&req.method, req.params)),
            IncomingLine::Positional(values) => (None, WorkerRequest::from_tagged_array(values)),
        };

        let request = match request {
            Ok(request) => request,
            Err(e) => {
                tracing::warn!("rejected request: {}", e);
                let code = match e {
                    ProtocolError::UnknownOperation(_) | ProtocolError::MissingOperation => {
                        error_codes::METHOD_NOT_FOUND
                    }
                    ProtocolError::Arity { .. } | ProtocolError::Payload { .. } => error_codes::INVALID_PARAMS,
                };
                write_line(&*output, &Response::error(caller_id, code, e.to_string()))?;
                continue;
            }
        };

        let id = RequestId(next_id);
        next_id += 1;
        tracing::debug!(request = %id, op = request.operation(), "accepted request");
        callers.lock().insert(id, caller_id);

        if requests.send(RequestEnvelope { id, request }).is_err() {
            let caller_id = callers.lock().remove(&id).flatten();
            write_line(
                &*output,
                &Response::error(caller_id, error_codes::INTERNAL_ERROR, "background worker stopped".to_string()),
            )?;
            break;
        }
    }

    tracing::info!("input closed, waiting for pending requests");
    drop(requests);
    if worker.join().is_err() {
        tracing::error!("background worker panicked");
    }
    if writer.join().is_err() {
        tracing::error!("reply writer panicked");
    }

    match Arc::try_unwrap(output) {
        Ok(output) => Ok(output.into_inner()),
        Err(_) => anyhow::bail!("output still shared after shutdown"),
    }
}

fn relay_replies<W: Write>(replies: Receiver<WorkerMessage>, callers: CallerIds, output: Arc<Mutex<W>>) {
    for WorkerMessage { id, event } in replies.iter() {
        let caller_id = if event.is_terminal() {
            callers.lock().remove(&id).flatten()
        } else {
            callers.lock().get(&id).cloned().flatten()
        };

        let mut value = match serde_json::to_value(&event) {
            Ok(value) => value,
            Err(e) => {
                tracing::error!(request = %id, "failed to encode reply: {}", e);
                continue;
            }
        };
        if let Some(object) = value.as_object_mut() {
            object.insert("id".to_string(), caller_id.unwrap_or(serde_json::Value::Null));
        }
        if let Err(e) = write_line(&*output, &value) {
            tracing::error!("failed to write reply: {}", e);
            break;
        }
    }
}

fn write_line<W: Write, T: serde::Serialize>(output: &Mutex<W>, message: &T) -> anyhow::Result<()> {
    let line = serde_json::to_string(message)?;
    let mut out = output.lock();
    writeln!(out, "{}", line)?;
    out.flush()?;
    Ok(())
}
