//! Background worker and its client
//!
//! # Module Structure
//! - `protocol` - request/reply envelopes and the positional request form
//! - `background` - the worker thread loop
//! - `client` - per-call handles routed by request id

pub mod protocol;
pub mod background;
pub mod client;

pub use protocol::{
    RequestId, RequestEnvelope, WorkerRequest, WorkerEvent, WorkerMessage,
    OP_FIND_EXTENT, OP_CLIP_TASK_DATA_AND_FILTER,
};
pub use background::{spawn_worker, handle_request, WorkerHandle};
pub use client::{WorkerClient, PendingCall, FromWorkerEvent};
