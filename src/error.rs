//! Error types shared across the geometry, filter and worker layers

use thiserror::Error;

use crate::geometry::Position;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum GeometryError {
    #[error("invalid position {0:?}: expected at least two finite numbers")]
    InvalidPosition(Position),

    #[error("feature has no geometry")]
    MissingGeometry,

    #[error("task cell must be a Polygon or MultiPolygon, got {0}")]
    UnsupportedCell(&'static str),

    #[error("geometry {0} not supported")]
    UnsupportedClip(&'static str),

    #[error("{kind} clip failed: {reason}")]
    Clip { kind: &'static str, reason: String },
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum FilterError {
    #[error("task cell {index}: {source}")]
    Cell {
        index: usize,
        #[source]
        source: GeometryError,
    },

    #[error("cannot find extent: {0}")]
    Extent(#[from] GeometryError),

    #[error("cannot find extent of a collection without coordinates")]
    EmptyExtent,

    #[error("failed to encode cell annotation: {0}")]
    Annotation(String),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProtocolError {
    #[error("unknown operation '{0}'")]
    UnknownOperation(String),

    #[error("operation '{op}' expects {expected} argument(s), got {got}")]
    Arity { op: String, expected: usize, got: usize },

    #[error("request must be a non-empty array starting with an operation name")]
    MissingOperation,

    #[error("invalid payload for '{op}': {reason}")]
    Payload { op: String, reason: String },
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum BridgeError {
    /// The worker reported an `error` envelope for this call
    #[error("{0}")]
    Worker(String),

    #[error("background worker disconnected")]
    Disconnected,

    #[error("timed out waiting for background worker")]
    Timeout,

    #[error("unexpected '{0}' reply")]
    UnexpectedReply(&'static str),
}
