//! Message protocol between a client and its background worker
//!
//! Requests carry a correlation id so replies can be routed back to the call
//! that issued them. Replies are a tagged union serialized flat:
//! `{ "id": 3, "type": "progress", "progress": 0.5 }`.

use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;
use crate::filter::SkippedCell;
use crate::geometry::{Feature, FeatureCollection};

pub const OP_FIND_EXTENT: &str = "findExtent";
pub const OP_CLIP_TASK_DATA_AND_FILTER: &str = "clipTaskDataAndFilter";

/// Correlation id of one call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(pub u64);

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Operation to run in the background worker
#[derive(Debug, Clone, PartialEq)]
pub enum WorkerRequest {
    FindExtent {
        geometries: FeatureCollection,
    },
    ClipTaskDataAndFilter {
        task_grid: FeatureCollection,
        geometries: FeatureCollection,
    },
}

impl WorkerRequest {
    pub fn operation(&self) -> &'static str {
        match self {
            WorkerRequest::FindExtent { .. } => OP_FIND_EXTENT,
            WorkerRequest::ClipTaskDataAndFilter { .. } => OP_CLIP_TASK_DATA_AND_FILTER,
        }
    }

    /// Build a request from a method name and a JSON params object
    pub fn from_method(method: &str, params: Option<serde_json::Value>) -> Result<Self, ProtocolError> {
        #[derive(Deserialize)]
        struct FindExtentParams {
            geometries: FeatureCollection,
        }

        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct ClipParams {
            task_grid: FeatureCollection,
            geometries: FeatureCollection,
        }

        let params = params.unwrap_or(serde_json::Value::Null);
        match method {
            OP_FIND_EXTENT => {
                let p: FindExtentParams = decode(method, params)?;
                Ok(WorkerRequest::FindExtent { geometries: p.geometries })
            }
            OP_CLIP_TASK_DATA_AND_FILTER => {
                let p: ClipParams = decode(method, params)?;
                Ok(WorkerRequest::ClipTaskDataAndFilter {
                    task_grid: p.task_grid,
                    geometries: p.geometries,
                })
            }
            other => Err(ProtocolError::UnknownOperation(other.to_string())),
        }
    }

    /// Parse the positional form `["findExtent", fc]` or
    /// `["clipTaskDataAndFilter", taskGrid, fc]`
    pub fn from_tagged_array(values: Vec<serde_json::Value>) -> Result<Self, ProtocolError> {
        let mut values = values.into_iter();
        let op = match values.next() {
            Some(serde_json::Value::String(op)) => op,
            _ => return Err(ProtocolError::MissingOperation),
        };
        let args: Vec<serde_json::Value> = values.collect();
        let arity = match op.as_str() {
            OP_FIND_EXTENT => Some(1),
            OP_CLIP_TASK_DATA_AND_FILTER => Some(2),
            _ => None,
        };
        let Some(expected) = arity else {
            return Err(ProtocolError::UnknownOperation(op));
        };
        if args.len() != expected {
            return Err(ProtocolError::Arity { op, expected, got: args.len() });
        }

        let mut args = args.into_iter();
        match (op.as_str(), args.next(), args.next()) {
            (OP_FIND_EXTENT, Some(geometries), None) => Ok(WorkerRequest::FindExtent {
                geometries: decode(&op, geometries)?,
            }),
            (OP_CLIP_TASK_DATA_AND_FILTER, Some(task_grid), Some(geometries)) => {
                Ok(WorkerRequest::ClipTaskDataAndFilter {
                    task_grid: decode(&op, task_grid)?,
                    geometries: decode(&op, geometries)?,
                })
            }
            _ => Err(ProtocolError::Arity { op: op.clone(), expected, got: 0 }),
        }
    }
}

fn decode<T: serde::de::DeserializeOwned>(op: &str, value: serde_json::Value) -> Result<T, ProtocolError> {
    serde_json::from_value(value).map_err(|e| ProtocolError::Payload {
        op: op.to_string(),
        reason: e.to_string(),
    })
}

/// A request tagged with its correlation id
#[derive(Debug, Clone)]
pub struct RequestEnvelope {
    pub id: RequestId,
    pub request: WorkerRequest,
}

/// Reply variants sent back by the worker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum WorkerEvent {
    FindExtent {
        extent: Feature,
    },
    Progress {
        progress: f64,
    },
    #[serde(rename_all = "camelCase")]
    ClipTaskDataAndFilter {
        task_geometry: Vec<Feature>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        skipped: Vec<SkippedCell>,
    },
    Error {
        error: String,
    },
}

impl WorkerEvent {
    /// Terminal events settle the call they belong to
    pub fn is_terminal(&self) -> bool {
        !matches!(self, WorkerEvent::Progress { .. })
    }

    pub fn kind(&self) -> &'static str {
        match self {
            WorkerEvent::FindExtent { .. } => OP_FIND_EXTENT,
            WorkerEvent::Progress { .. } => "progress",
            WorkerEvent::ClipTaskDataAndFilter { .. } => OP_CLIP_TASK_DATA_AND_FILTER,
            WorkerEvent::Error { .. } => "error",
        }
    }
}

/// Reply routed to the call with the same id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerMessage {
    pub id: RequestId,
    #[serde(flatten)]
    pub event: WorkerEvent,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn empty_fc() -> serde_json::Value {
        json!({"type": "FeatureCollection", "features": []})
    }

    #[test]
    fn test_progress_message_shape() {
        let message = WorkerMessage { id: RequestId(3), event: WorkerEvent::Progress { progress: 0.5 } };
        assert_eq!(
            serde_json::to_value(&message).unwrap(),
            json!({"id": 3, "type": "progress", "progress": 0.5})
        );
    }

    #[test]
    fn test_clip_result_shape_omits_empty_skipped() {
        let event = WorkerEvent::ClipTaskDataAndFilter { task_geometry: vec![], skipped: vec![] };
        assert_eq!(
            serde_json::to_value(&event).unwrap(),
            json!({"type": "clipTaskDataAndFilter", "taskGeometry": []})
        );
    }

    #[test]
    fn test_error_message_parses() {
        let message: WorkerMessage =
            serde_json::from_value(json!({"id": 9, "type": "error", "error": "boom"})).unwrap();
        assert_eq!(message.id, RequestId(9));
        assert_eq!(message.event, WorkerEvent::Error { error: "boom".to_string() });
        assert!(message.event.is_terminal());
    }

    #[test]
    fn test_from_method_clip() {
        let request = WorkerRequest::from_method(
            "clipTaskDataAndFilter",
            Some(json!({"taskGrid": empty_fc(), "geometries": empty_fc()})),
        )
        .unwrap();
        assert_eq!(request.operation(), OP_CLIP_TASK_DATA_AND_FILTER);
    }

    #[test]
    fn test_from_method_missing_params() {
        let err = WorkerRequest::from_method("findExtent", None).unwrap_err();
        assert!(matches!(err, ProtocolError::Payload { .. }));
    }

    #[test]
    fn test_tagged_array_forms() {
        let request = WorkerRequest::from_tagged_array(vec![json!("findExtent"), empty_fc()]).unwrap();
        assert_eq!(request.operation(), OP_FIND_EXTENT);

        let err = WorkerRequest::from_tagged_array(vec![json!("clipTaskDataAndFilter"), empty_fc()]).unwrap_err();
        assert_eq!(
            err,
            ProtocolError::Arity { op: "clipTaskDataAndFilter".to_string(), expected: 2, got: 1 }
        );

        let err = WorkerRequest::from_tagged_array(vec![json!("simplify"), empty_fc()]).unwrap_err();
        assert_eq!(err, ProtocolError::UnknownOperation("simplify".to_string()));

        let err = WorkerRequest::from_tagged_array(vec![]).unwrap_err();
        assert_eq!(err, ProtocolError::MissingOperation);
    }
}
