//! Task grid filtering off the caller's thread
//!
//! Matches contributed map edits (points and polygons) against a grid of
//! task cells, keeps the cells something was contributed to and annotates
//! them with the overlapping geometries. The work runs on a background
//! worker thread reached through [`worker::WorkerClient`].
//!
//! # Example
//! ```ignore
//! let client = WorkerClient::spawn(WorkerConfig::default())?;
//! let outcome = client
//!     .clip_task_data_and_filter(task_grid, geometries)
//!     .wait_with_progress(|p| println!("{:.0}%", p * 100.0))?;
//! println!("{} cells kept", outcome.cells.len());
//! ```

pub mod config;
pub mod error;
pub mod filter;
pub mod geometry;
pub mod logging;
pub mod server;
pub mod worker;

pub use config::{FailurePolicy, FilterOptions, WorkerConfig, DEFAULT_ANNOTATION_KEY};
pub use error::{BridgeError, FilterError, GeometryError, ProtocolError};
pub use filter::{clip_task_data_and_filter, find_extent, FilterOutcome, GridFilter, SkippedCell};
pub use geometry::{Feature, FeatureCollection, Geometry};
pub use worker::{PendingCall, WorkerClient};
