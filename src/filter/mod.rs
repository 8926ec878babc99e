//! Grid filtering and extent finding
//!
//! # Submodules
//! - `grid` - per-cell matching of contributed geometries against a task grid
//! - `extent` - bounding polygon of a geometry collection

mod grid;
mod extent;

pub use grid::{
    clip_task_data_and_filter,
    GridFilter,
    FilterOutcome,
    SkippedCell,
    DEGENERATE_RING_LEN,
};

pub use extent::find_extent;
