//! Geometry module for task grids and contributed edits
//!
//! # Submodules
//! - `types` - GeoJSON features, collections and geometries
//! - `predicates` - bbox, point-in-polygon and bbox clipping over `geo`
//! - `spatial` - R-tree candidate lookup for contributed geometries

mod types;
mod predicates;
mod spatial;

pub use types::{
    Position,
    Properties,
    PolygonCoordinates,
    Geometry,
    Feature,
    FeatureCollection,
};

pub use predicates::{
    to_coord,
    to_polygon,
    bbox,
    collection_bbox,
    bbox_polygon,
    bbox_clip,
    point_in_polygon,
    PolygonalArea,
};

pub use spatial::{
    IndexedGeometry,
    GeometryIndex,
};
