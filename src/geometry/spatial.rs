//! Spatial indexing of contributed geometries
//!
//! Builds an R-tree over the envelopes of contributed features so each grid
//! cell only evaluates the features whose envelope overlaps it. Features the
//! index cannot place, or whose type cannot be matched at all, are kept aside
//! and offered to every cell so their errors surface on the first one.

use rstar::{RTree, RTreeObject, AABB};
use geo::Rect;

use super::predicates::bbox;
use super::types::{FeatureCollection, Geometry};

/// Envelope of one contributed feature, keyed by its position in the input
#[derive(Clone, Debug)]
pub struct IndexedGeometry {
    pub index: usize,
    pub bounds: AABB<[f64; 2]>,
}

impl IndexedGeometry {
    pub fn new(index: usize, rect: &Rect<f64>) -> Self {
        let bounds = AABB::from_corners(
            [rect.min().x, rect.min().y],
            [rect.max().x, rect.max().y],
        );
        Self { index, bounds }
    }
}

impl RTreeObject for IndexedGeometry {
    type Envelope = AABB<[f64; 2]>;
    fn envelope(&self) -> Self::Envelope {
        self.bounds
    }
}

/// Types a grid cell can be matched against
fn is_matchable(geometry: &Geometry) -> bool {
    matches!(
        geometry,
        Geometry::Point { .. }
            | Geometry::LineString { .. }
            | Geometry::MultiLineString { .. }
            | Geometry::Polygon { .. }
            | Geometry::MultiPolygon { .. }
    )
}

/// Candidate lookup for contributed geometries
pub struct GeometryIndex {
    tree: RTree<IndexedGeometry>,
    /// Features without a usable envelope or of an unmatchable type
    always: Vec<usize>,
    total: usize,
}

impl GeometryIndex {
    pub fn build(geometries: &FeatureCollection) -> Self {
        let mut entries = Vec::with_capacity(geometries.len());
        let mut always = Vec::new();
        for (index, feature) in geometries.features.iter().enumerate() {
            let rect = match feature.geometry.as_ref() {
                Some(geometry) if is_matchable(geometry) => bbox(geometry).ok().flatten(),
                _ => None,
            };
            match rect {
                Some(rect) => entries.push(IndexedGeometry::new(index, &rect)),
                None => always.push(index),
            }
        }
        Self {
            tree: RTree::bulk_load(entries),
            always,
            total: geometries.len(),
        }
    }

    /// Number of features that were indexed by envelope
    pub fn indexed_len(&self) -> usize {
        self.tree.size()
    }

    pub fn total(&self) -> usize {
        self.total
    }

    /// Indices of features that may intersect `rect`, ascending
    pub fn candidates(&self, rect: &Rect<f64>) -> Vec<usize> {
        let query = AABB::from_corners(
            [rect.min().x, rect.min().y],
            [rect.max().x, rect.max().y],
        );
        let mut found: Vec<usize> = self
            .tree
            .locate_in_envelope_intersecting(&query)
            .map(|g| g.index)
            .chain(self.always.iter().copied())
            .collect();
        found.sort_unstable();
        found
    }
}
