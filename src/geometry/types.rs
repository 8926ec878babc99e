//! GeoJSON types for task grids and contributed geometries
//!
//! Polygons are accepted in two shapes: the regular list of rings, and a
//! bare list of positions that some producers emit for line-like edits
//! tagged as polygons. Both serialize back exactly as they came in.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// `[x, y, ...]`
pub type Position = Vec<f64>;

/// Feature property bag, insertion ordered
pub type Properties = IndexMap<String, serde_json::Value>;

/// Polygon coordinates as received
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PolygonCoordinates {
    /// Outer ring followed by holes
    Rings(Vec<Vec<Position>>),
    /// Positions without ring nesting
    Flat(Vec<Position>),
}

impl PolygonCoordinates {
    /// First ring, or the flat position list itself
    pub fn outer_ring(&self) -> &[Position] {
        match self {
            PolygonCoordinates::Rings(rings) => rings.first().map(Vec::as_slice).unwrap_or(&[]),
            PolygonCoordinates::Flat(positions) => positions,
        }
    }

    /// All rings; a flat list counts as a single ring
    pub fn rings(&self) -> Vec<&[Position]> {
        match self {
            PolygonCoordinates::Rings(rings) => rings.iter().map(Vec::as_slice).collect(),
            PolygonCoordinates::Flat(positions) => vec![positions.as_slice()],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Geometry {
    Point { coordinates: Position },
    MultiPoint { coordinates: Vec<Position> },
    LineString { coordinates: Vec<Position> },
    MultiLineString { coordinates: Vec<Vec<Position>> },
    Polygon { coordinates: PolygonCoordinates },
    MultiPolygon { coordinates: Vec<Vec<Vec<Position>>> },
    GeometryCollection { geometries: Vec<Geometry> },
}

impl Geometry {
    /// GeoJSON type name
    pub fn type_name(&self) -> &'static str {
        match self {
            Geometry::Point { .. } => "Point",
            Geometry::MultiPoint { .. } => "MultiPoint",
            Geometry::LineString { .. } => "LineString",
            Geometry::MultiLineString { .. } => "MultiLineString",
            Geometry::Polygon { .. } => "Polygon",
            Geometry::MultiPolygon { .. } => "MultiPolygon",
            Geometry::GeometryCollection { .. } => "GeometryCollection",
        }
    }

    /// Visit every position in document order
    pub fn for_each_position<F: FnMut(&Position)>(&self, f: &mut F) {
        match self {
            Geometry::Point { coordinates } => f(coordinates),
            Geometry::MultiPoint { coordinates } | Geometry::LineString { coordinates } => {
                coordinates.iter().for_each(|p| f(p));
            }
            Geometry::MultiLineString { coordinates } => {
                coordinates.iter().flatten().for_each(|p| f(p));
            }
            Geometry::Polygon { coordinates } => {
                for ring in coordinates.rings() {
                    ring.iter().for_each(|p| f(p));
                }
            }
            Geometry::MultiPolygon { coordinates } => {
                coordinates.iter().flatten().flatten().for_each(|p| f(p));
            }
            Geometry::GeometryCollection { geometries } => {
                for g in geometries {
                    g.for_each_position(f);
                }
            }
        }
    }

    /// True if at least one position is present
    pub fn has_coordinates(&self) -> bool {
        let mut found = false;
        self.for_each_position(&mut |_| found = true);
        found
    }

    pub fn point(x: f64, y: f64) -> Self {
        Geometry::Point { coordinates: vec![x, y] }
    }

    /// Well-formed polygon from a list of rings
    pub fn polygon(rings: Vec<Vec<Position>>) -> Self {
        Geometry::Polygon { coordinates: PolygonCoordinates::Rings(rings) }
    }
}

/// GeoJSON Feature
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename = "Feature")]
pub struct Feature {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bbox: Option<Vec<f64>>,
    pub geometry: Option<Geometry>,
    #[serde(default)]
    pub properties: Option<Properties>,
}

impl Feature {
    pub fn new(geometry: Geometry) -> Self {
        Self {
            id: None,
            bbox: None,
            geometry: Some(geometry),
            properties: Some(Properties::new()),
        }
    }

    pub fn with_property(mut self, key: &str, value: serde_json::Value) -> Self {
        self.set_property(key, value);
        self
    }

    pub fn set_property(&mut self, key: &str, value: serde_json::Value) {
        self.properties
            .get_or_insert_with(Properties::new)
            .insert(key.to_string(), value);
    }

    pub fn property(&self, key: &str) -> Option<&serde_json::Value> {
        self.properties.as_ref().and_then(|p| p.get(key))
    }

    /// Same id and properties, different geometry
    pub fn with_geometry(&self, geometry: Geometry) -> Self {
        Self {
            id: self.id.clone(),
            bbox: None,
            geometry: Some(geometry),
            properties: self.properties.clone(),
        }
    }
}

/// GeoJSON FeatureCollection
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename = "FeatureCollection")]
pub struct FeatureCollection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bbox: Option<Vec<f64>>,
    pub features: Vec<Feature>,
}

impl FeatureCollection {
    pub fn new(features: Vec<Feature>) -> Self {
        Self { bbox: None, features }
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }
}
