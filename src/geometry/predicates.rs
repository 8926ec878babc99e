//! Geometry predicates backed by the `geo` crate
//!
//! Converts GeoJSON geometries into `geo` types and exposes the small set of
//! operations the grid filter needs: bounding boxes, bbox polygons,
//! point-in-polygon and bbox clipping.

use geo::{BooleanOps, Coord, Intersects, LineString, MultiLineString, MultiPolygon, Polygon, Rect};
use std::cell::Cell;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Once;

use super::types::{FeatureCollection, Geometry, PolygonCoordinates, Position};
use crate::error::GeometryError;

/// Convert a GeoJSON position into a `geo` coordinate
pub fn to_coord(position: &Position) -> Result<Coord<f64>, GeometryError> {
    match position.as_slice() {
        [x, y, ..] if x.is_finite() && y.is_finite() => Ok(Coord { x: *x, y: *y }),
        _ => Err(GeometryError::InvalidPosition(position.clone())),
    }
}

fn to_line_string(positions: &[Position]) -> Result<LineString<f64>, GeometryError> {
    positions
        .iter()
        .map(to_coord)
        .collect::<Result<Vec<_>, _>>()
        .map(LineString::new)
}

fn rings_to_polygon(rings: &[&[Position]]) -> Result<Polygon<f64>, GeometryError> {
    let mut rings = rings.iter();
    let exterior = match rings.next() {
        Some(ring) => to_line_string(ring)?,
        None => LineString::new(vec![]),
    };
    let interiors = rings
        .map(|ring| to_line_string(ring))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Polygon::new(exterior, interiors))
}

/// Convert Polygon coordinates, flat or nested, into a `geo` polygon
pub fn to_polygon(coordinates: &PolygonCoordinates) -> Result<Polygon<f64>, GeometryError> {
    rings_to_polygon(&coordinates.rings())
}

fn to_multi_polygon(polygons: &[Vec<Vec<Position>>]) -> Result<MultiPolygon<f64>, GeometryError> {
    polygons
        .iter()
        .map(|rings| {
            let rings: Vec<&[Position]> = rings.iter().map(Vec::as_slice).collect();
            rings_to_polygon(&rings)
        })
        .collect::<Result<Vec<_>, _>>()
        .map(MultiPolygon::new)
}

fn from_coord(coord: Coord<f64>) -> Position {
    vec![coord.x, coord.y]
}

fn from_line_string(line: &LineString<f64>) -> Vec<Position> {
    line.0.iter().copied().map(from_coord).collect()
}

fn from_polygon(polygon: &Polygon<f64>) -> Vec<Vec<Position>> {
    std::iter::once(polygon.exterior())
        .chain(polygon.interiors())
        .map(from_line_string)
        .collect()
}

/// Bounding box of every position in the geometry
pub fn bbox(geometry: &Geometry) -> Result<Option<Rect<f64>>, GeometryError> {
    let mut bounds: Option<(Coord<f64>, Coord<f64>)> = None;
    let mut invalid: Option<GeometryError> = None;
    geometry.for_each_position(&mut |position| {
        if invalid.is_some() {
            return;
        }
        match to_coord(position) {
            Ok(c) => {
                bounds = Some(match bounds {
                    Some((min, max)) => (
                        Coord { x: min.x.min(c.x), y: min.y.min(c.y) },
                        Coord { x: max.x.max(c.x), y: max.y.max(c.y) },
                    ),
                    None => (c, c),
                });
            }
            Err(e) => invalid = Some(e),
        }
    });
    match invalid {
        Some(e) => Err(e),
        None => Ok(bounds.map(|(min, max)| Rect::new(min, max))),
    }
}

/// Bounding box over all features of a collection; `None` if it has no positions
pub fn collection_bbox(collection: &FeatureCollection) -> Result<Option<Rect<f64>>, GeometryError> {
    let mut total: Option<Rect<f64>> = None;
    for geometry in collection.features.iter().filter_map(|f| f.geometry.as_ref()) {
        if let Some(rect) = bbox(geometry)? {
            total = Some(match total {
                Some(t) => Rect::new(
                    Coord { x: t.min().x.min(rect.min().x), y: t.min().y.min(rect.min().y) },
                    Coord { x: t.max().x.max(rect.max().x), y: t.max().y.max(rect.max().y) },
                ),
                None => rect,
            });
        }
    }
    Ok(total)
}

/// Polygon covering `rect`, ring starting at the lower-left corner
pub fn bbox_polygon(rect: &Rect<f64>) -> Geometry {
    let (min, max) = (rect.min(), rect.max());
    Geometry::polygon(vec![vec![
        vec![min.x, min.y],
        vec![max.x, min.y],
        vec![max.x, max.y],
        vec![min.x, max.y],
        vec![min.x, min.y],
    ]])
}

/// Polygonal area a point can be tested against
#[derive(Debug, Clone)]
pub enum PolygonalArea {
    Polygon(Polygon<f64>),
    MultiPolygon(MultiPolygon<f64>),
}

impl PolygonalArea {
    /// Build from a grid cell geometry; only polygonal cells are accepted
    pub fn from_geometry(geometry: &Geometry) -> Result<Self, GeometryError> {
        match geometry {
            Geometry::Polygon { coordinates } => Ok(PolygonalArea::Polygon(to_polygon(coordinates)?)),
            Geometry::MultiPolygon { coordinates } => {
                Ok(PolygonalArea::MultiPolygon(to_multi_polygon(coordinates)?))
            }
            other => Err(GeometryError::UnsupportedCell(other.type_name())),
        }
    }

    /// Point-in-polygon, boundary inclusive
    pub fn contains_point(&self, coord: Coord<f64>) -> bool {
        match self {
            PolygonalArea::Polygon(p) => p.intersects(&coord),
            PolygonalArea::MultiPolygon(mp) => mp.intersects(&coord),
        }
    }
}

/// Point-in-polygon test of a single position against a cell geometry
pub fn point_in_polygon(position: &Position, cell: &Geometry) -> Result<bool, GeometryError> {
    let coord = to_coord(position)?;
    Ok(PolygonalArea::from_geometry(cell)?.contains_point(coord))
}

thread_local! {
    static IN_CLIP: Cell<bool> = Cell::new(false);
}

static QUIET_CLIP_PANICS: Once = Once::new();

/// Keep the panic hook quiet for clip panics that are caught and reported
fn install_clip_panic_hook() {
    QUIET_CLIP_PANICS.call_once(|| {
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            if !IN_CLIP.with(Cell::get) {
                previous(info);
            }
        }));
    });
}

fn guarded<T>(kind: &'static str, op: impl FnOnce() -> T) -> Result<T, GeometryError> {
    install_clip_panic_hook();
    let was_clipping = IN_CLIP.with(|flag| flag.replace(true));
    let result = panic::catch_unwind(AssertUnwindSafe(op));
    IN_CLIP.with(|flag| flag.set(was_clipping));

    result.map_err(|payload| {
        let reason = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown failure".to_string());
        tracing::warn!(kind, %reason, "clip panicked");
        GeometryError::Clip { kind, reason }
    })
}

fn clip_lines(lines: MultiLineString<f64>, rect: &Rect<f64>) -> Result<MultiLineString<f64>, GeometryError> {
    let window = rect.to_polygon();
    guarded("line", || window.clip(&lines, false))
}

fn clip_polygons(polygons: MultiPolygon<f64>, rect: &Rect<f64>) -> Result<MultiPolygon<f64>, GeometryError> {
    let window = MultiPolygon::new(vec![rect.to_polygon()]);
    guarded("polygon", || polygons.intersection(&window))
}

/// Clip a geometry to a bounding box
///
/// Lines are cut at the box edges, polygons are intersected with it. A
/// single resulting part keeps the input type, several parts promote to the
/// multi type, and no parts leave the input type with empty coordinates.
pub fn bbox_clip(geometry: &Geometry, rect: &Rect<f64>) -> Result<Geometry, GeometryError> {
    match geometry {
        Geometry::LineString { coordinates } => {
            let clipped = clip_lines(MultiLineString::new(vec![to_line_string(coordinates)?]), rect)?;
            Ok(lines_to_geometry(clipped))
        }
        Geometry::MultiLineString { coordinates } => {
            let lines = coordinates
                .iter()
                .map(|l| to_line_string(l))
                .collect::<Result<Vec<_>, _>>()?;
            let clipped = clip_lines(MultiLineString::new(lines), rect)?;
            Ok(Geometry::MultiLineString {
                coordinates: clipped.0.iter().map(from_line_string).collect(),
            })
        }
        Geometry::Polygon { coordinates } => {
            let clipped = clip_polygons(MultiPolygon::new(vec![to_polygon(coordinates)?]), rect)?;
            Ok(polygons_to_geometry(clipped))
        }
        Geometry::MultiPolygon { coordinates } => {
            let clipped = clip_polygons(to_multi_polygon(coordinates)?, rect)?;
            Ok(Geometry::MultiPolygon {
                coordinates: clipped.0.iter().map(from_polygon).collect(),
            })
        }
        other => Err(GeometryError::UnsupportedClip(other.type_name())),
    }
}

fn lines_to_geometry(lines: MultiLineString<f64>) -> Geometry {
    match lines.0.as_slice() {
        [] => Geometry::LineString { coordinates: vec![] },
        [single] => Geometry::LineString { coordinates: from_line_string(single) },
        many => Geometry::MultiLineString { coordinates: many.iter().map(from_line_string).collect() },
    }
}

fn polygons_to_geometry(polygons: MultiPolygon<f64>) -> Geometry {
    match polygons.0.as_slice() {
        [] => Geometry::polygon(vec![]),
        [single] => Geometry::polygon(from_polygon(single)),
        many => Geometry::MultiPolygon { coordinates: many.iter().map(from_polygon).collect() },
    }
}
