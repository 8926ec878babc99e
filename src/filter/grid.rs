//! Task grid filtering against contributed geometries
//!
//! Every grid cell is matched against the contributed features; cells with at
//! least one match are annotated with the matches and kept, the rest are
//! dropped. Progress is reported once per cell, in grid order.

use geo::{Coord, Rect};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use std::time::Instant;

use crate::config::{FailurePolicy, FilterOptions};
use crate::error::{FilterError, GeometryError};
use crate::geometry::{
    bbox, bbox_clip, to_coord, Feature, FeatureCollection, Geometry, GeometryIndex, PolygonalArea,
};

/// A polygon whose outer ring has fewer positions than this cannot be closed
/// and is treated as a set of loose points.
pub const DEGENERATE_RING_LEN: usize = 4;

/// A cell dropped under [`FailurePolicy::SkipCell`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedCell {
    pub index: usize,
    pub error: String,
}

/// Result of one filter pass
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FilterOutcome {
    /// Kept cells in grid order, each carrying its annotation
    pub cells: Vec<Feature>,
    /// Cells that failed to evaluate; always empty under `AbortBatch`
    pub skipped: Vec<SkippedCell>,
}

/// How a contributed feature is matched against a cell
#[derive(Debug, Clone)]
enum Matcher {
    Point(Coord<f64>),
    /// Short-ringed polygon, matched if any of its positions is inside
    LoosePoints(Vec<Coord<f64>>),
    Clip,
}

impl Matcher {
    fn classify(feature: &Feature) -> Result<Self, GeometryError> {
        match feature.geometry.as_ref() {
            None => Err(GeometryError::MissingGeometry),
            Some(Geometry::Point { coordinates }) => Ok(Matcher::Point(to_coord(coordinates)?)),
            Some(Geometry::Polygon { coordinates })
                if coordinates.outer_ring().len() < DEGENERATE_RING_LEN =>
            {
                let points = coordinates
                    .outer_ring()
                    .iter()
                    .map(to_coord)
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Matcher::LoosePoints(points))
            }
            Some(_) => Ok(Matcher::Clip),
        }
    }
}

/// Polygonal view of a cell, built on the first point test
///
/// Cells that only meet clipped candidates are never required to be
/// polygonal.
struct CellArea<'g> {
    geometry: &'g Geometry,
    area: OnceLock<Result<PolygonalArea, GeometryError>>,
}

impl<'g> CellArea<'g> {
    fn new(geometry: &'g Geometry) -> Self {
        Self { geometry, area: OnceLock::new() }
    }

    fn contains(&self, coord: Coord<f64>) -> Result<bool, GeometryError> {
        self.area
            .get_or_init(|| PolygonalArea::from_geometry(self.geometry))
            .as_ref()
            .map(|area| area.contains_point(coord))
            .map_err(Clone::clone)
    }
}

/// Filter over one set of contributed geometries, reusable across grids
pub struct GridFilter<'a> {
    geometries: &'a FeatureCollection,
    matchers: Vec<Result<Matcher, GeometryError>>,
    index: Option<GeometryIndex>,
    options: &'a FilterOptions,
}

impl<'a> GridFilter<'a> {
    pub fn new(geometries: &'a FeatureCollection, options: &'a FilterOptions) -> Self {
        let matchers = geometries.features.iter().map(Matcher::classify).collect();
        let index = options
            .use_spatial_index
            .then(|| GeometryIndex::build(geometries));
        Self { geometries, matchers, index, options }
    }

    /// Run the filter over `task_grid`, calling `progress` after every cell
    pub fn run<P: FnMut(f64)>(
        &self,
        task_grid: FeatureCollection,
        mut progress: P,
    ) -> Result<FilterOutcome, FilterError> {
        let start = Instant::now();
        let total = task_grid.len();
        let mut outcome = FilterOutcome::default();

        for (index, mut cell) in task_grid.features.into_iter().enumerate() {
            let matches = match self.match_cell(&cell) {
                Ok(matches) => matches,
                Err(source) => match self.options.failure_policy {
                    FailurePolicy::AbortBatch => {
                        tracing::warn!(cell = index, error = %source, "grid filter aborted");
                        return Err(FilterError::Cell { index, source });
                    }
                    FailurePolicy::SkipCell => {
                        tracing::warn!(cell = index, error = %source, "skipping task cell");
                        outcome.skipped.push(SkippedCell { index, error: source.to_string() });
                        progress((index + 1) as f64 / total as f64);
                        continue;
                    }
                },
            };

            progress((index + 1) as f64 / total as f64);

            if matches.is_empty() {
                continue;
            }
            let annotation = serde_json::to_string(&FeatureCollection::new(matches))
                .map_err(|e| FilterError::Annotation(e.to_string()))?;
            cell.set_property(&self.options.annotation_key, serde_json::Value::String(annotation));
            outcome.cells.push(cell);
        }

        tracing::debug!(
            cells = total,
            kept = outcome.cells.len(),
            skipped = outcome.skipped.len(),
            geometries = self.geometries.len(),
            elapsed_ms = start.elapsed().as_secs_f64() * 1000.0,
            "grid filter completed"
        );
        Ok(outcome)
    }

    /// Contributed features matching one cell, in contributed order
    fn match_cell(&self, cell: &Feature) -> Result<Vec<Feature>, GeometryError> {
        let geometry = cell.geometry.as_ref().ok_or(GeometryError::MissingGeometry)?;
        let rect = match bbox(geometry)? {
            Some(rect) => rect,
            None => return Ok(Vec::new()),
        };
        let area = CellArea::new(geometry);

        let candidates: Vec<usize> = match &self.index {
            Some(index) => index.candidates(&rect),
            None => (0..self.matchers.len()).collect(),
        };

        let results: Vec<Result<Option<Feature>, GeometryError>> =
            if candidates.len() >= self.options.parallel_threshold {
                candidates
                    .par_iter()
                    .map(|&i| self.evaluate(i, &area, &rect))
                    .collect()
            } else {
                candidates
                    .iter()
                    .map(|&i| self.evaluate(i, &area, &rect))
                    .collect()
            };

        let mut matches = Vec::new();
        for result in results {
            if let Some(feature) = result? {
                matches.push(feature);
            }
        }
        Ok(matches)
    }

    fn evaluate(
        &self,
        index: usize,
        area: &CellArea<'_>,
        rect: &Rect<f64>,
    ) -> Result<Option<Feature>, GeometryError> {
        let feature = &self.geometries.features[index];
        let matcher = self.matchers[index].as_ref().map_err(Clone::clone)?;
        match matcher {
            Matcher::Point(coord) => Ok(area.contains(*coord)?.then(|| feature.clone())),
            Matcher::LoosePoints(points) => {
                for coord in points {
                    if area.contains(*coord)? {
                        return Ok(Some(feature.clone()));
                    }
                }
                Ok(None)
            }
            Matcher::Clip => {
                let geometry = feature.geometry.as_ref().ok_or(GeometryError::MissingGeometry)?;
                let clipped = bbox_clip(geometry, rect)?;
                Ok(clipped.has_coordinates().then(|| feature.with_geometry(clipped)))
            }
        }
    }
}

/// Filter `task_grid` against `geometries` in one call
pub fn clip_task_data_and_filter<P: FnMut(f64)>(
    task_grid: FeatureCollection,
    geometries: &FeatureCollection,
    options: &FilterOptions,
    progress: P,
) -> Result<FilterOutcome, FilterError> {
    GridFilter::new(geometries, options).run(task_grid, progress)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn square(x0: f64, y0: f64, size: f64) -> Geometry {
        Geometry::polygon(vec![vec![
            vec![x0, y0],
            vec![x0 + size, y0],
            vec![x0 + size, y0 + size],
            vec![x0, y0 + size],
            vec![x0, y0],
        ]])
    }

    fn annotation(cell: &Feature) -> FeatureCollection {
        let raw = cell.property("geometries").and_then(|v| v.as_str()).expect("annotation missing");
        serde_json::from_str(raw).expect("annotation is not a feature collection")
    }

    #[test]
    fn test_point_inside_keeps_cell() {
        let grid = FeatureCollection::new(vec![Feature::new(square(0.0, 0.0, 1.0))]);
        let point = Feature::new(Geometry::point(0.5, 0.5)).with_property("id", json!(1));
        let geometries = FeatureCollection::new(vec![point.clone()]);

        let outcome = clip_task_data_and_filter(grid, &geometries, &FilterOptions::default(), |_| {}).unwrap();
        assert_eq!(outcome.cells.len(), 1);
        assert_eq!(annotation(&outcome.cells[0]).features, vec![point]);
    }

    #[test]
    fn test_point_outside_drops_cell() {
        let grid = FeatureCollection::new(vec![Feature::new(square(0.0, 0.0, 1.0))]);
        let geometries = FeatureCollection::new(vec![Feature::new(Geometry::point(2.0, 2.0))]);

        let outcome = clip_task_data_and_filter(grid, &geometries, &FilterOptions::default(), |_| {}).unwrap();
        assert!(outcome.cells.is_empty());
    }

    #[test]
    fn test_index_and_scan_agree() {
        let grid = FeatureCollection::new(
            (0..4).map(|i| Feature::new(square(i as f64, 0.0, 1.0))).collect(),
        );
        let geometries = FeatureCollection::new(vec![
            Feature::new(Geometry::point(0.5, 0.5)),
            Feature::new(square(1.5, 0.25, 1.0)),
            Feature::new(Geometry::point(9.0, 9.0)),
        ]);

        let indexed = clip_task_data_and_filter(grid.clone(), &geometries, &FilterOptions::default(), |_| {}).unwrap();
        let scan_options = FilterOptions { use_spatial_index: false, ..FilterOptions::default() };
        let scanned = clip_task_data_and_filter(grid, &geometries, &scan_options, |_| {}).unwrap();
        assert_eq!(indexed, scanned);
        assert_eq!(indexed.cells.len(), 3);
    }

    #[test]
    fn test_parallel_evaluation_keeps_order() {
        let grid = FeatureCollection::new(vec![Feature::new(square(0.0, 0.0, 10.0))]);
        let geometries = FeatureCollection::new(
            (0..50)
                .map(|i| Feature::new(Geometry::point(i as f64 / 10.0, 1.0)).with_property("n", json!(i)))
                .collect(),
        );
        let options = FilterOptions { parallel_threshold: 1, ..FilterOptions::default() };
        let outcome = clip_task_data_and_filter(grid, &geometries, &options, |_| {}).unwrap();
        let order: Vec<i64> = annotation(&outcome.cells[0])
            .features
            .iter()
            .map(|f| f.property("n").and_then(|v| v.as_i64()).unwrap())
            .collect();
        assert_eq!(order, (0..50).collect::<Vec<i64>>());
    }

    #[test]
    fn test_custom_annotation_key() {
        let grid = FeatureCollection::new(vec![Feature::new(square(0.0, 0.0, 1.0))]);
        let geometries = FeatureCollection::new(vec![Feature::new(Geometry::point(0.5, 0.5))]);
        let options = FilterOptions { annotation_key: "overlaps".to_string(), ..FilterOptions::default() };
        let outcome = clip_task_data_and_filter(grid, &geometries, &options, |_| {}).unwrap();
        assert!(outcome.cells[0].property("overlaps").is_some());
        assert!(outcome.cells[0].property("geometries").is_none());
    }

    #[test]
    fn test_non_polygonal_cell_fails_only_on_point_test() {
        let line_cell = || Feature::new(Geometry::LineString { coordinates: vec![vec![0.0, 0.0], vec![1.0, 1.0]] });

        let empty = FeatureCollection::default();
        let outcome = clip_task_data_and_filter(
            FeatureCollection::new(vec![line_cell()]),
            &empty,
            &FilterOptions::default(),
            |_| {},
        )
        .unwrap();
        assert!(outcome.cells.is_empty(), "a cell with no candidates has nothing to match");

        let lines = FeatureCollection::new(vec![Feature::new(Geometry::LineString {
            coordinates: vec![vec![0.5, -1.0], vec![0.5, 2.0]],
        })]);
        let outcome = clip_task_data_and_filter(
            FeatureCollection::new(vec![line_cell()]),
            &lines,
            &FilterOptions::default(),
            |_| {},
        )
        .unwrap();
        assert_eq!(outcome.cells.len(), 1, "clipping only needs the cell bbox");

        let points = FeatureCollection::new(vec![Feature::new(Geometry::point(0.5, 0.5))]);
        let err = clip_task_data_and_filter(
            FeatureCollection::new(vec![line_cell()]),
            &points,
            &FilterOptions::default(),
            |_| {},
        )
        .unwrap_err();
        assert_eq!(err, FilterError::Cell { index: 0, source: GeometryError::UnsupportedCell("LineString") });
    }

    #[test]
    fn test_null_cell_geometry_is_a_cell_error() {
        let mut cell = Feature::new(square(0.0, 0.0, 1.0));
        cell.geometry = None;
        let grid = FeatureCollection::new(vec![cell]);
        let geometries = FeatureCollection::new(vec![Feature::new(Geometry::point(0.5, 0.5))]);
        let err = clip_task_data_and_filter(grid, &geometries, &FilterOptions::default(), |_| {}).unwrap_err();
        assert_eq!(err, FilterError::Cell { index: 0, source: GeometryError::MissingGeometry });
    }
}
