//! Extent of a geometry collection

use crate::error::FilterError;
use crate::geometry::{bbox_polygon, collection_bbox, Feature, FeatureCollection};

/// Bounding polygon of every feature in `geometries`
///
/// Fails when the collection carries no coordinates or an invalid position.
pub fn find_extent(geometries: &FeatureCollection) -> Result<Feature, FilterError> {
    let rect = collection_bbox(geometries)?.ok_or(FilterError::EmptyExtent)?;
    Ok(Feature::new(bbox_polygon(&rect)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Geometry;

    #[test]
    fn test_empty_collection_has_no_extent() {
        let err = find_extent(&FeatureCollection::default()).unwrap_err();
        assert_eq!(err, FilterError::EmptyExtent);
    }

    #[test]
    fn test_invalid_position_fails() {
        let fc = FeatureCollection::new(vec![Feature::new(Geometry::Point { coordinates: vec![f64::NAN, 1.0] })]);
        assert!(matches!(find_extent(&fc), Err(FilterError::Extent(_))));
    }
}
