//! Geometry alignment: intersect annotation parts with chip footprints.
use std::path::Path;

use geo::{Area, BooleanOps, Intersects};
use geo_types::Polygon;

use crate::core::georef::GeoTransform;
use crate::types::{Annotation, ChipAnnotationRow, CoordFrame, YearPair};

/// Geographic polygon covered by a `width` x `height` chip with `transform`.
pub fn chip_footprint(transform: &GeoTransform, width: usize, height: usize) -> Polygon<f64> {
    transform.footprint(width, height)
}

/// All constituent polygons of the annotations recorded for `years`.
pub fn parts_for_years(annotations: &[Annotation], years: YearPair) -> Vec<Polygon<f64>> {
    annotations
        .iter()
        .filter(|a| a.years == years)
        .flat_map(|a| a.geometry.parts())
        .collect()
}

/// Areal pieces of `part` inside `footprint`.
pub fn clip_to_footprint(part: &Polygon<f64>, footprint: &Polygon<f64>) -> Vec<Polygon<f64>> {
    if !part.intersects(footprint) {
        return Vec::new();
    }
    part.intersection(footprint)
        .0
        .into_iter()
        .filter(|p| p.unsigned_area() > 0.0)
        .collect()
}

/// Rows for one chip: one per areal intersection piece, or a single placeholder
/// row with no geometry when nothing intersects.
pub fn align_chip(
    chip_path: &Path,
    footprint: &Polygon<f64>,
    years: YearPair,
    parts: &[Polygon<f64>],
) -> Vec<ChipAnnotationRow> {
    let row = |geometry| ChipAnnotationRow {
        chip_path: chip_path.to_path_buf(),
        years,
        frame: CoordFrame::Geographic,
        geometry,
    };
    let mut rows: Vec<ChipAnnotationRow> = parts
        .iter()
        .flat_map(|part| clip_to_footprint(part, footprint))
        .map(|piece| row(Some(piece)))
        .collect();
    if rows.is_empty() {
        rows.push(row(None));
    }
    rows
}
