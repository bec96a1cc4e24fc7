//! Label encoding for chip annotation rows: object classes, bounding boxes and
//! exterior-ring strings.
use geo::{Area, BoundingRect};
use geo_types::Polygon;

use crate::error::{Error, Result};
use crate::types::{BBox, ChipAnnotationRow, ClassLabel};

/// Assigns an object class to an annotation row.
pub trait ClassEncoder {
    fn encode(&self, row: &ChipAnnotationRow) -> ClassLabel;
}

impl<F> ClassEncoder for F
where
    F: Fn(&ChipAnnotationRow) -> ClassLabel,
{
    fn encode(&self, row: &ChipAnnotationRow) -> ClassLabel {
        self(row)
    }
}

/// Geometry with area above one square unit is a treatment, anything else
/// (including the empty placeholder) is background.
#[derive(Debug, Clone, Copy, Default)]
pub struct TreatmentEncoder;

impl TreatmentEncoder {
    pub fn treatment() -> ClassLabel {
        ClassLabel::new(0, "Treatment")
    }

    pub fn background() -> ClassLabel {
        ClassLabel::new(-1, "Background")
    }
}

impl ClassEncoder for TreatmentEncoder {
    fn encode(&self, row: &ChipAnnotationRow) -> ClassLabel {
        match &row.geometry {
            Some(p) if !p.exterior().0.is_empty() && p.unsigned_area() > 1.0 => Self::treatment(),
            _ => Self::background(),
        }
    }
}

/// Axis-aligned bounding box of a polygon; `None` for an empty polygon.
pub fn polygon_bbox(polygon: &Polygon<f64>) -> Option<BBox> {
    let rect = polygon.bounding_rect()?;
    Some(BBox {
        x: rect.min().x,
        y: rect.min().y,
        width: rect.width(),
        height: rect.height(),
    })
}

/// Exterior ring as `"x y x y ..."`.
pub fn stringify_ring(polygon: &Polygon<f64>) -> String {
    polygon
        .exterior()
        .coords()
        .map(|c| format!("{} {}", c.x, c.y))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Bounding box of a flat `x y x y ...` segmentation outline in pixel space.
///
/// Repeated vertices are harmless. Negative bounds are rejected.
pub fn segment_to_bbox(points: &[f64]) -> Result<BBox> {
    if points.len() < 2 || points.len() % 2 != 0 {
        return Err(Error::InvalidGeometry(format!(
            "segment needs an even number of values, got {}",
            points.len()
        )));
    }
    let mut xmin = f64::INFINITY;
    let mut ymin = f64::INFINITY;
    let mut xmax = f64::NEG_INFINITY;
    let mut ymax = f64::NEG_INFINITY;
    for xy in points.chunks_exact(2) {
        xmin = xmin.min(xy[0]);
        xmax = xmax.max(xy[0]);
        ymin = ymin.min(xy[1]);
        ymax = ymax.max(xy[1]);
    }
    let bbox = BBox {
        x: xmin,
        y: ymin,
        width: xmax - xmin,
        height: ymax - ymin,
    };
    if bbox.x < 0.0 || bbox.y < 0.0 {
        return Err(Error::InvalidGeometry(format!(
            "segment bounds cannot be negative: {bbox:?}"
        )));
    }
    Ok(bbox)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CoordFrame, YearPair};
    use geo_types::LineString;
    use std::path::PathBuf;

    fn row(geometry: Option<Polygon<f64>>) -> ChipAnnotationRow {
        ChipAnnotationRow {
            chip_path: PathBuf::from("chip.tif"),
            years: YearPair::new(2015, 2019),
            frame: CoordFrame::Pixel,
            geometry,
        }
    }

    fn square(size: f64) -> Polygon<f64> {
        Polygon::new(
            LineString::from(vec![(2.0, 3.0), (2.0 + size, 3.0), (2.0 + size, 3.0 + size), (2.0, 3.0 + size)]),
            vec![],
        )
    }

    #[test]
    fn test_treatment_encoder() {
        let enc = TreatmentEncoder;
        assert_eq!(enc.encode(&row(Some(square(4.0)))), TreatmentEncoder::treatment());
        assert_eq!(enc.encode(&row(Some(square(0.5)))), TreatmentEncoder::background());
        assert_eq!(enc.encode(&row(None)), TreatmentEncoder::background());
    }

    #[test]
    fn test_closure_encoder() {
        let enc = |_: &ChipAnnotationRow| ClassLabel::new(3, "Burn");
        assert_eq!(enc.encode(&row(None)).id, 3);
    }

    #[test]
    fn test_bbox_and_ring_string() {
        let p = square(4.0);
        assert_eq!(
            polygon_bbox(&p),
            Some(BBox {
                x: 2.0,
                y: 3.0,
                width: 4.0,
                height: 4.0
            })
        );
        assert_eq!(stringify_ring(&p), "2 3 6 3 6 7 2 7 2 3");
        assert_eq!(polygon_bbox(&Polygon::new(LineString::new(vec![]), vec![])), None);
    }

    #[test]
    fn test_segment_to_bbox() {
        let bbox = segment_to_bbox(&[1.0, 2.0, 1.0, 2.0, 5.0, 2.0, 5.0, 9.0]).unwrap();
        assert_eq!(
            bbox,
            BBox {
                x: 1.0,
                y: 2.0,
                width: 4.0,
                height: 7.0
            }
        );
        assert!(segment_to_bbox(&[1.0, 2.0, 3.0]).is_err());
        assert!(segment_to_bbox(&[-1.0, 2.0, 3.0, 4.0]).is_err());
    }
}
