//! Shared types and enums used across ndvichip.
//! Includes `YearPair`, `ChipSize`, `ChipWindow`, `PixelBounds`, `FlattenMode`,
//! `CoordFrame`, the annotation geometry model, and the label primitives `BBox`
//! and `ClassLabel`.
use std::collections::BTreeMap;
use std::path::PathBuf;

use clap::ValueEnum;
use geo_types::{Geometry, MultiPolygon, Polygon};
use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Acquisition years spanned by an NDVI difference raster and its annotations.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
pub struct YearPair {
    pub start: i32,
    pub end: i32,
}

impl YearPair {
    pub fn new(start: i32, end: i32) -> Self {
        Self { start, end }
    }
}

impl std::fmt::Display for YearPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}to{}", self.start, self.end)
    }
}

impl std::str::FromStr for YearPair {
    type Err = String;

    /// Parses `"2015to2019"`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (start, end) = s
            .trim()
            .split_once("to")
            .ok_or_else(|| format!("expected '<start>to<end>', got '{s}'"))?;
        let start: i32 = start
            .parse()
            .map_err(|e| format!("start year parse error: {e}"))?;
        let end: i32 = end.parse().map_err(|e| format!("end year parse error: {e}"))?;
        Ok(YearPair { start, end })
    }
}

/// Requested chip dimensions in pixels.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Default, Serialize, Deserialize)]
pub enum ChipSize {
    /// One chip covering the whole raster
    #[default]
    Full,
    Fixed { width: usize, height: usize },
}

impl ChipSize {
    pub fn square(size: usize) -> Self {
        ChipSize::Fixed {
            width: size,
            height: size,
        }
    }

    /// Resolve to a concrete (width, height) for the given bounds.
    pub fn resolve(&self, bounds: &PixelBounds) -> (i64, i64) {
        match *self {
            ChipSize::Full => (bounds.cols(), bounds.rows()),
            ChipSize::Fixed { width, height } => (
                i64::try_from(width).unwrap_or(i64::MAX),
                i64::try_from(height).unwrap_or(i64::MAX),
            ),
        }
    }
}

impl std::fmt::Display for ChipSize {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChipSize::Full => write!(f, "full"),
            ChipSize::Fixed { width, height } => write!(f, "({},{})", width, height),
        }
    }
}

impl std::str::FromStr for ChipSize {
    type Err = String;

    /// Accepts `full`, `256` or `256x128` (width x height).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("full") || s.eq_ignore_ascii_case("original") {
            return Ok(ChipSize::Full);
        }
        let parse = |v: &str| {
            v.trim()
                .parse::<usize>()
                .map_err(|e| format!("chip size parse error: {e}"))
        };
        match s.split_once(['x', 'X']) {
            Some((w, h)) => Ok(ChipSize::Fixed {
                width: parse(w)?,
                height: parse(h)?,
            }),
            None => Ok(ChipSize::square(parse(s)?)),
        }
    }
}

/// Half-open pixel extent `[rmin, rmax) x [cmin, cmax)` of a raster.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct PixelBounds {
    pub rmin: i64,
    pub cmin: i64,
    pub rmax: i64,
    pub cmax: i64,
}

impl PixelBounds {
    pub fn rows(&self) -> i64 {
        self.rmax - self.rmin
    }

    pub fn cols(&self) -> i64 {
        self.cmax - self.cmin
    }

    pub fn contains(&self, window: &ChipWindow) -> bool {
        let r0 = window.row_off as i64;
        let c0 = window.col_off as i64;
        r0 >= self.rmin
            && c0 >= self.cmin
            && r0 + window.height as i64 <= self.rmax
            && c0 + window.width as i64 <= self.cmax
    }
}

/// A rectangular read window into a source raster.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub struct ChipWindow {
    pub row_off: usize,
    pub col_off: usize,
    pub width: usize,
    pub height: usize,
}

impl ChipWindow {
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Deterministic chip filename: `{stem}_chip_{row}_{col}.tif`
    pub fn chip_filename(&self, stem: &str) -> String {
        format!("{}_chip_{}_{}.tif", stem, self.row_off, self.col_off)
    }
}

/// How constituent polygons of an annotation group are merged before alignment.
#[derive(
    Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum, Debug, Default, Serialize, Deserialize,
)]
pub enum FlattenMode {
    /// Keep every part as-is
    None,
    /// One pass; each part merges into the first polygon it unions with
    #[default]
    FirstMerge,
    /// Merge pairwise until no further merge is possible
    FullReduction,
}

impl std::fmt::Display for FlattenMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FlattenMode::None => write!(f, "None"),
            FlattenMode::FirstMerge => write!(f, "FirstMerge"),
            FlattenMode::FullReduction => write!(f, "FullReduction"),
        }
    }
}

/// Coordinate frame a geometry is expressed in.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub enum CoordFrame {
    Geographic,
    Pixel,
}

/// Axis-aligned box `(x, y, width, height)`.
#[derive(Copy, Clone, PartialEq, Debug, Default, Serialize, Deserialize)]
pub struct BBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// Encoded object class of a row.
#[derive(Clone, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub struct ClassLabel {
    pub id: i32,
    pub name: String,
}

impl ClassLabel {
    pub fn new(id: i32, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }
}

/// Areal annotation geometry. Every other geometry kind is rejected on load.
#[derive(Clone, PartialEq, Debug)]
pub enum AnnotationGeometry {
    Polygon(Polygon<f64>),
    MultiPolygon(MultiPolygon<f64>),
}

impl AnnotationGeometry {
    /// Constituent polygons; a multi-polygon contributes each member separately.
    pub fn parts(&self) -> Vec<Polygon<f64>> {
        match self {
            AnnotationGeometry::Polygon(p) => vec![p.clone()],
            AnnotationGeometry::MultiPolygon(mp) => mp.0.clone(),
        }
    }
}

impl TryFrom<Geometry<f64>> for AnnotationGeometry {
    type Error = Error;

    fn try_from(geometry: Geometry<f64>) -> Result<Self, Self::Error> {
        match geometry {
            Geometry::Polygon(p) => Ok(AnnotationGeometry::Polygon(p)),
            Geometry::MultiPolygon(mp) => Ok(AnnotationGeometry::MultiPolygon(mp)),
            Geometry::Point(_) => Err(Error::InvalidGeometry("unsupported type Point".into())),
            Geometry::Line(_) => Err(Error::InvalidGeometry("unsupported type Line".into())),
            Geometry::LineString(_) => {
                Err(Error::InvalidGeometry("unsupported type LineString".into()))
            }
            Geometry::MultiPoint(_) => {
                Err(Error::InvalidGeometry("unsupported type MultiPoint".into()))
            }
            Geometry::MultiLineString(_) => Err(Error::InvalidGeometry(
                "unsupported type MultiLineString".into(),
            )),
            Geometry::GeometryCollection(_) => Err(Error::InvalidGeometry(
                "unsupported type GeometryCollection".into(),
            )),
            Geometry::Rect(_) => Err(Error::InvalidGeometry("unsupported type Rect".into())),
            Geometry::Triangle(_) => {
                Err(Error::InvalidGeometry("unsupported type Triangle".into()))
            }
        }
    }
}

/// A ground-truth treatment annotation.
#[derive(Clone, Debug)]
pub struct Annotation {
    pub geometry: AnnotationGeometry,
    pub years: YearPair,
    pub subregion: Option<String>,
}

/// Annotations as loaded, plus copies reprojected into each raster CRS in play.
///
/// Lookups for a CRS without a reprojected copy fall back to the loaded
/// geometries.
#[derive(Clone, Debug, Default)]
pub struct ProjectedAnnotations {
    native: Vec<Annotation>,
    by_crs: BTreeMap<String, Vec<Annotation>>,
}

impl ProjectedAnnotations {
    pub fn new(native: Vec<Annotation>) -> Self {
        Self {
            native,
            by_crs: BTreeMap::new(),
        }
    }

    pub fn insert(&mut self, crs: impl Into<String>, annotations: Vec<Annotation>) {
        self.by_crs.insert(crs.into(), annotations);
    }

    /// Geometries expressed in `crs`.
    pub fn for_crs(&self, crs: &str) -> &[Annotation] {
        self.by_crs.get(crs).map_or(&self.native, |a| a)
    }

    /// The annotations as loaded; years and subregions do not depend on the CRS.
    pub fn native(&self) -> &[Annotation] {
        &self.native
    }

    pub fn len(&self) -> usize {
        self.native.len()
    }

    pub fn is_empty(&self) -> bool {
        self.native.is_empty()
    }

    /// CRS definitions with a reprojected copy.
    pub fn projections(&self) -> impl Iterator<Item = &str> {
        self.by_crs.keys().map(String::as_str)
    }
}

impl From<Vec<Annotation>> for ProjectedAnnotations {
    fn from(native: Vec<Annotation>) -> Self {
        Self::new(native)
    }
}

/// One chip joined with one intersecting annotation part, or the empty
/// placeholder (`geometry == None`) when nothing intersects the chip.
#[derive(Clone, Debug)]
pub struct ChipAnnotationRow {
    pub chip_path: PathBuf,
    pub years: YearPair,
    pub frame: CoordFrame,
    pub geometry: Option<Polygon<f64>>,
}

impl ChipAnnotationRow {
    pub fn is_placeholder(&self) -> bool {
        self.geometry
            .as_ref()
            .is_none_or(|p| p.exterior().0.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_year_pair_parse_and_display() {
        let years: YearPair = "2015to2019".parse().expect("valid years");
        assert_eq!(years, YearPair::new(2015, 2019));
        assert_eq!(years.to_string(), "2015to2019");
        assert!("2015-2019".parse::<YearPair>().is_err());
    }

    #[test]
    fn test_chip_size_parse() {
        assert_eq!("full".parse::<ChipSize>(), Ok(ChipSize::Full));
        assert_eq!("256".parse::<ChipSize>(), Ok(ChipSize::square(256)));
        assert_eq!(
            "256x128".parse::<ChipSize>(),
            Ok(ChipSize::Fixed {
                width: 256,
                height: 128
            })
        );
        assert!("abc".parse::<ChipSize>().is_err());
    }

    #[test]
    fn test_window_filename() {
        let w = ChipWindow {
            row_off: 256,
            col_off: 512,
            width: 256,
            height: 256,
        };
        assert_eq!(w.chip_filename("A1_2015to2019"), "A1_2015to2019_chip_256_512.tif");
    }

    #[test]
    fn test_annotation_geometry_rejects_non_areal() {
        use geo_types::{LineString, point};

        let square = Polygon::new(
            LineString::from(vec![(0.0, 0.0), (1.0, 0.0), (1.0, 1.0), (0.0, 1.0), (0.0, 0.0)]),
            vec![],
        );
        let multi = MultiPolygon(vec![square.clone(), square.clone()]);
        let geom = AnnotationGeometry::try_from(Geometry::MultiPolygon(multi)).unwrap();
        assert_eq!(geom.parts().len(), 2);

        let err = AnnotationGeometry::try_from(Geometry::Point(point!(x: 1.0, y: 2.0))).unwrap_err();
        assert!(matches!(err, Error::InvalidGeometry(_)));
        assert!(
            AnnotationGeometry::try_from(Geometry::LineString(square.exterior().clone())).is_err()
        );
    }
}
