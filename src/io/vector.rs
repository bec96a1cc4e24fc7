//! Annotation loading from any OGR vector source (shapefile, GeoPackage, GeoJSON).
use std::path::Path;

use gdal::Dataset;
use gdal::spatial_ref::{AxisMappingStrategy, CoordTransform, SpatialRef};
use gdal::vector::{Feature, FieldValue, LayerAccess};
use tracing::{debug, info, warn};

use crate::core::params::AnnotationSchema;
use crate::error::{Error, Result};
use crate::types::{Annotation, AnnotationGeometry, YearPair};

fn year_value(value: Option<FieldValue>, column: &str) -> Result<i32> {
    let invalid = |v: String| Error::InvalidArgument {
        arg: "year field",
        value: format!("{column}={v}"),
    };
    match value {
        Some(FieldValue::IntegerValue(v)) => Ok(v),
        Some(FieldValue::Integer64Value(v)) => i32::try_from(v).map_err(|_| invalid(v.to_string())),
        Some(FieldValue::RealValue(v)) if v.is_finite() => Ok(v.round() as i32),
        Some(FieldValue::StringValue(s)) => {
            let t = s.trim();
            t.parse::<i32>()
                .or_else(|_| t.parse::<f64>().map(|f| f.round() as i32))
                .map_err(|_| invalid(s.clone()))
        }
        Some(other) => Err(invalid(format!("{other:?}"))),
        None => Err(invalid("<null>".to_string())),
    }
}

fn subregion_value(feature: &Feature, column: &str) -> Result<Option<String>> {
    let Ok(idx) = feature.field_index(column) else {
        return Ok(None);
    };
    Ok(match feature.field(idx)? {
        Some(FieldValue::StringValue(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Some(FieldValue::IntegerValue(v)) => Some(v.to_string()),
        Some(FieldValue::Integer64Value(v)) => Some(v.to_string()),
        _ => None,
    })
}

fn traditional(mut srs: SpatialRef) -> SpatialRef {
    srs.set_axis_mapping_strategy(AxisMappingStrategy::TraditionalGisOrder);
    srs
}

/// Load every feature of the first layer of `path` as an annotation.
///
/// When `target_crs` is given and the layer carries a CRS, geometries are
/// reprojected into it. Features without geometry are skipped; non-areal
/// geometries fail with `InvalidGeometry`.
pub fn load_annotations(
    path: &Path,
    schema: &AnnotationSchema,
    target_crs: Option<&str>,
) -> Result<Vec<Annotation>> {
    let ds = Dataset::open(path)?;
    let mut layer = ds.layer(0)?;

    let transform = match (target_crs.filter(|c| !c.is_empty()), layer.spatial_ref()) {
        (Some(target), Some(source)) => {
            let source = traditional(source);
            let target = traditional(SpatialRef::from_definition(target)?);
            if source == target {
                None
            } else {
                debug!("Reprojecting annotations into {}", target_crs.unwrap_or_default());
                Some(CoordTransform::new(&source, &target)?)
            }
        }
        _ => None,
    };

    let mut annotations = Vec::new();
    let mut skipped = 0usize;
    for feature in layer.features() {
        let Some(geometry) = feature.geometry() else {
            skipped += 1;
            continue;
        };
        let geometry = match &transform {
            Some(ct) => geometry.transform(ct)?.to_geo()?,
            None => geometry.to_geo()?,
        };
        let geometry = AnnotationGeometry::try_from(geometry)?;

        let start = feature.field_index(&schema.start_year)?;
        let end = feature.field_index(&schema.end_year)?;
        let years = YearPair::new(
            year_value(feature.field(start)?, &schema.start_year)?,
            year_value(feature.field(end)?, &schema.end_year)?,
        );
        let subregion = subregion_value(&feature, &schema.subregion)?;
        annotations.push(Annotation {
            geometry,
            years,
            subregion,
        });
    }
    if skipped > 0 {
        warn!("Skipped {} features without geometry in {:?}", skipped, path);
    }
    info!("Loaded {} annotations from {:?}", annotations.len(), path);
    Ok(annotations)
}
