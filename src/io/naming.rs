//! NDVI difference raster naming convention:
//! `<Subregion>[_Expanded]_<StartYear>to<EndYear>_NDVI_Difference.tif`.
//!
//! `_Expanded` is folded into an `E` suffix on the subregion, so
//! `A12_Expanded_2015to2019_NDVI_Difference.tif` belongs to subregion `A12E`.
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{Error, Result};
use crate::types::YearPair;

const SUFFIX: &str = "_NDVI_Difference";
const EXPANDED: &str = "Expanded";

/// Subregion and years decoded from a raster filename.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RasterName {
    pub subregion: String,
    pub years: YearPair,
}

/// Decodes raster filenames into subregion and years.
pub trait FilenameParser: Sync {
    fn parse(&self, file_name: &str) -> Result<RasterName>;
}

/// The default NDVI difference convention.
#[derive(Debug, Clone, Copy, Default)]
pub struct NdviDifferenceNames;

impl FilenameParser for NdviDifferenceNames {
    fn parse(&self, file_name: &str) -> Result<RasterName> {
        parse_ndvi_filename(file_name)
    }
}

impl<F> FilenameParser for F
where
    F: Fn(&str) -> Result<RasterName> + Sync,
{
    fn parse(&self, file_name: &str) -> Result<RasterName> {
        self(file_name)
    }
}

fn invalid(name: &str, reason: impl Into<String>) -> Error {
    Error::InvalidFilename {
        name: name.to_string(),
        reason: reason.into(),
    }
}

/// Parse `<Subregion>[_Expanded]_<StartYear>to<EndYear>_NDVI_Difference.tif`.
pub fn parse_ndvi_filename(file_name: &str) -> Result<RasterName> {
    let stem = Path::new(file_name)
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| invalid(file_name, "no file stem"))?;
    let head = stem
        .strip_suffix(SUFFIX)
        .ok_or_else(|| invalid(file_name, format!("missing '{SUFFIX}' suffix")))?;

    let parts: Vec<&str> = head.split('_').collect();
    let (subregion, years) = match parts.as_slice() {
        [sub, marker, years] if *marker == EXPANDED => (format!("{sub}E"), *years),
        [sub, years] => (sub.to_string(), *years),
        [single] => split_compact(single).ok_or_else(|| invalid(file_name, "no year span"))?,
        _ => return Err(invalid(file_name, "unexpected '_' separated parts")),
    };
    if subregion.is_empty() || subregion == "E" {
        return Err(invalid(file_name, "empty subregion"));
    }
    let years: YearPair = years.parse().map_err(|e: String| invalid(file_name, e))?;
    Ok(RasterName { subregion, years })
}

/// `Ab2015to2019` -> (`Ab`, `2015to2019`), scanning back over the start year digits.
fn split_compact(s: &str) -> Option<(String, &str)> {
    let to = s.rfind("to")?;
    let prefix = &s[..to];
    let digits = prefix
        .bytes()
        .rev()
        .take_while(|b| b.is_ascii_digit())
        .count();
    if digits == 0 {
        return None;
    }
    let split = to - digits;
    Some((s[..split].to_string(), &s[split..]))
}

/// Inverse of [`parse_ndvi_filename`].
pub fn build_filename(subregion: &str, years: YearPair) -> String {
    let mut head = subregion.to_string();
    match subregion.chars().last() {
        Some(c) if c.is_ascii_digit() => head.push('_'),
        Some('E') => {
            head.pop();
            head.push('_');
            head.push_str(EXPANDED);
            head.push('_');
        }
        _ => {}
    }
    format!("{head}{years}{SUFFIX}.tif")
}

/// `.tif` rasters directly under `dir` whose names parse, sorted by path.
/// Names that do not follow the convention are skipped.
pub fn discover_rasters<P: FilenameParser + ?Sized>(
    dir: &Path,
    parser: &P,
) -> Result<Vec<(PathBuf, RasterName)>> {
    let mut found = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        let is_tif = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("tif") || e.eq_ignore_ascii_case("tiff"));
        if !path.is_file() || !is_tif {
            continue;
        }
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        match parser.parse(name) {
            Ok(parsed) => found.push((path.clone(), parsed)),
            Err(e) => debug!("Skipping {:?}: {}", path, e),
        }
    }
    found.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(found)
}
