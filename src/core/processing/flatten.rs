//! Union of overlapping annotation parts before chip alignment.
use geo::{Area, BooleanOps};
use geo_types::Polygon;
use tracing::debug;

use crate::types::FlattenMode;

// Relative area below which two polygons count as topologically equal.
const EQUALITY_TOLERANCE: f64 = 1e-9;

/// True when `a` and `b` cover the same region (symmetric difference ~ 0).
pub fn topologically_equal(a: &Polygon<f64>, b: &Polygon<f64>) -> bool {
    let scale = a.unsigned_area().max(b.unsigned_area()).max(1.0);
    let diff = a.difference(b).unsigned_area() + b.difference(a).unsigned_area();
    diff <= EQUALITY_TOLERANCE * scale
}

/// Union of `a` and `b` when it is one polygon distinct from both inputs.
fn merge(a: &Polygon<f64>, b: &Polygon<f64>) -> Option<Polygon<f64>> {
    let union = a.union(b);
    if union.0.len() != 1 {
        return None;
    }
    let merged = union.0.into_iter().next()?;
    if topologically_equal(&merged, a) || topologically_equal(&merged, b) {
        return None;
    }
    Some(merged)
}

/// Flatten annotation parts according to `mode`.
pub fn flatten(parts: Vec<Polygon<f64>>, mode: FlattenMode) -> Vec<Polygon<f64>> {
    let input = parts.len();
    let out = match mode {
        FlattenMode::None => parts,
        FlattenMode::FirstMerge => first_merge(parts),
        FlattenMode::FullReduction => full_reduction(parts),
    };
    debug!("Flattened {} parts into {} ({})", input, out.len(), mode);
    out
}

fn first_merge(parts: Vec<Polygon<f64>>) -> Vec<Polygon<f64>> {
    let mut flat: Vec<Polygon<f64>> = Vec::with_capacity(parts.len());
    for part in parts {
        let target = flat
            .iter()
            .enumerate()
            .find_map(|(i, existing)| merge(existing, &part).map(|m| (i, m)));
        match target {
            Some((i, merged)) => flat[i] = merged,
            None => flat.push(part),
        }
    }
    flat
}

fn full_reduction(parts: Vec<Polygon<f64>>) -> Vec<Polygon<f64>> {
    let mut flat = first_merge(parts);
    loop {
        let mut found = None;
        'search: for i in 0..flat.len() {
            for j in (i + 1)..flat.len() {
                if let Some(merged) = merge(&flat[i], &flat[j]) {
                    found = Some((i, j, merged));
                    break 'search;
                }
            }
        }
        match found {
            Some((i, j, merged)) => {
                flat.remove(j);
                flat[i] = merged;
            }
            None => return flat,
        }
    }
}
