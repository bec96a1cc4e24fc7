//! Translation between geographic polygons and chip-local pixel polygons.
//!
//! Pixel polygons use image order: `x` is the column and `y` the row.
use geo::Simplify;
use geo::algorithm::line_intersection::{LineIntersection, line_intersection};
use geo::orient::{Direction, Orient};
use geo_types::{Coord, Line, LineString, Polygon};

use crate::core::georef::GeoIndex;
use crate::error::{Error, Result};

/// Default Ramer-Douglas-Peucker tolerance applied before translating.
pub const DEFAULT_SIMPLIFY_TOLERANCE: f64 = 0.002;

/// Pixel-space polygon input in any of the accepted shapes.
#[derive(Debug, Clone)]
pub enum PixelInput {
    Polygon(Polygon<f64>),
    /// `(x, y)` vertex pairs
    Pairs(Vec<(f64, f64)>),
    /// `[x0, y0, x1, y1, ...]`
    Flat(Vec<f64>),
    /// `"(x,y) (x,y)"`, `"((x y, x y))"` or `"x y x y"`
    Text(String),
}

/// True when no two edges of `ring` cross or overlap. Edges that only share
/// their common vertex are allowed; zero-length edges are ignored.
pub fn ring_is_simple(ring: &LineString<f64>) -> bool {
    let edges: Vec<Line<f64>> = ring.lines().filter(|l| l.start != l.end).collect();
    let n = edges.len();
    for i in 0..n {
        for j in (i + 1)..n {
            let adjacent = j == i + 1 || (i == 0 && j == n - 1);
            match line_intersection(edges[i], edges[j]) {
                None => {}
                Some(LineIntersection::SinglePoint { .. }) if adjacent => {}
                Some(_) => return false,
            }
        }
    }
    true
}

/// Simplify the exterior, keeping the input whenever the result would collapse
/// below a valid ring or introduce a self-intersection.
fn simplify_ring(polygon: &Polygon<f64>, tolerance: f64) -> Polygon<f64> {
    if tolerance <= 0.0 {
        return polygon.clone();
    }
    let simplified = polygon.simplify(&tolerance);
    if simplified.exterior().0.len() < 4 || !ring_is_simple(simplified.exterior()) {
        polygon.clone()
    } else {
        simplified
    }
}

/// Map a geographic polygon into the pixel frame of `index`, clipped to
/// `[0, width-1] x [0, height-1]`. Non-finite vertices are rejected.
pub fn geo_to_pixel<I: GeoIndex + ?Sized>(
    polygon: &Polygon<f64>,
    index: &I,
    tolerance: f64,
) -> Result<Polygon<f64>> {
    if polygon.exterior().0.is_empty() {
        return Ok(polygon.clone());
    }
    if let Some(bad) = polygon
        .exterior()
        .coords()
        .find(|c| !c.x.is_finite() || !c.y.is_finite())
    {
        return Err(Error::InvalidGeometry(format!(
            "non-finite vertex ({}, {})",
            bad.x, bad.y
        )));
    }
    let normalized = simplify_ring(polygon, tolerance).orient(Direction::Default);
    let max_x = index.width().saturating_sub(1) as f64;
    let max_y = index.height().saturating_sub(1) as f64;
    let ring: Vec<Coord<f64>> = normalized
        .exterior()
        .coords()
        .map(|c| {
            let (row, col) = index.index(c.x, c.y);
            Coord {
                x: (col as f64).clamp(0.0, max_x),
                y: (row as f64).clamp(0.0, max_y),
            }
        })
        .collect();
    Ok(Polygon::new(LineString::new(ring), vec![]))
}

/// Map a pixel polygon back to geographic coordinates through pixel centres.
pub fn pixel_to_geo<I: GeoIndex + ?Sized>(
    input: PixelInput,
    index: &I,
    tolerance: f64,
) -> Result<Polygon<f64>> {
    let polygon = to_polygon(input)?;
    let simplified = simplify_ring(&polygon, tolerance);
    let ring: Vec<Coord<f64>> = simplified
        .exterior()
        .coords()
        .map(|c| {
            let (x, y) = index.xy(c.y, c.x);
            Coord { x, y }
        })
        .collect();
    Ok(Polygon::new(LineString::new(ring), vec![]))
}

/// Normalise any pixel input into a closed polygon with at least three
/// distinct vertices.
pub fn to_polygon(input: PixelInput) -> Result<Polygon<f64>> {
    let coords: Vec<Coord<f64>> = match input {
        PixelInput::Polygon(p) => p.exterior().coords().copied().collect(),
        PixelInput::Pairs(pairs) => pairs.into_iter().map(|(x, y)| Coord { x, y }).collect(),
        PixelInput::Flat(values) => pair_up(&values)?,
        PixelInput::Text(text) => parse_pixel_text(&text)?,
    };
    let mut distinct: Vec<Coord<f64>> = Vec::with_capacity(coords.len());
    for c in &coords {
        if !distinct.contains(c) {
            distinct.push(*c);
        }
    }
    if distinct.len() < 3 {
        return Err(Error::InvalidGeometry(format!(
            "polygon needs at least 3 distinct vertices, got {}",
            distinct.len()
        )));
    }
    // LineString closing happens in Polygon::new
    Ok(Polygon::new(LineString::new(coords), vec![]))
}

fn pair_up(values: &[f64]) -> Result<Vec<Coord<f64>>> {
    if values.len() % 2 != 0 {
        return Err(Error::InvalidGeometry(format!(
            "flat coordinate list has odd length {}",
            values.len()
        )));
    }
    Ok(values
        .chunks_exact(2)
        .map(|xy| Coord { x: xy[0], y: xy[1] })
        .collect())
}

fn parse_numbers(text: &str) -> Result<Vec<f64>> {
    text.split_whitespace()
        .map(|tok| {
            tok.parse::<f64>()
                .map_err(|_| Error::InvalidGeometry(format!("not a number: '{tok}'")))
        })
        .collect()
}

/// Innermost parenthesised groups, in order.
fn innermost_groups(text: &str) -> Result<Vec<&str>> {
    let mut groups = Vec::new();
    let mut depth = 0usize;
    let mut open: Option<usize> = None;
    for (i, ch) in text.char_indices() {
        match ch {
            '(' => {
                depth += 1;
                open = Some(i);
            }
            ')' => {
                depth = depth
                    .checked_sub(1)
                    .ok_or_else(|| Error::InvalidGeometry("unbalanced ')'".into()))?;
                if let Some(start) = open.take() {
                    groups.push(&text[start + 1..i]);
                }
            }
            _ => {}
        }
    }
    if depth != 0 {
        return Err(Error::InvalidGeometry("unbalanced '('".into()));
    }
    Ok(groups)
}

/// Tokenise a textual pixel polygon.
pub fn parse_pixel_text(text: &str) -> Result<Vec<Coord<f64>>> {
    let body = text.trim();
    let body = body
        .get(..7)
        .filter(|head| head.eq_ignore_ascii_case("polygon"))
        .map_or(body, |_| &body[7..]);

    if !body.contains('(') {
        return pair_up(&parse_numbers(&body.replace(',', " "))?);
    }

    let mut coords = Vec::new();
    for group in innermost_groups(body)? {
        let items = group
            .split(',')
            .map(parse_numbers)
            .collect::<Result<Vec<_>>>()?;
        if items.iter().all(|item| item.len() == 2) {
            // WKT style: comma separated "x y" points
            coords.extend(items.iter().map(|xy| Coord { x: xy[0], y: xy[1] }));
        } else if items.len() == 2 && items.iter().all(|item| item.len() == 1) {
            coords.push(Coord {
                x: items[0][0],
                y: items[1][0],
            });
        } else {
            return Err(Error::InvalidGeometry(format!(
                "cannot read coordinates from '({group})'"
            )));
        }
    }
    if coords.is_empty() {
        return Err(Error::InvalidGeometry(format!("no coordinates in '{text}'")));
    }
    Ok(coords)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::georef::{GeoTransform, Georef};

    fn chip_georef() -> Georef {
        Georef::new(
            GeoTransform([500_000.0, 10.0, 0.0, 4_200_000.0, 0.0, -10.0]),
            256,
            256,
            "EPSG:32611",
        )
    }

    fn coords(p: &Polygon<f64>) -> Vec<(f64, f64)> {
        p.exterior().coords().map(|c| (c.x, c.y)).collect()
    }

    #[test]
    fn test_geo_to_pixel_reverses_row_col() {
        let g = chip_georef();
        // 2 columns right, 5 rows down from the origin
        let poly = Polygon::new(
            LineString::from(vec![
                (500_020.0, 4_199_950.0),
                (500_060.0, 4_199_950.0),
                (500_060.0, 4_199_910.0),
                (500_020.0, 4_199_950.0),
            ]),
            vec![],
        );
        let px = geo_to_pixel(&poly, &g, DEFAULT_SIMPLIFY_TOLERANCE).unwrap();
        let pts = coords(&px);
        assert!(pts.contains(&(2.0, 5.0)));
        assert!(pts.contains(&(6.0, 5.0)));
        assert!(pts.contains(&(6.0, 9.0)));
    }

    #[test]
    fn test_geo_to_pixel_clips_to_chip() {
        let g = chip_georef();
        let poly = Polygon::new(
            LineString::from(vec![
                (499_000.0, 4_201_000.0),
                (510_000.0, 4_201_000.0),
                (510_000.0, 4_190_000.0),
                (499_000.0, 4_190_000.0),
            ]),
            vec![],
        );
        let px = geo_to_pixel(&poly, &g, DEFAULT_SIMPLIFY_TOLERANCE).unwrap();
        for (x, y) in coords(&px) {
            assert!((0.0..=255.0).contains(&x));
            assert!((0.0..=255.0).contains(&y));
        }
        // Already clipped input is a fixed point
        let twice = geo_to_pixel(
            &pixel_to_geo(PixelInput::Polygon(px.clone()), &g, 0.0).unwrap(),
            &g,
            0.0,
        )
        .unwrap();
        assert_eq!(coords(&twice).len(), coords(&px).len());
        for (a, b) in coords(&twice).iter().zip(coords(&px).iter()) {
            assert_eq!(a, b);
        }
    }

    #[test]
    fn test_unit_square_at_corner_round_trips() {
        let g = chip_georef();
        let square = PixelInput::Flat(vec![0.0, 0.0, 1.0, 0.0, 1.0, 1.0, 0.0, 1.0]);
        let geo = pixel_to_geo(square, &g, DEFAULT_SIMPLIFY_TOLERANCE).unwrap();
        let back = geo_to_pixel(&geo, &g, DEFAULT_SIMPLIFY_TOLERANCE).unwrap();
        let mut pts = coords(&back);
        pts.sort_by(|a, b| a.partial_cmp(b).unwrap());
        pts.dedup();
        assert_eq!(pts, vec![(0.0, 0.0), (0.0, 1.0), (1.0, 0.0), (1.0, 1.0)]);
    }

    #[test]
    fn test_rotated_transform_round_trip() {
        let (s, c) = (25f64.to_radians().sin(), 25f64.to_radians().cos());
        let g = Georef::new(
            GeoTransform([1000.0, 10.0 * c, -10.0 * s, 2000.0, 10.0 * s, 10.0 * c]),
            64,
            64,
            "",
        );
        let input = vec![(3.0, 4.0), (20.0, 4.0), (20.0, 30.0), (3.0, 30.0)];
        let geo = pixel_to_geo(PixelInput::Pairs(input.clone()), &g, 0.0).unwrap();
        let back = geo_to_pixel(&geo, &g, 0.0).unwrap();
        let pts = coords(&back);
        for p in input {
            assert!(pts.contains(&p), "missing {p:?} in {pts:?}");
        }
    }

    #[test]
    fn test_simplification_never_self_intersects() {
        // A narrow sliver whose top edge dips close to a spike on the bottom edge
        let sliver = Polygon::new(
            LineString::from(vec![
                (0.0, 0.0),
                (1.9, 0.0),
                (2.0, 0.004),
                (2.1, 0.0),
                (4.0, 0.0),
                (4.0, 0.0035),
                (2.0, 0.005),
                (0.0, 0.0035),
            ]),
            vec![],
        );
        assert!(ring_is_simple(sliver.exterior()));
        let out = simplify_ring(&sliver, DEFAULT_SIMPLIFY_TOLERANCE);
        assert!(ring_is_simple(out.exterior()), "{:?}", coords(&out));
        assert_eq!(out, sliver);
    }

    #[test]
    fn test_ring_is_simple() {
        let square = LineString::from(vec![(0.0, 0.0), (1.0, 0.0), (1.0, 1.0), (0.0, 1.0), (0.0, 0.0)]);
        assert!(ring_is_simple(&square));
        let bowtie = LineString::from(vec![(0.0, 0.0), (1.0, 1.0), (1.0, 0.0), (0.0, 1.0), (0.0, 0.0)]);
        assert!(!ring_is_simple(&bowtie));
        // Repeated vertex is not a crossing
        let repeated = LineString::from(vec![
            (0.0, 0.0),
            (1.0, 0.0),
            (1.0, 0.0),
            (1.0, 1.0),
            (0.0, 1.0),
            (0.0, 0.0),
        ]);
        assert!(ring_is_simple(&repeated));
    }

    #[test]
    fn test_non_finite_vertex_rejected() {
        let poly = Polygon::new(
            LineString::from(vec![(0.0, 0.0), (f64::NAN, 0.0), (1.0, 1.0), (0.0, 0.0)]),
            vec![],
        );
        assert!(geo_to_pixel(&poly, &chip_georef(), 0.0).is_err());
    }

    #[test]
    fn test_text_formats() {
        let expected = vec![
            Coord { x: 1.0, y: 2.0 },
            Coord { x: 3.0, y: 4.0 },
            Coord { x: 5.0, y: 6.0 },
        ];
        assert_eq!(parse_pixel_text("(1,2) (3,4) (5,6)").unwrap(), expected);
        assert_eq!(parse_pixel_text("((1 2, 3 4, 5 6))").unwrap(), expected);
        assert_eq!(parse_pixel_text("POLYGON ((1 2, 3 4, 5 6))").unwrap(), expected);
        assert_eq!(parse_pixel_text("1 2 3 4 5 6").unwrap(), expected);
        assert_eq!(parse_pixel_text(" 1.0 2.0  3 4 5 6 ").unwrap(), expected);
    }

    #[test]
    fn test_malformed_inputs_rejected() {
        assert!(matches!(
            to_polygon(PixelInput::Flat(vec![0.0, 0.0, 1.0])),
            Err(Error::InvalidGeometry(_))
        ));
        assert!(to_polygon(PixelInput::Pairs(vec![(0.0, 0.0), (1.0, 1.0), (0.0, 0.0)])).is_err());
        assert!(parse_pixel_text("((1 2, 3 4)").is_err());
        assert!(parse_pixel_text("1 2 a 4").is_err());
        assert!(parse_pixel_text("(1,2,3)").is_err());
        assert!(to_polygon(PixelInput::Text(String::new())).is_err());
    }
}
