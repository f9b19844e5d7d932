//! Geometry helpers used while assembling features.

use geo::{
    Area, BoundingRect, Centroid, Contains, Coord, EuclideanDistance, EuclideanLength, Geometry,
    LineInterpolatePoint, LineString, MultiLineString, Point, Polygon,
};
use itertools::Itertools;
use wkt::TryFromWkt;

/// Parse a WKT string into a geometry.
pub fn parse_wkt(wkt: &str) -> Result<Geometry<f64>, String> {
    Geometry::try_from_wkt_str(wkt).map_err(|e| e.to_string())
}

/// Distance from `pt` to `geom`; zero if `geom` contains `pt`.
///
/// Measured in the units of the geometry's coordinate system.
pub fn distance_to(geom: &Geometry<f64>, pt: &Point<f64>) -> f64 {
    if geom.contains(pt) {
        return 0.0;
    }
    match geom {
        Geometry::Point(p) => pt.euclidean_distance(p),
        Geometry::Line(l) => pt.euclidean_distance(l),
        Geometry::LineString(ls) => pt.euclidean_distance(ls),
        Geometry::Polygon(p) => pt.euclidean_distance(p),
        Geometry::MultiPoint(mp) => pt.euclidean_distance(mp),
        Geometry::MultiLineString(mls) => pt.euclidean_distance(mls),
        Geometry::MultiPolygon(mp) => pt.euclidean_distance(mp),
        Geometry::Rect(r) => pt.euclidean_distance(&r.to_polygon()),
        Geometry::Triangle(t) => pt.euclidean_distance(&t.to_polygon()),
        Geometry::GeometryCollection(gc) => gc
            .iter()
            .map(|g| distance_to(g, pt))
            .fold(f64::INFINITY, f64::min),
    }
}

/// The bounding box of `geom` as a polygon, or a point for degenerate boxes.
pub fn envelope(geom: &Geometry<f64>) -> Option<Geometry<f64>> {
    let rect = geom.bounding_rect()?;
    if rect.width() == 0.0 && rect.height() == 0.0 {
        return Some(Geometry::Point(rect.min().into()));
    }
    Some(Geometry::Polygon(rect.to_polygon()))
}

/// Return a point on `geom`, suitable for label placement.
///
/// - the centroid, if `geom` contains it
/// - the middle of the longest intersection of a polygon with a horizontal
///   line through the vertical center of its bounding box
/// - the result for the largest polygon of a multi polygon, or the longest
///   line of a multi line string
/// - the point at half the length of a line string
/// - the member of a multi point closest to the centroid
///
/// Returns `None` only for empty geometries.
pub fn point_on_geometry(geom: &Geometry<f64>) -> Option<Point<f64>> {
    let centroid = geom.centroid()?;
    if geom.contains(&centroid) {
        return Some(centroid);
    }

    match geom {
        Geometry::Polygon(polygon) => {
            let scanline = horizontal_intersection(polygon);
            if scanline.0.is_empty() {
                return Some(centroid);
            }
            point_on_geometry(&Geometry::MultiLineString(scanline))
        }
        Geometry::MultiPolygon(mp) => mp
            .iter()
            .filter(|p| p.unsigned_area() > 0.0)
            .max_by(|a, b| a.unsigned_area().total_cmp(&b.unsigned_area()))
            .map_or(Some(centroid), |largest| {
                point_on_geometry(&Geometry::Polygon(largest.clone()))
            }),
        Geometry::MultiLineString(mls) => longest_line(mls).map_or(Some(centroid), |longest| {
            point_on_geometry(&Geometry::LineString(longest.clone()))
        }),
        Geometry::LineString(ls) => ls.line_interpolate_point(0.5).or(Some(centroid)),
        Geometry::MultiPoint(mp) => mp
            .iter()
            .min_by(|a, b| {
                a.euclidean_distance(&centroid)
                    .total_cmp(&b.euclidean_distance(&centroid))
            })
            .copied()
            .or(Some(centroid)),
        _ => Some(centroid),
    }
}

/// The first of the longest members, so ties resolve in input order.
fn longest_line(mls: &MultiLineString<f64>) -> Option<&LineString<f64>> {
    mls.iter()
        .filter(|ls| ls.euclidean_length() > 0.0)
        .fold(None, |longest: Option<&LineString<f64>>, ls| match longest {
            Some(current) if current.euclidean_length() >= ls.euclidean_length() => Some(current),
            _ => Some(ls),
        })
}

/// Intersect `polygon` with a horizontal line through the vertical center of
/// its bounding box.
///
/// Crossings with all rings are collected and paired left to right (even-odd
/// rule), so holes split the result into separate segments.
fn horizontal_intersection(polygon: &Polygon<f64>) -> MultiLineString<f64> {
    let Some(bounds) = polygon.bounding_rect() else {
        return MultiLineString::new(vec![]);
    };
    let y = (bounds.min().y + bounds.max().y) / 2.0;

    let crossings = std::iter::once(polygon.exterior())
        .chain(polygon.interiors())
        .flat_map(LineString::lines)
        .filter_map(|line| {
            let (a, b) = (line.start, line.end);
            let crosses = (a.y <= y && b.y > y) || (b.y <= y && a.y > y);
            crosses.then(|| a.x + (y - a.y) * (b.x - a.x) / (b.y - a.y))
        })
        .sorted_by(f64::total_cmp)
        .collect_vec();

    let segments = crossings
        .chunks_exact(2)
        .filter(|pair| pair[1] > pair[0])
        .map(|pair| LineString::new(vec![Coord { x: pair[0], y }, Coord { x: pair[1], y }]))
        .collect();
    MultiLineString::new(segments)
}
