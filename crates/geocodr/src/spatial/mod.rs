//! Spatial constraints for collection queries.

use geo::{Point, Rect, coord};

/// A point-radius or bounding-box filter, always expressed in the
/// collections' source projection.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SpatialFilter {
    /// Geodesic point-radius filter. The radius is in kilometers, the unit
    /// of Solr's `geofilt` distance, and is sent without conversion.
    Perimeter { center: Point<f64>, radius: f64 },
    BoundingBox(Rect<f64>),
}

impl SpatialFilter {
    pub fn perimeter(center: Point<f64>, radius: f64) -> Self {
        Self::Perimeter { center, radius }
    }

    /// Bounding box from `[minx, miny, maxx, maxy]`.
    pub fn bbox(bounds: [f64; 4]) -> Self {
        Self::BoundingBox(Rect::new(
            coord! { x: bounds[0], y: bounds[1] },
            coord! { x: bounds[2], y: bounds[3] },
        ))
    }

    /// The reference point for distance ranking: the center point, or the
    /// center of the bounding box.
    pub fn distance_pt(&self) -> Point<f64> {
        match self {
            Self::Perimeter { center, .. } => *center,
            Self::BoundingBox(rect) => rect.center().into(),
        }
    }

    /// Backend filter parameters on the spatial field `sfield`.
    pub fn query_params(&self, sfield: &str) -> Vec<(String, String)> {
        match self {
            Self::Perimeter { center, radius } => vec![
                ("fq".to_string(), format!("{{!geofilt sfield={sfield}}}")),
                ("pt".to_string(), format!("{},{}", center.y(), center.x())),
                ("d".to_string(), radius.to_string()),
            ],
            Self::BoundingBox(rect) => vec![(
                "fq".to_string(),
                format!(
                    "{sfield}:[\"{} {}\" TO \"{} {}\"]",
                    rect.min().x,
                    rect.min().y,
                    rect.max().x,
                    rect.max().y
                ),
            )],
        }
    }
}
