//! Coordinate reference systems and geometry reprojection.
//!
//! A [`Projection`] is identified by its EPSG code. Reprojection goes through
//! a [`Transformer`], which is created once per source/destination pair and
//! then applied coordinate-wise to whole geometries.

use std::fmt;

pub use error::ProjectionError;
use error::Result;
use geo::{Coord, Geometry, MapCoords};
use proj4rs::Proj;
use serde::{Deserialize, Deserializer, de};

/// An EPSG coordinate reference system.
#[derive(Debug, Clone, Copy)]
pub struct Projection {
    code: u16,
    definition: &'static str,
}

impl Projection {
    /// Look up a projection by EPSG code.
    pub fn epsg(code: u16) -> Result<Self> {
        crs_definitions::from_code(code)
            .map(|def| Self {
                code,
                definition: def.proj4,
            })
            .ok_or_else(|| ProjectionError::InvalidProjection(format!("EPSG:{code}")))
    }

    /// Parse `"4326"`, `"EPSG:4326"` or `"epsg:4326"`.
    pub fn parse(value: &str) -> Result<Self> {
        let trimmed = value.trim();
        let digits = trimmed
            .get(..5)
            .filter(|prefix| prefix.eq_ignore_ascii_case("epsg:"))
            .map_or(trimmed, |_| &trimmed[5..]);
        digits
            .parse::<u16>()
            .map_err(|_| ProjectionError::InvalidProjection(value.to_string()))
            .and_then(Self::epsg)
    }

    pub fn code(&self) -> u16 {
        self.code
    }

    /// The proj4 definition string.
    pub fn definition(&self) -> &'static str {
        self.definition
    }

    /// Geographic systems take degrees; everything else is projected.
    pub fn is_latlong(&self) -> bool {
        self.definition.contains("+proj=longlat")
    }

    pub fn transformer(&self, dst: &Self) -> Result<Transformer> {
        Transformer::new(*self, *dst)
    }

    /// Reproject `geom` from this projection into `dst`.
    pub fn transform(&self, dst: &Self, geom: &Geometry<f64>) -> Result<Geometry<f64>> {
        self.transformer(dst)?.transform(geom)
    }
}

impl PartialEq for Projection {
    fn eq(&self, other: &Self) -> bool {
        self.code == other.code
    }
}

impl Eq for Projection {}

impl fmt::Display for Projection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EPSG:{}", self.code)
    }
}

impl TryFrom<u16> for Projection {
    type Error = ProjectionError;

    fn try_from(code: u16) -> Result<Self> {
        Self::epsg(code)
    }
}

/// Deserializes from a bare EPSG code, e.g. `"src_epsg": 25833`.
impl<'de> Deserialize<'de> for Projection {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let code = u16::deserialize(deserializer)?;
        Self::epsg(code).map_err(de::Error::custom)
    }
}

/// Reprojects coordinates from one [`Projection`] into another.
///
/// Holds parsed projection state and is meant to be created per worker, not
/// shared between threads.
pub struct Transformer {
    src: Projection,
    dst: Projection,
    projs: Option<(Proj, Proj)>,
}

impl Transformer {
    fn new(src: Projection, dst: Projection) -> Result<Self> {
        let projs = if src == dst {
            None
        } else {
            let parse = |p: &Projection| {
                Proj::from_proj_string(p.definition).map_err(|e| ProjectionError::Transform {
                    src: src.code,
                    dst: dst.code,
                    message: e.to_string(),
                })
            };
            Some((parse(&src)?, parse(&dst)?))
        };
        Ok(Self { src, dst, projs })
    }

    pub fn is_identity(&self) -> bool {
        self.projs.is_none()
    }

    pub fn transform_coord(&self, coord: Coord<f64>) -> Result<Coord<f64>> {
        let Some((src_proj, dst_proj)) = &self.projs else {
            return Ok(coord);
        };
        let mut point = if self.src.is_latlong() {
            (coord.x.to_radians(), coord.y.to_radians(), 0.0)
        } else {
            (coord.x, coord.y, 0.0)
        };
        proj4rs::transform::transform(src_proj, dst_proj, &mut point).map_err(|e| {
            ProjectionError::Transform {
                src: self.src.code,
                dst: self.dst.code,
                message: e.to_string(),
            }
        })?;
        if self.dst.is_latlong() {
            Ok(Coord {
                x: point.0.to_degrees(),
                y: point.1.to_degrees(),
            })
        } else {
            Ok(Coord {
                x: point.0,
                y: point.1,
            })
        }
    }

    pub fn transform(&self, geom: &Geometry<f64>) -> Result<Geometry<f64>> {
        if self.is_identity() {
            return Ok(geom.clone());
        }
        geom.try_map_coords(|coord| self.transform_coord(coord))
    }
}

mod error {
    use thiserror::Error;

    #[derive(Error, Debug, Clone, PartialEq, Eq)]
    pub enum ProjectionError {
        #[error("Unknown projection '{0}'")]
        InvalidProjection(String),
        #[error("Failed to transform from EPSG:{src} to EPSG:{dst}: {message}")]
        Transform { src: u16, dst: u16, message: String },
    }
    pub type Result<T> = std::result::Result<T, ProjectionError>;
}
