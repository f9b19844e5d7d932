//! Request parameter parsing.
//!
//! [`RequestParams::parse`] turns any [`ParamSource`] (query string pairs or
//! a JSON body) into a validated request. Parameters:
//!
//! | name | |
//! |---|---|
//! | `type` | `search` or `reverse` (required) |
//! | `query` | search text, or `x,y` for reverse geocoding |
//! | `class` | comma separated collection classes, all if empty |
//! | `shape` | `geometry` (default), `centroid` or `bbox` |
//! | `limit`, `offset` | pagination, default 100 and 0 |
//! | `in_epsg` | projection of the reverse geocoding coordinate |
//! | `out_epsg` | output projection, defaults to the source projection |
//! | `radius` | reverse geocoding radius in kilometers |
//! | `bbox`, `bbox_epsg` | bounding box filter `minx,miny,maxx,maxy` |
//! | `peri_coord`, `peri_radius`, `peri_epsg` | point-radius filter, radius in kilometers |
//! | `debug` | `true` keeps internal properties |
//! | `user`, `password` | credentials passed on to the backend |

use std::{borrow::Cow, fmt, str::FromStr};

use ahash::AHashMap;
use geo::{BoundingRect, Geometry, Point, Rect, coord};
use geocodr_solr::{UserAuth, strip_special_chars};
use serde_json::{Map, Value};

pub use error::RequestError;
use error::Result;

use crate::{proj::Projection, spatial::SpatialFilter};

pub const DEFAULT_LIMIT: usize = 100;

/// Key/value lookup shared by all request representations.
pub trait ParamSource {
    fn get(&self, key: &str) -> Option<Cow<'_, str>>;

    fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }
}

/// Parameters from an HTTP query string. The first value of a repeated key
/// wins.
#[derive(Debug, Clone, Default)]
pub struct QueryStringParams {
    params: AHashMap<String, String>,
}

impl QueryStringParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.params.entry(key.into()).or_insert_with(|| value.into());
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for QueryStringParams {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut params = Self::new();
        for (k, v) in iter {
            params.insert(k, v);
        }
        params
    }
}

impl ParamSource for QueryStringParams {
    fn get(&self, key: &str) -> Option<Cow<'_, str>> {
        self.params.get(key).map(|v| Cow::Borrowed(v.as_str()))
    }
}

/// Parameters from a JSON request body. Numbers and booleans are accepted in
/// place of strings; arrays are joined with commas (e.g. `"bbox": [1, 2, 3, 4]`).
#[derive(Debug, Clone, Default)]
pub struct JsonParams {
    doc: Map<String, Value>,
}

impl JsonParams {
    pub fn new(doc: Map<String, Value>) -> Self {
        Self { doc }
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        match serde_json::from_str(json) {
            Ok(Value::Object(doc)) => Ok(Self::new(doc)),
            Ok(_) => Err(RequestError::InvalidRequest(
                "request body must be a JSON object".to_string(),
            )),
            Err(e) => Err(RequestError::InvalidRequest(format!("invalid JSON body: {e}"))),
        }
    }
}

fn scalar_to_string(value: &Value) -> Option<Cow<'_, str>> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(Cow::Borrowed(s.as_str())),
        Value::Array(values) => Some(Cow::Owned(
            values
                .iter()
                .filter_map(scalar_to_string)
                .collect::<Vec<_>>()
                .join(","),
        )),
        other => Some(Cow::Owned(other.to_string())),
    }
}

impl ParamSource for JsonParams {
    fn get(&self, key: &str) -> Option<Cow<'_, str>> {
        self.doc.get(key).and_then(scalar_to_string)
    }
}

/// Search or reverse geocoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Search,
    Reverse,
}

impl FromStr for Mode {
    type Err = RequestError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "search" => Ok(Self::Search),
            "reverse" => Ok(Self::Reverse),
            other => Err(RequestError::InvalidRequest(format!(
                "Invalid request type. Supported: search or reverse. Got: '{other}'"
            ))),
        }
    }
}

/// Geometry reduction of the output features.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Shape {
    #[default]
    Geometry,
    Centroid,
    Bbox,
}

impl FromStr for Shape {
    type Err = RequestError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "geometry" => Ok(Self::Geometry),
            "centroid" => Ok(Self::Centroid),
            "bbox" => Ok(Self::Bbox),
            other => Err(RequestError::InvalidRequest(format!(
                "Invalid shape value. Supported: geometry, centroid or bbox. Got: '{other}'"
            ))),
        }
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Geometry => "geometry",
            Self::Centroid => "centroid",
            Self::Bbox => "bbox",
        })
    }
}

/// Service-wide defaults for request parsing.
#[derive(Debug, Clone, Copy)]
pub struct RequestDefaults {
    /// Projection of all collections; spatial filters are converted into it.
    pub data_proj: Projection,
    /// Reverse geocoding radius in kilometers.
    pub reverse_radius: f64,
}

/// A validated (reverse) geocoding request.
#[derive(Debug, Clone)]
pub struct RequestParams {
    pub mode: Mode,
    /// Search text with special characters removed; the raw coordinate
    /// string for reverse geocoding.
    pub query: String,
    pub spatial_filter: Option<SpatialFilter>,
    pub dst_proj: Projection,
    pub shape: Shape,
    pub limit: usize,
    pub offset: usize,
    /// Requested collection classes; empty selects all collections.
    pub classes: Vec<String>,
    pub debug: bool,
    pub user_auth: Option<UserAuth>,
}

impl RequestParams {
    pub fn parse(params: &impl ParamSource, defaults: &RequestDefaults) -> Result<Self> {
        let mode: Mode = required(params, "type")?.parse()?;
        let has_explicit_filter = params.contains("peri_coord") || params.contains("bbox");

        let query = match mode {
            Mode::Search => strip_special_chars(&required(params, "query")?),
            Mode::Reverse if has_explicit_filter => params
                .get("query")
                .map(|q| q.trim().to_string())
                .unwrap_or_default(),
            Mode::Reverse => required(params, "query")?.trim().to_string(),
        };

        let spatial_filter = if params.contains("peri_coord") {
            Some(perimeter_filter(params, defaults)?)
        } else if params.contains("bbox") {
            Some(bbox_filter(params, defaults)?)
        } else if mode == Mode::Reverse {
            Some(reverse_filter(params, defaults, &query)?)
        } else {
            None
        };

        let dst_proj = if mode == Mode::Reverse && !has_explicit_filter {
            projection("in_epsg", &required(params, "in_epsg")?)?
        } else {
            match params.get("out_epsg") {
                Some(epsg) if !epsg.trim().is_empty() => projection("out_epsg", &epsg)?,
                _ => defaults.data_proj,
            }
        };

        // negative and zero limits clamp to one, negative offsets are rejected
        let limit = optional_number::<i64>(params, "limit")?
            .map_or(DEFAULT_LIMIT, |l| usize::try_from(l.max(1)).unwrap_or(usize::MAX));
        let offset = optional_number::<usize>(params, "offset")?.unwrap_or(0);

        let shape = match params.get("shape") {
            Some(shape) => shape.parse()?,
            None => Shape::default(),
        };

        let classes = params
            .get("class")
            .map(|c| {
                c.split(',')
                    .map(str::trim)
                    .filter(|c| !c.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        let debug = params
            .get("debug")
            .is_some_and(|d| d.eq_ignore_ascii_case("true"));

        let user_auth = user_auth(params);

        Ok(Self {
            mode,
            query,
            spatial_filter,
            dst_proj,
            shape,
            limit,
            offset,
            classes,
            debug,
            user_auth,
        })
    }

    pub fn is_reverse(&self) -> bool {
        self.mode == Mode::Reverse
    }

    /// Reference point for distance ranking, in the source projection.
    pub fn distance_pt(&self) -> Option<Point<f64>> {
        self.spatial_filter.as_ref().map(SpatialFilter::distance_pt)
    }
}

/// Backend credentials from the `user` and `password` parameters.
pub fn user_auth(params: &impl ParamSource) -> Option<UserAuth> {
    match (params.get("user"), params.get("password")) {
        (Some(user), Some(password)) if !user.is_empty() => Some(UserAuth {
            user: user.into_owned(),
            password: password.into_owned(),
        }),
        _ => None,
    }
}

fn required<'a>(params: &'a impl ParamSource, key: &str) -> Result<Cow<'a, str>> {
    params
        .get(key)
        .ok_or_else(|| RequestError::MissingParameter(key.to_string()))
}

fn invalid(name: &str, detail: impl Into<String>) -> RequestError {
    RequestError::InvalidParameter {
        name: name.to_string(),
        detail: detail.into(),
    }
}

fn optional_number<T: FromStr>(params: &impl ParamSource, key: &str) -> Result<Option<T>>
where
    T::Err: fmt::Display,
{
    params
        .get(key)
        .map(|v| {
            v.trim()
                .parse::<T>()
                .map_err(|e| invalid(key, format!("'{v}': {e}")))
        })
        .transpose()
}

fn parse_float(name: &str, value: &str) -> Result<f64> {
    value
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| invalid(name, format!("'{value}' is not a number")))
}

fn parse_floats<const N: usize>(name: &str, value: &str) -> Result<[f64; N]> {
    let values = value
        .split(',')
        .map(|v| parse_float(name, v))
        .collect::<Result<Vec<_>>>()?;
    values
        .try_into()
        .map_err(|_| invalid(name, format!("expected {N} comma separated numbers, got '{value}'")))
}

fn projection(name: &str, value: &str) -> Result<Projection> {
    Projection::parse(value).map_err(|e| invalid(name, e.to_string()))
}

/// Transform a point from the projection named by `epsg_key` into the data projection.
fn to_data_proj(
    params: &impl ParamSource,
    defaults: &RequestDefaults,
    epsg_key: &str,
    geom: &Geometry<f64>,
) -> Result<Geometry<f64>> {
    let src = projection(epsg_key, &required(params, epsg_key)?)?;
    src.transform(&defaults.data_proj, geom)
        .map_err(|e| invalid(epsg_key, e.to_string()))
}

fn point_in_data_proj(
    params: &impl ParamSource,
    defaults: &RequestDefaults,
    name: &str,
    value: &str,
    epsg_key: &str,
) -> Result<Point<f64>> {
    let [x, y] = parse_floats::<2>(name, value)?;
    match to_data_proj(params, defaults, epsg_key, &Geometry::Point(Point::new(x, y)))? {
        Geometry::Point(p) => Ok(p),
        _ => Err(invalid(name, "projection did not return a point")),
    }
}

fn perimeter_filter(params: &impl ParamSource, defaults: &RequestDefaults) -> Result<SpatialFilter> {
    let coord = required(params, "peri_coord")?;
    let radius = parse_float("peri_radius", &required(params, "peri_radius")?)?;
    let center = point_in_data_proj(params, defaults, "peri_coord", &coord, "peri_epsg")?;
    Ok(SpatialFilter::perimeter(center, radius))
}

fn bbox_filter(params: &impl ParamSource, defaults: &RequestDefaults) -> Result<SpatialFilter> {
    let [minx, miny, maxx, maxy] = parse_floats::<4>("bbox", &required(params, "bbox")?)?;
    let rect = Rect::new(coord! { x: minx, y: miny }, coord! { x: maxx, y: maxy });
    let projected = to_data_proj(params, defaults, "bbox_epsg", &Geometry::Polygon(rect.to_polygon()))?;
    let bounds = projected
        .bounding_rect()
        .ok_or_else(|| invalid("bbox", "empty bounding box"))?;
    Ok(SpatialFilter::BoundingBox(bounds))
}

fn reverse_filter(
    params: &impl ParamSource,
    defaults: &RequestDefaults,
    query: &str,
) -> Result<SpatialFilter> {
    let center = point_in_data_proj(params, defaults, "query", query, "in_epsg")?;
    let radius = match params.get("radius") {
        Some(radius) => parse_float("radius", &radius)?,
        None => defaults.reverse_radius,
    };
    Ok(SpatialFilter::perimeter(center, radius))
}

mod error {
    use thiserror::Error;

    #[derive(Error, Debug, Clone, PartialEq, Eq)]
    pub enum RequestError {
        #[error("{0}")]
        InvalidRequest(String),
        #[error("Parameter '{0}' is required for this request.")]
        MissingParameter(String),
        #[error("Invalid parameter value for '{name}': {detail}")]
        InvalidParameter { name: String, detail: String },
    }

    pub type Result<T> = std::result::Result<T, RequestError>;
}
