//! Conversion of raw backend hits into normalized features.

use std::cmp::Ordering;

use geo::{Geometry, Point};
use geocodr_solr::Document;
use serde_json::{Map, Value};
use tracing::trace;

pub use error::AssembleError;
use error::Result;

use crate::{
    collection::CollectionSpec,
    geom::{distance_to, envelope, parse_wkt, point_on_geometry},
    proj::{Projection, Transformer},
    request::Shape,
};

/// Property keys used for sorting and debugging. All of them except
/// [`TITLE`] are removed from the output unless debug output is requested.
pub mod props {
    pub const SCORE: &str = "_score_";
    pub const SORT_TIEBREAKER: &str = "_sort_tiebreaker_";
    pub const ID: &str = "_id_";
    pub const COLLECTION: &str = "_collection_";
    pub const CLASS: &str = "_class_";
    pub const TITLE: &str = "_title_";
    pub const DISTANCE: &str = "_distance_";
    pub const COLLECTION_RANK: &str = "_collection_rank_";
}

/// A single sortable value taken from a backend document.
///
/// Values of different kinds order as `Null < Bool < Number < Text`.
#[derive(Debug, Clone)]
pub enum SortValue {
    Null,
    Bool(bool),
    Number(f64),
    Text(String),
}

impl SortValue {
    fn kind_rank(&self) -> u8 {
        match self {
            Self::Null => 0,
            Self::Bool(_) => 1,
            Self::Number(_) => 2,
            Self::Text(_) => 3,
        }
    }

    fn to_json(&self) -> Value {
        match self {
            Self::Null => Value::Null,
            Self::Bool(b) => Value::Bool(*b),
            Self::Number(n) => serde_json::Number::from_f64(*n).map_or(Value::Null, Value::Number),
            Self::Text(s) => Value::String(s.clone()),
        }
    }
}

impl From<&Value> for SortValue {
    fn from(value: &Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Bool(b) => Self::Bool(*b),
            Value::Number(n) => n.as_f64().map_or(Self::Null, Self::Number),
            Value::String(s) => Self::Text(s.clone()),
            other => Self::Text(other.to_string()),
        }
    }
}

impl Ord for SortValue {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Bool(a), Self::Bool(b)) => a.cmp(b),
            (Self::Number(a), Self::Number(b)) => a.total_cmp(b),
            (Self::Text(a), Self::Text(b)) => a.cmp(b),
            _ => self.kind_rank().cmp(&other.kind_rank()),
        }
    }
}

impl PartialOrd for SortValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for SortValue {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for SortValue {}

/// Secondary sort key for hits with equal score. An empty tie-breaker
/// compares equal to every other empty tie-breaker.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct TieBreaker(Vec<SortValue>);

impl TieBreaker {
    pub fn new(values: Vec<SortValue>) -> Self {
        Self(values)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn to_json(&self) -> Value {
        if self.0.is_empty() {
            Value::Null
        } else {
            Value::Array(self.0.iter().map(SortValue::to_json).collect())
        }
    }
}

/// A normalized search result: geometry plus properties, and the typed sort
/// keys the merger orders by.
#[derive(Debug, Clone)]
pub struct Feature {
    pub geometry: Geometry<f64>,
    pub properties: Map<String, Value>,
    pub score: f64,
    pub tiebreaker: TieBreaker,
    /// Distance to the reference point, in source projection units.
    pub distance: Option<f64>,
    /// `None` sorts after every ranked collection.
    pub collection_rank: Option<u32>,
}

impl Feature {
    pub fn new(geometry: Geometry<f64>, properties: Map<String, Value>) -> Self {
        Self {
            geometry,
            properties,
            score: 0.0,
            tiebreaker: TieBreaker::default(),
            distance: None,
            collection_rank: None,
        }
    }

    pub fn title(&self) -> Option<&str> {
        self.properties.get(props::TITLE).and_then(Value::as_str)
    }

    pub fn collection(&self) -> Option<&str> {
        self.properties.get(props::COLLECTION).and_then(Value::as_str)
    }

    /// Order for reverse geocoding: nearest first, then by collection rank.
    pub fn cmp_distance(&self, other: &Self) -> Ordering {
        let distance = |f: &Self| f.distance.unwrap_or(f64::INFINITY);
        distance(self)
            .total_cmp(&distance(other))
            .then_with(|| match (self.collection_rank, other.collection_rank) {
                (Some(a), Some(b)) => a.cmp(&b),
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (None, None) => Ordering::Equal,
            })
    }

    /// Order for search: best score first, then by tie-breaker.
    pub fn cmp_relevance(&self, other: &Self) -> Ordering {
        other
            .score
            .total_cmp(&self.score)
            .then_with(|| self.tiebreaker.cmp(&other.tiebreaker))
    }

    /// Convert into a GeoJSON feature.
    pub fn to_geojson(&self) -> geojson::Feature {
        geojson::Feature {
            bbox: None,
            geometry: Some(geojson::Geometry::new(geojson::Value::from(&self.geometry))),
            id: None,
            properties: Some(self.properties.clone()),
            foreign_members: None,
        }
    }
}

/// Per-request settings for turning hits into features.
#[derive(Debug, Clone, Copy)]
pub struct AssembleOptions {
    pub dst_proj: Projection,
    /// Reference point for distance ranking, in the source projection.
    pub distance_pt: Option<Point<f64>>,
    pub shape: Shape,
}

/// Convert the documents of one collection into features.
pub fn to_features(
    collection: &CollectionSpec,
    docs: Vec<Document>,
    options: &AssembleOptions,
) -> Result<Vec<Feature>> {
    let transformer = collection.src_proj.transformer(&options.dst_proj)?;
    docs.into_iter()
        .map(|doc| {
            let feature = to_feature(collection, &doc, options, &transformer)?;
            trace!(collection = %collection.name, title = ?feature.title(), "Assembled feature");
            Ok(feature)
        })
        .collect()
}

fn to_feature(
    collection: &CollectionSpec,
    doc: &Document,
    options: &AssembleOptions,
    transformer: &Transformer,
) -> Result<Feature> {
    let mut properties = match &collection.jsonblob_field {
        Some(field) => jsonblob_properties(collection, doc.get(field))?,
        None => Map::new(),
    };

    let wkt = doc
        .get(&collection.geometry_field)
        .and_then(Value::as_str)
        .ok_or_else(|| AssembleError::MissingGeometry {
            collection: collection.name.clone(),
            field: collection.geometry_field.clone(),
        })?;
    let mut geometry = parse_wkt(wkt).map_err(|message| AssembleError::InvalidGeometry {
        collection: collection.name.clone(),
        message,
    })?;

    let distance = options.distance_pt.map(|pt| distance_to(&geometry, &pt));
    if let Some(distance) = distance {
        let value = Value::from(distance);
        properties.insert(collection.distance_attrib.clone(), value.clone());
        properties.insert(props::DISTANCE.to_string(), value);
        properties.insert(
            props::COLLECTION_RANK.to_string(),
            collection.collection_rank.map_or(Value::Null, Value::from),
        );
    }

    if options.dst_proj != collection.src_proj {
        geometry = transformer.transform(&geometry)?;
    }

    for field in &collection.fields {
        properties.insert(field.clone(), doc.get(field).cloned().unwrap_or(Value::Null));
    }

    let score = doc.get("score").and_then(Value::as_f64).unwrap_or(0.0);
    let tiebreaker = collection.sort_tiebreaker(doc);
    properties.insert(props::SCORE.to_string(), Value::from(score));
    properties.insert(props::SORT_TIEBREAKER.to_string(), tiebreaker.to_json());
    properties.insert(
        props::ID.to_string(),
        doc.get("id").cloned().unwrap_or(Value::Null),
    );
    properties.insert(props::COLLECTION.to_string(), Value::from(collection.name.as_str()));
    properties.insert(props::CLASS.to_string(), Value::from(collection.class.as_str()));
    let title = collection.to_title(&properties);
    properties.insert(props::TITLE.to_string(), Value::from(title));
    properties.insert(
        collection.collection_title_attrib.clone(),
        Value::from(collection.title.as_str()),
    );
    properties.insert(
        collection.class_title_attrib.clone(),
        Value::from(collection.class_title.as_str()),
    );

    let geometry = match options.shape {
        Shape::Geometry => geometry,
        Shape::Centroid => point_on_geometry(&geometry).map_or(geometry, Geometry::Point),
        Shape::Bbox => envelope(&geometry).unwrap_or(geometry),
    };

    Ok(Feature {
        geometry,
        properties,
        score,
        tiebreaker,
        distance,
        collection_rank: collection.collection_rank,
    })
}

/// Base properties from the JSON blob field. The blob may be stored as a
/// JSON string or as an object; a missing blob yields no properties.
fn jsonblob_properties(
    collection: &CollectionSpec,
    blob: Option<&Value>,
) -> Result<Map<String, Value>> {
    let invalid = |message: String| AssembleError::InvalidJsonBlob {
        collection: collection.name.clone(),
        message,
    };
    match blob {
        None | Some(Value::Null) => Ok(Map::new()),
        Some(Value::Object(map)) => Ok(map.clone()),
        Some(Value::String(s)) => match serde_json::from_str(s) {
            Ok(Value::Object(map)) => Ok(map),
            Ok(other) => Err(invalid(format!("expected object, got {other}"))),
            Err(e) => Err(invalid(e.to_string())),
        },
        Some(other) => Err(invalid(format!("expected object, got {other}"))),
    }
}

mod error {
    use thiserror::Error;

    use crate::proj::ProjectionError;

    #[derive(Error, Debug)]
    pub enum AssembleError {
        #[error("Missing geometry field '{field}' in collection '{collection}'")]
        MissingGeometry { collection: String, field: String },
        #[error("Invalid geometry in collection '{collection}': {message}")]
        InvalidGeometry { collection: String, message: String },
        #[error("Invalid JSON properties in collection '{collection}': {message}")]
        InvalidJsonBlob { collection: String, message: String },
        #[error(transparent)]
        Projection(#[from] ProjectionError),
    }

    pub type Result<T> = std::result::Result<T, AssembleError>;
}

#[cfg(test)]
mod tests {
    use geo::point;
    use serde_json::json;

    use super::*;
    use crate::collection::Collections;

    fn collections() -> Collections {
        Collections::from_json_str(
            r#"{
                "defaults": {"src_epsg": 4326, "geometry_field": "geometrie", "distance_attrib": "entfernung"},
                "collections": [
                    {
                        "name": "boroughs",
                        "title": "Statistische Bezirke",
                        "class": "address",
                        "class_title": "Addresses",
                        "fields": ["gemeinde_name", "bezeichnung"],
                        "sort_fields": ["bezeichnung"],
                        "collection_rank": 1
                    }
                ]
            }"#,
        )
        .unwrap()
    }

    fn doc(value: Value) -> Document {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    fn square_doc() -> Document {
        doc(json!({
            "id": "b-1",
            "score": 2.5,
            "json": "{\"uuid\": \"b-1\", \"bezeichnung\": \"from blob\", \"flaeche\": 100}",
            "geometrie": "POLYGON ((12 54, 12.2 54, 12.2 54.2, 12 54.2, 12 54))",
            "gemeinde_name": "Rostock",
            "bezeichnung": "Mitte"
        }))
    }

    fn options(shape: Shape, distance_pt: Option<Point<f64>>) -> AssembleOptions {
        AssembleOptions {
            dst_proj: Projection::epsg(4326).unwrap(),
            distance_pt,
            shape,
        }
    }

    #[test]
    fn test_feature_properties() {
        let collections = collections();
        let spec = collections.iter().next().unwrap();
        let features =
            to_features(spec, vec![square_doc()], &options(Shape::Geometry, None)).unwrap();
        assert_eq!(features.len(), 1);
        let f = &features[0];
        let p = &f.properties;

        assert_eq!(p["uuid"], "b-1");
        assert_eq!(p["flaeche"], 100);
        // declared fields win over blob values
        assert_eq!(p["bezeichnung"], "Mitte");
        assert_eq!(p[props::SCORE], 2.5);
        assert_eq!(p[props::ID], "b-1");
        assert_eq!(p[props::COLLECTION], "boroughs");
        assert_eq!(p[props::CLASS], "address");
        assert_eq!(p[props::TITLE], "Rostock, Mitte");
        assert_eq!(p[props::SORT_TIEBREAKER], json!(["Mitte"]));
        assert_eq!(p["_collection_title_"], "Statistische Bezirke");
        assert_eq!(p["_class_title_"], "Addresses");
        assert!(!p.contains_key(props::DISTANCE));
        assert!(f.distance.is_none());
        assert!(matches!(f.geometry, Geometry::Polygon(_)));
    }

    #[test]
    fn test_distance() {
        let collections = collections();
        let spec = collections.iter().next().unwrap();

        let inside = to_features(
            spec,
            vec![square_doc()],
            &options(Shape::Geometry, Some(point!(x: 12.1, y: 54.1))),
        )
        .unwrap();
        assert_eq!(inside[0].distance, Some(0.0));
        assert_eq!(inside[0].properties["entfernung"], 0.0);
        assert_eq!(inside[0].properties[props::DISTANCE], 0.0);
        assert_eq!(inside[0].properties[props::COLLECTION_RANK], 1);

        let outside = to_features(
            spec,
            vec![square_doc()],
            &options(Shape::Geometry, Some(point!(x: 12.5, y: 54.1))),
        )
        .unwrap();
        let distance = outside[0].distance.unwrap();
        assert!((distance - 0.3).abs() < 1e-9, "{distance}");
    }

    #[test]
    fn test_shapes() {
        let collections = collections();
        let spec = collections.iter().next().unwrap();
        let centroid =
            to_features(spec, vec![square_doc()], &options(Shape::Centroid, None)).unwrap();
        let Geometry::Point(p) = centroid[0].geometry else {
            panic!("expected point");
        };
        assert!((p.x() - 12.1).abs() < 1e-9 && (p.y() - 54.1).abs() < 1e-9);

        let bbox = to_features(spec, vec![square_doc()], &options(Shape::Bbox, None)).unwrap();
        assert!(matches!(bbox[0].geometry, Geometry::Polygon(_)));
    }

    #[test]
    fn test_reprojection() {
        let collections = collections();
        let spec = collections.iter().next().unwrap();
        let opts = AssembleOptions {
            dst_proj: Projection::epsg(25833).unwrap(),
            distance_pt: Some(point!(x: 12.1, y: 54.1)),
            shape: Shape::Centroid,
        };
        let features = to_features(spec, vec![square_doc()], &opts).unwrap();
        let Geometry::Point(p) = features[0].geometry else {
            panic!("expected point");
        };
        // UTM zone 33 coordinates around Rostock
        assert!(p.x() > 300_000.0 && p.x() < 400_000.0, "{p:?}");
        assert!(p.y() > 5_900_000.0 && p.y() < 6_100_000.0, "{p:?}");
        // distance is measured in the source projection
        assert_eq!(features[0].distance, Some(0.0));
    }

    #[test]
    fn test_missing_and_invalid_values() {
        let collections = collections();
        let spec = collections.iter().next().unwrap();

        let mut no_blob = square_doc();
        no_blob.remove("json");
        no_blob.remove("score");
        no_blob.remove("gemeinde_name");
        let f = &to_features(spec, vec![no_blob], &options(Shape::Geometry, None)).unwrap()[0];
        assert_eq!(f.score, 0.0);
        assert_eq!(f.properties["gemeinde_name"], Value::Null);
        assert_eq!(f.title(), Some("Mitte"));

        let mut no_geom = square_doc();
        no_geom.remove("geometrie");
        assert!(matches!(
            to_features(spec, vec![no_geom], &options(Shape::Geometry, None)),
            Err(AssembleError::MissingGeometry { .. })
        ));

        let mut bad_geom = square_doc();
        bad_geom.insert("geometrie".into(), json!("POLYGON (("));
        assert!(matches!(
            to_features(spec, vec![bad_geom], &options(Shape::Geometry, None)),
            Err(AssembleError::InvalidGeometry { .. })
        ));

        let mut bad_blob = square_doc();
        bad_blob.insert("json".into(), json!("[1, 2]"));
        assert!(matches!(
            to_features(spec, vec![bad_blob], &options(Shape::Geometry, None)),
            Err(AssembleError::InvalidJsonBlob { .. })
        ));
    }

    #[test]
    fn test_sort_value_order() {
        let values = [
            SortValue::Text("a".into()),
            SortValue::Number(2.0),
            SortValue::Null,
            SortValue::Bool(true),
            SortValue::Number(-1.0),
        ];
        let mut sorted = values.to_vec();
        sorted.sort();
        assert_eq!(
            sorted,
            vec![
                SortValue::Null,
                SortValue::Bool(true),
                SortValue::Number(-1.0),
                SortValue::Number(2.0),
                SortValue::Text("a".into()),
            ]
        );
    }

    #[test]
    fn test_feature_ordering() {
        let mut a = Feature::new(Geometry::Point(point!(x: 0.0, y: 0.0)), Map::new());
        let mut b = a.clone();
        a.score = 2.0;
        b.score = 1.0;
        assert_eq!(a.cmp_relevance(&b), Ordering::Less);

        a.distance = Some(5.0);
        b.distance = Some(5.0);
        a.collection_rank = None;
        b.collection_rank = Some(9);
        assert_eq!(a.cmp_distance(&b), Ordering::Greater);
        b.distance = Some(6.0);
        assert_eq!(a.cmp_distance(&b), Ordering::Less);
    }
}
