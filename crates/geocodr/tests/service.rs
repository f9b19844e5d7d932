//! Integration tests for the geocodr service
//!
//! These tests run against the public API with an in-memory backend that
//! serves fixed documents per collection and records every query.

use std::{
    collections::HashMap,
    path::PathBuf,
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
};

use geocodr::{
    Collections, ErrorKind, Geocodr, GeocodrConfig, JsonParams, ParcelId, QueryStringParams,
    backend::{BackendQuery, BackendResponse, Document, SearchBackend, SolrError},
    props,
};
use serde_json::{Value, json};

fn setup_test_env() {
    let _ = geocodr::init_logging(tracing::Level::WARN);
}

#[derive(Default)]
struct MockBackend {
    docs: HashMap<String, Vec<Document>>,
    failing: Option<String>,
    calls: AtomicUsize,
    queries: Mutex<Vec<BackendQuery>>,
}

impl MockBackend {
    fn with_docs(mut self, collection: &str, docs: Vec<Value>) -> Self {
        let docs = docs
            .into_iter()
            .map(|doc| doc.as_object().cloned().expect("document is an object"))
            .collect();
        self.docs.insert(collection.to_string(), docs);
        self
    }

    fn failing(mut self, collection: &str) -> Self {
        self.failing = Some(collection.to_string());
        self
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn query_for(&self, collection: &str) -> Option<BackendQuery> {
        self.queries
            .lock()
            .unwrap()
            .iter()
            .find(|q| q.collection == collection)
            .cloned()
    }
}

impl SearchBackend for MockBackend {
    fn query(&self, query: &BackendQuery) -> geocodr::backend::Result<BackendResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.queries.lock().unwrap().push(query.clone());

        if query
            .user_auth
            .as_ref()
            .is_some_and(|auth| auth.password != "secret")
        {
            return Err(SolrError::Unauthenticated {
                collection: query.collection.clone(),
            });
        }
        if self.failing.as_deref() == Some(query.collection.as_str()) {
            return Err(SolrError::Status {
                url: format!("http://solr/{}/select", query.collection),
                status: 500,
                message: "server error".to_string(),
            });
        }
        Ok(BackendResponse {
            docs: self.docs.get(&query.collection).cloned().unwrap_or_default(),
            debug: Some(json!({"rawquerystring": query.q})),
        })
    }
}

fn mapping_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/data/mapping.json")
}

fn rostock_backend() -> MockBackend {
    MockBackend::default()
        .with_docs(
            "streets",
            vec![
                json!({
                    "id": "s1", "score": 3.0,
                    "strasse_name": "Hauptstraße", "gemeinde_name": "Rostock",
                    "geometry": "LINESTRING (12.1 54.1005, 12.2 54.1005)"
                }),
                json!({
                    "id": "s2", "score": 1.5,
                    "strasse_name": "Hauptweg", "gemeinde_name": "Rostock",
                    "geometry": "LINESTRING (12.3 54.3, 12.4 54.3)"
                }),
            ],
        )
        .with_docs(
            "addresses",
            vec![
                json!({
                    "id": "a1", "score": 5.0,
                    "strasse_name": "Hauptstraße", "hausnummer": "5", "gemeinde_name": "Rostock",
                    "json": "{\"plz\": \"18055\"}",
                    "geometry": "POINT (12.1 54.1)"
                }),
                json!({
                    "id": "a2", "score": 2.0,
                    "strasse_name": "Hauptstraße", "hausnummer": "5a", "gemeinde_name": "Rostock",
                    "json": {"plz": "18055"},
                    "geometry": "POINT (12.1002 54.1)"
                }),
            ],
        )
        .with_docs(
            "districts",
            vec![json!({
                "id": "d1", "score": 1.0,
                "name": "Stadtmitte",
                "geometry": "POLYGON ((12 54, 12.2 54, 12.2 54.2, 12 54.2, 12 54))"
            })],
        )
}

fn service(backend: &Arc<MockBackend>, config: GeocodrConfig) -> Geocodr {
    let collections = Collections::load(mapping_path()).expect("mapping loads");
    Geocodr::from_components(collections, backend.clone(), config).expect("service builds")
}

fn params(pairs: &[(&str, &str)]) -> QueryStringParams {
    pairs.iter().copied().collect()
}

fn titles(json: &Value) -> Vec<String> {
    json["features"]
        .as_array()
        .unwrap()
        .iter()
        .map(|f| f["properties"]["_title_"].as_str().unwrap().to_string())
        .collect()
}

#[test]
fn test_search_merges_collections_by_score() {
    setup_test_env();
    let backend = Arc::new(rostock_backend());
    let geocodr = service(&backend, GeocodrConfig::default());

    let result = geocodr
        .handle(&params(&[
            ("type", "search"),
            ("query", "Hauptstr 5"),
            ("class", "address"),
            ("limit", "10"),
        ]))
        .expect("search succeeds");

    assert_eq!(backend.calls(), 2, "only address collections are queried");
    assert_eq!(result.total, 4);
    assert!(result.returned <= 10);
    let scores = result.features.iter().map(|f| f.score).collect::<Vec<_>>();
    assert_eq!(scores, vec![5.0, 3.0, 2.0, 1.5]);

    let json = result.to_json().unwrap();
    assert_eq!(json["features_total"], 4);
    assert_eq!(json["features_returned"], 4);
    assert_eq!(json["features_offset"], 0);
    assert_eq!(
        titles(&json),
        vec!["Hauptstraße, 5", "Hauptstraße, Rostock", "Hauptstraße, 5a", "Hauptweg, Rostock"]
    );

    let first = &json["features"][0]["properties"];
    assert_eq!(first["plz"], "18055");
    assert_eq!(first["suchklasse"], "Adresse");
    assert_eq!(first["objektgruppe"], "Adresse");
    assert!(first.get(props::SCORE).is_none());
    assert!(first.get(props::COLLECTION).is_none());
}

#[test]
fn test_search_queries_per_collection() {
    setup_test_env();
    let backend = Arc::new(rostock_backend());
    let geocodr = service(&backend, GeocodrConfig::default());

    geocodr
        .handle(&params(&[("type", "search"), ("query", "Hauptstr 5")]))
        .unwrap();

    // the house number is claimed exclusively by the address collection
    let addresses = backend.query_for("addresses").unwrap();
    assert!(addresses.q.contains("_query_:\"{!maxscore tie=0}(hausnummer:5^3.0)\""));
    assert!(addresses.q.contains(" AND "));
    assert_eq!(addresses.rows, 1000);

    let streets = backend.query_for("streets").unwrap();
    assert!(streets.q.contains("strasse_name:5^2.0"));
    assert!(streets.q.contains("gemeinde_name:Hauptstr*"));

    // "5" is too short for any parcel field
    assert!(backend.query_for("parcels").is_none());
    assert_eq!(backend.calls(), 3);
}

#[test]
fn test_search_pagination() {
    setup_test_env();
    let backend = Arc::new(rostock_backend());
    let geocodr = service(&backend, GeocodrConfig::default());

    let result = geocodr
        .handle(&params(&[
            ("type", "search"),
            ("query", "Hauptstr 5"),
            ("class", "address"),
            ("limit", "2"),
            ("offset", "1"),
        ]))
        .unwrap();
    assert_eq!(result.total, 4);
    assert_eq!(result.returned, 2);
    assert_eq!(result.offset, 1);
    let scores = result.features.iter().map(|f| f.score).collect::<Vec<_>>();
    assert_eq!(scores, vec![3.0, 2.0]);
}

#[test]
fn test_reverse_ranks_by_distance() {
    setup_test_env();
    let backend = Arc::new(rostock_backend());
    let geocodr = service(&backend, GeocodrConfig::default());

    let result = geocodr
        .handle(&params(&[
            ("type", "reverse"),
            ("query", "12.1,54.1"),
            ("in_epsg", "4326"),
        ]))
        .expect("reverse geocoding succeeds");

    assert_eq!(backend.calls(), 4, "reverse geocoding queries every collection");
    let reverse = backend.query_for("districts").unwrap();
    assert_eq!(reverse.q, "*");
    assert!(reverse.params.contains(&("pt".to_string(), "54.1,12.1".to_string())));

    let order = result
        .features
        .iter()
        .map(|f| f.properties[props::ID].as_str().unwrap())
        .collect::<Vec<_>>();
    // equal distances are ordered by collection rank
    assert_eq!(order, vec!["d1", "a1", "a2", "s1", "s2"]);

    let distances = result
        .features
        .iter()
        .map(|f| f.distance.unwrap())
        .collect::<Vec<_>>();
    assert_eq!(distances[0], 0.0);
    assert_eq!(distances[1], 0.0);
    assert!(distances.windows(2).all(|w| w[0] <= w[1]));

    let json = result.to_json().unwrap();
    assert_eq!(json["features"][0]["properties"]["entfernung"], 0.0);
    assert!(json["features"][0]["properties"].get(props::DISTANCE).is_none());
}

#[test]
fn test_reverse_requires_input_projection() {
    setup_test_env();
    let backend = Arc::new(rostock_backend());
    let geocodr = service(&backend, GeocodrConfig::default());

    let err = geocodr
        .handle(&params(&[("type", "reverse"), ("query", "12.1,54.1")]))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::MissingParameter);
    assert_eq!(err.status(), 400);
    assert_eq!(backend.calls(), 0);
}

#[test]
fn test_invalid_class_dispatches_nothing() {
    setup_test_env();
    let backend = Arc::new(rostock_backend());
    let geocodr = service(&backend, GeocodrConfig::default());

    let err = geocodr
        .handle(&params(&[
            ("type", "search"),
            ("query", "Hauptstr"),
            ("class", "address,zip_code"),
        ]))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidClass);
    assert_eq!(err.to_json()["message"], "Invalid class 'zip_code'");
    assert_eq!(backend.calls(), 0);
}

#[test]
fn test_output_projection_and_shape() {
    setup_test_env();
    let backend = Arc::new(rostock_backend());
    let geocodr = service(&backend, GeocodrConfig::default());

    let result = geocodr
        .handle(&params(&[
            ("type", "search"),
            ("query", "Stadtmitte"),
            ("class", "district"),
            ("out_epsg", "25833"),
            ("shape", "centroid"),
        ]))
        .unwrap();
    let json = result.to_json().unwrap();
    let geometry = &json["features"][0]["geometry"];
    assert_eq!(geometry["type"], "Point");
    let x = geometry["coordinates"][0].as_f64().unwrap();
    let y = geometry["coordinates"][1].as_f64().unwrap();
    assert!((250_000.0..450_000.0).contains(&x), "easting {x}");
    assert!((5_900_000.0..6_100_000.0).contains(&y), "northing {y}");

    let result = geocodr
        .handle(&params(&[
            ("type", "search"),
            ("query", "Hauptweg"),
            ("class", "address"),
            ("shape", "bbox"),
        ]))
        .unwrap();
    let json = result.to_json().unwrap();
    assert!(json["features"].as_array().unwrap().iter().all(|f| {
        let kind = f["geometry"]["type"].as_str().unwrap();
        kind == "Polygon" || kind == "Point"
    }));
}

#[test]
fn test_json_body_params() {
    setup_test_env();
    let backend = Arc::new(rostock_backend());
    let geocodr = service(&backend, GeocodrConfig::default());

    let body = JsonParams::from_json_str(
        r#"{"type": "search", "query": "Hauptstr 5", "class": "address", "limit": 1, "debug": true}"#,
    )
    .unwrap();
    let result = geocodr.handle(&body).unwrap();
    assert_eq!(result.returned, 1);
    assert_eq!(result.total, 4);

    let json = result.to_json().unwrap();
    assert_eq!(json["features"][0]["properties"][props::COLLECTION], "addresses");
    assert!(json["debug"]["streets"]["rawquerystring"].is_string());
}

#[test]
fn test_backend_failures_fail_the_request() {
    setup_test_env();
    let backend = Arc::new(rostock_backend().failing("districts"));
    let geocodr = service(&backend, GeocodrConfig::default());

    let err = geocodr
        .handle(&params(&[("type", "search"), ("query", "Hauptstr")]))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::BackendError);
    assert_eq!(err.status(), 500);
    assert_eq!(err.to_json()["message"], "Internal error.");
    // sibling queries still ran
    assert!(backend.query_for("streets").is_some());
}

#[test]
fn test_backend_credentials() {
    setup_test_env();
    let backend = Arc::new(rostock_backend());
    let config = GeocodrConfig::builder()
        .enable_basic_auth(true)
        .build()
        .unwrap();
    let geocodr = service(&backend, config).with_authorizer(|p: &dyn geocodr::ParamSource| {
        p.get("key").is_some_and(|key| key == "valid")
    });

    let search = [("type", "search"), ("query", "Hauptstr")];
    let err = geocodr.handle(&params(&search)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Unauthorized);
    assert_eq!(err.status(), 403);
    assert_eq!(backend.calls(), 0);

    let mut with_key = params(&search);
    with_key.insert("key", "valid");
    assert!(geocodr.handle(&with_key).is_ok());

    let mut wrong_password = params(&search);
    wrong_password.insert("user", "editor");
    wrong_password.insert("password", "guess");
    let err = geocodr.handle(&wrong_password).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::BackendUnauthenticated);
    assert_eq!(err.to_json()["message"], "Invalid user/password");

    let mut valid_password = params(&search);
    valid_password.insert("user", "editor");
    valid_password.insert("password", "secret");
    assert!(geocodr.handle(&valid_password).is_ok());
}

#[test]
fn test_parcel_identifier() {
    let parcel = ParcelId::parse("123456-56-1/2", None).expect("parcel parses");
    assert_eq!(parcel.gemarkung, "123456");
    assert_eq!(parcel.flur, "056");
    assert_eq!(parcel.zaehler, "00001");
    assert_eq!(parcel.nenner, "0002");

    let again = ParcelId::parse(&parcel.to_string(), None).unwrap();
    assert_eq!(again, parcel);
}
