//! Collection mapping: the static per-collection configuration and its loader.
//!
//! A mapping file is a JSON document with optional `defaults` that are merged
//! under every entry of `collections`:
//!
//! ```json
//! {
//!   "defaults": {"src_epsg": 4326, "geometry_field": "geometrie"},
//!   "collections": [
//!     {"name": "streets", "title": "Streets", "class": "address", "class_title": "Addresses",
//!      "fields": ["strasse_name"], "qfields": [{"type": "simple", "field": "strasse_name"}]}
//!   ]
//! }
//! ```
//!
//! All collections of one mapping must share the same source projection.

use std::path::Path;

use ahash::AHashSet;
use geocodr_solr::Document;
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{info, instrument};

pub use error::ConfigError;
use error::Result;

use crate::{
    feature::{SortValue, TieBreaker},
    proj::Projection,
    query::{QueryField, build_query},
};

fn default_jsonblob_field() -> Option<String> {
    Some("json".to_string())
}
fn default_geometry_field() -> String {
    "geometry".to_string()
}
fn default_field_list() -> String {
    "*,score,geometry:[geo f=geometry w=WKT]".to_string()
}
fn default_sort() -> String {
    "score DESC".to_string()
}
fn default_title() -> String {
    "Unknown collection".to_string()
}
fn default_class() -> String {
    "unknown_class".to_string()
}
fn default_class_title() -> String {
    "Unknown class".to_string()
}
fn default_class_title_attrib() -> String {
    "_class_title_".to_string()
}
fn default_collection_title_attrib() -> String {
    "_collection_title_".to_string()
}
fn default_distance_attrib() -> String {
    "_distance_".to_string()
}

/// Immutable configuration of one searchable collection.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CollectionSpec {
    /// Backend collection name.
    pub name: String,
    #[serde(default = "default_title")]
    pub title: String,
    /// Caller-facing class tag used to select collections.
    #[serde(rename = "class", default = "default_class")]
    pub class: String,
    #[serde(default = "default_class_title")]
    pub class_title: String,
    /// Backend field holding a JSON object with the base properties.
    #[serde(default = "default_jsonblob_field")]
    pub jsonblob_field: Option<String>,
    /// Fields copied from each hit into the properties, overriding blob values.
    #[serde(default)]
    pub fields: Vec<String>,
    /// Matching fields for search queries.
    #[serde(default)]
    pub qfields: Vec<QueryField>,
    #[serde(default = "default_geometry_field")]
    pub geometry_field: String,
    #[serde(default = "default_field_list")]
    pub field_list: String,
    #[serde(rename = "src_epsg")]
    pub src_proj: Projection,
    #[serde(default = "default_sort")]
    pub sort: String,
    /// Tie-breaker fields for hits with equal score.
    #[serde(default)]
    pub sort_fields: Vec<String>,
    /// Orders reverse geocoding results at equal distance. Collections
    /// without a rank sort after all ranked ones.
    #[serde(default)]
    pub collection_rank: Option<u32>,
    #[serde(default = "default_class_title_attrib")]
    pub class_title_attrib: String,
    #[serde(default = "default_collection_title_attrib")]
    pub collection_title_attrib: String,
    #[serde(default = "default_distance_attrib")]
    pub distance_attrib: String,
    /// Search queries shorter than this (in characters) skip the collection.
    #[serde(default)]
    pub min_query_length: usize,
    /// Fields joined for the title instead of `fields`.
    #[serde(default)]
    pub title_fields: Option<Vec<String>>,
}

impl CollectionSpec {
    /// The backend query for a raw search string, or `None` if the
    /// collection cannot match it.
    pub fn query(&self, raw_query: &str) -> Option<String> {
        build_query(&self.qfields, raw_query)
    }

    /// Sort key for hits with the same score.
    pub fn sort_tiebreaker(&self, doc: &Document) -> TieBreaker {
        TieBreaker::new(
            self.sort_fields
                .iter()
                .map(|f| doc.get(f).map_or(SortValue::Null, SortValue::from))
                .collect(),
        )
    }

    /// Human-readable title: all non-empty title fields joined with `", "`.
    pub fn to_title(&self, properties: &Map<String, Value>) -> String {
        let fields = self.title_fields.as_ref().unwrap_or(&self.fields);
        fields
            .iter()
            .filter_map(|f| match properties.get(f)? {
                Value::String(s) if !s.is_empty() => Some(s.clone()),
                Value::Number(n) => Some(n.to_string()),
                Value::Bool(b) => Some(b.to_string()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// All collections of one mapping, sharing one source projection.
#[derive(Debug, Clone)]
pub struct Collections {
    collections: Vec<CollectionSpec>,
    src_proj: Projection,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct MappingDocument {
    #[serde(default)]
    defaults: Map<String, Value>,
    collections: Vec<Value>,
}

impl Collections {
    /// Validate a list of collections.
    pub fn new(collections: Vec<CollectionSpec>) -> Result<Self> {
        let Some(first) = collections.first() else {
            return Err(ConfigError::Empty);
        };
        let src_proj = first.src_proj;

        let mut names = AHashSet::new();
        for collection in &collections {
            if !names.insert(collection.name.as_str()) {
                return Err(ConfigError::DuplicateCollection(collection.name.clone()));
            }
            if collection.src_proj != src_proj {
                return Err(ConfigError::MixedProjections {
                    collection: collection.name.clone(),
                    expected: src_proj.code(),
                    found: collection.src_proj.code(),
                });
            }
        }
        Ok(Self {
            collections,
            src_proj,
        })
    }

    /// Parse a JSON mapping document.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let doc: MappingDocument = serde_json::from_str(json)?;
        let collections = doc
            .collections
            .into_iter()
            .enumerate()
            .map(|(idx, entry)| parse_entry(&doc.defaults, idx, entry))
            .collect::<Result<Vec<_>>>()?;
        Self::new(collections)
    }

    /// Load a JSON mapping file.
    #[instrument(name = "Load collection mapping", level = "info", skip_all, fields(path = %path.as_ref().display()))]
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let collections = Self::from_json_str(&json)?;
        info!(
            collections = collections.len(),
            src_proj = %collections.src_proj,
            "Loaded collection mapping"
        );
        Ok(collections)
    }

    /// The projection all collections store their geometries in.
    pub fn src_proj(&self) -> Projection {
        self.src_proj
    }

    pub fn len(&self) -> usize {
        self.collections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.collections.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, CollectionSpec> {
        self.collections.iter()
    }

    pub fn has_class(&self, class: &str) -> bool {
        self.collections.iter().any(|c| c.class == class)
    }

    /// Collections of the requested classes, in mapping order. An empty
    /// class list selects all collections.
    pub fn select<'a>(&'a self, classes: &'a [String]) -> impl Iterator<Item = &'a CollectionSpec> {
        self.collections
            .iter()
            .filter(move |c| classes.is_empty() || classes.contains(&c.class))
    }
}

impl<'a> IntoIterator for &'a Collections {
    type Item = &'a CollectionSpec;
    type IntoIter = std::slice::Iter<'a, CollectionSpec>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

fn parse_entry(defaults: &Map<String, Value>, idx: usize, entry: Value) -> Result<CollectionSpec> {
    let Value::Object(entry) = entry else {
        return Err(ConfigError::InvalidCollection {
            collection: format!("#{idx}"),
            message: "collection entry is not an object".to_string(),
        });
    };
    let label = entry
        .get("name")
        .and_then(Value::as_str)
        .map_or_else(|| format!("#{idx}"), str::to_string);

    let mut merged = defaults.clone();
    merged.extend(entry);
    serde_json::from_value(Value::Object(merged)).map_err(|e| ConfigError::InvalidCollection {
        collection: label,
        message: e.to_string(),
    })
}

mod error {
    use thiserror::Error;

    #[derive(Error, Debug)]
    pub enum ConfigError {
        #[error("Failed to read mapping '{path}': {source}")]
        Io {
            path: String,
            source: std::io::Error,
        },
        #[error("Invalid mapping document: {0}")]
        Parse(#[from] serde_json::Error),
        #[error("Invalid collection '{collection}': {message}")]
        InvalidCollection { collection: String, message: String },
        #[error("Mapping contains no collections")]
        Empty,
        #[error("Duplicate collection '{0}'")]
        DuplicateCollection(String),
        #[error(
            "All collections need the same source projection: '{collection}' uses EPSG:{found}, expected EPSG:{expected}"
        )]
        MixedProjections {
            collection: String,
            expected: u16,
            found: u16,
        },
        #[error("Invalid configuration: {0}")]
        Invalid(String),
    }

    pub type Result<T> = std::result::Result<T, ConfigError>;
}
