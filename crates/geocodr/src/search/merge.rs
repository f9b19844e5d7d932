//! Merging, sorting and pagination of the features of all collections.

use geojson::{FeatureCollection, JsonObject};
use serde_json::{Map, Value};

use crate::{
    feature::{Feature, props},
    request::Mode,
};

/// Global order of the merged features.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortPolicy {
    /// Descending score, then the collection's tie-breaker fields.
    Relevance,
    /// Ascending distance, then ascending collection rank.
    Distance,
}

impl From<Mode> for SortPolicy {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::Search => Self::Relevance,
            Mode::Reverse => Self::Distance,
        }
    }
}

/// One page of merged features.
#[derive(Debug, Clone, Default)]
pub struct ResultSet {
    pub features: Vec<Feature>,
    /// Number of features before pagination.
    pub total: usize,
    pub returned: usize,
    pub offset: usize,
    /// Keep internal properties in the output.
    pub debug: bool,
    /// Backend debug output per collection, if requested.
    pub backend_debug: Option<Map<String, Value>>,
}

/// Merge the features of all collections, sort them by `policy` and apply
/// `offset`, then `limit`. A `limit` of 0 returns all features after
/// `offset`.
///
/// Sorting is stable: features with equal keys keep their collection and
/// backend order.
pub fn merge(
    features: impl IntoIterator<Item = Vec<Feature>>,
    policy: SortPolicy,
    limit: usize,
    offset: usize,
) -> ResultSet {
    let mut features = features.into_iter().flatten().collect::<Vec<_>>();
    match policy {
        SortPolicy::Relevance => features.sort_by(Feature::cmp_relevance),
        SortPolicy::Distance => features.sort_by(Feature::cmp_distance),
    }

    let total = features.len();
    let page = features
        .into_iter()
        .skip(offset)
        .take(if limit == 0 { usize::MAX } else { limit })
        .collect::<Vec<_>>();

    ResultSet {
        returned: page.len(),
        features: page,
        total,
        offset,
        debug: false,
        backend_debug: None,
    }
}

fn is_internal(key: &str) -> bool {
    key.starts_with('_') && key != props::TITLE
}

impl ResultSet {
    /// The features as GeoJSON. Internal properties are removed unless
    /// debug output was requested; the title is always kept.
    pub fn to_feature_collection(&self) -> FeatureCollection {
        let features = self
            .features
            .iter()
            .map(|f| {
                let mut feature = f.to_geojson();
                if !self.debug
                    && let Some(properties) = feature.properties.as_mut()
                {
                    properties.retain(|k, _| !is_internal(k));
                }
                feature
            })
            .collect();

        let mut foreign_members = JsonObject::new();
        foreign_members.insert("features_total".to_string(), Value::from(self.total));
        foreign_members.insert("features_returned".to_string(), Value::from(self.returned));
        foreign_members.insert("features_offset".to_string(), Value::from(self.offset));
        if self.debug
            && let Some(backend_debug) = &self.backend_debug
        {
            foreign_members.insert("debug".to_string(), Value::Object(backend_debug.clone()));
        }

        FeatureCollection {
            bbox: None,
            features,
            foreign_members: Some(foreign_members),
        }
    }

    pub fn to_json(&self) -> serde_json::Result<Value> {
        serde_json::to_value(self.to_feature_collection())
    }

    pub fn to_json_string(&self) -> serde_json::Result<String> {
        serde_json::to_string(&self.to_feature_collection())
    }
}
