//! Query orchestration: one backend query per collection, run on a bounded
//! worker pool, followed by the merge of all features.

use geocodr_solr::{BackendQuery, SearchBackend};
use rayon::{ThreadPool, prelude::*};
use serde_json::Value;
use tracing::{debug, instrument, warn};

pub use error::SearchError;
use error::Result;

use crate::{
    collection::CollectionSpec,
    feature::{AssembleOptions, Feature, to_features},
    request::RequestParams,
};

mod merge;

pub use merge::{ResultSet, SortPolicy, merge};

/// Query all collections for reverse geocoding.
pub const REVERSE_QUERY: &str = "*";

/// Features and optional backend debug output of one collection.
#[derive(Debug, Clone, Default)]
pub struct CollectionResult {
    pub collection: String,
    pub features: Vec<Feature>,
    pub debug: Option<Value>,
}

/// The backend query for `collection`, or `None` if the collection is
/// skipped for this request.
///
/// Search queries shorter than the collection's minimum query length and
/// queries with a term none of the collection's fields can match are
/// skipped. Reverse geocoding matches everything within the spatial filter.
pub fn backend_query(
    collection: &CollectionSpec,
    request: &RequestParams,
    row_floor: usize,
) -> Option<BackendQuery> {
    let q = if request.is_reverse() {
        REVERSE_QUERY.to_string()
    } else {
        if request.query.trim().chars().count() < collection.min_query_length {
            return None;
        }
        collection.query(&request.query)?
    };

    let mut params = request
        .spatial_filter
        .as_ref()
        .map(|filter| filter.query_params(&collection.geometry_field))
        .unwrap_or_default();
    if request.debug {
        params.push(("debugQuery".to_string(), "on".to_string()));
    }

    Some(BackendQuery {
        collection: collection.name.clone(),
        q,
        sort: collection.sort.clone(),
        fields: collection.field_list.clone(),
        rows: request.limit.saturating_add(request.offset).max(row_floor),
        params,
        user_auth: request.user_auth.clone(),
    })
}

/// Query one collection and assemble its features.
#[instrument(name = "Collection Query", level = "debug", skip_all, fields(collection = %collection.name))]
pub fn query_collection<B: SearchBackend + ?Sized>(
    backend: &B,
    collection: &CollectionSpec,
    request: &RequestParams,
    options: &AssembleOptions,
    row_floor: usize,
) -> Result<CollectionResult> {
    let Some(query) = backend_query(collection, request, row_floor) else {
        debug!("Collection skipped for this query");
        return Ok(CollectionResult {
            collection: collection.name.clone(),
            ..Default::default()
        });
    };
    debug!(q = %query.q, rows = query.rows, "Querying backend");

    let t_query = std::time::Instant::now();
    let response = backend
        .query(&query)
        .map_err(|source| SearchError::Backend {
            collection: collection.name.clone(),
            source,
        })?;
    let docs = response.docs.len();

    let features =
        to_features(collection, response.docs, options).map_err(|source| SearchError::Assemble {
            collection: collection.name.clone(),
            source,
        })?;
    debug!(elapsed = ?t_query.elapsed(), docs, "Collection query complete");

    Ok(CollectionResult {
        collection: collection.name.clone(),
        features,
        debug: response.debug,
    })
}

/// Query all `collections` concurrently on `pool`.
///
/// Every query runs to completion; results are returned in collection order.
/// If any query fails, the error of the first failing collection (in
/// collection order) is returned.
pub fn search_collections<B: SearchBackend + ?Sized>(
    pool: &ThreadPool,
    backend: &B,
    collections: &[&CollectionSpec],
    request: &RequestParams,
    options: &AssembleOptions,
    row_floor: usize,
) -> Result<Vec<CollectionResult>> {
    let results: Vec<Result<CollectionResult>> = pool.install(|| {
        collections
            .par_iter()
            .map(|collection| query_collection(backend, collection, request, options, row_floor))
            .collect()
    });

    for err in results.iter().filter_map(|r| r.as_ref().err()) {
        warn!(error = %err, "Collection query failed");
    }
    results.into_iter().collect()
}

mod error {
    use geocodr_solr::SolrError;
    use thiserror::Error;

    use crate::feature::AssembleError;

    #[derive(Error, Debug)]
    pub enum SearchError {
        #[error("Query for collection '{collection}' failed: {source}")]
        Backend {
            collection: String,
            source: SolrError,
        },
        #[error("Failed to assemble features of collection '{collection}': {source}")]
        Assemble {
            collection: String,
            source: AssembleError,
        },
    }

    impl SearchError {
        pub fn collection(&self) -> &str {
            match self {
                Self::Backend { collection, .. } | Self::Assemble { collection, .. } => collection,
            }
        }

        /// True when the backend rejected the request's credentials.
        pub fn is_unauthenticated(&self) -> bool {
            matches!(self, Self::Backend { source, .. } if source.is_unauthenticated())
        }
    }

    pub type Result<T> = std::result::Result<T, SearchError>;
}
