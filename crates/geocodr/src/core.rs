//! The geocoding service: request validation, collection selection,
//! concurrent backend queries and the merge into one [`ResultSet`].
//!
//! All requests share one worker pool of [`GeocodrConfig::workers`] threads,
//! so the number of in-flight backend queries is bounded per service rather
//! than per request. Concurrent requests queue for free workers; size the
//! pool to the expected request concurrency times the collection count.
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use geocodr::{
//!     Collections, Geocodr, GeocodrConfig, QueryStringParams,
//!     backend::{BackendQuery, BackendResponse, SearchBackend},
//! };
//!
//! struct Empty;
//!
//! impl SearchBackend for Empty {
//!     fn query(&self, _: &BackendQuery) -> geocodr::backend::Result<BackendResponse> {
//!         Ok(BackendResponse::default())
//!     }
//! }
//!
//! let collections = Collections::from_json_str(
//!     r#"{"collections": [{
//!         "name": "streets", "class": "address", "src_epsg": 4326,
//!         "fields": ["name"], "qfields": [{"type": "simple", "field": "name"}]
//!     }]}"#,
//! )?;
//! let geocodr = Geocodr::from_components(collections, Arc::new(Empty), GeocodrConfig::default())?;
//!
//! let params: QueryStringParams = [("type", "search"), ("query", "Hauptstr")].into_iter().collect();
//! let result = geocodr.handle(&params)?;
//! assert_eq!(result.total, 0);
//! # Ok::<(), geocodr::error::GeocodrError>(())
//! ```

use std::sync::Arc;

use geocodr_solr::SearchBackend;
use rayon::{ThreadPool, ThreadPoolBuilder};
use serde_json::Map;
use tracing::{info, instrument, warn};

use crate::{
    collection::{CollectionSpec, Collections},
    config::GeocodrConfig,
    error::{GeocodrError, Result},
    feature::AssembleOptions,
    request::{ParamSource, RequestDefaults, RequestParams, user_auth},
    search::{ResultSet, SortPolicy, merge, search_collections},
};

/// Decides whether a request may be answered, e.g. by checking an API key.
pub trait Authorizer: Send + Sync {
    fn permit(&self, params: &dyn ParamSource) -> bool;
}

impl<F> Authorizer for F
where
    F: Fn(&dyn ParamSource) -> bool + Send + Sync,
{
    fn permit(&self, params: &dyn ParamSource) -> bool {
        self(params)
    }
}

/// The geocoding service.
///
/// Holds the validated collection mapping, the backend client and a bounded
/// worker pool. Safe to share between request threads.
#[derive(Clone)]
pub struct Geocodr {
    collections: Arc<Collections>,
    backend: Arc<dyn SearchBackend>,
    authorizer: Option<Arc<dyn Authorizer>>,
    pool: Arc<ThreadPool>,
    config: GeocodrConfig,
}

impl Geocodr {
    /// Create a service that queries the Solr instance and loads the mapping
    /// file named in `config`.
    #[cfg(feature = "http")]
    #[instrument(name = "Create Geocodr", level = "info", skip_all, fields(solr_url = %config.solr_url))]
    pub fn new(config: GeocodrConfig) -> Result<Self> {
        let t_init = std::time::Instant::now();
        let mapping = config.mapping.as_ref().ok_or_else(|| {
            GeocodrError::Config(crate::collection::ConfigError::Invalid(
                "no mapping file configured".to_string(),
            ))
        })?;
        let collections = Collections::load(mapping)?;
        let solr = geocodr_solr::Solr::builder(config.solr_url.clone())
            .max_retries(config.max_retries)
            .timeout(config.timeout)
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to create Solr client: {e}"))?;

        let geocodr = Self::from_components(collections, Arc::new(solr), config)?;
        info!(elapsed = ?t_init.elapsed(), "Geocodr initialization complete");
        Ok(geocodr)
    }

    /// Create a service from already loaded collections and any backend.
    pub fn from_components(
        collections: Collections,
        backend: Arc<dyn SearchBackend>,
        config: GeocodrConfig,
    ) -> Result<Self> {
        let pool = ThreadPoolBuilder::new()
            .num_threads(config.workers.max(1))
            .thread_name(|idx| format!("geocodr-worker-{idx}"))
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to create worker pool: {e}"))?;
        Ok(Self {
            collections: Arc::new(collections),
            backend,
            authorizer: None,
            pool: Arc::new(pool),
            config,
        })
    }

    /// Check every request with `authorizer` before it is dispatched.
    pub fn with_authorizer(mut self, authorizer: impl Authorizer + 'static) -> Self {
        self.authorizer = Some(Arc::new(authorizer));
        self
    }

    pub fn collections(&self) -> &Collections {
        &self.collections
    }

    pub fn config(&self) -> &GeocodrConfig {
        &self.config
    }

    /// Answer one (reverse) geocoding request.
    ///
    /// Request errors are reported before any backend call. If one
    /// collection query fails, the whole request fails.
    #[instrument(name = "Geocode", level = "info", skip_all)]
    pub fn handle(&self, params: &impl ParamSource) -> Result<ResultSet> {
        let t_handle = std::time::Instant::now();

        // --- 1. Authorization ---
        self.authorize(params)?;

        // --- 2. Request validation ---
        let defaults = RequestDefaults {
            data_proj: self.collections.src_proj(),
            reverse_radius: self.config.reverse_radius,
        };
        let request = RequestParams::parse(params, &defaults)?;
        if let Some(class) = request
            .classes
            .iter()
            .find(|class| !self.collections.has_class(class))
        {
            return Err(GeocodrError::InvalidClass(class.clone()));
        }
        let selected = self.collections.select(&request.classes).collect::<Vec<&CollectionSpec>>();
        info!(
            mode = ?request.mode,
            query = %request.query,
            collections = selected.len(),
            "Handling request"
        );

        // --- 3. Concurrent collection queries ---
        let options = AssembleOptions {
            dst_proj: request.dst_proj,
            distance_pt: request.distance_pt(),
            shape: request.shape,
        };
        let results = search_collections(
            &self.pool,
            &self.backend,
            &selected,
            &request,
            &options,
            self.config.row_floor,
        )
        .inspect_err(|e| warn!(error = %e, "Request failed"))?;

        // --- 4. Merge, sort and paginate ---
        let backend_debug = request.debug.then(|| {
            results
                .iter()
                .filter_map(|r| r.debug.clone().map(|d| (r.collection.clone(), d)))
                .collect::<Map<_, _>>()
        });
        let mut result_set = merge(
            results.into_iter().map(|r| r.features),
            SortPolicy::from(request.mode),
            request.limit,
            request.offset,
        );
        result_set.debug = request.debug;
        result_set.backend_debug = backend_debug;

        info!(
            elapsed = ?t_handle.elapsed(),
            total = result_set.total,
            returned = result_set.returned,
            "Request complete"
        );
        Ok(result_set)
    }

    fn authorize(&self, params: &impl ParamSource) -> Result<()> {
        if self.config.enable_basic_auth && user_auth(params).is_some() {
            // the backend checks the credentials
            return Ok(());
        }
        match &self.authorizer {
            Some(authorizer) if !authorizer.permit(params) => {
                warn!("Request denied by authorizer");
                Err(GeocodrError::Unauthorized)
            }
            _ => Ok(()),
        }
    }
}

impl std::fmt::Debug for Geocodr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Geocodr")
            .field("collections", &self.collections.len())
            .field("authorizer", &self.authorizer.is_some())
            .field("config", &self.config)
            .finish()
    }
}
