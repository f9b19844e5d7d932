use std::{path::PathBuf, time::Duration};

use crate::{
    collection::ConfigError,
    error::{GeocodrError, Result},
};

pub const DEFAULT_SOLR_URL: &str = "http://localhost:8983/solr";

/// Service configuration of a [`Geocodr`](crate::Geocodr) instance.
///
/// Use [`GeocodrConfigBuilder`] to create one:
/// ```rust
/// use geocodr::GeocodrConfig;
///
/// let config = GeocodrConfig::builder()
///     .solr_url("http://solr:8983/solr")
///     .mapping("conf/mapping.json")
///     .workers(8)
///     .build()?;
/// assert_eq!(config.reverse_radius, 50.0);
/// # Ok::<(), geocodr::error::GeocodrError>(())
/// ```
#[derive(Debug, Clone)]
pub struct GeocodrConfig {
    /// Base URL of the Solr instance
    pub solr_url: String,
    /// JSON collection mapping, required to construct a service from disk
    pub mapping: Option<PathBuf>,
    /// Radius in kilometers around the query point for reverse geocoding,
    /// sent to the backend unchanged as the `geofilt` distance
    pub reverse_radius: f64,
    /// Rows fetched per collection at least, so the global sort and
    /// pagination see enough candidates
    pub row_floor: usize,
    /// Maximum number of concurrent collection queries, shared by all
    /// requests of a service
    pub workers: usize,
    /// Pass `user`/`password` on to the backend and skip the authorizer
    pub enable_basic_auth: bool,
    /// Backend retries after connection failures
    pub max_retries: usize,
    /// Backend request timeout
    pub timeout: Duration,
}

impl GeocodrConfig {
    pub fn builder() -> GeocodrConfigBuilder {
        GeocodrConfigBuilder::default()
    }
}

impl Default for GeocodrConfig {
    fn default() -> Self {
        Self {
            solr_url: DEFAULT_SOLR_URL.to_string(),
            mapping: None,
            reverse_radius: 50.0,
            row_floor: 1000,
            workers: 4,
            enable_basic_auth: false,
            max_retries: 3,
            timeout: Duration::from_secs(30),
        }
    }
}

/// Builder for creating service configurations with defaults for a local Solr
#[derive(Debug, Clone, Default)]
pub struct GeocodrConfigBuilder {
    config: GeocodrConfig,
}

impl GeocodrConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: GeocodrConfig::default(),
        }
    }

    /// Single worker, no retries and a short timeout. Failures show up
    /// immediately.
    pub fn development() -> Self {
        let mut builder = Self::new();
        builder.config.workers = 1;
        builder.config.max_retries = 0;
        builder.config.timeout = Duration::from_secs(5);
        builder
    }

    /// More workers for mappings with many collections.
    pub fn production() -> Self {
        let mut builder = Self::new();
        builder.config.workers = 8;
        builder.config.max_retries = 3;
        builder
    }

    pub fn solr_url(mut self, url: impl Into<String>) -> Self {
        self.config.solr_url = url.into();
        self
    }

    pub fn mapping(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.mapping = Some(path.into());
        self
    }

    /// Set the reverse geocoding radius in kilometers
    pub fn reverse_radius(mut self, km: f64) -> Self {
        self.config.reverse_radius = km;
        self
    }

    pub fn row_floor(mut self, rows: usize) -> Self {
        self.config.row_floor = rows;
        self
    }

    pub fn workers(mut self, workers: usize) -> Self {
        self.config.workers = workers;
        self
    }

    pub fn enable_basic_auth(mut self, enabled: bool) -> Self {
        self.config.enable_basic_auth = enabled;
        self
    }

    pub fn max_retries(mut self, retries: usize) -> Self {
        self.config.max_retries = retries;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    /// Validate and build the final configuration
    pub fn build(self) -> Result<GeocodrConfig> {
        let config = self.config;
        if config.workers == 0 {
            return Err(invalid("workers must be at least 1"));
        }
        if !(config.reverse_radius.is_finite() && config.reverse_radius > 0.0) {
            return Err(invalid(format!(
                "reverse_radius must be a positive number of kilometers, got {}",
                config.reverse_radius
            )));
        }
        if config.solr_url.trim().is_empty() {
            return Err(invalid("solr_url must not be empty"));
        }
        Ok(config)
    }
}

fn invalid(message: impl Into<String>) -> GeocodrError {
    GeocodrError::Config(ConfigError::Invalid(message.into()))
}
