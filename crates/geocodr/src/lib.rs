//! Geocodr - Geocoding Query Federation Library
//!
//! Geocodr answers free-text geocoding and reverse geocoding requests by
//! querying many independently configured search collections (streets,
//! addresses, parcels, districts, ...) of a Solr backend concurrently and
//! merging their hits into one ranked GeoJSON feature collection.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use geocodr::{Geocodr, GeocodrConfig, QueryStringParams};
//!
//! let config = GeocodrConfig::builder()
//!     .solr_url("http://localhost:8983/solr")
//!     .mapping("conf/mapping.json")
//!     .build()?;
//! let geocodr = Geocodr::new(config)?;
//!
//! let params: QueryStringParams = [
//!     ("type", "search"),
//!     ("query", "Hauptstr 5"),
//!     ("class", "address"),
//!     ("limit", "10"),
//! ]
//! .into_iter()
//! .collect();
//! let result = geocodr.handle(&params)?;
//! println!("{}", result.to_json_string().map_err(anyhow::Error::from)?);
//! # Ok::<(), geocodr::error::GeocodrError>(())
//! ```
//!
//! # Collections
//!
//! Every collection is described in a JSON mapping document: which fields
//! are matched and how ([`QueryField`]), which fields are displayed, how hits
//! are sorted and in which projection the geometries are stored. See
//! [`Collections::from_json_str`].
//!
//! # Requests
//!
//! A request is any key/value [`ParamSource`]: query string parameters
//! ([`QueryStringParams`]) or a JSON body ([`JsonParams`]). `type=search`
//! matches the `query` text; `type=reverse` finds everything around the
//! `x,y` coordinate in `query` and ranks it by distance.

use once_cell::sync::OnceCell;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::{EnvFilter, fmt::format::FmtSpan};

mod collection;
mod config;
mod core;
pub mod error;
mod feature;
mod geom;
pub mod parcel;
mod proj;
mod query;
mod request;
mod search;
mod spatial;

pub use crate::core::{Authorizer, Geocodr};

pub use collection::{CollectionSpec, Collections, ConfigError};
pub use config::{DEFAULT_SOLR_URL, GeocodrConfig, GeocodrConfigBuilder};
pub use error::{ErrorKind, GeocodrError};
pub use feature::{AssembleError, AssembleOptions, Feature, SortValue, TieBreaker, props};
pub use geocodr_solr as backend;
pub use geom::{distance_to, envelope, parse_wkt, point_on_geometry};
pub use parcel::ParcelId;
pub use proj::{Projection, ProjectionError, Transformer};
pub use query::{Fragment, NGRAM_MIN_MATCH, QueryField, build_query, ngram_weight, term_query};
pub use request::{
    DEFAULT_LIMIT, JsonParams, Mode, ParamSource, QueryStringParams, RequestDefaults,
    RequestError, RequestParams, Shape,
};
pub use search::{CollectionResult, ResultSet, SearchError, SortPolicy, merge};
pub use spatial::SpatialFilter;

static LOGGER_INIT: OnceCell<()> = OnceCell::new();

/// Initialize logging for the geocodr library.
///
/// Installs a `tracing` fmt subscriber. `RUST_LOG` takes precedence over
/// `level`. Calling it again is a no-op.
///
/// ```rust
/// use geocodr::init_logging;
/// use tracing::Level;
///
/// init_logging(Level::INFO)?;
/// # Ok::<(), geocodr::error::GeocodrError>(())
/// ```
pub fn init_logging(level: impl Into<LevelFilter>) -> Result<&'static (), GeocodrError> {
    LOGGER_INIT.get_or_try_init(|| {
        let filter = EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(level.into().to_string()))?
            .add_directive("reqwest=warn".parse()?)
            .add_directive("hyper_util=warn".parse()?);

        tracing_subscriber::fmt::fmt()
            .with_env_filter(filter)
            .with_span_events(FmtSpan::CLOSE)
            .try_init()
            .map_err(|e| anyhow::anyhow!("Failed to install subscriber: {e}"))?;
        Ok(())
    })
}
