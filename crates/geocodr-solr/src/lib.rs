//! Search backend collaborator for geocodr.
//!
//! The geocodr core never talks to a search engine directly. It builds a
//! [`BackendQuery`] per collection and hands it to a [`SearchBackend`]. This
//! crate defines that seam and ships the Solr implementation used in
//! production ([`Solr`], behind the default `http` feature).
//!
//! The backend is expected to provide:
//! - a textual `score` per hit,
//! - a WKT-valued geometry field,
//! - nested, weighted sub-queries (`_query_`, `{!edismax}`, `{!maxscore}`),
//! - a `{!geofilt}` point-radius filter and range filters on spatial fields.
//!
//! Connection pooling, retries and timeouts are the backend's business.

use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;

#[cfg(feature = "http")]
mod client;
mod error;

#[cfg(feature = "http")]
pub use client::{Solr, SolrBuilder};
pub use error::{Result, SolrError};

/// A raw hit as returned by the backend.
pub type Document = serde_json::Map<String, Value>;

/// Credentials forwarded to the backend as HTTP basic auth.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserAuth {
    pub user: String,
    pub password: String,
}

/// One select request against one collection.
#[derive(Debug, Clone, Default)]
pub struct BackendQuery {
    pub collection: String,
    /// The main query (`q`).
    pub q: String,
    pub sort: String,
    /// Field list (`fl`).
    pub fields: String,
    pub rows: usize,
    /// Additional request parameters, e.g. spatial filters or debug flags.
    pub params: Vec<(String, String)>,
    pub user_auth: Option<UserAuth>,
}

impl BackendQuery {
    /// All request parameters in the order they are sent.
    pub fn request_params(&self) -> Vec<(&str, String)> {
        let mut params = vec![
            ("q", self.q.clone()),
            ("sort", self.sort.clone()),
            ("fl", self.fields.clone()),
            ("rows", self.rows.to_string()),
            ("wt", "json".to_string()),
        ];
        params.extend(self.params.iter().map(|(k, v)| (k.as_str(), v.clone())));
        params
    }
}

/// The documents of one select response and optional debug output.
#[derive(Debug, Clone, Default)]
pub struct BackendResponse {
    pub docs: Vec<Document>,
    pub debug: Option<Value>,
}

/// Envelope of a Solr select response.
#[derive(Debug, Deserialize)]
struct SelectResponse {
    response: Option<DocList>,
    #[serde(default)]
    debug: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct DocList {
    docs: Vec<Document>,
}

impl BackendResponse {
    /// Extract documents and debug info from a Solr JSON response body.
    pub fn from_json(url: &str, body: Value) -> Result<Self> {
        let invalid = |message: String| SolrError::InvalidResponse {
            url: url.to_string(),
            message,
        };
        let SelectResponse { response, debug } =
            serde_json::from_value(body).map_err(|e| invalid(e.to_string()))?;
        let docs = response
            .ok_or_else(|| invalid("missing response.docs".to_string()))?
            .docs;
        Ok(Self { docs, debug })
    }
}

/// Capability to run one query against one backend collection.
///
/// Implementations are shared between the worker threads of a request and
/// must manage their own connection pooling.
pub trait SearchBackend: Send + Sync {
    fn query(&self, query: &BackendQuery) -> Result<BackendResponse>;
}

impl<T: SearchBackend + ?Sized> SearchBackend for Arc<T> {
    fn query(&self, query: &BackendQuery) -> Result<BackendResponse> {
        (**self).query(query)
    }
}

impl<T: SearchBackend + ?Sized> SearchBackend for &T {
    fn query(&self, query: &BackendQuery) -> Result<BackendResponse> {
        (**self).query(query)
    }
}

static SPECIAL_CHARS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"[-+&|!(){}\[\]^"~*?:\\/']"#).expect("valid special char regex"));
static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid whitespace regex"));

/// Replace every Solr special character with whitespace and collapse runs of
/// whitespace into a single space.
///
/// ```
/// assert_eq!(geocodr_solr::strip_special_chars(r#" o-+|n!)l([]\\"y:?/'  "#), "o n l y");
/// ```
pub fn strip_special_chars(query: &str) -> String {
    let query = SPECIAL_CHARS.replace_all(query, " ");
    WHITESPACE.replace_all(&query, " ").trim().to_string()
}
