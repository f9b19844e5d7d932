use std::time::Duration;

use itertools::Itertools;
use reqwest::{StatusCode, blocking::Client};
use serde_json::Value;
use tracing::{debug, instrument, warn};

use crate::{BackendQuery, BackendResponse, Result, SearchBackend, SolrError};

const DEFAULT_MAX_RETRIES: usize = 3;
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_POOL_MAX_IDLE: usize = 100;

/// Blocking Solr client with a pooled HTTP connection.
///
/// Cheap to share: all worker threads of a request use the same client.
#[derive(Debug, Clone)]
pub struct Solr {
    base_url: String,
    client: Client,
    max_retries: usize,
}

/// Builder for [`Solr`].
#[derive(Debug, Clone)]
pub struct SolrBuilder {
    base_url: String,
    max_retries: usize,
    timeout: Duration,
    pool_max_idle_per_host: usize,
}

impl SolrBuilder {
    /// Retries after connection failures or timeouts.
    pub fn max_retries(mut self, retries: usize) -> Self {
        self.max_retries = retries;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn pool_max_idle_per_host(mut self, max: usize) -> Self {
        self.pool_max_idle_per_host = max;
        self
    }

    pub fn build(self) -> Result<Solr> {
        let client = Client::builder()
            .timeout(self.timeout)
            .pool_max_idle_per_host(self.pool_max_idle_per_host)
            .build()?;
        Ok(Solr {
            base_url: self.base_url.trim_end_matches('/').to_string(),
            client,
            max_retries: self.max_retries,
        })
    }
}

impl Solr {
    pub fn builder(url: impl Into<String>) -> SolrBuilder {
        SolrBuilder {
            base_url: url.into(),
            max_retries: DEFAULT_MAX_RETRIES,
            timeout: DEFAULT_TIMEOUT,
            pool_max_idle_per_host: DEFAULT_POOL_MAX_IDLE,
        }
    }

    /// Create a client for the Solr instance at `url` (e.g. `http://localhost:8983/solr`).
    pub fn new(url: impl Into<String>) -> Result<Self> {
        Self::builder(url).build()
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn select_url(&self, collection: &str) -> String {
        format!("{}/{}/select", self.base_url, collection)
    }

    fn send(
        &self,
        url: &str,
        query: &BackendQuery,
    ) -> std::result::Result<reqwest::blocking::Response, reqwest::Error> {
        let params = query.request_params();
        let mut attempt = 0;
        loop {
            let mut request = self.client.get(url).query(&params);
            if let Some(auth) = &query.user_auth {
                request = request.basic_auth(&auth.user, Some(&auth.password));
            }
            match request.send() {
                Ok(resp) => return Ok(resp),
                Err(e) if (e.is_connect() || e.is_timeout()) && attempt < self.max_retries => {
                    attempt += 1;
                    warn!(url, attempt, error = %e, "Solr request failed, retrying");
                }
                Err(e) => return Err(e),
            }
        }
    }
}

impl SearchBackend for Solr {
    #[instrument(name = "Solr query", level = "debug", skip_all, fields(collection = %query.collection))]
    fn query(&self, query: &BackendQuery) -> Result<BackendResponse> {
        let url = self.select_url(&query.collection);
        debug!(q = %query.q, rows = query.rows, "Sending Solr select");

        let resp = self.send(&url, query)?;
        let status = resp.status();
        if status == StatusCode::UNAUTHORIZED {
            return Err(SolrError::Unauthenticated {
                collection: query.collection.clone(),
            });
        }
        if !status.is_success() {
            return Err(status_error(url, status, resp.text()));
        }

        let body: Value = resp.json()?;
        BackendResponse::from_json(&url, body)
    }
}

/// Error for a non-success response. An unreadable body is reported in its
/// place.
fn status_error<E: std::fmt::Display>(
    url: String,
    status: StatusCode,
    body: std::result::Result<String, E>,
) -> SolrError {
    let message = match body {
        Ok(body) => error_message(&body),
        Err(e) => format!("failed to read response body: {e}"),
    };
    SolrError::Status {
        url,
        status: status.as_u16(),
        message,
    }
}

/// Extract the error message from a Solr error body, falling back to the raw body.
fn error_message(body: &str) -> String {
    let Ok(doc) = serde_json::from_str::<Value>(body) else {
        return body.to_string();
    };
    if let Some(error) = doc.get("error") {
        return error
            .get("msg")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
    }
    if let Some(Value::Array(errors)) = doc.get("errors") {
        return errors
            .iter()
            .map(|e| {
                e.get("errorMessages")
                    .and_then(Value::as_array)
                    .map(|msgs| msgs.iter().filter_map(Value::as_str).join(";"))
                    .unwrap_or_default()
            })
            .join(";");
    }
    body.to_string()
}
