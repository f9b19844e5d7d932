use thiserror::Error;
pub type Result<T> = std::result::Result<T, SolrError>;

#[derive(Error, Debug)]
pub enum SolrError {
    #[error("Invalid user/password for collection '{collection}'")]
    Unauthenticated { collection: String },
    #[error("Error calling {url}: {message}")]
    Status {
        url: String,
        status: u16,
        message: String,
    },
    #[error("Unexpected response from {url}: {message}")]
    InvalidResponse { url: String, message: String },
    #[cfg(feature = "http")]
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("Backend error: {0}")]
    Other(String),
}

impl SolrError {
    /// True when the backend rejected the supplied credentials.
    pub fn is_unauthenticated(&self) -> bool {
        matches!(self, Self::Unauthenticated { .. })
    }
}
