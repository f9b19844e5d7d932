use serde_json::{Value, json};
use thiserror::Error;

use crate::{collection::ConfigError, request::RequestError, search::SearchError};

#[derive(Error, Debug)]
pub enum GeocodrError {
    #[error("{0}")]
    InvalidRequest(String),
    #[error("Parameter '{0}' is required for this request.")]
    MissingParameter(String),
    #[error("Invalid parameter value for '{name}': {detail}")]
    InvalidParameter { name: String, detail: String },
    #[error("Invalid class '{0}'")]
    InvalidClass(String),
    #[error("API key is invalid or not valid for this request.")]
    Unauthorized,
    #[error("Invalid user/password")]
    BackendUnauthenticated { collection: String },
    #[error("Backend error: {0}")]
    BackendError(String),
    #[error("Internal error: {0}")]
    InternalError(String),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("Init Logging error: {0}")]
    InitLoggingError(#[from] tracing_subscriber::filter::ParseError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Classification of a [`GeocodrError`] for callers and transports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidRequest,
    MissingParameter,
    InvalidParameter,
    InvalidClass,
    Unauthorized,
    BackendUnauthenticated,
    BackendError,
    InternalError,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidRequest => "invalid_request",
            Self::MissingParameter => "missing_parameter",
            Self::InvalidParameter => "invalid_parameter",
            Self::InvalidClass => "invalid_class",
            Self::Unauthorized => "unauthorized",
            Self::BackendUnauthenticated => "backend_unauthenticated",
            Self::BackendError => "backend_error",
            Self::InternalError => "internal_error",
        }
    }

    /// HTTP status a transport should answer with.
    pub fn status(&self) -> u16 {
        match self {
            Self::InvalidRequest
            | Self::MissingParameter
            | Self::InvalidParameter
            | Self::InvalidClass
            | Self::BackendUnauthenticated => 400,
            Self::Unauthorized => 403,
            Self::BackendError | Self::InternalError => 500,
        }
    }
}

impl GeocodrError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidRequest(_) => ErrorKind::InvalidRequest,
            Self::MissingParameter(_) => ErrorKind::MissingParameter,
            Self::InvalidParameter { .. } => ErrorKind::InvalidParameter,
            Self::InvalidClass(_) => ErrorKind::InvalidClass,
            Self::Unauthorized => ErrorKind::Unauthorized,
            Self::BackendUnauthenticated { .. } => ErrorKind::BackendUnauthenticated,
            Self::BackendError(_) => ErrorKind::BackendError,
            Self::InternalError(_)
            | Self::Config(_)
            | Self::InitLoggingError(_)
            | Self::Other(_) => ErrorKind::InternalError,
        }
    }

    pub fn status(&self) -> u16 {
        self.kind().status()
    }

    /// True for errors caused by the request itself, detected before any
    /// backend call.
    pub fn is_request_error(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::InvalidRequest
                | ErrorKind::MissingParameter
                | ErrorKind::InvalidParameter
                | ErrorKind::InvalidClass
        )
    }

    /// Error body for transports: `{"status": .., "kind": .., "message": ..}`.
    ///
    /// Backend and internal failures get a generic message; details are
    /// logged, not returned to the client.
    pub fn to_json(&self) -> Value {
        let kind = self.kind();
        let message = match kind {
            ErrorKind::BackendError | ErrorKind::InternalError => "Internal error.".to_string(),
            _ => self.to_string(),
        };
        json!({
            "status": kind.status(),
            "kind": kind.as_str(),
            "message": message,
        })
    }
}

impl From<RequestError> for GeocodrError {
    fn from(err: RequestError) -> Self {
        match err {
            RequestError::InvalidRequest(msg) => Self::InvalidRequest(msg),
            RequestError::MissingParameter(name) => Self::MissingParameter(name),
            RequestError::InvalidParameter { name, detail } => {
                Self::InvalidParameter { name, detail }
            }
        }
    }
}

impl From<SearchError> for GeocodrError {
    fn from(err: SearchError) -> Self {
        match err {
            SearchError::Backend { collection, source } if source.is_unauthenticated() => {
                Self::BackendUnauthenticated { collection }
            }
            err @ SearchError::Backend { .. } => Self::BackendError(err.to_string()),
            err @ SearchError::Assemble { .. } => Self::InternalError(err.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, GeocodrError>;
