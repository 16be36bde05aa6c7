use thiserror::Error;

/// Failure reported by one source adapter call.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("{system} setting '{key}' is not configured")]
    MissingConfig { system: &'static str, key: &'static str },
    #[error("invalid {system} configuration: {message}")]
    InvalidConfig {
        system: &'static str,
        message: String,
    },
    #[error("missing query scope: {0}")]
    MissingScope(String),
    #[error("no match found for '{0}'")]
    NotFound(String),
    #[error("unexpected number of matches for '{key}': expected 1, got {matches}")]
    Ambiguous { key: String, matches: usize },
    #[error("{operation} request failed: {error}")]
    Transport {
        operation: String,
        #[source]
        error: reqwest::Error,
    },
    #[error("{operation} failed with status {status}: {body}")]
    HttpStatus {
        operation: String,
        status: u16,
        body: String,
    },
    #[error("{operation} still rate limited after {attempts} attempts")]
    RateLimited { operation: String, attempts: usize },
    #[error("failed to decode {operation}: {message}")]
    Decode { operation: String, message: String },
    #[error("page {page} failed, fetched records discarded: {cause}")]
    Pagination {
        page: usize,
        #[source]
        cause: Box<SourceError>,
    },
}

impl SourceError {
    /// Returns true for configuration and authorization problems, as opposed
    /// to transient transport failures.
    pub fn is_configuration(&self) -> bool {
        match self {
            Self::MissingConfig { .. } | Self::InvalidConfig { .. } | Self::MissingScope(_) => {
                true
            }
            Self::HttpStatus { status, .. } => matches!(status, 401 | 403),
            Self::Pagination { cause, .. } => cause.is_configuration(),
            _ => false,
        }
    }
}
